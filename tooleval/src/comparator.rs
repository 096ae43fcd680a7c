//! Schema-aware comparison of expected and observed tool calls
//!
//! The comparator checks tool selection first and only then walks the
//! expected and observed argument trees side by side, guided by the tool's
//! [`ShapeDescriptor`]s. Every shape yields a score in `[0, 1]`:
//!
//! - primitives match fully or not at all (numbers within a relative
//!   tolerance, dates after normalization, declared equivalents accepted)
//! - an omitted optional and an explicit `null` are the same thing
//! - lists compare position by position over the longer length
//! - objects take the weighted mean of their fields
//! - unions score 0 unless both sides select the same variant
//!
//! Every leaf that fails to match is reported as a [`Mismatch`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;

use crate::case::ExpectedCase;
use crate::error::SchemaError;
use crate::report::ScoreRecord;
use crate::schema::{Field, FieldPath, PrimitiveKind, ShapeDescriptor, ToolSchema};
use crate::session::ObservedResult;
use crate::temporal;

/// Comparator knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorConfig {
    /// Default relative tolerance for `number` leaves; integers compare exactly
    pub numeric_epsilon: f64,
    /// Compare ISO-8601 strings after normalization
    pub normalize_dates: bool,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self { numeric_epsilon: 1e-6, normalize_dates: true }
    }
}

impl ComparatorConfig {
    #[must_use]
    pub fn with_epsilon(mut self, numeric_epsilon: f64) -> Self {
        self.numeric_epsilon = numeric_epsilon;
        self
    }

    #[must_use]
    pub fn with_date_normalization(mut self, normalize_dates: bool) -> Self {
        self.normalize_dates = normalize_dates;
        self
    }
}

/// How a leaf failed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Both sides present, values differ
    ValueDiffers,
    /// Expected a value, observed none
    Missing,
    /// Observed a value where none was expected
    Unexpected,
    /// The union discriminators select different variants
    WrongVariant,
    /// The observed value has the wrong shape entirely
    StructuralMismatch,
}

/// One leaf-level disagreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub path: FieldPath,
    pub kind: MismatchKind,
    /// `null` when absent
    pub expected: Value,
    /// `null` when absent
    pub observed: Value,
}

/// Result of comparing two argument trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentScore {
    pub score: f64,
    pub mismatches: Vec<Mismatch>,
}

impl ArgumentScore {
    pub fn is_exact(&self) -> bool {
        self.mismatches.is_empty() && self.score >= 1.0
    }
}

/// Scores observed calls against expected ones
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    config: ComparatorConfig,
}

impl Comparator {
    pub fn new(config: ComparatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    /// Whether the observed tool is the expected one (or an accepted alternative)
    pub fn tool_matches(&self, case: &ExpectedCase, observed: &ObservedResult) -> bool {
        observed.tool_name.as_deref().is_some_and(|name| case.accepts_tool(name))
    }

    /// Score one observed call.
    ///
    /// `schema` must be the expected tool's schema. A wrong tool scores 0
    /// without looking at the arguments. Errors are defects in the case or
    /// schema, never model mistakes.
    pub fn score(
        &self,
        case: &ExpectedCase,
        observed: &ObservedResult,
        schema: &ToolSchema,
    ) -> Result<ScoreRecord, SchemaError> {
        let mut record = ScoreRecord::from_observed(case, observed);
        if !self.tool_matches(case, observed) {
            return Ok(record);
        }

        let arguments = self.compare_arguments(case, observed.arguments.as_ref(), schema)?;
        record.tool_match = true;
        record.argument_score = arguments.score;
        record.mismatches = arguments.mismatches;
        Ok(record)
    }

    /// Compare the case's expected arguments with observed ones.
    ///
    /// A call without arguments is compared as an empty object.
    pub fn compare_arguments(
        &self,
        case: &ExpectedCase,
        observed_args: Option<&Value>,
        schema: &ToolSchema,
    ) -> Result<ArgumentScore, SchemaError> {
        if schema.name != case.expected_tool {
            return Err(SchemaError::Validation {
                path: "$".to_string(),
                reason: format!(
                    "case '{}' expects '{}' but was compared against '{}'",
                    case.id, case.expected_tool, schema.name
                ),
            });
        }
        schema.check_expected(&case.expected_args)?;

        let empty = Map::new();
        let expected = case.expected_args.as_object().unwrap_or(&empty);
        let mut walk = Walk {
            epsilon: self.config.numeric_epsilon,
            normalize_dates: self.config.normalize_dates,
            equivalents: &case.equivalents,
            mismatches: Vec::new(),
        };
        let root = FieldPath::root();

        let score = match observed_args {
            None | Some(Value::Null) => walk.fields(&schema.parameters, expected, &empty, &root)?,
            Some(Value::Object(observed)) => {
                walk.fields(&schema.parameters, expected, observed, &root)?
            }
            Some(other) => walk.mismatch(
                &root,
                MismatchKind::StructuralMismatch,
                Some(&case.expected_args),
                Some(other),
            ),
        };

        Ok(ArgumentScore { score: score.clamp(0.0, 1.0), mismatches: walk.mismatches })
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Relative closeness with an absolute floor near zero
fn within(expected: f64, observed: f64, epsilon: f64) -> bool {
    (expected - observed).abs() <= epsilon * expected.abs().max(observed.abs()).max(1.0)
}

/// Exact integer equality without a detour through `f64`
fn integers_equal(expected: &Value, observed: &Value) -> bool {
    if let (Some(e), Some(o)) = (expected.as_i64(), observed.as_i64()) {
        return e == o;
    }
    if let (Some(e), Some(o)) = (expected.as_u64(), observed.as_u64()) {
        return e == o;
    }
    // A whole float such as `3.0` still equals `3`
    match (expected.as_f64(), observed.as_f64()) {
        (Some(e), Some(o)) => e == o,
        _ => false,
    }
}

fn is_integral(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

struct Walk<'a> {
    epsilon: f64,
    normalize_dates: bool,
    equivalents: &'a BTreeMap<String, Vec<Value>>,
    mismatches: Vec<Mismatch>,
}

impl<'a> Walk<'a> {
    fn mismatch(
        &mut self,
        path: &FieldPath,
        kind: MismatchKind,
        expected: Option<&Value>,
        observed: Option<&Value>,
    ) -> f64 {
        self.mismatches.push(Mismatch {
            path: path.clone(),
            kind,
            expected: expected.cloned().unwrap_or(Value::Null),
            observed: observed.cloned().unwrap_or(Value::Null),
        });
        0.0
    }

    fn alternatives(&self, path: &FieldPath) -> &'a [Value] {
        let equivalents: &'a BTreeMap<String, Vec<Value>> = self.equivalents;
        equivalents.get(&path.to_string()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Weighted mean over declared fields; undeclared observed keys are ignored
    fn fields(
        &mut self,
        fields: &[Field],
        expected: &Map<String, Value>,
        observed: &Map<String, Value>,
        path: &FieldPath,
    ) -> Result<f64, SchemaError> {
        let mut total_weight = 0.0;
        let mut weighted = 0.0;
        for field in fields {
            let field_path = path.child(&field.name);
            let score = self.field(
                field,
                expected.get(&field.name),
                observed.get(&field.name),
                &field_path,
            )?;
            weighted += field.weight * score;
            total_weight += field.weight;
        }
        if total_weight == 0.0 { Ok(1.0) } else { Ok(weighted / total_weight) }
    }

    fn field(
        &mut self,
        field: &Field,
        expected: Option<&Value>,
        observed: Option<&Value>,
        path: &FieldPath,
    ) -> Result<f64, SchemaError> {
        let expected = present(expected).or(field.default.as_ref());
        let observed = present(observed).or(field.default.as_ref());
        let tolerance = field.tolerance;

        match (expected, observed) {
            (None, None) => Ok(1.0),
            (None, Some(_)) if field.is_required() => {
                Err(SchemaError::MissingExpectedField { path: path.to_string() })
            }
            (None, Some(o)) => Ok(self.mismatch(path, MismatchKind::Unexpected, None, Some(o))),
            (Some(e), None) => Ok(self.mismatch(path, MismatchKind::Missing, Some(e), None)),
            (Some(e), Some(o)) => self.value(&field.shape, e, o, path, tolerance),
        }
    }

    fn value(
        &mut self,
        shape: &ShapeDescriptor,
        expected: &Value,
        observed: &Value,
        path: &FieldPath,
        tolerance: Option<f64>,
    ) -> Result<f64, SchemaError> {
        match shape {
            ShapeDescriptor::Optional { inner } => {
                match (expected.is_null(), observed.is_null()) {
                    (true, true) => Ok(1.0),
                    (true, false) => {
                        Ok(self.mismatch(path, MismatchKind::Unexpected, None, Some(observed)))
                    }
                    (false, true) => {
                        Ok(self.mismatch(path, MismatchKind::Missing, Some(expected), None))
                    }
                    (false, false) => self.value(inner, expected, observed, path, tolerance),
                }
            }
            ShapeDescriptor::Primitive { kind } => {
                Ok(self.primitive(*kind, expected, observed, path, tolerance))
            }
            ShapeDescriptor::List { items } => {
                let Some(expected_items) = expected.as_array() else {
                    return Err(expected_shape(path, "list"));
                };
                let Some(observed_items) = observed.as_array() else {
                    return Ok(self.structural(path, expected, observed));
                };
                self.sequence(expected_items, observed_items, path, |walk, e, o, p| {
                    walk.value(items, e, o, p, tolerance)
                })
            }
            ShapeDescriptor::Object { fields } => {
                let Some(expected_map) = expected.as_object() else {
                    return Err(expected_shape(path, "object"));
                };
                let Some(observed_map) = observed.as_object() else {
                    return Ok(self.structural(path, expected, observed));
                };
                self.fields(fields, expected_map, observed_map, path)
            }
            ShapeDescriptor::Union(union) => {
                let Some(expected_map) = expected.as_object() else {
                    return Err(expected_shape(path, "object"));
                };
                let expected_variant = union.variant_for(expected, path)?;
                let Some(observed_map) = observed.as_object() else {
                    return Ok(self.structural(path, expected, observed));
                };
                let Ok(observed_variant) = union.variant_for(observed, path) else {
                    return Ok(self.structural(path, expected, observed));
                };

                if observed_variant.tag != expected_variant.tag {
                    let tag_path = path.child(&union.discriminator);
                    return Ok(self.mismatch(
                        &tag_path,
                        MismatchKind::WrongVariant,
                        expected_map.get(&union.discriminator),
                        observed_map.get(&union.discriminator),
                    ));
                }
                self.fields(
                    expected_variant.fields(),
                    expected_map,
                    observed_map,
                    &path.variant(&expected_variant.tag),
                )
            }
        }
    }

    fn structural(&mut self, path: &FieldPath, expected: &Value, observed: &Value) -> f64 {
        self.mismatch(path, MismatchKind::StructuralMismatch, Some(expected), Some(observed))
    }

    fn primitive(
        &mut self,
        kind: PrimitiveKind,
        expected: &Value,
        observed: &Value,
        path: &FieldPath,
        tolerance: Option<f64>,
    ) -> f64 {
        let alternatives = self.alternatives(path);

        if kind == PrimitiveKind::Any {
            if alternatives.contains(observed) {
                return 1.0;
            }
            return self.generic(expected, observed, path, tolerance);
        }
        if !kind.accepts(observed) {
            return self.structural(path, expected, observed);
        }

        let matches = |candidate: &Value| self.leaf_matches(kind, candidate, observed, tolerance);
        if matches(expected) || alternatives.iter().any(matches) {
            1.0
        } else {
            self.mismatch(path, MismatchKind::ValueDiffers, Some(expected), Some(observed))
        }
    }

    fn leaf_matches(
        &self,
        kind: PrimitiveKind,
        expected: &Value,
        observed: &Value,
        tolerance: Option<f64>,
    ) -> bool {
        if kind.is_numeric() {
            let integer = kind == PrimitiveKind::Integer;
            return self.numbers_match(integer, expected, observed, tolerance);
        }
        match (expected.as_str(), observed.as_str()) {
            (Some(e), Some(o)) => self.strings_match(e, o),
            _ => expected == observed,
        }
    }

    /// Integers compare exactly unless the field declares a tolerance;
    /// everything else within the relative tolerance
    fn numbers_match(
        &self,
        integer: bool,
        expected: &Value,
        observed: &Value,
        tolerance: Option<f64>,
    ) -> bool {
        if integer && tolerance.is_none() {
            return integers_equal(expected, observed);
        }
        match (expected.as_f64(), observed.as_f64()) {
            (Some(e), Some(o)) => within(e, o, tolerance.unwrap_or(self.epsilon)),
            _ => false,
        }
    }

    fn strings_match(&self, expected: &str, observed: &str) -> bool {
        if expected == observed {
            return true;
        }
        self.normalize_dates
            && temporal::parse(expected).is_some()
            && temporal::equivalent(expected, observed)
    }

    /// Position-wise comparison over `max(expected, observed)` slots
    fn sequence<E, F>(
        &mut self,
        expected: &[Value],
        observed: &[Value],
        path: &FieldPath,
        mut element: F,
    ) -> Result<f64, E>
    where
        F: FnMut(&mut Self, &Value, &Value, &FieldPath) -> Result<f64, E>,
    {
        let slots = expected.len().max(observed.len());
        if slots == 0 {
            return Ok(1.0);
        }

        let mut total = 0.0;
        for i in 0..slots {
            let item_path = path.index(i);
            total += match (expected.get(i), observed.get(i)) {
                (Some(e), Some(o)) => element(self, e, o, &item_path)?,
                (Some(e), None) => self.mismatch(&item_path, MismatchKind::Missing, Some(e), None),
                (None, Some(o)) => {
                    self.mismatch(&item_path, MismatchKind::Unexpected, None, Some(o))
                }
                (None, None) => 0.0,
            };
        }
        Ok(total / slots as f64)
    }

    /// Graded comparison for free-form values with no declared shape
    fn generic(
        &mut self,
        expected: &Value,
        observed: &Value,
        path: &FieldPath,
        tolerance: Option<f64>,
    ) -> f64 {
        match (expected, observed) {
            (Value::Object(expected_map), Value::Object(observed_map)) => {
                if expected_map.is_empty() {
                    return 1.0;
                }
                let mut total = 0.0;
                for (key, e) in expected_map {
                    let key_path = path.child(key);
                    let o = present(observed_map.get(key));
                    total += match (e.is_null(), o) {
                        (true, None) => 1.0,
                        (true, Some(o)) => {
                            self.mismatch(&key_path, MismatchKind::Unexpected, None, Some(o))
                        }
                        (false, None) => {
                            self.mismatch(&key_path, MismatchKind::Missing, Some(e), None)
                        }
                        (false, Some(o)) => self.generic(e, o, &key_path, tolerance),
                    };
                }
                total / expected_map.len() as f64
            }
            (Value::Array(expected_items), Value::Array(observed_items)) => {
                let scored = self.sequence(expected_items, observed_items, path, |walk, e, o, p| {
                    Ok::<_, Infallible>(walk.generic(e, o, p, tolerance))
                });
                match scored {
                    Ok(score) => score,
                    Err(never) => match never {},
                }
            }
            (Value::Number(_), Value::Number(_)) => {
                let integer = is_integral(expected) && is_integral(observed);
                if self.numbers_match(integer, expected, observed, tolerance) {
                    1.0
                } else {
                    self.mismatch(path, MismatchKind::ValueDiffers, Some(expected), Some(observed))
                }
            }
            (Value::String(e), Value::String(o)) if self.strings_match(e, o) => 1.0,
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
                self.structural(path, expected, observed)
            }
            _ if expected == observed => 1.0,
            _ => self.mismatch(path, MismatchKind::ValueDiffers, Some(expected), Some(observed)),
        }
    }
}

fn expected_shape(path: &FieldPath, expected: &str) -> SchemaError {
    SchemaError::ExpectedShape { path: path.to_string(), expected: expected.to_string() }
}
