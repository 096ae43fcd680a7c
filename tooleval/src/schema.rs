//! Tool schema model
//!
//! A [`ToolSchema`] describes a tool's parameters as a tree of
//! [`ShapeDescriptor`]s: primitives, optionals, lists, objects and
//! discriminated unions. The same tree drives the request sent to the model
//! and guides the comparator when it walks expected and observed arguments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;
use crate::temporal;

/// Leaf value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    /// Case-sensitive string
    String,
    /// Whole number, compared exactly
    Integer,
    /// Any number, compared with relative tolerance
    Number,
    /// Boolean
    Boolean,
    /// ISO-8601 date (`YYYY-MM-DD`)
    Date,
    /// ISO-8601 date-time
    DateTime,
    /// Arbitrary JSON (free-form maps and the like)
    Any,
}

impl PrimitiveKind {
    /// Whether a JSON value has this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            PrimitiveKind::String => value.is_string(),
            PrimitiveKind::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.is_finite() && n.fract() == 0.0)
            }
            PrimitiveKind::Number => value.is_number(),
            PrimitiveKind::Boolean => value.is_boolean(),
            PrimitiveKind::Date | PrimitiveKind::DateTime => {
                value.as_str().is_some_and(|s| temporal::parse(s).is_some())
            }
            PrimitiveKind::Any => true,
        }
    }

    /// Whether values of this kind are compared numerically
    pub fn is_numeric(&self) -> bool {
        matches!(self, PrimitiveKind::Integer | PrimitiveKind::Number)
    }

    /// Whether values of this kind are compared after date normalization
    pub fn is_temporal(&self) -> bool {
        matches!(self, PrimitiveKind::Date | PrimitiveKind::DateTime)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Date => "date",
            PrimitiveKind::DateTime => "date_time",
            PrimitiveKind::Any => "any",
        }
    }
}

/// Shape of an argument value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescriptor {
    /// A leaf value
    Primitive { kind: PrimitiveKind },
    /// A value that may be omitted or null
    Optional { inner: Box<ShapeDescriptor> },
    /// An ordered sequence
    List { items: Box<ShapeDescriptor> },
    /// A keyed mapping with declared fields
    Object { fields: Vec<Field> },
    /// A discriminated union of object variants
    Union(UnionShape),
}

/// Shape reported for a union's discriminator field
pub(crate) static DISCRIMINATOR_SHAPE: ShapeDescriptor =
    ShapeDescriptor::Primitive { kind: PrimitiveKind::String };

impl ShapeDescriptor {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        ShapeDescriptor::Primitive { kind }
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn integer() -> Self {
        Self::primitive(PrimitiveKind::Integer)
    }

    pub fn number() -> Self {
        Self::primitive(PrimitiveKind::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveKind::Boolean)
    }

    pub fn date() -> Self {
        Self::primitive(PrimitiveKind::Date)
    }

    pub fn date_time() -> Self {
        Self::primitive(PrimitiveKind::DateTime)
    }

    pub fn any() -> Self {
        Self::primitive(PrimitiveKind::Any)
    }

    pub fn optional(inner: ShapeDescriptor) -> Self {
        ShapeDescriptor::Optional { inner: Box::new(inner) }
    }

    pub fn list(items: ShapeDescriptor) -> Self {
        ShapeDescriptor::List { items: Box::new(items) }
    }

    pub fn object(fields: Vec<Field>) -> Self {
        ShapeDescriptor::Object { fields }
    }

    pub fn union(discriminator: &str, variants: Vec<Variant>) -> Self {
        ShapeDescriptor::Union(UnionShape {
            discriminator: discriminator.to_string(),
            variants,
        })
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ShapeDescriptor::Optional { .. })
    }

    /// Short name used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            ShapeDescriptor::Primitive { kind } => kind.as_str().to_string(),
            ShapeDescriptor::Optional { inner } => format!("optional<{}>", inner.describe()),
            ShapeDescriptor::List { items } => format!("list<{}>", items.describe()),
            ShapeDescriptor::Object { .. } => "object".to_string(),
            ShapeDescriptor::Union(u) => format!("union<{}>", u.discriminator),
        }
    }

    /// JSON Schema for values of this shape.
    ///
    /// Optionals render as their inner shape (absence is expressed by the
    /// enclosing `required` list), unions as `oneOf` with a `const`
    /// discriminator per variant.
    pub fn to_json_schema(&self) -> Value {
        match self {
            ShapeDescriptor::Primitive { kind } => match kind {
                PrimitiveKind::String => json!({"type": "string"}),
                PrimitiveKind::Integer => json!({"type": "integer"}),
                PrimitiveKind::Number => json!({"type": "number"}),
                PrimitiveKind::Boolean => json!({"type": "boolean"}),
                PrimitiveKind::Date => json!({"type": "string", "format": "date"}),
                PrimitiveKind::DateTime => json!({"type": "string", "format": "date-time"}),
                PrimitiveKind::Any => json!({}),
            },
            ShapeDescriptor::Optional { inner } => inner.to_json_schema(),
            ShapeDescriptor::List { items } => {
                json!({"type": "array", "items": items.to_json_schema()})
            }
            ShapeDescriptor::Object { fields } => object_schema(fields, None),
            ShapeDescriptor::Union(union) => {
                let discriminator = union.discriminator.as_str();
                let variants: Vec<Value> = union
                    .variants
                    .iter()
                    .map(|v| object_schema(v.fields(), Some((discriminator, v.tag.as_str()))))
                    .collect();
                json!({"oneOf": variants})
            }
        }
    }

    fn validate(&self, path: &FieldPath) -> Result<(), SchemaError> {
        match self {
            ShapeDescriptor::Primitive { .. } => Ok(()),
            ShapeDescriptor::Optional { inner } => inner.validate(path),
            ShapeDescriptor::List { items } => items.validate(&path.index(0)),
            ShapeDescriptor::Object { fields } => validate_fields(fields, path),
            ShapeDescriptor::Union(union) => union.validate(path),
        }
    }
}

/// A named field of an object, variant or tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub shape: ShapeDescriptor,
    /// Relative weight inside the enclosing object's mean
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Relative tolerance for numeric comparison, overriding the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Value assumed when the field is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn default_weight() -> f64 {
    1.0
}

impl Field {
    pub fn new(name: &str, shape: ShapeDescriptor) -> Self {
        Self {
            name: name.to_string(),
            shape,
            weight: 1.0,
            tolerance: None,
            default: None,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// A field is required unless it is optional or declares a default
    pub fn is_required(&self) -> bool {
        !self.shape.is_optional() && self.default.is_none()
    }

    /// The field's shape schema with its description and default attached
    pub fn to_json_schema(&self) -> Value {
        let mut schema = self.shape.to_json_schema();
        if let Value::Object(map) = &mut schema {
            if !self.description.is_empty() {
                map.insert("description".to_string(), json!(self.description));
            }
            if let Some(default) = self.default.as_ref().filter(|d| !d.is_null()) {
                map.insert("default".to_string(), default.clone());
            }
        }
        schema
    }
}

fn object_schema(fields: &[Field], discriminator: Option<(&str, &str)>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    if let Some((name, tag)) = discriminator {
        properties.insert(name.to_string(), json!({"type": "string", "const": tag}));
        required.push(Value::String(name.to_string()));
    }
    for field in fields {
        properties.insert(field.name.clone(), field.to_json_schema());
        if field.is_required() {
            required.push(Value::String(field.name.clone()));
        }
    }
    json!({"type": "object", "properties": properties, "required": required})
}

fn validate_fields(fields: &[Field], path: &FieldPath) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                path: path.to_string(),
                field: field.name.clone(),
            });
        }
        let field_path = path.child(&field.name);
        if !field.weight.is_finite() || field.weight <= 0.0 {
            return Err(SchemaError::InvalidWeight {
                path: field_path.to_string(),
                weight: field.weight,
            });
        }
        if field.tolerance.is_some_and(|t| !t.is_finite() || t < 0.0) {
            return Err(SchemaError::Validation {
                path: field_path.to_string(),
                reason: "tolerance must be a finite non-negative number".to_string(),
            });
        }
        field.shape.validate(&field_path)?;
    }
    Ok(())
}

/// One variant of a discriminated union
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Literal value of the discriminator selecting this variant
    pub tag: String,
    /// The variant's own field set; always an object shape
    pub shape: ShapeDescriptor,
}

impl Variant {
    pub fn new(tag: &str, fields: Vec<Field>) -> Self {
        Self { tag: tag.to_string(), shape: ShapeDescriptor::Object { fields } }
    }

    pub fn fields(&self) -> &[Field] {
        match &self.shape {
            ShapeDescriptor::Object { fields } => fields,
            _ => &[],
        }
    }
}

/// A union of object variants selected by a literal discriminator field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionShape {
    pub discriminator: String,
    pub variants: Vec<Variant>,
}

impl UnionShape {
    pub fn variant(&self, tag: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.tag == tag)
    }

    /// Select the variant named by a value's discriminator field.
    pub fn variant_for(&self, value: &Value, path: &FieldPath) -> Result<&Variant, SchemaError> {
        let tag = value.get(&self.discriminator).and_then(Value::as_str).ok_or_else(|| {
            SchemaError::MissingDiscriminator {
                path: path.to_string(),
                discriminator: self.discriminator.clone(),
            }
        })?;
        self.variant(tag).ok_or_else(|| SchemaError::UnknownVariant {
            path: path.to_string(),
            discriminator: self.discriminator.clone(),
            value: tag.to_string(),
        })
    }

    fn validate(&self, path: &FieldPath) -> Result<(), SchemaError> {
        if self.variants.is_empty() {
            return Err(SchemaError::EmptyUnion { path: path.to_string() });
        }
        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.tag.as_str()) {
                return Err(SchemaError::DuplicateVariant {
                    path: path.to_string(),
                    tag: variant.tag.clone(),
                });
            }
            let ShapeDescriptor::Object { fields } = &variant.shape else {
                return Err(SchemaError::VariantNotObject {
                    path: path.to_string(),
                    tag: variant.tag.clone(),
                });
            };
            validate_fields(fields, &path.variant(&variant.tag))?;
        }
        Ok(())
    }
}

/// A tool definition: a name plus an ordered parameter list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Complexity tier the tool belongs to (0 when untiered)
    #[serde(default)]
    pub tier: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Field>,
}

impl ToolSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            tier: 0,
            tags: vec![],
            parameters: vec![],
        }
    }

    #[must_use]
    pub fn with_param(mut self, field: Field) -> Self {
        self.parameters.push(field);
        self
    }

    #[must_use]
    pub fn with_tier(mut self, tier: u32) -> Self {
        self.tier = tier;
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn param(&self, name: &str) -> Option<&Field> {
        self.parameters.iter().find(|f| f.name == name)
    }

    /// Check the schema is well formed
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::Validation {
                path: "$".to_string(),
                reason: "tool name must not be empty".to_string(),
            });
        }
        validate_fields(&self.parameters, &FieldPath::root())
    }

    /// Resolve a parameter path to the shape found there.
    ///
    /// Optional wrappers are looked through. Crossing a union requires a
    /// variant segment, except for the union's own discriminator field.
    pub fn resolve(&self, path: &FieldPath) -> Result<&ShapeDescriptor, SchemaError> {
        let mut segments = path.segments().iter();
        let Some(PathSegment::Field(first)) = segments.next() else {
            return Err(SchemaError::UnresolvedPath { path: path.to_string() });
        };
        let mut current = self
            .param(first)
            .map(|f| &f.shape)
            .ok_or_else(|| SchemaError::UnresolvedPath { path: path.to_string() })?;

        for segment in segments {
            current = step(current, segment, path)?;
        }
        Ok(current)
    }

    /// Resolve a path given in display form, e.g. `action(delete).resource_id`
    pub fn resolve_str(&self, path: &str) -> Result<&ShapeDescriptor, SchemaError> {
        self.resolve(&path.parse()?)
    }

    /// Check that an expected argument tree is a valid test definition.
    ///
    /// Missing required fields and shape violations are authoring defects.
    pub fn check_expected(&self, args: &Value) -> Result<(), SchemaError> {
        Conformance::Expected.check_params(&self.parameters, args, &FieldPath::root())
    }

    /// JSON Schema of the parameter object
    pub fn to_json_schema(&self) -> Value {
        object_schema(&self.parameters, None)
    }

    /// The tool in the function-calling format most chat APIs accept
    pub fn to_function_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.to_json_schema(),
            }
        })
    }

    /// Structural validation of observed arguments against this schema.
    ///
    /// Extra keys are ignored; required fields must be present and every
    /// present value must fit its shape.
    pub fn check_arguments(&self, args: &Value) -> Result<(), SchemaError> {
        Conformance::Observed.check_params(&self.parameters, args, &FieldPath::root())
    }
}

fn step<'a>(
    shape: &'a ShapeDescriptor,
    segment: &PathSegment,
    path: &FieldPath,
) -> Result<&'a ShapeDescriptor, SchemaError> {
    match (shape, segment) {
        (ShapeDescriptor::Optional { inner }, _) => step(inner, segment, path),
        (ShapeDescriptor::List { items }, PathSegment::Index(_)) => Ok(items),
        (ShapeDescriptor::Object { fields }, PathSegment::Field(name)) => fields
            .iter()
            .find(|f| &f.name == name)
            .map(|f| &f.shape)
            .ok_or_else(|| SchemaError::UnresolvedPath { path: path.to_string() }),
        (ShapeDescriptor::Union(union), PathSegment::Variant(tag)) => {
            union.variant(tag).map(|v| &v.shape).ok_or_else(|| SchemaError::UnknownVariant {
                path: path.to_string(),
                discriminator: union.discriminator.clone(),
                value: tag.clone(),
            })
        }
        (ShapeDescriptor::Union(union), PathSegment::Field(name))
            if *name == union.discriminator =>
        {
            Ok(&DISCRIMINATOR_SHAPE)
        }
        (ShapeDescriptor::Union(_), PathSegment::Field(_)) => {
            Err(SchemaError::VariantRequired { path: path.to_string() })
        }
        _ => Err(SchemaError::UnresolvedPath { path: path.to_string() }),
    }
}

/// Which side of a comparison a tree comes from; decides the error reported
#[derive(Clone, Copy)]
enum Conformance {
    Expected,
    Observed,
}

impl Conformance {
    fn check_params(
        self,
        fields: &[Field],
        value: &Value,
        path: &FieldPath,
    ) -> Result<(), SchemaError> {
        let Some(map) = value.as_object() else {
            return Err(self.shape_error(path, "object"));
        };
        for field in fields {
            let field_path = path.child(&field.name);
            match map.get(&field.name).filter(|v| !v.is_null()) {
                Some(v) => self.check_value(&field.shape, v, &field_path)?,
                None if field.is_required() => return Err(self.missing(&field_path)),
                None => {}
            }
        }
        Ok(())
    }

    fn check_value(
        self,
        shape: &ShapeDescriptor,
        value: &Value,
        path: &FieldPath,
    ) -> Result<(), SchemaError> {
        match shape {
            ShapeDescriptor::Optional { inner } => {
                if value.is_null() {
                    Ok(())
                } else {
                    self.check_value(inner, value, path)
                }
            }
            ShapeDescriptor::Primitive { kind } => {
                if kind.accepts(value) {
                    Ok(())
                } else {
                    Err(self.shape_error(path, kind.as_str()))
                }
            }
            ShapeDescriptor::List { items } => {
                let Some(elements) = value.as_array() else {
                    return Err(self.shape_error(path, "list"));
                };
                for (i, element) in elements.iter().enumerate() {
                    self.check_value(items, element, &path.index(i))?;
                }
                Ok(())
            }
            ShapeDescriptor::Object { fields } => self.check_params(fields, value, path),
            ShapeDescriptor::Union(union) => {
                if !value.is_object() {
                    return Err(self.shape_error(path, "object"));
                }
                let variant = union.variant_for(value, path)?;
                self.check_params(variant.fields(), value, &path.variant(&variant.tag))
            }
        }
    }

    fn missing(self, path: &FieldPath) -> SchemaError {
        match self {
            Conformance::Expected => SchemaError::MissingExpectedField { path: path.to_string() },
            Conformance::Observed => SchemaError::Validation {
                path: path.to_string(),
                reason: "required field is missing".to_string(),
            },
        }
    }

    fn shape_error(self, path: &FieldPath, expected: &str) -> SchemaError {
        match self {
            Conformance::Expected => SchemaError::ExpectedShape {
                path: path.to_string(),
                expected: expected.to_string(),
            },
            Conformance::Observed => SchemaError::Validation {
                path: path.to_string(),
                reason: format!("expected {expected}"),
            },
        }
    }
}

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Named field of an object or variant
    Field(String),
    /// Position in a list
    Index(usize),
    /// Union variant selected by its discriminator value
    Variant(String),
}

/// Location of a value inside an argument tree.
///
/// Displayed as `customer.email`, `items[1].quantity` or
/// `action(delete).resource_id`; the root is `$`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    fn with(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn child(&self, name: &str) -> Self {
        self.with(PathSegment::Field(name.to_string()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with(PathSegment::Index(index))
    }

    pub fn variant(&self, tag: &str) -> Self {
        self.with(PathSegment::Variant(tag.to_string()))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Variant(tag) => write!(f, "({tag})")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidPath(s.to_string());
        if s.is_empty() || s == "$" {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        let mut rest = s;
        let mut expect_name = true;

        while !rest.is_empty() {
            if expect_name {
                let end = rest.find(&['.', '[', '(', ')', ']'][..]).unwrap_or(rest.len());
                if end == 0 {
                    return Err(invalid());
                }
                segments.push(PathSegment::Field(rest[..end].to_string()));
                rest = &rest[end..];
                expect_name = false;
                continue;
            }

            let (open, close) = match rest.as_bytes()[0] {
                b'.' => {
                    rest = &rest[1..];
                    if rest.is_empty() {
                        return Err(invalid());
                    }
                    expect_name = true;
                    continue;
                }
                b'[' => ('[', ']'),
                b'(' => ('(', ')'),
                _ => return Err(invalid()),
            };
            let end = rest.find(close).ok_or_else(invalid)?;
            let inner = &rest[open.len_utf8()..end];
            if inner.is_empty() {
                return Err(invalid());
            }
            segments.push(if open == '[' {
                PathSegment::Index(inner.parse().map_err(|_| invalid())?)
            } else {
                PathSegment::Variant(inner.to_string())
            });
            rest = &rest[end + 1..];
        }

        Ok(Self(segments))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
