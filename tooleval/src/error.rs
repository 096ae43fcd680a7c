//! Error types for the evaluation harness
//!
//! Two layers: [`SchemaError`] covers schema and test-authoring defects, while
//! [`EvalError`] covers everything else a harness operation can fail with.
//! Neither is used for "the model got it wrong"; those outcomes are scores.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Schema or test-definition defects.
///
/// These are never silently scored as a model failure. The comparator surfaces
/// them for problems on the expected side; on the observed side the same
/// conditions become a structural mismatch instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// No tool with this name is registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Two tools share a name
    #[error("Duplicate tool definition: {0}")]
    DuplicateTool(String),

    /// Two fields of one object share a name
    #[error("Duplicate field '{field}' at {path}")]
    DuplicateField { path: String, field: String },

    /// A union declares no variants
    #[error("Union at {path} declares no variants")]
    EmptyUnion { path: String },

    /// Two variants of a union share a discriminator value
    #[error("Duplicate variant '{tag}' at {path}")]
    DuplicateVariant { path: String, tag: String },

    /// A union variant is not an object shape
    #[error("Variant '{tag}' at {path} must be an object")]
    VariantNotObject { path: String, tag: String },

    /// Field weights must be finite and positive
    #[error("Invalid weight {weight} for field at {path}")]
    InvalidWeight { path: String, weight: f64 },

    /// A discriminator value names no declared variant
    #[error("Unknown variant '{value}' for discriminator '{discriminator}' at {path}")]
    UnknownVariant { path: String, discriminator: String, value: String },

    /// A union value carries no usable discriminator
    #[error("Missing discriminator '{discriminator}' at {path}")]
    MissingDiscriminator { path: String, discriminator: String },

    /// A required field is absent from the expected test definition
    #[error("Required field missing from expected arguments at {path}")]
    MissingExpectedField { path: String },

    /// The expected value does not fit its declared shape
    #[error("Expected value at {path} is not a valid {expected}")]
    ExpectedShape { path: String, expected: String },

    /// A path does not lead anywhere in the schema
    #[error("Path does not resolve: {path}")]
    UnresolvedPath { path: String },

    /// A path crosses a union without naming the variant
    #[error("Path crosses a union without selecting a variant: {path}")]
    VariantRequired { path: String },

    /// A path string could not be parsed
    #[error("Invalid field path: {0}")]
    InvalidPath(String),

    /// An argument tree fails structural validation
    #[error("Invalid arguments at {path}: {reason}")]
    Validation { path: String, reason: String },
}

/// Errors that can occur during evaluation
#[derive(Error, Debug)]
pub enum EvalError {
    /// Schema or test-definition defect
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The per-case time budget ran out
    #[error("Model collaborator timed out after {timeout:?}")]
    CollaboratorTimeout { timeout: Duration },

    /// Every attempt returned nothing usable
    #[error("Model collaborator exhausted after {attempts} attempt(s): {last_error}")]
    CollaboratorExhausted { attempts: u32, last_error: String },

    /// The collaborator itself failed
    #[error("Model collaborator error: {0}")]
    Collaborator(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to load a case or schema file
    #[error("Failed to load: {0}")]
    LoadError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EvalError {
    /// Whether this error is fatal for a whole run rather than local to one case
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::Config(_)
                | EvalError::LoadError(_)
                | EvalError::Io(_)
                | EvalError::Json(_)
                | EvalError::Toml(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::UnknownVariant {
            path: "action".to_string(),
            discriminator: "action_type".to_string(),
            value: "archive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown variant 'archive' for discriminator 'action_type' at action"
        );
    }

    #[test]
    fn test_schema_error_converts() {
        let err: EvalError = SchemaError::UnknownTool("get_weather".to_string()).into();
        assert!(matches!(err, EvalError::Schema(SchemaError::UnknownTool(_))));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EvalError::Config("no tools".to_string()).is_fatal());
        assert!(
            !EvalError::CollaboratorExhausted { attempts: 3, last_error: "empty".to_string() }
                .is_fatal()
        );
    }
}
