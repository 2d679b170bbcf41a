//! Manifest validation utilities.

use crate::manifest::Manifest;
use crate::schema;
use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

/// Schema major version this build reads natively. Newer majors are
/// accepted with a warning, never rejected.
pub const SUPPORTED_SCHEMA_MAJOR: u64 = 1;

/// Validation error type.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Schema validation failed: {0}")]
    SchemaError(String),

    #[error("Missing required file: {0}")]
    MissingFile(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Unparseable schema version: {0}")]
    BadSchemaVersion(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result of manifest validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Validate a manifest JSON value against the embedded schema.
pub fn validate_manifest_value(manifest: &Value) -> Result<ValidationResult, ValidationError> {
    let mut result = ValidationResult::new();

    let schema_value = schema::manifest_schema();
    let compiled = JSONSchema::compile(&schema_value)
        .map_err(|e| ValidationError::SchemaError(e.to_string()))?;

    if let Err(errors) = compiled.validate(manifest) {
        for error in errors {
            result.add_error(ValidationError::SchemaError(format!(
                "{} at {}",
                error, error.instance_path
            )));
        }
    }

    Ok(result)
}

/// Validate a typed manifest: schema conformance plus version compatibility.
pub fn validate_manifest(manifest: &Manifest) -> Result<ValidationResult, ValidationError> {
    let value = serde_json::to_value(manifest)?;
    let mut result = validate_manifest_value(&value)?;

    match manifest.schema_major() {
        Some(major) if major > SUPPORTED_SCHEMA_MAJOR => {
            result.add_warning(format!(
                "archive uses manifest schema {} (newer than supported {}.x); \
                 proceeding, but unknown fields will be ignored",
                manifest.schema_version, SUPPORTED_SCHEMA_MAJOR
            ));
        }
        Some(_) => {}
        None => {
            result.add_error(ValidationError::BadSchemaVersion(
                manifest.schema_version.clone(),
            ));
        }
    }

    Ok(result)
}
