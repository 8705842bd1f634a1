use bastion_restrictions::RestrictionError;
use serde::Serialize;
use thiserror::Error;

/// One offending input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Request field name; list elements are indexed, e.g. `whitelist_ip[1]`.
    pub field: String,
    /// Stable machine-readable reason, e.g. `blank`, `invalid`.
    pub error: String,
}

/// Field-level validation failures collected from a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, error: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            error: error.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{} {}", e.field, e.error))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors returned by the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The requested job type is not in the supported set.
    #[error("Invalid job type: {value}")]
    InvalidType { value: String },

    /// One or more request fields failed validation. Nothing was written.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Failure inside the restriction store.
    #[error("Restriction store error: {0}")]
    Restriction(#[from] RestrictionError),
}

impl SchedulerError {
    /// Short error code string reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidType { .. } => "INVALID_TYPE",
            SchedulerError::Validation(_) => "VALIDATION_ERROR",
            SchedulerError::Store(_) | SchedulerError::Restriction(_) => "STORE_ERROR",
        }
    }

    /// Caller-facing body. Validation failures carry per-field detail;
    /// infrastructure failures stay opaque.
    pub fn client_payload(&self) -> serde_json::Value {
        match self {
            SchedulerError::InvalidType { value } => serde_json::json!({
                "code": self.code(),
                "errors": [{ "field": "type", "error": "invalid_type" }],
                "message": format!("unsupported job type: {value}"),
            }),
            SchedulerError::Validation(errors) => serde_json::json!({
                "code": self.code(),
                "errors": errors,
            }),
            SchedulerError::Store(_) | SchedulerError::Restriction(_) => serde_json::json!({
                "code": self.code(),
                "message": "internal error",
            }),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
