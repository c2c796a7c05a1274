//! Error types for continuity

use thiserror::Error;

/// Result type alias for continuity operations
pub type Result<T> = std::result::Result<T, ContinuityError>;

/// Main error type for continuity
#[derive(Error, Debug)]
pub enum ContinuityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Embedder init error: {0}")]
    EmbedderInit(String),

    #[error("Embedder inference error: {0}")]
    EmbedderInference(String),

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("Curator timed out after {0}s")]
    CuratorTimeout(u64),

    #[error("Curator output parse error: {0}")]
    CuratorParse(String),

    #[error("Curator agent failure: {0}")]
    CuratorFailure(String),

    #[error("Manager timed out after {0}s")]
    ManagerTimeout(u64),

    #[error("Manager report parse error: {0}")]
    ManagerParse(String),

    #[error("Manager agent failure: {0}")]
    ManagerFailure(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frontmatter error: {0}")]
    Frontmatter(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl ContinuityError {
    /// Stable machine-readable kind for HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ContinuityError::Io(_) => "store_io",
            ContinuityError::Schema(_) | ContinuityError::Frontmatter(_) => "store_schema",
            ContinuityError::NotFound(_) => "store_not_found",
            ContinuityError::Conflict(_) => "store_conflict",
            ContinuityError::EmbedderInit(_) => "embedder_init",
            ContinuityError::EmbedderInference(_) => "embedder_inference",
            ContinuityError::InvalidTransition { .. } => "lifecycle_invalid_transition",
            ContinuityError::MissingReference(_) => "lifecycle_missing_reference",
            ContinuityError::CuratorTimeout(_) => "curator_timeout",
            ContinuityError::CuratorParse(_) => "curator_parse",
            ContinuityError::CuratorFailure(_) => "curator_agent_failure",
            ContinuityError::ManagerTimeout(_) => "manager_timeout",
            ContinuityError::ManagerParse(_) => "manager_parse",
            ContinuityError::ManagerFailure(_) => "manager_agent_failure",
            ContinuityError::Validation(_) => "bad_request",
            ContinuityError::Serialization(_) => "internal",
            ContinuityError::Config(_) => "config",
        }
    }

    /// HTTP status code this error maps to at the server boundary
    pub fn status_code(&self) -> u16 {
        match self {
            ContinuityError::Validation(_) => 400,
            ContinuityError::NotFound(_) => 404,
            ContinuityError::Conflict(_) => 409,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ContinuityError::Validation("missing session_id".into());
        assert_eq!(err.kind(), "bad_request");
        assert_eq!(err.status_code(), 400);

        let err = ContinuityError::Schema("bad frontmatter".into());
        assert_eq!(err.kind(), "store_schema");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_transition_message() {
        let err = ContinuityError::InvalidTransition {
            from: "superseded".into(),
            to: "active".into(),
        };
        assert!(err.to_string().contains("superseded -> active"));
    }
}
