use goldi_storage::StorageError;

use crate::stage::Stage;

/// Every way a workflow or curation operation can fail.
///
/// A run that fails with anything other than `PersistenceFailure` has made
/// no writes. `PersistenceFailure` means the storage snapshot was aborted,
/// so nothing was half-applied either.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A required upstream entity is absent. Raised before any generation.
    #[error("{message}")]
    MissingPrecondition { code: &'static str, message: String },

    /// The request itself is unusable (blank input, unknown ids).
    #[error("{message}")]
    InvalidRequest { code: &'static str, message: String },

    /// The request conflicts with stored state.
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// Another run holds the same scope.
    #[error("another run is in progress for {scope}")]
    ScopeBusy { scope: String },

    /// The generation capability failed (transport or model error).
    #[error("generation failed at {stage}: {message}")]
    GenerationFailure { stage: Stage, message: String },

    /// The generation capability answered with something unusable.
    #[error("malformed response at {stage}: {message}")]
    MalformedResponse { stage: Stage, message: String },

    /// A store read or write failed.
    #[error("persistence failed: {0}")]
    PersistenceFailure(#[from] StorageError),
}

impl WorkflowError {
    pub(crate) fn missing(code: &'static str, message: impl Into<String>) -> Self {
        WorkflowError::MissingPrecondition {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        WorkflowError::InvalidRequest {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(stage: Stage, message: impl Into<String>) -> Self {
        WorkflowError::MalformedResponse {
            stage,
            message: message.into(),
        }
    }

    /// Machine-readable error code for the `{error: {code}}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::MissingPrecondition { code, .. }
            | WorkflowError::InvalidRequest { code, .. }
            | WorkflowError::Conflict { code, .. } => *code,
            WorkflowError::ScopeBusy { .. } => "SCOPE_BUSY",
            WorkflowError::GenerationFailure { .. } => "GENERATION_FAILED",
            WorkflowError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            WorkflowError::PersistenceFailure(_) => "PERSISTENCE_FAILED",
        }
    }

    /// HTTP status code the server answers with.
    pub fn status(&self) -> u16 {
        match self {
            WorkflowError::MissingPrecondition { .. } => 422,
            WorkflowError::InvalidRequest { .. } => 400,
            WorkflowError::Conflict { .. } | WorkflowError::ScopeBusy { .. } => 409,
            WorkflowError::GenerationFailure { .. } | WorkflowError::MalformedResponse { .. } => 502,
            WorkflowError::PersistenceFailure(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_keeps_its_code() {
        let err = WorkflowError::missing("NO_PAIN_POINTS", "persona has no pain points");
        assert_eq!(err.code(), "NO_PAIN_POINTS");
        assert_eq!(err.status(), 422);
        assert_eq!(err.to_string(), "persona has no pain points");
    }

    #[test]
    fn generation_errors_are_bad_gateway() {
        let err = WorkflowError::GenerationFailure {
            stage: Stage::Solutions,
            message: "timeout".into(),
        };
        assert_eq!(err.status(), 502);
        assert_eq!(err.code(), "GENERATION_FAILED");
        assert!(err.to_string().contains("solutions"));
    }

    #[test]
    fn storage_errors_convert() {
        let err: WorkflowError = StorageError::Backend("disk full".into()).into();
        assert_eq!(err.status(), 500);
        assert_eq!(err.code(), "PERSISTENCE_FAILED");
    }

    #[test]
    fn scope_busy_is_conflict() {
        let err = WorkflowError::ScopeBusy {
            scope: "project/p1/personas/per-1".into(),
        };
        assert_eq!(err.status(), 409);
        assert_eq!(err.code(), "SCOPE_BUSY");
    }
}
