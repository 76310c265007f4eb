use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("title normalizes to an empty path segment: {title:?}")]
    InvalidTitle { title: String },

    #[error("not found: {key}")]
    NotFound { key: String },

    #[error("{operation} requires explicit confirmation (pass --confirm)")]
    ConfirmationRequired { operation: String },

    #[error("invalid selector: {reason}")]
    InvalidSelector { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("failed to ensure ancestor page {path}: {message}")]
    AncestorCreation { path: String, message: String },

    #[error("hierarchy under {root} exceeds traversal limit: {limit}")]
    TraversalLimit { root: String, limit: String },

    #[error("page store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    #[error("mapping ledger failure: {0:#}")]
    Ledger(anyhow::Error),
}

impl BridgeError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn store(error: anyhow::Error) -> Self {
        Self::StoreUnavailable(error)
    }

    pub fn ledger(error: anyhow::Error) -> Self {
        Self::Ledger(error)
    }

    /// Stable snake_case kind, used in JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTitle { .. } => "invalid_title",
            Self::NotFound { .. } => "not_found",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::InvalidSelector { .. } => "invalid_selector",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::AncestorCreation { .. } => "ancestor_creation",
            Self::TraversalLimit { .. } => "traversal_limit",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Ledger(_) => "ledger",
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::BridgeError;

    #[test]
    fn store_error_message_includes_context_chain() {
        let error = BridgeError::store(
            anyhow::anyhow!("connection refused").context("failed to call Wiki.js GraphQL API"),
        );
        let message = error.to_string();
        assert!(message.contains("failed to call Wiki.js GraphQL API"));
        assert!(message.contains("connection refused"));
        assert_eq!(error.kind(), "store_unavailable");
    }

    #[test]
    fn argument_errors_have_their_own_kind() {
        let error = BridgeError::InvalidArgument {
            reason: "update names no fields".to_string(),
        };
        assert_eq!(error.kind(), "invalid_argument");
        assert_eq!(error.to_string(), "invalid argument: update names no fields");
    }

    #[test]
    fn confirmation_message_names_operation() {
        let error = BridgeError::ConfirmationRequired {
            operation: "page delete".to_string(),
        };
        assert!(error.to_string().starts_with("page delete requires"));
    }
}
