use listgrid_api::{ErrorKind, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("config error: {0}")]
    Config(String),
}

impl GridError {
    pub fn invalid_value(field: impl Into<String>, detail: impl Into<String>) -> Self {
        GridError::InvalidValue { field: field.into(), detail: detail.into() }
    }

    /// Category of the failure, so presentation layers can decide what to
    /// suppress without matching on messages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GridError::Store(e) => e.kind(),
            GridError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            GridError::InvalidValue { .. } => ErrorKind::Validation,
            GridError::Config(_) => ErrorKind::Config,
        }
    }

    /// Add context to the error.
    ///
    /// For `Store`, context goes into the inner `StoreError` (kind preserved).
    /// For message variants, context is prepended.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            GridError::Store(e) => GridError::Store(e.with_context(ctx)),
            GridError::InvalidQuery(msg) => GridError::InvalidQuery(format!("{ctx}: {msg}")),
            GridError::Config(msg) => GridError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_inner_store_error() {
        let err = GridError::from(StoreError::unauthorized("401")).with_context("list L1");
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.to_string(), "unauthorized: list L1: 401");
        assert_eq!(GridError::invalid_value("Km", "not a number").kind(), ErrorKind::Validation);
    }
}
