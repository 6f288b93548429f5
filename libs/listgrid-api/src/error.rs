/// Category of a store error. Lets callers decide between surfacing,
/// suppressing or retrying without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown list, view, field or item identifier.
    NotFound,
    /// The store rejected a query document, or a stored query could not be parsed.
    InvalidQuery,
    /// Authentication missing or the caller lacks permission.
    Unauthorized,
    /// Network failure, throttling or a server-side fault. May succeed later.
    Transient,
    /// A value cannot be converted to the shape its field requires.
    Validation,
    /// Response body did not have the expected shape.
    Format,
    /// Invalid store configuration. Permanent; fail at startup.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::InvalidQuery => f.write_str("invalid query"),
            ErrorKind::Unauthorized => f.write_str("unauthorized"),
            ErrorKind::Transient => f.write_str("transient"),
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Config => f.write_str("config"),
        }
    }
}

/// Error returned by every `ListStore` method.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the kind automatically so store implementations
/// can use `?` freely.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreError {
    kind: ErrorKind,
    message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with context, keeping the kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::transient(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::format_err(e.to_string())
    }
}

impl From<roxmltree::Error> for StoreError {
    fn from(e: roxmltree::Error) -> Self {
        Self::invalid_query(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = StoreError::not_found("field 'Foo'").with_context("list L1");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "list L1: field 'Foo'");
        assert_eq!(err.to_string(), "not found: list L1: field 'Foo'");
    }

    #[test]
    fn json_errors_are_format_kind() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn xml_and_io_errors_map_to_their_kinds() {
        let err: StoreError = roxmltree::Document::parse("<Where>").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
        let err: StoreError = std::io::Error::other("reset").into();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
