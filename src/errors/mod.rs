//! # Error Handling
//!
//! Error taxonomy for vaultsync. Configuration, dialect, decode and cycle
//! errors terminate a run before (or instead of) any copy work; store errors
//! raised inside the copy engine are recorded per key and never abort the run.

/// Custom result type for vaultsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vaultsync
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid or conflicting settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source and destination disagree on KV dialect or root
    #[error("Dialect mismatch: source {source_mount}, destination {destination_mount}")]
    DialectMismatch { source_mount: String, destination_mount: String },

    /// Remote store failure for a specific operation and path
    #[error("Store error during {operation} of '{path}': {message}")]
    Store { operation: StoreOperation, path: String, message: String },

    /// Malformed snapshot line
    #[error("Snapshot decode error at line {line}: {message}")]
    Decode { line: usize, message: String },

    /// Namespace walk revisited a path or went deeper than allowed
    #[error("Cycle detected while walking '{path}': {reason}")]
    CycleDetected { path: String, reason: String },

    /// Another action currently holds the single-flight guard
    #[error("Another action is already in progress")]
    Busy,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors outside the snapshot decoder
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal errors (e.g. a worker task panicked)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The store call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    Connect,
    List,
    Read,
    Write,
    DescribeMount,
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreOperation::Connect => "connect",
            StoreOperation::List => "list",
            StoreOperation::Read => "read",
            StoreOperation::Write => "write",
            StoreOperation::DescribeMount => "describe_mount",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new store error
    pub fn store<P: Into<String>, M: ToString>(
        operation: StoreOperation,
        path: P,
        message: M,
    ) -> Self {
        Self::Store { operation, path: path.into(), message: message.to_string() }
    }

    /// Create a new snapshot decode error
    pub fn decode<S: Into<String>>(line: usize, message: S) -> Self {
        Self::Decode { line, message: message.into() }
    }

    /// Create a new cycle detection error
    pub fn cycle<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::CycleDetected { path: path.into(), reason: reason.into() }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error ends the whole action rather than a single key
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Store { operation: StoreOperation::Read | StoreOperation::Write, .. })
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::config("workers must be > 0");
        assert!(matches!(error, Error::Config(_)));
        assert_eq!(error.to_string(), "Configuration error: workers must be > 0");
    }

    #[test]
    fn test_store_error_display() {
        let error = Error::store(StoreOperation::Write, "secret/data/a", "403 permission denied");
        assert_eq!(
            error.to_string(),
            "Store error during write of 'secret/data/a': 403 permission denied"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(Error::config("x").is_fatal());
        assert!(Error::decode(3, "missing separator").is_fatal());
        assert!(Error::store(StoreOperation::List, "secret", "boom").is_fatal());
        assert!(!Error::store(StoreOperation::Read, "secret/a", "boom").is_fatal());
        assert!(!Error::store(StoreOperation::Write, "secret/a", "boom").is_fatal());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Serialization(_)));
    }
}
