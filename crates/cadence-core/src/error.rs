use thiserror::Error;

/// Top-level error type for the Cadence engine.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates return
/// `CadenceError` directly (or convert through `From`) so the `?` operator
/// works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Graph edge references missing node: {0}")]
    MissingNode(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Voice output error: {0}")]
    Voice(String),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CadenceError {
    fn from(err: toml::de::Error) -> Self {
        CadenceError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CadenceError {
    fn from(err: toml::ser::Error) -> Self {
        CadenceError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        CadenceError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Failure classes for optional remote capabilities.
///
/// Quota/billing failures are expected and non-actionable: call sites must
/// fall back silently without warning-level logging. Every other class still
/// falls back, but is worth a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Quota or billing rejection from the remote service. Expected; callers
    /// suppress warning logs for this class.
    #[error("capability quota exhausted")]
    Quota,

    /// The capability is not configured or reports itself unavailable.
    #[error("capability unavailable")]
    Unavailable,

    /// Any other remote failure (timeout, malformed response, ...).
    #[error("capability call failed: {0}")]
    Failed(String),
}

impl CapabilityError {
    /// True for quota/billing-class failures that must not be logged at
    /// warning level.
    pub fn is_quota(&self) -> bool {
        matches!(self, CapabilityError::Quota)
    }
}
