//! Error taxonomy shared across the platform.

/// Result type alias for Flagship operations.
pub type Result<T> = std::result::Result<T, FlagshipError>;

/// Main error type for the Flagship platform.
#[derive(Debug, thiserror::Error)]
pub enum FlagshipError {
    /// Invalid caller-supplied input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested entity does not exist (or is inactive)
    #[error("Not found: {resource} with key {key}")]
    NotFound { resource: String, key: String },

    /// Missing or unknown API key
    #[error("Invalid or missing API key")]
    Unauthorized,

    /// Internal sentinel for a cache tier miss; never surfaced to callers
    #[error("cache miss")]
    CacheMiss,

    /// A backing dependency (store or bus) could not be reached
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Network-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// A raw flag value could not be parsed as its declared type
    #[error("invalid flag type: {0}")]
    Parse(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlagshipError {
    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            key: key.into(),
        }
    }

    /// Create a new dependency unavailable error
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::DependencyUnavailable(msg.into())
    }

    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a cache miss
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss)
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an unauthorized error
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Check if this is a parse error
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}
