use std::fmt;
use thiserror::Error;

/// The error type for azfile operations
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    causes: Vec<String>,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration error (missing fields, invalid values)
    ConfigInvalid,

    /// A container, blob name, metadata or content settings resolver failed
    ResolveFailed,

    /// The target container does not exist
    ContainerNotFound,

    /// Credentials could not be loaded or used
    CredentialInvalid,

    /// Request cannot be built or signed
    RequestInvalid,

    /// Unexpected errors (network, I/O, service errors, etc.)
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            causes: Vec::new(),
            source: None,
        }
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the individual causes this error summarizes.
    pub fn with_causes(mut self, causes: Vec<String>) -> Self {
        self.causes = causes;
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Individual causes summarized by this error.
    ///
    /// Only configuration errors carry causes.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

// Convenience constructors
impl Error {
    /// Create a config invalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a resolve failed error
    pub fn resolve_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResolveFailed, message)
    }

    /// Create a container not found error
    pub fn container_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContainerNotFound, message)
    }

    /// Create a credential invalid error
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Create a request invalid error
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::ResolveFailed => write!(f, "resolve failed"),
            ErrorKind::ContainerNotFound => write!(f, "container not found"),
            ErrorKind::CredentialInvalid => write!(f, "invalid credentials"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

/// Missing or invalid parameters collected while building a storage backend.
///
/// All checks run before this error is produced, so it lists every problem at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", summary(.causes.len()))]
pub struct ConfigError {
    causes: Vec<String>,
}

impl ConfigError {
    /// Create a config error from a list of causes.
    pub fn new(causes: Vec<String>) -> Self {
        Self { causes }
    }

    /// Individual causes in the order they were found.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

fn summary(n: usize) -> String {
    if n == 1 {
        "There is 1 missing required parameter.".to_string()
    } else {
        format!("There are {n} missing required parameters.")
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::config_invalid(err.to_string()).with_causes(err.causes)
    }
}

impl From<&ConfigError> for Error {
    fn from(err: &ConfigError) -> Self {
        Self::from(err.clone())
    }
}

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
