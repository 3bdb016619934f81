//! Error types for the engine. Host, store and CLI layers wrap these in `anyhow`.

use thiserror::Error;

/// Broad category of a source API failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection, DNS, TLS or timeout.
    Network,
    /// Rejected credentials or missing permission.
    Auth,
    /// Rate limit hit; `retry_after` seconds when the server said so.
    RateLimited { retry_after: Option<u64> },
    /// Server answered with a non-success status.
    Api { status: u16 },
    /// Response body did not have the expected shape.
    Protocol,
}

/// Any failure reaching the source API. Never retried inside the engine.
#[derive(Clone, Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// True when the host may retry after backoff.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            TransportErrorKind::Network | TransportErrorKind::RateLimited { .. } => true,
            TransportErrorKind::Api { status } => status >= 500,
            TransportErrorKind::Auth | TransportErrorKind::Protocol => false,
        }
    }
}

/// Result alias for source capabilities.
pub type SourceResult<T> = Result<T, TransportError>;

/// Malformed traversal state bytes.
#[derive(Debug, Error)]
#[error("undecodable traversal state: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Sharing resolution aborted; no partial membership is kept.
#[derive(Debug, Error)]
#[error("sharing resolution failed for {target}: {source}")]
pub struct SharingError {
    pub target: String,
    #[source]
    pub source: TransportError,
}

/// Folder listing aborted; no partial child list is kept.
#[derive(Debug, Error)]
#[error("listing {path:?} for {member_id} failed: {source}")]
pub struct TraversalError {
    pub member_id: String,
    pub path: String,
    #[source]
    pub source: TransportError,
}

/// Team or group enumeration aborted; no partial results are kept.
#[derive(Debug, Error)]
#[error("enumeration of {what} failed: {source}")]
pub struct EnumerationError {
    pub what: &'static str,
    #[source]
    pub source: TransportError,
}

/// What went wrong while assembling one node.
#[derive(Debug, Error)]
pub enum AssemblyCause {
    #[error(transparent)]
    Sharing(#[from] SharingError),
    #[error(transparent)]
    Traversal(#[from] TraversalError),
    #[error("download failed: {0}")]
    Download(#[source] TransportError),
}

impl AssemblyCause {
    /// The transport failure underneath.
    pub fn transport(&self) -> &TransportError {
        match self {
            AssemblyCause::Sharing(e) => &e.source,
            AssemblyCause::Traversal(e) => &e.source,
            AssemblyCause::Download(e) => e,
        }
    }
}

/// Per-node failure. Isolated to the node named by `node`.
#[derive(Debug, Error)]
#[error("assembling {node} failed: {cause}")]
pub struct AssemblyError {
    pub node: String,
    #[source]
    pub cause: AssemblyCause,
}

impl AssemblyError {
    pub fn is_retryable(&self) -> bool {
        self.cause.transport().is_retryable()
    }
}

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credential_file can not be empty")]
    MissingCredentialFile,
    #[error("failed to read {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("invalid {path}: {reason}")]
    Invalid { path: String, reason: String },
    #[error("no access token available (credential file, DROPDEX_ACCESS_TOKEN, or refresh token)")]
    NoAccessToken,
}
