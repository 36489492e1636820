use thiserror::Error;

use crate::topic::Topic;

/// Top-level error type for the `ontprobe-api` crate.
///
/// Covers transport, markup parsing, and UI-driver failures. Adapter-level
/// fetch outcomes live in [`FetchError`]; `ontprobe-core` maps both into
/// per-host findings.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// HTTP client could not be built (TLS backend, proxy settings).
    #[error("TLS error: {0}")]
    Tls(String),

    /// Device answered with an unexpected status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Instance markup could not be parsed.
    #[error("Malformed markup: {message}")]
    Xml { message: String },

    /// Expected response delimiter was not present in the body.
    #[error("Marker not found in response: {marker}")]
    MarkerNotFound { marker: String },

    /// A configured extraction pattern failed to compile.
    #[error("Invalid pattern for {field}: {message}")]
    Pattern { field: String, message: String },

    // ── UI automation ───────────────────────────────────────────────
    /// The UI driver reported a failure (launch, navigation, scripting).
    #[error("UI driver error: {0}")]
    UiDriver(String),

    /// A UI step did not complete within its bound.
    #[error("UI step '{step}' timed out after {timeout_secs}s")]
    UiTimeout { step: String, timeout_secs: u64 },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::UiTimeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the device was never reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Outcome of a failed [`fetch`](crate::ProtocolAdapter::fetch).
///
/// A fetch failure is scoped to one topic; callers record it and move on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] Error),

    #[error("device answered HTTP {status}")]
    Http { status: u16 },

    /// The method exists but the session lacks the privilege for it.
    #[error("method '{method}' requires a richer session")]
    NeedsRicherSession { method: String },

    #[error("method '{method}' not recognized by device")]
    MethodNotRecognized { method: String },

    #[error("session expired")]
    SessionExpired,

    #[error("no usable data in response")]
    NoUsableData,

    #[error("topic '{topic}' not supported by this interface")]
    NotSupported { topic: Topic },

    #[error("UI precondition '{step}' could not be satisfied")]
    PreconditionFailed { step: String },
}

impl FetchError {
    /// `true` when the device simply has nothing for this topic.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}
