// ── Core error types ──
//
// Errors surfaced by the engine. Transport details from ontprobe-api are
// folded into connection/timeout variants by the `From` impl below; the
// only error that ends a host's run early is `AuthenticationFailed`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Authentication failed for {host} after {attempts} attempt(s)")]
    AuthenticationFailed { host: String, attempts: usize },

    // ── Table / configuration errors ─────────────────────────────────
    #[error("Model table entry '{later}' is shadowed by earlier entry '{earlier}'")]
    TableOrdering { earlier: String, later: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Probe cancelled")]
    Cancelled,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Device error: {message}")]
    Device {
        message: String,
        status: Option<u16>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ontprobe_api::Error> for CoreError {
    fn from(err: ontprobe_api::Error) -> Self {
        match err {
            ontprobe_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Device {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ontprobe_api::Error::Timeout { timeout_secs }
            | ontprobe_api::Error::UiTimeout { timeout_secs, .. } => {
                CoreError::Timeout { timeout_secs }
            }
            ontprobe_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid device URL: {e}"),
            },
            ontprobe_api::Error::Pattern { field, message } => CoreError::Config {
                message: format!("pattern for {field}: {message}"),
            },
            ontprobe_api::Error::Http { status, url } => CoreError::Device {
                message: format!("HTTP {status} from {url}"),
                status: Some(status),
            },
            ontprobe_api::Error::Tls(message) => CoreError::ConnectionFailed {
                url: "<client>".into(),
                reason: message,
            },
            other => CoreError::Device {
                message: other.to_string(),
                status: None,
            },
        }
    }
}
