use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::session::SessionToken;

/// One `(username, password)` candidate from a credential trial.
///
/// The password stays wrapped so it never reaches logs or `Debug` output.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: SecretString,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// How a credential is presented to the device.
///
/// Marker enum (no data). The state machine tries them in the order of
/// [`AuthMechanism::ORDER`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthMechanism {
    /// Login form or login method that yields a session id or cookie.
    StatefulSession,
    /// HTTP Basic credentials on every request.
    TransportCredentials,
}

impl AuthMechanism {
    pub const ORDER: [AuthMechanism; 2] = [
        AuthMechanism::StatefulSession,
        AuthMechanism::TransportCredentials,
    ];
}

/// Result of one authentication attempt, as classified by the adapter.
///
/// Vendor-specific markers never leave the adapter; callers only see this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Authenticated; carries whatever token the device handed out.
    Ok(SessionToken),
    /// Credentials accepted but the device wants a stronger session.
    NeedsRicherSession,
    /// Credentials or mechanism rejected.
    Failed { reason: String },
    /// Device unreachable or the request never completed.
    TransportFailed { reason: String },
}

impl AuthOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Short label for attempt logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::NeedsRicherSession => "needs_richer_session",
            Self::Failed { .. } => "failed",
            Self::TransportFailed { .. } => "transport_failed",
        }
    }
}
