// ── Session context ──
//
// What the trial state machine freezes once authentication succeeds.
// Adapters read it; nothing downstream mutates it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::auth::{AuthMechanism, Credential};

/// Which telemetry mechanism a device speaks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdapterVariant {
    /// JSON method calls against one fixed endpoint with a session id.
    AjaxSession,
    /// Instance markup fetched after driving the web UI.
    XmlOverUi,
    /// Regex and label-table extraction from status pages.
    HtmlScrape,
}

/// Opaque token handed out by the device at login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionToken {
    /// Nothing to carry (Basic auth on every request).
    #[default]
    None,
    /// Session identifier sent as a query parameter.
    SessionId(String),
    /// Cookies held in the client jar, copied here for reference.
    Cookies(Vec<(String, String)>),
}

impl SessionToken {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionId(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub host: String,
    pub variant: AdapterVariant,
    pub credential: Credential,
    pub mechanism: AuthMechanism,
    pub token: SessionToken,
    pub authenticated: bool,
}

impl SessionContext {
    pub fn new(
        host: impl Into<String>,
        variant: AdapterVariant,
        credential: Credential,
        mechanism: AuthMechanism,
        token: SessionToken,
    ) -> Self {
        Self {
            host: host.into(),
            variant,
            credential,
            mechanism,
            token,
            authenticated: true,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.token.session_id()
    }
}
