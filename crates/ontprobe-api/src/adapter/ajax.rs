// AJAX/JSON-session adapter
//
// Every call is a GET against one fixed endpoint with a method name, a
// cache-busting timestamp and, once logged in, a session id. The device's
// `session_valid` flag decides whether the data is usable.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapter::{ProtocolAdapter, cache_buster, contains_any};
use crate::auth::{AuthMechanism, AuthOutcome, Credential};
use crate::client::{DeviceClient, DeviceRequest, DeviceResponse};
use crate::error::{Error, FetchError};
use crate::record::{NormalizedRecord, Value};
use crate::session::{AdapterVariant, SessionContext, SessionToken};
use crate::topic::Topic;

static SESSION_ID_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)sessionid\s*[=:]\s*["']?([A-Za-z0-9]+)"#).ok()
});

/// One named method call; `requires_session` methods must be answered
/// with `session_valid = 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjaxMethod {
    pub name: String,
    #[serde(default)]
    pub requires_session: bool,
}

impl AjaxMethod {
    pub fn open(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            requires_session: false,
        }
    }

    pub fn session(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            requires_session: true,
        }
    }
}

/// Endpoint conventions and the topic → method table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AjaxTable {
    pub endpoint: String,
    pub method_param: String,
    pub session_param: String,
    pub session_cookie: String,
    pub login_method: String,
    /// Session-gated method used to validate Basic credentials.
    pub probe_method: String,
    pub topics: IndexMap<Topic, Vec<AjaxMethod>>,
    pub failure_markers: Vec<String>,
    pub expired_markers: Vec<String>,
}

impl AjaxTable {
    /// Table for the `/cgi-bin/ajax` family of interfaces.
    pub fn builtin() -> Self {
        let base_info = AjaxMethod::session("get_base_info");
        let mut topics = IndexMap::new();
        topics.insert(
            Topic::Identity,
            vec![
                AjaxMethod::open("get_device_name"),
                AjaxMethod::open("get_operator"),
                base_info.clone(),
            ],
        );
        topics.insert(
            Topic::Optics,
            vec![AjaxMethod::session("get_pon_info"), base_info.clone()],
        );
        topics.insert(
            Topic::Wan,
            vec![
                AjaxMethod::session("get_allwan_info_broadBand"),
                base_info.clone(),
            ],
        );
        topics.insert(Topic::Lan, vec![base_info.clone()]);
        topics.insert(
            Topic::Wifi,
            vec![
                AjaxMethod::session("get_allwan_info_broadBand"),
                AjaxMethod::session("get_wifi_info"),
                AjaxMethod::session("get_5g_wifi_info"),
                AjaxMethod::session("get_wifi_status"),
            ],
        );
        topics.insert(
            Topic::Usb,
            vec![base_info, AjaxMethod::session("get_ftpclient_info")],
        );

        Self {
            endpoint: "/cgi-bin/ajax".into(),
            method_param: "ajaxmethod".into(),
            session_param: "sessionid".into(),
            session_cookie: "sessionid".into(),
            login_method: "do_login".into(),
            probe_method: "get_base_info".into(),
            topics,
            failure_markers: vec![
                "login failed".into(),
                "user or password error".into(),
                "password is wrong".into(),
            ],
            expired_markers: vec!["sessiontimeout".into(), "session timeout".into()],
        }
    }
}

/// `session_valid` tri-state: `Some(true)`, `Some(false)`, or absent.
fn session_flag(json: &serde_json::Value) -> Option<bool> {
    let flag = json.get("session_valid")?;
    match flag {
        serde_json::Value::Number(n) => Some(n.as_i64() == Some(1)),
        serde_json::Value::String(s) => Some(s.trim() == "1"),
        serde_json::Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn json_str(json: &serde_json::Value, key: &str) -> Option<String> {
    match json.get(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Value of cookie `name` set by this response, ignoring the jar.
fn set_cookie_value(resp: &DeviceResponse, name: &str) -> Option<String> {
    resp.headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| raw.split(';').next()?.trim().split_once('='))
        .find(|(n, v)| n.eq_ignore_ascii_case(name) && !v.is_empty())
        .map(|(_, v)| v.to_owned())
}

pub struct AjaxAdapter {
    client: DeviceClient,
    table: Arc<AjaxTable>,
}

impl AjaxAdapter {
    pub fn new(client: DeviceClient, table: Arc<AjaxTable>) -> Self {
        Self { client, table }
    }

    pub fn client(&self) -> &DeviceClient {
        &self.client
    }

    fn method_request(&self, method: &str) -> DeviceRequest {
        DeviceRequest::get(self.table.endpoint.clone())
            .query(self.table.method_param.clone(), method)
            .query("_", cache_buster())
    }

    /// Map a login or probe response onto an [`AuthOutcome`].
    ///
    /// Only evidence carried by this response counts: a session cookie
    /// must arrive in its own `Set-Cookie` header, and `session_valid = 0`
    /// outranks any session id it hands out.
    pub fn classify(
        &self,
        mechanism: AuthMechanism,
        result: Result<DeviceResponse, Error>,
    ) -> AuthOutcome {
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                return AuthOutcome::TransportFailed {
                    reason: e.to_string(),
                };
            }
        };

        if !resp.is_ok() {
            return AuthOutcome::Failed {
                reason: format!("HTTP {}", resp.status),
            };
        }
        if let Some(marker) = contains_any(&resp.body, &self.table.expired_markers) {
            return AuthOutcome::Failed {
                reason: format!("session expired ({marker})"),
            };
        }
        if let Some(marker) = contains_any(&resp.body, &self.table.failure_markers) {
            return AuthOutcome::Failed { reason: marker };
        }

        let json: Option<serde_json::Value> = serde_json::from_str(&resp.body).ok();
        let rejected = json
            .as_ref()
            .and_then(|j| json_str(j, "result"))
            .is_some_and(|r| matches!(r.to_lowercase().as_str(), "fail" | "failed" | "error"));
        if rejected {
            return AuthOutcome::Failed {
                reason: "login rejected".into(),
            };
        }

        let flag = json.as_ref().and_then(session_flag);
        if flag == Some(false) {
            return AuthOutcome::NeedsRicherSession;
        }

        match mechanism {
            AuthMechanism::StatefulSession => {
                let session_id = json
                    .as_ref()
                    .and_then(|j| json_str(j, "sessionid"))
                    .or_else(|| set_cookie_value(&resp, &self.table.session_cookie))
                    .or_else(|| {
                        SESSION_ID_RE
                            .as_ref()
                            .and_then(|re| re.captures(&resp.body))
                            .and_then(|c| c.get(1))
                            .map(|m| m.as_str().to_owned())
                    });
                let accepted = json
                    .as_ref()
                    .and_then(|j| json_str(j, "result"))
                    .is_some_and(|r| r.eq_ignore_ascii_case("success"));

                match session_id {
                    Some(id) => AuthOutcome::Ok(SessionToken::SessionId(id)),
                    None if accepted => AuthOutcome::Ok(SessionToken::None),
                    None => AuthOutcome::Failed {
                        reason: "login not acknowledged".into(),
                    },
                }
            }
            // The probe method is session-gated, so only an explicit
            // `session_valid = 1` proves the Basic credentials.
            AuthMechanism::TransportCredentials => match flag {
                Some(true) => AuthOutcome::Ok(SessionToken::None),
                _ => AuthOutcome::Failed {
                    reason: "credentials not confirmed by device".into(),
                },
            },
        }
    }

    async fn call(&self, ctx: &SessionContext, method: &AjaxMethod) -> Result<Value, FetchError> {
        let mut request = self.method_request(&method.name).basic_auth(&ctx.credential);
        if let Some(id) = ctx.session_id() {
            request = request.query(self.table.session_param.clone(), id);
        }

        let resp = self.client.send(request).await?;
        if !resp.is_ok() {
            return Err(FetchError::Http {
                status: resp.status,
            });
        }
        if contains_any(&resp.body, &self.table.expired_markers).is_some() {
            return Err(FetchError::SessionExpired);
        }

        let json: serde_json::Value =
            serde_json::from_str(&resp.body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: resp.body.clone(),
            })?;

        match (session_flag(&json), method.requires_session) {
            (Some(false), _) => {
                return Err(FetchError::NeedsRicherSession {
                    method: method.name.clone(),
                });
            }
            (None, true) => {
                return Err(FetchError::MethodNotRecognized {
                    method: method.name.clone(),
                });
            }
            _ => {}
        }

        match Value::from_json(&json) {
            Some(Value::Map(m)) if m.is_empty() => Err(FetchError::NoUsableData),
            Some(Value::List(l)) if l.is_empty() => Err(FetchError::NoUsableData),
            Some(value) => Ok(value),
            None => Err(FetchError::NoUsableData),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for AjaxAdapter {
    fn variant(&self) -> AdapterVariant {
        AdapterVariant::AjaxSession
    }

    async fn authenticate(&self, credential: &Credential, mechanism: AuthMechanism) -> AuthOutcome {
        debug!(username = %credential.username, %mechanism, "ajax login attempt");
        let result = match mechanism {
            AuthMechanism::StatefulSession => {
                let form = vec![
                    (self.table.method_param.clone(), self.table.login_method.clone()),
                    ("username".to_owned(), credential.username.clone()),
                    ("password".to_owned(), credential.password().to_owned()),
                ];
                self.client
                    .send(DeviceRequest::post_form(self.table.endpoint.clone(), form))
                    .await
            }
            AuthMechanism::TransportCredentials => {
                self.client
                    .send(self.method_request(&self.table.probe_method).basic_auth(credential))
                    .await
            }
        };
        self.classify(mechanism, result)
    }

    async fn fetch(&self, ctx: &SessionContext, topic: Topic) -> Result<NormalizedRecord, FetchError> {
        let methods = self
            .table
            .topics
            .get(&topic)
            .ok_or(FetchError::NotSupported { topic })?;

        let mut record = NormalizedRecord::default();
        let mut last_err = None;
        for method in methods {
            match self.call(ctx, method).await {
                Ok(value) => record.insert(method.name.clone(), value),
                Err(e) => {
                    warn!(host = %ctx.host, %topic, method = %method.name, error = %e, "ajax method failed");
                    last_err = Some(e);
                }
            }
        }

        if record.is_empty() {
            return Err(last_err.unwrap_or(FetchError::NoUsableData));
        }
        Ok(record)
    }
}
