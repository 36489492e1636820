// HTML-scrape adapter
//
// Status pages rendered server-side. Each topic names a few candidate
// paths; the first one that answers 200 is run through the topic's
// regexes and a label/value table pass.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapter::{ProtocolAdapter, contains_any};
use crate::auth::{AuthMechanism, AuthOutcome, Credential};
use crate::client::{DeviceClient, DeviceRequest, DeviceResponse};
use crate::error::{Error, FetchError};
use crate::record::{NormalizedRecord, Value};
use crate::session::{AdapterVariant, SessionContext, SessionToken};
use crate::topic::Topic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPattern {
    pub field: String,
    /// Regex whose first capture group is the value.
    pub pattern: String,
}

impl FieldPattern {
    pub fn new(field: &str, pattern: &str) -> Self {
        Self {
            field: field.to_owned(),
            pattern: pattern.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlRoute {
    pub paths: Vec<String>,
    /// Try the page returned by the login POST before any path.
    #[serde(default)]
    pub include_login_page: bool,
    #[serde(default)]
    pub patterns: Vec<FieldPattern>,
    /// `(row label, field)` pairs for two-column status tables.
    #[serde(default)]
    pub labels: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlTable {
    pub landing_path: String,
    pub login_path: String,
    pub username_field: String,
    pub password_field: String,
    pub submit_field: (String, String),
    /// Hidden anti-replay input echoed back with the login form.
    pub key_input: String,
    pub default_key: String,
    pub failure_markers: Vec<String>,
    pub success_markers: Vec<String>,
    pub routes: IndexMap<Topic, HtmlRoute>,
}

const STATUS_PAGES: [&str; 3] = ["/status.html", "/status.htm", "/device_status.html"];

impl HtmlTable {
    /// Table for single-page ATA status interfaces.
    pub fn builtin() -> Self {
        let paths: Vec<String> = STATUS_PAGES.iter().map(|p| (*p).to_owned()).collect();
        let mac_wan = FieldPattern::new("MacWan", r"(?is)WAN\s*--\s*([0-9A-Fa-f:]{17})");
        let mac_lan = FieldPattern::new("MacLan", r"(?is)LAN\s*--\s*([0-9A-Fa-f:]{17})");

        let mut routes = IndexMap::new();
        routes.insert(
            Topic::Identity,
            HtmlRoute {
                paths: paths.clone(),
                include_login_page: true,
                patterns: vec![
                    FieldPattern::new(
                        "SerialNumber",
                        r"(?is)Serial\s+Number[:\s]*</b></td>\s*<td[^>]*>\s*&nbsp;\s*([A-Z0-9]+)",
                    ),
                    FieldPattern::new(
                        "ModelName",
                        r"(?is)Product\s+Model[:\s]*</b></td>\s*<td[^>]*>\s*&nbsp;\s*([A-Z0-9]+)",
                    ),
                    FieldPattern::new(
                        "HardwareVersion",
                        r"(?is)Hardware\s+Version[:\s]*</b></td>\s*<td[^>]*>\s*&nbsp;\s*([^\s<]+)",
                    ),
                    FieldPattern::new("SoftwareVersion", r"(?is)Program\s*--\s*([0-9.]+)"),
                    mac_wan.clone(),
                    mac_lan.clone(),
                    FieldPattern::new("SerialNumber", r">([A-Z0-9]{14,})<"),
                    FieldPattern::new("ModelName", r"(?i)\b(HT\d{3})\b"),
                ],
                labels: vec![
                    ("Serial Number".into(), "SerialNumber".into()),
                    ("Product Model".into(), "ModelName".into()),
                    ("Hardware Version".into(), "HardwareVersion".into()),
                    ("Software Version".into(), "SoftwareVersion".into()),
                    ("MAC Address".into(), "MacAddress".into()),
                ],
            },
        );
        routes.insert(
            Topic::Wan,
            HtmlRoute {
                paths: paths.clone(),
                include_login_page: true,
                patterns: vec![mac_wan],
                labels: vec![
                    ("IP Address".into(), "WanIp".into()),
                    ("Addressing Type".into(), "WanAccessType".into()),
                ],
            },
        );
        routes.insert(
            Topic::Lan,
            HtmlRoute {
                paths,
                include_login_page: true,
                patterns: vec![mac_lan],
                labels: Vec::new(),
            },
        );

        Self {
            landing_path: "/".into(),
            login_path: "/cgi-bin/dologin".into(),
            username_field: "username".into(),
            password_field: "P2".into(),
            submit_field: ("Login".into(), "Login".into()),
            key_input: "gnkey".into(),
            default_key: "0b82".into(),
            failure_markers: vec!["not recognized".into(), "remaining attempts".into()],
            success_markers: vec!["serial number".into(), "product model".into()],
            routes,
        }
    }
}

struct CompiledRoute {
    route: HtmlRoute,
    patterns: Vec<(String, Regex)>,
}

/// Value of a named hidden `<input>`, if the page has one.
pub fn hidden_input_value(html: &str, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!("input[name=\"{name}\"]")).ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .find_map(|el| el.value().attr("value"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Two-column table rows as `(label, value)`, non-breaking spaces and
/// trailing colons stripped.
pub fn label_rows(html: &str) -> Vec<(String, String)> {
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("td, th")) else {
        return Vec::new();
    };
    let clean = |s: String| {
        s.replace('\u{a0}', " ")
            .trim()
            .trim_end_matches(':')
            .trim()
            .to_owned()
    };

    let document = Html::parse_document(html);
    document
        .select(&row_sel)
        .filter_map(|row| {
            let mut cells = row
                .select(&cell_sel)
                .map(|c| clean(c.text().collect::<String>()));
            let label = cells.next()?;
            let value = cells.next()?;
            (!label.is_empty() && !value.is_empty()).then_some((label, value))
        })
        .collect()
}

pub struct HtmlAdapter {
    client: DeviceClient,
    table: Arc<HtmlTable>,
    routes: IndexMap<Topic, CompiledRoute>,
    login_page: RwLock<Option<String>>,
}

impl HtmlAdapter {
    /// Compile every route's patterns up front; a bad pattern is a
    /// configuration error, not a per-topic failure.
    pub fn new(client: DeviceClient, table: Arc<HtmlTable>) -> Result<Self, Error> {
        let mut routes = IndexMap::new();
        for (topic, route) in &table.routes {
            let patterns = route
                .patterns
                .iter()
                .map(|p| {
                    Regex::new(&p.pattern)
                        .map(|re| (p.field.clone(), re))
                        .map_err(|e| Error::Pattern {
                            field: p.field.clone(),
                            message: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            routes.insert(
                *topic,
                CompiledRoute {
                    route: route.clone(),
                    patterns,
                },
            );
        }
        Ok(Self {
            client,
            table,
            routes,
            login_page: RwLock::new(None),
        })
    }

    pub fn client(&self) -> &DeviceClient {
        &self.client
    }

    /// Map a login or probe response onto an [`AuthOutcome`].
    pub fn classify(
        &self,
        mechanism: AuthMechanism,
        result: Result<DeviceResponse, Error>,
        cookies: Vec<(String, String)>,
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
        if let Some(marker) = contains_any(&resp.body, &self.table.failure_markers) {
            return AuthOutcome::Failed { reason: marker };
        }

        let shows_status = contains_any(&resp.body, &self.table.success_markers).is_some();
        match mechanism {
            AuthMechanism::StatefulSession if shows_status => {
                AuthOutcome::Ok(SessionToken::Cookies(cookies))
            }
            AuthMechanism::TransportCredentials if shows_status => {
                AuthOutcome::Ok(SessionToken::None)
            }
            _ => AuthOutcome::Failed {
                reason: "status page not shown".into(),
            },
        }
    }

    /// Run a route's extraction over one page.
    fn extract(route: &CompiledRoute, html: &str) -> IndexMap<String, Value> {
        let mut fields = IndexMap::new();
        for (field, re) in &route.patterns {
            if fields.contains_key(field) {
                continue;
            }
            let value = re
                .captures(html)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_owned())
                .filter(|v| !v.is_empty());
            if let Some(value) = value {
                fields.insert(field.clone(), Value::Text(value));
            }
        }

        if !route.route.labels.is_empty() {
            for (label, value) in label_rows(html) {
                let target = route
                    .route
                    .labels
                    .iter()
                    .find(|(l, _)| l.eq_ignore_ascii_case(&label));
                if let Some((_, field)) = target {
                    if !fields.contains_key(field) {
                        fields.insert(field.clone(), Value::Text(value));
                    }
                }
            }
        }
        fields
    }

    fn cached_login_page(&self) -> Option<String> {
        self.login_page.read().ok().and_then(|guard| guard.clone())
    }

    fn remember_login_page(&self, body: &str) {
        if let Ok(mut guard) = self.login_page.write() {
            *guard = Some(body.to_owned());
        }
    }

    async fn form_login(&self, credential: &Credential) -> Result<DeviceResponse, Error> {
        let landing = self.client.get(&self.table.landing_path).await?;
        let key = hidden_input_value(&landing.body, &self.table.key_input)
            .unwrap_or_else(|| self.table.default_key.clone());

        let form = vec![
            (self.table.username_field.clone(), credential.username.clone()),
            (self.table.password_field.clone(), credential.password().to_owned()),
            self.table.submit_field.clone(),
            (self.table.key_input.clone(), key),
        ];
        self.client
            .send(DeviceRequest::post_form(self.table.login_path.clone(), form))
            .await
    }
}

#[async_trait]
impl ProtocolAdapter for HtmlAdapter {
    fn variant(&self) -> AdapterVariant {
        AdapterVariant::HtmlScrape
    }

    async fn authenticate(&self, credential: &Credential, mechanism: AuthMechanism) -> AuthOutcome {
        debug!(username = %credential.username, %mechanism, "html login attempt");
        let result = match mechanism {
            AuthMechanism::StatefulSession => self.form_login(credential).await,
            AuthMechanism::TransportCredentials => {
                self.client
                    .send(DeviceRequest::get(self.table.landing_path.clone()).basic_auth(credential))
                    .await
            }
        };
        let body = result.as_ref().ok().map(|r| r.body.clone());
        let outcome = self.classify(mechanism, result, self.client.cookies());
        if let (true, Some(body)) = (outcome.is_ok(), body) {
            self.remember_login_page(&body);
        }
        outcome
    }

    async fn fetch(&self, ctx: &SessionContext, topic: Topic) -> Result<NormalizedRecord, FetchError> {
        let route = self
            .routes
            .get(&topic)
            .ok_or(FetchError::NotSupported { topic })?;

        let mut record = NormalizedRecord::default();

        if route.route.include_login_page {
            if let Some(page) = self.cached_login_page() {
                let fields = Self::extract(route, &page);
                if !fields.is_empty() {
                    record.insert(topic.as_str(), Value::Map(fields));
                    return Ok(record);
                }
            }
        }

        let mut last_err = FetchError::NoUsableData;
        for path in &route.route.paths {
            let mut request = DeviceRequest::get(path.clone());
            if ctx.mechanism == AuthMechanism::TransportCredentials {
                request = request.basic_auth(&ctx.credential);
            }
            let resp = match self.client.send(request).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(host = %ctx.host, %topic, %path, error = %e, "status page request failed");
                    last_err = FetchError::Transport(e);
                    continue;
                }
            };
            if !resp.is_ok() {
                debug!(%path, status = resp.status, "status page unavailable");
                last_err = FetchError::Http {
                    status: resp.status,
                };
                continue;
            }

            let fields = Self::extract(route, &resp.body);
            if fields.is_empty() {
                return Err(FetchError::NoUsableData);
            }
            record.insert(topic.as_str(), Value::Map(fields));
            return Ok(record);
        }

        Err(last_err)
    }
}
