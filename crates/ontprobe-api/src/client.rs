// Device HTTP client
//
// Wraps `reqwest::Client` with per-host URL construction, Basic auth,
// cookie-jar access and a flat request/response shape the adapters share.
// Vendor semantics live in the adapters, not here.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderMap;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credential;
use crate::error::Error;
use crate::transport::TransportConfig;

/// A single request against the device, relative to its base URL.
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub headers: HeaderMap,
    pub basic_auth: Option<Credential>,
    pub timeout: Option<Duration>,
}

impl DeviceRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            form: None,
            headers: HeaderMap::new(),
            basic_auth: None,
            timeout: None,
        }
    }

    pub fn post_form(path: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            form: Some(form),
            ..Self::get(path)
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, credential: &Credential) -> Self {
        self.basic_auth = Some(credential.clone());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status, headers and decoded body of a device response.
#[derive(Debug, Clone)]
pub struct DeviceResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl DeviceResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP client bound to one device.
///
/// Each host gets its own client and therefore its own cookie jar; nothing
/// here is shared between concurrent probes.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    cookie_jar: Arc<Jar>,
}

impl DeviceClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// A cookie jar is always attached; stateful logins depend on it.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let cookie_jar = config
            .cookie_jar
            .clone()
            .unwrap_or_else(|| Arc::new(Jar::default()));
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout: config.timeout,
            cookie_jar,
        })
    }

    /// Parse `host` into a base URL. Bare hosts default to plain HTTP.
    pub fn base_url_for(host: &str) -> Result<Url, Error> {
        let trimmed = host.trim().trim_end_matches('/');
        if trimmed.contains("://") {
            Ok(Url::parse(trimmed)?)
        } else {
            Ok(Url::parse(&format!("http://{trimmed}"))?)
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve a device-relative path (query strings allowed).
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Cookies ──────────────────────────────────────────────────────

    /// Seed the jar with cookies obtained elsewhere (the UI driver).
    pub fn add_cookies(&self, cookies: &[(String, String)]) {
        for (name, value) in cookies {
            let cookie = format!("{name}={value}; Path=/");
            self.cookie_jar.add_cookie_str(&cookie, &self.base_url);
        }
        debug!(count = cookies.len(), "seeded cookie jar");
    }

    /// Cookies the jar would send to the device root.
    pub fn cookies(&self) -> Vec<(String, String)> {
        let Some(header) = self.cookie_jar.cookies(&self.base_url) else {
            return Vec::new();
        };
        let Ok(raw) = header.to_str() else {
            return Vec::new();
        };
        raw.split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.to_owned(), value.to_owned()))
            })
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send a request. Any HTTP status is returned as a response; only
    /// transport failures become errors.
    pub async fn send(&self, request: DeviceRequest) -> Result<DeviceResponse, Error> {
        let url = self.url(&request.path)?;
        debug!(method = %request.method, %url, "device request");

        let timeout = request.timeout.unwrap_or(self.timeout);
        let mut builder = self
            .http
            .request(request.method, url)
            .headers(request.headers)
            .timeout(timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref form) = request.form {
            builder = builder.form(form);
        }
        if let Some(ref credential) = request.basic_auth {
            builder = builder.basic_auth(&credential.username, Some(credential.password()));
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(status, bytes = body.len(), "device response");

        Ok(DeviceResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&self, path: &str) -> Result<DeviceResponse, Error> {
        self.send(DeviceRequest::get(path)).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn bare_host_defaults_to_http() {
        let url = DeviceClient::base_url_for("192.168.1.1").unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.1/");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let url = DeviceClient::base_url_for("https://10.0.0.1:8443/").unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.1:8443/");
    }

    #[test]
    fn injected_cookies_are_readable() {
        let base = Url::parse("http://192.168.1.1").unwrap();
        let client = DeviceClient::new(base, &TransportConfig::default()).unwrap();
        client.add_cookies(&[("SID".into(), "abc".into())]);
        assert_eq!(client.cookie("sid").as_deref(), Some("abc"));
    }
}
