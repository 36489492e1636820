// XML-over-UI adapter
//
// The device only serves its menu data once the browser session has
// visited the matching page, so every topic carries a list of UI steps
// that must run first. Data itself is fetched over plain HTTP with the
// browser's cookies and run through the instance normalizer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::{ProtocolAdapter, cache_buster, contains_any};
use crate::auth::{AuthMechanism, AuthOutcome, Credential};
use crate::client::{DeviceClient, DeviceRequest, DeviceResponse};
use crate::driver::{SelectorSet, UiClick, UiDriver, UiStep};
use crate::error::{Error, FetchError};
use crate::normalize::{extract_xml_root, normalize};
use crate::record::NormalizedRecord;
use crate::session::{AdapterVariant, SessionContext, SessionToken};
use crate::topic::Topic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlRoute {
    pub tag: String,
    #[serde(default)]
    pub extra_query: Vec<(String, String)>,
    #[serde(default)]
    pub steps: Vec<UiStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XmlUiTable {
    pub menu_path: String,
    pub menu_type: String,
    pub username_field: SelectorSet,
    pub password_field: SelectorSet,
    pub login_button: SelectorSet,
    /// Present on the page only while the login form is displayed.
    pub login_form_marker: String,
    pub routes: IndexMap<Topic, XmlRoute>,
    pub failure_markers: Vec<String>,
    /// Error string the device reports once the session is gone.
    pub expired_error: String,
}

fn sel(selectors: &[&str]) -> SelectorSet {
    SelectorSet::new(selectors.iter().copied())
}

impl XmlUiTable {
    /// Table for the `menuData` family of interfaces.
    pub fn builtin() -> Self {
        let status = UiStep::new(
            "status",
            vec![UiClick::required(sel(&[
                "#statusMgr",
                "a[menupage='statusMgr']",
                "link=Status",
            ]))],
        );
        let lan = UiStep::new(
            "lan",
            vec![
                UiClick::required(sel(&["#localnet"])),
                UiClick::required(sel(&["#localNetStatus"])),
            ],
        );
        let wifi = UiStep::new(
            "wifi",
            vec![
                UiClick::required(sel(&["#localnet"])),
                UiClick::required(sel(&["#wlanConfig", "a[menupage='wlanBasic']"])),
                UiClick::optional(sel(&["#WLANSSIDConfBar"])),
            ],
        );
        let wan = UiStep::new(
            "wan",
            vec![
                UiClick::required(sel(&["#internet"])),
                UiClick::required(sel(&["#ethWanStatus", "p[menupage='ethWanStatus']"])),
                UiClick::optional(sel(&["#EthStateDevBar"])),
            ],
        );
        let optics = UiStep::new(
            "optics",
            vec![
                UiClick::required(sel(&["#internet"])),
                UiClick::required(sel(&["#ponopticalinfo", "p[menupage='ponopticalinfo']"])),
            ],
        );
        let usb = UiStep::new(
            "usb",
            vec![
                UiClick::required(sel(&["#homePage", "a[menupage='homePage']"])),
                UiClick::required(sel(&["#home_category_usb", "#home_category_usb a"])),
            ],
        );

        let route = |tag: &str, steps: Vec<UiStep>| XmlRoute {
            tag: tag.to_owned(),
            extra_query: Vec::new(),
            steps,
        };

        let mut routes = IndexMap::new();
        routes.insert(
            Topic::Identity,
            route("devmgr_statusmgr_lua.lua", vec![status]),
        );
        routes.insert(Topic::Optics, route("optical_info_lua.lua", vec![optics]));
        routes.insert(
            Topic::Wan,
            XmlRoute {
                extra_query: vec![
                    ("TypeUplink".into(), "2".into()),
                    ("pageType".into(), "1".into()),
                ],
                ..route("wan_internetstatus_lua.lua", vec![wan])
            },
        );
        routes.insert(Topic::Lan, route("status_lan_info_lua.lua", vec![lan]));
        routes.insert(Topic::Wifi, route("wlan_wlansssidconf_lua.lua", vec![wifi]));
        routes.insert(Topic::Usb, route("usb_homepage_lua.lua", vec![usb]));

        Self {
            menu_path: "/".into(),
            menu_type: "menuData".into(),
            username_field: sel(&["#Frm_Username", "input[name='Frm_Username']"]),
            password_field: sel(&["#Frm_Password", "input[name='Frm_Password']"]),
            login_button: sel(&["#LoginId", "input[type='submit']", "button[type='submit']"]),
            login_form_marker: "Frm_Password".into(),
            routes,
            failure_markers: vec![
                "user name or password is wrong".into(),
                "incorrect user name or password".into(),
                "login failed".into(),
            ],
            expired_error: "SessionTimeout".into(),
        }
    }
}

/// What a login attempt produced, before classification.
#[derive(Debug, Clone)]
pub enum LoginEvidence {
    /// Browser form login: whether the form was found, the resulting page
    /// and the cookies the browser now holds.
    Ui {
        form_found: bool,
        page: String,
        cookies: Vec<(String, String)>,
    },
    /// Basic-credential probe of the identity menu.
    Http(DeviceResponse),
}

pub struct XmlUiAdapter {
    client: DeviceClient,
    table: Arc<XmlUiTable>,
    driver: Mutex<Option<Box<dyn UiDriver>>>,
    ui_timeout: Duration,
}

impl XmlUiAdapter {
    pub fn new(
        client: DeviceClient,
        table: Arc<XmlUiTable>,
        driver: Option<Box<dyn UiDriver>>,
        ui_timeout: Duration,
    ) -> Self {
        Self {
            client,
            table,
            driver: Mutex::new(driver),
            ui_timeout,
        }
    }

    pub fn client(&self) -> &DeviceClient {
        &self.client
    }

    fn menu_request(&self, route: &XmlRoute) -> DeviceRequest {
        let mut request = DeviceRequest::get(self.table.menu_path.clone())
            .query("_type", self.table.menu_type.clone())
            .query("_tag", route.tag.clone());
        for (key, value) in &route.extra_query {
            request = request.query(key.clone(), value.clone());
        }
        request.query("_", cache_buster())
    }

    async fn bounded<T, F>(&self, step: &str, fut: F) -> Result<T, Error>
    where
        T: Send,
        F: Future<Output = Result<T, Error>> + Send,
    {
        tokio::time::timeout(self.ui_timeout, fut)
            .await
            .map_err(|_| Error::UiTimeout {
                step: step.to_owned(),
                timeout_secs: self.ui_timeout.as_secs(),
            })?
    }

    /// Map login evidence onto an [`AuthOutcome`].
    pub fn classify(&self, result: Result<LoginEvidence, Error>) -> AuthOutcome {
        let evidence = match result {
            Ok(evidence) => evidence,
            Err(e) => {
                return AuthOutcome::TransportFailed {
                    reason: e.to_string(),
                };
            }
        };

        match evidence {
            LoginEvidence::Ui {
                form_found: false, ..
            } => AuthOutcome::Failed {
                reason: "login form not found".into(),
            },
            LoginEvidence::Ui { page, cookies, .. } => {
                if let Some(marker) = contains_any(&page, &self.table.failure_markers) {
                    AuthOutcome::Failed { reason: marker }
                } else if page.contains(&self.table.expired_error) {
                    AuthOutcome::Failed {
                        reason: "session expired".into(),
                    }
                } else if page.contains(&self.table.login_form_marker) {
                    AuthOutcome::Failed {
                        reason: "login form still displayed".into(),
                    }
                } else {
                    AuthOutcome::Ok(SessionToken::Cookies(cookies))
                }
            }
            LoginEvidence::Http(resp) => {
                if !resp.is_ok() {
                    return AuthOutcome::Failed {
                        reason: format!("HTTP {}", resp.status),
                    };
                }
                let record = match extract_xml_root(&resp.body).and_then(normalize) {
                    Ok(record) => record,
                    Err(e) => {
                        return AuthOutcome::Failed {
                            reason: e.to_string(),
                        };
                    }
                };
                if record.error.message.as_deref() == Some(self.table.expired_error.as_str()) {
                    AuthOutcome::Failed {
                        reason: "session expired".into(),
                    }
                } else {
                    AuthOutcome::Ok(SessionToken::None)
                }
            }
        }
    }

    async fn ui_login(&self, credential: &Credential) -> Result<LoginEvidence, Error> {
        let mut guard = self.driver.lock().await;
        let Some(driver) = guard.as_mut() else {
            return Err(Error::UiDriver("no UI driver attached".into()));
        };
        let within = self.ui_timeout;
        let base = self.client.base_url().clone();

        self.bounded("login", driver.navigate_to(&base)).await?;
        let user_ok = self
            .bounded(
                "login",
                driver.fill_field(&self.table.username_field, &credential.username, within),
            )
            .await?;
        let pass_ok = self
            .bounded(
                "login",
                driver.fill_field(&self.table.password_field, credential.password(), within),
            )
            .await?;
        if !(user_ok && pass_ok) {
            return Ok(LoginEvidence::Ui {
                form_found: false,
                page: String::new(),
                cookies: Vec::new(),
            });
        }
        self.bounded("login", driver.click_element(&self.table.login_button, within))
            .await?;
        let page = self.bounded("login", driver.current_page_source()).await?;
        let cookies = self.bounded("login", driver.get_cookies()).await?;

        Ok(LoginEvidence::Ui {
            form_found: true,
            page,
            cookies,
        })
    }

    async fn basic_probe(&self, credential: &Credential) -> Result<LoginEvidence, Error> {
        let route = self
            .table
            .routes
            .get(&Topic::Identity)
            .ok_or_else(|| Error::UiDriver("no identity route configured".into()))?;
        let resp = self
            .client
            .send(self.menu_request(route).basic_auth(credential))
            .await?;
        Ok(LoginEvidence::Http(resp))
    }
}

#[async_trait]
impl ProtocolAdapter for XmlUiAdapter {
    fn variant(&self) -> AdapterVariant {
        AdapterVariant::XmlOverUi
    }

    async fn authenticate(&self, credential: &Credential, mechanism: AuthMechanism) -> AuthOutcome {
        debug!(username = %credential.username, %mechanism, "xml-ui login attempt");
        let result = match mechanism {
            AuthMechanism::StatefulSession => self.ui_login(credential).await,
            AuthMechanism::TransportCredentials => self.basic_probe(credential).await,
        };
        let outcome = self.classify(result);
        if let AuthOutcome::Ok(SessionToken::Cookies(ref cookies)) = outcome {
            self.client.add_cookies(cookies);
        }
        outcome
    }

    fn preconditions(&self, topic: Topic) -> Vec<UiStep> {
        self.table
            .routes
            .get(&topic)
            .map(|r| r.steps.clone())
            .unwrap_or_default()
    }

    async fn run_step(&self, step: &UiStep) -> Result<(), FetchError> {
        let mut guard = self.driver.lock().await;
        let Some(driver) = guard.as_mut() else {
            return Err(FetchError::PreconditionFailed {
                step: step.name.clone(),
            });
        };
        let base = self.client.base_url().clone();

        self.bounded(&step.name, driver.navigate_to(&base)).await?;
        for click in &step.clicks {
            let clicked = self
                .bounded(
                    &step.name,
                    driver.click_element(&click.selectors, self.ui_timeout),
                )
                .await?;
            if !clicked && !click.optional {
                warn!(step = %step.name, selectors = ?click.selectors, "required UI element missing");
                return Err(FetchError::PreconditionFailed {
                    step: step.name.clone(),
                });
            }
        }
        debug!(step = %step.name, "UI step complete");
        Ok(())
    }

    async fn fetch(&self, ctx: &SessionContext, topic: Topic) -> Result<NormalizedRecord, FetchError> {
        let route = self
            .table
            .routes
            .get(&topic)
            .ok_or(FetchError::NotSupported { topic })?;

        let mut request = self.menu_request(route);
        if ctx.mechanism == AuthMechanism::TransportCredentials {
            request = request.basic_auth(&ctx.credential);
        }
        let resp = self.client.send(request).await?;
        if !resp.is_ok() {
            return Err(FetchError::Http {
                status: resp.status,
            });
        }

        let record = normalize(extract_xml_root(&resp.body)?)?;
        if record.error.message.as_deref() == Some(self.table.expired_error.as_str()) {
            return Err(FetchError::SessionExpired);
        }
        if record.is_empty() {
            return Err(FetchError::NoUsableData);
        }
        Ok(record)
    }

    async fn close(&self) {
        let driver = self.driver.lock().await.take();
        if let Some(mut driver) = driver {
            match driver.close().await {
                Ok(()) => info!(host = %self.client.base_url(), "UI driver closed"),
                Err(e) => warn!(error = %e, "UI driver close failed"),
            }
        }
    }
}
