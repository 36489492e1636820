// ── Adapter construction ──
//
// The trial state machine never builds clients or launches browsers
// itself; it asks an `AdapterFactory`. The HTTP factory below is the real
// one, tests substitute scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use ontprobe_api::{
    AdapterVariant, AjaxAdapter, DeviceClient, Error, HtmlAdapter, ProtocolAdapter,
    TransportConfig, UiDriverLauncher, XmlUiAdapter,
};

use crate::config::ProbeConfig;

/// Unauthenticated landing page of a device.
#[derive(Debug, Clone)]
pub struct LandingPage {
    pub status: u16,
    pub body: String,
    pub server: Option<String>,
}

#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn landing_page(&self, host: &str) -> Result<LandingPage, Error>;

    /// Build a fresh adapter, with its own client, for `variant`.
    async fn build(
        &self,
        host: &str,
        variant: AdapterVariant,
    ) -> Result<Box<dyn ProtocolAdapter>, Error>;
}

pub struct HttpAdapterFactory {
    config: Arc<ProbeConfig>,
    launcher: Option<Arc<dyn UiDriverLauncher>>,
}

impl HttpAdapterFactory {
    pub fn new(config: Arc<ProbeConfig>, launcher: Option<Arc<dyn UiDriverLauncher>>) -> Self {
        Self { config, launcher }
    }

    fn client(&self, host: &str) -> Result<DeviceClient, Error> {
        let transport = TransportConfig {
            tls: self.config.tls,
            timeout: self.config.request_timeout,
            cookie_jar: None,
        }
        .with_cookie_jar();
        DeviceClient::new(DeviceClient::base_url_for(host)?, &transport)
    }
}

#[async_trait]
impl AdapterFactory for HttpAdapterFactory {
    async fn landing_page(&self, host: &str) -> Result<LandingPage, Error> {
        let resp = self.client(host)?.get("/").await?;
        Ok(LandingPage {
            status: resp.status,
            server: resp.header("server").map(str::to_owned),
            body: resp.body,
        })
    }

    async fn build(
        &self,
        host: &str,
        variant: AdapterVariant,
    ) -> Result<Box<dyn ProtocolAdapter>, Error> {
        let client = self.client(host)?;
        debug!(host, %variant, "building adapter");
        match variant {
            AdapterVariant::AjaxSession => Ok(Box::new(AjaxAdapter::new(
                client,
                Arc::clone(&self.config.ajax),
            ))),
            AdapterVariant::HtmlScrape => Ok(Box::new(HtmlAdapter::new(
                client,
                Arc::clone(&self.config.html),
            )?)),
            AdapterVariant::XmlOverUi => {
                let driver = match self.launcher {
                    Some(ref launcher) => Some(launcher.launch().await?),
                    None => {
                        warn!(host, "no UI driver launcher configured; form login unavailable");
                        None
                    }
                };
                Ok(Box::new(XmlUiAdapter::new(
                    client,
                    Arc::clone(&self.config.xml_ui),
                    driver,
                    self.config.ui_timeout,
                )))
            }
        }
    }
}
