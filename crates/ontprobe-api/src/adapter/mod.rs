// ── Vendor protocol adapters ──
//
// Three incompatible telemetry mechanisms behind one contract. Each
// adapter owns its vendor markers and classifies its own login responses;
// callers only see `AuthOutcome`, `NormalizedRecord` and `FetchError`.

pub mod ajax;
pub mod html;
pub mod xml_ui;

use async_trait::async_trait;

use crate::auth::{AuthMechanism, AuthOutcome, Credential};
use crate::driver::UiStep;
use crate::error::FetchError;
use crate::record::NormalizedRecord;
use crate::session::{AdapterVariant, SessionContext};
use crate::topic::Topic;

pub use ajax::{AjaxAdapter, AjaxMethod, AjaxTable};
pub use html::{FieldPattern, HtmlAdapter, HtmlRoute, HtmlTable};
pub use xml_ui::{XmlRoute, XmlUiAdapter, XmlUiTable};

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn variant(&self) -> AdapterVariant;

    /// Present `credential` using `mechanism` and classify the result.
    /// Never errors: transport failures come back as
    /// [`AuthOutcome::TransportFailed`].
    async fn authenticate(&self, credential: &Credential, mechanism: AuthMechanism) -> AuthOutcome;

    /// UI steps that must have run in this session before `topic` can be
    /// fetched. Empty for adapters that do not drive a browser.
    fn preconditions(&self, _topic: Topic) -> Vec<UiStep> {
        Vec::new()
    }

    async fn run_step(&self, _step: &UiStep) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch(&self, ctx: &SessionContext, topic: Topic) -> Result<NormalizedRecord, FetchError>;

    /// Release anything held (browser sessions). Idempotent.
    async fn close(&self) {}
}

/// Case-insensitive marker search shared by the classifiers.
pub(crate) fn contains_any(haystack: &str, markers: &[String]) -> Option<String> {
    let lower = haystack.to_lowercase();
    markers
        .iter()
        .find(|m| lower.contains(&m.to_lowercase()))
        .cloned()
}

/// Cache-busting `_` query value, in milliseconds.
pub(crate) fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
