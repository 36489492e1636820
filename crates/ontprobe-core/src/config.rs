// ── Probe configuration ──
//
// Everything the engine needs, built once and shared read-only across
// hosts. Vendor tables are explicit values here rather than globals so
// tests and config files can swap them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ontprobe_api::transport::DEFAULT_REQUEST_TIMEOUT;
use ontprobe_api::{AdapterVariant, AjaxTable, Credential, HtmlTable, Topic, TlsMode, XmlUiTable};

use crate::detect::DeviceFamily;
use crate::resolver::ModelMappingTable;

pub const DEFAULT_UI_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_PARALLEL_HOSTS: usize = 4;

/// Ordered credential candidates per device family, most privileged first.
#[derive(Debug, Clone)]
pub struct CredentialBook {
    by_family: HashMap<DeviceFamily, Vec<Credential>>,
    fallback: Vec<Credential>,
}

impl CredentialBook {
    pub fn new(fallback: Vec<Credential>) -> Self {
        Self {
            by_family: HashMap::new(),
            fallback,
        }
    }

    /// Factory-default accounts only; privileged operator accounts come
    /// from configuration.
    pub fn builtin() -> Self {
        Self::new(vec![
            Credential::new("root", "admin"),
            Credential::new("admin", "admin"),
        ])
        .with_family(DeviceFamily::Fiberhome, vec![Credential::new("root", "admin")])
        .with_family(DeviceFamily::Huawei, vec![Credential::new("root", "admin")])
        .with_family(DeviceFamily::Zte, vec![Credential::new("root", "admin")])
        .with_family(DeviceFamily::Grandstream, vec![Credential::new("admin", "admin")])
    }

    pub fn with_family(mut self, family: DeviceFamily, trial: Vec<Credential>) -> Self {
        self.by_family.insert(family, trial);
        self
    }

    /// Prepend privileged candidates to a family's trial.
    pub fn prepend(&mut self, family: DeviceFamily, mut first: Vec<Credential>) {
        let fallback = self.fallback.clone();
        let trial = self.by_family.entry(family).or_insert(fallback);
        first.append(trial);
        *trial = first;
    }

    pub fn trial(&self, family: DeviceFamily) -> &[Credential] {
        self.by_family
            .get(&family)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.fallback)
    }
}

impl Default for CredentialBook {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub request_timeout: Duration,
    pub ui_timeout: Duration,
    pub tls: TlsMode,
    pub max_parallel_hosts: usize,
    /// Skip detection and try only this adapter variant.
    pub forced_variant: Option<AdapterVariant>,
    pub topics: Vec<Topic>,
    pub credentials: CredentialBook,
    pub models: Arc<ModelMappingTable>,
    pub ajax: Arc<AjaxTable>,
    pub xml_ui: Arc<XmlUiTable>,
    pub html: Arc<HtmlTable>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ui_timeout: DEFAULT_UI_TIMEOUT,
            tls: TlsMode::DangerAcceptInvalid,
            max_parallel_hosts: DEFAULT_MAX_PARALLEL_HOSTS,
            forced_variant: None,
            topics: Topic::ALL.to_vec(),
            credentials: CredentialBook::builtin(),
            models: Arc::new(ModelMappingTable::builtin()),
            ajax: Arc::new(AjaxTable::builtin()),
            xml_ui: Arc::new(XmlUiTable::builtin()),
            html: Arc::new(HtmlTable::builtin()),
        }
    }
}

impl ProbeConfig {
    /// Topics in run order: identity first, then the rest as configured.
    pub fn ordered_topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::Identity];
        for topic in &self.topics {
            if !topics.contains(topic) {
                topics.push(*topic);
            }
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_always_leads() {
        let config = ProbeConfig {
            topics: vec![Topic::Wifi, Topic::Optics, Topic::Wifi],
            ..ProbeConfig::default()
        };
        assert_eq!(
            config.ordered_topics(),
            vec![Topic::Identity, Topic::Wifi, Topic::Optics]
        );
    }

    #[test]
    fn prepended_credentials_come_first() {
        let mut book = CredentialBook::builtin();
        book.prepend(DeviceFamily::Zte, vec![Credential::new("superadmin", "x")]);
        let names: Vec<_> = book
            .trial(DeviceFamily::Zte)
            .iter()
            .map(|c| c.username.as_str())
            .collect();
        assert_eq!(names, vec!["superadmin", "root"]);
    }

    #[test]
    fn unknown_family_uses_fallback() {
        let book = CredentialBook::builtin();
        assert_eq!(book.trial(DeviceFamily::Generic).len(), 2);
    }
}
