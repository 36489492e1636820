// ── Device telemetry aggregator ──
//
// Runs the topic list against an established session and folds every
// normalized record into the `DeviceRecord`. A failing topic is recorded
// as a finding and the run moves on.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ontprobe_api::{FetchError, ProtocolAdapter, SessionContext, Topic};

use crate::config::ProbeConfig;
use crate::convert;
use crate::model::{
    Confidence, DeviceRecord, Finding, PhysicalSerialInfo, SerialSource, TopicStatus,
    WifiAssessment,
};
use crate::resolver::is_unknown;
use crate::serial::{self, PhysicalSerial};

pub struct Aggregator<'a> {
    config: &'a ProbeConfig,
    adapter: &'a dyn ProtocolAdapter,
    context: &'a SessionContext,
    satisfied_steps: HashSet<String>,
    findings: Vec<Finding>,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        config: &'a ProbeConfig,
        adapter: &'a dyn ProtocolAdapter,
        context: &'a SessionContext,
    ) -> Self {
        Self {
            config,
            adapter,
            context,
            satisfied_steps: HashSet::new(),
            findings: Vec::new(),
        }
    }

    /// Fetch every configured topic into `record`; returns the findings.
    pub async fn run(
        mut self,
        record: &mut DeviceRecord,
        cancel: &CancellationToken,
    ) -> Vec<Finding> {
        let topics = self.config.ordered_topics();
        for topic in &topics {
            record.topics.insert(*topic, TopicStatus::Pending);
        }

        for (i, topic) in topics.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                info!(host = %self.context.host, remaining = topics.len() - i, "probe cancelled");
                for rest in &topics[i..] {
                    record.topics.insert(*rest, TopicStatus::Cancelled);
                }
                break;
            }

            let status = self.run_topic(topic, record).await;
            record.topics.insert(topic, status);

            if topic == Topic::Identity {
                self.finish_identity(record);
            }
        }

        self.assess_wifi(record);
        self.findings
    }

    async fn run_topic(&mut self, topic: Topic, record: &mut DeviceRecord) -> TopicStatus {
        let result = match self.satisfy_preconditions(topic).await {
            Ok(()) => self.adapter.fetch(self.context, topic).await,
            Err(e) => Err(e),
        };
        // A reply with none of the topic's fields counts as no data.
        let result = result.and_then(|normalized| {
            if convert::apply(topic, &normalized, record) {
                Ok(())
            } else {
                Err(FetchError::NoUsableData)
            }
        });

        match result {
            Ok(()) => {
                debug!(host = %self.context.host, %topic, "topic fetched");
                TopicStatus::Fetched
            }
            Err(FetchError::NotSupported { .. }) => {
                debug!(host = %self.context.host, %topic, "topic not supported by adapter");
                TopicStatus::NotSupported
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(host = %self.context.host, %topic, error = %reason, "topic fetch failed");
                self.findings.push(Finding::TopicFetchFailed {
                    topic,
                    reason: reason.clone(),
                });
                TopicStatus::Failed { reason }
            }
        }
    }

    /// Run the topic's UI steps that have not yet succeeded this session.
    async fn satisfy_preconditions(&mut self, topic: Topic) -> Result<(), FetchError> {
        for step in self.adapter.preconditions(topic) {
            if self.satisfied_steps.contains(&step.name) {
                continue;
            }
            debug!(host = %self.context.host, %topic, step = %step.name, "running UI step");
            self.adapter.run_step(&step).await?;
            self.satisfied_steps.insert(step.name);
        }
        Ok(())
    }

    /// Model resolution and serial derivation, run whether identity
    /// succeeded or not.
    fn finish_identity(&mut self, record: &mut DeviceRecord) {
        let raw = record.model_name_raw.clone().unwrap_or_default();
        let code = self.config.models.resolve(&raw);
        if is_unknown(&code) {
            warn!(host = %self.context.host, raw = %raw, "model not in mapping table");
            self.findings.push(Finding::UnresolvedModel { raw });
        } else {
            record.model_display_name = self.config.models.display_name(&code).map(str::to_owned);
        }
        record.model_code = Some(code);

        if record.serial_logical.is_none() {
            if let Some(ref reported) = record.serial_physical {
                record.serial_logical = serial::physical_to_logical(&reported.value);
            }
        }

        let Some(logical) = record.serial_logical.clone() else {
            return;
        };
        if record.serial_physical.is_none() {
            match serial::logical_to_physical(&logical) {
                PhysicalSerial::Derived(value) => {
                    record.serial_physical = Some(PhysicalSerialInfo {
                        value,
                        source: SerialSource::Derived,
                    });
                }
                PhysicalSerial::Undeterminable => {
                    debug!(host = %self.context.host, serial = %logical, "no serial transform");
                    self.findings.push(Finding::UndeterminableSerialTransform {
                        serial: logical.clone(),
                    });
                }
            }
        }
        record.serial_physical_display = serial::physical_display_decimal(&logical);
    }

    fn assess_wifi(&self, record: &mut DeviceRecord) {
        if !record.wifi_networks.is_empty() {
            record.wifi_assessment = Some(WifiAssessment {
                working: true,
                confidence: Confidence::Verified,
                basis: format!("{} network(s) read from device", record.wifi_networks.len()),
            });
            return;
        }

        let attempted = matches!(
            record.topic_status(Topic::Wifi),
            Some(TopicStatus::Fetched | TopicStatus::Failed { .. })
        );
        if attempted {
            debug!(host = %self.context.host, "wifi unreadable; inferring from reachability");
            record.wifi_assessment = Some(WifiAssessment {
                working: true,
                confidence: Confidence::Inferred,
                basis: "device reachable, wifi configuration not readable".into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use ontprobe_api::{
        AdapterVariant, AuthMechanism, AuthOutcome, Credential, NormalizedRecord, SessionToken,
        Value,
    };

    use super::*;

    struct IdentityOnly(NormalizedRecord);

    #[async_trait]
    impl ProtocolAdapter for IdentityOnly {
        fn variant(&self) -> AdapterVariant {
            AdapterVariant::AjaxSession
        }

        async fn authenticate(&self, _: &Credential, _: AuthMechanism) -> AuthOutcome {
            AuthOutcome::Ok(SessionToken::None)
        }

        async fn fetch(
            &self,
            _: &SessionContext,
            topic: Topic,
        ) -> Result<NormalizedRecord, FetchError> {
            match topic {
                Topic::Identity => Ok(self.0.clone()),
                other => Err(FetchError::NotSupported { topic: other }),
            }
        }
    }

    fn context() -> SessionContext {
        SessionContext::new(
            "10.0.0.1",
            AdapterVariant::AjaxSession,
            Credential::new("root", "admin"),
            AuthMechanism::StatefulSession,
            SessionToken::None,
        )
    }

    #[tokio::test]
    async fn unrecognised_fields_fail_the_topic() {
        let mut identity = NormalizedRecord::default();
        identity.insert("get_base_info", {
            let mut m = indexmap::IndexMap::new();
            m.insert("Uptime".to_owned(), Value::Text("86400".into()));
            Value::Map(m)
        });
        let adapter = IdentityOnly(identity);
        let config = ProbeConfig::default();
        let ctx = context();
        let mut record = DeviceRecord::new("10.0.0.1");

        let findings = Aggregator::new(&config, &adapter, &ctx)
            .run(&mut record, &CancellationToken::new())
            .await;

        assert_eq!(
            record.topic_status(Topic::Identity),
            Some(&TopicStatus::Failed {
                reason: FetchError::NoUsableData.to_string()
            })
        );
        assert!(findings.contains(&Finding::TopicFetchFailed {
            topic: Topic::Identity,
            reason: FetchError::NoUsableData.to_string(),
        }));
    }

    #[tokio::test]
    async fn unsupported_topics_are_not_findings() {
        let mut identity = NormalizedRecord::default();
        identity.insert("get_base_info", {
            let mut m = indexmap::IndexMap::new();
            m.insert("ModelName".to_owned(), Value::Text("HG6145F".into()));
            m.insert("gponsn".to_owned(), Value::Text("464854549E222B98".into()));
            Value::Map(m)
        });
        let adapter = IdentityOnly(identity);
        let config = ProbeConfig::default();
        let ctx = context();
        let mut record = DeviceRecord::new("10.0.0.1");

        let findings = Aggregator::new(&config, &adapter, &ctx)
            .run(&mut record, &CancellationToken::new())
            .await;

        assert!(findings.is_empty(), "{findings:?}");
        assert_eq!(record.topic_status(Topic::Identity), Some(&TopicStatus::Fetched));
        assert_eq!(record.topic_status(Topic::Usb), Some(&TopicStatus::NotSupported));
        assert!(record.wifi_assessment.is_none());
        assert_eq!(record.serial_logical.as_deref(), Some("FHTT9E222B98"));
        assert_eq!(
            record.serial_physical.as_ref().map(|p| p.source),
            Some(SerialSource::Reported)
        );
    }
}
