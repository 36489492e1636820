// ── Prober and fleet runner ──
//
// One host end to end: detect, authenticate, aggregate, close. A run
// always yields a `ProbeReport`, whatever went wrong along the way.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ontprobe_api::UiDriverLauncher;

use crate::aggregator::Aggregator;
use crate::backend::{AdapterFactory, HttpAdapterFactory};
use crate::config::ProbeConfig;
use crate::error::CoreError;
use crate::model::{DeviceRecord, Finding, TopicStatus};
use crate::session::{AuthAttempt, SessionMachine, SessionState};

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub record: DeviceRecord,
    pub state: SessionState,
    pub attempts: Vec<AuthAttempt>,
    pub findings: Vec<Finding>,
}

impl ProbeReport {
    pub fn is_authenticated(&self) -> bool {
        self.record.variant.is_some()
    }
}

#[derive(Clone)]
pub struct Prober {
    config: Arc<ProbeConfig>,
    factory: Arc<dyn AdapterFactory>,
}

impl Prober {
    pub fn new(config: Arc<ProbeConfig>, factory: Arc<dyn AdapterFactory>) -> Self {
        Self { config, factory }
    }

    /// Real HTTP adapters, with an optional browser launcher for
    /// form-login devices.
    pub fn with_launcher(
        config: Arc<ProbeConfig>,
        launcher: Option<Arc<dyn UiDriverLauncher>>,
    ) -> Self {
        let factory = Arc::new(HttpAdapterFactory::new(Arc::clone(&config), launcher));
        Self { config, factory }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn probe(&self, host: &str, cancel: &CancellationToken) -> ProbeReport {
        let mut record = DeviceRecord::new(host);
        let mut findings = Vec::new();
        let mut machine = SessionMachine::new(host, &self.config, self.factory.as_ref());

        let established = machine.establish(cancel).await;
        if let Some(detection) = machine.detection() {
            record.family = Some(detection.family);
            record.model_hint.clone_from(&detection.model_hint);
        }

        let session = match established {
            Ok(session) => session,
            Err(e) => {
                let status = match e {
                    CoreError::Cancelled => TopicStatus::Cancelled,
                    ref other => TopicStatus::Failed {
                        reason: other.to_string(),
                    },
                };
                if let CoreError::AuthenticationFailed { attempts, .. } = e {
                    findings.push(Finding::AuthenticationFailed { attempts });
                }
                warn!(host, error = %e, "probe ended before fetching");
                for topic in self.config.ordered_topics() {
                    record.topics.insert(topic, status.clone());
                }
                return ProbeReport {
                    record,
                    state: machine.state(),
                    attempts: machine.attempts().to_vec(),
                    findings,
                };
            }
        };

        record.variant = Some(session.context.variant);
        record.mechanism = Some(session.context.mechanism);
        record.username = Some(session.context.credential.username.clone());

        if let Err(e) = machine.transition(SessionState::Fetching) {
            warn!(host, error = %e, "cannot start fetching");
        } else {
            let aggregator =
                Aggregator::new(&self.config, session.adapter.as_ref(), &session.context);
            findings.extend(aggregator.run(&mut record, cancel).await);
            if let Err(e) = machine.transition(SessionState::Done) {
                warn!(host, error = %e, "cannot finish session");
            }
        }
        session.adapter.close().await;

        info!(
            host,
            model = record.model_code.as_deref().unwrap_or("-"),
            findings = findings.len(),
            "probe complete"
        );
        ProbeReport {
            record,
            state: machine.state(),
            attempts: machine.attempts().to_vec(),
            findings,
        }
    }

    /// Probe `hosts` in parallel, bounded by `max_parallel_hosts`.
    /// Reports come back in input order.
    pub async fn probe_all(&self, hosts: &[String], cancel: &CancellationToken) -> Vec<ProbeReport> {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_hosts.max(1)));
        let mut tasks = JoinSet::new();

        for (index, host) in hosts.iter().cloned().enumerate() {
            let prober = self.clone();
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (index, prober.probe(&host, &cancel).await)
            });
        }

        let mut slots: Vec<Option<ProbeReport>> = vec![None; hosts.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => warn!(error = %e, "host task aborted"),
            }
        }
        slots
            .into_iter()
            .zip(hosts)
            .map(|(slot, host)| slot.unwrap_or_else(|| self.aborted_report(host)))
            .collect()
    }

    /// Stand-in for a host whose task died before producing a report.
    fn aborted_report(&self, host: &str) -> ProbeReport {
        let mut record = DeviceRecord::new(host);
        let status = TopicStatus::Failed {
            reason: "task aborted before reporting".into(),
        };
        for topic in self.config.ordered_topics() {
            record.topics.insert(topic, status.clone());
        }
        ProbeReport {
            record,
            state: SessionState::Failed,
            attempts: Vec::new(),
            findings: Vec::new(),
        }
    }
}
