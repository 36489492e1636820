#![allow(clippy::unwrap_used, dead_code)]

// Scripted adapters for driving the trial state machine and the
// aggregator without a network.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use ontprobe_api::{
    AdapterVariant, AuthMechanism, AuthOutcome, Credential, Error, FetchError, NormalizedRecord,
    ProtocolAdapter, SessionContext, Topic, UiStep, Value,
};
use ontprobe_core::{AdapterFactory, LandingPage};

pub type Log = Arc<Mutex<Vec<String>>>;

pub enum Reply {
    Record(NormalizedRecord),
    Fail(fn(Topic) -> FetchError),
}

#[derive(Default)]
pub struct AdapterScript {
    /// Outcomes keyed by (username, mechanism); anything else fails.
    pub auth: HashMap<(String, AuthMechanism), AuthOutcome>,
    pub replies: HashMap<Topic, Reply>,
    pub preconditions: HashMap<Topic, Vec<UiStep>>,
    pub failing_steps: HashSet<String>,
    /// Cancel this token once the given topic has been fetched.
    pub cancel_after: Option<(Topic, CancellationToken)>,
}

impl AdapterScript {
    pub fn accept(mut self, username: &str, mechanism: AuthMechanism) -> Self {
        self.auth.insert(
            (username.to_owned(), mechanism),
            AuthOutcome::Ok(ontprobe_api::SessionToken::None),
        );
        self
    }

    pub fn outcome(
        mut self,
        username: &str,
        mechanism: AuthMechanism,
        outcome: AuthOutcome,
    ) -> Self {
        self.auth.insert((username.to_owned(), mechanism), outcome);
        self
    }

    pub fn reply(mut self, topic: Topic, record: NormalizedRecord) -> Self {
        self.replies.insert(topic, Reply::Record(record));
        self
    }

    pub fn fail(mut self, topic: Topic, err: fn(Topic) -> FetchError) -> Self {
        self.replies.insert(topic, Reply::Fail(err));
        self
    }

    pub fn step(mut self, topic: Topic, name: &str) -> Self {
        self.preconditions
            .entry(topic)
            .or_default()
            .push(UiStep::new(name, Vec::new()));
        self
    }
}

pub struct FakeAdapter {
    variant: AdapterVariant,
    script: AdapterScript,
    log: Log,
}

impl FakeAdapter {
    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ProtocolAdapter for FakeAdapter {
    fn variant(&self) -> AdapterVariant {
        self.variant
    }

    async fn authenticate(&self, credential: &Credential, mechanism: AuthMechanism) -> AuthOutcome {
        self.record(format!("auth {} {} {mechanism}", self.variant, credential.username));
        self.script
            .auth
            .get(&(credential.username.clone(), mechanism))
            .cloned()
            .unwrap_or(AuthOutcome::Failed {
                reason: "rejected".into(),
            })
    }

    fn preconditions(&self, topic: Topic) -> Vec<UiStep> {
        self.script
            .preconditions
            .get(&topic)
            .cloned()
            .unwrap_or_default()
    }

    async fn run_step(&self, step: &UiStep) -> Result<(), FetchError> {
        self.record(format!("step {}", step.name));
        if self.script.failing_steps.contains(&step.name) {
            return Err(FetchError::PreconditionFailed {
                step: step.name.clone(),
            });
        }
        Ok(())
    }

    async fn fetch(
        &self,
        _ctx: &SessionContext,
        topic: Topic,
    ) -> Result<NormalizedRecord, FetchError> {
        self.record(format!("fetch {topic}"));
        let result = match self.script.replies.get(&topic) {
            Some(Reply::Record(record)) => Ok(record.clone()),
            Some(Reply::Fail(err)) => Err(err(topic)),
            None => Err(FetchError::NoUsableData),
        };
        if let Some((ref after, ref token)) = self.script.cancel_after {
            if *after == topic {
                token.cancel();
            }
        }
        result
    }

    async fn close(&self) {
        self.record(format!("close {}", self.variant));
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub landing: Option<LandingPage>,
    pub scripts: Mutex<HashMap<AdapterVariant, AdapterScript>>,
    /// Used for any variant without a one-shot script.
    pub template: Option<fn() -> AdapterScript>,
    /// Host whose landing-page request panics.
    pub panic_host: Option<String>,
    pub log: Log,
}

impl FakeFactory {
    pub fn with_landing(body: &str) -> Self {
        Self {
            landing: Some(LandingPage {
                status: 200,
                body: body.to_owned(),
                server: None,
            }),
            ..Self::default()
        }
    }

    pub fn script(self, variant: AdapterVariant, script: AdapterScript) -> Self {
        self.scripts.lock().unwrap().insert(variant, script);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterFactory for FakeFactory {
    async fn landing_page(&self, host: &str) -> Result<LandingPage, Error> {
        if self.panic_host.as_deref() == Some(host) {
            panic!("landing page for {host} blew up");
        }
        self.landing.clone().ok_or(Error::Timeout { timeout_secs: 8 })
    }

    async fn build(
        &self,
        _host: &str,
        variant: AdapterVariant,
    ) -> Result<Box<dyn ProtocolAdapter>, Error> {
        self.log.lock().unwrap().push(format!("build {variant}"));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&variant)
            .or_else(|| self.template.map(|make| make()))
            .ok_or_else(|| Error::UiDriver(format!("{variant} unavailable")))?;
        Ok(Box::new(FakeAdapter {
            variant,
            script,
            log: Arc::clone(&self.log),
        }))
    }
}

/// Single-section record built from string pairs.
pub fn record(section: &str, fields: &[(&str, &str)]) -> NormalizedRecord {
    let map: IndexMap<String, Value> = fields
        .iter()
        .map(|(k, v)| ((*k).to_owned(), Value::scalar(v)))
        .collect();
    let mut record = NormalizedRecord::default();
    record.insert(section, Value::Map(map));
    record
}

pub const FIBERHOME_LANDING: &str =
    "<html><head><title>HG6145F</title></head><body>FiberHome</body></html>";
