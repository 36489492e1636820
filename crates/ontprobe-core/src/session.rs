// ── Session / credential trial state machine ──
//
// Works out how to talk to an unknown device: detect its family, then
// walk adapter variants × credentials × mechanisms until one adapter
// reports `AuthOutcome::Ok`. Adapters that lose are closed immediately.

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ontprobe_api::{
    AdapterVariant, AuthMechanism, AuthOutcome, Credential, ProtocolAdapter, SessionContext,
    SessionToken,
};

use crate::backend::AdapterFactory;
use crate::config::ProbeConfig;
use crate::detect::{Detection, classify_landing_page};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Idle,
    ProbingAuth,
    Authenticated,
    Fetching,
    Done,
    Failed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::ProbingAuth)
                | (Self::ProbingAuth, Self::Authenticated | Self::Failed)
                | (Self::Authenticated, Self::Fetching)
                | (Self::Fetching, Self::Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One authentication attempt, as recorded for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAttempt {
    pub variant: AdapterVariant,
    pub username: String,
    pub mechanism: AuthMechanism,
    pub outcome: String,
    pub reason: Option<String>,
}

/// A winning adapter plus the frozen session context.
pub struct EstablishedSession {
    pub context: SessionContext,
    pub adapter: Box<dyn ProtocolAdapter>,
}

pub struct SessionMachine<'a> {
    host: String,
    config: &'a ProbeConfig,
    factory: &'a dyn AdapterFactory,
    state: SessionState,
    detection: Option<Detection>,
    attempts: Vec<AuthAttempt>,
}

impl<'a> SessionMachine<'a> {
    pub fn new(
        host: impl Into<String>,
        config: &'a ProbeConfig,
        factory: &'a dyn AdapterFactory,
    ) -> Self {
        Self {
            host: host.into(),
            config,
            factory,
            state: SessionState::Idle,
            detection: None,
            attempts: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn detection(&self) -> Option<&Detection> {
        self.detection.as_ref()
    }

    pub fn attempts(&self) -> &[AuthAttempt] {
        &self.attempts
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(host = %self.host, from = %self.state, to = %next, "session transition");
        self.state = next;
        Ok(())
    }

    async fn detect(&mut self) -> Detection {
        let detection = match self.factory.landing_page(&self.host).await {
            Ok(page) => classify_landing_page(&page.body, page.server.as_deref()),
            Err(e) => {
                warn!(host = %self.host, error = %e, "landing page unavailable; assuming generic device");
                Detection::generic()
            }
        };
        info!(
            host = %self.host,
            family = %detection.family,
            hint = ?detection.model_hint,
            "device family detected"
        );
        self.detection = Some(detection.clone());
        detection
    }

    fn record_attempt(
        &mut self,
        variant: AdapterVariant,
        credential: &Credential,
        mechanism: AuthMechanism,
        outcome: &AuthOutcome,
    ) {
        let reason = match outcome {
            AuthOutcome::Failed { reason } | AuthOutcome::TransportFailed { reason } => {
                Some(reason.clone())
            }
            AuthOutcome::Ok(_) | AuthOutcome::NeedsRicherSession => None,
        };
        debug!(
            host = %self.host,
            %variant,
            username = %credential.username,
            %mechanism,
            outcome = outcome.label(),
            "auth attempt"
        );
        self.attempts.push(AuthAttempt {
            variant,
            username: credential.username.clone(),
            mechanism,
            outcome: outcome.label().to_owned(),
            reason,
        });
    }

    /// Walk the credential trial against one adapter.
    async fn try_adapter(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        trial: &[Credential],
        cancel: &CancellationToken,
    ) -> Option<(Credential, AuthMechanism, SessionToken)> {
        let variant = adapter.variant();
        for credential in trial {
            for mechanism in AuthMechanism::ORDER {
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome = adapter.authenticate(credential, mechanism).await;
                self.record_attempt(variant, credential, mechanism, &outcome);
                if let AuthOutcome::Ok(token) = outcome {
                    return Some((credential.clone(), mechanism, token));
                }
            }
        }
        None
    }

    /// Drive `Idle → ProbingAuth → Authenticated | Failed`.
    pub async fn establish(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<EstablishedSession, CoreError> {
        self.transition(SessionState::ProbingAuth)?;

        let detection = self.detect().await;
        let variants = self
            .config
            .forced_variant
            .map_or_else(|| detection.family.candidate_variants(), |v| vec![v]);
        let trial = self.config.credentials.trial(detection.family).to_vec();

        for variant in variants {
            if cancel.is_cancelled() {
                break;
            }
            let adapter = match self.factory.build(&self.host, variant).await {
                Ok(adapter) => adapter,
                Err(e) => {
                    warn!(host = %self.host, %variant, error = %e, "adapter unavailable");
                    continue;
                }
            };

            if let Some((credential, mechanism, token)) =
                self.try_adapter(adapter.as_ref(), &trial, cancel).await
            {
                self.transition(SessionState::Authenticated)?;
                info!(
                    host = %self.host,
                    %variant,
                    username = %credential.username,
                    %mechanism,
                    "session established"
                );
                let context =
                    SessionContext::new(self.host.clone(), variant, credential, mechanism, token);
                return Ok(EstablishedSession { context, adapter });
            }
            adapter.close().await;
        }

        self.transition(SessionState::Failed)?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        warn!(host = %self.host, attempts = self.attempts.len(), "authentication exhausted");
        Err(CoreError::AuthenticationFailed {
            host: self.host.clone(),
            attempts: self.attempts.len(),
        })
    }
}
