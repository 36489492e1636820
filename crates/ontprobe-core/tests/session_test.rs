#![allow(clippy::unwrap_used)]

mod support;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use ontprobe_api::{AdapterVariant, AuthMechanism, AuthOutcome, Credential};
use ontprobe_core::{
    CoreError, CredentialBook, DeviceFamily, ProbeConfig, SessionMachine, SessionState,
};

use support::{AdapterScript, FIBERHOME_LANDING, FakeFactory};

#[tokio::test]
async fn timeout_does_not_abort_the_trial() {
    let factory = FakeFactory::default().script(
        AdapterVariant::AjaxSession,
        AdapterScript::default()
            .outcome(
                "root",
                AuthMechanism::StatefulSession,
                AuthOutcome::TransportFailed {
                    reason: "Request timed out after 8s".into(),
                },
            )
            .accept("user", AuthMechanism::StatefulSession),
    );
    let config = ProbeConfig {
        credentials: CredentialBook::new(vec![
            Credential::new("root", "admin"),
            Credential::new("user", "user"),
        ]),
        ..ProbeConfig::default()
    };
    let mut machine = SessionMachine::new("10.0.0.1", &config, &factory);

    let session = machine.establish(&CancellationToken::new()).await.unwrap();

    assert_eq!(machine.state(), SessionState::Authenticated);
    assert_eq!(machine.detection().unwrap().family, DeviceFamily::Generic);
    assert_eq!(session.context.credential.username, "user");
    assert_eq!(session.context.variant, AdapterVariant::AjaxSession);
    assert_eq!(session.context.mechanism, AuthMechanism::StatefulSession);
    assert!(session.context.authenticated);

    let outcomes: Vec<_> = machine.attempts().iter().map(|a| a.outcome.as_str()).collect();
    assert_eq!(outcomes, vec!["transport_failed", "failed", "ok"]);
    assert_eq!(
        machine.attempts()[0].reason.as_deref(),
        Some("Request timed out after 8s")
    );
}

#[tokio::test]
async fn exhausted_trial_fails_and_closes_adapter() {
    let factory = FakeFactory::with_landing(FIBERHOME_LANDING)
        .script(AdapterVariant::AjaxSession, AdapterScript::default());
    let config = ProbeConfig::default();
    let mut machine = SessionMachine::new("10.0.0.2", &config, &factory);

    let err = machine.establish(&CancellationToken::new()).await.err().unwrap();

    assert!(
        matches!(err, CoreError::AuthenticationFailed { ref host, attempts: 2 } if host == "10.0.0.2"),
        "{err:?}"
    );
    assert_eq!(machine.state(), SessionState::Failed);
    assert_eq!(
        factory.events(),
        vec![
            "build ajax_session",
            "auth ajax_session root stateful_session",
            "auth ajax_session root transport_credentials",
            "close ajax_session",
        ]
    );
}

#[tokio::test]
async fn richer_session_demand_falls_through_to_transport_credentials() {
    let factory = FakeFactory::with_landing(FIBERHOME_LANDING).script(
        AdapterVariant::AjaxSession,
        AdapterScript::default()
            .outcome(
                "root",
                AuthMechanism::StatefulSession,
                AuthOutcome::NeedsRicherSession,
            )
            .accept("root", AuthMechanism::TransportCredentials),
    );
    let config = ProbeConfig::default();
    let mut machine = SessionMachine::new("10.0.0.3", &config, &factory);

    let session = machine.establish(&CancellationToken::new()).await.unwrap();

    assert_eq!(session.context.mechanism, AuthMechanism::TransportCredentials);
    assert_eq!(machine.attempts()[0].outcome, "needs_richer_session");
    assert_eq!(machine.attempts().len(), 2);
}

#[tokio::test]
async fn unavailable_variant_is_skipped() {
    // Generic: ajax first, but only the XML adapter can be built.
    let factory = FakeFactory::default().script(
        AdapterVariant::XmlOverUi,
        AdapterScript::default().accept("root", AuthMechanism::StatefulSession),
    );
    let config = ProbeConfig::default();
    let mut machine = SessionMachine::new("10.0.0.4", &config, &factory);

    let session = machine.establish(&CancellationToken::new()).await.unwrap();

    assert_eq!(session.context.variant, AdapterVariant::XmlOverUi);
    assert_eq!(
        factory.events(),
        vec![
            "build ajax_session",
            "build xml_over_ui",
            "auth xml_over_ui root stateful_session",
        ]
    );
}

#[tokio::test]
async fn losing_variant_is_closed_before_the_next_is_tried() {
    let factory = FakeFactory::default()
        .script(AdapterVariant::AjaxSession, AdapterScript::default())
        .script(
            AdapterVariant::XmlOverUi,
            AdapterScript::default().accept("admin", AuthMechanism::TransportCredentials),
        );
    let config = ProbeConfig::default();
    let mut machine = SessionMachine::new("10.0.0.5", &config, &factory);

    let session = machine.establish(&CancellationToken::new()).await.unwrap();

    assert_eq!(session.context.variant, AdapterVariant::XmlOverUi);
    let events = factory.events();
    let closed = events.iter().position(|e| e == "close ajax_session").unwrap();
    let built = events.iter().position(|e| e == "build xml_over_ui").unwrap();
    assert!(closed < built);
    assert_eq!(machine.attempts().len(), 8);
}

#[tokio::test]
async fn forced_variant_bypasses_detection_candidates() {
    let factory = FakeFactory::with_landing(FIBERHOME_LANDING).script(
        AdapterVariant::HtmlScrape,
        AdapterScript::default().accept("root", AuthMechanism::TransportCredentials),
    );
    let config = ProbeConfig {
        forced_variant: Some(AdapterVariant::HtmlScrape),
        ..ProbeConfig::default()
    };
    let mut machine = SessionMachine::new("10.0.0.6", &config, &factory);

    let session = machine.establish(&CancellationToken::new()).await.unwrap();

    assert_eq!(session.context.variant, AdapterVariant::HtmlScrape);
    assert!(!factory.events().iter().any(|e| e.contains("ajax_session")));
}

#[tokio::test]
async fn cancelled_before_start_makes_no_attempts() {
    let factory = FakeFactory::with_landing(FIBERHOME_LANDING).script(
        AdapterVariant::AjaxSession,
        AdapterScript::default().accept("root", AuthMechanism::StatefulSession),
    );
    let config = ProbeConfig::default();
    let mut machine = SessionMachine::new("10.0.0.7", &config, &factory);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = machine.establish(&cancel).await.err().unwrap();

    assert!(matches!(err, CoreError::Cancelled));
    assert!(machine.attempts().is_empty());
    assert_eq!(machine.state(), SessionState::Failed);
}

#[test]
fn illegal_transition_is_rejected() {
    let factory = FakeFactory::default();
    let config = ProbeConfig::default();
    let mut machine = SessionMachine::new("10.0.0.8", &config, &factory);

    let err = machine.transition(SessionState::Fetching).unwrap_err();

    assert!(matches!(
        err,
        CoreError::InvalidTransition { ref from, ref to } if from == "idle" && to == "fetching"
    ));
    assert_eq!(machine.state(), SessionState::Idle);
}
