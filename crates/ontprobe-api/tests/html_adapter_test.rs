#![allow(clippy::unwrap_used)]
// Integration tests for `HtmlAdapter` using wiremock.

use std::sync::Arc;

use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ontprobe_api::{
    AdapterVariant, AuthMechanism, AuthOutcome, Credential, DeviceClient, FetchError, HtmlAdapter,
    HtmlTable, ProtocolAdapter, SessionContext, SessionToken, Topic, TransportConfig, Value,
};

const LANDING: &str = r#"<html><form action="/cgi-bin/dologin" method="post">
    <input type="hidden" name="gnkey" value="1c2d">
    <input name="P2" type="password"></form></html>"#;

const STATUS: &str = r#"<html><table>
    <tr><td><b>Product Model:</b></td><td>&nbsp;HT818</td></tr>
    <tr><td><b>Serial Number:</b></td><td>&nbsp;20EZ7ABC123456</td></tr>
    <tr><td>MAC Address</td><td>WAN -- c0:74:ad:11:22:33 LAN -- c0:74:ad:11:22:34</td></tr>
    </table></html>"#;

async fn setup() -> (MockServer, HtmlAdapter) {
    let server = MockServer::start().await;
    let client = DeviceClient::new(
        Url::parse(&server.uri()).unwrap(),
        &TransportConfig::default(),
    )
    .unwrap();
    let adapter = HtmlAdapter::new(client, Arc::new(HtmlTable::builtin())).unwrap();
    (server, adapter)
}

fn context() -> SessionContext {
    SessionContext::new(
        "ata",
        AdapterVariant::HtmlScrape,
        Credential::new("admin", "admin"),
        AuthMechanism::StatefulSession,
        SessionToken::None,
    )
}

async fn mount_landing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING))
        .mount(server)
        .await;
}

#[tokio::test]
async fn form_login_echoes_key_and_caches_status_page() {
    let (server, adapter) = setup().await;
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path("/cgi-bin/dologin"))
        .and(body_string_contains("gnkey=1c2d"))
        .and(body_string_contains("P2=admin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = adapter
        .authenticate(&Credential::new("admin", "admin"), AuthMechanism::StatefulSession)
        .await;
    assert!(outcome.is_ok(), "got {outcome:?}");

    // Served from the login response; no status path is mounted.
    let record = adapter.fetch(&context(), Topic::Identity).await.unwrap();
    let identity = record.section("identity").unwrap().as_map().unwrap();
    assert_eq!(identity["ModelName"], Value::Text("HT818".into()));
    assert_eq!(identity["SerialNumber"], Value::Text("20EZ7ABC123456".into()));
}

#[tokio::test]
async fn attempts_remaining_is_failure() {
    let (server, adapter) = setup().await;
    mount_landing(&server).await;

    Mock::given(method("POST"))
        .and(path("/cgi-bin/dologin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>Password not recognized. Remaining Attempts: 4</p>"),
        )
        .mount(&server)
        .await;

    let outcome = adapter
        .authenticate(&Credential::new("admin", "nope"), AuthMechanism::StatefulSession)
        .await;
    assert!(matches!(outcome, AuthOutcome::Failed { .. }), "got {outcome:?}");
}

#[tokio::test]
async fn cookie_without_status_page_is_failure() {
    let (server, adapter) = setup().await;
    mount_landing(&server).await;

    // Some firmwares hand out a session cookie before checking the password.
    Mock::given(method("POST"))
        .and(path("/cgi-bin/dologin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session_id=9f8e; Path=/")
                .set_body_string("<html><p>Login</p></html>"),
        )
        .mount(&server)
        .await;

    let outcome = adapter
        .authenticate(&Credential::new("admin", "WRONG"), AuthMechanism::StatefulSession)
        .await;
    assert!(matches!(outcome, AuthOutcome::Failed { .. }), "got {outcome:?}");
    assert!(!adapter.client().cookies().is_empty());
}

#[tokio::test]
async fn fetch_stops_at_first_ok_path() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/device_status.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS))
        .expect(0)
        .mount(&server)
        .await;

    let record = adapter.fetch(&context(), Topic::Lan).await.unwrap();
    assert_eq!(
        record.find_text(&["MacLan"]).as_deref(),
        Some("c0:74:ad:11:22:34")
    );
}

#[tokio::test]
async fn empty_page_is_no_usable_data() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let err = adapter.fetch(&context(), Topic::Wan).await.unwrap_err();
    assert!(matches!(err, FetchError::NoUsableData), "got {err:?}");
}

#[tokio::test]
async fn optics_is_not_supported() {
    let (_server, adapter) = setup().await;
    let err = adapter.fetch(&context(), Topic::Optics).await.unwrap_err();
    assert!(err.is_not_supported(), "got {err:?}");
}
