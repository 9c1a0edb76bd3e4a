// ABOUTME: Integration tests for the browser login flow
// ABOUTME: Drives the callback listener with real HTTP requests against a mocked token endpoint

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gcal_auth::oauth::{
    AuthManager, AuthSettings, BrowserLauncher, GoogleEndpoints, LoginStatus, MemoryTokenStore,
    Notifier, TokenRecord, TokenStore,
};
use gcal_auth::{AuthError, AuthResult};

/// Browser stand-in that records every URL it is asked to open
#[derive(Default)]
struct RecordingBrowser {
    urls: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

struct Harness {
    manager: AuthManager,
    store: Arc<MemoryTokenStore>,
    browser: Arc<RecordingBrowser>,
    notifier: Arc<RecordingNotifier>,
}

fn broker_settings(server: &MockServer) -> AuthSettings {
    AuthSettings {
        google_oauth_server: server.uri(),
        callback_port: 0,
        session_timeout: Duration::from_secs(30),
        ..AuthSettings::default()
    }
}

fn harness(server: &MockServer, settings: AuthSettings) -> Harness {
    let store = Arc::new(MemoryTokenStore::new());
    let browser = Arc::new(RecordingBrowser::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let manager = AuthManager::builder(settings, store.clone())
        .endpoints(GoogleEndpoints::new(
            format!("{}/o/oauth2/v2/auth", server.uri()),
            format!("{}/token", server.uri()),
        ))
        .browser(browser.clone())
        .notifier(notifier.clone())
        .build();

    Harness {
        manager,
        store,
        browser,
        notifier,
    }
}

fn query_params(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

/// Play the browser being redirected back to the listener
async fn redirect(manager: &AuthManager, query: &str) -> reqwest::Result<reqwest::Response> {
    let session = manager.pending_session().expect("login should be pending");
    reqwest::get(format!(
        "http://{}/callback?{}",
        session.listener_addr, query
    ))
    .await
}

async fn mount_broker_token(server: &MockServer, body: serde_json::Value, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/google/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_completes_and_stores_tokens() {
    let server = MockServer::start().await;
    mount_broker_token(
        &server,
        serde_json::json!({"access_token": "A", "refresh_token": "R", "expires_in": 3600}),
        1,
    )
    .await;
    let h = harness(&server, broker_settings(&server));

    let attempt = h.manager.login().await.unwrap();
    assert!(!attempt.reused);
    assert_eq!(attempt.status(), LoginStatus::Pending);

    let params = query_params(&attempt.auth_url);
    let state = params["state"].clone();
    let session = h.manager.pending_session().unwrap();
    assert_eq!(params["redirect_uri"], session.redirect_uri);
    assert_eq!(params["code_challenge"], session.code_challenge);

    let before = chrono::Utc::now().timestamp_millis();
    let response = redirect(&h.manager, &format!("state={}&code=auth-code", state))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("Authentication successful"));
    let after = chrono::Utc::now().timestamp_millis();

    assert_eq!(attempt.wait().await, LoginStatus::Completed);
    assert!(h.manager.pending_session().is_none());

    let record = h.store.load_record().await.unwrap();
    assert_eq!(record.access_token.as_deref(), Some("A"));
    assert_eq!(record.refresh_token.as_deref(), Some("R"));
    let expires_at = record.expires_at_ms().unwrap();
    assert!(expires_at >= before + 3_600_000 && expires_at <= after + 3_600_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_login_reuses_pending_session() {
    let server = MockServer::start().await;
    let h = harness(&server, broker_settings(&server));

    let first = h.manager.login().await.unwrap();
    let listener = h.manager.pending_session().unwrap().listener_addr;

    let second = h.manager.login().await.unwrap();
    assert!(second.reused);
    assert_eq!(second.auth_url, first.auth_url);
    assert_eq!(h.manager.pending_session().unwrap().listener_addr, listener);

    let urls = h.browser.urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0], urls[1]);

    assert!(h.manager.cancel_login());
    assert_eq!(first.wait().await, LoginStatus::Cancelled);
    assert_eq!(second.wait().await, LoginStatus::Cancelled);
    assert!(h.manager.pending_session().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_state_mismatch_is_rejected_silently() {
    let server = MockServer::start().await;
    mount_broker_token(
        &server,
        serde_json::json!({"access_token": "A", "refresh_token": "R", "expires_in": 3600}),
        0,
    )
    .await;
    let h = harness(&server, broker_settings(&server));

    let attempt = h.manager.login().await.unwrap();

    // The listener closes the connection without answering
    let _ = redirect(&h.manager, "state=forged&code=stolen").await;

    assert_eq!(attempt.wait().await, LoginStatus::Rejected);
    assert_eq!(h.store.load_record().await.unwrap(), TokenRecord::default());
    assert!(h.notifier.messages().is_empty());
    assert!(h.manager.pending_session().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_refresh_token_fails_without_persisting() {
    let server = MockServer::start().await;
    mount_broker_token(
        &server,
        serde_json::json!({"access_token": "A", "expires_in": 3600}),
        1,
    )
    .await;
    let h = harness(&server, broker_settings(&server));

    let attempt = h.manager.login().await.unwrap();
    let state = query_params(&attempt.auth_url)["state"].clone();

    let response = redirect(&h.manager, &format!("state={}&code=auth-code", state))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let result = attempt.finish().await;
    assert!(matches!(result, Err(AuthError::OAuthFailed(_))));
    assert_eq!(h.store.load_record().await.unwrap(), TokenRecord::default());
    assert!(h
        .notifier
        .messages()
        .iter()
        .any(|m| m.contains("refresh token")));
    assert!(h.manager.pending_session().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_provider_error_fails_login() {
    let server = MockServer::start().await;
    mount_broker_token(&server, serde_json::json!({}), 0).await;
    let h = harness(&server, broker_settings(&server));

    let attempt = h.manager.login().await.unwrap();
    let state = query_params(&attempt.auth_url)["state"].clone();

    let response = redirect(&h.manager, &format!("state={}&error=access_denied", state))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    match attempt.wait().await {
        LoginStatus::Failed(msg) => assert!(msg.contains("access_denied")),
        other => panic!("unexpected status: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_client_exchanges_with_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("client_id=my-client"))
        .and(body_string_contains("client_secret=my-secret"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "A",
            "refresh_token": "R",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = AuthSettings {
        use_custom_client: true,
        google_client_id: " my-client ".to_string(),
        google_client_secret: "my-secret".to_string(),
        callback_port: 0,
        ..AuthSettings::default()
    };
    let h = harness(&server, settings);

    let attempt = h.manager.login().await.unwrap();
    let params = query_params(&attempt.auth_url);
    assert_eq!(params["client_id"], "my-client");

    redirect(&h.manager, &format!("state={}&code=auth-code", params["state"]))
        .await
        .unwrap();

    attempt.finish().await.unwrap();
    let record = h.store.load_record().await.unwrap();
    assert_eq!(record.refresh_token.as_deref(), Some("R"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_other_paths_do_not_end_the_session() {
    let server = MockServer::start().await;
    mount_broker_token(
        &server,
        serde_json::json!({"access_token": "A", "refresh_token": "R", "expires_in": 3600}),
        1,
    )
    .await;
    let h = harness(&server, broker_settings(&server));

    let attempt = h.manager.login().await.unwrap();
    let session = h.manager.pending_session().unwrap();

    let response = reqwest::get(format!("http://{}/favicon.ico", session.listener_addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(attempt.status(), LoginStatus::Pending);

    redirect(&h.manager, &format!("state={}&code=auth-code", session.state))
        .await
        .unwrap();
    assert_eq!(attempt.wait().await, LoginStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_idle_connection_does_not_block_the_redirect() {
    let server = MockServer::start().await;
    mount_broker_token(
        &server,
        serde_json::json!({"access_token": "A", "refresh_token": "R", "expires_in": 3600}),
        1,
    )
    .await;
    let settings = AuthSettings {
        session_timeout: Duration::from_secs(5),
        ..broker_settings(&server)
    };
    let h = harness(&server, settings);

    let attempt = h.manager.login().await.unwrap();
    let session = h.manager.pending_session().unwrap();

    // A preconnected socket that never sends a request
    let _idle = tokio::net::TcpStream::connect(session.listener_addr)
        .await
        .unwrap();

    let response = redirect(&h.manager, &format!("state={}&code=auth-code", session.state))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(attempt.wait().await, LoginStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_login_times_out_and_frees_the_slot() {
    let server = MockServer::start().await;
    let settings = AuthSettings {
        session_timeout: Duration::from_millis(200),
        ..broker_settings(&server)
    };
    let h = harness(&server, settings);

    let attempt = h.manager.login().await.unwrap();
    let result = attempt.finish().await;
    assert!(matches!(result, Err(AuthError::LoginTimedOut(_))));
    assert!(h.manager.pending_session().is_none());

    let retry = h.manager.login().await.unwrap();
    assert!(!retry.reused);
    assert_ne!(retry.auth_url, h.browser.urls()[0]);
    h.manager.cancel_login();
}

#[tokio::test]
async fn test_login_requires_configuration() {
    let server = MockServer::start().await;
    let settings = AuthSettings {
        callback_port: 0,
        ..AuthSettings::default()
    };
    let h = harness(&server, settings);

    let result = h.manager.login().await;
    assert!(matches!(result, Err(AuthError::NotConfigured(_))));
    assert!(h.browser.urls().is_empty());
    assert!(h.manager.pending_session().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_logout_cancels_pending_login() {
    let server = MockServer::start().await;
    let h = harness(&server, broker_settings(&server));

    let attempt = h.manager.login().await.unwrap();
    h.manager.logout().await.unwrap();

    assert_eq!(attempt.wait().await, LoginStatus::Cancelled);
    assert!(!h.manager.status().await.unwrap().logged_in);
}
