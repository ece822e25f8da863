#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use schwab_history::client::{HttpTransport, RetryPolicy};
use schwab_history::credentials::{CredentialStore, Credentials, OAuthRefresher};
use secrecy::SecretString;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/v1/oauth/token";

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

pub fn token_url(server: &MockServer) -> String {
    format!("{}{TOKEN_PATH}", server.uri())
}

/// Token endpoint that hands out `access_token` and expects `times` calls.
pub async fn mount_token_endpoint(server: &MockServer, access_token: &str, times: u64) {
    let body = format!(
        r#"{{"access_token":"{access_token}","refresh_token":"rotated-refresh","token_type":"Bearer","expires_in":1800}}"#
    );
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .expect(times)
        .mount(server)
        .await;
}

/// Credential store holding a still-valid `access_token`, refreshing
/// against `server`.
pub fn credential_store(server: &MockServer, access_token: &str) -> Arc<CredentialStore> {
    let client = reqwest::Client::new();
    let refresher = OAuthRefresher::new(client, "app-key", SecretString::from("app-secret"))
        .with_token_url(token_url(server));
    let credentials = Credentials::new(
        access_token,
        "refresh-1",
        Utc::now() + chrono::Duration::hours(1),
    );
    Arc::new(CredentialStore::new(credentials, Arc::new(refresher)))
}

pub fn http_transport(server: &MockServer, store: Arc<CredentialStore>) -> HttpTransport {
    HttpTransport::new(reqwest::Client::new(), store)
        .with_base_url(server.uri())
        .with_retry_policy(fast_retry())
}
