//! Tests for the auth module

use super::authenticator::extract_session_cookie;
use super::*;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_no_auth() {
    let auth = Authenticator::new(AuthConfig::None);
    let client = reqwest::Client::new();
    let req = client.get("https://example.com/db");

    let built = auth.apply(req).await.unwrap().build().unwrap();
    assert!(built.headers().get("Authorization").is_none());
}

#[tokio::test]
async fn test_basic_auth() {
    let auth = Authenticator::new(AuthConfig::basic("user", "pass"));

    let client = reqwest::Client::new();
    let req = client.get("https://example.com/db");
    let built = auth.apply(req).await.unwrap().build().unwrap();

    // base64("user:pass")
    assert_eq!(
        built.headers().get("Authorization").unwrap(),
        "Basic dXNlcjpwYXNz"
    );
}

#[tokio::test]
async fn test_session_auth_sets_cookie() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_session"))
        .and(body_string_contains("\"name\":\"admin\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Set-Cookie",
                    "AuthSession=YWRtaW46NjVBQjE; Version=1; Path=/; HttpOnly",
                )
                .set_body_json(serde_json::json!({"ok": true, "name": "admin"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let auth = Authenticator::new(AuthConfig::Session {
        session_url: format!("{}/_session", mock_server.uri()),
        username: "admin".to_string(),
        password: "secret".to_string(),
    });

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let req = client.get("https://example.com/db");
        let built = auth.apply(req).await.unwrap().build().unwrap();
        assert_eq!(
            built.headers().get("Cookie").unwrap(),
            "AuthSession=YWRtaW46NjVBQjE"
        );
    }
}

#[tokio::test]
async fn test_session_auth_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_session"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "unauthorized",
            "reason": "Name or password is incorrect."
        })))
        .mount(&mock_server)
        .await;

    let auth = Authenticator::new(AuthConfig::Session {
        session_url: format!("{}/_session", mock_server.uri()),
        username: "admin".to_string(),
        password: "wrong".to_string(),
    });

    let req = reqwest::Client::new().get("https://example.com/db");
    let err = auth.apply(req).await.unwrap_err();
    assert!(matches!(err, crate::Error::Auth { .. }));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_iam_auth_caches_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .and(body_string_contains("apikey=my-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "iam-token-1",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let auth = Authenticator::new(AuthConfig::Iam {
        api_key: "my-api-key".to_string(),
        token_url: format!("{}/identity/token", mock_server.uri()),
    });

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let req = client.get("https://example.com/db");
        let built = auth.apply(req).await.unwrap().build().unwrap();
        assert_eq!(
            built.headers().get("Authorization").unwrap(),
            "Bearer iam-token-1"
        );
    }
}

#[tokio::test]
async fn test_invalidate_forces_new_login() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let auth = Authenticator::new(AuthConfig::Iam {
        api_key: "k".to_string(),
        token_url: format!("{}/identity/token", mock_server.uri()),
    });

    let client = reqwest::Client::new();
    auth.apply(client.get("https://example.com/a")).await.unwrap();
    auth.invalidate().await;
    auth.apply(client.get("https://example.com/b")).await.unwrap();
}

#[test]
fn test_extract_session_cookie() {
    assert_eq!(
        extract_session_cookie("AuthSession=abc; Version=1; Path=/; HttpOnly"),
        Some("AuthSession=abc".to_string())
    );
    assert_eq!(extract_session_cookie("Other=1; Path=/"), None);
    assert_eq!(extract_session_cookie("AuthSession=; Path=/"), None);
}

#[test]
fn test_cached_token_expiry() {
    assert!(!CachedToken::expires_in("t".to_string(), 3600).is_expired());
    assert!(CachedToken::expires_in("t".to_string(), -100).is_expired());
    assert!(!CachedToken::new("t".to_string(), None).is_expired());
}

#[test]
fn test_auth_config_uses_token() {
    assert!(!AuthConfig::None.uses_token());
    assert!(!AuthConfig::basic("u", "p").uses_token());
    assert!(AuthConfig::iam("key").uses_token());
    if let AuthConfig::Iam { token_url, .. } = AuthConfig::iam("key") {
        assert_eq!(token_url, DEFAULT_IAM_TOKEN_URL);
    }
}
