// Integration tests for token resolution in the broker

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Duration;
use daylog::broker::{BrokerError, BrokerOptions, PersistFailure, TokenBroker};
use daylog::credentials::{FileTokenStore, Token, TokenStore};
use daylog::oauth::{Authorizer, OAuthConfig};
use mockito::{Matcher, Server};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory store that counts saves.
#[derive(Default)]
struct MemoryStore {
    tokens: Mutex<Option<Token>>,
    saves: AtomicUsize,
    fail_saves: bool,
}

impl MemoryStore {
    fn with_token(token: Token) -> Self {
        Self {
            tokens: Mutex::new(Some(token)),
            ..Default::default()
        }
    }

    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn stored(&self) -> Option<Token> {
        self.tokens.lock().unwrap().clone()
    }
}

impl TokenStore for MemoryStore {
    fn load(&self, _service: &str) -> Option<Token> {
        self.tokens.lock().unwrap().clone()
    }

    fn save(&self, _service: &str, token: &Token) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(anyhow!("disk full"));
        }
        *self.tokens.lock().unwrap() = Some(token.clone());
        Ok(())
    }
}

/// Authorizer returning a canned token and counting calls.
struct FakeAuthorizer {
    calls: AtomicUsize,
    result: Option<Token>,
}

impl FakeAuthorizer {
    fn granting(access: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result: Some(Token::bearer(access, Some(Duration::hours(1)))),
        }
    }

    fn refusing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for FakeAuthorizer {
    async fn acquire(&self, _config: &OAuthConfig) -> Result<Token> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .ok_or_else(|| anyhow!("user closed the browser"))
    }
}

fn oauth_config(token_url: String) -> OAuthConfig {
    OAuthConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        auth_url: "https://example.com/authorize".to_string(),
        token_url,
        redirect_url: "http://127.0.0.1:8089/callback".to_string(),
        scopes: vec!["read".to_string()],
        auth_params: vec![],
    }
}

fn expired_token(refresh: Option<&str>) -> Token {
    let mut token = Token::bearer("stale-access", Some(Duration::minutes(-5)));
    token.refresh_token = refresh.map(str::to_string);
    token
}

#[tokio::test]
async fn test_valid_cached_token_skips_authorizer_and_save() {
    let store = Arc::new(MemoryStore::with_token(Token::bearer(
        "cached",
        Some(Duration::hours(1)),
    )));
    let authorizer = Arc::new(FakeAuthorizer::granting("unused"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    let client = broker.client().await.unwrap();

    assert_eq!(client.token().access_token, "cached");
    assert_eq!(client.service(), "jira");
    assert_eq!(authorizer.calls(), 0);
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_token_without_expiry_is_used_as_is() {
    let store = Arc::new(MemoryStore::with_token(Token::bearer("forever", None)));
    let authorizer = Arc::new(FakeAuthorizer::granting("unused"));

    let broker = TokenBroker::new(
        "bitbucket",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );

    assert_eq!(broker.token().await.unwrap().access_token, "forever");
    assert_eq!(authorizer.calls(), 0);
}

#[tokio::test]
async fn test_missing_token_runs_authorizer_and_saves() {
    let store = Arc::new(MemoryStore::default());
    let authorizer = Arc::new(FakeAuthorizer::granting("brand-new"));

    let broker = TokenBroker::new(
        "google",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    let token = broker.token().await.unwrap();

    assert_eq!(token.access_token, "brand-new");
    assert_eq!(authorizer.calls(), 1);
    assert_eq!(store.saves(), 1);
    assert_eq!(store.stored().unwrap(), token);
}

#[tokio::test]
async fn test_expired_token_refreshed_and_saved() {
    let mut server = Server::new_async().await;
    let refresh_mock = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "renewed", "expires_in": 3600, "token_type": "Bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_token(expired_token(Some("refresh-1"))));
    let authorizer = Arc::new(FakeAuthorizer::granting("unused"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config(format!("{}/token", server.url())),
        store.clone(),
        authorizer.clone(),
    );
    let token = broker.token().await.unwrap();

    refresh_mock.assert_async().await;
    assert_eq!(token.access_token, "renewed");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(authorizer.calls(), 0);
    assert_eq!(store.saves(), 1);
    assert_eq!(store.stored().unwrap().access_token, "renewed");
}

#[tokio::test]
async fn test_refresh_failure_falls_back_to_authorizer_once() {
    let mut server = Server::new_async().await;
    let _refresh_mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "invalid_grant"}"#)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_token(expired_token(Some("revoked"))));
    let authorizer = Arc::new(FakeAuthorizer::granting("reauthorized"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config(format!("{}/token", server.url())),
        store.clone(),
        authorizer.clone(),
    );
    let token = broker.token().await.unwrap();

    assert_eq!(token.access_token, "reauthorized");
    assert_eq!(authorizer.calls(), 1);
    assert_eq!(store.saves(), 1);
    assert_eq!(store.stored().unwrap().access_token, "reauthorized");
}

#[tokio::test]
async fn test_expired_token_without_refresh_value_reauthorizes() {
    let store = Arc::new(MemoryStore::with_token(expired_token(None)));
    let authorizer = Arc::new(FakeAuthorizer::granting("reauthorized"));

    let broker = TokenBroker::new(
        "bitbucket",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    let token = broker.token().await.unwrap();

    assert_eq!(token.access_token, "reauthorized");
    assert_eq!(authorizer.calls(), 1);
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_authorization_failure() {
    let store = Arc::new(MemoryStore::default());
    let authorizer = Arc::new(FakeAuthorizer::refusing());

    let broker = TokenBroker::new(
        "jira",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    let err = broker.client().await.err().unwrap();

    assert!(matches!(err, BrokerError::Authorization { .. }));
    assert!(err.to_string().contains("user closed the browser"));
    assert!(err.to_string().contains("open the printed link"));
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_persistence_failure_is_fatal_by_default() {
    let store = Arc::new(MemoryStore {
        fail_saves: true,
        ..Default::default()
    });
    let authorizer = Arc::new(FakeAuthorizer::granting("unsaved"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    let err = broker.token().await.unwrap_err();

    assert!(matches!(err, BrokerError::Persistence { .. }));
    assert_eq!(err.unsaved_token().unwrap().access_token, "unsaved");

    // The token obtained before the failed save is kept in memory
    let token = broker.token().await.unwrap();
    assert_eq!(token.access_token, "unsaved");
    assert_eq!(authorizer.calls(), 1);
}

#[tokio::test]
async fn test_persistence_failure_tolerated_when_configured() {
    let store = Arc::new(MemoryStore {
        fail_saves: true,
        ..Default::default()
    });
    let authorizer = Arc::new(FakeAuthorizer::granting("unsaved"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    )
    .with_options(BrokerOptions {
        persist_failure: PersistFailure::Continue,
    });

    let token = broker.token().await.unwrap();
    assert_eq!(token.access_token, "unsaved");
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_second_call_reuses_in_memory_token() {
    let store = Arc::new(MemoryStore::default());
    let authorizer = Arc::new(FakeAuthorizer::granting("once"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    broker.token().await.unwrap();
    broker.token().await.unwrap();

    assert_eq!(authorizer.calls(), 1);
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_invalidate_forces_refresh() {
    let mut server = Server::new_async().await;
    let refresh_mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "after-401", "expires_in": 3600}"#)
        .expect(1)
        .create_async()
        .await;

    let mut token = Token::bearer("rejected", Some(Duration::hours(1)));
    token.refresh_token = Some("refresh-1".to_string());
    let store = Arc::new(MemoryStore::with_token(token));
    let authorizer = Arc::new(FakeAuthorizer::granting("unused"));

    let broker = TokenBroker::new(
        "jira",
        oauth_config(format!("{}/token", server.url())),
        store.clone(),
        authorizer.clone(),
    );
    assert_eq!(broker.token().await.unwrap().access_token, "rejected");

    broker.invalidate().await;
    assert_eq!(broker.token().await.unwrap().access_token, "after-401");

    refresh_mock.assert_async().await;
    assert_eq!(authorizer.calls(), 0);
}

#[tokio::test]
async fn test_file_store_round_trip_through_broker() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileTokenStore::new(temp_dir.path()));
    let authorizer = Arc::new(FakeAuthorizer::granting("from-browser"));

    let broker = TokenBroker::new(
        "calendar",
        oauth_config("http://127.0.0.1:1/token".to_string()),
        store.clone(),
        authorizer.clone(),
    );
    let issued = broker.token().await.unwrap();

    assert_eq!(store.load("calendar").unwrap(), issued);
    assert!(temp_dir.path().join("calendar_token.json").exists());
}
