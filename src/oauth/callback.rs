//! One-shot localhost listener that captures the authorization code.
//!
//! The listener serves any path on the redirect URI's host and port:
//!
//! - GET without `code` (favicon, probes): empty 200, ignored
//! - `code` with a `state` not matching the issued value: 401, keep listening
//! - matching `code`: confirmation page, listener stops shortly after
//! - matching provider `error`: failure page, flow fails without waiting
//! - provider `error` with a foreign `state`: ignored

use super::state::state_matches;
use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Response},
    Router,
};
use serde::Deserialize;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const SUCCESS_HTML: &str =
    "<html><body><h1>Authorization complete</h1><p>Continue in the terminal.</p></body></html>";
const DENIED_HTML: &str =
    "<html><body><h1>Authorization failed</h1><p>Return to the terminal for details.</p></body></html>";

/// Delay between answering the browser and stopping the server, so the
/// confirmation page is flushed before the socket closes.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(20);

/// How long open connections may keep the server alive once the outcome is
/// known. Stragglers are dropped with the server after this.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

/// Query parameters a provider appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// What the provider sent back on the matching redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Authorization code to exchange
    Code(String),
    /// The user or provider refused the grant
    Denied {
        error: String,
        description: Option<String>,
    },
}

struct Rendezvous {
    outcome_tx: oneshot::Sender<CallbackOutcome>,
    stop_tx: oneshot::Sender<()>,
}

/// Shared state of the callback router.
#[derive(Clone)]
pub struct CallbackState {
    expected_state: Arc<str>,
    rendezvous: Arc<Mutex<Option<Rendezvous>>>,
}

impl CallbackState {
    fn complete(&self, outcome: CallbackOutcome) -> bool {
        let taken = self
            .rendezvous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(rendezvous) = taken else {
            return false;
        };

        let _ = rendezvous.outcome_tx.send(outcome);
        tokio::spawn(async move {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            let _ = rendezvous.stop_tx.send(());
        });
        true
    }
}

/// Build the router answering redirects for one flow instance.
///
/// # Returns
/// The router, a receiver resolving with the captured outcome, and a receiver
/// resolving when the server should stop.
pub fn callback_router(
    expected_state: &str,
) -> (
    Router,
    oneshot::Receiver<CallbackOutcome>,
    oneshot::Receiver<()>,
) {
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let state = CallbackState {
        expected_state: Arc::from(expected_state),
        rendezvous: Arc::new(Mutex::new(Some(Rendezvous { outcome_tx, stop_tx }))),
    };
    let router = Router::new().fallback(handle_redirect).with_state(state);
    (router, outcome_rx, stop_rx)
}

async fn handle_redirect(
    State(state): State<CallbackState>,
    method: Method,
    Query(params): Query<CallbackParams>,
) -> Response {
    if method != Method::GET {
        return StatusCode::OK.into_response();
    }
    if params.code.is_none() && params.error.is_none() {
        debug!("Ignoring request without authorization code");
        return StatusCode::OK.into_response();
    }

    let received_state = params.state.as_deref().unwrap_or_default();
    if !state_matches(received_state, &state.expected_state) {
        if params.code.is_none() {
            debug!("Ignoring provider error with mismatched state");
            return StatusCode::OK.into_response();
        }
        warn!("Rejected OAuth redirect with mismatched state");
        return (StatusCode::UNAUTHORIZED, "State mismatch").into_response();
    }

    if let Some(error) = params.error {
        warn!(error = %error, "Provider refused authorization");
        state.complete(CallbackOutcome::Denied {
            error,
            description: params.error_description,
        });
        return (StatusCode::BAD_REQUEST, Html(DENIED_HTML)).into_response();
    }

    if let Some(code) = params.code {
        if state.complete(CallbackOutcome::Code(code)) {
            info!("Authorization code received");
        }
    }
    Html(SUCCESS_HTML).into_response()
}

/// Local HTTP listener bound to the redirect URI's host and port.
pub struct CallbackListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl CallbackListener {
    /// Bind the host and port encoded in `redirect_url`.
    ///
    /// # Returns
    /// * `Ok(CallbackListener)` - Port held exclusively until the listener is
    ///   consumed or dropped
    /// * `Err` - URL unparsable or port already in use
    pub async fn bind(redirect_url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(redirect_url)
            .with_context(|| format!("Invalid redirect URI {}", redirect_url))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("Redirect URI {} has no host", redirect_url))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Redirect URI {} has no port", redirect_url))?;

        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind redirect listener on {}:{}", host, port))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read redirect listener address")?;

        debug!(addr = %local_addr, "Redirect listener bound");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve redirects until one carries `expected_state`, then return its
    /// authorization code.
    ///
    /// # Returns
    /// * `Ok(code)` - Matching redirect received
    /// * `Err` - Provider refused the grant, the listener failed, or no
    ///   matching redirect arrived within `timeout`
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Result<String> {
        let (router, outcome_rx, stop_rx) = callback_router(expected_state);

        let server = axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future();
        tokio::pin!(server);

        let outcome = tokio::select! {
            received = outcome_rx => received
                .map_err(|_| anyhow!("Redirect listener stopped without an authorization code"))?,
            served = &mut server => {
                served.context("Redirect listener failed")?;
                return Err(anyhow!("Redirect listener stopped without an authorization code"));
            }
            _ = tokio::time::sleep(timeout) => {
                return Err(anyhow!(
                    "Timed out after {}s waiting for the authorization redirect",
                    timeout.as_secs()
                ));
            }
        };

        // The outcome is already captured; a stalled connection must not hold it back
        match tokio::time::timeout(SHUTDOWN_DRAIN, &mut server).await {
            Ok(Err(e)) => warn!(error = %e, "Redirect listener failed during shutdown"),
            Ok(Ok(())) => debug!("Redirect listener stopped"),
            Err(_) => debug!("Dropping redirect listener with open connections"),
        }

        match outcome {
            CallbackOutcome::Code(code) => Ok(code),
            CallbackOutcome::Denied { error, description } => Err(anyhow!(
                "Authorization denied by provider: {}{}",
                error,
                description.map(|d| format!(" ({})", d)).unwrap_or_default()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_callback_params_parsing() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc%2F123&state=xyz").unwrap();
        assert_eq!(params.code.as_deref(), Some("abc/123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[tokio::test]
    async fn test_request_without_code_is_ignored() {
        let (router, mut outcome_rx, _stop_rx) = callback_router("expected");

        let response = router.oneshot(get("/favicon.ico")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(outcome_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_state_mismatch_returns_401() {
        let (router, mut outcome_rx, _stop_rx) = callback_router("expected");

        let response = router
            .oneshot(get("/callback?code=abc&state=forged"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(outcome_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_state_returns_401() {
        let (router, _outcome_rx, _stop_rx) = callback_router("expected");

        let response = router.oneshot(get("/callback?code=abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_matching_state_captures_code() {
        let (router, outcome_rx, stop_rx) = callback_router("expected");

        let response = router
            .oneshot(get("/callback?code=abc&state=expected"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            outcome_rx.await.unwrap(),
            CallbackOutcome::Code("abc".to_string())
        );
        // Stop is signalled after the grace delay
        stop_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_error_without_state_is_ignored() {
        let (router, mut outcome_rx, _stop_rx) = callback_router("expected");

        let response = router.oneshot(get("/?error=access_denied")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(outcome_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_provider_error_with_matching_state() {
        let (router, outcome_rx, _stop_rx) = callback_router("expected");

        let response = router
            .oneshot(get("/?error=access_denied&state=expected"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            outcome_rx.await.unwrap(),
            CallbackOutcome::Denied {
                error: "access_denied".to_string(),
                description: None
            }
        );
    }

    #[tokio::test]
    async fn test_listener_keeps_running_after_mismatch() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let base = format!("http://{}", listener.local_addr());
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("expected", Duration::from_secs(10))
                .await
        });

        let client = reqwest::Client::new();
        let forged = client
            .get(format!("{}/callback?code=evil&state=forged", base))
            .send()
            .await
            .unwrap();
        assert_eq!(forged.status(), reqwest::StatusCode::UNAUTHORIZED);

        let genuine = client
            .get(format!("{}/callback?code=good&state=expected", base))
            .send()
            .await
            .unwrap();
        assert_eq!(genuine.status(), reqwest::StatusCode::OK);
        assert!(genuine.text().await.unwrap().contains("Continue in the terminal"));

        let code = waiter.await.unwrap().unwrap();
        assert_eq!(code, "good");
    }

    #[tokio::test]
    async fn test_listener_times_out() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/").await.unwrap();
        let err = listener
            .wait_for_code("expected", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_port_released_after_success() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/").await.unwrap();
        let addr = listener.local_addr();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("s", Duration::from_secs(10))
                .await
        });

        reqwest::get(format!("http://{}/?code=c&state=s", addr))
            .await
            .unwrap();
        waiter.await.unwrap().unwrap();

        let rebound = CallbackListener::bind(&format!("http://{}/", addr)).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_connection_does_not_delay_code() {
        use tokio::io::AsyncWriteExt;

        let listener = CallbackListener::bind("http://127.0.0.1:0/").await.unwrap();
        let addr = listener.local_addr();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("s", Duration::from_secs(30))
                .await
        });

        // Headers never terminated, so this connection never completes
        let mut stalled = tokio::net::TcpStream::connect(addr).await.unwrap();
        stalled
            .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: x\r\n")
            .await
            .unwrap();

        let response = reqwest::get(format!("http://{}/?code=good&state=s", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let code = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("code should be returned without waiting for the stalled connection")
            .unwrap()
            .unwrap();
        assert_eq!(code, "good");
        drop(stalled);
    }
}
