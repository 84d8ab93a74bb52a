//! Loopback listener that receives the OAuth2 redirect.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Html;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use accredify_common::{Error, Result};

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
     <p>You can close this window and return to AccrediFy.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h3>Authorization was not granted.</h3>\
     <p>You can close this window.</p></body></html>";

/// What the authorization server sent back to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Consent granted.
    Code { code: String, state: String },
    /// Consent refused or failed (`error=access_denied`, ...).
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// A bound loopback listener for one consent round-trip.
pub struct CallbackListener {
    listener: TcpListener,
    redirect_url: Url,
}

#[derive(Clone)]
struct CallbackState {
    redirect_url: Arc<Url>,
    outcome: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

impl CallbackListener {
    /// Bind to the host and port of `redirect_url`.
    ///
    /// Port `0` binds an ephemeral port; [`Self::redirect_url`] then reports
    /// the port actually bound.
    ///
    /// # Errors
    /// - `AuthUnavailable` if the URL has no host or the port cannot be bound
    pub async fn bind(redirect_url: &Url) -> Result<Self> {
        let host = redirect_url
            .host_str()
            .ok_or_else(|| Error::AuthUnavailable("Redirect URL has no host".to_string()))?;
        let port = redirect_url.port_or_known_default().unwrap_or(80);

        let listener = TcpListener::bind(format!("{}:{}", host, port))
            .await
            .map_err(|e| {
                Error::AuthUnavailable(format!("Cannot listen on {}:{}: {}", host, port, e))
            })?;

        let mut redirect_url = redirect_url.clone();
        if port == 0 {
            let bound = listener.local_addr().map_err(|e| {
                Error::AuthUnavailable(format!("Cannot read bound address: {}", e))
            })?;
            redirect_url
                .set_port(Some(bound.port()))
                .map_err(|_| Error::AuthUnavailable("Cannot set redirect port".to_string()))?;
        }

        Ok(Self {
            listener,
            redirect_url,
        })
    }

    /// The redirect URI to register in the authorization request.
    pub fn redirect_url(&self) -> &Url {
        &self.redirect_url
    }

    /// Serve the redirect URI until it is hit, then return its outcome.
    ///
    /// Requests for other paths (browsers ask for `/favicon.ico`) get a 404,
    /// and malformed or dropped connections are discarded by the server;
    /// neither ends the wait. The server shuts down gracefully when this
    /// returns or is dropped.
    ///
    /// # Errors
    /// - `AuthUnavailable` if the server stops before a callback arrives
    pub async fn wait(self) -> Result<CallbackOutcome> {
        let (sender, receiver) = oneshot::channel();
        let state = CallbackState {
            redirect_url: Arc::new(self.redirect_url),
            outcome: Arc::new(Mutex::new(Some(sender))),
        };
        let app = Router::new().fallback(receive).with_state(state);

        let shutdown = CancellationToken::new();
        let _stop = shutdown.clone().drop_guard();
        let server = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
        tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!("Callback listener stopped: {}", e);
            }
        });

        receiver.await.map_err(|_| {
            Error::AuthUnavailable("Callback listener stopped before the redirect".to_string())
        })
    }
}

async fn receive(State(state): State<CallbackState>, uri: Uri) -> (StatusCode, Html<&'static str>) {
    let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let Some(outcome) = parse_callback(&state.redirect_url, target) else {
        debug!(path = uri.path(), "Ignoring request on callback listener");
        return (StatusCode::NOT_FOUND, Html(""));
    };

    let page = match &outcome {
        CallbackOutcome::Code { .. } => SUCCESS_PAGE,
        CallbackOutcome::Denied { .. } => DENIED_PAGE,
    };

    // Only the first callback counts; later hits just see the page.
    let sender = state
        .outcome
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }

    (StatusCode::OK, Html(page))
}

/// Parse a request target against the redirect URI.
///
/// Returns `None` for other paths or for a callback carrying neither a code
/// nor an error. A code without a `state` is reported as denied with
/// `missing_state`.
pub fn parse_callback(redirect_url: &Url, target: &str) -> Option<CallbackOutcome> {
    let url = redirect_url.join(target).ok()?;
    if url.path() != redirect_url.path() {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(CallbackOutcome::Denied { error, description });
    }

    let code = code?;
    match state {
        Some(state) => Some(CallbackOutcome::Code { code, state }),
        None => Some(CallbackOutcome::Denied {
            error: "missing_state".to_string(),
            description: Some("Callback carried a code but no state".to_string()),
        }),
    }
}
