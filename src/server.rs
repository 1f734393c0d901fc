//! HTTP surface: `/` runs the pipeline, `/auth` + `/oauth2callback` add a
//! publishing identity.

use crate::error::{OAuthError, PublishError};
use crate::identity::{IdentityRecord, TokenStore};
use crate::oauth::OAuthClient;
use crate::pipeline::Pipeline;
use crate::{logi, logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

const STATE_LEN: usize = 32;
const MAX_PENDING_STATES: usize = 64;

/// The two halves of the authorization-code flow the routes need.
#[async_trait]
pub trait Authorizer: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String>;
    async fn exchange_code(&self, code: &str) -> Result<IdentityRecord>;
}

#[async_trait]
impl Authorizer for OAuthClient {
    fn authorize_url(&self, state: &str) -> Result<String> {
        Ok(OAuthClient::authorize_url(self, state)?.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<IdentityRecord> {
        OAuthClient::exchange_code(self, code).await
    }
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    store: Arc<TokenStore>,
    authorizer: Option<Arc<dyn Authorizer>>,
    // Oldest first; the oldest is evicted once the cap is reached.
    pending: Arc<Mutex<VecDeque<String>>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, store: Arc<TokenStore>, authorizer: Option<Arc<dyn Authorizer>>) -> Self {
        Self {
            pipeline,
            store,
            authorizer,
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn issue_state(&self) -> String {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while pending.len() >= MAX_PENDING_STATES {
            pending.pop_front();
        }
        pending.push_back(state.clone());
        state
    }

    fn take_state(&self, state: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.iter().position(|s| s == state) {
            Some(idx) => pending.remove(idx).is_some(),
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/auth", get(auth))
        .route("/oauth2callback", get(oauth_callback))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    logi(format!("Listening on http://{}", addr));
    axum::serve(listener, router(state)).await
}

async fn home(State(state): State<AppState>) -> Response {
    match state.pipeline.run().await {
        Ok(outcome) => (
            StatusCode::OK,
            format!(
                "Video uploaded successfully! ({} of {} identities)",
                outcome.report.uploaded(),
                outcome.report.outcomes.len()
            ),
        )
            .into_response(),
        Err(err) => {
            if let Some(PublishError::NoIdentities) = err.downcast_ref::<PublishError>() {
                logw("Pipeline ran with no stored identities.");
                return (StatusCode::BAD_REQUEST, PublishError::NoIdentities.to_string()).into_response();
            }
            logw(format!("Pipeline failed: {:#}", err));
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Pipeline failed: {:#}", err)).into_response()
        }
    }
}

async fn auth(State(state): State<AppState>) -> Response {
    let Some(authorizer) = state.authorizer.clone() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "OAuth client is not configured.").into_response();
    };

    let csrf = state.issue_state();
    match authorizer.authorize_url(&csrf) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(err) => {
            state.take_state(&csrf);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)).into_response()
        }
    }
}

async fn oauth_callback(State(state): State<AppState>, Query(params): Query<CallbackParams>) -> Response {
    let Some(authorizer) = state.authorizer.clone() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "OAuth client is not configured.").into_response();
    };

    if let Some(error) = params.error {
        if let Some(s) = params.state.as_deref() {
            state.take_state(s);
        }
        return (StatusCode::BAD_REQUEST, OAuthError::Denied(error).to_string()).into_response();
    }

    let known = params.state.as_deref().is_some_and(|s| state.take_state(s));
    if !known {
        return (StatusCode::BAD_REQUEST, OAuthError::UnknownState.to_string()).into_response();
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code.").into_response();
    };

    let record = match authorizer.exchange_code(&code).await {
        Ok(record) => record,
        Err(err) => {
            logw(format!("Code exchange failed: {:#}", err));
            return (StatusCode::BAD_GATEWAY, format!("Code exchange failed: {:#}", err)).into_response();
        }
    };

    match state.store.append(record).await {
        Ok(index) => {
            logok(format!("Stored identity #{}", index));
            (StatusCode::OK, "User authenticated successfully!").into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::default_token_uri;
    use crate::pipeline::tests::{Harness, harness};
    use crate::publish::tests::record;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tower::ServiceExt;

    struct FakeAuthorizer;

    #[async_trait]
    impl Authorizer for FakeAuthorizer {
        fn authorize_url(&self, state: &str) -> Result<String> {
            Ok(format!("https://consent.test/?state={}", state))
        }

        async fn exchange_code(&self, code: &str) -> Result<IdentityRecord> {
            Ok(IdentityRecord {
                token: Some(format!("tok-{}", code)),
                refresh_token: Some("r".to_string()),
                token_uri: default_token_uri(),
                client_id: "c".to_string(),
                client_secret: "s".to_string(),
                scopes: Vec::new(),
                expiry: None,
            })
        }
    }

    fn app_state(h: Harness) -> (Harness, AppState) {
        let state = AppState::new(
            Arc::clone(&h.pipeline),
            Arc::clone(&h.store),
            Some(Arc::new(FakeAuthorizer)),
        );
        (h, state)
    }

    async fn send_get(app: Router, uri: &str) -> (StatusCode, String, Option<String>) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned(), location)
    }

    #[tokio::test]
    async fn root_without_identities_is_bad_request() {
        let (_h, state) = app_state(harness());
        let (status, body, _) = send_get(router(state), "/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "No authenticated users found. Run /auth first.");
    }

    #[tokio::test]
    async fn root_with_identity_uploads() {
        let (h, state) = app_state(harness());
        h.store.append(record(Some("one"), None)).await.unwrap();
        let (status, body, _) = send_get(router(state), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("Video uploaded successfully!"));
        assert_eq!(h.host.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auth_then_callback_stores_identity() {
        let (h, state) = app_state(harness());
        let (status, _, location) = send_get(router(state.clone()), "/auth").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = location.unwrap();
        let csrf = location.rsplit("state=").next().unwrap().to_string();

        let uri = format!("/oauth2callback?code=abc&state={}", csrf);
        let (status, body, _) = send_get(router(state.clone()), &uri).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let stored = h.store.load().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].access_token(), Some("tok-abc"));

        // A state is single use.
        let (status, _, _) = send_get(router(state), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_rejects_unknown_state_and_denials() {
        let (h, state) = app_state(harness());
        let (status, _, _) = send_get(router(state.clone()), "/oauth2callback?code=abc&state=forged").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body, _) = send_get(router(state), "/oauth2callback?error=access_denied").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("access_denied"));
        assert!(h.store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_without_client_is_server_error() {
        let (_h, mut state) = app_state(harness());
        state.authorizer = None;
        let (status, _, _) = send_get(router(state), "/auth").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn full_state_table_evicts_only_the_oldest() {
        let (_h, state) = app_state(harness());
        let first = state.issue_state();
        let second = state.issue_state();
        for _ in 0..MAX_PENDING_STATES - 1 {
            state.issue_state();
        }
        assert_eq!(state.pending.lock().unwrap().len(), MAX_PENDING_STATES);
        assert!(!state.take_state(&first));
        assert!(state.take_state(&second));
        assert!(!state.take_state(&second));
    }
}
