//! Generic request interface
//!
//! Every call goes through `ApiClient::send`:
//! 1. Decorate a copy of the request with the current bearer token
//! 2. Send it
//! 3. 2xx: hand the response back
//! 4. Otherwise classify the failure:
//!    - first 401: wait on the single-flight refresh, replay once with the new token
//!    - 401 after a replay: end the session, fail with `Unauthorized`
//!    - other status: fail with `Status`, body passed through
//!    - no response: fail with `Unreachable`

use std::sync::Arc;

use request_envelope::{ApiRequest, Fault, FaultAction, RetryMarker, augment, classify};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::{CredentialStore, Credentials};
use tracing::{debug, info, instrument, warn};

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::metrics;
use crate::refresher::{HttpRefresher, TokenRefresher};
use crate::response::ApiResponse;
use crate::session::SessionGuard;

/// Shared client. Cheap to clone; clones share credentials, session latch
/// and refresh coordination.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    session: SessionGuard,
    coordinator: RefreshCoordinator,
}

/// Result of putting one attempt on the wire.
enum Attempt {
    Answered(ApiResponse),
    NoResponse(String),
}

impl ApiClient {
    /// Client that refreshes through `POST {base_url}/auth/refresh`.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
    ) -> Self {
        let base_url = base_url.into();
        let refresher = Arc::new(HttpRefresher::new(http.clone(), base_url.clone()));
        Self::with_refresher(http, base_url, store, refresher)
    }

    pub fn with_refresher(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let session = SessionGuard::new(store);
        let coordinator = RefreshCoordinator::new(session.clone(), refresher);
        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: base_url.into(),
                session,
                coordinator,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn session(&self) -> &SessionGuard {
        &self.inner.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Exchange email/password for a token pair and start a new session.
    ///
    /// A rejected login is reported as is; it never triggers a refresh.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let tokens = session_auth::login(&self.inner.http, &self.inner.base_url, email, password)
            .await
            .map_err(Error::Login)?;
        self.inner
            .session
            .establish(Credentials::signed_in(
                tokens.access_token,
                tokens.refresh_token,
            ))
            .await;
        Ok(())
    }

    /// Forget the stored session. User-initiated, so no session event.
    pub async fn logout(&self) {
        self.inner.session.store().clear().await;
        info!("logged out");
    }

    /// Send `request`, recovering from one expired access token on the way.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.dispatch(&request, &request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, path = %request.path))]
    async fn dispatch(&self, request: &ApiRequest, request_id: &str) -> Result<ApiResponse> {
        let url = self.url_for(&request.path);
        let mut marker = RetryMarker::default();
        let mut access_token = self.inner.session.store().get().await.access_token;

        loop {
            let (fault, detail) = match self.attempt(request, &url, access_token.as_deref()).await? {
                Attempt::Answered(response) if response.is_success() => return Ok(response),
                Attempt::Answered(response) => (Fault::Status(response.status), response.text()),
                Attempt::NoResponse(reason) => (Fault::NoResponse, reason),
            };

            match (classify(fault, marker), fault) {
                (FaultAction::Refresh, _) => {
                    debug!("access token rejected, waiting for refresh");
                    let token = self
                        .inner
                        .coordinator
                        .recover(&mut marker)
                        .await
                        .map_err(Error::SessionExpired)?;
                    access_token = Some(token);
                }
                (FaultAction::Fatal, _) => {
                    warn!("rejected again after token refresh");
                    self.inner
                        .session
                        .invalidate("unauthorized after token refresh")
                        .await;
                    return Err(Error::Unauthorized { body: detail });
                }
                (FaultAction::Propagate, Fault::Status(status)) => {
                    debug!(status, "backend returned error status");
                    return Err(Error::Status {
                        status,
                        body: detail,
                    });
                }
                _ => {
                    warn!(error = %detail, "no response from backend");
                    return Err(Error::Unreachable(detail));
                }
            }
        }
    }

    /// One trip over the wire. Only request-building problems are errors
    /// here; a missing response is reported as `Attempt::NoResponse`.
    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &str,
        access_token: Option<&str>,
    ) -> Result<Attempt> {
        let headers = augment(request, access_token)?;
        let builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(headers);
        let builder = request.body.apply(builder)?;

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::NoResponse(e.to_string())),
        };
        metrics::record_request(request.method.as_str(), response.status().as_u16());

        match ApiResponse::read(response).await {
            Ok(response) => Ok(Attempt::Answered(response)),
            Err(Error::Unreachable(reason)) => Ok(Attempt::NoResponse(reason)),
            Err(e) => Err(e),
        }
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.inner.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(encode(body)?))
            .await?
            .json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(encode(body)?))
            .await?
            .json()
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(encode(body)?))
            .await?
            .json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|e| request_envelope::EnvelopeError::Encode(e.to_string()).into())
}
