//! Seam between the coordinator and the refresh endpoint
//!
//! The coordinator only needs "refresh token in, access token out". The HTTP
//! implementation wraps `session_auth::refresh_token`; tests swap in fakes to
//! control exactly when a refresh settles.

use std::future::Future;
use std::pin::Pin;

use session_auth::RefreshedToken;

/// Boxed future so the coordinator can hold `Arc<dyn TokenRefresher>`.
pub type RefreshFuture<'a> =
    Pin<Box<dyn Future<Output = session_auth::Result<RefreshedToken>> + Send + 'a>>;

pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// `POST {base_url}/auth/refresh`.
pub struct HttpRefresher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
        Box::pin(session_auth::refresh_token(
            &self.client,
            &self.base_url,
            refresh_token,
        ))
    }
}
