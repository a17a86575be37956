//! Calls to the backend auth endpoints
//!
//! Two interactions:
//! 1. Login: trade email/password for a token pair
//! 2. Refresh: trade the refresh token for a new access token
//!
//! The backend answers in camelCase (`accessToken`); snake_case is accepted
//! too. A 2xx answer without a usable access token is a failure, never a
//! fallback to the old token.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{LOGIN_PATH, REFRESH_PATH, endpoint};
use crate::error::{Error, Result};

#[derive(Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Raw body of a token endpoint response. Every field is optional so that a
/// malformed answer surfaces as `MalformedResponse` instead of a decode error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    #[serde(default, alias = "access_token")]
    access_token: Option<String>,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the backend rotates refresh tokens.
    pub refresh_token: Option<String>,
}

/// Outcome of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// `POST /auth/refresh` with `{ "token": <refresh token> }`.
///
/// Any non-2xx answer, transport error, or body without an access token is an
/// error. 401/403 map to `InvalidCredentials` (the refresh token is dead).
pub async fn refresh_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<RefreshedToken> {
    let response = client
        .post(endpoint(base_url, REFRESH_PATH))
        .json(&RefreshRequest { token: refresh })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        return Err(Error::Refresh(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let body = response
        .json::<TokenBody>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid refresh response: {e}")))?;

    let access_token = non_empty(body.access_token)
        .ok_or_else(|| Error::MalformedResponse("refresh response has no access token".into()))?;

    debug!(rotated = body.refresh_token.is_some(), "refresh endpoint issued access token");
    Ok(RefreshedToken {
        access_token,
        refresh_token: non_empty(body.refresh_token),
    })
}

/// `POST /auth/login` with `{ "email", "password" }`.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<LoginTokens> {
    let response = client
        .post(endpoint(base_url, LOGIN_PATH))
        .json(&LoginRequest { email, password })
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Login(format!("login endpoint returned {status}: {body}")));
    }

    let body = response
        .json::<TokenBody>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid login response: {e}")))?;

    match (non_empty(body.access_token), non_empty(body.refresh_token)) {
        (Some(access_token), Some(refresh_token)) => Ok(LoginTokens {
            access_token,
            refresh_token,
        }),
        _ => Err(Error::MalformedResponse(
            "login response must carry both tokens".into(),
        )),
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use tokio::net::TcpListener;

    /// Serve `handler` on both auth paths and return the base URL.
    async fn start_auth_server<H, T>(handler: H) -> String
    where
        H: axum::handler::Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route(REFRESH_PATH, post(handler.clone()))
            .route(LOGIN_PATH, post(handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn token_body_accepts_both_casings() {
        let camel: TokenBody =
            serde_json::from_str(r#"{"accessToken":"at","refreshToken":"rt"}"#).unwrap();
        assert_eq!(camel.access_token.as_deref(), Some("at"));
        assert_eq!(camel.refresh_token.as_deref(), Some("rt"));

        let snake: TokenBody = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert_eq!(snake.access_token.as_deref(), Some("at"));
        assert!(snake.refresh_token.is_none());
    }

    #[tokio::test]
    async fn refresh_sends_token_field_and_parses_response() {
        let base = start_auth_server(|Json(body): Json<serde_json::Value>| async move {
            assert_eq!(body, serde_json::json!({ "token": "rt_1" }));
            Json(serde_json::json!({ "accessToken": "at_2", "refreshToken": "rt_2" }))
        })
        .await;

        let refreshed = refresh_token(&reqwest::Client::new(), &base, "rt_1")
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, "at_2");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("rt_2"));
    }

    #[tokio::test]
    async fn refresh_without_rotation_leaves_refresh_token_none() {
        let base = start_auth_server(|| async { Json(serde_json::json!({ "accessToken": "at_2" })) })
            .await;

        let refreshed = refresh_token(&reqwest::Client::new(), &base, "rt_1")
            .await
            .unwrap();
        assert!(refreshed.refresh_token.is_none());
    }

    #[tokio::test]
    async fn refresh_missing_access_token_is_malformed() {
        let base = start_auth_server(|| async { Json(serde_json::json!({ "ok": true })) }).await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_empty_access_token_is_malformed() {
        let base =
            start_auth_server(|| async { Json(serde_json::json!({ "accessToken": "" })) }).await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_non_json_body_is_malformed() {
        let base = start_auth_server(|| async { "plain text" }).await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_401_is_invalid_credentials() {
        let base = start_auth_server(|| async {
            (StatusCode::UNAUTHORIZED, "refresh token expired").into_response()
        })
        .await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_dead")
            .await
            .unwrap_err();
        match err {
            Error::InvalidCredentials(msg) => assert!(msg.contains("refresh token expired")),
            other => panic!("expected InvalidCredentials, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_500_is_refresh_error() {
        let base = start_auth_server(|| async {
            (StatusCode::INTERNAL_SERVER_ERROR, "db down").into_response()
        })
        .await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Refresh(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_unreachable_is_http_error() {
        let err = refresh_token(&reqwest::Client::new(), "http://127.0.0.1:1", "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn login_returns_token_pair() {
        let base = start_auth_server(|Json(body): Json<serde_json::Value>| async move {
            assert_eq!(body["email"], "admin@school.example");
            assert_eq!(body["password"], "pw");
            Json(serde_json::json!({ "accessToken": "at_1", "refreshToken": "rt_1" }))
        })
        .await;

        let tokens = login(&reqwest::Client::new(), &base, "admin@school.example", "pw")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at_1");
        assert_eq!(tokens.refresh_token, "rt_1");
    }

    #[tokio::test]
    async fn login_rejected_is_login_error() {
        let base = start_auth_server(|| async {
            (StatusCode::UNAUTHORIZED, "bad password").into_response()
        })
        .await;

        let err = login(&reqwest::Client::new(), &base, "a@b.c", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Login(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn login_without_refresh_token_is_malformed() {
        let base =
            start_auth_server(|| async { Json(serde_json::json!({ "accessToken": "at_1" })) })
                .await;

        let err = login(&reqwest::Client::new(), &base, "a@b.c", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }
}
