//! Per-attempt header decoration
//!
//! `augment` derives the header set an attempt is sent with: the caller's
//! headers, the bearer token, and a content-type matching the body. It works
//! on a copy, so calling it again for a replay cannot stack headers.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::{EnvelopeError, Result};
use crate::request::{ApiRequest, RequestBody};

const JSON: &str = "application/json";

/// Build the headers for one attempt of `request`.
///
/// - `Authorization: Bearer <token>` when a token is given, replacing any
///   previous value.
/// - Binary bodies that carry their own content type are sent with it.
/// - Multipart and untyped binary bodies lose any explicit `Content-Type` so
///   the transport can choose (and write the multipart boundary).
/// - Every other body gets `Content-Type: application/json` unless the
///   caller already chose one.
pub fn augment(request: &ApiRequest, access_token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = request.headers.clone();

    if let Some(token) = access_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| EnvelopeError::InvalidHeader(format!("authorization: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    match &request.body {
        RequestBody::Bytes {
            content_type: Some(content_type),
            ..
        } => {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| EnvelopeError::InvalidHeader(format!("content-type: {e}")))?;
            headers.insert(CONTENT_TYPE, value);
        }
        RequestBody::Bytes {
            content_type: None,
            ..
        } => {
            headers.remove(CONTENT_TYPE);
        }
        body if body.is_multipart() => {
            headers.remove(CONTENT_TYPE);
        }
        _ => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
            }
        }
    }

    Ok(headers)
}
