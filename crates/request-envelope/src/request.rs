//! Outgoing request descriptor
//!
//! An `ApiRequest` is kept by value for the whole life of a call so that a
//! replay after token refresh re-sends exactly the same method, path, headers
//! and body. Bodies are therefore stored in a rebuildable form and only turned
//! into a transport body per attempt.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};

use crate::error::{EnvelopeError, Result};

/// One field of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        data: Bytes,
        file_name: String,
        mime: Option<String>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        mime: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            value: FormValue::File {
                data: data.into(),
                file_name: file_name.into(),
                mime: mime.map(str::to_owned),
            },
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    /// Raw bytes, sent with `content_type` when given. Otherwise the transport
    /// chooses; no JSON default is applied.
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    /// Binary/multipart upload. The transport generates the boundary.
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }

    /// Attach this body to a transport request. Called once per attempt.
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match self {
            RequestBody::Empty => Ok(builder),
            RequestBody::Json(value) => {
                let encoded =
                    serde_json::to_vec(value).map_err(|e| EnvelopeError::Encode(e.to_string()))?;
                Ok(builder.body(encoded))
            }
            RequestBody::Bytes { data, .. } => Ok(builder.body(data.clone())),
            RequestBody::Multipart(parts) => Ok(builder.multipart(build_form(parts)?)),
        }
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            FormValue::Text(text) => form.text(part.name.clone(), text.clone()),
            FormValue::File {
                data,
                file_name,
                mime,
            } => {
                let mut file = Part::bytes(data.to_vec()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|e| EnvelopeError::Encode(format!("mime {mime}: {e}")))?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// Method, path (relative to the API base URL), headers and body of a call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn bytes(mut self, data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        self.body = RequestBody::Bytes {
            data: data.into(),
            content_type: content_type.map(str::to_owned),
        };
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }
}
