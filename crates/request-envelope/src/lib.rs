//! Request envelope for the school-admin API client
//!
//! Everything about a single attempt that needs no I/O:
//! - `ApiRequest` / `RequestBody` describe the call and rebuild its body
//! - `augment` derives the headers an attempt is sent with
//! - `classify` decides whether a failed attempt refreshes, fails, or ends
//!   the session

pub mod augment;
pub mod error;
pub mod fault;
pub mod request;

pub use augment::augment;
pub use error::{EnvelopeError, Result};
pub use fault::{Fault, FaultAction, RetryMarker, classify};
pub use request::{ApiRequest, FormPart, FormValue, RequestBody};
