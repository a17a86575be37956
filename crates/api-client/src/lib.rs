//! Authenticated HTTP client for the school-admin backend
//!
//! Wraps every backend call with bearer-token decoration and transparent
//! recovery from an expired access token:
//!
//! - `ApiClient::send` decorates, sends and classifies each attempt
//! - `RefreshCoordinator` keeps at most one refresh in flight and fans its
//!   outcome out to every request that was waiting on it
//! - `SessionGuard` ends the session once per invalidation and broadcasts
//!   `SessionEvent::Ended` so the front end can send the user to login

pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod refresher;
pub mod response;
pub mod session;

pub use client::ApiClient;
pub use coordinator::{PendingRequest, RefreshCoordinator, RefreshOutcome};
pub use error::{Error, Result};
pub use refresher::{HttpRefresher, RefreshFuture, TokenRefresher};
pub use response::ApiResponse;
pub use session::{SessionEvent, SessionGuard};

pub use request_envelope::{ApiRequest, FormPart, RequestBody};
