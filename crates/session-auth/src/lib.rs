//! Session credentials for the school-admin API
//!
//! Holds the access/refresh token pair, mirrors it to a persistence backend,
//! and talks to the backend's login and refresh endpoints. Knows nothing
//! about request dispatch; `api-client` builds the refresh coordination on
//! top of these pieces.
//!
//! Credential flow:
//! 1. `token::login()` trades email/password for a token pair
//! 2. The pair is installed via `CredentialStore::set()`
//! 3. Every request reads `CredentialStore::get()` for its bearer token
//! 4. On expiry `token::refresh_token()` mints a new access token
//! 5. `CredentialStore::set_access_token()` installs it
//! 6. A failed refresh ends the session via `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod persistence;
pub mod token;

pub use constants::{LOGIN_PATH, REFRESH_PATH};
pub use credentials::{CredentialStore, Credentials};
pub use error::{Error, Result};
pub use persistence::{CredentialPersistence, FilePersistence, MemoryPersistence, PersistFuture};
pub use token::{LoginTokens, RefreshedToken, login, refresh_token};
