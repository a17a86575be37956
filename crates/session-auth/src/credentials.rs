//! The current access/refresh token pair
//!
//! `CredentialStore` is the only writer of the pair. Readers get a clone, so a
//! concurrent `set` is never observed half-applied. Every write is mirrored to
//! the configured `CredentialPersistence`; a failed mirror is logged and the
//! in-memory value stays authoritative.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::Result;
use crate::persistence::CredentialPersistence;

/// Access/refresh token pair plus the authenticated flag.
///
/// `Debug` redacts both tokens.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub authenticated: bool,
}

impl Credentials {
    /// The unauthenticated value.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn signed_in(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            authenticated: true,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

/// Holder of the process-wide credential pair.
///
/// `writes` serializes set/clear so the persisted copy is written in the same
/// order as the in-memory one; `current` is only write-locked for the swap.
pub struct CredentialStore {
    current: RwLock<Credentials>,
    writes: Mutex<()>,
    persistence: Arc<dyn CredentialPersistence>,
}

impl CredentialStore {
    /// Restore the last persisted value, or start unauthenticated.
    pub async fn load(persistence: Arc<dyn CredentialPersistence>) -> Result<Self> {
        let current = persistence.load().await?.unwrap_or_default();
        debug!(authenticated = current.authenticated, "credential store loaded");
        Ok(Self {
            current: RwLock::new(current),
            writes: Mutex::new(()),
            persistence,
        })
    }

    /// Snapshot of the current pair. Never fails.
    pub async fn get(&self) -> Credentials {
        self.current.read().await.clone()
    }

    /// Replace the pair.
    pub async fn set(&self, credentials: Credentials) {
        let _write = self.writes.lock().await;
        *self.current.write().await = credentials.clone();
        if let Err(e) = self.persistence.save(&credentials).await {
            warn!(error = %e, "failed to persist credentials");
        }
    }

    /// Install a freshly minted access token.
    ///
    /// Keeps the stored refresh token unless the backend rotated it.
    pub async fn set_access_token(&self, access_token: String, rotated_refresh: Option<String>) {
        let _write = self.writes.lock().await;
        let updated = {
            let mut current = self.current.write().await;
            current.access_token = Some(access_token);
            if let Some(refresh) = rotated_refresh {
                current.refresh_token = Some(refresh);
            }
            current.authenticated = true;
            current.clone()
        };
        if let Err(e) = self.persistence.save(&updated).await {
            warn!(error = %e, "failed to persist refreshed access token");
        }
    }

    /// Reset to the unauthenticated value. Idempotent.
    ///
    /// Returns whether a signed-in pair was cleared. Concurrent callers are
    /// serialized, so at most one of them sees `true` per signed-in value.
    pub async fn clear(&self) -> bool {
        let _write = self.writes.lock().await;
        let previous = std::mem::take(&mut *self.current.write().await);
        if let Err(e) = self.persistence.clear().await {
            warn!(error = %e, "failed to clear persisted credentials");
        }
        previous.authenticated
    }
}
