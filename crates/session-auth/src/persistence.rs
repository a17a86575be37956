//! Storage backends for the credential pair
//!
//! The store keeps credentials in memory for the life of the process; a
//! backend only mirrors that value somewhere that survives a restart. The
//! trait returns boxed futures so the store can hold `Arc<dyn CredentialPersistence>`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Boxed future returned by persistence operations.
pub type PersistFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Where the credential pair lives between runs.
pub trait CredentialPersistence: Send + Sync {
    /// Read the last saved value, `None` when nothing has been saved.
    fn load(&self) -> PersistFuture<'_, Option<Credentials>>;

    /// Replace the saved value.
    fn save<'a>(&'a self, credentials: &'a Credentials) -> PersistFuture<'a, ()>;

    /// Forget the saved value. Must succeed when nothing is saved.
    fn clear(&self) -> PersistFuture<'_, ()>;
}

/// Process-local backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryPersistence {
    saved: Mutex<Option<Credentials>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a value already saved, as if from a previous run.
    pub fn with(credentials: Credentials) -> Self {
        Self {
            saved: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialPersistence for MemoryPersistence {
    fn load(&self) -> PersistFuture<'_, Option<Credentials>> {
        Box::pin(async move { Ok(self.saved.lock().await.clone()) })
    }

    fn save<'a>(&'a self, credentials: &'a Credentials) -> PersistFuture<'a, ()> {
        Box::pin(async move {
            *self.saved.lock().await = Some(credentials.clone());
            Ok(())
        })
    }

    fn clear(&self) -> PersistFuture<'_, ()> {
        Box::pin(async move {
            *self.saved.lock().await = None;
            Ok(())
        })
    }
}

/// JSON file backend.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so a crash mid-write leaves the previous session intact. The file
/// holds bearer tokens and is created 0600 on unix.
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialPersistence for FilePersistence {
    fn load(&self) -> PersistFuture<'_, Option<Credentials>> {
        Box::pin(async move {
            let contents = match tokio::fs::read_to_string(&self.path).await {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
            };
            let credentials: Credentials = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            debug!(path = %self.path.display(), "loaded persisted credentials");
            Ok(Some(credentials))
        })
    }

    fn save<'a>(&'a self, credentials: &'a Credentials) -> PersistFuture<'a, ()> {
        Box::pin(write_atomic(&self.path, credentials))
    }

    fn clear(&self) -> PersistFuture<'_, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), "removed credential file");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
            }
        })
    }
}

async fn write_atomic(path: &Path, credentials: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(credentials)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
