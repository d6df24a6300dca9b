//! Credential storage for session tokens
//!
//! Manages a JSON file mapping profile names to credentials. Each store instance
//! owns exactly one profile key and leaves the others untouched, so several
//! deployments can share one file. All writes use atomic temp-file + rename to
//! prevent corruption on crash. A tokio Mutex serializes writes and guarantees a
//! concurrent `read()` sees either the old or the new credential; a
//! process-wide lock per file serializes the read-modify-write of stores that
//! share a file.
//!
//! A missing or unparsable entry is indistinguishable from "no session": reads
//! never fail, they return `None`.

use std::fmt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// The live session credential.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a delta).
/// Computed at storage time from `TokenResponse.expires_in` or the JWT `exp`
/// claim; absent when the server gives no expiry information.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Refresh token for obtaining new access tokens, if the deployment issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiration as unix timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<u64>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Whether the access token expires within `skew` of `now_millis`.
    ///
    /// Credentials without expiry information never report as expiring; the
    /// server's 401 is the only signal for those.
    pub fn expires_within(&self, skew: Duration, now_millis: u64) -> bool {
        match self.expires_at {
            Some(expires) => expires <= now_millis.saturating_add(skew.as_millis() as u64),
            None => false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current unix time in milliseconds.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Durable single-credential store backed by a shared JSON file.
///
/// The generation counter increments on every write and clear. Callers record
/// the generation a credential was read at to tell whether it has since been
/// replaced.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    profile: String,
    state: Mutex<Option<Credential>>,
    generation: AtomicU64,
    file_lock: Arc<Mutex<()>>,
}

/// Lock shared by every store in the process that uses `path`.
fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

impl CredentialStore {
    /// Load the credential for `profile` from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start, no session).
    /// A file or entry that fails to parse is logged and treated as empty; it
    /// is overwritten by the next write or clear.
    pub async fn load(path: PathBuf, profile: impl Into<String>) -> Result<Self> {
        let profile = profile.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;
        }
        // one lock per file, however the path was spelled
        let key = match path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => match (tokio::fs::canonicalize(dir).await, path.file_name()) {
                (Ok(dir), Some(name)) => dir.join(name),
                _ => path.clone(),
            },
            None => std::env::current_dir()
                .map(|d| d.join(&path))
                .unwrap_or_else(|_| path.clone()),
        };
        let file_lock = file_lock(&key);

        let state = if path.exists() {
            let entries = read_entries(&path).await?;
            let credential = entries.and_then(|e| parse_entry(&e, &profile));
            info!(
                path = %path.display(),
                profile,
                present = credential.is_some(),
                "loaded credential store"
            );
            credential
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let _file = file_lock.lock().await;
            // another store may have created it meanwhile
            if !path.exists() {
                // Create the empty file so future loads don't need the cold-start path
                write_atomic(&path, &Map::new()).await?;
            }
            None
        };

        Ok(Self {
            path,
            profile,
            state: Mutex::new(state),
            generation: AtomicU64::new(0),
            file_lock,
        })
    }

    /// Get a clone of the current credential, if any.
    pub async fn read(&self) -> Option<Credential> {
        self.state.lock().await.clone()
    }

    /// Current credential together with the generation it belongs to.
    pub async fn snapshot(&self) -> (Option<Credential>, u64) {
        let state = self.state.lock().await;
        (state.clone(), self.generation.load(Ordering::Acquire))
    }

    /// Generation of the current credential. Lock-free.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the credential and persist to disk.
    ///
    /// The in-memory value is replaced even if persisting fails, so the running
    /// session keeps the fresh token; the error tells the caller the change
    /// will not survive a restart.
    pub async fn write(&self, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = Some(credential.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!(profile = %self.profile, "stored credential");

        let value = serde_json::to_value(&credential)
            .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;
        let _file = self.file_lock.lock().await;
        let mut entries = read_entries(&self.path).await.ok().flatten().unwrap_or_default();
        entries.insert(self.profile.clone(), value);
        write_atomic(&self.path, &entries).await
    }

    /// Remove the credential and persist to disk.
    ///
    /// Returns the removed credential if one was present.
    pub async fn clear(&self) -> Result<Option<Credential>> {
        let mut state = self.state.lock().await;
        let removed = state.take();
        self.generation.fetch_add(1, Ordering::AcqRel);

        let _file = self.file_lock.lock().await;
        let mut entries = read_entries(&self.path).await.ok().flatten().unwrap_or_default();
        let had_entry = entries.remove(&self.profile).is_some();
        if had_entry || removed.is_some() {
            debug!(profile = %self.profile, "cleared credential");
        }
        write_atomic(&self.path, &entries).await?;
        Ok(removed)
    }

    /// Whether a credential is currently held.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Read the credential file as a JSON object.
///
/// Returns `Ok(None)` when the contents are not UTF-8 or not a JSON object;
/// only real I/O failures are errors.
async fn read_entries(path: &Path) -> Result<Option<Map<String, Value>>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Some(Map::new())),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            warn!(path = %path.display(), error = %e, "credential file is not UTF-8, treating as empty");
            return Ok(None);
        }
        Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
    };
    match serde_json::from_str::<Map<String, Value>>(&contents) {
        Ok(entries) => Ok(Some(entries)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "credential file is corrupt, treating as empty");
            Ok(None)
        }
    }
}

fn parse_entry(entries: &Map<String, Value>, profile: &str) -> Option<Credential> {
    let value = entries.get(profile)?;
    match serde_json::from_value::<Credential>(value.clone()) {
        Ok(credential) if !credential.access_token.is_empty() => Some(credential),
        Ok(_) => {
            warn!(profile, "stored credential has empty access token, ignoring");
            None
        }
        Err(e) => {
            warn!(profile, error = %e, "stored credential is corrupt, ignoring");
            None
        }
    }
}

/// Write the credential map to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since the
/// file contains bearer tokens.
async fn write_atomic(path: &Path, data: &Map<String, Value>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?;

    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}",
        uuid::Uuid::new_v4().as_simple()
    ));

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
