//! Credential pair storage.
//!
//! The pair is persisted in `<home>/credentials.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.
//!
//! Any component may read the store. Only the session lifecycle controller
//! and the renewal coordinator write to it; both receive the store as an
//! `Arc<dyn CredentialStore>` when they are constructed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

/// Access and refresh credential, stored and cleared as one record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived token sent on every authenticated request.
    pub access_token: String,
    /// Long-lived token used only for renewal. Absent when the service
    /// issued a bare access token (email verification, legacy register).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Returns the pair produced by a successful renewal.
    ///
    /// The access token is always replaced; the refresh token only when the
    /// service returned a new one.
    pub fn renewed(&self, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
        }
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &mask_token(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_token),
            )
            .finish()
    }
}

/// Returns a masked version of a token for display (first 8 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 || !token.is_char_boundary(8) {
        return "***".to_string();
    }
    format!("{}...", &token[..8])
}

/// Durable storage for the current credential pair.
pub trait CredentialStore: Send + Sync {
    /// Loads the stored pair, if any.
    fn load(&self) -> Result<Option<CredentialPair>>;

    /// Replaces the stored pair.
    fn save(&self, pair: &CredentialPair) -> Result<()>;

    /// Removes the stored pair. Returns whether one was present.
    fn clear(&self) -> Result<bool>;

    fn access_token(&self) -> Result<Option<String>> {
        Ok(self.load()?.map(|pair| pair.access_token))
    }

    fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.load()?.and_then(|pair| pair.refresh_token))
    }
}

/// Credential store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opens the store at `${LABTRACK_HOME}/credentials.json`.
    pub fn open_default() -> Self {
        Self::new(paths::credentials_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_restricted(path: &Path, contents: &str) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialPair>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials from {}", self.path.display()))?;

        let pair = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {}", self.path.display()))?;
        Ok(Some(pair))
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(pair).context("Failed to serialize credentials")?;

        // Write to a sibling file first so a crash never leaves half a pair.
        let tmp_path = self.path.with_extension("json.tmp");
        Self::write_restricted(&tmp_path, &contents)?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    pair: Mutex<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialPair>> {
        Ok(self
            .pair
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        *self.pair.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        Ok(self
            .pair
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some())
    }
}
