// Credential storage
// Durable (file) and in-memory stores for the token pair and cached profile

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::types::{strip_token_prefix, UserProfile};
use crate::error::{ClientError, Result};

/// Where the client keeps its credentials between runs.
///
/// Implementations strip the `"<id>|"` prefix in `set_credentials`, so a
/// stored token is always the bare secret.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn user_profile(&self) -> Option<UserProfile>;

    /// Overwrite the token pair. A `None` profile keeps the cached one.
    fn set_credentials(
        &self,
        access_token: &str,
        refresh_token: &str,
        profile: Option<&UserProfile>,
    ) -> Result<()>;

    /// Replace the cached profile, leaving the tokens as they are.
    /// Does nothing when logged out.
    fn set_user_profile(&self, profile: &UserProfile) -> Result<()>;

    fn clear_credentials(&self) -> Result<()>;
}

/// On-disk / in-memory representation of the stored credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl StoredCredentials {
    fn updated(
        &self,
        access_token: &str,
        refresh_token: &str,
        profile: Option<&UserProfile>,
    ) -> Self {
        Self {
            access_token: Some(strip_token_prefix(access_token).to_string()),
            refresh_token: Some(strip_token_prefix(refresh_token).to_string()),
            user: profile.cloned().or_else(|| self.user.clone()),
        }
    }

    /// Same tokens, new profile. `None` when there is no session to attach it to.
    fn with_user(&self, profile: &UserProfile) -> Option<Self> {
        self.access_token.as_ref()?;
        Some(Self {
            user: Some(profile.clone()),
            ..self.clone()
        })
    }
}

/// Non-durable store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: RwLock<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token pair
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        let store = Self::new();
        *store.state.write().unwrap_or_else(PoisonError::into_inner) =
            StoredCredentials::default().updated(access_token, refresh_token, None);
        store
    }

    pub fn snapshot(&self) -> StoredCredentials {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    fn user_profile(&self) -> Option<UserProfile> {
        self.snapshot().user
    }

    fn set_credentials(
        &self,
        access_token: &str,
        refresh_token: &str,
        profile: Option<&UserProfile>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = state.updated(access_token, refresh_token, profile);
        Ok(())
    }

    fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = state.with_user(profile) {
            *state = next;
        }
        Ok(())
    }

    fn clear_credentials(&self) -> Result<()> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = StoredCredentials::default();
        Ok(())
    }
}

/// JSON file store with restricted permissions (0600).
///
/// The file is read once at open; every write goes straight through to disk.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    state: RwLock<StoredCredentials>,
}

impl FileCredentialStore {
    /// Open the store at `path`. A missing file means "logged out".
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read credentials from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse credentials from {}", path.display()))?
        } else {
            StoredCredentials::default()
        };

        tracing::debug!(
            path = %path.display(),
            logged_in = state.access_token.is_some(),
            "Opened credential store"
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> StoredCredentials {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    fn user_profile(&self) -> Option<UserProfile> {
        self.snapshot().user
    }

    fn set_credentials(
        &self,
        access_token: &str,
        refresh_token: &str,
        profile: Option<&UserProfile>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = state.updated(access_token, refresh_token, profile);
        write_credentials_file(&self.path, &next).map_err(|e| ClientError::Storage(format!("{:#}", e)))?;
        *state = next;
        Ok(())
    }

    fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = state.with_user(profile) {
            write_credentials_file(&self.path, &next)
                .map_err(|e| ClientError::Storage(format!("{:#}", e)))?;
            *state = next;
        }
        Ok(())
    }

    fn clear_credentials(&self) -> Result<()> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = StoredCredentials::default();

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Write the file next to its final location, then rename it into place.
/// A crash mid-write leaves the previous file intact.
fn write_credentials_file(path: &Path, creds: &StoredCredentials) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let contents = serde_json::to_string_pretty(creds).context("Failed to serialize credentials")?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = write_private(&tmp_path, contents.as_bytes()).and_then(|()| {
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move credentials into {}", path.display()))
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Create (or truncate) `path` readable by the owner only, and flush it to disk
fn write_private(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;

    // `mode` only applies on creation; a leftover file may be wider
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }

    file.write_all(contents)
        .with_context(|| format!("Failed to write to {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}
