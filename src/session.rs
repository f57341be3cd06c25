use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ApiError;

/// Holder of the access/refresh token pair.
///
/// `set_pair` only overwrites the values it is given, which is what refresh
/// token rotation needs: a refresh response may or may not carry a new
/// refresh token.
pub trait SessionStore: Send + Sync {
    fn access(&self) -> Option<String>;
    fn refresh(&self) -> Option<String>;
    fn set_pair(&self, access: Option<&str>, refresh: Option<&str>) -> Result<(), ApiError>;
    fn clear(&self) -> Result<(), ApiError>;

    /// When the current pair was last written, if the store tracks it.
    fn saved_at(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

impl StoredCredentials {
    fn merge(&mut self, access: Option<&str>, refresh: Option<&str>) {
        if let Some(a) = access.filter(|a| !a.is_empty()) {
            self.access_token = Some(a.to_string());
        }
        if let Some(r) = refresh.filter(|r| !r.is_empty()) {
            self.refresh_token = Some(r.to_string());
        }
    }
}

/// Credentials persisted as JSON under the config directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Option<StoredCredentials> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(creds) => Some(creds),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable credentials file");
                None
            }
        }
    }

    fn save(&self, creds: &StoredCredentials) -> Result<(), ApiError> {
        std::fs::write(&self.path, serde_json::to_string_pretty(creds)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }
        Ok(())
    }

}

impl SessionStore for FileSessionStore {
    fn access(&self) -> Option<String> {
        self.load().and_then(|c| c.access_token)
    }

    fn refresh(&self) -> Option<String> {
        self.load().and_then(|c| c.refresh_token)
    }

    fn set_pair(&self, access: Option<&str>, refresh: Option<&str>) -> Result<(), ApiError> {
        let mut creds = self.load().unwrap_or_default();
        creds.merge(access, refresh);
        creds.saved_at = Some(chrono::Utc::now().to_rfc3339());
        self.save(&creds)
    }

    fn clear(&self) -> Result<(), ApiError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn saved_at(&self) -> Option<String> {
        self.load().and_then(|c| c.saved_at)
    }
}

/// In-process store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySessionStore {
    inner: std::sync::Mutex<StoredCredentials>,
}

#[cfg(test)]
impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(access: &str, refresh: &str) -> Self {
        let store = Self::default();
        store.lock().merge(Some(access), Some(refresh));
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredCredentials> {
        // A poisoned lock still holds a usable token pair.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl SessionStore for MemorySessionStore {
    fn access(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    fn refresh(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    fn set_pair(&self, access: Option<&str>, refresh: Option<&str>) -> Result<(), ApiError> {
        self.lock().merge(access, refresh);
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        *self.lock() = StoredCredentials::default();
        Ok(())
    }
}
