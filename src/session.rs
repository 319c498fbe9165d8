use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt, fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::{debug, error};

pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to access session storage {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Session storage {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

/// Opaque bearer credential. Only the backend can tell whether it is valid.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// String key/value store backing the session.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

/// JSON map persisted on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<HashMap<String, String>, SessionError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).map_err(|err| SessionError::Corrupted {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    fn write(&self, values: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let contents = serde_json::to_string_pretty(values).map_err(|err| SessionError::Corrupted {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        self.write_private(contents.as_bytes())
            .map_err(|err| self.io_error(err))
    }

    /// The file holds a bearer token, so only the owner may read it.
    #[cfg(unix)]
    fn write_private(&self, contents: &[u8]) -> std::io::Result<()> {
        use std::io::Write;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)?;
        // `mode` only applies on creation.
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(contents)
    }

    #[cfg(not(unix))]
    fn write_private(&self, contents: &[u8]) -> std::io::Result<()> {
        fs::write(&self.path, contents)
    }

    fn io_error(&self, err: std::io::Error) -> SessionError {
        error!(?err, path = %self.path.display(), "Session storage access failed");
        SessionError::Io {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock().unwrap();
        let mut values = self.read()?;
        values.insert(key.to_string(), value.to_string());
        self.write(&values)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock().unwrap();
        let mut values = self.read()?;
        if values.remove(key).is_some() {
            self.write(&values)?;
        }
        Ok(())
    }
}

/// The one place the bearer token is read or written.
#[derive(Clone)]
pub struct Session {
    storage: Arc<dyn SessionStorage>,
}

impl Session {
    pub fn new(storage: impl SessionStorage) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemorySessionStorage::default())
    }

    pub fn token(&self) -> Result<Option<SessionToken>, SessionError> {
        Ok(self
            .storage
            .get(TOKEN_KEY)?
            .filter(|token| !token.is_empty())
            .map(SessionToken))
    }

    pub fn store_token(&self, token: &SessionToken) -> Result<(), SessionError> {
        debug!("Storing session token");
        self.storage.set(TOKEN_KEY, token.as_str())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        debug!("Clearing session token");
        self.storage.remove(TOKEN_KEY)
    }
}
