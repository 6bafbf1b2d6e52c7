use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chat_backend::AuthToken;
use serde_json::{Map, Value};

use crate::error::SessionStoreError;

/// Well-known key of the credential slot.
pub const TOKEN_KEY: &str = "authToken";
pub const TOKEN_DIR: &str = ".chat_sync";
pub const TOKEN_FILE_NAME: &str = "credentials.json";

/// Durable single-value slot holding the authentication token.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<AuthToken>, SessionStoreError>;

    fn save(&self, token: &AuthToken) -> Result<(), SessionStoreError>;

    /// Removes the token. Clearing an empty slot is not an error.
    fn clear(&self) -> Result<(), SessionStoreError>;
}

/// Process-local slot; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<AuthToken>>,
}

impl MemoryTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<AuthToken>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.token).clone())
    }

    fn save(&self, token: &AuthToken) -> Result<(), SessionStoreError> {
        *lock_unpoisoned(&self.token) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *lock_unpoisoned(&self.token) = None;
        Ok(())
    }
}

/// JSON object file `{"authToken": "<token>"}`.
///
/// Writes go through a sibling temp file and a rename so a crash never leaves
/// a half-written credential behind. Other keys in the object are preserved.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<Option<Map<String, Value>>, SessionStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionStoreError::io(
                    "reading credential file",
                    &self.path,
                    source,
                ))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Some(Map::new()));
        }

        match serde_json::from_str::<Value>(&raw)
            .map_err(|source| SessionStoreError::json_parse(&self.path, source))?
        {
            Value::Object(object) => Ok(Some(object)),
            _ => Err(SessionStoreError::NotAnObject {
                path: self.path.clone(),
            }),
        }
    }

    fn write_object(&self, object: &Map<String, Value>) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                SessionStoreError::io("creating credential directory", parent, source)
            })?;
        }

        let serialized = serde_json::to_vec_pretty(object)
            .map_err(|source| SessionStoreError::json_serialize(&self.path, source))?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, serialized).map_err(|source| {
            SessionStoreError::io("writing credential temp file", &temp_path, source)
        })?;
        restrict_permissions(&temp_path)?;
        fs::rename(&temp_path, &self.path).map_err(|source| {
            SessionStoreError::io("replacing credential file", &self.path, source)
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| TOKEN_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<AuthToken>, SessionStoreError> {
        Ok(self
            .read_object()?
            .and_then(|object| object.get(TOKEN_KEY).cloned())
            .and_then(|value| match value {
                Value::String(token) => AuthToken::parse(token),
                _ => None,
            }))
    }

    fn save(&self, token: &AuthToken) -> Result<(), SessionStoreError> {
        let mut object = self.read_object().unwrap_or_default().unwrap_or_default();
        object.insert(TOKEN_KEY.to_owned(), Value::String(token.as_str().to_owned()));
        self.write_object(&object)
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        let Some(mut object) = self.read_object()? else {
            return Ok(());
        };
        if object.remove(TOKEN_KEY).is_none() {
            return Ok(());
        }
        if object.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => Err(SessionStoreError::io(
                    "removing credential file",
                    &self.path,
                    source,
                )),
            };
        }
        self.write_object(&object)
    }
}

/// `$HOME/.chat_sync/credentials.json`.
pub fn default_token_path() -> Result<PathBuf, SessionStoreError> {
    let home = std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .ok_or(SessionStoreError::MissingHome)?;
    Ok(PathBuf::from(home).join(TOKEN_DIR).join(TOKEN_FILE_NAME))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), SessionStoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|source| SessionStoreError::io("restricting credential file", path, source))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), SessionStoreError> {
    Ok(())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
