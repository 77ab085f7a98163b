//! Session credential: an in-memory token mirrored to durable storage.

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::Result;

/// Key the token is stored under in key-value stores such as `localStorage`.
pub const CREDENTIAL_KEY: &str = "token";

/// Durable home of the session token.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Process-local store. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    slot: Arc<RwLock<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    pub fn token(&self) -> Option<String> {
        read_slot(&self.slot)
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(read_slot(&self.slot))
    }

    fn save(&self, token: &str) -> Result<()> {
        write_slot(&self.slot, Some(token.to_string()));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        write_slot(&self.slot, None);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file_store::FileStore;

#[cfg(not(target_arch = "wasm32"))]
mod file_store {
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use serde::{Deserialize, Serialize};
    use tracing::warn;

    use super::CredentialStore;
    use crate::Result;

    #[derive(Debug, Serialize, Deserialize)]
    struct SessionFile {
        token: String,
    }

    /// JSON session file, e.g. `{"token": "..."}`.
    #[derive(Clone, Debug)]
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl CredentialStore for FileStore {
        fn load(&self) -> Result<Option<String>> {
            if !self.path.exists() {
                return Ok(None);
            }
            let contents = fs::read_to_string(&self.path)?;
            match serde_json::from_str::<SessionFile>(&contents) {
                Ok(file) if !file.token.is_empty() => Ok(Some(file.token)),
                Ok(_) => Ok(None),
                Err(err) => {
                    warn!(
                        "Ignoring unreadable session file {}: {}",
                        self.path.display(),
                        err
                    );
                    Ok(None)
                }
            }
        }

        fn save(&self, token: &str) -> Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let serialized = serde_json::to_string_pretty(&SessionFile {
                token: token.to_string(),
            })?;
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            // Owner-only: the file holds a bearer token.
            #[cfg(unix)]
            {
                use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
                options.mode(0o600);
                // `mode` only applies on creation; tighten an older file too.
                if self.path.exists() {
                    fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
                }
            }
            let mut file = options.open(&self.path)?;
            file.write_all(serialized.as_bytes())?;
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        }
    }
}

/// The credential every outbound request reads. Loaded from the store once;
/// every mutation writes through.
pub struct Session {
    token: RwLock<Option<String>>,
    store: Box<dyn CredentialStore>,
}

impl Session {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        let token = match store.load() {
            Ok(token) => token,
            Err(err) => {
                warn!("Could not read stored credential: {err}");
                None
            }
        };
        debug!(restored = token.is_some(), "session initialized");
        Self {
            token: RwLock::new(token),
            store,
        }
    }

    pub fn get(&self) -> Option<String> {
        read_slot(&self.token)
    }

    pub fn has_credential(&self) -> bool {
        self.get().is_some()
    }

    pub fn set(&self, token: &str) -> Result<()> {
        write_slot(&self.token, Some(token.to_string()));
        self.store.save(token)
    }

    /// Drops the token from memory even if the store fails to forget it.
    pub fn clear(&self) -> Result<()> {
        write_slot(&self.token, None);
        self.store.clear()
    }
}

fn read_slot(slot: &RwLock<Option<String>>) -> Option<String> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_slot(slot: &RwLock<Option<String>>, value: Option<String>) {
    match slot.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EqvizError;

    struct FailingStore;

    impl CredentialStore for FailingStore {
        fn load(&self) -> Result<Option<String>> {
            Err(EqvizError::Storage("unavailable".into()))
        }

        fn save(&self, _token: &str) -> Result<()> {
            Err(EqvizError::Storage("unavailable".into()))
        }

        fn clear(&self) -> Result<()> {
            Err(EqvizError::Storage("unavailable".into()))
        }
    }

    #[test]
    fn test_session_restores_from_store() {
        let store = MemoryStore::with_token("abc");
        let session = Session::new(Box::new(store));
        assert!(session.has_credential());
        assert_eq!(session.get().as_deref(), Some("abc"));
    }

    #[test]
    fn test_session_writes_through() {
        let store = MemoryStore::new();
        let session = Session::new(Box::new(store.clone()));
        assert!(!session.has_credential());

        session.set("xyz").unwrap();
        assert_eq!(store.token().as_deref(), Some("xyz"));

        session.clear().unwrap();
        assert_eq!(store.token(), None);
        assert_eq!(session.get(), None);
    }

    #[test]
    fn test_session_reads_store_only_once() {
        let store = MemoryStore::new();
        let session = Session::new(Box::new(store.clone()));
        store.save("set-behind-our-back").unwrap();
        assert_eq!(session.get(), None);
    }

    #[test]
    fn test_failing_store_still_clears_memory() {
        let session = Session::new(Box::new(FailingStore));
        assert!(!session.has_credential());
        assert!(session.set("t").is_err());
        assert_eq!(session.get().as_deref(), Some("t"));
        assert!(session.clear().is_err());
        assert_eq!(session.get(), None);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = FileStore::new(&path);

        assert_eq!(store.load().unwrap(), None);
        store.save("tok-1").unwrap();
        assert!(path.exists());
        assert_eq!(store.load().unwrap().as_deref(), Some("tok-1"));

        store.clear().unwrap();
        assert!(!path.exists());
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileStore::new(&path);
        store.save("tok-2").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap().as_deref(), Some("tok-2"));

        std::fs::remove_file(&path).unwrap();
        store.save("tok-3").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_has_credential_survives_poisoned_lock() {
        let store = MemoryStore::with_token("abc");
        let session = Arc::new(Session::new(Box::new(store)));
        let poisoner = Arc::clone(&session);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.token.write().unwrap();
            panic!("poison the credential lock");
        })
        .join();
        assert!(session.token.is_poisoned());
        assert_eq!(session.get().as_deref(), Some("abc"));
        assert!(session.has_credential());
    }

    #[test]
    fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileStore::new(&path);
        assert_eq!(store.load().unwrap(), None);
    }
}
