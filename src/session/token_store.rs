//! Persisted-token storage
//!
//! The browser original kept the bearer token in localStorage; here the
//! same concern is a small trait so hosts can pick in-memory (tests,
//! ephemeral runs) or file-backed (session restore across runs) storage.

use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

/// Storage for the persisted auth token
pub trait TokenStore: Send + Sync {
    /// Load the persisted token, if any
    fn load(&self) -> Option<String>;
    /// Persist a token, replacing any previous one
    fn save(&self, token: &str) -> std::io::Result<()>;
    /// Remove the persisted token
    fn clear(&self);
}

/// In-memory token store
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.read().expect("token lock poisoned").clone()
    }

    fn save(&self, token: &str) -> std::io::Result<()> {
        *self.token.write().expect("token lock poisoned") = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) {
        *self.token.write().expect("token lock poisoned") = None;
    }
}

/// File-backed token store
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(_) => None,
        }
    }

    fn save(&self, token: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)
    }

    fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove token file: {}", e);
            }
        }
    }
}
