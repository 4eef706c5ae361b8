use super::error::ChatError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const USER_KEY: &str = "expert_chat_user";
pub const TOKEN_KEY: &str = "expert_chat_token";
pub const THEME_KEY: &str = "expert_chat_theme";
pub const CLIENT_ID_KEY: &str = "expert_chat_client_id";
pub const CURRENT_SESSION_KEY: &str = "expert_chat_current_session_id";
pub const CHAT_HISTORY_KEY: &str = "expert_chat_chat_history";

pub fn messages_key(session_id: &str) -> String {
    format!("expert_chat_messages_{session_id}")
}

pub fn conversations_key(user_id: &str) -> String {
    format!("expert_chat_conversations_{user_id}")
}

pub fn payment_history_key(user_id: &str) -> String {
    format!("expert_chat_payment_history_{user_id}")
}

/// String key/value persistence shared by the session and account stores.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ChatError>;
    fn remove(&self, key: &str) -> Result<(), ChatError>;
    fn keys(&self) -> Vec<String>;
}

/// Read and decode a JSON value. Corrupt values are logged and treated as
/// absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring corrupt value under {}: {}", key, e);
            None
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), ChatError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> ChatError {
    ChatError::Storage("store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ChatError> {
        self.entries
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ChatError> {
        self.entries.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Key/value store persisted as a single pretty-printed JSON object.
/// Every write rewrites the file.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<Self, ChatError> {
        let entries = if path.exists() {
            let content =
                fs::read_to_string(path).map_err(|e| ChatError::Storage(e.to_string()))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Store file {} is corrupt, starting empty: {}", path.display(), e);
                BTreeMap::new()
            })
        } else {
            debug!("No store file at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ChatError::Storage(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content).map_err(|e| ChatError::Storage(e.to_string()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    // Changes are staged on a copy and only kept once the file is written.
    fn set(&self, key: &str, value: &str) -> Result<(), ChatError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let mut staged = entries.clone();
        staged.insert(key.to_string(), value.to_string());
        self.flush(&staged)?;
        *entries = staged;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ChatError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut staged = entries.clone();
        staged.remove(key);
        self.flush(&staged)?;
        *entries = staged;
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}
