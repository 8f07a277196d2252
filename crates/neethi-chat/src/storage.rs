//! Local persistence of conversations, the active selection and preferences
//!
//! A [`KeyValueStore`] is the string key-value backend (a directory of JSON
//! files, or memory in tests). [`LocalStorage`] layers namespaced keys and a
//! versioned conversation schema on top of it.

use neethi_api::GenerationOptions;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::conversation::Conversation;

/// Key holding the serialized conversation list
pub const CONVERSATIONS_KEY: &str = "neethi-conversations";
/// Key holding the active conversation id
pub const CURRENT_CONVERSATION_KEY: &str = "neethi-current-conversation";
/// Key holding user preferences
pub const PREFERENCES_KEY: &str = "neethi-preferences";

const ALL_KEYS: [&str; 3] = [CONVERSATIONS_KEY, CURRENT_CONVERSATION_KEY, PREFERENCES_KEY];

/// Version written with every conversation list.
///
/// Version 0 is the unversioned bare-array layout with camelCase fields.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors raised by the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored conversations use schema version {0}, newer than this build supports")]
    UnsupportedVersion(u32),

    #[error("stored data has an unexpected shape: {0}")]
    Corrupt(String),
}

type StorageResult<T> = std::result::Result<T, StorageError>;

/// A string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// In-memory store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write to a sibling temp file, then rename over the target
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, value)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// User preferences that override the configured generation defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub model: Option<String>,
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt_id: Option<String>,
}

impl Preferences {
    /// Overlay these preferences on `base`
    pub fn apply(&self, base: &GenerationOptions) -> GenerationOptions {
        let mut options = base.clone();
        if let Some(ref model) = self.model {
            options.model = model.clone();
        }
        if let Some(ref provider) = self.provider {
            options.provider = provider.clone();
        }
        if let Some(temperature) = self.temperature {
            options.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            options.max_tokens = max_tokens;
        }
        if self.system_prompt_id.is_some() {
            options.system_prompt_id = self.system_prompt_id.clone();
        }
        options
    }
}

#[derive(Serialize)]
struct ConversationsEnvelope<'a> {
    version: u32,
    conversations: &'a [Conversation],
}

/// Namespaced, versioned view over a [`KeyValueStore`]
#[derive(Clone)]
pub struct LocalStorage {
    store: Arc<dyn KeyValueStore>,
}

impl LocalStorage {
    /// Wrap a store
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Storage that only lives as long as the process
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Storage in a directory of JSON files
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileStore::new(dir))
    }

    /// Load the conversation list, migrating older layouts.
    pub fn load_conversations(&self) -> StorageResult<Vec<Conversation>> {
        let Some(raw) = self.store.get(CONVERSATIONS_KEY)? else {
            return Ok(Vec::new());
        };
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        let (version, conversations) = match value {
            serde_json::Value::Array(_) => (0, value),
            serde_json::Value::Object(mut map) => {
                let version = map
                    .get("version")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| StorageError::Corrupt("missing schema version".into()))?;
                let conversations = map
                    .remove("conversations")
                    .ok_or_else(|| StorageError::Corrupt("missing conversation list".into()))?;
                let version = u32::try_from(version)
                    .map_err(|_| StorageError::UnsupportedVersion(u32::MAX))?;
                (version, conversations)
            }
            other => {
                return Err(StorageError::Corrupt(format!(
                    "expected a conversation list, found {}",
                    json_kind(&other)
                )));
            }
        };

        migrate(version, conversations)
    }

    /// Persist the conversation list at the current schema version
    pub fn save_conversations(&self, conversations: &[Conversation]) -> StorageResult<()> {
        let envelope = ConversationsEnvelope {
            version: SCHEMA_VERSION,
            conversations,
        };
        self.store
            .set(CONVERSATIONS_KEY, &serde_json::to_string(&envelope)?)
    }

    /// Load the active conversation id
    pub fn load_active_id(&self) -> StorageResult<Option<String>> {
        let Some(raw) = self.store.get(CURRENT_CONVERSATION_KEY)? else {
            return Ok(None);
        };
        // Older layouts stored the bare id rather than a JSON string
        let id = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        Ok(Some(id).filter(|id| !id.is_empty()))
    }

    /// Persist the active conversation id; `None` removes it
    pub fn save_active_id(&self, id: Option<&str>) -> StorageResult<()> {
        match id {
            Some(id) => self
                .store
                .set(CURRENT_CONVERSATION_KEY, &serde_json::to_string(id)?),
            None => self.store.remove(CURRENT_CONVERSATION_KEY),
        }
    }

    /// Load preferences; missing preferences are the defaults
    pub fn load_preferences(&self) -> StorageResult<Preferences> {
        match self.store.get(PREFERENCES_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Preferences::default()),
        }
    }

    /// Persist preferences
    pub fn save_preferences(&self, preferences: &Preferences) -> StorageResult<()> {
        self.store
            .set(PREFERENCES_KEY, &serde_json::to_string(preferences)?)
    }

    /// Remove every key this layer owns
    pub fn clear_all(&self) -> StorageResult<()> {
        for key in ALL_KEYS {
            self.store.remove(key)?;
        }
        Ok(())
    }
}

fn migrate(version: u32, conversations: serde_json::Value) -> StorageResult<Vec<Conversation>> {
    match version {
        // v0 differs only in field casing, which the serde aliases accept
        0 | 1 => {
            if version < SCHEMA_VERSION {
                tracing::info!("Migrating stored conversations from schema v{}", version);
            }
            Ok(serde_json::from_value(conversations)?)
        }
        newer => Err(StorageError::UnsupportedVersion(newer)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neethi_api::Message;
    use serde_json::json;

    fn sample() -> Vec<Conversation> {
        let mut first = Conversation::new();
        first.push(Message::user("Explain quantum computing"));
        first.push(Message::assistant("Quantum computing is..."));
        let mut second = Conversation::new();
        second.title = "Scratch".into();
        vec![first, second]
    }

    #[test]
    fn test_round_trip_preserves_conversations() {
        let storage = LocalStorage::in_memory();
        let conversations = sample();
        storage.save_conversations(&conversations).unwrap();

        let loaded = storage.load_conversations().unwrap();
        assert_eq!(loaded, conversations);
    }

    #[test]
    fn test_written_with_schema_version() {
        let store = Arc::new(MemoryStore::new());
        let storage = LocalStorage {
            store: store.clone(),
        };
        storage.save_conversations(&sample()).unwrap();

        let raw = store.get(CONVERSATIONS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], SCHEMA_VERSION);
        assert_eq!(value["conversations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_migrates_unversioned_camel_case_layout() {
        let store = MemoryStore::new();
        let legacy = json!([{
            "id": "c1",
            "title": "Old chat",
            "messages": [
                {"id": "m1", "role": "user", "content": "hi", "timestamp": "2024-05-01T10:00:00.000Z", "isStreaming": false},
                {"id": "m2", "role": "assistant", "content": "hello", "timestamp": "2024-05-01T10:00:01.000Z"}
            ],
            "createdAt": "2024-05-01T10:00:00.000Z",
            "updatedAt": "2024-05-01T10:00:01.000Z"
        }]);
        store.set(CONVERSATIONS_KEY, &legacy.to_string()).unwrap();

        let loaded = LocalStorage::new(store).load_conversations().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c1");
        assert_eq!(loaded[0].messages[1].content, "hello");
        assert_eq!(loaded[0].updated_at.to_rfc3339(), "2024-05-01T10:00:01+00:00");
    }

    #[test]
    fn test_refuses_newer_schema() {
        let store = MemoryStore::new();
        store
            .set(
                CONVERSATIONS_KEY,
                &json!({"version": 7, "conversations": []}).to_string(),
            )
            .unwrap();

        let err = LocalStorage::new(store).load_conversations().unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_rejects_unexpected_shape() {
        let store = MemoryStore::new();
        store.set(CONVERSATIONS_KEY, "\"nope\"").unwrap();
        let err = LocalStorage::new(store).load_conversations().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn test_missing_keys_load_as_empty() {
        let storage = LocalStorage::in_memory();
        assert!(storage.load_conversations().unwrap().is_empty());
        assert!(storage.load_active_id().unwrap().is_none());
        assert_eq!(storage.load_preferences().unwrap(), Preferences::default());
    }

    #[test]
    fn test_active_id_round_trip_and_removal() {
        let storage = LocalStorage::in_memory();
        storage.save_active_id(Some("abc")).unwrap();
        assert_eq!(storage.load_active_id().unwrap().as_deref(), Some("abc"));

        storage.save_active_id(None).unwrap();
        assert!(storage.load_active_id().unwrap().is_none());
    }

    #[test]
    fn test_active_id_accepts_bare_string() {
        let store = MemoryStore::new();
        store.set(CURRENT_CONVERSATION_KEY, "0f1e-raw-id").unwrap();
        let storage = LocalStorage::new(store);
        assert_eq!(storage.load_active_id().unwrap().as_deref(), Some("0f1e-raw-id"));
    }

    #[test]
    fn test_preferences_apply_over_defaults() {
        let prefs = Preferences {
            model: Some("llama3".into()),
            temperature: Some(0.2),
            ..Default::default()
        };
        let options = prefs.apply(&GenerationOptions::default());
        assert_eq!(options.model, "llama3");
        assert_eq!(options.temperature, 0.2);
        assert_eq!(options.provider, neethi_api::DEFAULT_PROVIDER);
        assert_eq!(options.max_tokens, neethi_api::DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::in_dir(dir.path().join("profile"));
        let conversations = sample();

        storage.save_conversations(&conversations).unwrap();
        storage.save_active_id(Some(&conversations[0].id)).unwrap();
        storage
            .save_preferences(&Preferences {
                max_tokens: Some(512),
                ..Default::default()
            })
            .unwrap();

        let reopened = LocalStorage::in_dir(dir.path().join("profile"));
        assert_eq!(reopened.load_conversations().unwrap(), conversations);
        assert_eq!(
            reopened.load_active_id().unwrap().as_deref(),
            Some(conversations[0].id.as_str())
        );
        assert_eq!(reopened.load_preferences().unwrap().max_tokens, Some(512));
        assert!(dir.path().join("profile").join("neethi-conversations.json").exists());
        assert!(!dir.path().join("profile").join("neethi-conversations.json.tmp").exists());

        reopened.clear_all().unwrap();
        assert!(reopened.load_conversations().unwrap().is_empty());
        assert!(reopened.load_active_id().unwrap().is_none());
        assert!(!dir.path().join("profile").join("neethi-preferences.json").exists());
    }
}
