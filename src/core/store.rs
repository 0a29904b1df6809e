//! Session-scoped persistence of workflow state.
//!
//! A [`SessionStore`] maps the six logical workflow fields onto a text
//! key/value medium. The medium may be missing, full, or disabled; every
//! failure is logged and turned into a default value (for reads) or a
//! `false` success flag (for writes) so the engine never stalls on storage.
//!
//! Per-step maps (content, approval, feedback) are stored as one JSON blob
//! per field rather than one key per step.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::workflow::ENTRY_STEP;

/// Default key prefix for persisted fields.
pub const DEFAULT_KEY_PREFIX: &str = "sdlc_";

/// Storage medium errors.
///
/// These never leave [`SessionStore`]; they are logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded writing '{key}' ({needed} bytes, capacity {capacity})")]
    QuotaExceeded { key: String, needed: usize, capacity: usize },

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A raw text key/value medium.
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Check that the medium accepts writes.
    fn check_available(&self) -> Result<(), StorageError> {
        const PROBE_KEY: &str = "__storage_test__";
        self.set(PROBE_KEY, "test")?;
        self.remove(PROBE_KEY)
    }
}

/// In-process medium, optionally bounded to simulate quota exhaustion.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryBackend {
    /// Create an unbounded in-memory medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a medium holding at most `capacity` bytes of keys and values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), capacity: Some(capacity) }
    }

    /// Bytes currently used.
    pub fn used_bytes(&self) -> usize {
        self.entries.lock().iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > capacity {
                return Err(StorageError::QuotaExceeded { key: key.to_string(), needed, capacity });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key inside a session directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create a medium rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Session directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// A medium that is never available (storage disabled by the user or host).
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackend;

impl StorageBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage is disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage is disabled".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage is disabled".to_string()))
    }
}

/// The logical fields persisted for a workflow session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreField {
    /// JSON map of step id to generated text
    GeneratedContent,
    /// JSON map of step id to approval flag
    ApprovedStates,
    /// JSON map of step id to pending feedback (or null)
    FeedbackStates,
    /// Project description
    ProjectPrompt,
    /// Generation API credential
    ApiKey,
    /// Current step id
    CurrentStep,
}

impl StoreField {
    /// All fields, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::GeneratedContent,
        Self::ApprovedStates,
        Self::FeedbackStates,
        Self::ProjectPrompt,
        Self::ApiKey,
        Self::CurrentStep,
    ];

    /// Key suffix for this field.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::GeneratedContent => "generated_content",
            Self::ApprovedStates => "approved_states",
            Self::FeedbackStates => "feedback_states",
            Self::ProjectPrompt => "project_prompt",
            Self::ApiKey => "api_key",
            Self::CurrentStep => "current_step",
        }
    }

    /// Value returned when the field is missing or unreadable.
    pub fn default_value(self) -> &'static str {
        match self {
            Self::GeneratedContent | Self::ApprovedStates | Self::FeedbackStates => "{}",
            Self::ProjectPrompt | Self::ApiKey => "",
            Self::CurrentStep => ENTRY_STEP,
        }
    }
}

/// Fault-tolerant typed access to the workflow fields.
pub struct SessionStore {
    backend: Box<dyn StorageBackend>,
    prefix: String,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl SessionStore {
    /// Wrap a storage medium.
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self { backend: Box::new(backend), prefix: DEFAULT_KEY_PREFIX.to_string() }
    }

    /// Wrap an already boxed storage medium.
    pub fn from_boxed(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend, prefix: DEFAULT_KEY_PREFIX.to_string() }
    }

    /// Unbounded in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Use a different key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Name of the underlying medium.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Full key for a field.
    pub fn key(&self, field: StoreField) -> String {
        format!("{}{}", self.prefix, field.suffix())
    }

    /// Whether the medium currently accepts writes.
    pub fn is_available(&self) -> bool {
        match self.backend.check_available() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Session storage is not available");
                false
            }
        }
    }

    /// Read a field, falling back to its default.
    pub fn get(&self, field: StoreField) -> String {
        match self.backend.get(&self.key(field)) {
            Ok(Some(value)) => value,
            Ok(None) => field.default_value().to_string(),
            Err(e) => {
                tracing::warn!(field = field.suffix(), error = %e, "Failed to read session field");
                field.default_value().to_string()
            }
        }
    }

    /// Write a field. Returns whether the write succeeded.
    pub fn set(&self, field: StoreField, value: &str) -> bool {
        match self.backend.set(&self.key(field), value) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(field = field.suffix(), error = %e, "Failed to save session field");
                false
            }
        }
    }

    /// Remove every workflow field. Returns whether all removals succeeded.
    pub fn clear(&self) -> bool {
        let mut ok = true;
        for field in StoreField::ALL {
            if let Err(e) = self.backend.remove(&self.key(field)) {
                tracing::error!(field = field.suffix(), error = %e, "Failed to clear session field");
                ok = false;
            }
        }
        if ok {
            tracing::debug!("Cleared all workflow session data");
        }
        ok
    }

    fn get_map<T: DeserializeOwned>(&self, field: StoreField) -> HashMap<String, T> {
        let raw = self.get(field);
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::error!(field = field.suffix(), error = %e, "Corrupt session blob, using empty map");
                HashMap::new()
            }
        }
    }

    fn set_map<T: Serialize>(&self, field: StoreField, map: &HashMap<String, T>) -> bool {
        match serde_json::to_string(map) {
            Ok(json) => self.set(field, &json),
            Err(e) => {
                tracing::error!(field = field.suffix(), error = %e, "Failed to encode session blob");
                false
            }
        }
    }

    // --- Generated content ---

    /// All generated content by step id.
    pub fn generated_content(&self) -> HashMap<String, String> {
        let content: HashMap<String, String> = self.get_map(StoreField::GeneratedContent);
        tracing::trace!(steps = content.len(), "Loaded generated content");
        content
    }

    /// Whether non-blank content is stored for a step.
    pub fn has_content_for_step(&self, step_id: &str) -> bool {
        self.generated_content().get(step_id).is_some_and(|c| !c.trim().is_empty())
    }

    /// Store content for one step, keeping the others.
    pub fn save_generated_content(&self, step_id: &str, content: &str) -> bool {
        let mut all = self.generated_content();
        all.insert(step_id.to_string(), content.to_string());
        let saved = self.set_map(StoreField::GeneratedContent, &all);
        if saved {
            tracing::debug!(step = step_id, chars = content.len(), "Saved generated content");
        }
        saved
    }

    /// Drop content for one step, keeping the others.
    pub fn remove_generated_content(&self, step_id: &str) -> bool {
        let mut all = self.generated_content();
        if all.remove(step_id).is_none() {
            return true;
        }
        self.set_map(StoreField::GeneratedContent, &all)
    }

    // --- Approval and feedback ---

    /// Approval flags by step id.
    pub fn approved_states(&self) -> HashMap<String, bool> {
        self.get_map(StoreField::ApprovedStates)
    }

    /// Replace all approval flags.
    pub fn save_approved_states(&self, states: &HashMap<String, bool>) -> bool {
        let saved = self.set_map(StoreField::ApprovedStates, states);
        if saved {
            let approved = states.values().filter(|v| **v).count();
            tracing::debug!(approved, "Saved approval states");
        }
        saved
    }

    /// Pending feedback by step id.
    pub fn feedback_states(&self) -> HashMap<String, Option<String>> {
        self.get_map(StoreField::FeedbackStates)
    }

    /// Replace all feedback entries.
    pub fn save_feedback_states(&self, states: &HashMap<String, Option<String>>) -> bool {
        let saved = self.set_map(StoreField::FeedbackStates, states);
        if saved {
            let pending = states.values().filter(|v| v.is_some()).count();
            tracing::debug!(pending, "Saved feedback states");
        }
        saved
    }

    // --- Scalars ---

    /// Project description, or empty.
    pub fn project_prompt(&self) -> String {
        self.get(StoreField::ProjectPrompt)
    }

    /// Store the project description.
    pub fn save_project_prompt(&self, prompt: &str) -> bool {
        self.set(StoreField::ProjectPrompt, prompt)
    }

    /// Credential, or empty.
    pub fn api_key(&self) -> String {
        self.get(StoreField::ApiKey)
    }

    /// Store the credential.
    pub fn save_api_key(&self, api_key: &str) -> bool {
        let saved = self.set(StoreField::ApiKey, api_key);
        if saved {
            tracing::debug!(len = api_key.len(), "Saved API key to session storage");
        }
        saved
    }

    /// Current step id, defaulting to the entry step.
    pub fn current_step(&self) -> String {
        let step = self.get(StoreField::CurrentStep);
        if step.trim().is_empty() {
            ENTRY_STEP.to_string()
        } else {
            step
        }
    }

    /// Store the current step id.
    pub fn save_current_step(&self, step_id: &str) -> bool {
        self.set(StoreField::CurrentStep, step_id)
    }
}
