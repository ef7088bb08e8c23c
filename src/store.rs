//! Per-persona conversation histories.
//!
//! A store maps each [`PersonaId`] to the ordered transcript of its
//! conversation. Every mutation is atomic from the caller's point of view and
//! touches exactly one persona (or, for `clear_all`, all of them). Callers only
//! ever see cloned snapshots.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::observability::{STORE_WRITE_ERRORS, STORE_WRITES};
use crate::types::{Message, PersonaId};
use crate::{Error, Result};

/// Every conversation, keyed by persona.
pub type ConversationSet = BTreeMap<PersonaId, Vec<Message>>;

/// Current on-disk format version of [`FileStore`].
pub const STORE_VERSION: u32 = 1;

/// Durable storage of per-persona conversations.
pub trait ConversationStore: Send + Sync {
    /// A snapshot of the persona's history; empty if the persona is unknown.
    fn history(&self, persona: &PersonaId) -> Result<Vec<Message>>;

    /// Append one message to the persona's history.
    ///
    /// The message is durable once this returns `Ok`.
    fn append(&self, persona: &PersonaId, message: Message) -> Result<()>;

    /// Empty the persona's history. Other personas are untouched.
    fn clear(&self, persona: &PersonaId) -> Result<()>;

    /// Remove every persona and its history.
    fn clear_all(&self) -> Result<()>;

    /// Every persona that has a history entry, in sorted order.
    fn personas(&self) -> Result<Vec<PersonaId>>;
}

fn lock(set: &Mutex<ConversationSet>) -> MutexGuard<'_, ConversationSet> {
    // The set is only ever replaced wholesale, so a poisoned lock still guards
    // a consistent value.
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: Mutex<ConversationSet>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with existing conversations.
    pub fn with_conversations(conversations: ConversationSet) -> Self {
        Self {
            conversations: Mutex::new(conversations),
        }
    }
}

impl ConversationStore for MemoryStore {
    fn history(&self, persona: &PersonaId) -> Result<Vec<Message>> {
        Ok(lock(&self.conversations)
            .get(persona)
            .cloned()
            .unwrap_or_default())
    }

    fn append(&self, persona: &PersonaId, message: Message) -> Result<()> {
        lock(&self.conversations)
            .entry(persona.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    fn clear(&self, persona: &PersonaId) -> Result<()> {
        if let Some(history) = lock(&self.conversations).get_mut(persona) {
            history.clear();
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        lock(&self.conversations).clear();
        Ok(())
    }

    fn personas(&self) -> Result<Vec<PersonaId>> {
        Ok(lock(&self.conversations).keys().cloned().collect())
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    conversations: ConversationSet,
}

/// A store persisted as a single JSON document.
///
/// Each mutation builds the new set, writes it to a temporary sibling file,
/// syncs it and renames it over the target. Only then is the in-memory copy
/// replaced, so a failed write leaves the store at its last persisted state.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    conversations: Mutex<ConversationSet>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// A missing or empty file is an empty store. A file that cannot be read or
    /// parsed is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conversations = Self::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            personas = conversations.len(),
            "opened conversation store"
        );
        Ok(Self {
            path,
            conversations: Mutex::new(conversations),
        })
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<ConversationSet> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ConversationSet::new()),
            Err(e) => {
                return Err(Error::io(
                    format!("failed to read {}: {}", path.display(), e),
                    e,
                ));
            }
        };
        if content.trim().is_empty() {
            return Ok(ConversationSet::new());
        }

        let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
            Error::serialization(
                format!("corrupt conversation store {}: {}", path.display(), e),
                Some(Box::new(e)),
            )
        })?;
        if file.version != STORE_VERSION {
            return Err(Error::serialization(
                format!(
                    "unsupported conversation store version {} in {}",
                    file.version,
                    path.display()
                ),
                None,
            ));
        }
        Ok(file.conversations)
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "conversations".to_string());
        self.path.with_file_name(format!(".{file_name}.tmp"))
    }

    fn persist(&self, conversations: &ConversationSet) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = StoreFile {
            version: STORE_VERSION,
            conversations: conversations.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let tmp_path = self.temp_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(&json)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)
    }

    /// Apply `mutate` to a copy of the set, persist it, then publish it.
    fn update(&self, mutate: impl FnOnce(&mut ConversationSet)) -> Result<()> {
        let mut guard = lock(&self.conversations);
        let mut next = guard.clone();
        mutate(&mut next);

        STORE_WRITES.click();
        if let Err(e) = self.persist(&next) {
            STORE_WRITE_ERRORS.click();
            let _ = fs::remove_file(self.temp_path());
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "conversation store write failed"
            );
            return Err(Error::store_write(
                format!("failed to write {}: {}", self.path.display(), e),
                Some(Box::new(e)),
            ));
        }
        *guard = next;
        Ok(())
    }
}

impl ConversationStore for FileStore {
    fn history(&self, persona: &PersonaId) -> Result<Vec<Message>> {
        Ok(lock(&self.conversations)
            .get(persona)
            .cloned()
            .unwrap_or_default())
    }

    fn append(&self, persona: &PersonaId, message: Message) -> Result<()> {
        self.update(|set| set.entry(persona.clone()).or_default().push(message))
    }

    fn clear(&self, persona: &PersonaId) -> Result<()> {
        self.update(|set| {
            if let Some(history) = set.get_mut(persona) {
                history.clear();
            }
        })
    }

    fn clear_all(&self) -> Result<()> {
        self.update(|set| set.clear())
    }

    fn personas(&self) -> Result<Vec<PersonaId>> {
        Ok(lock(&self.conversations).keys().cloned().collect())
    }
}
