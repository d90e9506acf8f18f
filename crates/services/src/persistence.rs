//! Persistence codec for the conversation store.
//!
//! The whole store is written as one compact JSON document:
//!
//! ```json
//! {"version":2,"users":{"ana":{"General":{"New conversation":[{"user":"hi","bot":"hello"}]}}}}
//! ```
//!
//! Encoding depends on the store alone: the same store always yields the
//! same bytes. When a file was saved is read from the file itself
//! ([`FileBlobStore::last_saved`]).
//!
//! Older documents had no envelope and mapped each folder straight to a list
//! of exchanges. [`decode`] migrates them once, on load.

use crate::conversation_store::{ConversationStore, Folder, UserHistory};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::conversation::{Exchange, DEFAULT_CONVERSATION};
use shared::{ChatError, ChatResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FORMAT_VERSION: u32 = 2;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    users: &'a IndexMap<String, UserHistory>,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    users: IndexMap<String, UserHistory>,
}

/// A folder as written before conversations existed (flat list), or the
/// nested form without the versioned envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyFolder {
    Flat(Vec<Exchange>),
    Nested(IndexMap<String, Vec<Exchange>>),
}

type LegacyDocument = IndexMap<String, IndexMap<String, LegacyFolder>>;

pub fn encode(store: &ConversationStore) -> ChatResult<String> {
    let envelope = EnvelopeRef {
        version: FORMAT_VERSION,
        users: &store.users,
    };
    serde_json::to_string(&envelope).map_err(|e| ChatError::Storage(e.to_string()))
}

pub fn decode(blob: &str) -> ChatResult<ConversationStore> {
    let mut store = match serde_json::from_str::<Envelope>(blob) {
        Ok(envelope) => {
            if envelope.version > FORMAT_VERSION {
                return Err(ChatError::CorruptData(format!(
                    "unsupported format version {}",
                    envelope.version
                )));
            }
            ConversationStore {
                users: envelope.users,
            }
        }
        Err(envelope_err) => match serde_json::from_str::<LegacyDocument>(blob) {
            Ok(legacy) => {
                tracing::info!(users = legacy.len(), "migrating legacy conversation document");
                migrate_legacy(legacy)
            }
            Err(_) => return Err(ChatError::CorruptData(envelope_err.to_string())),
        },
    };
    store.normalize();
    Ok(store)
}

/// Decode, falling back to an empty store when the blob cannot be read
pub fn decode_or_empty(blob: &str) -> ConversationStore {
    match decode(blob) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("discarding stored conversations: {}", e);
            ConversationStore::new()
        }
    }
}

fn migrate_legacy(legacy: LegacyDocument) -> ConversationStore {
    let users = legacy
        .into_iter()
        .map(|(username, folders)| {
            let folders = folders
                .into_iter()
                .map(|(name, folder)| {
                    let conversations = match folder {
                        LegacyFolder::Flat(exchanges) => {
                            let mut map = IndexMap::new();
                            map.insert(DEFAULT_CONVERSATION.to_string(), exchanges);
                            map
                        }
                        LegacyFolder::Nested(map) => map,
                    };
                    (name, Folder { conversations })
                })
                .collect();
            (username, UserHistory { folders })
        })
        .collect();
    ConversationStore { users }
}

/// Where the encoded store lives between runs
pub trait BlobStore: Send + Sync {
    fn load(&self) -> ChatResult<Option<String>>;
    fn save(&self, blob: &str) -> ChatResult<()>;
}

/// Process-local blob, the equivalent of keeping the store in session state
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(blob.into()))),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.blob.lock().clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self) -> ChatResult<Option<String>> {
        Ok(self.blob.lock().clone())
    }

    fn save(&self, blob: &str) -> ChatResult<()> {
        *self.blob.lock() = Some(blob.to_string());
        Ok(())
    }
}

/// Single JSON file, replaced atomically on every save
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Thinkchat", "Thinkchat")
            .map(|p| p.data_dir().join("conversations.json"))
            .unwrap_or_else(|| PathBuf::from("./conversations.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the saved file, `None` if nothing was saved yet
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self) -> ChatResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChatError::Storage(format!(
                "reading {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, blob: &str) -> ChatResult<()> {
        let io_err = |e: std::io::Error| {
            ChatError::Storage(format!("writing {}: {}", self.path.display(), e))
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        // Write a sibling file first so a crash never leaves half a document
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, blob).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

/// Load the store, starting empty if nothing usable was saved
pub fn load_store(blobs: &dyn BlobStore) -> ConversationStore {
    match blobs.load() {
        Ok(Some(blob)) => decode_or_empty(&blob),
        Ok(None) => ConversationStore::new(),
        Err(e) => {
            tracing::warn!("could not load conversations: {}", e);
            ConversationStore::new()
        }
    }
}

pub fn save_store(blobs: &dyn BlobStore, store: &ConversationStore) -> ChatResult<()> {
    let blob = encode(store)?;
    blobs.save(&blob)
}
