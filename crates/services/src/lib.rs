pub mod conversation_store;
pub mod persistence;

pub use conversation_store::{ConversationStore, Folder, UserHistory};
pub use persistence::{BlobStore, FileBlobStore, MemoryBlobStore};
