pub mod adapter;
pub mod error;
pub mod ids;
pub mod kv;
pub mod types;

pub use adapter::{
    CHATS_COLLECTION_KEY, IMAGES_COLLECTION_KEY, PersistenceAdapter, USER_COLLECTION_KEY,
};
pub use error::{StorageError, StorageResult};
pub use ids::{ImageId, MessageId, SessionId, TimerId};
pub use kv::{BoxFuture, KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use types::{
    ChatMessageRecord, ChatSessionRecord, DEFAULT_SESSION_TITLE, GeneratedImageKind,
    GeneratedImageRecord, InlineImageRecord, MessageRole, UserProfileRecord, now_unix_ms,
};
