use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use super::error::{SerializeCollectionSnafu, StorageResult};
use super::kv::KeyValueStore;
use super::types::{ChatSessionRecord, GeneratedImageRecord, UserProfileRecord};

/// Collection keys carried over from the web client's localStorage schema,
/// so an exported snapshot stays readable across both implementations.
pub const IMAGES_COLLECTION_KEY: &str = "prakhar_ai_images";
pub const CHATS_COLLECTION_KEY: &str = "prakhar_ai_chats";
pub const USER_COLLECTION_KEY: &str = "prakhar_ai_user";

/// Serializes whole-collection snapshots into the key-value store.
///
/// The adapter never owns data: callers hand it snapshots on every mutation
/// and reload once at startup. Corrupt snapshots are discarded, not surfaced.
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load_sessions(&self) -> StorageResult<Vec<ChatSessionRecord>> {
        self.load_collection(CHATS_COLLECTION_KEY).await
    }

    pub async fn save_sessions(&self, sessions: &[ChatSessionRecord]) -> StorageResult<()> {
        self.save_collection(CHATS_COLLECTION_KEY, sessions).await
    }

    pub async fn load_images(&self) -> StorageResult<Vec<GeneratedImageRecord>> {
        self.load_collection(IMAGES_COLLECTION_KEY).await
    }

    pub async fn save_images(&self, images: &[GeneratedImageRecord]) -> StorageResult<()> {
        self.save_collection(IMAGES_COLLECTION_KEY, images).await
    }

    pub async fn load_user(&self) -> StorageResult<Option<UserProfileRecord>> {
        let Some(raw) = self.store.get(USER_COLLECTION_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(error) => {
                tracing::warn!(
                    collection = USER_COLLECTION_KEY,
                    error = %error,
                    "discarding corrupt user snapshot"
                );
                Ok(None)
            }
        }
    }

    pub async fn save_user(&self, user: &UserProfileRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(user).context(SerializeCollectionSnafu {
            stage: "save-user",
            collection: USER_COLLECTION_KEY,
        })?;
        self.store.put(USER_COLLECTION_KEY, payload).await
    }

    async fn load_collection<T>(&self, key: &'static str) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(error) => {
                // Corruption recovery: start from empty rather than fail the app.
                tracing::warn!(
                    collection = key,
                    error = %error,
                    "discarding corrupt snapshot, starting from an empty collection"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn save_collection<T>(&self, key: &'static str, items: &[T]) -> StorageResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_string(items).context(SerializeCollectionSnafu {
            stage: "save-collection",
            collection: key,
        })?;
        self.store.put(key, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ImageId, MessageId, SessionId};
    use crate::kv::MemoryKvStore;
    use crate::types::{
        ChatMessageRecord, GeneratedImageKind, MessageRole, now_unix_ms,
    };

    fn adapter() -> PersistenceAdapter {
        PersistenceAdapter::new(Arc::new(MemoryKvStore::new()))
    }

    fn sample_session() -> ChatSessionRecord {
        ChatSessionRecord {
            id: SessionId::new_v7(),
            title: "Hello".to_string(),
            messages: vec![ChatMessageRecord {
                id: MessageId::new_v7(),
                role: MessageRole::User,
                text: "Hello".to_string(),
                timestamp: now_unix_ms(),
                image: None,
            }],
            timestamp: now_unix_ms(),
        }
    }

    #[tokio::test]
    async fn sessions_roundtrip_through_the_store() {
        let adapter = adapter();
        let sessions = vec![sample_session(), sample_session()];

        adapter
            .save_sessions(&sessions)
            .await
            .expect("save must succeed");
        let loaded = adapter.load_sessions().await.expect("load must succeed");

        assert_eq!(loaded, sessions);
    }

    #[tokio::test]
    async fn missing_collections_load_as_empty() {
        let adapter = adapter();

        assert!(adapter.load_sessions().await.expect("load").is_empty());
        assert!(adapter.load_images().await.expect("load").is_empty());
        assert!(adapter.load_user().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_falls_back_to_empty() {
        let store = Arc::new(MemoryKvStore::new());
        store
            .put(CHATS_COLLECTION_KEY, "{not valid json".to_string())
            .await
            .expect("seed must succeed");
        store
            .put(USER_COLLECTION_KEY, "[]".to_string())
            .await
            .expect("seed must succeed");

        let adapter = PersistenceAdapter::new(store);

        assert!(adapter.load_sessions().await.expect("load").is_empty());
        assert!(adapter.load_user().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn images_and_user_roundtrip() {
        let adapter = adapter();
        let images = vec![GeneratedImageRecord {
            id: ImageId::new_v7(),
            url: "data:image/png;base64,aGk=".to_string(),
            prompt: "a lighthouse at dusk".to_string(),
            timestamp: now_unix_ms(),
            kind: GeneratedImageKind::Generation,
        }];
        let user = UserProfileRecord {
            name: "Prakhar Sharma".to_string(),
        };

        adapter.save_images(&images).await.expect("save images");
        adapter.save_user(&user).await.expect("save user");

        assert_eq!(adapter.load_images().await.expect("load"), images);
        assert_eq!(adapter.load_user().await.expect("load"), Some(user));
    }
}
