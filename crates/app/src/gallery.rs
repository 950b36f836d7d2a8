use prakhar_storage::{GeneratedImageRecord, ImageId, PersistenceAdapter, StorageResult};

/// Owns every generated image, independent of chat. Most recent first.
pub struct GalleryStore {
    adapter: PersistenceAdapter,
    images: Vec<GeneratedImageRecord>,
}

impl GalleryStore {
    pub async fn load(adapter: PersistenceAdapter) -> StorageResult<Self> {
        let images = adapter.load_images().await?;
        Ok(Self { adapter, images })
    }

    pub fn list(&self) -> &[GeneratedImageRecord] {
        &self.images
    }

    pub async fn add(&mut self, image: GeneratedImageRecord) -> StorageResult<()> {
        self.images.insert(0, image);
        self.persist().await
    }

    pub async fn remove(&mut self, id: ImageId) -> StorageResult<()> {
        self.images.retain(|image| image.id != id);
        self.persist().await
    }

    async fn persist(&self) -> StorageResult<()> {
        self.adapter.save_images(&self.images).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use prakhar_storage::{GeneratedImageKind, MemoryKvStore, now_unix_ms};

    use super::*;

    fn image(prompt: &str) -> GeneratedImageRecord {
        GeneratedImageRecord {
            id: ImageId::new_v7(),
            url: "data:image/png;base64,aGk=".to_string(),
            prompt: prompt.to_string(),
            timestamp: now_unix_ms(),
            kind: GeneratedImageKind::Generation,
        }
    }

    #[tokio::test]
    async fn images_are_listed_most_recent_first() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryKvStore::new()));
        let mut gallery = GalleryStore::load(adapter).await.expect("load");

        gallery.add(image("first")).await.expect("add");
        gallery.add(image("second")).await.expect("add");

        let prompts: Vec<&str> = gallery
            .list()
            .iter()
            .map(|image| image.prompt.as_str())
            .collect();
        assert_eq!(prompts, ["second", "first"]);
    }

    #[tokio::test]
    async fn remove_filters_by_id_and_persists() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryKvStore::new()));
        let mut gallery = GalleryStore::load(adapter.clone()).await.expect("load");

        let keep = image("keep");
        let drop = image("drop");
        let drop_id = drop.id;
        gallery.add(keep).await.expect("add");
        gallery.add(drop).await.expect("add");

        gallery.remove(drop_id).await.expect("remove");

        let reloaded = GalleryStore::load(adapter).await.expect("reload");
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.list()[0].prompt, "keep");
    }
}
