use std::sync::Arc;

use snafu::{ResultExt, Snafu, ensure};

use prakhar_llm::{AspectRatio, GenerationClient, ImageRequest, InlineImageData};
use prakhar_storage::{
    GeneratedImageKind, GeneratedImageRecord, ImageId, InlineImageRecord, StorageError,
    now_unix_ms,
};

use crate::gallery::GalleryStore;

/// Prompt used when composition produces an empty string.
pub const FALLBACK_STUDIO_PROMPT: &str = "Prakhar AI Creative Masterpiece";

/// Curated style fragments appended to the user's prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StylePreset {
    pub name: &'static str,
    pub prompt: &'static str,
}

pub const STYLE_PRESETS: [StylePreset; 4] = [
    StylePreset {
        name: "Architectural",
        prompt: "clean white geometric architecture, luxury aesthetic, sharp lines, blue ambient lighting",
    },
    StylePreset {
        name: "Futurism",
        prompt: "cyberpunk vibrant red and yellow neons, futuristic city, highly detailed digital art",
    },
    StylePreset {
        name: "Minimalist",
        prompt: "single object, pure white background, dramatic red shadow, minimalist professional photography",
    },
    StylePreset {
        name: "Abstract",
        prompt: "abstract flow of blue, red and yellow energy, smooth gradients, 8k wallpaper",
    },
];

pub fn preset_by_name(name: &str) -> Option<&'static StylePreset> {
    STYLE_PRESETS.iter().find(|preset| preset.name == name)
}

#[derive(Debug, Snafu)]
pub enum StudioError {
    #[snafu(display("Provide a vision or select a preset to begin."))]
    EmptyRequest { stage: &'static str },
    #[snafu(display("another generation is already running"))]
    Busy { stage: &'static str },
    #[snafu(display("image generation failed: {message}"))]
    GenerationFailed {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to persist the generated image"))]
    PersistFailed {
        stage: &'static str,
        source: StorageError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudioRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub reference: Option<InlineImageRecord>,
    pub preset: Option<String>,
}

impl StudioRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_reference(mut self, reference: InlineImageRecord) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }
}

/// Drives one image generation from prompt composition to gallery commit.
pub struct StudioController {
    client: Arc<dyn GenerationClient>,
    busy: bool,
}

impl StudioController {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self {
            client,
            busy: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub async fn generate(
        &mut self,
        gallery: &mut GalleryStore,
        request: StudioRequest,
    ) -> Result<GeneratedImageRecord, StudioError> {
        ensure!(
            !self.busy,
            BusySnafu {
                stage: "studio-generate-guard",
            }
        );

        let preset = request.preset.as_deref().and_then(preset_by_name);
        // Local validation: an empty request never reaches the remote client.
        ensure!(
            !request.prompt.trim().is_empty() || request.reference.is_some() || preset.is_some(),
            EmptyRequestSnafu {
                stage: "studio-generate-validate",
            }
        );

        self.busy = true;
        let result = self.run_generation(gallery, request, preset).await;
        // The busy flag clears on every path.
        self.busy = false;
        result
    }

    async fn run_generation(
        &self,
        gallery: &mut GalleryStore,
        request: StudioRequest,
        preset: Option<&'static StylePreset>,
    ) -> Result<GeneratedImageRecord, StudioError> {
        let mut prompt = request.prompt.trim().to_string();
        if let Some(preset) = preset {
            prompt = format!("{prompt} {}", preset.prompt).trim().to_string();
        }
        if prompt.is_empty() {
            prompt = FALLBACK_STUDIO_PROMPT.to_string();
        }

        let kind = if request.reference.is_some() {
            GeneratedImageKind::Edit
        } else {
            GeneratedImageKind::Generation
        };

        let image_request = ImageRequest {
            prompt: prompt.clone(),
            aspect_ratio: request.aspect_ratio,
            reference: request.reference.map(|reference| InlineImageData {
                data: reference.data,
                mime_type: reference.mime_type,
            }),
        };

        let url = self
            .client
            .generate_image(image_request)
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "image generation failed");
                GenerationFailedSnafu {
                    stage: "studio-generate-request",
                    message: error.to_string(),
                }
                .build()
            })?;

        let record = GeneratedImageRecord {
            id: ImageId::new_v7(),
            url,
            prompt,
            timestamp: now_unix_ms(),
            kind,
        };

        gallery
            .add(record.clone())
            .await
            .context(PersistFailedSnafu {
                stage: "studio-generate-persist",
            })?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use prakhar_storage::{MemoryKvStore, PersistenceAdapter};

    use crate::testing::FakeGenerationClient;

    use super::*;

    async fn gallery() -> GalleryStore {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryKvStore::new()));
        GalleryStore::load(adapter).await.expect("load")
    }

    fn reference() -> InlineImageRecord {
        InlineImageRecord {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_requests_are_rejected_without_a_remote_call() {
        let client = Arc::new(FakeGenerationClient::new());
        let mut studio = StudioController::new(client.clone() as Arc<dyn GenerationClient>);
        let mut gallery = gallery().await;

        let error = studio
            .generate(&mut gallery, StudioRequest::prompt("   "))
            .await
            .expect_err("empty request must be rejected");

        assert!(matches!(error, StudioError::EmptyRequest { .. }));
        assert_eq!(client.image_call_count(), 0);
        assert!(gallery.list().is_empty());
        assert!(!studio.is_busy());
    }

    #[tokio::test]
    async fn a_preset_alone_is_enough_and_shapes_the_prompt() {
        let client = Arc::new(FakeGenerationClient::new());
        let mut studio = StudioController::new(client.clone() as Arc<dyn GenerationClient>);
        let mut gallery = gallery().await;

        let record = studio
            .generate(
                &mut gallery,
                StudioRequest::default().with_preset("Minimalist"),
            )
            .await
            .expect("preset-only request must generate");

        assert!(record.prompt.contains("minimalist professional photography"));
        let requests = client.image_requests.lock().expect("lock");
        assert_eq!(requests[0].prompt, record.prompt);
    }

    #[tokio::test]
    async fn a_reference_image_marks_the_result_as_an_edit() {
        let client = Arc::new(FakeGenerationClient::new());
        let mut studio = StudioController::new(client.clone() as Arc<dyn GenerationClient>);
        let mut gallery = gallery().await;

        let record = studio
            .generate(
                &mut gallery,
                StudioRequest::prompt("make it snow").with_reference(reference()),
            )
            .await
            .expect("edit request must generate");

        assert_eq!(record.kind, GeneratedImageKind::Edit);
        assert_eq!(gallery.list().len(), 1);

        let requests = client.image_requests.lock().expect("lock");
        assert!(requests[0].reference.is_some());
    }

    #[tokio::test]
    async fn a_fresh_generation_is_marked_as_generation_and_prepended() {
        let client = Arc::new(FakeGenerationClient::new());
        let mut studio = StudioController::new(client.clone() as Arc<dyn GenerationClient>);
        let mut gallery = gallery().await;

        studio
            .generate(&mut gallery, StudioRequest::prompt("first"))
            .await
            .expect("generate");
        let second = studio
            .generate(&mut gallery, StudioRequest::prompt("second"))
            .await
            .expect("generate");

        assert_eq!(second.kind, GeneratedImageKind::Generation);
        assert_eq!(gallery.list()[0].prompt, "second");
    }

    #[tokio::test]
    async fn remote_failures_surface_a_scoped_error_and_clear_the_busy_flag() {
        let client = Arc::new(FakeGenerationClient::new());
        client.script_image(Err("no image was generated".to_string()));
        let mut studio = StudioController::new(client.clone() as Arc<dyn GenerationClient>);
        let mut gallery = gallery().await;

        let error = studio
            .generate(&mut gallery, StudioRequest::prompt("a red door"))
            .await
            .expect_err("remote failure must surface");

        assert!(matches!(error, StudioError::GenerationFailed { .. }));
        assert!(gallery.list().is_empty());
        assert!(!studio.is_busy());

        // The controller accepts the next request immediately.
        studio
            .generate(&mut gallery, StudioRequest::prompt("a blue door"))
            .await
            .expect("follow-up request must run");
    }
}
