use std::sync::Arc;

use prakhar_llm::{DEFAULT_TTS_VOICE, GenerationClient, SpeechAudio, SpeechRequest};
use prakhar_storage::MessageId;

/// Prefix applied to every read-aloud request.
pub const READ_ALOUD_PREFIX: &str = "Read this clearly: ";

/// Tracks which assistant message is being read aloud and fetches its audio.
///
/// Failures here are deliberately quiet: the speaking indicator resets and a
/// log line is emitted, but no user-facing error appears.
pub struct SpeechController {
    client: Arc<dyn GenerationClient>,
    voice: String,
    playing: Option<MessageId>,
}

impl SpeechController {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self {
            client,
            voice: DEFAULT_TTS_VOICE.to_string(),
            playing: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn playing(&self) -> Option<MessageId> {
        self.playing
    }

    /// Synthesizes audio for one message. Returns `None` when the same message
    /// is already playing or when synthesis fails.
    pub async fn speak_message(&mut self, message_id: MessageId, text: &str) -> Option<SpeechAudio> {
        if self.playing == Some(message_id) {
            return None;
        }
        self.playing = Some(message_id);

        let request = SpeechRequest::new(format!("{READ_ALOUD_PREFIX}{text}"))
            .with_voice(self.voice.clone());

        match self.client.synthesize_speech(request).await {
            Ok(audio) => Some(audio),
            Err(error) => {
                tracing::warn!(message_id = %message_id, error = %error, "speech synthesis failed");
                self.playing = None;
                None
            }
        }
    }

    /// Called by the playback boundary when audio for a message finishes.
    pub fn finish_playback(&mut self, message_id: MessageId) {
        if self.playing == Some(message_id) {
            self.playing = None;
        }
    }
}
