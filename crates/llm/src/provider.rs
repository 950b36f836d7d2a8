use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_TTS_VOICE: &str = "Kore";

/// Synthesized speech is always delivered at this fixed rate, mono.
pub const SPEECH_SAMPLE_RATE_HZ: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub endpoint: String,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().trim_end_matches('/').to_string(),
        }
    }
}

/// Chat speaker role on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// Base64 payload attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImageData {
    pub data: String,
    pub mime_type: String,
}

impl InlineImageData {
    /// Encodes a user-supplied image file for attachment. Images are the only
    /// accepted file kind; callers pass the file's mime type through.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        use base64::Engine as _;

        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }
}

/// Closed set of message part shapes accepted by the chat capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    InlineImage { data: String, mime_type: String },
}

impl MessagePart {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn inline_image(image: InlineImageData) -> Self {
        Self::InlineImage {
            data: image.data,
            mime_type: image.mime_type,
        }
    }

    fn carries_content(&self) -> bool {
        match self {
            Self::Text(text) => !text.trim().is_empty(),
            Self::InlineImage { data, .. } => !data.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub role: ChatRole,
    pub parts: Vec<MessagePart>,
}

impl RequestMessage {
    pub fn new(role: ChatRole, parts: Vec<MessagePart>) -> Self {
        Self { role, parts }
    }

    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self::new(role, vec![MessagePart::text(content)])
    }

    /// A message with neither usable text nor an image payload must never be sent.
    pub fn is_blank(&self) -> bool {
        !self.parts.iter().any(MessagePart::carries_content)
    }
}

/// Closed enumeration of supported output proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
    Tall,
    Wide,
}

impl AspectRatio {
    pub const ALL: [Self; 5] = [
        Self::Square,
        Self::Portrait,
        Self::Landscape,
        Self::Tall,
        Self::Wide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "3:4",
            Self::Landscape => "4:3",
            Self::Tall => "9:16",
            Self::Wide => "16:9",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == raw.trim())
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Function made callable by the model during a chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One function invocation the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatStreamRequest {
    pub history: Vec<RequestMessage>,
    pub system_instruction: Option<String>,
    pub tools: Vec<ToolDeclaration>,
}

impl ChatStreamRequest {
    pub fn new(history: Vec<RequestMessage>) -> Self {
        Self {
            history,
            system_instruction: None,
            tools: Vec::new(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub reference: Option<InlineImageData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: DEFAULT_TTS_VOICE.to_string(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

/// Raw decoded audio for the playback boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub pcm: Vec<u8>,
}

/// Incremental event from one chat stream. `Done` is only emitted after a
/// clean end of stream; an `Error` event is terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventPayload {
    Delta(String),
    ToolCalls(Vec<ToolInvocation>),
    Error(String),
    Done,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ClientWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("missing API key for generation client"))]
    MissingApiKey { stage: &'static str },
    #[snafu(display("chat stream request has no messages"))]
    EmptyMessageSet { stage: &'static str },
    #[snafu(display("chat message at index {index} carries neither text nor image"))]
    BlankMessage { stage: &'static str, index: usize },
    #[snafu(display("image request needs a prompt or a reference image"))]
    EmptyImagePrompt { stage: &'static str },
    #[snafu(display("http request failed on `{stage}`: {source}"))]
    HttpRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("provider returned status {status} on `{stage}`: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to parse provider payload on `{stage}`: {details}"))]
    PayloadParse {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("provider response carried no image payload"))]
    MissingImagePayload { stage: &'static str },
    #[snafu(display("provider response carried no audio payload"))]
    MissingAudioPayload { stage: &'static str },
    #[snafu(display("failed to decode audio payload on `{stage}`"))]
    AudioDecode {
        stage: &'static str,
        source: base64::DecodeError,
    },
}

pub struct ChatEventStream {
    events: mpsc::UnboundedReceiver<StreamEventPayload>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Lazy, single-pass chat stream plus the worker future that feeds it.
/// The worker must be spawned; the stream is consumed with `recv`.
pub struct ChatStreamHandle {
    pub stream: ChatEventStream,
    pub worker: ClientWorker,
}

impl ChatEventStream {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<StreamEventPayload>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<StreamEventPayload> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEventPayload> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ChatEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Remote generation capabilities, dependency-injected into the orchestration
/// layer. Constructed once at startup and held for the app's lifetime.
pub trait GenerationClient: Send + Sync {
    fn stream_chat(&self, request: ChatStreamRequest) -> ClientResult<ChatStreamHandle>;
    fn generate_image<'a>(&'a self, request: ImageRequest) -> BoxFuture<'a, ClientResult<String>>;
    fn synthesize_speech<'a>(
        &'a self,
        request: SpeechRequest,
    ) -> BoxFuture<'a, ClientResult<SpeechAudio>>;
}

/// Builds the channel trio backing one chat stream. Public so alternative
/// client implementations (and scripted test doubles) can assemble a
/// `ChatStreamHandle` without reaching into channel internals.
pub fn make_event_stream() -> (
    mpsc::UnboundedSender<StreamEventPayload>,
    ChatEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (event_tx, ChatEventStream::new(event_rx, cancel_tx), cancel_rx)
}
