mod gemini;
mod provider;

pub use gemini::{DEFAULT_EDIT_INSTRUCTION, GeminiClient};
pub use provider::{
    AspectRatio, BoxFuture, ChatEventStream, ChatRole, ChatStreamHandle, ChatStreamRequest,
    ClientError, ClientResult, ClientWorker, DEFAULT_CHAT_MODEL, DEFAULT_ENDPOINT,
    DEFAULT_IMAGE_MODEL, DEFAULT_TTS_MODEL, DEFAULT_TTS_VOICE, GenerationClient, ImageRequest,
    InlineImageData, MessagePart, ProviderConfig, RequestMessage, SPEECH_CHANNELS,
    SPEECH_SAMPLE_RATE_HZ, SpeechAudio, SpeechRequest, StreamEventPayload, ToolDeclaration,
    ToolInvocation, make_event_stream,
};
