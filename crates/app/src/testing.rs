//! Scripted generation client shared by the orchestration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use prakhar_llm::{
    BoxFuture, ChatStreamHandle, ChatStreamRequest, ClientError, ClientResult, ClientWorker,
    GenerationClient, ImageRequest, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE_HZ, SpeechAudio,
    SpeechRequest, StreamEventPayload, make_event_stream,
};

pub(crate) enum ChatScript {
    Events(Vec<StreamEventPayload>),
    OpenError(String),
}

/// Plays back pre-scripted responses and records every request it saw.
/// When a script queue runs dry the client answers with a benign default.
#[derive(Default)]
pub(crate) struct FakeGenerationClient {
    chat_scripts: Mutex<VecDeque<ChatScript>>,
    image_results: Mutex<VecDeque<Result<String, String>>>,
    speech_results: Mutex<VecDeque<Result<SpeechAudio, String>>>,
    pub chat_requests: Mutex<Vec<ChatStreamRequest>>,
    pub image_requests: Mutex<Vec<ImageRequest>>,
    pub speech_requests: Mutex<Vec<SpeechRequest>>,
}

impl FakeGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_chat(&self, events: Vec<StreamEventPayload>) {
        self.chat_scripts
            .lock()
            .expect("lock")
            .push_back(ChatScript::Events(events));
    }

    pub fn script_chat_open_error(&self, message: &str) {
        self.chat_scripts
            .lock()
            .expect("lock")
            .push_back(ChatScript::OpenError(message.to_string()));
    }

    pub fn script_image(&self, result: Result<String, String>) {
        self.image_results.lock().expect("lock").push_back(result);
    }

    pub fn script_speech(&self, result: Result<SpeechAudio, String>) {
        self.speech_results.lock().expect("lock").push_back(result);
    }

    pub fn chat_call_count(&self) -> usize {
        self.chat_requests.lock().expect("lock").len()
    }

    pub fn image_call_count(&self) -> usize {
        self.image_requests.lock().expect("lock").len()
    }

    pub fn speech_call_count(&self) -> usize {
        self.speech_requests.lock().expect("lock").len()
    }

    fn remote_error(message: String) -> ClientError {
        ClientError::HttpStatus {
            stage: "fake-client",
            status: 500,
            body: message,
        }
    }
}

impl GenerationClient for FakeGenerationClient {
    fn stream_chat(&self, request: ChatStreamRequest) -> ClientResult<ChatStreamHandle> {
        self.chat_requests.lock().expect("lock").push(request);

        let script = self
            .chat_scripts
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(ChatScript::Events(vec![StreamEventPayload::Done]));

        match script {
            ChatScript::OpenError(message) => Err(Self::remote_error(message)),
            ChatScript::Events(events) => {
                let (event_tx, stream, cancel_rx) = make_event_stream();
                let worker: ClientWorker = Box::pin(async move {
                    let _hold_cancel = cancel_rx;
                    for event in events {
                        if event_tx.send(event).is_err() {
                            return;
                        }
                    }
                });
                Ok(ChatStreamHandle { stream, worker })
            }
        }
    }

    fn generate_image<'a>(&'a self, request: ImageRequest) -> BoxFuture<'a, ClientResult<String>> {
        Box::pin(async move {
            self.image_requests.lock().expect("lock").push(request);
            let next = self
                .image_results
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Ok("data:image/png;base64,ZmFrZQ==".to_string()));
            next.map_err(Self::remote_error)
        })
    }

    fn synthesize_speech<'a>(
        &'a self,
        request: SpeechRequest,
    ) -> BoxFuture<'a, ClientResult<SpeechAudio>> {
        Box::pin(async move {
            self.speech_requests.lock().expect("lock").push(request);
            let next = self
                .speech_results
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Ok(SpeechAudio {
                    sample_rate_hz: SPEECH_SAMPLE_RATE_HZ,
                    channels: SPEECH_CHANNELS,
                    pcm: vec![0; 4],
                }));
            next.map_err(Self::remote_error)
        })
    }
}
