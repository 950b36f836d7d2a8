use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::provider::{
    AudioDecodeSnafu, BlankMessageSnafu, BoxFuture, ChatStreamHandle, ChatStreamRequest,
    ClientResult, ClientWorker, DEFAULT_CHAT_MODEL, DEFAULT_IMAGE_MODEL, DEFAULT_TTS_MODEL,
    EmptyImagePromptSnafu, EmptyMessageSetSnafu, GenerationClient, HttpRequestSnafu,
    HttpStatusSnafu, ImageRequest, MessagePart, MissingApiKeySnafu, MissingAudioPayloadSnafu,
    MissingImagePayloadSnafu, PayloadParseSnafu, ProviderConfig, RequestMessage, SPEECH_CHANNELS,
    SPEECH_SAMPLE_RATE_HZ, SpeechAudio, SpeechRequest, StreamEventPayload, ToolInvocation,
    make_event_stream,
};

/// Instruction substituted when an edit request arrives without prompt text.
pub const DEFAULT_EDIT_INSTRUCTION: &str = "Edit this image based on the context.";

pub struct GeminiClient {
    config: ProviderConfig,
    http: reqwest::Client,
    chat_model: String,
    image_model: String,
    tts_model: String,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> ClientResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "gemini-client-new",
            }
        );

        Ok(Self {
            config,
            http: reqwest::Client::new(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
        })
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_tts_model(mut self, model: impl Into<String>) -> Self {
        self.tts_model = model.into();
        self
    }

    fn generate_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.endpoint, model, method)
    }

    async fn post_json(&self, url: &str, payload: Value, stage: &'static str) -> ClientResult<Value> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .context(HttpRequestSnafu { stage })?;

        let status = response.status();
        let body = response.text().await.context(HttpRequestSnafu { stage })?;

        if !status.is_success() {
            return HttpStatusSnafu {
                stage,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        serde_json::from_str(&body).map_err(|error| {
            PayloadParseSnafu {
                stage,
                details: error.to_string(),
            }
            .build()
        })
    }

    async fn run_stream_worker(
        http: reqwest::Client,
        url: String,
        api_key: String,
        payload: Value,
        event_tx: mpsc::UnboundedSender<StreamEventPayload>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let response = match http
            .post(&url)
            .header("x-goog-api-key", &api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => {
                tracing::error!(error = %source, "failed to open chat stream");
                emit_error(&event_tx, format!("failed to open chat stream: {source}"));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "chat stream rejected");
            emit_error(
                &event_tx,
                format!("provider returned status {}: {body}", status.as_u16()),
            );
            return;
        }

        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    tracing::debug!("chat stream cancelled");
                    break;
                }
                next_chunk = body.next() => {
                    match next_chunk {
                        Some(Ok(bytes)) => {
                            buffer.push_str(&String::from_utf8_lossy(&bytes));
                            while let Some(line) = drain_line(&mut buffer) {
                                if forward_sse_line(&event_tx, &line).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(error = %source, "chat stream emitted an error chunk");
                            emit_error(&event_tx, format!("stream interrupted: {source}"));
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            // The provider may end the body without a trailing newline.
            let tail = std::mem::take(&mut buffer);
            let _ = forward_sse_line(&event_tx, &tail);
            let _ = event_tx.send(StreamEventPayload::Done);
        }
    }
}

impl GenerationClient for GeminiClient {
    fn stream_chat(&self, request: ChatStreamRequest) -> ClientResult<ChatStreamHandle> {
        ensure!(
            !request.history.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
            }
        );

        for (index, message) in request.history.iter().enumerate() {
            ensure!(
                !message.is_blank(),
                BlankMessageSnafu {
                    stage: "stream-chat-validate",
                    index,
                }
            );
        }

        let payload = chat_payload(&request);
        let url = format!(
            "{}?alt=sse",
            self.generate_url(&self.chat_model, "streamGenerateContent")
        );

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: ClientWorker = Box::pin(Self::run_stream_worker(
            self.http.clone(),
            url,
            self.config.api_key.clone(),
            payload,
            event_tx,
            cancel_rx,
        ));

        Ok(ChatStreamHandle { stream, worker })
    }

    fn generate_image<'a>(&'a self, request: ImageRequest) -> BoxFuture<'a, ClientResult<String>> {
        Box::pin(async move {
            ensure!(
                !request.prompt.trim().is_empty() || request.reference.is_some(),
                EmptyImagePromptSnafu {
                    stage: "generate-image",
                }
            );

            let payload = image_payload(&request);
            let url = self.generate_url(&self.image_model, "generateContent");
            let response = self.post_json(&url, payload, "generate-image").await?;

            let data = extract_inline_data(&response).context(MissingImagePayloadSnafu {
                stage: "generate-image-parts",
            })?;

            Ok(format!("data:image/png;base64,{data}"))
        })
    }

    fn synthesize_speech<'a>(
        &'a self,
        request: SpeechRequest,
    ) -> BoxFuture<'a, ClientResult<SpeechAudio>> {
        Box::pin(async move {
            let payload = json!({
                "contents": [{ "parts": [{ "text": request.text }] }],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": request.voice }
                        }
                    }
                }
            });

            let url = self.generate_url(&self.tts_model, "generateContent");
            let response = self.post_json(&url, payload, "synthesize-speech").await?;

            let encoded = extract_inline_data(&response).context(MissingAudioPayloadSnafu {
                stage: "synthesize-speech-parts",
            })?;
            let pcm = BASE64.decode(encoded).context(AudioDecodeSnafu {
                stage: "synthesize-speech-decode",
            })?;

            Ok(SpeechAudio {
                sample_rate_hz: SPEECH_SAMPLE_RATE_HZ,
                channels: SPEECH_CHANNELS,
                pcm,
            })
        })
    }
}

fn chat_payload(request: &ChatStreamRequest) -> Value {
    let mut payload = json!({ "contents": request_contents(&request.history) });

    if let Some(instruction) = &request.system_instruction {
        payload["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })
            })
            .collect();
        payload["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    payload
}

fn request_contents(history: &[RequestMessage]) -> Vec<Value> {
    history
        .iter()
        .map(|message| {
            let parts: Vec<Value> = message
                .parts
                .iter()
                .map(|part| match part {
                    MessagePart::Text(text) => json!({ "text": text }),
                    MessagePart::InlineImage { data, mime_type } => json!({
                        "inlineData": { "data": data, "mimeType": mime_type }
                    }),
                })
                .collect();

            json!({ "role": message.role.as_wire(), "parts": parts })
        })
        .collect()
}

fn image_payload(request: &ImageRequest) -> Value {
    let mut parts = Vec::new();

    if let Some(reference) = &request.reference {
        parts.push(json!({
            "inlineData": { "data": reference.data, "mimeType": reference.mime_type }
        }));
        let instruction = if request.prompt.trim().is_empty() {
            DEFAULT_EDIT_INSTRUCTION
        } else {
            request.prompt.as_str()
        };
        parts.push(json!({ "text": instruction }));
    } else {
        parts.push(json!({ "text": request.prompt }));
    }

    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "imageConfig": { "aspectRatio": request.aspect_ratio.as_str() }
        }
    })
}

fn extract_inline_data(response: &Value) -> Option<&str> {
    response
        .pointer("/candidates/0/content/parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.pointer("/inlineData/data").and_then(Value::as_str))
}

fn drain_line(buffer: &mut String) -> Option<String> {
    let newline = buffer.find('\n')?;
    let rest = buffer.split_off(newline + 1);
    let line = std::mem::replace(buffer, rest);
    Some(line)
}

/// Parses one SSE line into zero or more stream events.
///
/// Chunks interleave text deltas and function-call batches in any order;
/// unparseable lines are skipped rather than failing the stream.
fn parse_sse_line(line: &str) -> Vec<StreamEventPayload> {
    let trimmed = line.trim();
    let Some(data) = trimmed.strip_prefix("data:") else {
        return Vec::new();
    };

    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(error = %error, "skipping unparseable stream chunk");
            return Vec::new();
        }
    };

    let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut text = String::new();
    let mut calls = Vec::new();

    for part in parts {
        if let Some(fragment) = part.get("text").and_then(Value::as_str) {
            text.push_str(fragment);
        }

        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = call.get("args").cloned().unwrap_or(Value::Null);
            calls.push(ToolInvocation { name, arguments });
        }
    }

    let mut events = Vec::new();
    if !text.is_empty() {
        events.push(StreamEventPayload::Delta(text));
    }
    if !calls.is_empty() {
        events.push(StreamEventPayload::ToolCalls(calls));
    }
    events
}

fn forward_sse_line(
    event_tx: &mpsc::UnboundedSender<StreamEventPayload>,
    line: &str,
) -> Result<(), ()> {
    for event in parse_sse_line(line) {
        if event_tx.send(event).is_err() {
            return Err(());
        }
    }
    Ok(())
}

fn emit_error(event_tx: &mpsc::UnboundedSender<StreamEventPayload>, message: String) {
    let _ = event_tx.send(StreamEventPayload::Error(message));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AspectRatio, ChatRole, InlineImageData};

    #[test]
    fn sse_text_chunk_becomes_a_delta() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#;
        let events = parse_sse_line(line);
        assert_eq!(events, vec![StreamEventPayload::Delta("Hel".to_string())]);
    }

    #[test]
    fn sse_function_call_becomes_a_tool_batch() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"functionCall":{"name":"set_timer","args":{"seconds":600,"label":"Workout"}}}]}}]}"#;
        let events = parse_sse_line(line);

        let StreamEventPayload::ToolCalls(calls) = &events[0] else {
            panic!("expected a tool-call batch, got {events:?}");
        };
        assert_eq!(calls[0].name, "set_timer");
        assert_eq!(calls[0].arguments["seconds"], 600);
        assert_eq!(calls[0].arguments["label"], "Workout");
    }

    #[test]
    fn sse_chunk_can_carry_text_and_calls_together() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"On it."},{"functionCall":{"name":"set_timer","args":{"seconds":60,"label":"Tea"}}}]}}]}"#;
        let events = parse_sse_line(line);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEventPayload::Delta("On it.".to_string()));
        assert!(matches!(&events[1], StreamEventPayload::ToolCalls(calls) if calls.len() == 1));
    }

    #[test]
    fn non_data_and_garbage_lines_are_skipped() {
        assert!(parse_sse_line(": keep-alive").is_empty());
        assert!(parse_sse_line("").is_empty());
        assert!(parse_sse_line("data: not-json").is_empty());
        assert!(parse_sse_line("data: [DONE]").is_empty());
    }

    #[test]
    fn drain_line_splits_on_newlines_only() {
        let mut buffer = "data: a\ndata: b".to_string();
        assert_eq!(drain_line(&mut buffer), Some("data: a\n".to_string()));
        assert_eq!(drain_line(&mut buffer), None);
        assert_eq!(buffer, "data: b");
    }

    #[test]
    fn chat_payload_inlines_images_and_tools() {
        let request = ChatStreamRequest::new(vec![RequestMessage::new(
            ChatRole::User,
            vec![
                MessagePart::InlineImage {
                    data: "aGk=".to_string(),
                    mime_type: "image/jpeg".to_string(),
                },
                MessagePart::text("Describe this image"),
            ],
        )])
        .with_system_instruction("You are Prakhar AI.")
        .with_tools(vec![crate::provider::ToolDeclaration {
            name: "set_timer".to_string(),
            description: "Start a countdown".to_string(),
            parameters: json!({ "type": "object" }),
        }]);

        let payload = chat_payload(&request);

        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(
            payload["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(
            payload["contents"][0]["parts"][1]["text"],
            "Describe this image"
        );
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "You are Prakhar AI."
        );
        assert_eq!(
            payload["tools"][0]["functionDeclarations"][0]["name"],
            "set_timer"
        );
    }

    #[test]
    fn image_payload_substitutes_the_default_edit_instruction() {
        let request = ImageRequest {
            prompt: "   ".to_string(),
            aspect_ratio: AspectRatio::Wide,
            reference: Some(InlineImageData {
                data: "aGk=".to_string(),
                mime_type: "image/png".to_string(),
            }),
        };

        let payload = image_payload(&request);

        assert_eq!(payload["contents"][0]["parts"][1]["text"], DEFAULT_EDIT_INSTRUCTION);
        assert_eq!(
            payload["generationConfig"]["imageConfig"]["aspectRatio"],
            "16:9"
        );
    }

    #[test]
    fn inline_data_is_found_anywhere_in_the_parts() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "data": "cGF5bG9hZA==", "mimeType": "image/png" } }
                    ]
                }
            }]
        });

        assert_eq!(extract_inline_data(&response), Some("cGF5bG9hZA=="));
        assert_eq!(extract_inline_data(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn stream_chat_rejects_blank_history() {
        let client = GeminiClient::new(ProviderConfig::new("test-key", "https://example.test"))
            .expect("client must build");

        let empty = client.stream_chat(ChatStreamRequest::new(Vec::new()));
        assert!(matches!(
            empty,
            Err(crate::provider::ClientError::EmptyMessageSet { .. })
        ));

        let blank = client.stream_chat(ChatStreamRequest::new(vec![RequestMessage::text(
            ChatRole::User,
            "   ",
        )]));
        assert!(matches!(
            blank,
            Err(crate::provider::ClientError::BlankMessage { index: 0, .. })
        ));
    }
}
