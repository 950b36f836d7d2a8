use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use snafu::{Snafu, ensure};

use prakhar_llm::{
    ChatRole, ChatStreamRequest, GenerationClient, MessagePart, RequestMessage,
    StreamEventPayload, ToolDeclaration, ToolInvocation,
};
use prakhar_storage::{
    ChatMessageRecord, InlineImageRecord, MessageId, MessageRole, SessionId, StorageError,
};

use crate::session::SessionStore;
use crate::timer::TimerService;

use super::conversation::{Conversation, derive_title, model_placeholder, user_message};
use super::turn_state::TurnTransition;

pub const SET_TIMER_TOOL: &str = "set_timer";

/// Substituted when a message carries an image but no text, so the request
/// never contains an empty-text-and-no-image entry.
pub const DEFAULT_IMAGE_INSTRUCTION: &str = "Describe this image";

/// Inline assistant text shown when a turn fails before any text arrived.
pub const FALLBACK_ASSISTANT_TEXT: &str = "Something went wrong. Let's try that again.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub text: String,
    pub attachment: Option<InlineImageRecord>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: InlineImageRecord) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// What one completed turn produced. A `stream_error` is informational: the
/// turn still committed, with partial or fallback text in the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub assistant_message_id: MessageId,
    pub assistant_text: String,
    pub timers_started: usize,
    pub stream_error: Option<String>,
}

#[derive(Debug, Snafu)]
pub enum TurnError {
    #[snafu(display("a message needs text or an attached image"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("another turn is already in flight"))]
    TurnInFlight { stage: &'static str },
    #[snafu(display("failed to persist the committed session"))]
    CommitFailed {
        stage: &'static str,
        source: StorageError,
    },
}

#[derive(Debug, Deserialize)]
struct SetTimerArgs {
    seconds: f64,
    label: String,
}

struct StreamRun {
    assistant_text: String,
    timers_started: usize,
    stream_error: Option<String>,
}

/// Drives exactly one conversational turn per call.
///
/// The conversation working copy is exclusively owned for the duration of the
/// turn; the finalized message sequence is committed to the session store
/// whole, at turn end, on every path.
pub struct ChatOrchestrator {
    client: Arc<dyn GenerationClient>,
    timers: Arc<TimerService>,
    user_name: Option<String>,
}

impl ChatOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>, timers: Arc<TimerService>) -> Self {
        Self {
            client,
            timers,
            user_name: None,
        }
    }

    pub fn set_user_name(&mut self, name: Option<String>) {
        self.user_name = name.filter(|value| !value.trim().is_empty());
    }

    pub async fn send_turn(
        &self,
        conversation: &mut Conversation,
        sessions: &mut SessionStore,
        input: TurnInput,
    ) -> Result<TurnOutcome, TurnError> {
        ensure!(
            !input.text.trim().is_empty() || input.attachment.is_some(),
            EmptyInputSnafu {
                stage: "send-turn-validate",
            }
        );

        let turn_id = conversation.allocate_turn_id();
        conversation
            .apply_turn_transition(TurnTransition::Start(turn_id))
            .map_err(|_| {
                TurnInFlightSnafu {
                    stage: "send-turn-start",
                }
                .build()
            })?;

        // Session binding happens on the first send, never earlier.
        let session_id = match conversation.session_id {
            Some(id) => id,
            None => {
                let id = SessionId::new_v7();
                conversation.session_id = Some(id);
                id
            }
        };
        sessions.set_active(Some(session_id));

        // Optimistic append: the user message and the empty assistant
        // placeholder are visible before any network interaction. The
        // placeholder id stays stable for the whole turn.
        conversation
            .messages
            .push(user_message(input.text.clone(), input.attachment.clone()));
        let placeholder = model_placeholder();
        let placeholder_id = placeholder.id;
        conversation.messages.push(placeholder);

        let request = self.build_request(&conversation.messages);
        let run = self.run_stream(conversation, placeholder_id, request).await;

        // The turn reaches a terminal state before committing, so the
        // in-flight guard is cleared even when the commit itself fails.
        let transition = match &run.stream_error {
            None => TurnTransition::Complete(turn_id),
            Some(message) => TurnTransition::Fail {
                id: turn_id,
                message: message.clone(),
            },
        };
        let _ = conversation.apply_turn_transition(transition);

        let title = if sessions.contains(session_id) {
            None
        } else {
            Some(derive_title(
                conversation.first_user_text().unwrap_or_default(),
            ))
        };

        sessions
            .upsert(session_id, conversation.messages.clone(), title)
            .await
            .map_err(|source| TurnError::CommitFailed {
                stage: "send-turn-commit",
                source,
            })?;

        Ok(TurnOutcome {
            session_id,
            assistant_message_id: placeholder_id,
            assistant_text: run.assistant_text,
            timers_started: run.timers_started,
            stream_error: run.stream_error,
        })
    }

    async fn run_stream(
        &self,
        conversation: &mut Conversation,
        placeholder_id: MessageId,
        request: ChatStreamRequest,
    ) -> StreamRun {
        let handle = match self.client.stream_chat(request) {
            Ok(handle) => handle,
            Err(error) => {
                tracing::error!(error = %error, "failed to open chat stream");
                patch_message_text(&mut conversation.messages, placeholder_id, FALLBACK_ASSISTANT_TEXT);
                return StreamRun {
                    assistant_text: FALLBACK_ASSISTANT_TEXT.to_string(),
                    timers_started: 0,
                    stream_error: Some(error.to_string()),
                };
            }
        };

        let mut stream = handle.stream;
        let worker_task = tokio::spawn(handle.worker);

        let mut accumulated = String::new();
        let mut confirmations: Vec<String> = Vec::new();
        let mut timers_started = 0usize;
        // None until a terminal event arrives; a stream that just stops is an
        // interruption, not a completion.
        let mut terminal: Option<Option<String>> = None;

        while let Some(event) = stream.recv().await {
            match event {
                StreamEventPayload::Delta(chunk) => {
                    accumulated.push_str(&chunk);
                    // Patch-by-id with the whole accumulator: re-applying the
                    // same cumulative text is idempotent, never an append.
                    patch_message_text(
                        &mut conversation.messages,
                        placeholder_id,
                        &render_assistant_text(&accumulated, &confirmations),
                    );
                }
                StreamEventPayload::ToolCalls(calls) => {
                    for call in &calls {
                        if let Some(confirmation) = self.handle_tool_call(call).await {
                            confirmations.push(confirmation);
                            timers_started += 1;
                        }
                    }
                    patch_message_text(
                        &mut conversation.messages,
                        placeholder_id,
                        &render_assistant_text(&accumulated, &confirmations),
                    );
                }
                StreamEventPayload::Error(message) => {
                    terminal = Some(Some(message));
                    break;
                }
                StreamEventPayload::Done => {
                    terminal = Some(None);
                    break;
                }
            }
        }

        // Dropping the stream signals cancellation to a worker that is still
        // running (interrupted streams); a finished worker ignores it.
        drop(stream);
        let _ = worker_task.await;

        let stream_error = match terminal {
            Some(None) => None,
            Some(Some(message)) => Some(message),
            None => Some("stream ended before a terminal event".to_string()),
        };

        let assistant_text = if stream_error.is_some()
            && accumulated.is_empty()
            && confirmations.is_empty()
        {
            // Nothing arrived at all: show the fallback instead of an empty
            // bubble. Partial text, had any arrived, would be preserved.
            FALLBACK_ASSISTANT_TEXT.to_string()
        } else {
            render_assistant_text(&accumulated, &confirmations)
        };
        patch_message_text(&mut conversation.messages, placeholder_id, &assistant_text);

        StreamRun {
            assistant_text,
            timers_started,
            stream_error,
        }
    }

    async fn handle_tool_call(&self, call: &ToolInvocation) -> Option<String> {
        if call.name != SET_TIMER_TOOL {
            tracing::warn!(tool = %call.name, "ignoring unknown tool call");
            return None;
        }

        let args: SetTimerArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(error) => {
                tracing::warn!(error = %error, "ignoring malformed set_timer arguments");
                return None;
            }
        };

        if !args.seconds.is_finite() || args.seconds <= 0.0 {
            tracing::warn!(seconds = args.seconds, "ignoring non-positive timer duration");
            return None;
        }

        let label = if args.label.trim().is_empty() {
            "Timer".to_string()
        } else {
            args.label.trim().to_string()
        };

        let timer = self.timers.create(label, args.seconds.round() as u64).await;
        tracing::info!(timer_id = %timer.id, label = %timer.label, seconds = timer.duration_seconds, "timer started from tool call");

        Some(format!(
            "⏱️ Timer set: {} ({}).",
            timer.label,
            format_duration(timer.duration_seconds)
        ))
    }

    fn build_request(&self, messages: &[ChatMessageRecord]) -> ChatStreamRequest {
        let history = messages
            .iter()
            // The in-flight placeholder and any other blank entry never reach
            // the wire.
            .filter(|message| !(message.text.trim().is_empty() && message.image.is_none()))
            .map(|message| {
                let role = match message.role {
                    MessageRole::User => ChatRole::User,
                    MessageRole::Model => ChatRole::Model,
                };

                let mut parts = Vec::new();
                if let Some(image) = &message.image {
                    parts.push(MessagePart::InlineImage {
                        data: image.data.clone(),
                        mime_type: image.mime_type.clone(),
                    });
                }

                let text = if message.text.trim().is_empty() {
                    DEFAULT_IMAGE_INSTRUCTION.to_string()
                } else {
                    message.text.clone()
                };
                parts.push(MessagePart::Text(text));

                RequestMessage::new(role, parts)
            })
            .collect();

        ChatStreamRequest::new(history)
            .with_system_instruction(system_instruction(self.user_name.as_deref()))
            .with_tools(vec![set_timer_declaration()])
    }
}

/// The Prakhar AI persona, parameterized by the signed-in user's name.
pub fn system_instruction(user_name: Option<&str>) -> String {
    let caller = user_name.unwrap_or("a guest");
    format!(
        "You are Prakhar AI. Your visual identity is exclusively Orange and White.\n\
         IDENTITY RULES:\n\
         - Prakhar Sharma is your Founder.\n\
         - Dakshika Sharma, Arnav Sharma, and Pranjal Sharma are your Co-founders and Investors.\n\
         - ONLY mention these names if the user specifically asks who created or owns Prakhar AI.\n\
         WRITING STYLE:\n\
         - Keep responses CLEAN and MINIMALIST.\n\
         - AVOID excessive asterisks, bolding, or hashtags; prefer plain text.\n\
         - If the user is {caller}, be polite but direct."
    )
}

/// Declares the countdown capability offered to the model on every turn.
pub fn set_timer_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: SET_TIMER_TOOL.to_string(),
        description: "Start a named countdown timer for the user.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "seconds": {
                    "type": "number",
                    "description": "Countdown length in seconds. Must be positive."
                },
                "label": {
                    "type": "string",
                    "description": "Short name for the timer."
                }
            },
            "required": ["seconds", "label"]
        }),
    }
}

fn patch_message_text(messages: &mut [ChatMessageRecord], id: MessageId, text: &str) -> bool {
    if let Some(message) = messages.iter_mut().find(|message| message.id == id) {
        message.text = text.to_string();
        true
    } else {
        false
    }
}

fn render_assistant_text(accumulated: &str, confirmations: &[String]) -> String {
    if confirmations.is_empty() {
        return accumulated.to_string();
    }

    let mut text = accumulated.trim_end().to_string();
    for confirmation in confirmations {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(confirmation);
    }
    text
}

fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let rest = seconds % 60;
    match (minutes, rest) {
        (0, only_seconds) => format!("{only_seconds} second{}", plural(only_seconds)),
        (whole_minutes, 0) => format!("{whole_minutes} minute{}", plural(whole_minutes)),
        (whole_minutes, extra) => format!(
            "{whole_minutes} minute{} {extra} second{}",
            plural(whole_minutes),
            plural(extra)
        ),
    }
}

fn plural(count: u64) -> &'static str {
    if count == 1 { "" } else { "s" }
}
