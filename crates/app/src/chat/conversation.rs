use prakhar_storage::{
    ChatMessageRecord, DEFAULT_SESSION_TITLE, InlineImageRecord, MessageId, MessageRole,
    SessionId, now_unix_ms,
};

use super::turn_state::{TurnId, TurnState, TurnTransition, TurnTransitionResult};

/// Maximum number of characters a derived session title keeps before the
/// ellipsis.
pub const TITLE_MAX_CHARS: usize = 30;

/// Working copy of the conversation currently on screen.
///
/// The orchestrator owns this exclusively for the duration of a turn and
/// commits the whole message sequence back to the session store at turn end.
/// `session_id` stays unset until the first send: a conversation that never
/// sends a message is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub session_id: Option<SessionId>,
    pub messages: Vec<ChatMessageRecord>,
    pub turn_state: TurnState,
    next_turn_id: u64,
}

impl Conversation {
    /// Creates an empty, unsaved conversation.
    pub fn new() -> Self {
        Self {
            session_id: None,
            messages: Vec::new(),
            turn_state: TurnState::Idle,
            next_turn_id: 1,
        }
    }

    /// Creates an unsaved conversation seeded with the assistant greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.messages.push(model_message(greeting));
        conversation
    }

    /// Reopens a persisted session as a working copy.
    pub fn resume(session_id: SessionId, messages: Vec<ChatMessageRecord>) -> Self {
        Self {
            session_id: Some(session_id),
            messages,
            turn_state: TurnState::Idle,
            next_turn_id: 1,
        }
    }

    /// Reserves the next turn id; ids are never reused within a conversation.
    pub fn allocate_turn_id(&mut self) -> TurnId {
        let id = TurnId::new(self.next_turn_id);
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        id
    }

    /// Applies a deterministic turn transition.
    pub fn apply_turn_transition(&mut self, transition: TurnTransition) -> TurnTransitionResult {
        let next_state = self.turn_state.apply(transition)?;
        self.turn_state = next_state.clone();
        Ok(next_state)
    }

    /// Text of the first user message, the title derivation source.
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.text.as_str())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a finalized user message with a fresh id and current timestamp.
pub fn user_message(text: impl Into<String>, image: Option<InlineImageRecord>) -> ChatMessageRecord {
    ChatMessageRecord {
        id: MessageId::new_v7(),
        role: MessageRole::User,
        text: text.into(),
        timestamp: now_unix_ms(),
        image,
    }
}

/// Builds a finalized assistant message.
pub fn model_message(text: impl Into<String>) -> ChatMessageRecord {
    ChatMessageRecord {
        id: MessageId::new_v7(),
        role: MessageRole::Model,
        text: text.into(),
        timestamp: now_unix_ms(),
        image: None,
    }
}

/// Builds the empty assistant placeholder that streaming patches in place.
pub fn model_placeholder() -> ChatMessageRecord {
    model_message(String::new())
}

/// Derives a session title from the first user message: a prefix of at most
/// [`TITLE_MAX_CHARS`] characters, with an ellipsis when truncated.
pub fn derive_title(first_user_text: &str) -> String {
    let trimmed = first_user_text.trim();
    if trimmed.is_empty() {
        return DEFAULT_SESSION_TITLE.to_string();
    }

    let mut chars = trimmed.chars();
    let prefix: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{prefix}…")
    } else {
        prefix
    }
}
