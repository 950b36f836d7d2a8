mod conversation;
mod orchestrator;
mod turn_state;

pub use conversation::{
    Conversation, TITLE_MAX_CHARS, derive_title, model_message, model_placeholder, user_message,
};
pub use orchestrator::{
    ChatOrchestrator, DEFAULT_IMAGE_INSTRUCTION, FALLBACK_ASSISTANT_TEXT, SET_TIMER_TOOL,
    TurnError, TurnInput, TurnOutcome, set_timer_declaration, system_instruction,
};
pub use turn_state::{
    TurnId, TurnState, TurnTransition, TurnTransitionRejection, TurnTransitionResult,
};
