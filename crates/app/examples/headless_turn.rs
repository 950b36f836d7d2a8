//! Runs one chat turn end to end against the live API.
//!
//! Needs a credential: either a settings file or `GEMINI_API_KEY` in the
//! environment.

use prakhar::app::AppState;
use prakhar::chat::TurnInput;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut app = AppState::bootstrap().await?;
    let mut conversation = app.new_conversation();

    let outcome = app
        .send_chat_turn(&mut conversation, TurnInput::text("Hello! What can you do?"))
        .await?;

    println!("[{}] {}", outcome.session_id, outcome.assistant_text);
    for timer in app.timers.list().await {
        println!(
            "timer '{}': {}s remaining",
            timer.label, timer.remaining_seconds
        );
    }

    Ok(())
}
