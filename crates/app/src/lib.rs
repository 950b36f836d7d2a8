pub mod app;
pub mod chat;
pub mod config;
pub mod gallery;
pub mod identity;
pub mod session;
pub mod speech;
pub mod studio;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{AppState, BootstrapError};
pub use chat::{ChatOrchestrator, Conversation, TurnError, TurnInput, TurnOutcome};
pub use config::{AppSettings, SettingsStore};
pub use gallery::GalleryStore;
pub use identity::IdentityStore;
pub use session::SessionStore;
pub use speech::SpeechController;
pub use studio::{StudioController, StudioError, StudioRequest};
pub use timer::{AppTimer, TimerService};
