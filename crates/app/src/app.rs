use std::sync::Arc;

use snafu::{ResultExt, Snafu};

use prakhar_llm::{ClientError, GeminiClient, GenerationClient, ProviderConfig};
use prakhar_storage::{
    KeyValueStore, PersistenceAdapter, SessionId, SqliteKvStore, StorageError,
};

use crate::chat::{ChatOrchestrator, Conversation, TurnError, TurnInput, TurnOutcome};
use crate::config::{AppSettings, SettingsStore};
use crate::gallery::GalleryStore;
use crate::identity::IdentityStore;
use crate::session::SessionStore;
use crate::speech::SpeechController;
use crate::studio::StudioController;
use crate::timer::TimerService;

#[derive(Debug, Snafu)]
pub enum BootstrapError {
    #[snafu(display("failed to open the backing key-value store"))]
    OpenStore {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to load persisted collections"))]
    LoadCollections {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("generation client could not be constructed"))]
    BuildClient {
        stage: &'static str,
        source: ClientError,
    },
}

/// Everything the app holds for its lifetime: hydrated stores, the injected
/// generation client, the orchestration controllers, and the timer tick task.
pub struct AppState {
    pub sessions: SessionStore,
    pub gallery: GalleryStore,
    pub identity: IdentityStore,
    pub timers: Arc<TimerService>,
    pub orchestrator: ChatOrchestrator,
    pub studio: StudioController,
    pub speech: SpeechController,
    ticker: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Loads settings, opens the sqlite-backed store, and wires everything up.
    pub async fn bootstrap() -> Result<Self, BootstrapError> {
        let settings_store = SettingsStore::load();
        let settings = settings_store.settings();

        let store = SqliteKvStore::open(&settings.database_path)
            .await
            .context(OpenStoreSnafu {
                stage: "bootstrap-open-store",
            })?;

        Self::with_store(&settings, Arc::new(store)).await
    }

    /// Wires the app over an already-open key-value store.
    pub async fn with_store(
        settings: &AppSettings,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, BootstrapError> {
        let adapter = PersistenceAdapter::new(store);

        // Hydration fails soft on corrupt snapshots inside the adapter; an
        // unreachable store is a real bootstrap failure.
        let sessions = SessionStore::load(adapter.clone())
            .await
            .context(LoadCollectionsSnafu {
                stage: "bootstrap-load-sessions",
            })?;
        let gallery = GalleryStore::load(adapter.clone())
            .await
            .context(LoadCollectionsSnafu {
                stage: "bootstrap-load-images",
            })?;
        let identity = IdentityStore::load(adapter)
            .await
            .context(LoadCollectionsSnafu {
                stage: "bootstrap-load-user",
            })?;

        let client: Arc<dyn GenerationClient> = Arc::new(
            GeminiClient::new(ProviderConfig::new(&settings.api_key, &settings.endpoint))
                .context(BuildClientSnafu {
                    stage: "bootstrap-build-client",
                })?
                .with_chat_model(&settings.chat_model)
                .with_image_model(&settings.image_model)
                .with_tts_model(&settings.tts_model),
        );

        Ok(Self::assemble(settings, sessions, gallery, identity, client))
    }

    /// Final wiring step, shared with tests that inject a scripted client.
    fn assemble(
        settings: &AppSettings,
        sessions: SessionStore,
        gallery: GalleryStore,
        identity: IdentityStore,
        client: Arc<dyn GenerationClient>,
    ) -> Self {
        let timers = Arc::new(TimerService::new());
        let ticker = Arc::clone(&timers).spawn_ticker();

        let mut orchestrator = ChatOrchestrator::new(client.clone(), timers.clone());
        orchestrator.set_user_name(identity.user_name().map(str::to_string));

        let studio = StudioController::new(client.clone());
        let speech = SpeechController::new(client).with_voice(&settings.voice);

        Self {
            sessions,
            gallery,
            identity,
            timers,
            orchestrator,
            studio,
            speech,
            ticker,
        }
    }

    /// Starts a fresh, unsaved conversation seeded with the greeting.
    pub fn new_conversation(&self) -> Conversation {
        Conversation::with_greeting(self.identity.greeting())
    }

    /// Reopens a stored session as the active working conversation.
    pub fn open_conversation(&mut self, id: SessionId) -> Option<Conversation> {
        let session = self.sessions.get(id)?;
        let conversation = Conversation::resume(session.id, session.messages.clone());
        self.sessions.set_active(Some(id));
        Some(conversation)
    }

    pub async fn send_chat_turn(
        &mut self,
        conversation: &mut Conversation,
        input: TurnInput,
    ) -> Result<TurnOutcome, TurnError> {
        self.orchestrator
            .send_turn(conversation, &mut self.sessions, input)
            .await
    }

    pub async fn delete_session(&mut self, id: SessionId) -> Result<(), StorageError> {
        self.sessions.remove(id).await
    }

    pub async fn sign_in(&mut self, name: impl Into<String>) -> Result<(), StorageError> {
        self.identity.sign_in(name).await?;
        self.orchestrator
            .set_user_name(self.identity.user_name().map(str::to_string));
        Ok(())
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use prakhar_storage::MemoryKvStore;

    use crate::testing::FakeGenerationClient;

    use super::*;

    async fn app_with_fake_client() -> AppState {
        let settings = AppSettings::default();
        let adapter = PersistenceAdapter::new(Arc::new(MemoryKvStore::new()));

        let sessions = SessionStore::load(adapter.clone()).await.expect("sessions");
        let gallery = GalleryStore::load(adapter.clone()).await.expect("gallery");
        let identity = IdentityStore::load(adapter).await.expect("identity");
        let client = Arc::new(FakeGenerationClient::new()) as Arc<dyn GenerationClient>;

        AppState::assemble(&settings, sessions, gallery, identity, client)
    }

    #[tokio::test]
    async fn with_store_rejects_a_missing_credential() {
        let settings = AppSettings::default();
        let error = AppState::with_store(&settings, Arc::new(MemoryKvStore::new()))
            .await
            .expect_err("an empty api key must fail the bootstrap");

        assert!(matches!(error, BootstrapError::BuildClient { .. }));
    }

    #[tokio::test]
    async fn new_conversations_start_with_the_greeting() {
        let app = app_with_fake_client().await;
        let conversation = app.new_conversation();

        assert_eq!(conversation.session_id, None);
        assert_eq!(conversation.messages.len(), 1);
        assert!(conversation.messages[0].text.contains("I'm Prakhar AI"));
    }

    #[tokio::test]
    async fn a_full_turn_flows_through_the_app_state() {
        let mut app = app_with_fake_client().await;
        let mut conversation = app.new_conversation();

        let outcome = app
            .send_chat_turn(&mut conversation, TurnInput::text("Hello"))
            .await
            .expect("turn must succeed");

        assert_eq!(app.sessions.active(), Some(outcome.session_id));
        assert!(app.sessions.contains(outcome.session_id));

        // Scenario: deleting the active session clears the pointer.
        app.delete_session(outcome.session_id)
            .await
            .expect("delete");
        assert_eq!(app.sessions.active(), None);
        assert!(!app.sessions.contains(outcome.session_id));
    }

    #[tokio::test]
    async fn opening_a_stored_session_marks_it_active() {
        let mut app = app_with_fake_client().await;
        let mut conversation = app.new_conversation();
        let outcome = app
            .send_chat_turn(&mut conversation, TurnInput::text("Hello"))
            .await
            .expect("turn");

        app.sessions.set_active(None);
        let reopened = app
            .open_conversation(outcome.session_id)
            .expect("session must reopen");

        assert_eq!(reopened.session_id, Some(outcome.session_id));
        assert_eq!(app.sessions.active(), Some(outcome.session_id));
        assert!(app.open_conversation(SessionId::new_v7()).is_none());
    }
}
