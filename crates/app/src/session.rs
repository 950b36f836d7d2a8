use prakhar_storage::{
    ChatMessageRecord, ChatSessionRecord, DEFAULT_SESSION_TITLE, PersistenceAdapter, SessionId,
    StorageResult, now_unix_ms,
};

/// Owns every committed chat session plus the active-session pointer.
///
/// Collection order is insertion order with new sessions prepended, so
/// `list_all` is most-recent-first without sorting. Every mutation writes the
/// whole collection through the persistence adapter.
pub struct SessionStore {
    adapter: PersistenceAdapter,
    sessions: Vec<ChatSessionRecord>,
    active: Option<SessionId>,
}

impl SessionStore {
    /// Hydrates the store from the persisted snapshot (empty on corruption).
    pub async fn load(adapter: PersistenceAdapter) -> StorageResult<Self> {
        let sessions = adapter.load_sessions().await?;
        Ok(Self {
            adapter,
            sessions,
            active: None,
        })
    }

    pub fn list_all(&self) -> &[ChatSessionRecord] {
        &self.sessions
    }

    pub fn get(&self, id: SessionId) -> Option<&ChatSessionRecord> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active
    }

    pub fn set_active(&mut self, id: Option<SessionId>) {
        self.active = id;
    }

    /// Replaces an existing session's messages or creates a new session.
    ///
    /// The title only changes when a non-empty one is supplied; creation
    /// without a title uses the default label. The timestamp refreshes on
    /// every upsert.
    pub async fn upsert(
        &mut self,
        id: SessionId,
        messages: Vec<ChatMessageRecord>,
        title: Option<String>,
    ) -> StorageResult<()> {
        let now = now_unix_ms();
        let title = title.filter(|value| !value.trim().is_empty());

        if let Some(existing) = self.sessions.iter_mut().find(|session| session.id == id) {
            existing.messages = messages;
            existing.timestamp = now;
            if let Some(title) = title {
                existing.title = title;
            }
        } else {
            // New sessions go to the front: most-recent-first by insertion.
            self.sessions.insert(
                0,
                ChatSessionRecord {
                    id,
                    title: title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string()),
                    messages,
                    timestamp: now,
                },
            );
        }

        self.persist().await
    }

    /// Deletes a session if present; removing the active session clears the
    /// active pointer.
    pub async fn remove(&mut self, id: SessionId) -> StorageResult<()> {
        self.sessions.retain(|session| session.id != id);
        if self.active == Some(id) {
            self.active = None;
        }
        self.persist().await
    }

    async fn persist(&self) -> StorageResult<()> {
        self.adapter.save_sessions(&self.sessions).await
    }
}
