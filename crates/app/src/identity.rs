use prakhar_storage::{PersistenceAdapter, StorageResult, UserProfileRecord};

/// Signed-in user state. Purely cosmetic: it shapes the greeting and the
/// system instruction, nothing else.
pub struct IdentityStore {
    adapter: PersistenceAdapter,
    user: Option<UserProfileRecord>,
}

impl IdentityStore {
    pub async fn load(adapter: PersistenceAdapter) -> StorageResult<Self> {
        let user = adapter.load_user().await?;
        Ok(Self { adapter, user })
    }

    pub fn user(&self) -> Option<&UserProfileRecord> {
        self.user.as_ref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|user| user.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// First whitespace-separated token of the user's name, for greetings.
    pub fn first_name(&self) -> Option<&str> {
        self.user_name()
            .and_then(|name| name.split_whitespace().next())
    }

    pub async fn sign_in(&mut self, name: impl Into<String>) -> StorageResult<()> {
        let record = UserProfileRecord {
            name: name.into().trim().to_string(),
        };
        self.adapter.save_user(&record).await?;
        self.user = Some(record);
        Ok(())
    }

    /// Greeting text for the seeded assistant message.
    pub fn greeting(&self) -> String {
        match self.first_name() {
            Some(first) => format!("Hi {first}, I'm Prakhar AI. How can I help you today?"),
            None => "Hi, I'm Prakhar AI. How can I help you today?".to_string(),
        }
    }
}
