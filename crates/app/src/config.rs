use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use prakhar_llm::{
    DEFAULT_CHAT_MODEL, DEFAULT_ENDPOINT, DEFAULT_IMAGE_MODEL, DEFAULT_TTS_MODEL,
    DEFAULT_TTS_VOICE, ProviderConfig,
};

pub const SETTINGS_DIRECTORY_NAME: &str = "prakhar";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "PRAKHAR_";

/// Credential fallback when the settings file carries no key.
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

pub const DEFAULT_DATABASE_PATH: &str = ".prakhar/store.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            database_path: default_database_path(),
        }
    }
}

impl AppSettings {
    /// Builds the generation client config. `None` without an API key.
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(&self.api_key, &self.endpoint))
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = non_empty_or(self.endpoint, default_endpoint);
        self.chat_model = non_empty_or(self.chat_model, default_chat_model);
        self.image_model = non_empty_or(self.image_model, default_image_model);
        self.tts_model = non_empty_or(self.tts_model, default_tts_model);
        self.voice = non_empty_or(self.voice, default_voice);
        self.database_path = non_empty_or(self.database_path, default_database_path);
        self
    }

    fn with_environment_credential(mut self) -> Self {
        if self.api_key.trim().is_empty()
            && let Ok(key) = std::env::var(API_KEY_ENV_VAR)
        {
            let key = key.trim().to_string();
            if !key.is_empty() {
                self.api_key = key;
            }
        }
        self
    }
}

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file to {path:?}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to move settings file from {from:?} to {to:?}"))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Hot-swappable settings handle with figment-backed loading.
pub struct SettingsStore {
    settings: Arc<ArcSwap<AppSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".prakhar"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: AppSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> AppSettings {
        let mut figment = Figment::from(Serialized::defaults(AppSettings::default()));

        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(SETTINGS_ENV_PREFIX));

        match figment.extract::<AppSettings>() {
            Ok(settings) => settings.normalized().with_environment_credential(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                AppSettings::default().with_environment_credential()
            }
        }
    }

    fn persist(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

fn non_empty_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_tts_model() -> String {
    DEFAULT_TTS_MODEL.to_string()
}

fn default_voice() -> String {
    DEFAULT_TTS_VOICE.to_string()
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

#[cfg(test)]
mod tests {
    use prakhar_storage::now_unix_ms;

    use super::*;

    #[test]
    fn defaults_target_the_production_models() {
        let settings = AppSettings::default();
        assert_eq!(settings.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert!(!settings.is_valid());
        assert!(settings.to_provider_config().is_none());
    }

    #[test]
    fn normalization_trims_and_restores_blank_fields() {
        let settings = AppSettings {
            api_key: "  key  ".to_string(),
            endpoint: "   ".to_string(),
            chat_model: " custom-model ".to_string(),
            ..AppSettings::default()
        }
        .normalized();

        assert_eq!(settings.api_key, "key");
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.chat_model, "custom-model");
        assert!(settings.is_valid());
    }

    #[test]
    fn settings_roundtrip_through_the_store() {
        let path = std::env::temp_dir().join(format!(
            "prakhar-settings-test-{}-{}.json",
            std::process::id(),
            now_unix_ms()
        ));

        let store = SettingsStore::new(path.clone());
        let updated = AppSettings {
            api_key: "test-key".to_string(),
            voice: "Puck".to_string(),
            ..AppSettings::default()
        };
        store.update(updated).expect("update must persist");

        let reloaded = SettingsStore::new(path.clone());
        let settings = reloaded.settings();
        assert_eq!(settings.api_key, "test-key");
        assert_eq!(settings.voice, "Puck");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn a_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!(
            "prakhar-settings-missing-{}-{}.json",
            std::process::id(),
            now_unix_ms()
        ));

        let store = SettingsStore::new(path);
        assert_eq!(store.settings().endpoint, DEFAULT_ENDPOINT);
    }
}
