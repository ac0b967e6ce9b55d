use crate::application::auth::{AccessTokenProvider, with_token_refresh};
use crate::application::schedule_store::SaveReport;
use crate::domain::models::{SaveOutcome, TelegramLinkCode, UserSettings};
use crate::infrastructure::backend_client::SettingsApi;
use crate::infrastructure::config::{load_local_settings, save_local_settings};
use crate::infrastructure::error::InfraError;
use std::path::PathBuf;
use std::sync::Arc;

pub const SETTINGS_SYNCED_MESSAGE: &str = "Settings synced";
pub const SETTINGS_LOCAL_MESSAGE: &str = "Saved locally";
pub const SETTINGS_OFFLINE_MESSAGE: &str = "Saved locally (offline)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSettings {
    pub settings: UserSettings,
    pub from_server: bool,
    pub remote_error: Option<String>,
}

/// Settings held by the server and mirrored in `config/settings.json`.
pub struct SettingsStore<A>
where
    A: SettingsApi + ?Sized,
{
    api: Arc<A>,
    tokens: Arc<dyn AccessTokenProvider>,
    config_dir: PathBuf,
}

impl<A> SettingsStore<A>
where
    A: SettingsApi + ?Sized,
{
    pub fn new(api: Arc<A>, tokens: Arc<dyn AccessTokenProvider>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            tokens,
            config_dir: config_dir.into(),
        }
    }

    pub fn load_local(&self) -> Result<UserSettings, InfraError> {
        load_local_settings(&self.config_dir)
    }

    pub async fn load(&self) -> Result<LoadedSettings, InfraError> {
        let remote = with_token_refresh(self.tokens.as_ref(), |token| async move {
            self.api.fetch_settings(token.as_deref()).await
        })
        .await;

        match remote {
            Ok(settings) => {
                save_local_settings(&self.config_dir, &settings)?;
                Ok(LoadedSettings {
                    settings,
                    from_server: true,
                    remote_error: None,
                })
            }
            Err(error) => Ok(LoadedSettings {
                settings: self.load_local()?,
                from_server: false,
                remote_error: Some(error.to_string()),
            }),
        }
    }

    /// Persists locally, then pushes to the server. The server never sees
    /// the link flag; the local copy keeps the last known value.
    pub async fn save(&self, settings: &UserSettings) -> Result<SaveReport, InfraError> {
        settings.validate().map_err(InfraError::InvalidConfig)?;
        let mut local = settings.clone();
        if local.telegram_linked.is_none() {
            local.telegram_linked = self.load_local()?.telegram_linked;
        }
        save_local_settings(&self.config_dir, &local)?;

        let remote = with_token_refresh(self.tokens.as_ref(), |token| async move {
            self.api.update_settings(token.as_deref(), settings).await
        })
        .await;

        Ok(match remote {
            Ok(ack) if ack.success => SaveReport::synced(SETTINGS_SYNCED_MESSAGE),
            Ok(ack) => SaveReport {
                outcome: SaveOutcome::saved(SETTINGS_LOCAL_MESSAGE),
                remote_error: Some(ack.message),
            },
            Err(error) => SaveReport::offline(SETTINGS_OFFLINE_MESSAGE, error),
        })
    }

    pub async fn link_telegram(&self) -> Result<TelegramLinkCode, InfraError> {
        with_token_refresh(self.tokens.as_ref(), |token| async move {
            self.api.request_telegram_link(token.as_deref()).await
        })
        .await
    }

    pub async fn unlink_telegram(&self) -> Result<SaveOutcome, InfraError> {
        let outcome = with_token_refresh(self.tokens.as_ref(), |token| async move {
            self.api.unlink_telegram(token.as_deref()).await
        })
        .await?;

        if outcome.success {
            let mut local = self.load_local()?;
            local.telegram_linked = Some(false);
            save_local_settings(&self.config_dir, &local)?;
        }
        Ok(outcome)
    }
}
