use crate::domain::models::{SaveOutcome, ScheduleDocument, TelegramLinkCode, UserSettings};
use crate::infrastructure::backend_client::{
    AuthApi, AuthResponse, Credentials, ScheduleApi, SettingsApi,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const REFRESHED_ACCESS_TOKEN: &str = "access-refreshed";

/// In-process stand-in for the remote service.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    pub schedules: Mutex<HashMap<NaiveDate, ScheduleDocument>>,
    pub settings: Mutex<Option<UserSettings>>,
    pub fetch_delays_ms: Mutex<HashMap<NaiveDate, u64>>,
    pub expired_tokens: Mutex<HashSet<String>>,
    pub seen_tokens: Mutex<Vec<Option<String>>>,
    pub offline: AtomicBool,
    pub save_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn delay_fetch(&self, date: NaiveDate, millis: u64) {
        self.fetch_delays_ms
            .lock()
            .expect("delay lock poisoned")
            .insert(date, millis);
    }

    pub fn expire_token(&self, token: &str) {
        self.expired_tokens
            .lock()
            .expect("expired lock poisoned")
            .insert(token.to_string());
    }

    pub fn stored_schedule(&self, date: NaiveDate) -> Option<ScheduleDocument> {
        self.schedules
            .lock()
            .expect("schedule lock poisoned")
            .get(&date)
            .cloned()
    }

    fn authorize(&self, access_token: Option<&str>, action: &str) -> Result<(), InfraError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InfraError::Http(format!(
                "network error while {action}: connection refused"
            )));
        }
        self.seen_tokens
            .lock()
            .expect("seen lock poisoned")
            .push(access_token.map(ToOwned::to_owned));
        let expired = access_token.is_some_and(|token| {
            self.expired_tokens
                .lock()
                .expect("expired lock poisoned")
                .contains(token)
        });
        if expired {
            return Err(InfraError::Unauthorized(format!("http 401 while {action}")));
        }
        Ok(())
    }

    fn tokens_for(username: &str) -> AuthResponse {
        AuthResponse {
            access_token: format!("access-{username}"),
            refresh_token: format!("refresh-{username}"),
            message: Some(format!("Welcome back, {username}")),
        }
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError> {
        if credentials.password == "wrong" {
            return Err(InfraError::Unauthorized("http 401 while logging in".to_string()));
        }
        Ok(Self::tokens_for(&credentials.username))
    }

    async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError> {
        Ok(AuthResponse {
            message: Some("Account created".to_string()),
            ..Self::tokens_for(&credentials.username)
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<AuthResponse, InfraError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthResponse {
            access_token: REFRESHED_ACCESS_TOKEN.to_string(),
            refresh_token: String::new(),
            message: None,
        })
    }
}

#[async_trait]
impl ScheduleApi for FakeBackend {
    async fn fetch_schedule(
        &self,
        access_token: Option<&str>,
        date: NaiveDate,
    ) -> Result<Option<ScheduleDocument>, InfraError> {
        let delay = self
            .fetch_delays_ms
            .lock()
            .expect("delay lock poisoned")
            .get(&date)
            .copied();
        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        self.authorize(access_token, "loading schedule")?;
        Ok(self.stored_schedule(date))
    }

    async fn save_schedule(
        &self,
        access_token: Option<&str>,
        document: &ScheduleDocument,
    ) -> Result<(), InfraError> {
        self.authorize(access_token, "saving schedule")?;
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.schedules
            .lock()
            .expect("schedule lock poisoned")
            .insert(document.date, document.clone());
        Ok(())
    }
}

#[async_trait]
impl SettingsApi for FakeBackend {
    async fn fetch_settings(&self, access_token: Option<&str>) -> Result<UserSettings, InfraError> {
        self.authorize(access_token, "loading settings")?;
        Ok(self
            .settings
            .lock()
            .expect("settings lock poisoned")
            .clone()
            .unwrap_or_default())
    }

    async fn update_settings(
        &self,
        access_token: Option<&str>,
        settings: &UserSettings,
    ) -> Result<SaveOutcome, InfraError> {
        self.authorize(access_token, "saving settings")?;
        let mut stored = settings.clone();
        stored.telegram_linked = None;
        *self.settings.lock().expect("settings lock poisoned") = Some(stored);
        Ok(SaveOutcome::saved("Settings updated"))
    }

    async fn request_telegram_link(
        &self,
        access_token: Option<&str>,
    ) -> Result<TelegramLinkCode, InfraError> {
        self.authorize(access_token, "requesting telegram link code")?;
        Ok(TelegramLinkCode {
            code: "LINK42".to_string(),
            expires_at: DateTime::parse_from_rfc3339("2026-02-16T09:10:00Z")
                .map_err(|error| InfraError::Http(error.to_string()))?
                .with_timezone(&Utc),
            message: "Send /start LINK42 to the bot".to_string(),
        })
    }

    async fn unlink_telegram(&self, access_token: Option<&str>) -> Result<SaveOutcome, InfraError> {
        self.authorize(access_token, "unlinking telegram")?;
        Ok(SaveOutcome::saved("Telegram unlinked"))
    }
}
