use crate::domain::models::{SaveOutcome, ScheduleDocument, TelegramLinkCode, UserSettings};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScheduleEnvelope<'a> {
    schedule: &'a ScheduleDocument,
}

#[derive(Debug, Deserialize)]
struct FetchedSchedule {
    schedule: Option<ScheduleDocument>,
}

#[derive(Debug, Deserialize)]
struct AckPayload {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Settings fields the backend accepts on update; link state is server-owned.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsUpdatePayload<'a> {
    name: &'a str,
    remind_before_activity: bool,
    remind_on_start: bool,
    nudge_during_activity: bool,
    congratulate_on_finish: bool,
    default_slot_duration: u32,
}

impl<'a> From<&'a UserSettings> for SettingsUpdatePayload<'a> {
    fn from(settings: &'a UserSettings) -> Self {
        Self {
            name: &settings.name,
            remind_before_activity: settings.remind_before_activity,
            remind_on_start: settings.remind_on_start,
            nudge_during_activity: settings.nudge_during_activity,
            congratulate_on_finish: settings.congratulate_on_finish,
            default_slot_duration: settings.default_slot_duration.minutes(),
        }
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError>;
    async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, InfraError>;
}

#[async_trait]
pub trait ScheduleApi: Send + Sync {
    /// `Ok(None)` when the backend has nothing stored for `date`.
    async fn fetch_schedule(
        &self,
        access_token: Option<&str>,
        date: NaiveDate,
    ) -> Result<Option<ScheduleDocument>, InfraError>;

    async fn save_schedule(
        &self,
        access_token: Option<&str>,
        document: &ScheduleDocument,
    ) -> Result<(), InfraError>;
}

#[async_trait]
pub trait SettingsApi: Send + Sync {
    async fn fetch_settings(&self, access_token: Option<&str>) -> Result<UserSettings, InfraError>;

    async fn update_settings(
        &self,
        access_token: Option<&str>,
        settings: &UserSettings,
    ) -> Result<SaveOutcome, InfraError>;

    async fn request_telegram_link(
        &self,
        access_token: Option<&str>,
    ) -> Result<TelegramLinkCode, InfraError>;

    async fn unlink_telegram(&self, access_token: Option<&str>) -> Result<SaveOutcome, InfraError>;
}

pub trait BackendApi: AuthApi + ScheduleApi + SettingsApi {}

impl<T> BackendApi for T where T: AuthApi + ScheduleApi + SettingsApi {}

#[derive(Debug, Clone)]
pub struct ReqwestBackendClient {
    client: Client,
    base_url: Url,
}

impl ReqwestBackendClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Http(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        endpoint(&self.base_url, segments)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(error_for_status(status, &body, action));
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Http(format!("invalid payload while {action}: {error}; body={body}"))
        })
    }

    async fn send_ack(&self, request: RequestBuilder, action: &str) -> Result<SaveOutcome, InfraError> {
        let ack: AckPayload = self.send_json(request, action).await?;
        Ok(SaveOutcome {
            success: ack.success,
            message: ack.message.unwrap_or_else(|| "Saved".to_string()),
        })
    }
}

fn with_bearer(request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
    match access_token.map(str::trim).filter(|token| !token.is_empty()) {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

pub(crate) fn endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, InfraError> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| InfraError::InvalidConfig("api base URL cannot be a base".to_string()))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

pub(crate) fn error_for_status(status: StatusCode, body: &str, action: &str) -> InfraError {
    let detail = if body.trim().is_empty() {
        format!("http {} while {action}", status.as_u16())
    } else {
        format!("http {} while {action}; body={body}", status.as_u16())
    };
    if status == StatusCode::UNAUTHORIZED {
        InfraError::Unauthorized(detail)
    } else {
        InfraError::Http(detail)
    }
}

#[async_trait]
impl AuthApi for ReqwestBackendClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError> {
        let url = self.endpoint(&["auth", "login"])?;
        self.send_json(self.client.post(url).json(credentials), "logging in")
            .await
    }

    async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError> {
        let url = self.endpoint(&["auth", "signup"])?;
        self.send_json(self.client.post(url).json(credentials), "signing up")
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, InfraError> {
        let url = self.endpoint(&["auth", "refresh"])?;
        let body = serde_json::json!({ "refreshToken": refresh_token });
        self.send_json(self.client.post(url).json(&body), "refreshing token")
            .await
    }
}

#[async_trait]
impl ScheduleApi for ReqwestBackendClient {
    async fn fetch_schedule(
        &self,
        access_token: Option<&str>,
        date: NaiveDate,
    ) -> Result<Option<ScheduleDocument>, InfraError> {
        let date = date.to_string();
        let url = self.endpoint(&["schedule", &date])?;
        let request = with_bearer(self.client.get(url), access_token);
        match self.send_json::<FetchedSchedule>(request, "loading schedule").await {
            Ok(fetched) => Ok(fetched.schedule),
            Err(InfraError::Http(message)) if message.starts_with("http 404") => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn save_schedule(
        &self,
        access_token: Option<&str>,
        document: &ScheduleDocument,
    ) -> Result<(), InfraError> {
        let url = self.endpoint(&["schedule", "save"])?;
        let envelope = ScheduleEnvelope { schedule: document };
        let request = with_bearer(self.client.post(url).json(&envelope), access_token);
        let _: serde_json::Value = self.send_json(request, "saving schedule").await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsApi for ReqwestBackendClient {
    async fn fetch_settings(&self, access_token: Option<&str>) -> Result<UserSettings, InfraError> {
        let url = self.endpoint(&["user", "settings"])?;
        let request = with_bearer(self.client.get(url), access_token);
        self.send_json(request, "loading settings").await
    }

    async fn update_settings(
        &self,
        access_token: Option<&str>,
        settings: &UserSettings,
    ) -> Result<SaveOutcome, InfraError> {
        let url = self.endpoint(&["user", "settings"])?;
        let payload = SettingsUpdatePayload::from(settings);
        let request = with_bearer(self.client.put(url).json(&payload), access_token);
        self.send_ack(request, "saving settings").await
    }

    async fn request_telegram_link(
        &self,
        access_token: Option<&str>,
    ) -> Result<TelegramLinkCode, InfraError> {
        let url = self.endpoint(&["user", "telegram", "link"])?;
        let request = with_bearer(self.client.post(url), access_token);
        self.send_json(request, "requesting telegram link code").await
    }

    async fn unlink_telegram(&self, access_token: Option<&str>) -> Result<SaveOutcome, InfraError> {
        let url = self.endpoint(&["user", "telegram", "unlink"])?;
        let request = with_bearer(self.client.post(url), access_token);
        self.send_ack(request, "unlinking telegram").await
    }
}
