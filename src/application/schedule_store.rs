use crate::application::auth::{AccessTokenProvider, with_token_refresh};
use crate::domain::models::{SaveOutcome, ScheduleDocument};
use crate::infrastructure::backend_client::ScheduleApi;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_cache::ScheduleCacheRepository;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::time::{Duration as TokioDuration, sleep};

pub const SYNCED_MESSAGE: &str = "Synced to server";
pub const OFFLINE_MESSAGE: &str = "Saved locally (offline)";

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub(crate) async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, InfraError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, InfraError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if is_transient(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(u32::from(attempt)));
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub(crate) fn is_transient(error: &InfraError) -> bool {
    match error {
        InfraError::Http(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("temporarily unavailable")
                || message.contains("connection reset")
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    Remote,
    LocalCache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSchedule {
    pub document: Option<ScheduleDocument>,
    pub source: ScheduleSource,
    /// Why the remote copy was not used, when the cache answered instead.
    pub remote_error: Option<String>,
}

/// Outcome of a save that always lands locally and may also reach the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub outcome: SaveOutcome,
    pub remote_error: Option<String>,
}

impl SaveReport {
    pub(crate) fn synced(message: &str) -> Self {
        Self {
            outcome: SaveOutcome::saved(message),
            remote_error: None,
        }
    }

    pub(crate) fn offline(message: &str, error: InfraError) -> Self {
        Self {
            outcome: SaveOutcome::saved(message),
            remote_error: Some(error.to_string()),
        }
    }
}

/// Remote-primary schedule persistence with the local cache as fallback.
pub struct ScheduleStore<A, C>
where
    A: ScheduleApi + ?Sized,
    C: ScheduleCacheRepository + ?Sized,
{
    api: Arc<A>,
    cache: Arc<C>,
    tokens: Arc<dyn AccessTokenProvider>,
    retry_policy: RetryPolicy,
}

impl<A, C> ScheduleStore<A, C>
where
    A: ScheduleApi + ?Sized,
    C: ScheduleCacheRepository + ?Sized,
{
    pub fn new(api: Arc<A>, cache: Arc<C>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            api,
            cache,
            tokens,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn load(&self, date: NaiveDate) -> Result<LoadedSchedule, InfraError> {
        let remote = with_token_refresh(self.tokens.as_ref(), |token| async move {
            self.retry_policy
                .run(|| self.api.fetch_schedule(token.as_deref(), date))
                .await
        })
        .await
        .and_then(|document| match document {
            Some(document) if document.date != date => Err(InfraError::InvalidConfig(format!(
                "server returned schedule for {} when {date} was requested",
                document.date
            ))),
            Some(document) => document
                .validate()
                .map(|()| Some(document))
                .map_err(InfraError::InvalidConfig),
            None => Ok(None),
        });

        match remote {
            Ok(document) => Ok(LoadedSchedule {
                document,
                source: ScheduleSource::Remote,
                remote_error: None,
            }),
            // An unreadable cache row is reported like a missing one.
            Err(error) => Ok(match self.cache.load(date) {
                Ok(document) => LoadedSchedule {
                    document,
                    source: ScheduleSource::LocalCache,
                    remote_error: Some(error.to_string()),
                },
                Err(cache_error) => LoadedSchedule {
                    document: None,
                    source: ScheduleSource::LocalCache,
                    remote_error: Some(format!("{error}; local cache unreadable: {cache_error}")),
                },
            }),
        }
    }

    /// Writes the local cache first, then attempts the server. Only a failed
    /// local write is an error.
    pub async fn save(&self, document: &ScheduleDocument) -> Result<SaveReport, InfraError> {
        document.validate().map_err(InfraError::InvalidConfig)?;
        self.cache.save(document)?;

        let remote = with_token_refresh(self.tokens.as_ref(), |token| async move {
            self.api.save_schedule(token.as_deref(), document).await
        })
        .await;

        Ok(match remote {
            Ok(()) => SaveReport::synced(SYNCED_MESSAGE),
            Err(error) => SaveReport::offline(OFFLINE_MESSAGE, error),
        })
    }
}
