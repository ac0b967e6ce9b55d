use crate::application::auth::AuthManager;
use crate::application::bootstrap::{BootstrapResult, bootstrap_workspace};
use crate::application::planner::PlannerSession;
use crate::application::schedule_store::{SaveReport, ScheduleSource, ScheduleStore};
use crate::application::settings_store::SettingsStore;
use crate::domain::models::{
    SaveOutcome, SlotDuration, TelegramLinkCode, TimeOfDay, Timebox, TimeboxPatch, UserSettings,
    parse_date,
};
use crate::infrastructure::backend_client::{BackendApi, ReqwestBackendClient};
use crate::infrastructure::config::{AppConfig, read_app_config, read_app_config_with_lookup};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_cache::{ScheduleCacheRepository, SqliteScheduleCacheRepository};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type Auth = AuthManager<dyn BackendApi, dyn CredentialStore>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    app_config: AppConfig,
    auth: Arc<Auth>,
    schedules: ScheduleStore<dyn BackendApi, dyn ScheduleCacheRepository>,
    settings: SettingsStore<dyn BackendApi>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let app_config = read_app_config(&bootstrap.config_dir)?;
        let backend = Arc::new(ReqwestBackendClient::new(
            app_config.api_base_url.clone(),
            app_config.request_timeout,
        )?);
        Self::assemble(
            bootstrap,
            app_config,
            backend,
            Arc::new(KeyringCredentialStore::default()),
        )
    }

    /// Wires `backend` and `credentials` in place of the network client and
    /// the OS keyring. `app.json` is read without environment overrides.
    pub fn with_backend(
        workspace_root: PathBuf,
        backend: Arc<dyn BackendApi>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let app_config = read_app_config_with_lookup(&bootstrap.config_dir, |_| None)?;
        Self::assemble(bootstrap, app_config, backend, credentials)
    }

    fn assemble(
        bootstrap: BootstrapResult,
        app_config: AppConfig,
        backend: Arc<dyn BackendApi>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, InfraError> {
        let auth = Arc::new(AuthManager::new(Arc::clone(&backend), credentials));
        let cache: Arc<dyn ScheduleCacheRepository> =
            Arc::new(SqliteScheduleCacheRepository::new(&bootstrap.database_path));
        let schedules = ScheduleStore::new(Arc::clone(&backend), cache, auth.clone());
        let settings = SettingsStore::new(backend, auth.clone(), &bootstrap.config_dir);
        let local_settings = settings.load_local()?;
        let now_provider: NowProvider = Arc::new(Utc::now);
        let today = (now_provider)().with_timezone(&app_config.timezone).date_naive();

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            app_config,
            auth,
            schedules,
            settings,
            runtime: Mutex::new(RuntimeState {
                session: PlannerSession::new(today),
                settings: local_settings,
            }),
            log_guard: Mutex::new(()),
            now_provider,
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": (self.now_provider)().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    /// Today's date and the wall-clock time in the configured timezone.
    fn clock(&self) -> (NaiveDate, TimeOfDay) {
        let local = (self.now_provider)().with_timezone(&self.app_config.timezone);
        (local.date_naive(), TimeOfDay::from_naive_time(local.time()))
    }
}

#[derive(Debug)]
struct RuntimeState {
    session: PlannerSession,
    settings: UserSettings,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub date: String,
    pub boxes: Vec<Timebox>,
    pub can_add_timebox: bool,
    pub can_save: bool,
    pub loading: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectDateResponse {
    pub plan: PlanResponse,
    /// False when a newer selection superseded this load.
    pub applied: bool,
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusResponse {
    pub logged_in: bool,
    pub message: String,
}

/// Box edit as sent by the UI; times are `HH:MM`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeboxPatchInput {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotDurationOption {
    pub minutes: u32,
    pub label: String,
}

pub async fn login_impl(
    state: &AppState,
    username: String,
    password: String,
) -> Result<AuthStatusResponse, InfraError> {
    let message = state.auth.login(&username, &password).await?;
    state.log_info("login", &format!("logged in username={}", username.trim()));
    Ok(AuthStatusResponse {
        logged_in: true,
        message,
    })
}

pub async fn signup_impl(
    state: &AppState,
    username: String,
    password: String,
) -> Result<AuthStatusResponse, InfraError> {
    let message = state.auth.signup(&username, &password).await?;
    state.log_info("signup", &format!("signed up username={}", username.trim()));
    Ok(AuthStatusResponse {
        logged_in: true,
        message,
    })
}

pub fn logout_impl(state: &AppState) -> Result<AuthStatusResponse, InfraError> {
    state.auth.logout()?;
    lock_runtime(state)?.settings = UserSettings::default();
    state.log_info("logout", "cleared tokens and reset settings");
    Ok(AuthStatusResponse {
        logged_in: false,
        message: "Logged out".to_string(),
    })
}

pub fn is_logged_in_impl(state: &AppState) -> Result<bool, InfraError> {
    state.auth.is_logged_in()
}

/// Loads `date` (today when omitted) into the planner. A load overtaken by a
/// newer selection is dropped and reported with `applied: false`.
pub async fn select_date_impl(
    state: &AppState,
    date: Option<String>,
) -> Result<SelectDateResponse, InfraError> {
    let (today, _) = state.clock();
    let date = match date.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_date(value, "date").map_err(InfraError::InvalidConfig)?,
        None => today,
    };

    let ticket = lock_runtime(state)?.session.begin_load(date);
    let loaded = match state.schedules.load(date).await {
        Ok(loaded) => loaded,
        Err(error) => {
            // The session must not stay empty and loading after a failed load.
            let (today, now) = state.clock();
            let mut runtime = lock_runtime(state)?;
            let default_minutes = runtime.settings.default_duration_minutes();
            runtime
                .session
                .apply_loaded(ticket, None, today, now, default_minutes);
            return Err(error);
        }
    };
    if let Some(error) = &loaded.remote_error {
        state.log_error(
            "select_date",
            &format!("remote load failed for date={date}, using local cache: {error}"),
        );
    }

    let (today, now) = state.clock();
    let mut runtime = lock_runtime(state)?;
    let default_minutes = runtime.settings.default_duration_minutes();
    let applied = runtime
        .session
        .apply_loaded(ticket, loaded.document, today, now, default_minutes);
    let plan = plan_response(&runtime.session);
    drop(runtime);

    if applied {
        state.log_info(
            "select_date",
            &format!("loaded date={date} boxes={}", plan.boxes.len()),
        );
    } else {
        state.log_info(
            "select_date",
            &format!("dropped stale load for date={date}"),
        );
    }

    Ok(SelectDateResponse {
        plan,
        applied,
        offline: loaded.source == ScheduleSource::LocalCache,
    })
}

pub fn get_plan_impl(state: &AppState) -> Result<PlanResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(plan_response(&runtime.session))
}

pub fn update_box_impl(
    state: &AppState,
    index: usize,
    patch: TimeboxPatchInput,
) -> Result<PlanResponse, InfraError> {
    let patch = parse_patch(patch)?;
    let mut runtime = lock_runtime(state)?;
    ensure_loaded(&runtime.session)?;
    let default_minutes = runtime.settings.default_duration_minutes();
    let extended = runtime
        .session
        .plan_mut()
        .update_box(index, patch, default_minutes)?;
    let plan = plan_response(&runtime.session);
    drop(runtime);

    state.log_info(
        "update_box",
        &format!("updated index={index} auto_extended={extended}"),
    );
    Ok(plan)
}

pub fn delete_box_impl(state: &AppState, index: usize) -> Result<PlanResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    ensure_loaded(&runtime.session)?;
    let removed = runtime.session.plan_mut().delete_box(index)?;
    let plan = plan_response(&runtime.session);
    drop(runtime);

    state.log_info(
        "delete_box",
        &format!("deleted index={index} id={}", removed.id),
    );
    Ok(plan)
}

pub fn add_timebox_impl(state: &AppState) -> Result<PlanResponse, InfraError> {
    let (_, now) = state.clock();
    let mut runtime = lock_runtime(state)?;
    ensure_loaded(&runtime.session)?;
    let default_minutes = runtime.settings.default_duration_minutes();
    let added = runtime.session.plan_mut().add_timebox(now, default_minutes)?;
    let plan = plan_response(&runtime.session);
    drop(runtime);

    state.log_info(
        "add_timebox",
        &format!("added {}-{} id={}", added.start, added.end, added.id),
    );
    Ok(plan)
}

pub fn insert_between_impl(
    state: &AppState,
    index_before: usize,
    stolen_minutes: u32,
) -> Result<PlanResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    ensure_loaded(&runtime.session)?;
    let inserted = runtime
        .session
        .plan_mut()
        .insert_between(index_before, stolen_minutes)?;
    let plan = plan_response(&runtime.session);
    drop(runtime);

    state.log_info(
        "insert_between",
        &format!(
            "inserted {}-{} after index={index_before} stolen_minutes={stolen_minutes}",
            inserted.start, inserted.end
        ),
    );
    Ok(plan)
}

pub fn can_add_timebox_impl(state: &AppState) -> Result<bool, InfraError> {
    Ok(can_add(&lock_runtime(state)?.session))
}

pub async fn save_plan_impl(state: &AppState) -> Result<SaveOutcome, InfraError> {
    let saved_at = (state.now_provider)();
    let document = {
        let runtime = lock_runtime(state)?;
        ensure_loaded(&runtime.session)?;
        runtime.session.document_for_save(saved_at)
    };
    let Some(document) = document else {
        return Err(InfraError::InvalidConfig(
            "add a label to at least one timebox before saving".to_string(),
        ));
    };

    let report = state.schedules.save(&document).await?;
    log_save_report(
        state,
        "save_plan",
        &format!("date={} tasks={}", document.date, document.tasks.len()),
        &report,
    );
    Ok(report.outcome)
}

pub async fn get_settings_impl(state: &AppState) -> Result<UserSettings, InfraError> {
    let loaded = state.settings.load().await?;
    if let Some(error) = &loaded.remote_error {
        state.log_error(
            "get_settings",
            &format!("remote settings unavailable, using local copy: {error}"),
        );
    }
    lock_runtime(state)?.settings = loaded.settings.clone();
    Ok(loaded.settings)
}

pub async fn update_settings_impl(
    state: &AppState,
    settings: UserSettings,
) -> Result<SaveOutcome, InfraError> {
    let report = state.settings.save(&settings).await?;
    {
        let mut runtime = lock_runtime(state)?;
        let linked = runtime.settings.telegram_linked;
        runtime.settings = settings;
        if runtime.settings.telegram_linked.is_none() {
            runtime.settings.telegram_linked = linked;
        }
    }
    log_save_report(state, "update_settings", "settings", &report);
    Ok(report.outcome)
}

pub async fn link_telegram_impl(state: &AppState) -> Result<TelegramLinkCode, InfraError> {
    let code = state.settings.link_telegram().await?;
    state.log_info(
        "link_telegram",
        &format!("issued link code expires_at={}", code.expires_at.to_rfc3339()),
    );
    Ok(code)
}

pub async fn unlink_telegram_impl(state: &AppState) -> Result<SaveOutcome, InfraError> {
    let outcome = state.settings.unlink_telegram().await?;
    if outcome.success {
        lock_runtime(state)?.settings.telegram_linked = Some(false);
    }
    state.log_info(
        "unlink_telegram",
        &format!("success={} message={}", outcome.success, outcome.message),
    );
    Ok(outcome)
}

pub fn slot_duration_options_impl() -> Vec<SlotDurationOption> {
    SlotDuration::ALL
        .into_iter()
        .map(|duration| SlotDurationOption {
            minutes: duration.minutes(),
            label: duration.label().to_string(),
        })
        .collect()
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

/// Edits and saves wait until the selected day has been applied.
fn ensure_loaded(session: &PlannerSession) -> Result<(), InfraError> {
    if session.is_loading() {
        return Err(InfraError::InvalidConfig(
            "the selected day is still loading".to_string(),
        ));
    }
    Ok(())
}

fn can_add(session: &PlannerSession) -> bool {
    !session.is_loading() && session.plan().can_add_timebox()
}

fn plan_response(session: &PlannerSession) -> PlanResponse {
    let plan = session.plan();
    PlanResponse {
        date: session.date().to_string(),
        boxes: plan.boxes().to_vec(),
        can_add_timebox: can_add(session),
        can_save: !session.is_loading() && plan.has_labelled_boxes(),
        loading: session.is_loading(),
    }
}

fn parse_patch(input: TimeboxPatchInput) -> Result<TimeboxPatch, InfraError> {
    let parse_time = |value: Option<String>, field: &str| {
        value
            .map(|raw| {
                TimeOfDay::parse_hhmm(&raw)
                    .map_err(|error| InfraError::InvalidConfig(format!("{field}: {error}")))
            })
            .transpose()
    };
    Ok(TimeboxPatch {
        start: parse_time(input.start, "start")?,
        end: parse_time(input.end, "end")?,
        label: input.label,
    })
}

fn log_save_report(state: &AppState, command: &str, subject: &str, report: &SaveReport) {
    match &report.remote_error {
        None => state.log_info(command, &format!("{subject}: {}", report.outcome.message)),
        Some(error) => state.log_error(
            command,
            &format!("{subject}: {} ({error})", report.outcome.message),
        ),
    }
}
