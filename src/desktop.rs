use crate::application::bootstrap::bootstrap_workspace;
use crate::application::commands::{
    AppState, AuthStatusResponse, PlanResponse, SelectDateResponse, SlotDurationOption,
    TimeboxPatchInput, add_timebox_impl, can_add_timebox_impl, delete_box_impl,
    get_plan_impl, get_settings_impl, insert_between_impl, is_logged_in_impl,
    link_telegram_impl, login_impl, logout_impl, save_plan_impl, select_date_impl,
    signup_impl, slot_duration_options_impl, unlink_telegram_impl, update_box_impl,
    update_settings_impl,
};
use crate::domain::models::{SaveOutcome, TelegramLinkCode, UserSettings};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
}

#[tauri::command]
fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

#[tauri::command]
async fn login(
    state: tauri::State<'_, AppState>,
    username: String,
    password: String,
) -> Result<AuthStatusResponse, String> {
    login_impl(state.inner(), username, password)
        .await
        .map_err(|error| state.command_error("login", &error))
}

#[tauri::command]
async fn signup(
    state: tauri::State<'_, AppState>,
    username: String,
    password: String,
) -> Result<AuthStatusResponse, String> {
    signup_impl(state.inner(), username, password)
        .await
        .map_err(|error| state.command_error("signup", &error))
}

#[tauri::command]
fn logout(state: tauri::State<'_, AppState>) -> Result<AuthStatusResponse, String> {
    logout_impl(state.inner()).map_err(|error| state.command_error("logout", &error))
}

#[tauri::command]
fn is_logged_in(state: tauri::State<'_, AppState>) -> Result<bool, String> {
    is_logged_in_impl(state.inner()).map_err(|error| state.command_error("is_logged_in", &error))
}

#[tauri::command]
async fn select_date(
    state: tauri::State<'_, AppState>,
    date: Option<String>,
) -> Result<SelectDateResponse, String> {
    select_date_impl(state.inner(), date)
        .await
        .map_err(|error| state.command_error("select_date", &error))
}

#[tauri::command]
fn get_plan(state: tauri::State<'_, AppState>) -> Result<PlanResponse, String> {
    get_plan_impl(state.inner()).map_err(|error| state.command_error("get_plan", &error))
}

#[tauri::command]
fn update_box(
    state: tauri::State<'_, AppState>,
    index: usize,
    patch: TimeboxPatchInput,
) -> Result<PlanResponse, String> {
    update_box_impl(state.inner(), index, patch)
        .map_err(|error| state.command_error("update_box", &error))
}

#[tauri::command]
fn delete_box(state: tauri::State<'_, AppState>, index: usize) -> Result<PlanResponse, String> {
    delete_box_impl(state.inner(), index).map_err(|error| state.command_error("delete_box", &error))
}

#[tauri::command]
fn add_timebox(state: tauri::State<'_, AppState>) -> Result<PlanResponse, String> {
    add_timebox_impl(state.inner()).map_err(|error| state.command_error("add_timebox", &error))
}

#[tauri::command]
fn insert_between(
    state: tauri::State<'_, AppState>,
    index_before: usize,
    stolen_minutes: u32,
) -> Result<PlanResponse, String> {
    insert_between_impl(state.inner(), index_before, stolen_minutes)
        .map_err(|error| state.command_error("insert_between", &error))
}

#[tauri::command]
fn can_add_timebox(state: tauri::State<'_, AppState>) -> Result<bool, String> {
    can_add_timebox_impl(state.inner())
        .map_err(|error| state.command_error("can_add_timebox", &error))
}

#[tauri::command]
async fn save_plan(state: tauri::State<'_, AppState>) -> Result<SaveOutcome, String> {
    save_plan_impl(state.inner())
        .await
        .map_err(|error| state.command_error("save_plan", &error))
}

#[tauri::command]
async fn get_settings(state: tauri::State<'_, AppState>) -> Result<UserSettings, String> {
    get_settings_impl(state.inner())
        .await
        .map_err(|error| state.command_error("get_settings", &error))
}

#[tauri::command]
async fn update_settings(
    state: tauri::State<'_, AppState>,
    settings: UserSettings,
) -> Result<SaveOutcome, String> {
    update_settings_impl(state.inner(), settings)
        .await
        .map_err(|error| state.command_error("update_settings", &error))
}

#[tauri::command]
async fn link_telegram(state: tauri::State<'_, AppState>) -> Result<TelegramLinkCode, String> {
    link_telegram_impl(state.inner())
        .await
        .map_err(|error| state.command_error("link_telegram", &error))
}

#[tauri::command]
async fn unlink_telegram(state: tauri::State<'_, AppState>) -> Result<SaveOutcome, String> {
    unlink_telegram_impl(state.inner())
        .await
        .map_err(|error| state.command_error("unlink_telegram", &error))
}

#[tauri::command]
fn slot_duration_options() -> Vec<SlotDurationOption> {
    slot_duration_options_impl()
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let workspace_root = std::env::current_dir()?;
    let app_state = AppState::new(workspace_root)?;
    app_state.log_info(
        "startup",
        &format!(
            "{} using api={} timezone={}",
            app_state.app_config().app_name,
            app_state.app_config().api_base_url,
            app_state.app_config().timezone
        ),
    );

    tauri::Builder::default()
        .manage(app_state)
        .invoke_handler(tauri::generate_handler![
            bootstrap,
            login,
            signup,
            logout,
            is_logged_in,
            select_date,
            get_plan,
            update_box,
            delete_box,
            add_timebox,
            insert_between,
            can_add_timebox,
            save_plan,
            get_settings,
            update_settings,
            link_telegram,
            unlink_telegram,
            slot_duration_options
        ])
        .run(tauri::generate_context!())?;
    Ok(())
}
