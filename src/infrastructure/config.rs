use crate::domain::models::UserSettings;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

const APP_JSON: &str = "app.json";
const SETTINGS_JSON: &str = "settings.json";
const SCHEMA_VERSION: u64 = 1;
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/api";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub timezone: Tz,
    pub api_base_url: Url,
    pub request_timeout: Duration,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let mut settings = serde_json::to_value(UserSettings::default())
        .unwrap_or_else(|_| serde_json::json!({}));
    if let Some(object) = settings.as_object_mut() {
        object.insert("schema".to_string(), serde_json::json!(SCHEMA_VERSION));
    }

    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": SCHEMA_VERSION,
                "appName": "DayPlan",
                "timezone": DEFAULT_TIMEZONE,
                "apiBaseUrl": DEFAULT_API_BASE_URL,
                "requestTimeoutSeconds": DEFAULT_REQUEST_TIMEOUT_SECONDS
            }),
        ),
        (SETTINGS_JSON, settings),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Fails when either config file is unreadable or carries another schema.
pub fn validate_configs(config_dir: &Path) -> Result<(), InfraError> {
    for name in [APP_JSON, SETTINGS_JSON] {
        read_config(&config_dir.join(name))?;
    }
    Ok(())
}

fn string_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn first_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

pub fn read_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    read_app_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

/// Reads `app.json`, letting `DAYPLAN_API_BASE_URL` and `DAYPLAN_TIMEZONE`
/// override the file.
pub fn read_app_config_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<AppConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;

    let app_name = string_field(&app, "appName").unwrap_or("DayPlan").to_string();

    let timezone_name = first_lookup_value(&lookup, &["DAYPLAN_TIMEZONE"])
        .or_else(|| string_field(&app, "timezone").map(ToOwned::to_owned))
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = timezone_name
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{timezone_name}': {error}")))?;

    let base_url = first_lookup_value(&lookup, &["DAYPLAN_API_BASE_URL"])
        .or_else(|| string_field(&app, "apiBaseUrl").map(ToOwned::to_owned))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let api_base_url = Url::parse(&base_url)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid apiBaseUrl '{base_url}': {error}")))?;
    if api_base_url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "apiBaseUrl '{base_url}' cannot be a base URL"
        )));
    }

    let timeout_seconds = app
        .get("requestTimeoutSeconds")
        .and_then(serde_json::Value::as_u64)
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS);

    Ok(AppConfig {
        app_name,
        timezone,
        api_base_url,
        request_timeout: Duration::from_secs(timeout_seconds),
    })
}

/// The locally cached settings, merged field-by-field over the defaults.
pub fn load_local_settings(config_dir: &Path) -> Result<UserSettings, InfraError> {
    let path = config_dir.join(SETTINGS_JSON);
    if !path.exists() {
        return Ok(UserSettings::default());
    }
    let mut value = read_config(&path)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("schema");
    }
    serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid settings in {}: {error}", path.display()))
    })
}

pub fn save_local_settings(config_dir: &Path, settings: &UserSettings) -> Result<(), InfraError> {
    let mut value = serde_json::to_value(settings)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("settings must serialize to a JSON object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::json!(SCHEMA_VERSION));
    write_config(&config_dir.join(SETTINGS_JSON), &value)
}
