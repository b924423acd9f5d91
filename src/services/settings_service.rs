use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::settings::AppSettings;

const KEY_BASE_URL: &str = "POOL_SCENES_BASE_URL";
const KEY_TICK_SECS: &str = "POOL_SCENES_TICK_SECS";
const KEY_REFRESH_SECS: &str = "POOL_SCENES_REFRESH_SECS";
const KEY_HTTP_TIMEOUT_SECS: &str = "POOL_SCENES_HTTP_TIMEOUT_SECS";
const KEY_TIMEZONE: &str = "POOL_SCENES_TIMEZONE";
const KEY_HISTORY_LIMIT: &str = "POOL_SCENES_HISTORY_LIMIT";
const KEY_LOG_DIR: &str = "POOL_SCENES_LOG_DIR";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9000";
const DEFAULT_TICK_SECS: u64 = 10;
const DEFAULT_REFRESH_SECS: u64 = 30;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tick_interval: StdDuration::from_secs(DEFAULT_TICK_SECS),
            refresh_interval: StdDuration::from_secs(DEFAULT_REFRESH_SECS),
            http_timeout: StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            timezone: None,
            history_limit: None,
            log_dir: None,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    /// Reads `POOL_SCENES_*` variables from the process environment.
    pub fn from_env() -> AppResult<AppSettings> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> AppResult<AppSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let mut settings = AppSettings::default();

        if let Some(base_url) = value(KEY_BASE_URL) {
            settings.base_url = normalize_base_url(&base_url)?;
        }
        if let Some(raw) = value(KEY_TICK_SECS) {
            settings.tick_interval = parse_seconds(KEY_TICK_SECS, &raw)?;
        }
        if let Some(raw) = value(KEY_REFRESH_SECS) {
            settings.refresh_interval = parse_seconds(KEY_REFRESH_SECS, &raw)?;
        }
        if let Some(raw) = value(KEY_HTTP_TIMEOUT_SECS) {
            settings.http_timeout = parse_seconds(KEY_HTTP_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = value(KEY_TIMEZONE) {
            let tz = raw.parse::<Tz>().map_err(|err| {
                AppError::validation_with_details(
                    "unknown timezone",
                    json!({ "key": KEY_TIMEZONE, "value": raw, "error": err.to_string() }),
                )
            })?;
            settings.timezone = Some(tz);
        }
        if let Some(raw) = value(KEY_HISTORY_LIMIT) {
            settings.history_limit = Some(parse_positive(KEY_HISTORY_LIMIT, &raw)? as usize);
        }
        if let Some(raw) = value(KEY_LOG_DIR) {
            settings.log_dir = Some(PathBuf::from(raw));
        }

        if settings.tick_interval > settings.refresh_interval {
            debug!(
                target: "app::config",
                tick_secs = settings.tick_interval.as_secs(),
                refresh_secs = settings.refresh_interval.as_secs(),
                "refresh interval shorter than tick, scenes are fetched every tick"
            );
        }

        info!(
            target: "app::config",
            base_url = %settings.base_url,
            tick_secs = settings.tick_interval.as_secs(),
            refresh_secs = settings.refresh_interval.as_secs(),
            timezone = ?settings.timezone,
            history_limit = ?settings.history_limit,
            "settings loaded"
        );
        Ok(settings)
    }
}

fn normalize_base_url(raw: &str) -> AppResult<String> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(AppError::validation_with_details(
            "base url must start with http:// or https://",
            json!({ "key": KEY_BASE_URL, "value": raw }),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_positive(key: &str, raw: &str) -> AppResult<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(AppError::validation_with_details(
            "expected a positive integer",
            json!({ "key": key, "value": raw }),
        )),
    }
}

fn parse_seconds(key: &str, raw: &str) -> AppResult<StdDuration> {
    parse_positive(key, raw).map(StdDuration::from_secs)
}
