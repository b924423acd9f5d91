use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub base_url: String,
    pub tick_interval: StdDuration,
    pub refresh_interval: StdDuration,
    pub http_timeout: StdDuration,
    /// Zone used to read wall-clock time; process local time when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<Tz>,
    /// Maximum history entries kept on a scene when it is activated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}
