pub mod scene;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use crate::db::repositories::{HttpSceneRepository, SceneRepository};
use crate::db::StoreClient;
use crate::error::{AppError, AppResult};
use crate::models::settings::AppSettings;
use crate::services::activation_service::ActivationService;
use crate::services::scene_service::SceneService;
use crate::services::schedule_utils::{Clock, SystemClock};
use crate::services::scheduler_service::{SchedulerConfig, SchedulerService};

/// Everything a host UI needs, wired once and shared.
#[derive(Clone)]
pub struct AppState {
    settings: AppSettings,
    clock: Arc<dyn Clock>,
    scene_service: Arc<SceneService>,
    activation_service: Arc<ActivationService>,
    scheduler_service: Arc<SchedulerService>,
}

impl AppState {
    /// Wires the services against the remote store described by `settings`.
    pub fn new(settings: AppSettings) -> AppResult<Self> {
        let store = StoreClient::new(&settings.base_url, settings.http_timeout)?;
        let repository: Arc<dyn SceneRepository> = Arc::new(HttpSceneRepository::new(store));
        Ok(Self::with_repository(settings, repository, Arc::new(SystemClock)))
    }

    pub fn with_repository(
        settings: AppSettings,
        repository: Arc<dyn SceneRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let activation_service = Arc::new(
            ActivationService::new(Arc::clone(&repository), Arc::clone(&clock))
                .with_history_limit(settings.history_limit)
                .with_call_timeout(settings.http_timeout),
        );
        let scene_service = Arc::new(SceneService::new(
            Arc::clone(&repository),
            Arc::clone(&activation_service),
            Arc::clone(&clock),
            settings.timezone,
        ));
        let scheduler_service = Arc::new(SchedulerService::new(
            repository,
            Arc::clone(&activation_service),
            Arc::clone(&clock),
            SchedulerConfig::from(settings.clone()),
        ));

        Self {
            settings,
            clock,
            scene_service,
            activation_service,
            scheduler_service,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn scenes(&self) -> Arc<SceneService> {
        Arc::clone(&self.scene_service)
    }

    pub fn activation(&self) -> Arc<ActivationService> {
        Arc::clone(&self.activation_service)
    }

    pub fn scheduler(&self) -> Arc<SchedulerService> {
        Arc::clone(&self.scheduler_service)
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation { message, details } => {
                CommandError::new("VALIDATION_ERROR", message, details)
            }
            AppError::SceneNotFound { scene_id } => CommandError::new(
                "NOT_FOUND",
                "the requested scene does not exist",
                Some(serde_json::json!({ "sceneId": scene_id })),
            ),
            AppError::FetchFailed { message } => {
                warn!(target: "app::command", %message, "store read failed in command");
                CommandError::new("FETCH_FAILED", message, None)
            }
            AppError::WriteFailed { message } => {
                warn!(target: "app::command", %message, "store write failed in command");
                CommandError::new("WRITE_FAILED", message, None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
