use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::db::bounded;
use crate::db::repositories::SceneRepository;
use crate::error::{AppError, AppResult};
use crate::models::scene::{SceneId, SceneMap, TriggerType};
use crate::services::schedule_utils::Clock;

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReceipt {
    pub scene_id: SceneId,
    pub history_key: String,
    pub trigger: String,
    pub activated_at: String,
    /// Scenes that were active before this write and no longer are.
    pub deactivated: Vec<SceneId>,
}

/// Marks one scene active and every other scene inactive.
///
/// Manual and scheduled activations must both go through this service: its
/// lock is what keeps two read-modify-write cycles from interleaving within
/// this process.
pub struct ActivationService {
    repository: Arc<dyn SceneRepository>,
    clock: Arc<dyn Clock>,
    history_limit: Option<usize>,
    call_timeout: StdDuration,
    write_lock: Mutex<()>,
}

impl ActivationService {
    pub fn new(repository: Arc<dyn SceneRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            history_limit: None,
            call_timeout: StdDuration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_call_timeout(mut self, timeout: StdDuration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub async fn activate(
        &self,
        scene_id: &str,
        trigger: TriggerType,
    ) -> AppResult<ActivationReceipt> {
        let _guard = self.lock_writes().await;

        let snapshot = self
            .bounded(self.repository.list_scenes(), |message| {
                AppError::fetch_failed(message)
            })
            .await?;
        let (replacement, receipt) = build_activation(
            snapshot,
            scene_id,
            trigger,
            self.clock.now(),
            self.history_limit,
        )?;

        self.bounded(self.repository.replace_all(&replacement), |message| {
            AppError::write_failed(message)
        })
        .await?;

        info!(
            target: "app::activation",
            scene_id = %receipt.scene_id,
            trigger = %receipt.trigger,
            deactivated = ?receipt.deactivated,
            "scene activated"
        );
        Ok(receipt)
    }

    /// Stops a running scene without activating another one.
    pub async fn deactivate(&self, scene_id: &str) -> AppResult<()> {
        let _guard = self.lock_writes().await;

        let mut scene = self
            .bounded(self.repository.get_scene(scene_id), |message| {
                AppError::fetch_failed(message)
            })
            .await?
            .ok_or_else(|| AppError::scene_not_found(scene_id))?;

        if !scene.active {
            debug!(target: "app::activation", %scene_id, "scene already inactive");
            return Ok(());
        }

        scene.active = false;
        self.bounded(
            self.repository.update_scene(scene_id, &scene),
            |message| AppError::write_failed(message),
        )
        .await?;
        info!(target: "app::activation", %scene_id, "scene deactivated");
        Ok(())
    }

    /// Write lock shared by activation and scene edits; held until the guard
    /// is dropped.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    async fn bounded<T, F, E>(&self, call: F, on_timeout: E) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
        E: FnOnce(String) -> AppError,
    {
        bounded(self.call_timeout, call, on_timeout).await
    }
}

/// Computes the full replacement collection for activating `scene_id`.
///
/// The target gets `active = true` and one new history entry; every other
/// scene gets `active = false` and keeps its history as is.
pub fn build_activation(
    mut snapshot: SceneMap,
    scene_id: &str,
    trigger: TriggerType,
    at: DateTime<Utc>,
    history_limit: Option<usize>,
) -> AppResult<(SceneMap, ActivationReceipt)> {
    if !snapshot.contains_key(scene_id) {
        return Err(AppError::scene_not_found(scene_id));
    }

    let mut deactivated = Vec::new();
    let mut history_key = String::new();

    for (id, scene) in snapshot.iter_mut() {
        if id == scene_id {
            scene.active = true;
            history_key = scene.record_activation(trigger.clone(), at);
            if let Some(limit) = history_limit {
                scene.truncate_history(limit);
            }
        } else {
            if scene.active {
                deactivated.push(id.clone());
            }
            scene.active = false;
        }
    }

    let receipt = ActivationReceipt {
        scene_id: scene_id.to_string(),
        history_key,
        trigger: trigger.to_string(),
        activated_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        deactivated,
    };
    Ok((snapshot, receipt))
}
