use serde::Serialize;
use tracing::debug;

use crate::models::scene::{Scene, SceneActions, SceneInput, Schedule, TriggerType};
use crate::services::activation_service::ActivationReceipt;
use crate::services::schedule_utils::{minutes_until_next, wall_clock, Clock};

use super::{AppState, CommandResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub actions: SceneActions,
    pub schedule: Schedule,
    /// Minutes until the next scheduled run; absent when it never runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_until_next: Option<i64>,
    /// Newest first.
    pub history: Vec<HistoryView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub id: String,
    pub date: String,
    #[serde(rename = "type")]
    pub trigger: TriggerType,
}

impl SceneView {
    fn from_scene(scene: Scene, state: &AppState) -> Self {
        let now = wall_clock(state.clock().now(), state.settings().timezone);
        let minutes_until_next = minutes_until_next(&scene.schedule, now);
        let history = scene
            .history_newest_first()
            .into_iter()
            .map(|(id, entry)| HistoryView {
                id: id.clone(),
                date: entry.date.clone(),
                trigger: entry.trigger.clone(),
            })
            .collect();

        SceneView {
            id: scene.id,
            name: scene.name,
            description: scene.description,
            active: scene.active,
            actions: scene.actions,
            schedule: scene.schedule,
            minutes_until_next,
            history,
        }
    }
}

pub async fn scenes_list(state: &AppState) -> CommandResult<Vec<SceneView>> {
    let scenes = state.scenes().list_scenes().await?;
    Ok(scenes
        .into_iter()
        .map(|scene| SceneView::from_scene(scene, state))
        .collect())
}

pub async fn scenes_get(state: &AppState, id: &str) -> CommandResult<SceneView> {
    let scene = state.scenes().get_scene(id).await?;
    Ok(SceneView::from_scene(scene, state))
}

pub async fn scenes_create(state: &AppState, input: SceneInput) -> CommandResult<SceneView> {
    let scene = state.scenes().create_scene(input).await?;
    state.scheduler().invalidate_cache().await;
    Ok(SceneView::from_scene(scene, state))
}

pub async fn scenes_update(
    state: &AppState,
    id: &str,
    input: SceneInput,
) -> CommandResult<SceneView> {
    let scene = state.scenes().update_scene(id, input).await?;
    state.scheduler().invalidate_cache().await;
    Ok(SceneView::from_scene(scene, state))
}

pub async fn scenes_delete(state: &AppState, id: &str) -> CommandResult<()> {
    state.scenes().delete_scene(id).await?;
    state.scheduler().invalidate_cache().await;
    Ok(())
}

pub async fn scenes_delete_all(state: &AppState) -> CommandResult<()> {
    state.scenes().delete_all().await?;
    state.scheduler().invalidate_cache().await;
    Ok(())
}

/// "Activate now" button. Shares the scheduler's activation path.
pub async fn scene_activate(state: &AppState, id: &str) -> CommandResult<ActivationReceipt> {
    let result = state.activation().activate(id, TriggerType::Manual).await;
    state.scheduler().invalidate_cache().await;
    let receipt = result?;
    debug!(target: "app::command", scene_id = %id, "manual activation completed");
    Ok(receipt)
}

pub async fn scene_deactivate(state: &AppState, id: &str) -> CommandResult<()> {
    let result = state.activation().deactivate(id).await;
    state.scheduler().invalidate_cache().await;
    result?;
    Ok(())
}
