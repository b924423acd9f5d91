use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::db::ensure_valid_key;
use crate::db::repositories::SceneRepository;
use crate::error::{AppError, AppResult};
use crate::models::scene::{Scene, SceneInput};
use crate::services::activation_service::ActivationService;
use crate::services::schedule_utils::{sort_scenes_for_display, wall_clock, Clock};

/// Scene CRUD behind the create, edit, detail and settings screens.
///
/// Never changes `active`; activation state is owned by [`ActivationService`].
/// Every write holds the activation write lock.
pub struct SceneService {
    repository: Arc<dyn SceneRepository>,
    activation: Arc<ActivationService>,
    clock: Arc<dyn Clock>,
    timezone: Option<Tz>,
}

impl SceneService {
    pub fn new(
        repository: Arc<dyn SceneRepository>,
        activation: Arc<ActivationService>,
        clock: Arc<dyn Clock>,
        timezone: Option<Tz>,
    ) -> Self {
        Self {
            repository,
            activation,
            clock,
            timezone,
        }
    }

    /// All scenes, active first and then by next scheduled run.
    pub async fn list_scenes(&self) -> AppResult<Vec<Scene>> {
        let mut scenes: Vec<Scene> = self.repository.list_scenes().await?.into_values().collect();
        let now = wall_clock(self.clock.now(), self.timezone);
        sort_scenes_for_display(&mut scenes, now);
        debug!(target: "app::scenes", count = scenes.len(), "scenes listed");
        Ok(scenes)
    }

    pub async fn get_scene(&self, id: &str) -> AppResult<Scene> {
        ensure_valid_key(id)?;
        self.repository
            .get_scene(id)
            .await?
            .ok_or_else(|| AppError::scene_not_found(id))
    }

    pub async fn create_scene(&self, input: SceneInput) -> AppResult<Scene> {
        let scene = build_scene(input, Scene::new(String::new()))?;
        let _guard = self.activation.lock_writes().await;
        let id = self.repository.create_scene(&scene).await?;
        info!(target: "app::scenes", scene_id = %id, name = %scene.name, "scene created");
        Ok(scene.with_id(id))
    }

    /// Replaces the editable fields; `active` and `history` are kept as
    /// stored at the time of the write.
    pub async fn update_scene(&self, id: &str, input: SceneInput) -> AppResult<Scene> {
        let _guard = self.activation.lock_writes().await;
        let existing = self.get_scene(id).await?;
        let scene = build_scene(input, existing)?;
        self.repository.update_scene(id, &scene).await?;
        info!(target: "app::scenes", scene_id = %id, "scene updated");
        Ok(scene)
    }

    pub async fn delete_scene(&self, id: &str) -> AppResult<()> {
        ensure_valid_key(id)?;
        let _guard = self.activation.lock_writes().await;
        self.repository.delete_scene(id).await?;
        info!(target: "app::scenes", scene_id = %id, "scene deleted");
        Ok(())
    }

    pub async fn delete_all(&self) -> AppResult<()> {
        let _guard = self.activation.lock_writes().await;
        self.repository.clear_all().await?;
        info!(target: "app::scenes", "all scenes deleted");
        Ok(())
    }
}

fn build_scene(input: SceneInput, mut base: Scene) -> AppResult<Scene> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("scene name is required"));
    }

    input.actions.validate()?;
    let schedule = input.schedule.into_schedule()?;

    if !input.actions.any_enabled() {
        warn!(target: "app::scenes", %name, "scene has no device enabled");
    }
    if schedule.enabled && schedule.days.is_empty() {
        warn!(target: "app::scenes", %name, "schedule enabled without days, it will never fire");
    }

    base.name = name.to_string();
    base.description = input
        .description
        .map(|value| value.trim().to_string())
        .unwrap_or_default();
    base.actions = input.actions;
    base.schedule = schedule;
    Ok(base)
}
