use tokio::sync::RwLock;
use tracing::debug;

use crate::db::ensure_valid_key;
use crate::db::repositories::scene_repository::SceneRepository;
use crate::error::AppResult;
use crate::models::scene::{Scene, SceneId, SceneMap};

/// Scene repository held in process memory, for hosts without a remote
/// store and for tests.
#[derive(Debug, Default)]
pub struct InMemorySceneRepository {
    scenes: RwLock<SceneMap>,
}

impl InMemorySceneRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenes<I>(scenes: I) -> Self
    where
        I: IntoIterator<Item = Scene>,
    {
        let scenes = scenes
            .into_iter()
            .map(|scene| (scene.id.clone(), scene))
            .collect();
        Self {
            scenes: RwLock::new(scenes),
        }
    }

    pub async fn snapshot(&self) -> SceneMap {
        self.scenes.read().await.clone()
    }
}

#[async_trait::async_trait]
impl SceneRepository for InMemorySceneRepository {
    async fn list_scenes(&self) -> AppResult<SceneMap> {
        Ok(self.snapshot().await)
    }

    async fn replace_all(&self, scenes: &SceneMap) -> AppResult<()> {
        let replacement = scenes
            .iter()
            .map(|(id, scene)| (id.clone(), scene.clone().with_id(id.clone())))
            .collect();
        *self.scenes.write().await = replacement;
        Ok(())
    }

    async fn get_scene(&self, id: &str) -> AppResult<Option<Scene>> {
        ensure_valid_key(id)?;
        Ok(self.scenes.read().await.get(id).cloned())
    }

    async fn create_scene(&self, scene: &Scene) -> AppResult<SceneId> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let stored = scene.clone().with_id(id.clone());
        self.scenes.write().await.insert(id.clone(), stored);
        debug!(target: "app::repository", scene_id = %id, "scene created in memory");
        Ok(id)
    }

    async fn update_scene(&self, id: &str, scene: &Scene) -> AppResult<()> {
        ensure_valid_key(id)?;
        let stored = scene.clone().with_id(id);
        self.scenes.write().await.insert(id.to_string(), stored);
        Ok(())
    }

    async fn delete_scene(&self, id: &str) -> AppResult<()> {
        ensure_valid_key(id)?;
        self.scenes.write().await.remove(id);
        Ok(())
    }

    async fn clear_all(&self) -> AppResult<()> {
        self.scenes.write().await.clear();
        Ok(())
    }
}
