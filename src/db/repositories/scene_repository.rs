use crate::error::AppResult;
use crate::models::scene::{Scene, SceneId, SceneMap};

/// Access to the stored scene collection.
///
/// The store has no transactions; `replace_all` is the only way to change
/// several scenes in one write and the last writer wins.
#[async_trait::async_trait]
pub trait SceneRepository: Send + Sync {
    /// Fresh snapshot of every scene, ids filled in. An empty store yields an
    /// empty map.
    async fn list_scenes(&self) -> AppResult<SceneMap>;

    /// Overwrites the whole collection with `scenes`.
    async fn replace_all(&self, scenes: &SceneMap) -> AppResult<()>;

    async fn get_scene(&self, id: &str) -> AppResult<Option<Scene>>;

    /// Stores a new scene and returns the id assigned to it.
    async fn create_scene(&self, scene: &Scene) -> AppResult<SceneId>;

    async fn update_scene(&self, id: &str, scene: &Scene) -> AppResult<()>;

    async fn delete_scene(&self, id: &str) -> AppResult<()>;

    /// Removes every scene.
    async fn clear_all(&self) -> AppResult<()>;
}
