pub mod http_scene_repository;
pub mod memory_scene_repository;
pub mod scene_repository;

pub use http_scene_repository::HttpSceneRepository;
pub use memory_scene_repository::InMemorySceneRepository;
pub use scene_repository::SceneRepository;
