pub mod activation_service;
pub mod scene_service;
pub mod schedule_utils;
pub mod scheduler_service;
pub mod settings_service;
