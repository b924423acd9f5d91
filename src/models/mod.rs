pub mod scene;
pub mod settings;
