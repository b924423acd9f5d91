use std::time::Instant;

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::db::repositories::scene_repository::SceneRepository;
use crate::db::StoreClient;
use crate::error::{AppError, AppResult};
use crate::models::scene::{Scene, SceneId, SceneMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn error(self, message: String) -> AppError {
        match self {
            Direction::Read => AppError::fetch_failed(message),
            Direction::Write => AppError::write_failed(message),
        }
    }
}

#[derive(Deserialize)]
struct CreatedKey {
    name: SceneId,
}

/// Scene repository backed by the remote document store over REST.
#[derive(Clone, Debug)]
pub struct HttpSceneRepository {
    store: StoreClient,
}

impl HttpSceneRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    fn error_from_reqwest(&self, err: reqwest::Error, direction: Direction, url: &str) -> AppError {
        if err.is_timeout() {
            direction.error(format!(
                "request to {url} timed out after {}s",
                self.store.timeout().as_secs()
            ))
        } else if err.is_connect() {
            direction.error(format!("could not connect to {url}: {err}"))
        } else if let Some(status) = err.status() {
            map_http_error(status, direction, url)
        } else {
            direction.error(format!("request to {url} failed: {err}"))
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        direction: Direction,
        url: &str,
    ) -> AppResult<Response> {
        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|err| self.error_from_reqwest(err, direction, url))?;

        let status = response.status();
        debug!(
            target: "app::repository",
            %url,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "store request completed"
        );

        if !status.is_success() {
            return Err(map_http_error(status, direction, url));
        }
        Ok(response)
    }

    async fn read_json<T>(&self, response: Response, direction: Direction, url: &str) -> AppResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        response.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                direction.error(format!("invalid JSON from {url}: {err}"))
            } else {
                self.error_from_reqwest(err, direction, url)
            }
        })
    }
}

fn map_http_error(status: StatusCode, direction: Direction, url: &str) -> AppError {
    direction.error(format!(
        "store returned status {} for {url}",
        status.as_u16()
    ))
}

#[async_trait::async_trait]
impl SceneRepository for HttpSceneRepository {
    async fn list_scenes(&self) -> AppResult<SceneMap> {
        let url = self.store.collection_url();
        let response = self
            .send(self.store.http().get(&url), Direction::Read, &url)
            .await?;
        let scenes: Option<SceneMap> = self.read_json(response, Direction::Read, &url).await?;

        let scenes: SceneMap = scenes
            .unwrap_or_default()
            .into_iter()
            .map(|(id, scene)| {
                let scene = scene.with_id(id.clone());
                (id, scene)
            })
            .collect();
        debug!(target: "app::repository", count = scenes.len(), "scenes listed");
        Ok(scenes)
    }

    async fn replace_all(&self, scenes: &SceneMap) -> AppResult<()> {
        let url = self.store.collection_url();
        self.send(self.store.http().put(&url).json(scenes), Direction::Write, &url)
            .await?;
        debug!(target: "app::repository", count = scenes.len(), "scene collection replaced");
        Ok(())
    }

    async fn get_scene(&self, id: &str) -> AppResult<Option<Scene>> {
        let url = self.store.scene_url(id)?;
        let response = self
            .send(self.store.http().get(&url), Direction::Read, &url)
            .await?;
        let scene: Option<Scene> = self.read_json(response, Direction::Read, &url).await?;
        Ok(scene.map(|scene| scene.with_id(id)))
    }

    async fn create_scene(&self, scene: &Scene) -> AppResult<SceneId> {
        let url = self.store.collection_url();
        let response = self
            .send(self.store.http().post(&url).json(scene), Direction::Write, &url)
            .await?;
        let created: CreatedKey = self.read_json(response, Direction::Write, &url).await?;
        debug!(target: "app::repository", scene_id = %created.name, "scene created");
        Ok(created.name)
    }

    async fn update_scene(&self, id: &str, scene: &Scene) -> AppResult<()> {
        let url = self.store.scene_url(id)?;
        self.send(self.store.http().put(&url).json(scene), Direction::Write, &url)
            .await?;
        Ok(())
    }

    async fn delete_scene(&self, id: &str) -> AppResult<()> {
        let url = self.store.scene_url(id)?;
        self.send(self.store.http().delete(&url), Direction::Write, &url)
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> AppResult<()> {
        let url = self.store.collection_url();
        self.send(
            self.store.http().put(&url).json(&serde_json::Value::Null),
            Direction::Write,
            &url,
        )
        .await?;
        warn!(target: "app::repository", "scene collection cleared");
        Ok(())
    }
}
