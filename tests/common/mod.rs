#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use pool_scenes_lib::db::repositories::{InMemorySceneRepository, SceneRepository};
use pool_scenes_lib::error::{AppError, AppResult};
use pool_scenes_lib::models::scene::{DayOfWeek, Scene, SceneId, SceneMap, Schedule};
use pool_scenes_lib::services::schedule_utils::Clock;

/// Clock pinned to an instant the test controls.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// 2025-01-03 is a Friday.
pub fn friday_at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 3, hour, minute, second)
        .single()
        .expect("valid instant")
}

pub fn scheduled_scene(id: &str, name: &str, days: &[DayOfWeek], time: &str) -> Scene {
    let mut scene = Scene::new(name).with_id(id);
    scene.schedule = Schedule {
        enabled: true,
        days: days.iter().copied().collect::<BTreeSet<_>>(),
        time: time.to_string(),
    };
    scene
}

pub fn active_ids(scenes: &SceneMap) -> Vec<SceneId> {
    scenes
        .values()
        .filter(|scene| scene.active)
        .map(|scene| scene.id.clone())
        .collect()
}

/// In-memory store that can be told to fail or stall.
#[derive(Default)]
pub struct FlakyRepository {
    inner: InMemorySceneRepository,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_delay: Mutex<Option<StdDuration>>,
    lookup_delay: Mutex<Option<StdDuration>>,
    list_calls: AtomicUsize,
    replace_calls: AtomicUsize,
}

impl FlakyRepository {
    pub fn with_scenes<I>(scenes: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Scene>,
    {
        Arc::new(Self {
            inner: InMemorySceneRepository::with_scenes(scenes),
            ..Self::default()
        })
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stall_reads(&self, delay: StdDuration) {
        *self.read_delay.lock().expect("delay lock") = Some(delay);
    }

    /// Delays single-scene reads after they have read the store.
    pub fn stall_lookups(&self, delay: StdDuration) {
        *self.lookup_delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> SceneMap {
        self.inner.snapshot().await
    }

    async fn before_read(&self) -> AppResult<()> {
        let delay = *self.read_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::fetch_failed("injected read failure"));
        }
        Ok(())
    }

    fn before_write(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::write_failed("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SceneRepository for FlakyRepository {
    async fn list_scenes(&self) -> AppResult<SceneMap> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.before_read().await?;
        self.inner.list_scenes().await
    }

    async fn replace_all(&self, scenes: &SceneMap) -> AppResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        self.before_write()?;
        self.inner.replace_all(scenes).await
    }

    async fn get_scene(&self, id: &str) -> AppResult<Option<Scene>> {
        self.before_read().await?;
        let scene = self.inner.get_scene(id).await?;
        let delay = *self.lookup_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(scene)
    }

    async fn create_scene(&self, scene: &Scene) -> AppResult<SceneId> {
        self.before_write()?;
        self.inner.create_scene(scene).await
    }

    async fn update_scene(&self, id: &str, scene: &Scene) -> AppResult<()> {
        self.before_write()?;
        self.inner.update_scene(id, scene).await
    }

    async fn delete_scene(&self, id: &str) -> AppResult<()> {
        self.before_write()?;
        self.inner.delete_scene(id).await
    }

    async fn clear_all(&self) -> AppResult<()> {
        self.before_write()?;
        self.inner.clear_all().await
    }
}
