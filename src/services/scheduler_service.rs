use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::db::bounded;
use crate::db::repositories::SceneRepository;
use crate::error::{AppError, AppResult};
use crate::models::scene::{SceneId, SceneMap, TriggerType};
use crate::models::settings::AppSettings;
use crate::services::activation_service::{ActivationReceipt, ActivationService};
use crate::services::schedule_utils::{is_scheduled_now, trigger_minute, wall_clock, Clock};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub tick_interval: StdDuration,
    pub refresh_interval: StdDuration,
    /// Upper bound on a cache refresh.
    pub call_timeout: StdDuration,
    pub timezone: Option<Tz>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        AppSettings::default().into()
    }
}

impl From<AppSettings> for SchedulerConfig {
    fn from(settings: AppSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval,
            refresh_interval: settings.refresh_interval,
            call_timeout: settings.http_timeout,
            timezone: settings.timezone,
        }
    }
}

/// Outcome notifications for hosts that want to surface scheduler activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchedulerEvent {
    #[serde(rename_all = "camelCase")]
    Activated {
        scene_name: String,
        receipt: ActivationReceipt,
    },
    #[serde(rename_all = "camelCase")]
    ActivationFailed { scene_id: SceneId, message: String },
    /// The scene disappeared between the schedule check and activation.
    #[serde(rename_all = "camelCase")]
    Skipped { scene_id: SceneId },
}

/// What one evaluation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub due: Vec<SceneId>,
    pub activated: Option<SceneId>,
    pub failed: Vec<SceneId>,
}

struct CachedScenes {
    scenes: SceneMap,
    fetched_at: Instant,
}

pub struct SchedulerService {
    repository: Arc<dyn SceneRepository>,
    activation: Arc<ActivationService>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    cache: Mutex<Option<CachedScenes>>,
    /// Trigger minute whose scheduled activation is running or has succeeded.
    claimed_minute: StdMutex<Option<NaiveDateTime>>,
    events: broadcast::Sender<SchedulerEvent>,
    running: AtomicBool,
}

impl SchedulerService {
    pub fn new(
        repository: Arc<dyn SceneRepository>,
        activation: Arc<ActivationService>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repository,
            activation,
            clock,
            config,
            cache: Mutex::new(None),
            claimed_minute: StdMutex::new(None),
            events,
            running: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the polling loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) -> AppResult<SchedulerHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::other("scheduler is already running"));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = Arc::clone(self);
        let join = tokio::spawn(async move {
            runner.run_loop(stop_rx).await;
        });

        Ok(SchedulerHandle { stop_tx, join })
    }

    async fn run_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            target: "app::scheduler",
            tick_secs = self.config.tick_interval.as_secs(),
            refresh_secs = self.config.refresh_interval.as_secs(),
            timezone = ?self.config.timezone,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let service = Arc::clone(&self);
                    tokio::spawn(async move {
                        service.tick().await;
                    });
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(target: "app::scheduler", "scheduler stopped");
    }

    /// Runs one evaluation pass over the known scenes.
    ///
    /// Due scenes are tried in id order until one activation succeeds, and at
    /// most one scheduled activation succeeds per trigger minute. Errors are
    /// reported through logs and events and never escape.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let Some(scenes) = self.current_scenes().await else {
            debug!(target: "app::scheduler", "no scene snapshot available, skipping tick");
            return summary;
        };

        let now = wall_clock(self.clock.now(), self.config.timezone);
        summary.evaluated = scenes.len();

        let due: Vec<(SceneId, String)> = scenes
            .values()
            .filter(|scene| scene.schedule.enabled)
            .filter(|scene| is_scheduled_now(&scene.schedule, now))
            .filter(|scene| {
                if scene.active {
                    debug!(target: "app::scheduler", scene_id = %scene.id, "scene already active");
                }
                !scene.active
            })
            .map(|scene| (scene.id.clone(), scene.name.clone()))
            .collect();

        if due.is_empty() {
            return summary;
        }
        summary.due = due.iter().map(|(id, _)| id.clone()).collect();

        let minute = trigger_minute(now);
        if !self.claim_minute(minute) {
            debug!(
                target: "app::scheduler",
                %minute,
                due = ?summary.due,
                "scheduled activation already claimed for this minute"
            );
            return summary;
        }

        for (scene_id, scene_name) in due {
            let result = self
                .activation
                .activate(&scene_id, TriggerType::Automatic)
                .await;

            match result {
                Ok(receipt) => {
                    info!(
                        target: "app::scheduler",
                        %scene_id,
                        scene_name = %scene_name,
                        "scheduled scene activated"
                    );
                    self.emit(SchedulerEvent::Activated {
                        scene_name,
                        receipt,
                    });
                    summary.activated = Some(scene_id);
                    break;
                }
                Err(AppError::SceneNotFound { .. }) => {
                    info!(target: "app::scheduler", %scene_id, "scheduled scene no longer exists");
                    self.emit(SchedulerEvent::Skipped { scene_id });
                }
                Err(err) => {
                    error!(
                        target: "app::scheduler",
                        %scene_id,
                        error = %err,
                        "scheduled activation failed"
                    );
                    self.emit(SchedulerEvent::ActivationFailed {
                        scene_id: scene_id.clone(),
                        message: err.to_string(),
                    });
                    summary.failed.push(scene_id);
                }
            }
        }

        if summary.activated.is_none() {
            self.release_minute(minute);
        }
        self.invalidate_cache().await;
        summary
    }

    /// Replaces the cached scene set with one the host already holds.
    pub async fn push_scenes(&self, scenes: SceneMap) {
        *self.cache.lock().await = Some(CachedScenes {
            scenes,
            fetched_at: Instant::now(),
        });
    }

    pub async fn invalidate_cache(&self) {
        *self.cache.lock().await = None;
    }

    async fn current_scenes(&self) -> Option<SceneMap> {
        let mut cache = self.cache.lock().await;
        let stale = cache
            .as_ref()
            .map_or(true, |cached| cached.fetched_at.elapsed() >= self.config.refresh_interval);

        if stale {
            let refreshed = bounded(
                self.config.call_timeout,
                self.repository.list_scenes(),
                |message| AppError::fetch_failed(message),
            )
            .await;
            match refreshed {
                Ok(scenes) => {
                    debug!(target: "app::scheduler", count = scenes.len(), "scene cache refreshed");
                    *cache = Some(CachedScenes {
                        scenes,
                        fetched_at: Instant::now(),
                    });
                }
                Err(err) => {
                    warn!(
                        target: "app::scheduler",
                        error = %err,
                        has_cache = cache.is_some(),
                        "scene refresh failed"
                    );
                }
            }
        }

        cache.as_ref().map(|cached| cached.scenes.clone())
    }

    fn claim_minute(&self, minute: NaiveDateTime) -> bool {
        let mut claimed = self
            .claimed_minute
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *claimed == Some(minute) {
            return false;
        }
        *claimed = Some(minute);
        true
    }

    fn release_minute(&self, minute: NaiveDateTime) {
        let mut claimed = self
            .claimed_minute
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *claimed == Some(minute) {
            *claimed = None;
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Controls a running scheduler loop. Dropping it also stops the loop.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(err) = self.join.await {
            error!(target: "app::scheduler", error = %err, "scheduler task ended abnormally");
        }
    }
}
