#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use common::{friday_at, scheduled_scene, FixedClock, FlakyRepository};
use pool_scenes_lib::models::scene::{DayOfWeek, Scene, SceneMap, TriggerType};
use pool_scenes_lib::services::activation_service::ActivationService;
use pool_scenes_lib::services::scheduler_service::{
    SchedulerConfig, SchedulerEvent, SchedulerService,
};

struct Harness {
    repository: Arc<FlakyRepository>,
    clock: Arc<FixedClock>,
    scheduler: Arc<SchedulerService>,
}

fn harness(scenes: Vec<Scene>, now: chrono::DateTime<chrono::Utc>) -> Harness {
    let repository = FlakyRepository::with_scenes(scenes);
    let clock = FixedClock::at(now);
    let activation = Arc::new(ActivationService::new(repository.clone(), clock.clone()));
    let config = SchedulerConfig {
        tick_interval: StdDuration::from_secs(10),
        refresh_interval: StdDuration::from_secs(30),
        call_timeout: StdDuration::from_secs(10),
        timezone: Some(chrono_tz::UTC),
    };
    let scheduler = Arc::new(SchedulerService::new(
        repository.clone(),
        activation,
        clock.clone(),
        config,
    ));

    Harness {
        repository,
        clock,
        scheduler,
    }
}

fn party() -> Scene {
    scheduled_scene("party", "Party", &[DayOfWeek::Fri], "20:00")
}

#[tokio::test]
async fn friday_party_fires_once_in_its_minute() {
    let h = harness(
        vec![party(), Scene::new("Relax").with_id("relax")],
        friday_at(20, 0, 3),
    );

    let summary = h.scheduler.tick().await;
    assert_eq!(summary.due, vec!["party".to_string()]);
    assert_eq!(summary.activated.as_deref(), Some("party"));

    let stored = h.repository.snapshot().await;
    assert!(stored["party"].active);
    assert!(!stored["relax"].active);
    let entries: Vec<_> = stored["party"].history.values().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].trigger, TriggerType::Automatic);

    // Later ticks in the same minute see the scene already active.
    h.clock.set(friday_at(20, 0, 13));
    let again = h.scheduler.tick().await;
    assert!(again.due.is_empty());
    assert_eq!(again.activated, None);
    assert_eq!(h.repository.snapshot().await["party"].history.len(), 1);
}

#[tokio::test]
async fn nothing_fires_outside_the_trigger_minute() {
    let h = harness(vec![party()], friday_at(20, 1, 0));

    let summary = h.scheduler.tick().await;

    assert_eq!(summary.evaluated, 1);
    assert!(summary.due.is_empty());
    assert_eq!(h.repository.replace_calls(), 0);
}

#[tokio::test]
async fn disabled_schedule_is_ignored() {
    let mut scene = party();
    scene.schedule.enabled = false;
    let h = harness(vec![scene], friday_at(20, 0, 0));

    let summary = h.scheduler.tick().await;

    assert!(summary.due.is_empty());
    assert!(!h.repository.snapshot().await["party"].active);
}

#[tokio::test]
async fn failed_activation_is_retried_on_a_later_tick() {
    let h = harness(vec![party()], friday_at(20, 0, 0));
    let mut events = h.scheduler.subscribe();

    h.repository.fail_writes(true);
    let failed = h.scheduler.tick().await;
    assert_eq!(failed.failed, vec!["party".to_string()]);
    assert_eq!(failed.activated, None);
    match events.try_recv().expect("failure event") {
        SchedulerEvent::ActivationFailed { scene_id, .. } => assert_eq!(scene_id, "party"),
        other => panic!("unexpected event {other:?}"),
    }

    h.repository.fail_writes(false);
    h.clock.set(friday_at(20, 0, 10));
    let retried = h.scheduler.tick().await;
    assert_eq!(retried.activated.as_deref(), Some("party"));
    assert!(matches!(
        events.try_recv().expect("activation event"),
        SchedulerEvent::Activated { .. }
    ));
}

#[tokio::test]
async fn unreadable_store_without_cache_skips_the_tick() {
    let h = harness(vec![party()], friday_at(20, 0, 0));
    h.repository.fail_reads(true);

    let summary = h.scheduler.tick().await;

    assert_eq!(summary.evaluated, 0);
    assert_eq!(h.repository.replace_calls(), 0);
}

#[tokio::test]
async fn only_the_first_due_scene_is_activated() {
    let h = harness(
        vec![
            scheduled_scene("b-second", "Second", &[DayOfWeek::Fri], "20:00"),
            scheduled_scene("a-first", "First", &[DayOfWeek::Fri], "20:00"),
        ],
        friday_at(20, 0, 0),
    );

    let summary = h.scheduler.tick().await;

    assert_eq!(summary.due, vec!["a-first".to_string(), "b-second".to_string()]);
    assert_eq!(summary.activated.as_deref(), Some("a-first"));
    let stored = h.repository.snapshot().await;
    assert!(stored["a-first"].active);
    assert!(stored["b-second"].history.is_empty());
}

#[tokio::test]
async fn scenes_sharing_a_minute_do_not_take_turns() {
    let h = harness(
        vec![
            scheduled_scene("a-first", "First", &[DayOfWeek::Fri], "20:00"),
            scheduled_scene("b-second", "Second", &[DayOfWeek::Fri], "20:00"),
        ],
        friday_at(20, 0, 0),
    );

    let mut fired = Vec::new();
    for second in [0, 10, 20, 30, 40, 50] {
        h.clock.set(friday_at(20, 0, second));
        if let Some(id) = h.scheduler.tick().await.activated {
            fired.push(id);
        }
    }

    assert_eq!(fired, vec!["a-first".to_string()]);
    assert_eq!(h.repository.replace_calls(), 1);
    let stored = h.repository.snapshot().await;
    assert!(stored["a-first"].active);
    assert_eq!(stored["a-first"].history.len(), 1);
    assert!(stored["b-second"].history.is_empty());

    // Next week's trigger minute is a new claim.
    h.clock.set(friday_at(20, 0, 0) + chrono::Duration::days(7));
    let next_week = h.scheduler.tick().await;
    assert_eq!(next_week.activated.as_deref(), Some("b-second"));
}

#[tokio::test]
async fn scene_removed_before_activation_is_skipped() {
    let h = harness(Vec::new(), friday_at(20, 0, 0));
    let mut events = h.scheduler.subscribe();
    let pushed: SceneMap = [("party".to_string(), party())].into_iter().collect();
    h.scheduler.push_scenes(pushed).await;

    let summary = h.scheduler.tick().await;

    assert_eq!(summary.activated, None);
    assert!(summary.failed.is_empty());
    assert_eq!(
        events.try_recv().expect("skip event"),
        SchedulerEvent::Skipped {
            scene_id: "party".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn cached_scenes_are_reused_until_the_refresh_interval() {
    let h = harness(vec![party()], friday_at(9, 0, 0));

    h.scheduler.tick().await;
    h.scheduler.tick().await;
    assert_eq!(h.repository.list_calls(), 1);

    tokio::time::advance(StdDuration::from_secs(31)).await;
    h.scheduler.tick().await;
    assert_eq!(h.repository.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_refresh_gives_up_after_the_call_timeout() {
    let h = harness(vec![party()], friday_at(20, 0, 0));
    h.repository.stall_reads(StdDuration::from_secs(600));
    let started = tokio::time::Instant::now();

    let (first, second) = tokio::join!(h.scheduler.tick(), h.scheduler.tick());

    assert_eq!(first.evaluated, 0);
    assert_eq!(second.evaluated, 0);
    assert!(started.elapsed() < StdDuration::from_secs(600));
    assert_eq!(h.repository.replace_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn started_loop_activates_and_stops_on_shutdown() {
    let h = harness(vec![party()], friday_at(20, 0, 0));
    let mut events = h.scheduler.subscribe();

    let handle = h.scheduler.start().expect("scheduler starts");
    assert!(h.scheduler.is_running());
    assert!(h.scheduler.start().is_err());

    let event = tokio::time::timeout(StdDuration::from_secs(60), events.recv())
        .await
        .expect("event before timeout")
        .expect("channel open");
    match event {
        SchedulerEvent::Activated {
            scene_name,
            receipt,
        } => {
            assert_eq!(scene_name, "Party");
            assert_eq!(receipt.trigger, "AUTOMATIC");
        }
        other => panic!("unexpected event {other:?}"),
    }

    handle.shutdown().await;
    assert!(!h.scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_loop() {
    let h = harness(Vec::new(), friday_at(9, 0, 0));

    let handle = h.scheduler.start().expect("scheduler starts");
    drop(handle);

    for _ in 0..100 {
        if !h.scheduler.is_running() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(!h.scheduler.is_running());
}
