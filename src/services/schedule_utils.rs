use std::cmp::Reverse;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::models::scene::{DayOfWeek, Scene, Schedule};

const MINUTES_PER_DAY: i64 = 24 * 60;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock reading of `instant` in `timezone`, or in the process local
/// zone when none is configured.
pub fn wall_clock(instant: DateTime<Utc>, timezone: Option<Tz>) -> NaiveDateTime {
    match timezone {
        Some(tz) => instant.with_timezone(&tz).naive_local(),
        None => instant.with_timezone(&Local).naive_local(),
    }
}

pub fn minutes_from_midnight(time: NaiveTime) -> i64 {
    (time.hour() as i64) * 60 + (time.minute() as i64)
}

/// `now` truncated to the start of its minute.
pub fn trigger_minute(now: NaiveDateTime) -> NaiveDateTime {
    now.with_second(0)
        .and_then(|minute| minute.with_nanosecond(0))
        .unwrap_or(now)
}

/// True when `now` falls in the scene's trigger minute on one of its days.
pub fn is_scheduled_now(schedule: &Schedule, now: NaiveDateTime) -> bool {
    if !schedule.enabled || schedule.days.is_empty() {
        return false;
    }

    let today = DayOfWeek::from(now.weekday());
    schedule.days.contains(&today) && now.format("%H:%M").to_string() == schedule.time
}

/// Minutes from `now` until the schedule next fires; `None` means never.
///
/// The trigger minute itself counts as zero. Once it has passed, the same
/// weekday wraps to the following week.
pub fn minutes_until_next(schedule: &Schedule, now: NaiveDateTime) -> Option<i64> {
    if !schedule.enabled || schedule.days.is_empty() {
        return None;
    }
    let trigger = minutes_from_midnight(schedule.trigger_time()?);
    let current = minutes_from_midnight(now.time());
    let today = now.weekday().num_days_from_monday() as i64;

    schedule
        .days
        .iter()
        .map(|day| {
            let day_offset = (day.days_from_monday() as i64 - today).rem_euclid(7);
            let offset = day_offset * MINUTES_PER_DAY + trigger - current;
            if offset < 0 {
                offset + MINUTES_PER_WEEK
            } else {
                offset
            }
        })
        .min()
}

/// Orders scenes for display: the active scene first, then the one that
/// fires soonest, unscheduled scenes last. Ties keep their input order.
pub fn sort_scenes_for_display(scenes: &mut [Scene], now: NaiveDateTime) {
    scenes.sort_by_key(|scene| {
        (
            Reverse(scene.active),
            minutes_until_next(&scene.schedule, now).unwrap_or(i64::MAX),
        )
    });
}
