//! Daily deadline reminder scans.
//!
//! Each scan runs once per day at a configured UTC wall-clock time. The
//! due-soon scan catches tasks whose deadline falls inside the lookahead
//! window; the overdue scan catches tasks already past it. Both enqueue
//! rows for the notifier, deduplicated per task and calendar day so a
//! task reminds at most once daily per kind.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use teloxide::utils::html::escape;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::storage::pg::PgPool;
use crate::storage::tasks::ReminderTask;
use crate::storage::{notifications, tasks};

/// Which daily scan to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    DueSoon,
    Overdue,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DueSoon => "due_soon",
            JobKind::Overdue => "overdue",
        }
    }
}

/// Parses a "HH:MM" wall-clock time. Rejects out-of-range components.
pub fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (hour, minute) = s.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Next UTC instant the given wall-clock time comes around. A time equal
/// to `now` counts as already passed, so a job that just fired reschedules
/// for tomorrow instead of re-firing.
fn next_occurrence(now: DateTime<Utc>, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let today = now.date_naive().and_hms_opt(hour, minute, 0)?;
    let at = Utc.from_utc_datetime(&today);
    if at > now {
        Some(at)
    } else {
        Some(at + chrono::Duration::days(1))
    }
}

/// Earliest upcoming scan. `None` only when the configured times do not
/// parse, which startup validation already rejects.
pub fn next_job(now: DateTime<Utc>, config: &WorkerConfig) -> Option<(JobKind, DateTime<Utc>)> {
    let (ds_hour, ds_minute) = parse_hhmm(&config.due_soon_at)?;
    let (od_hour, od_minute) = parse_hhmm(&config.overdue_at)?;

    let due_soon = next_occurrence(now, ds_hour, ds_minute)?;
    let overdue = next_occurrence(now, od_hour, od_minute)?;

    if due_soon <= overdue {
        Some((JobKind::DueSoon, due_soon))
    } else {
        Some((JobKind::Overdue, overdue))
    }
}

pub fn due_soon_dedup_key(task_id: &Uuid, day: NaiveDate) -> String {
    format!("due_soon:{}:{}", task_id, day.format("%Y-%m-%d"))
}

pub fn overdue_dedup_key(task_id: &Uuid, day: NaiveDate) -> String {
    format!("overdue:{}:{}", task_id, day.format("%Y-%m-%d"))
}

/// Telegram HTML for a deadline inside the lookahead window.
pub fn due_soon_message(task: &ReminderTask) -> String {
    format!(
        "⏰ Task <b>{}</b> in <b>{}</b> is due {}.",
        escape(&task.title),
        escape(&task.focus_title),
        task.due_at.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Telegram HTML for a deadline already missed.
pub fn overdue_message(task: &ReminderTask) -> String {
    format!(
        "⚠️ Task <b>{}</b> in <b>{}</b> was due {} and is still open.",
        escape(&task.title),
        escape(&task.focus_title),
        task.due_at.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Queues due-soon reminders, one per matching task per day. Returns how
/// many rows the dedup filter let through.
pub async fn scan_due_soon(pool: &PgPool, window_hours: i32) -> crate::storage::Result<usize> {
    let matched = tasks::list_due_soon(pool, window_hours).await?;
    let today = Utc::now().date_naive();

    let mut enqueued = 0;
    for task in &matched {
        let key = due_soon_dedup_key(&task.task_id, today);
        let inserted = notifications::enqueue(
            pool,
            task.notify_user_id,
            notifications::KIND_TASK_DUE_SOON,
            &due_soon_message(task),
            Some(&key),
        )
        .await?;
        if inserted {
            enqueued += 1;
        }
    }

    debug!(
        "due-soon scan matched {} tasks, queued {}",
        matched.len(),
        enqueued
    );
    Ok(enqueued)
}

/// Queues overdue reminders, one per matching task per day.
pub async fn scan_overdue(pool: &PgPool) -> crate::storage::Result<usize> {
    let matched = tasks::list_overdue(pool).await?;
    let today = Utc::now().date_naive();

    let mut enqueued = 0;
    for task in &matched {
        let key = overdue_dedup_key(&task.task_id, today);
        let inserted = notifications::enqueue(
            pool,
            task.notify_user_id,
            notifications::KIND_TASK_OVERDUE,
            &overdue_message(task),
            Some(&key),
        )
        .await?;
        if inserted {
            enqueued += 1;
        }
    }

    debug!(
        "overdue scan matched {} tasks, queued {}",
        matched.len(),
        enqueued
    );
    Ok(enqueued)
}

async fn run_job(pool: &PgPool, config: &WorkerConfig, kind: JobKind) {
    let outcome = match kind {
        JobKind::DueSoon => scan_due_soon(pool, config.due_soon_window_hours).await,
        JobKind::Overdue => scan_overdue(pool).await,
    };

    match outcome {
        Ok(enqueued) => info!("{} scan queued {} notifications", kind.as_str(), enqueued),
        Err(err) => error!("{} scan failed: {:#}", kind.as_str(), err),
    }
}

/// Sleeps until the next scheduled scan and runs it, until shutdown.
/// With `scan_on_start` both scans also run immediately, useful after
/// downtime that skipped a scheduled slot.
pub async fn run_reminders(
    pool: PgPool,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    scan_on_start: bool,
) {
    info!(
        "reminder scheduler started: due-soon at {} UTC, overdue at {} UTC",
        config.due_soon_at, config.overdue_at
    );

    if scan_on_start {
        run_job(&pool, &config, JobKind::DueSoon).await;
        run_job(&pool, &config, JobKind::Overdue).await;
    }

    loop {
        let Some((kind, at)) = next_job(Utc::now(), &config) else {
            error!("reminder times failed to parse, scheduler stopped");
            return;
        };

        let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!("next reminder scan {} at {}", kind.as_str(), at);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                run_job(&pool, &config, kind).await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("reminder scheduler received shutdown signal, stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    fn config(due_soon_at: &str, overdue_at: &str) -> WorkerConfig {
        WorkerConfig {
            due_soon_at: due_soon_at.to_string(),
            overdue_at: overdue_at.to_string(),
            ..WorkerConfig::default()
        }
    }

    fn reminder(title: &str, focus_title: &str) -> ReminderTask {
        ReminderTask {
            task_id: Uuid::nil(),
            title: title.to_string(),
            focus_title: focus_title.to_string(),
            due_at: Utc.with_ymd_and_hms(2026, 3, 11, 17, 30, 0).unwrap(),
            notify_user_id: 1,
        }
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:00"), Some((9, 0)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
        assert_eq!(parse_hhmm("0:0"), Some((0, 0)));

        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("09:60"), None);
        assert_eq!(parse_hhmm("0900"), None);
        assert_eq!(parse_hhmm("09:00:00"), None);
        assert_eq!(parse_hhmm("morning"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn test_next_job_before_both_scans() {
        let (kind, when) = next_job(at(8, 0), &config("09:00", "09:30")).unwrap();
        assert_eq!(kind, JobKind::DueSoon);
        assert_eq!(when, at(9, 0));
    }

    #[test]
    fn test_next_job_between_scans() {
        let (kind, when) = next_job(at(9, 15), &config("09:00", "09:30")).unwrap();
        assert_eq!(kind, JobKind::Overdue);
        assert_eq!(when, at(9, 30));
    }

    #[test]
    fn test_next_job_after_both_rolls_to_tomorrow() {
        let (kind, when) = next_job(at(10, 0), &config("09:00", "09:30")).unwrap();
        assert_eq!(kind, JobKind::DueSoon);
        assert_eq!(when, at(9, 0) + chrono::Duration::days(1));
    }

    #[test]
    fn test_next_job_exact_hit_reschedules() {
        // A scan firing at its own slot must not immediately fire again.
        let (kind, when) = next_job(at(9, 0), &config("09:00", "09:30")).unwrap();
        assert_eq!(kind, JobKind::Overdue);
        assert_eq!(when, at(9, 30));
    }

    #[test]
    fn test_next_job_across_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 58, 0).unwrap();
        let (kind, when) = next_job(now, &config("00:05", "23:55")).unwrap();
        assert_eq!(kind, JobKind::DueSoon);
        assert_eq!(when, Utc.with_ymd_and_hms(2026, 3, 11, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_next_job_tie_prefers_due_soon() {
        let (kind, _) = next_job(at(8, 0), &config("09:00", "09:00")).unwrap();
        assert_eq!(kind, JobKind::DueSoon);
    }

    #[test]
    fn test_next_job_rejects_bad_times() {
        assert!(next_job(at(8, 0), &config("25:00", "09:30")).is_none());
    }

    #[test]
    fn test_dedup_keys_are_stable_per_day() {
        let task_id = Uuid::nil();
        let day = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();

        assert_eq!(
            due_soon_dedup_key(&task_id, day),
            "due_soon:00000000-0000-0000-0000-000000000000:2026-03-10"
        );
        assert_eq!(
            overdue_dedup_key(&task_id, day),
            "overdue:00000000-0000-0000-0000-000000000000:2026-03-10"
        );

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        assert_ne!(due_soon_dedup_key(&task_id, day), due_soon_dedup_key(&task_id, next_day));
    }

    #[test]
    fn test_messages_escape_html() {
        let task = reminder("Close <deal> & ship", "Q2 <Launch>");

        let due_soon = due_soon_message(&task);
        assert!(due_soon.contains("Close &lt;deal&gt; &amp; ship"));
        assert!(due_soon.contains("Q2 &lt;Launch&gt;"));
        assert!(due_soon.contains("2026-03-11 17:30 UTC"));

        let overdue = overdue_message(&task);
        assert!(overdue.contains("&lt;deal&gt;"));
        assert!(overdue.contains("still open"));
    }
}
