//! Notification queue drainer.
//!
//! Claims queued rows in small batches and hands each one to the Telegram
//! sender. A row that fails to send is recorded and retried on a later
//! cycle until it hits the attempt cap.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::storage::notifications;
use crate::storage::pg::PgPool;
use crate::telegram::MessageSender;

/// Backoff after a failed poll cycle (seconds)
const INITIAL_BACKOFF_SECS: u64 = 5;

/// Maximum backoff between failed poll cycles (seconds)
const MAX_BACKOFF_SECS: u64 = 300;

/// Outcome of a single queue drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    pub sent: usize,
    pub requeued: usize,
}

/// Claims one batch and delivers it. Send failures are recorded per row and
/// do not abort the batch; only storage errors bubble up.
pub async fn drain_once(
    pool: &PgPool,
    sender: &dyn MessageSender,
    batch_size: i64,
    max_attempts: i32,
) -> crate::storage::Result<DrainOutcome> {
    let batch = notifications::claim_batch(pool, batch_size).await?;
    let mut outcome = DrainOutcome::default();

    for notification in batch {
        match sender
            .send(notification.user_id, &notification.message)
            .await
        {
            Ok(()) => {
                notifications::mark_sent(pool, &notification.id).await?;
                outcome.sent += 1;
            }
            Err(err) => {
                warn!(
                    "delivery of notification {} to user {} failed (attempt {}): {:#}",
                    notification.id, notification.user_id, notification.attempts, err
                );
                notifications::mark_failure(
                    pool,
                    &notification.id,
                    &format!("{:#}", err),
                    max_attempts,
                )
                .await?;
                outcome.requeued += 1;
            }
        }
    }

    Ok(outcome)
}

/// Polls the queue until shutdown. A failed cycle backs off with a doubling
/// delay, reset on the next clean cycle.
pub async fn run_notifier(
    pool: PgPool,
    sender: Arc<dyn MessageSender>,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        "notifier started: poll every {}s, batch {}, {} attempts max",
        config.poll_interval_secs, config.batch_size, config.max_attempts
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    let mut backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match drain_once(&pool, sender.as_ref(), config.batch_size, config.max_attempts).await {
                    Ok(outcome) => {
                        backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);
                        if outcome.sent > 0 || outcome.requeued > 0 {
                            info!(
                                "notifier cycle: {} sent, {} kept for retry",
                                outcome.sent, outcome.requeued
                            );
                        }
                    }
                    Err(err) => {
                        error!("notifier cycle failed: {:#}", err);
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("notifier received shutdown signal, stopping");
                    break;
                }
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    cmp::min(current * 2, Duration::from_secs(MAX_BACKOFF_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("chat {} unreachable", chat_id);
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(backoff.as_secs());
            backoff = next_backoff(backoff);
        }

        assert_eq!(&seen[..7], &[5, 10, 20, 40, 80, 160, 300]);
        assert_eq!(seen[9], MAX_BACKOFF_SECS);
    }

    #[tokio::test]
    async fn test_sender_dispatch_through_trait_object() {
        let recorder = Arc::new(RecordingSender::new(false));
        let sender: Arc<dyn MessageSender> = recorder.clone();

        sender.send(7, "first").await.unwrap();
        sender.send(9, "second").await.unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], (7, "first".to_string()));
        assert_eq!(sent[1], (9, "second".to_string()));
    }

    #[tokio::test]
    async fn test_failing_sender_reports_chat() {
        let sender = RecordingSender::new(true);
        let err = sender.send(42, "hello").await.unwrap_err();
        assert!(err.to_string().contains("42"));
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
