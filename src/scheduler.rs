//! Periodic task runner
//!
//! Each task runs on its own interval. A tick that overruns its interval
//! swallows the ticks it missed instead of queueing them, and shutdown lets
//! the in-flight tick finish before the loop exits.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn tick(&self);
}

pub fn spawn_periodic(
    task: Arc<dyn PeriodicTask>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = task.name();
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = name, period_secs = period.as_secs(), "Periodic task started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    task.tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > period {
                        debug!(
                            task = name,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Tick overran its interval, skipping missed ticks"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(task = name, "Periodic task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        ticks: AtomicUsize,
        work: Duration,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn tick(&self) {
            time::sleep(self.work).await;
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval_and_stops() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
            work: Duration::ZERO,
        });
        let (tx, rx) = watch::channel(false);
        let handle = spawn_periodic(counter.clone(), Duration::from_secs(10), rx);

        time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Ticks at t=0, 10, 20
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_tick() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
            work: Duration::from_secs(5),
        });
        let (tx, rx) = watch::channel(false);
        let handle = spawn_periodic(counter.clone(), Duration::from_secs(60), rx);

        // First tick is in flight
        time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
    }
}
