use crate::error::RunError;
use crate::pipeline::RunReport;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};

/// Totals of a scheduling session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStats {
    pub runs: u64,
    pub failures: u64,
}

/// Run `job` every `every` until `shutdown` resolves.
///
/// The first run starts immediately. Runs never overlap: a tick that falls
/// due while a run is in flight is skipped. A failed run is logged and the
/// loop waits for the next tick.
pub async fn run_every<F, Fut, S>(every: Duration, label: &str, mut job: F, shutdown: S) -> ScheduleStats
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunReport, RunError>>,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut stats = ScheduleStats::default();
    info!(schedule = %label, every_secs = every.as_secs(), "scheduler started");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(schedule = %label, runs = stats.runs, failures = stats.failures, "scheduler stopping");
                return stats;
            }
            _ = ticker.tick() => {
                stats.runs += 1;
                let span = info_span!("scheduled_run", schedule = %label, n = stats.runs);
                match job().instrument(span).await {
                    Ok(report) => info!(schedule = %label, "{}", report.status_line()),
                    Err(e) => {
                        stats.failures += 1;
                        error!(schedule = %label, error = %e, "scheduled run failed; waiting for next tick");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IngestError, Step};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(Notify::new());

        let job = {
            let calls = calls.clone();
            let stop = stop.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                let stop = stop.clone();
                async move {
                    if n == 3 {
                        stop.notify_one();
                    }
                    if n % 2 == 1 {
                        Err(RunError::new(
                            "f.xlsx",
                            Step::Fetch,
                            IngestError::SourceNotFound("f.xlsx".into()),
                        ))
                    } else {
                        Ok(RunReport::new("f.xlsx"))
                    }
                }
            }
        };

        let waiter = stop.clone();
        let stats = run_every(
            Duration::from_millis(5),
            "test",
            job,
            async move { waiter.notified().await },
        )
        .await;

        assert!(stats.runs >= 3);
        assert!(stats.failures >= 2);
        assert_eq!(stats.runs as usize, calls.load(Ordering::SeqCst));
    }
}
