//! Background sweeps.
//!
//! The reaper closes orphaned sessions; the billing sweep runs monthly renewals,
//! end-of-period cancellations and grace expiry. Both are safe to run on every
//! instance at once: each write is conditional in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use vent_core::VentError;

use crate::state::AppState;

/// Counts from one pass of every sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions closed by the reaper.
    pub reaped: usize,
    /// Subscriptions renewed or cancelled at period end.
    pub renewed: usize,
    /// Subscriptions cancelled after their grace period.
    pub expired: usize,
    /// Sweeps that failed this pass; the others still ran.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SweepFailure>,
}

/// A sweep that failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    /// Sweep name: `reaper`, `renewals` or `grace_expiry`.
    pub sweep: &'static str,
    /// Error message.
    pub error: String,
}

fn settle(
    sweep: &'static str,
    result: Result<usize, VentError>,
    failures: &mut Vec<SweepFailure>,
) -> usize {
    result.unwrap_or_else(|e| {
        tracing::warn!(sweep, error = %e, "Sweep failed");
        failures.push(SweepFailure {
            sweep,
            error: e.to_string(),
        });
        0
    })
}

/// Run every sweep once, now. A failing sweep does not stop the others.
pub async fn run_sweeps(state: &AppState) -> SweepReport {
    let now = Utc::now();
    let reaped = state.ledger.reap(now).await;
    let renewed = state.billing.run_renewals(now).await;
    let expired = state.billing.expire_grace(now).await;

    let mut failures = Vec::new();
    SweepReport {
        reaped: settle("reaper", reaped, &mut failures),
        renewed: settle("renewals", renewed, &mut failures),
        expired: settle("grace_expiry", expired, &mut failures),
        failures,
    }
}

/// Spawn the periodic sweeps. They stop when `shutdown` flips to `true`.
pub fn spawn(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let reaper_every = Duration::from_secs(state.config.reaper_interval_seconds.max(1));
    let billing_every = Duration::from_secs(state.config.billing_sweep_interval_seconds.max(1));

    let reaper = {
        let state = state.clone();
        every(reaper_every, shutdown.clone(), move || {
            let state = state.clone();
            async move {
                match state.ledger.reap(Utc::now()).await {
                    Ok(0) => {}
                    Ok(reaped) => tracing::info!(reaped, "Reaper pass complete"),
                    Err(e) => tracing::warn!(error = %e, "Reaper pass failed"),
                }
            }
        })
    };

    let billing = every(billing_every, shutdown, move || {
        let state = state.clone();
        async move {
            let now = Utc::now();
            match state.billing.run_renewals(now).await {
                Ok(0) => {}
                Ok(renewed) => tracing::info!(renewed, "Renewal pass complete"),
                Err(e) => tracing::warn!(error = %e, "Renewal pass failed"),
            }
            match state.billing.expire_grace(now).await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "Grace expiry pass complete"),
                Err(e) => tracing::warn!(error = %e, "Grace expiry pass failed"),
            }
        }
    });

    vec![reaper, billing]
}

fn every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, task: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => task().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Sweep task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vent_store::MemoryStore;

    fn state(store: Arc<MemoryStore>) -> AppState {
        let config = ServiceConfig {
            store_timeout_ms: 200,
            ..ServiceConfig::default()
        };
        AppState::new(store, config).unwrap()
    }

    #[tokio::test]
    async fn every_sweep_runs_when_storage_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);

        let report = run_sweeps(&state(store)).await;

        let failed: Vec<_> = report.failures.iter().map(|f| f.sweep).collect();
        assert_eq!(failed, ["reaper", "renewals", "grace_expiry"]);
        assert_eq!((report.reaped, report.renewed, report.expired), (0, 0, 0));
    }

    #[tokio::test]
    async fn clean_pass_reports_no_failures() {
        let report = run_sweeps(&state(Arc::new(MemoryStore::new()))).await;
        assert_eq!(report, SweepReport::default());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("failures").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_runs_until_shutdown() {
        let (tx, rx) = watch::channel(false);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = every(Duration::from_secs(10), rx, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Ticks at 0s, 10s and 20s.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
