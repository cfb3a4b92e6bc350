use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use spacesync_booking::ExpirySweeper;

use crate::metrics::Metrics;

/// Runs the expiry sweeper every `period` until `shutdown` fires. A pass that
/// has started always runs to completion.
pub fn spawn_expiry_sweeper(
    sweeper: Arc<ExpirySweeper>,
    period: Duration,
    metrics: Metrics,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry sweeper started, every {:?}", period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match sweeper.sweep().await {
                        Ok(expired) => {
                            metrics.sweeper_runs.with_label_values(&["ok"]).inc();
                            metrics.bookings_expired.inc_by(expired as u64);
                        }
                        Err(e) => {
                            metrics.sweeper_runs.with_label_values(&["error"]).inc();
                            error!("Expiry sweep failed: {}", e);
                        }
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    })
}
