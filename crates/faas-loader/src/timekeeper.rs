use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::util::CompletionToken;

const TICK: Duration = Duration::from_secs(60);

/// Logs every minute boundary of the experiment and stops after `trace_duration` minutes.
pub fn spawn_timekeeper(trace_duration: usize, ready: CompletionToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        drop(ready);
        for minute in 1..=trace_duration {
            ticker.tick().await;
            debug!("Experiment minute {} of {} elapsed", minute, trace_duration);
        }
        info!("Timekeeper reached the end of the trace");
    })
}
