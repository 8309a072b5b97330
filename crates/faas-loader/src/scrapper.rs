//! Periodic sampling of cluster and platform metrics.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::DriverConfiguration;
use crate::error::Result;
use crate::metric::{ClusterUsage, KnStats};
use crate::output::{create_output_file, spawn_csv_writer, spawn_json_lines_writer};
use crate::util::{unix_micros, CompletionToken};

/// Source of cluster metrics, e.g. the metrics API of the platform.
#[async_trait]
pub trait ClusterScraper: Send + Sync {
    async fn scrape_cluster_usage(&self) -> ClusterUsage;

    async fn scrape_kn_stats(&self) -> KnStats;
}

/// Running scrapper, stopped explicitly by the orchestrator.
pub struct ScrapperHandle {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<u64>>,
}

impl ScrapperHandle {
    /// Stops sampling and waits until all samples are persisted. Returns the number of samples taken.
    pub async fn stop(self) -> Result<u64> {
        let _ = self.stop.send(());
        self.handle.await?
    }
}

/// Starts sampling `scraper` every `metric_scraping_period_seconds`, the first sample is taken one
/// period after the start.
pub fn spawn_scrapper(
    configuration: &DriverConfiguration,
    scraper: Arc<dyn ClusterScraper>,
    ready: CompletionToken,
) -> Result<ScrapperHandle> {
    let usage_path = configuration.output_filename("cluster_usage", "json");
    let kn_stats_path = configuration.output_filename("kn_stats", "csv");
    let usage_file = create_output_file(&usage_path)?;
    let kn_stats_file = create_output_file(&kn_stats_path)?;
    let (usage_tx, usage_rx) = mpsc::channel::<ClusterUsage>(16);
    let (kn_stats_tx, kn_stats_rx) = mpsc::channel::<KnStats>(16);
    let usage_writer = spawn_json_lines_writer(usage_path, usage_file, usage_rx);
    let kn_stats_writer = spawn_csv_writer(kn_stats_path, kn_stats_file, kn_stats_rx);

    let period = Duration::from_secs(configuration.loader.metric_scraping_period_seconds);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        drop(ready);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut samples: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let mut usage = scraper.scrape_cluster_usage().await;
                    usage.timestamp = unix_micros();
                    let mut kn_stats = scraper.scrape_kn_stats().await;
                    kn_stats.timestamp = unix_micros();
                    if usage_tx.send(usage).await.is_err() || kn_stats_tx.send(kn_stats).await.is_err() {
                        break;
                    }
                    samples += 1;
                    debug!("Scraped cluster metrics, sample {}", samples);
                }
            }
        }
        drop(usage_tx);
        drop(kn_stats_tx);
        usage_writer.await??;
        kn_stats_writer.await??;
        info!("Metrics scrapper stopped after {} samples", samples);
        Ok(samples)
    });
    Ok(ScrapperHandle { stop: stop_tx, handle })
}
