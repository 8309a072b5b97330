use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};
use crate::generator::IatDistribution;

/// Time unit the statistics of a trace are expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceGranularity {
    #[default]
    Minute,
    Second,
}

impl TraceGranularity {
    /// Length of one trace step.
    pub fn unit(&self) -> Duration {
        match self {
            TraceGranularity::Minute => Duration::from_secs(60),
            TraceGranularity::Second => Duration::from_secs(1),
        }
    }

    /// Prefix of invocation IDs.
    pub fn prefix(&self) -> &'static str {
        match self {
            TraceGranularity::Minute => "min",
            TraceGranularity::Second => "sec",
        }
    }
}

/// Bounds of the per-function health checks, as relative differences in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub requested_vs_issued_warn: f64,
    pub requested_vs_issued_terminate: f64,
    pub failure_warn: f64,
    pub failure_terminate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            requested_vs_issued_warn: 0.1,
            requested_vs_issued_terminate: 0.2,
            failure_warn: 0.5,
            failure_terminate: 0.75,
        }
    }
}

fn default_bsz_per_device() -> i64 {
    32
}

fn default_serverful_copy_replicas() -> usize {
    4
}

fn default_scraping_period() -> u64 {
    15
}

fn default_output_prefix() -> String {
    "data/out/experiment".to_string()
}

fn default_specification_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_client_training() -> String {
    "knative".to_string()
}

/// Experiment config as stored in YAML or JSON files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoaderConfiguration {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_output_prefix")]
    pub output_path_prefix: String,
    /// Training mode tag, see [`crate::policy::TrainingMode`].
    #[serde(default = "default_client_training")]
    pub client_training: String,
    /// Measured part of the experiment in minutes.
    pub experiment_duration: usize,
    #[serde(default)]
    pub warmup_duration: usize,
    #[serde(default)]
    pub granularity: TraceGranularity,
    #[serde(default)]
    pub iat_distribution: IatDistribution,
    #[serde(default)]
    pub enable_metrics_scrapping: bool,
    #[serde(default = "default_scraping_period")]
    pub metric_scraping_period_seconds: u64,
    #[serde(default)]
    pub with_prompt_bank: bool,
    /// Directory for generated `iat<N>.json` specification files.
    #[serde(default = "default_specification_dir")]
    pub specification_dir: PathBuf,
    #[serde(default = "default_bsz_per_device")]
    pub bsz_per_device: i64,
    #[serde(default = "default_serverful_copy_replicas")]
    pub serverful_copy_replicas: usize,
    #[serde(default)]
    pub thresholds: HealthThresholds,
}

impl Default for LoaderConfiguration {
    fn default() -> Self {
        Self {
            seed: 0,
            output_path_prefix: default_output_prefix(),
            client_training: default_client_training(),
            experiment_duration: 1,
            warmup_duration: 0,
            granularity: TraceGranularity::Minute,
            iat_distribution: IatDistribution::Exponential,
            enable_metrics_scrapping: false,
            metric_scraping_period_seconds: default_scraping_period(),
            with_prompt_bank: false,
            specification_dir: default_specification_dir(),
            bsz_per_device: default_bsz_per_device(),
            serverful_copy_replicas: default_serverful_copy_replicas(),
            thresholds: Default::default(),
        }
    }
}

impl LoaderConfiguration {
    /// Reads the config, YAML for `.yaml`/`.yml` files and JSON otherwise.
    pub fn from_file(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| LoaderError::io(path, e))?;
        let config: Self = match path.extension().and_then(|x| x.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_reader(f)?,
            _ => serde_json::from_reader(f)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.experiment_duration == 0 {
            return Err(LoaderError::Config("experiment_duration must be positive".to_string()));
        }
        if self.bsz_per_device <= 0 {
            return Err(LoaderError::Config("bsz_per_device must be positive".to_string()));
        }
        if self.serverful_copy_replicas == 0 {
            return Err(LoaderError::Config("serverful_copy_replicas must be positive".to_string()));
        }
        if self.enable_metrics_scrapping && self.metric_scraping_period_seconds == 0 {
            return Err(LoaderError::Config(
                "metric_scraping_period_seconds must be positive".to_string(),
            ));
        }
        let t = &self.thresholds;
        for (name, warn, terminate) in [
            (
                "requested_vs_issued",
                t.requested_vs_issued_warn,
                t.requested_vs_issued_terminate,
            ),
            ("failure", t.failure_warn, t.failure_terminate),
        ] {
            if !(0. ..=1.).contains(&warn) || !(0. ..=1.).contains(&terminate) || warn > terminate {
                return Err(LoaderError::Config(format!(
                    "{} thresholds must satisfy 0 <= warn ({}) <= terminate ({}) <= 1",
                    name, warn, terminate
                )));
            }
        }
        Ok(())
    }

    /// Trace duration in minutes, including the profiling minute and warmup if configured.
    pub fn trace_duration(&self) -> usize {
        if self.warmup_duration > 0 {
            self.experiment_duration + self.warmup_duration + 1
        } else {
            self.experiment_duration
        }
    }
}

/// Everything the engine needs to know about one experiment run.
#[derive(Clone, Debug)]
pub struct DriverConfiguration {
    pub loader: LoaderConfiguration,
    /// Number of trace steps to replay.
    pub trace_duration: usize,
    /// Skips the invoker entirely and records every slot as a successful invocation.
    pub test_mode: bool,
    /// Platform manifest handed to the deployer.
    pub manifest_path: PathBuf,
}

impl DriverConfiguration {
    pub fn new(loader: LoaderConfiguration) -> Self {
        let trace_duration = loader.trace_duration();
        Self {
            loader,
            trace_duration,
            test_mode: false,
            manifest_path: PathBuf::from("workloads/container/trace_func_go.yaml"),
        }
    }

    pub fn with_warmup(&self) -> bool {
        self.loader.warmup_duration > 0
    }

    pub fn granularity(&self) -> TraceGranularity {
        self.loader.granularity
    }

    /// Name of an output stream file, e.g. `out_duration_10_ClientTraining_knative.csv`.
    pub fn output_filename(&self, stream: &str, extension: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}_{}_{}_ClientTraining_{}.{}",
            self.loader.output_path_prefix, stream, self.trace_duration, self.loader.client_training, extension
        ))
    }
}
