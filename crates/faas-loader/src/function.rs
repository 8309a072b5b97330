use std::fs::File;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// Suffix of GPU-count variants of one logical function, e.g. `resnet-gpu-4`.
pub const GPU_VARIANT_SEPARATOR: &str = "-gpu-";
/// Suffix of serverful replicas of one logical function, e.g. `bert-serverful-copy-2`.
pub const SERVERFUL_COPY_SEPARATOR: &str = "-serverful-copy-";

/// Empirical distribution given by cumulative percentiles (in `[0, 1]`, increasing) and the values at them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileStats {
    pub percentiles: Vec<f64>,
    pub values: Vec<u32>,
}

impl PercentileStats {
    pub fn fixed(value: u32) -> Self {
        Self {
            percentiles: vec![1.0],
            values: vec![value],
        }
    }

    /// Draws one value: picks a uniform point in `[0, 1)` and returns the value of the bucket it falls into.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u32> {
        if self.values.is_empty() || self.values.len() != self.percentiles.len() {
            return None;
        }
        let p = rng.gen_range(0.0..1.0);
        for (i, perc) in self.percentiles.iter().enumerate() {
            if p < *perc {
                return Some(self.values[i]);
            }
        }
        self.values.last().copied()
    }
}

/// One function of the replayed trace together with its pre-computed statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Address of the deployed function, filled in by the deployer.
    #[serde(default)]
    pub endpoint: String,
    /// Number of invocations per trace step.
    pub invocation_stats: Vec<usize>,
    /// Per-invocation batch sizes, indexed by issue order.
    #[serde(default)]
    pub batch_stats: Vec<i64>,
    /// Per-invocation iteration counts, indexed by issue order.
    #[serde(default)]
    pub iteration_stats: Vec<i64>,
    /// Per-invocation deadlines, indexed by issue order.
    #[serde(default)]
    pub deadline_stats: Vec<i64>,
    /// Execution time in milliseconds.
    #[serde(default)]
    pub runtime_stats: PercentileStats,
    /// Memory in MiB.
    #[serde(default)]
    pub memory_stats: PercentileStats,
}

impl Function {
    pub fn new(name: &str, invocation_stats: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            invocation_stats,
            ..Default::default()
        }
    }

    pub fn total_invocations(&self) -> usize {
        self.invocation_stats.iter().sum()
    }

    /// Requested invocations in the given trace step, zero past the end of the trace.
    pub fn invocations_at(&self, minute: usize) -> usize {
        self.invocation_stats.get(minute).copied().unwrap_or(0)
    }

    /// Number of GPUs encoded in the trailing `-<n>` token of the name.
    pub fn gpu_count(&self) -> Option<i64> {
        self.name.rsplit('-').next().and_then(|x| x.parse::<i64>().ok())
    }

    /// Name without GPU-variant or serverful-copy suffix.
    pub fn logical_name(&self) -> &str {
        logical_name(&self.name)
    }
}

pub fn logical_name(name: &str) -> &str {
    for sep in [GPU_VARIANT_SEPARATOR, SERVERFUL_COPY_SEPARATOR] {
        if let Some((prefix, _)) = name.split_once(sep) {
            return prefix;
        }
    }
    name
}

/// Reads a JSON array of functions.
pub fn load_functions(path: &Path) -> Result<Vec<Function>> {
    let f = File::open(path).map_err(|e| LoaderError::io(path, e))?;
    let functions: Vec<Function> = serde_json::from_reader(f)?;
    Ok(functions)
}

pub fn save_functions(path: &Path, functions: &[Function]) -> Result<()> {
    let f = File::create(path).map_err(|e| LoaderError::io(path, e))?;
    serde_json::to_writer_pretty(f, functions)?;
    Ok(())
}
