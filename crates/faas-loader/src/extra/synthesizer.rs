//! Synthetic traces with a linear load ramp.
use rand::distributions::Alphanumeric;
use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};
use crate::function::{Function, PercentileStats};

const HASH_LENGTH: usize = 64;

/// Ramp settings. Every function gets the same load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    pub functions: usize,
    /// First RPS level.
    pub beginning: usize,
    /// Last RPS level, inclusive if reachable from `beginning` in whole steps.
    pub target: usize,
    pub step: usize,
    /// Minutes each level is held.
    pub duration: usize,
    /// Execution time in milliseconds.
    pub execution: u32,
    /// Memory in MiB.
    pub memory: u32,
    pub seed: u64,
}

fn hash<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(HASH_LENGTH)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Invocations per minute of the ramp.
pub fn ramp(config: &SynthesizerConfig) -> Result<Vec<usize>> {
    if config.step == 0 {
        return Err(LoaderError::Config("synthesizer step must be positive".to_string()));
    }
    let mut result = Vec::new();
    for rps in (config.beginning..=config.target).step_by(config.step) {
        result.extend(std::iter::repeat(60 * rps).take(config.duration));
    }
    Ok(result)
}

pub fn synthesize_functions(config: &SynthesizerConfig) -> Result<Vec<Function>> {
    let mut rng = Pcg64::seed_from_u64(config.seed);
    let invocations = ramp(config)?;
    let functions = (0..config.functions)
        .map(|_| {
            let mut f = Function::new(&hash(&mut rng), invocations.clone());
            f.runtime_stats = PercentileStats::fixed(config.execution);
            f.memory_stats = PercentileStats::fixed(config.memory);
            f
        })
        .collect();
    Ok(functions)
}
