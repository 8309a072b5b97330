//! Generation of IAT and runtime specifications from function statistics.
use rand::prelude::*;
use rand_distr::Exp1;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::config::TraceGranularity;
use crate::error::{LoaderError, Result};
use crate::function::Function;
use crate::specification::{FunctionSpecification, RuntimeSpecification};

/// Shape of the arrivals inside one trace step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IatDistribution {
    /// Poisson arrivals, rescaled to fill the step.
    #[default]
    Exponential,
    /// Arrival points drawn uniformly over the step.
    Uniform,
    /// Equal gaps.
    Equidistant,
}

pub struct SpecificationGenerator {
    gen: Pcg64,
}

impl SpecificationGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            gen: Pcg64::seed_from_u64(seed),
        }
    }

    /// Generates IATs for one step of `count` invocations.
    /// Returns the IATs in microseconds and the unscaled samples they were derived from.
    fn generate_step_iat(
        &mut self,
        count: usize,
        distribution: IatDistribution,
        unit_us: f64,
    ) -> (Vec<f64>, Vec<f64>) {
        if count == 0 {
            return (Vec::new(), Vec::new());
        }
        let mut iat = Vec::with_capacity(count);
        iat.push(0.0);
        match distribution {
            IatDistribution::Equidistant => {
                let gap = unit_us / (count as f64);
                iat.extend(std::iter::repeat(gap).take(count - 1));
                (iat, Vec::new())
            }
            IatDistribution::Uniform => {
                let mut points: Vec<f64> = (0..count).map(|_| self.gen.gen_range(0.0..unit_us)).collect();
                points.sort_by(|a, b| a.total_cmp(b));
                for pair in points.windows(2) {
                    iat.push(pair[1] - pair[0]);
                }
                (iat, points)
            }
            IatDistribution::Exponential => {
                let raw: Vec<f64> = (0..count).map(|_| self.gen.sample::<f64, _>(Exp1)).collect();
                let sum: f64 = raw.iter().sum();
                let scale = if sum > 0.0 { unit_us / sum } else { 0.0 };
                iat.extend(raw.iter().take(count - 1).map(|x| x * scale));
                (iat, raw)
            }
        }
    }

    fn generate_runtime_specification(&mut self, function: &Function) -> Result<RuntimeSpecification> {
        let runtime = function.runtime_stats.sample(&mut self.gen);
        let memory = function.memory_stats.sample(&mut self.gen);
        match (runtime, memory) {
            (Some(runtime), Some(memory)) => Ok(RuntimeSpecification {
                runtime,
                memory,
                stats: None,
            }),
            _ => Err(LoaderError::InvalidSpecification {
                function: function.name.clone(),
                reason: "runtime or memory statistics are missing or malformed".to_string(),
            }),
        }
    }

    /// Builds the replay schedule of one function; the result always passes
    /// [`FunctionSpecification::validate`] for that function.
    pub fn generate_invocation_data(
        &mut self,
        function: &Function,
        distribution: IatDistribution,
        granularity: TraceGranularity,
    ) -> Result<FunctionSpecification> {
        let unit_us = granularity.unit().as_micros() as f64;
        let mut spec = FunctionSpecification::default();
        for count in function.invocation_stats.iter().copied() {
            let (iat, raw) = self.generate_step_iat(count, distribution, unit_us);
            let mut runtime = Vec::with_capacity(count);
            for _ in 0..count {
                runtime.push(self.generate_runtime_specification(function)?);
            }
            spec.iat.push(iat);
            spec.raw_duration.extend(raw);
            spec.per_minute_count.push(count);
            spec.runtime_specification.push(runtime);
        }
        Ok(spec)
    }
}
