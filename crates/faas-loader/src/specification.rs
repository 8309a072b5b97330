//! Per-function replay schedule and its on-disk form.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};
use crate::function::Function;

/// Statistics attached to a slot right before it is dispatched in resource-aware training modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeStats {
    pub iterations: i64,
    pub batch_size: i64,
    pub deadline: i64,
}

/// Resources requested by one invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSpecification {
    /// Milliseconds.
    pub runtime: u32,
    /// MiB.
    pub memory: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ModeStats>,
}

/// Generated once per function before the replay starts.
///
/// `iat[m][i]` is the number of microseconds to wait after invocation `i - 1` of step `m` before firing
/// invocation `i`; the first slot of a step is conventionally 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpecification {
    #[serde(rename = "IAT")]
    pub iat: Vec<Vec<f64>>,
    #[serde(rename = "PerMinuteCount")]
    pub per_minute_count: Vec<usize>,
    #[serde(rename = "RawDuration")]
    pub raw_duration: Vec<f64>,
    #[serde(rename = "RuntimeSpecification")]
    pub runtime_specification: Vec<Vec<RuntimeSpecification>>,
}

impl FunctionSpecification {
    /// Checks that every step holds exactly as many slots as the function requests in it.
    pub fn validate(&self, function: &Function) -> Result<()> {
        let invalid = |reason: String| LoaderError::InvalidSpecification {
            function: function.name.clone(),
            reason,
        };
        if self.iat.len() != function.invocation_stats.len()
            || self.runtime_specification.len() != function.invocation_stats.len()
        {
            return Err(invalid(format!(
                "{} IAT steps and {} runtime steps for a trace of {} steps",
                self.iat.len(),
                self.runtime_specification.len(),
                function.invocation_stats.len()
            )));
        }
        for (minute, count) in function.invocation_stats.iter().enumerate() {
            if self.iat[minute].len() != *count || self.runtime_specification[minute].len() != *count {
                return Err(invalid(format!(
                    "step {} has {} IATs and {} runtime specifications, expected {}",
                    minute,
                    self.iat[minute].len(),
                    self.runtime_specification[minute].len(),
                    count
                )));
            }
        }
        Ok(())
    }
}

pub fn specification_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("iat{}.json", index))
}

pub fn save_specification(dir: &Path, index: usize, spec: &FunctionSpecification) -> Result<()> {
    let path = specification_path(dir, index);
    let f = File::create(&path).map_err(|e| LoaderError::io(&path, e))?;
    let mut writer = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut writer, spec)?;
    writer.flush().map_err(|e| LoaderError::io(&path, e))
}

pub fn load_specification(dir: &Path, index: usize) -> Result<FunctionSpecification> {
    let path = specification_path(dir, index);
    let f = File::open(&path).map_err(|e| LoaderError::io(&path, e))?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}
