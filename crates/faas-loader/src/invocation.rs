use serde::{Deserialize, Serialize};

/// Stage of the trace replay an invocation belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentPhase {
    /// Profiling-only minutes at the start of the trace.
    Warmup,
    /// Measured minutes.
    #[default]
    Execution,
}

impl ExperimentPhase {
    pub fn code(&self) -> i32 {
        match self {
            ExperimentPhase::Warmup => 1,
            ExperimentPhase::Execution => 2,
        }
    }
}

/// Timing and result of one invocation attempt, one CSV row of the `duration` output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub phase: i32,
    pub instance: String,
    pub invocation_id: String,
    /// Unix time in microseconds.
    pub start_time: i64,
    /// Microseconds.
    pub requested_duration: u32,
    /// Microseconds from the request being sent until the reply was received.
    pub response_time: i64,
    /// Microseconds the function reported spending on the work.
    pub actual_duration: u32,
    /// KiB.
    pub actual_memory_usage: u32,
    pub memory_allocation_timeout: bool,
    pub connection_timeout: bool,
    pub function_timeout: bool,
}

/// Detailed execution trace of one job, one JSON line of the `joblogs` output.
///
/// All vectors are parallel and hold one entry per retry or replica execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionRecord {
    pub invocation_id: String,
    pub start_time: Vec<i64>,
    pub replica: Vec<i32>,
    pub gpu_count: Vec<i32>,
    pub compute_time: Vec<i64>,
    pub execution_time: Vec<i64>,
    pub start_iteration: Vec<i64>,
    pub end_iteration: Vec<i64>,
    pub total_iteration: Vec<i64>,
    pub batch_size: Vec<i64>,
}

impl JobExecutionRecord {
    pub fn new(invocation_id: &str) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            ..Default::default()
        }
    }

    /// Appends the details of one execution.
    #[allow(clippy::too_many_arguments)]
    pub fn push_execution(
        &mut self,
        start_time: i64,
        replica: i32,
        gpu_count: i32,
        compute_time: i64,
        execution_time: i64,
        iterations: (i64, i64, i64),
        batch_size: i64,
    ) {
        self.start_time.push(start_time);
        self.replica.push(replica);
        self.gpu_count.push(gpu_count);
        self.compute_time.push(compute_time);
        self.execution_time.push(execution_time);
        self.start_iteration.push(iterations.0);
        self.end_iteration.push(iterations.1);
        self.total_iteration.push(iterations.2);
        self.batch_size.push(batch_size);
    }

    pub fn executions(&self) -> usize {
        self.start_time.len()
    }
}

/// What an [`crate::invoker::Invoker`] returns for one attempt. Both records are always present.
#[derive(Clone, Debug, Default)]
pub struct InvocationOutcome {
    pub success: bool,
    pub record: ExecutionRecord,
    pub job_record: JobExecutionRecord,
}

impl InvocationOutcome {
    pub fn failed(invocation_id: &str, start_time: i64) -> Self {
        Self {
            success: false,
            record: ExecutionRecord {
                invocation_id: invocation_id.to_string(),
                start_time,
                ..Default::default()
            },
            job_record: JobExecutionRecord::new(invocation_id),
        }
    }
}
