//! Execution of single invocation attempts.
use std::sync::Arc;

use log::{debug, error};
use tokio::sync::mpsc;

use crate::config::{DriverConfiguration, TraceGranularity};
use crate::function::Function;
use crate::invocation::{ExecutionRecord, ExperimentPhase, JobExecutionRecord};
use crate::invoker::{AdmissionLink, InvocationRequest, Invoker};
use crate::specification::RuntimeSpecification;
use crate::stats::InvocationCounters;
use crate::util::{unix_micros, CompletionToken};

/// `<tag>-<prefix><minute>.inv<index>`, e.g. `trace-func-min3.inv17`.
pub fn compose_invocation_id(tag: &str, granularity: TraceGranularity, minute: usize, index: usize) -> String {
    format!("{}-{}{}.inv{}", tag, granularity.prefix(), minute, index)
}

/// Inbound side of the record collector.
#[derive(Clone)]
pub struct RecordSink {
    records: mpsc::Sender<ExecutionRecord>,
    job_records: mpsc::Sender<JobExecutionRecord>,
}

impl RecordSink {
    pub fn new(records: mpsc::Sender<ExecutionRecord>, job_records: mpsc::Sender<JobExecutionRecord>) -> Self {
        Self { records, job_records }
    }

    /// Hands both records of one invocation to the collector, waiting while its queues are full.
    pub async fn push(&self, record: ExecutionRecord, job_record: JobExecutionRecord) {
        let id = record.invocation_id.clone();
        if self.records.send(record).await.is_err() || self.job_records.send(job_record).await.is_err() {
            error!("Record collector is gone, records of {} are lost", id);
        }
    }
}

/// Experiment-wide state every invocation attempt needs.
pub struct DispatchContext {
    pub configuration: DriverConfiguration,
    pub invoker: Arc<dyn Invoker>,
    pub prompt_functions: Arc<[Arc<Function>]>,
    pub admission: Option<AdmissionLink>,
    pub sink: RecordSink,
}

/// One fired slot.
pub struct DispatchMetadata {
    /// Function chosen by the policy, may differ from the driven one.
    pub function: Arc<Function>,
    pub siblings: Arc<[Arc<Function>]>,
    pub runtime_specification: RuntimeSpecification,
    pub invocation_id: String,
    pub minute: usize,
    pub phase: ExperimentPhase,
    pub counters: Arc<InvocationCounters>,
    /// Released when the attempt is over, whichever way it ends.
    pub token: CompletionToken,
}

/// Performs one invocation attempt and forwards its records to the collector.
pub async fn invoke_function(ctx: Arc<DispatchContext>, metadata: DispatchMetadata) {
    let DispatchMetadata {
        function,
        siblings,
        runtime_specification,
        invocation_id,
        minute,
        phase,
        counters,
        token,
    } = metadata;

    let request = InvocationRequest {
        function: &function,
        siblings: &siblings,
        prompt_functions: &ctx.prompt_functions,
        runtime_specification: &runtime_specification,
        configuration: &ctx.configuration.loader,
        invocation_id: &invocation_id,
        admission: ctx.admission.as_ref(),
    };
    let mut outcome = ctx.invoker.invoke(request).await;

    outcome.record.phase = phase.code();
    if outcome.record.instance.is_empty() {
        outcome.record.instance = function.name.clone();
    }
    outcome.record.invocation_id = invocation_id.clone();
    outcome.job_record.invocation_id = invocation_id;

    if outcome.success {
        counters.record_success();
    } else {
        counters.record_failure(minute);
    }
    debug!(
        "Invocation {} on {} finished, success = {}",
        outcome.record.invocation_id, function.name, outcome.success
    );
    ctx.sink.push(outcome.record, outcome.job_record).await;
    drop(token);
}

/// Record pair of a slot that is not sent to the platform (skipped by the policy or test mode).
pub fn synthesize_records(
    function: &Function,
    invocation_id: String,
    phase: ExperimentPhase,
) -> (ExecutionRecord, JobExecutionRecord) {
    let job_record = JobExecutionRecord::new(&invocation_id);
    let record = ExecutionRecord {
        phase: phase.code(),
        instance: function.name.clone(),
        invocation_id,
        start_time: unix_micros(),
        ..Default::default()
    };
    (record, job_record)
}
