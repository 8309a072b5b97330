#![allow(dead_code)]
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use faas_loader::config::{DriverConfiguration, LoaderConfiguration};
use faas_loader::dispatcher::{DispatchContext, RecordSink};
use faas_loader::function::{Function, PercentileStats};
use faas_loader::invocation::{ExecutionRecord, InvocationOutcome, JobExecutionRecord};
use faas_loader::invoker::{InvocationRequest, Invoker};
use faas_loader::specification::{FunctionSpecification, RuntimeSpecification};

pub fn assert_float_eq(x: f64, y: f64, eps: f64) {
    assert!(x > y - eps && x < y + eps);
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn make_function(name: &str, invocation_stats: Vec<usize>) -> Function {
    let mut f = Function::new(name, invocation_stats);
    f.runtime_stats = PercentileStats::fixed(10);
    f.memory_stats = PercentileStats::fixed(1);
    f
}

pub fn make_configuration(dir: &Path, mode: &str, experiment_duration: usize) -> DriverConfiguration {
    let loader = LoaderConfiguration {
        client_training: mode.to_string(),
        experiment_duration,
        output_path_prefix: dir.join("experiment").display().to_string(),
        specification_dir: dir.join("specs"),
        ..Default::default()
    };
    DriverConfiguration::new(loader)
}

/// Specification with the same IATs in every step, e.g. `[0, 1000000]` fires twice one second apart.
pub fn make_specification(steps: usize, iat: &[f64]) -> FunctionSpecification {
    let slot = RuntimeSpecification {
        runtime: 10,
        memory: 1,
        stats: None,
    };
    FunctionSpecification {
        iat: vec![iat.to_vec(); steps],
        per_minute_count: vec![iat.len(); steps],
        raw_duration: Vec::new(),
        runtime_specification: vec![vec![slot; iat.len()]; steps],
    }
}

pub struct RecordReceivers {
    pub records: mpsc::Receiver<ExecutionRecord>,
    pub job_records: mpsc::Receiver<JobExecutionRecord>,
}

impl RecordReceivers {
    pub fn drain(&mut self) -> Vec<ExecutionRecord> {
        let mut result = Vec::new();
        while let Ok(record) = self.records.try_recv() {
            result.push(record);
        }
        while self.job_records.try_recv().is_ok() {}
        result
    }
}

pub fn make_context(configuration: DriverConfiguration, invoker: Arc<dyn Invoker>) -> (Arc<DispatchContext>, RecordReceivers) {
    let (records_tx, records) = mpsc::channel(1024);
    let (job_records_tx, job_records) = mpsc::channel(1024);
    let context = Arc::new(DispatchContext {
        configuration,
        invoker,
        prompt_functions: Arc::from(Vec::new()),
        admission: None,
        sink: RecordSink::new(records_tx, job_records_tx),
    });
    (context, RecordReceivers { records, job_records })
}

#[derive(Clone, Debug)]
pub struct InvocationCall {
    pub function: String,
    pub invocation_id: String,
    pub runtime_specification: RuntimeSpecification,
    pub time: Instant,
}

/// Returns immediately with a fixed result and remembers every call.
pub struct ScriptedInvoker {
    succeed: bool,
    calls: Mutex<Vec<InvocationCall>>,
}

impl ScriptedInvoker {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<InvocationCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(&self, request: InvocationRequest<'_>) -> InvocationOutcome {
        self.calls.lock().unwrap().push(InvocationCall {
            function: request.function.name.clone(),
            invocation_id: request.invocation_id.to_string(),
            runtime_specification: *request.runtime_specification,
            time: Instant::now(),
        });
        let mut outcome = InvocationOutcome::failed(request.invocation_id, 0);
        outcome.success = self.succeed;
        outcome
    }

    fn name(&self) -> String {
        "ScriptedInvoker".to_string()
    }
}
