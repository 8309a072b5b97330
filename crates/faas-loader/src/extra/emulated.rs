//! Invoker that executes the requested work in-process instead of calling a remote function.
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::time::{sleep_until, Instant};

use crate::invocation::InvocationOutcome;
use crate::invoker::{InvocationRequest, Invoker};
use crate::metric::JobSchedRequest;
use crate::util::unix_micros;

/// Memory is allocated in whole pages of this size.
pub const PAGE_SIZE: usize = 4096;

/// Number of pages needed to hold `memory_mib` MiB.
pub fn pages_for(memory_mib: u32) -> usize {
    let bytes = (memory_mib as usize) << 20;
    (bytes + PAGE_SIZE - 1) / PAGE_SIZE
}

fn materialize(pages: usize) -> usize {
    let mut memory = vec![0u8; pages * PAGE_SIZE];
    for page in memory.chunks_mut(PAGE_SIZE) {
        page[0] = 1;
    }
    std::hint::black_box(&memory);
    memory.len()
}

/// Emulates the trace function: allocates and touches the requested memory, then holds the invocation
/// until the requested runtime has passed.
///
/// A requested runtime below 1 ms is erroneous trace data and fails immediately. The allocation runs on
/// the blocking pool; if it alone takes longer than the requested runtime, the invocation fails with a
/// function timeout.
#[derive(Default)]
pub struct EmulatedInvoker {}

impl EmulatedInvoker {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl Invoker for EmulatedInvoker {
    async fn invoke(&self, request: InvocationRequest<'_>) -> InvocationOutcome {
        let spec = *request.runtime_specification;
        let mut outcome = InvocationOutcome::failed(request.invocation_id, unix_micros());
        outcome.record.instance = request.function.name.clone();
        outcome.record.requested_duration = spec.runtime.saturating_mul(1000);
        if spec.runtime < 1 {
            warn!(
                "Erroneous execution time {} ms requested by {}",
                spec.runtime, request.invocation_id
            );
            return outcome;
        }

        let mut replica = 0;
        if let (Some(admission), Some(stats)) = (request.admission, spec.stats) {
            let sched_request = JobSchedRequest {
                invocation_id: request.invocation_id.to_string(),
                function: request.function.name.clone(),
                batch_size: stats.batch_size,
                iterations: stats.iterations,
                deadline: stats.deadline,
                prev_replica: Vec::new(),
            };
            match admission.exchange(sched_request).await {
                Some(reply) => replica = reply.replica.first().copied().unwrap_or(0),
                None => warn!("Admission scheduler is gone, invoking {} anyway", request.invocation_id),
            }
        }

        let start_time = unix_micros();
        let start = Instant::now();
        let runtime = Duration::from_millis(spec.runtime as u64);
        let pages = pages_for(spec.memory);
        let allocated = match tokio::task::spawn_blocking(move || materialize(pages)).await {
            Ok(allocated) => allocated,
            Err(e) => {
                warn!("Allocation for {} failed: {}", request.invocation_id, e);
                return outcome;
            }
        };
        let timeout = start.elapsed() > runtime;
        sleep_until(start + runtime).await;
        let duration = start.elapsed().as_micros() as i64;
        debug!(
            "Emulated {} for {} us with {} bytes",
            request.invocation_id, duration, allocated
        );

        outcome.success = !timeout;
        outcome.record.start_time = start_time;
        outcome.record.function_timeout = timeout;
        outcome.record.response_time = duration;
        outcome.record.actual_duration = u32::try_from(duration).unwrap_or(u32::MAX);
        outcome.record.actual_memory_usage = (allocated / 1024) as u32;
        let stats = spec.stats.unwrap_or_default();
        outcome.job_record.push_execution(
            start_time,
            replica,
            request.function.gpu_count().unwrap_or(0) as i32,
            duration,
            duration,
            (0, stats.iterations, stats.iterations),
            stats.batch_size,
        );
        outcome
    }

    fn name(&self) -> String {
        "EmulatedInvoker".to_string()
    }
}
