//! Per-function trace replay.
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

use crate::config::{DriverConfiguration, HealthThresholds, TraceGranularity};
use crate::dispatcher::{compose_invocation_id, invoke_function, synthesize_records, DispatchContext, DispatchMetadata};
use crate::error::{LoaderError, Result};
use crate::function::Function;
use crate::invocation::ExperimentPhase;
use crate::policy::{Dispatch, InvocationPolicy, PolicyContext};
use crate::specification::{FunctionSpecification, ModeStats};
use crate::stats::{ExperimentCounters, InvocationCounters};
use crate::util::CompletionBarrier;

/// Kind of a health check, selects the thresholds to compare against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthCheck {
    RequestedVsIssued,
    IssuedVsFailed,
}

impl HealthCheck {
    fn thresholds(&self, thresholds: &HealthThresholds) -> (f64, f64) {
        match self {
            HealthCheck::RequestedVsIssued => (
                thresholds.requested_vs_issued_warn,
                thresholds.requested_vs_issued_terminate,
            ),
            HealthCheck::IssuedVsFailed => (thresholds.failure_warn, thresholds.failure_terminate),
        }
    }
}

/// Compares `real` against `ideal` through `(ideal - real) / ideal`.
///
/// Returns `Ok(false)` if the relative difference reached the termination threshold and the replay
/// should stop. A difference outside of `[0, 1]` means the bookkeeping is broken and is an error.
pub fn is_request_target_achieved(
    ideal: i64,
    real: i64,
    check: HealthCheck,
    thresholds: &HealthThresholds,
) -> Result<bool> {
    if ideal == 0 {
        return Ok(true);
    }
    let ratio = ((ideal - real) as f64) / (ideal as f64);
    if !(0. ..=1.).contains(&ratio) {
        return Err(LoaderError::InvalidRatio { ideal, real });
    }
    let (warn_threshold, terminate_threshold) = check.thresholds(thresholds);
    if ratio >= terminate_threshold {
        return Ok(false);
    }
    if ratio > 0. && ratio >= warn_threshold {
        warn!(
            "{:?} check is close to its limit: ideal = {}, real = {}, ratio = {:.3}",
            check, ideal, real, ratio
        );
    }
    Ok(true)
}

/// Result of one driver, handed back to the orchestrator together with the specification it owned.
pub struct FunctionReport {
    pub index: usize,
    pub name: String,
    pub successful: i64,
    pub failed: i64,
    pub issued: i64,
    /// The replay was stopped by a health check before the end of the trace.
    pub terminated_early: bool,
    pub specification: FunctionSpecification,
}

struct ReplayState {
    minute: usize,
    invocation_index: usize,
    issued: u64,
    phase: ExperimentPhase,
    start_of_minute: Instant,
    previous_iat_sum: i64,
}

impl ReplayState {
    fn new(with_warmup: bool) -> Self {
        // with warmup the first minute only serves for profiling
        let (minute, phase) = if with_warmup {
            (1, ExperimentPhase::Warmup)
        } else {
            (0, ExperimentPhase::Execution)
        };
        Self {
            minute,
            invocation_index: 0,
            issued: 0,
            phase,
            start_of_minute: Instant::now(),
            previous_iat_sum: 0,
        }
    }

    /// Runs the health checks of the finished minute and moves to the next one.
    /// Returns `Ok(false)` if the replay has to stop.
    fn proceed_to_next_minute(
        &mut self,
        function: &Function,
        counters: &InvocationCounters,
        configuration: &DriverConfiguration,
        skip: bool,
    ) -> Result<bool> {
        let granularity = configuration.granularity();
        if granularity == TraceGranularity::Minute {
            let thresholds = &configuration.loader.thresholds;
            let requested = function.invocations_at(self.minute) as i64;
            let issued = self.invocation_index as i64;
            if !is_request_target_achieved(requested, issued, HealthCheck::RequestedVsIssued, thresholds)? {
                warn!(
                    "Function {} issued {} of {} invocations in minute {}, stopping",
                    function.name, issued, requested, self.minute
                );
                return Ok(false);
            }
            for minute in 0..=self.minute {
                let requested = function.invocations_at(minute) as i64;
                let failed = counters.failed_at(minute);
                if !is_request_target_achieved(
                    requested,
                    requested - failed,
                    HealthCheck::IssuedVsFailed,
                    thresholds,
                )? {
                    warn!(
                        "Function {} failed {} of {} invocations in minute {}, stopping",
                        function.name, failed, requested, minute
                    );
                    return Ok(false);
                }
            }
        }

        self.minute += 1;
        self.invocation_index = 0;
        self.previous_iat_sum = 0;
        if configuration.with_warmup() && self.minute == configuration.loader.warmup_duration + 1 {
            self.phase = ExperimentPhase::Execution;
            info!("Function {} entered the execution phase", function.name);
        }
        let now = Instant::now();
        self.start_of_minute = if skip { now + granularity.unit() } else { now };
        Ok(true)
    }
}

/// Replays the trace of one function, firing its invocations at the IATs of its specification.
pub struct FunctionDriver {
    index: usize,
    function: Arc<Function>,
    siblings: Arc<[Arc<Function>]>,
    specification: FunctionSpecification,
    context: Arc<DispatchContext>,
    policy: Arc<dyn InvocationPolicy>,
    totals: Arc<ExperimentCounters>,
}

impl FunctionDriver {
    pub fn new(
        index: usize,
        function: Arc<Function>,
        siblings: Arc<[Arc<Function>]>,
        specification: FunctionSpecification,
        context: Arc<DispatchContext>,
        policy: Arc<dyn InvocationPolicy>,
        totals: Arc<ExperimentCounters>,
    ) -> Self {
        Self {
            index,
            function,
            siblings,
            specification,
            context,
            policy,
            totals,
        }
    }

    /// Statistics the platform needs for the `issued`-th invocation, if the function carries them.
    fn mode_stats(&self, issued: u64) -> Option<ModeStats> {
        let i = (issued as usize).checked_sub(1)?;
        Some(ModeStats {
            iterations: *self.function.iteration_stats.get(i)?,
            batch_size: *self.function.batch_stats.get(i)?,
            deadline: *self.function.deadline_stats.get(i)?,
        })
    }

    fn missing_slot(&self, minute: usize, index: usize) -> LoaderError {
        LoaderError::InvalidSpecification {
            function: self.function.name.clone(),
            reason: format!("no slot {} in step {}", index, minute),
        }
    }

    pub async fn run(mut self) -> Result<FunctionReport> {
        let context = self.context.clone();
        let configuration = &context.configuration;
        let granularity = configuration.granularity();
        let unit = granularity.unit();
        let counters = Arc::new(InvocationCounters::new(configuration.trace_duration));
        let in_flight = CompletionBarrier::new();
        let mut state = ReplayState::new(configuration.with_warmup());
        let mut terminated_early = false;

        debug!("Starting replay of function {}", self.function.name);
        while state.minute < configuration.trace_duration {
            let requested = self.function.invocations_at(state.minute);
            if requested == 0 {
                if !state.proceed_to_next_minute(&self.function, &counters, configuration, true)? {
                    terminated_early = true;
                    break;
                }
                sleep(unit).await;
                continue;
            }

            let iat = *self
                .specification
                .iat
                .get(state.minute)
                .and_then(|x| x.get(state.invocation_index))
                .ok_or_else(|| self.missing_slot(state.minute, state.invocation_index))?;
            let elapsed = state.start_of_minute.elapsed().as_micros() as i64;
            let sleep_for = iat as i64 - (elapsed - state.previous_iat_sum);
            if sleep_for > 0 {
                sleep(Duration::from_micros(sleep_for as u64)).await;
            }
            state.previous_iat_sum += iat as i64;
            state.issued += 1;

            let dispatch = self.policy.resolve(&PolicyContext {
                function: &self.function,
                siblings: &self.siblings,
                issued: state.issued,
            });
            let invocation_id =
                compose_invocation_id(&self.function.name, granularity, state.minute, state.invocation_index);
            match dispatch {
                Dispatch::Fire(target) if !configuration.test_mode => {
                    let stats = self.mode_stats(state.issued);
                    let (minute, index) = (state.minute, state.invocation_index);
                    let slot = match self
                        .specification
                        .runtime_specification
                        .get_mut(minute)
                        .and_then(|x| x.get_mut(index))
                    {
                        Some(slot) => slot,
                        None => return Err(self.missing_slot(minute, index)),
                    };
                    if stats.is_some() {
                        slot.stats = stats;
                    }
                    let metadata = DispatchMetadata {
                        function: target,
                        siblings: self.siblings.clone(),
                        runtime_specification: *slot,
                        invocation_id,
                        minute,
                        phase: state.phase,
                        counters: counters.clone(),
                        token: in_flight.token(),
                    };
                    tokio::spawn(invoke_function(context.clone(), metadata));
                }
                _ => {
                    let (record, job_record) = synthesize_records(&self.function, invocation_id, state.phase);
                    context.sink.push(record, job_record).await;
                    counters.record_success();
                }
            }

            state.invocation_index += 1;
            if state.invocation_index == requested || state.start_of_minute.elapsed() > unit {
                // let invocations that have already returned publish their outcome
                tokio::task::yield_now().await;
                if !state.proceed_to_next_minute(&self.function, &counters, configuration, false)? {
                    terminated_early = true;
                    break;
                }
            }
        }

        in_flight.wait().await;
        let (successful, failed, issued) = (counters.successful(), counters.failed(), state.issued as i64);
        self.totals.add(successful, failed, issued);
        debug!(
            "Function {} finished: {} issued, {} successful, {} failed",
            self.function.name, issued, successful, failed
        );
        Ok(FunctionReport {
            index: self.index,
            name: self.function.name.clone(),
            successful,
            failed,
            issued,
            terminated_early,
            specification: self.specification,
        })
    }
}
