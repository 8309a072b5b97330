mod common;
use common::make_function;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use faas_loader::config::LoaderConfiguration;
use faas_loader::error::LoaderError;
use faas_loader::extra::emulated::{pages_for, EmulatedInvoker, PAGE_SIZE};
use faas_loader::extra::synthesizer::{ramp, synthesize_functions, SynthesizerConfig};
use faas_loader::function::Function;
use faas_loader::invocation::InvocationOutcome;
use faas_loader::invoker::{InvocationRequest, Invoker};
use faas_loader::specification::{ModeStats, RuntimeSpecification};

async fn invoke(function: &Arc<Function>, spec: RuntimeSpecification) -> InvocationOutcome {
    let configuration = LoaderConfiguration::default();
    EmulatedInvoker::new()
        .invoke(InvocationRequest {
            function,
            siblings: &[],
            prompt_functions: &[],
            runtime_specification: &spec,
            configuration: &configuration,
            invocation_id: "func-min0.inv0",
            admission: None,
        })
        .await
}

#[test]
fn test_pages() {
    assert_eq!(PAGE_SIZE, 4096);
    assert_eq!(pages_for(0), 0);
    assert_eq!(pages_for(1), 256);
    assert_eq!(pages_for(3), 768);
}

#[tokio::test(start_paused = true)]
async fn test_emulated_invocation() {
    let function = Arc::new(make_function("func-gpu-2", vec![1]));
    let spec = RuntimeSpecification {
        runtime: 100,
        memory: 2,
        stats: Some(ModeStats {
            iterations: 50,
            batch_size: 64,
            deadline: 1000,
        }),
    };
    let outcome = invoke(&function, spec).await;
    assert!(outcome.success);
    assert_eq!(outcome.record.instance, "func-gpu-2");
    assert_eq!(outcome.record.invocation_id, "func-min0.inv0");
    assert_eq!(outcome.record.requested_duration, 100_000);
    assert!(outcome.record.actual_duration >= 100_000);
    assert_eq!(outcome.record.actual_memory_usage, 2048);
    assert!(!outcome.record.function_timeout);

    let job = &outcome.job_record;
    assert_eq!(job.invocation_id, "func-min0.inv0");
    assert_eq!(job.executions(), 1);
    assert_eq!(job.gpu_count, vec![2]);
    assert_eq!(job.total_iteration, vec![50]);
    assert_eq!(job.batch_size, vec![64]);
}

#[tokio::test(start_paused = true)]
async fn test_emulated_rejects_zero_runtime() {
    let function = Arc::new(make_function("func", vec![1]));
    let outcome = invoke(
        &function,
        RuntimeSpecification {
            runtime: 0,
            memory: 1,
            stats: None,
        },
    )
    .await;
    assert!(!outcome.success);
    assert_eq!(outcome.record.invocation_id, "func-min0.inv0");
    assert_eq!(outcome.job_record.executions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_long_duration_saturates() {
    let function = Arc::new(make_function("func", vec![1]));
    // 72 minutes do not fit into u32 microseconds
    let runtime = 72 * 60 * 1000;
    let outcome = invoke(
        &function,
        RuntimeSpecification {
            runtime,
            memory: 0,
            stats: None,
        },
    )
    .await;
    assert!(outcome.success);
    assert_eq!(outcome.record.requested_duration, u32::MAX);
    assert_eq!(outcome.record.actual_duration, u32::MAX);
    assert!(outcome.record.response_time >= runtime as i64 * 1000);
    assert_eq!(outcome.job_record.executions(), 1);
}

#[tokio::test]
async fn test_allocation_leaves_runtime_responsive() {
    let function = Arc::new(make_function("func", vec![1]));
    let start = std::time::Instant::now();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        start.elapsed()
    });
    let outcome = invoke(
        &function,
        RuntimeSpecification {
            runtime: 1000,
            memory: 512,
            stats: None,
        },
    )
    .await;
    assert_eq!(outcome.record.actual_memory_usage, 512 * 1024);
    // other tasks keep running while the pages are touched
    assert!(timer.await.unwrap() < Duration::from_millis(250));
}

fn synthesizer_config() -> SynthesizerConfig {
    SynthesizerConfig {
        functions: 3,
        beginning: 1,
        target: 3,
        step: 1,
        duration: 2,
        execution: 250,
        memory: 128,
        seed: 123,
    }
}

#[test]
fn test_ramp() {
    assert_eq!(ramp(&synthesizer_config()).unwrap(), vec![60, 60, 120, 120, 180, 180]);
    let config = SynthesizerConfig {
        beginning: 2,
        target: 7,
        step: 3,
        duration: 1,
        ..synthesizer_config()
    };
    assert_eq!(ramp(&config).unwrap(), vec![120, 300]);
    let config = SynthesizerConfig {
        step: 0,
        ..synthesizer_config()
    };
    assert!(matches!(ramp(&config), Err(LoaderError::Config(_))));
}

#[test]
fn test_synthesized_functions() {
    let functions = synthesize_functions(&synthesizer_config()).unwrap();
    assert_eq!(functions.len(), 3);
    let names: HashSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    for f in functions.iter() {
        assert_eq!(f.name.len(), 64);
        assert!(f.name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(f.total_invocations(), 720);
        assert_eq!(f.runtime_stats.values, vec![250]);
        assert_eq!(f.memory_stats.values, vec![128]);
    }
    let again = synthesize_functions(&synthesizer_config()).unwrap();
    assert_eq!(again[0].name, functions[0].name);
}
