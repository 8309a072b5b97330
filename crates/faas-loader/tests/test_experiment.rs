mod common;
use common::{init_logger, make_configuration, make_function, ScriptedInvoker};

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use faas_loader::config::LoaderConfiguration;
use faas_loader::deployer::Deployer;
use faas_loader::error::{LoaderError, Result};
use faas_loader::experiment::Experiment;
use faas_loader::extra::emulated::EmulatedInvoker;
use faas_loader::function::Function;
use faas_loader::generator::IatDistribution;
use faas_loader::invocation::{ExecutionRecord, JobExecutionRecord};
use faas_loader::invoker::AdmissionLink;
use faas_loader::metric::{ClusterUsage, JobSchedReply, KnStats};
use faas_loader::policy::{Dispatch, InvocationPolicy, PolicyContext, PolicyKind};
use faas_loader::scrapper::ClusterScraper;
use faas_loader::specification::specification_path;
use faas_loader::stats::ExperimentSummary;

fn read_records(path: &Path) -> Vec<ExecutionRecord> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.deserialize().map(|r| r.unwrap()).collect()
}

fn read_job_records(path: &Path) -> Vec<JobExecutionRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_experiment_in_test_mode() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut configuration = make_configuration(dir.path(), "knative", 2);
    configuration.test_mode = true;
    configuration.loader.iat_distribution = IatDistribution::Equidistant;
    let functions = vec![make_function("f1", vec![3, 2]), make_function("f2", vec![1, 0])];
    let invoker = Arc::new(ScriptedInvoker::new(false));
    let mut experiment = Experiment::new(configuration.clone(), functions, invoker.clone());

    let summary = experiment.run_experiment(false, false).await.unwrap();
    assert_eq!(
        summary,
        ExperimentSummary {
            successful: 6,
            failed: 0,
            issued: 6
        }
    );
    assert!(invoker.calls().is_empty());

    let records = read_records(&configuration.output_filename("duration", "csv"));
    assert_eq!(records.len(), 6);
    let ids: HashSet<String> = records.iter().map(|r| r.invocation_id.clone()).collect();
    assert_eq!(ids.len(), 6);
    assert!(ids.contains("f1-min1.inv1"));
    assert_eq!(read_job_records(&configuration.output_filename("joblogs", "json")).len(), 6);

    assert!(specification_path(&configuration.loader.specification_dir, 0).exists());
    assert!(specification_path(&configuration.loader.specification_dir, 1).exists());
}

#[tokio::test(start_paused = true)]
async fn test_experiment_with_emulated_invoker() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "caerus", 1);
    let functions = vec![make_function("f1", vec![4]), make_function("f2", vec![2])];
    let mut experiment = Experiment::new(configuration.clone(), functions, Arc::new(EmulatedInvoker::new()));
    let summary = experiment.run_experiment(false, false).await.unwrap();
    assert_eq!(summary.issued, 6);
    assert_eq!(summary.successful, 6);

    let records = read_records(&configuration.output_filename("duration", "csv"));
    assert_eq!(records.len(), 6);
    for r in records.iter() {
        assert_eq!(r.requested_duration, 10_000);
        assert!(r.actual_duration >= 10_000);
        assert_eq!(r.actual_memory_usage, 1024);
        assert!(!r.function_timeout);
    }
}

#[tokio::test(start_paused = true)]
async fn test_generated_specifications_are_reused() {
    let dir = tempfile::tempdir().unwrap();
    let mut configuration = make_configuration(dir.path(), "knative", 2);
    configuration.test_mode = true;
    let functions = vec![make_function("f1", vec![5, 3]), make_function("f2", vec![2, 2])];

    let mut first = Experiment::new(configuration.clone(), functions.clone(), Arc::new(ScriptedInvoker::new(true)));
    assert_eq!(first.run_experiment(true, false).await.unwrap(), ExperimentSummary::default());
    // nothing was replayed
    assert!(!configuration.output_filename("duration", "csv").exists());

    let mut reseeded = configuration.clone();
    reseeded.loader.seed = 99;
    let mut second = Experiment::new(reseeded, functions, Arc::new(ScriptedInvoker::new(true)));
    let summary = second.run_experiment(false, true).await.unwrap();
    assert_eq!(summary.issued, 12);
    assert_eq!(first.specifications(), second.specifications());
}

#[tokio::test(start_paused = true)]
async fn test_failing_function_stops_early() {
    let dir = tempfile::tempdir().unwrap();
    let mut configuration = make_configuration(dir.path(), "knative", 3);
    configuration.loader.iat_distribution = IatDistribution::Equidistant;
    let functions = vec![make_function("f1", vec![2, 2, 2])];
    let mut experiment = Experiment::new(configuration.clone(), functions, Arc::new(ScriptedInvoker::new(false)));
    let summary = experiment.run_experiment(false, false).await.unwrap();
    assert_eq!(summary.issued, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(read_records(&configuration.output_filename("duration", "csv")).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_replica_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "elasticflow", 1);
    let functions: Vec<Function> = (0..4)
        .map(|i| make_function(&format!("bert-serverful-copy-{}", i), vec![4]))
        .collect();
    let invoker = Arc::new(ScriptedInvoker::new(true));
    let mut experiment = Experiment::new(configuration, functions, invoker.clone());
    let summary = experiment.run_experiment(false, false).await.unwrap();
    assert_eq!(summary.issued, 4);
    let calls = invoker.calls();
    let targets: Vec<String> = calls.iter().map(|c| c.function.clone()).collect();
    assert_eq!(
        targets,
        vec![
            "bert-serverful-copy-1",
            "bert-serverful-copy-2",
            "bert-serverful-copy-3",
            "bert-serverful-copy-0"
        ]
    );
    assert!(calls.iter().all(|c| c.invocation_id.starts_with("bert-serverful-copy-0-min0")));
}

#[tokio::test(start_paused = true)]
async fn test_admission_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "elastic", 1);
    let mut functions = Vec::new();
    for gpus in [1, 2] {
        let mut f = make_function(&format!("resnet-gpu-{}", gpus), vec![2]);
        f.batch_stats = vec![32, 64];
        f.iteration_stats = vec![10, 20];
        f.deadline_stats = vec![100, 200];
        functions.push(f);
    }

    let (link, mut requests) = AdmissionLink::channel(16);
    let scheduler = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(ticket) = requests.recv().await {
            seen.push((ticket.request.function.clone(), ticket.request.batch_size));
            let _ = ticket.reply.send(JobSchedReply {
                invocation_id: ticket.request.invocation_id.clone(),
                replica: vec![7],
            });
        }
        seen
    });

    let mut experiment = Experiment::new(configuration.clone(), functions, Arc::new(EmulatedInvoker::new()))
        .with_admission_link(link);
    let summary = experiment.run_experiment(false, false).await.unwrap();
    assert_eq!(summary.issued, 4);
    assert_eq!(summary.successful, 4);
    drop(experiment);

    let mut seen = scheduler.await.unwrap();
    seen.sort();
    assert_eq!(
        seen,
        vec![("resnet-gpu-1".to_string(), 32), ("resnet-gpu-2".to_string(), 64)]
    );
    let job_records = read_job_records(&configuration.output_filename("joblogs", "json"));
    let executed: Vec<&JobExecutionRecord> = job_records.iter().filter(|r| r.executions() > 0).collect();
    assert_eq!(executed.len(), 2);
    assert!(executed.iter().all(|r| r.replica == vec![7]));
}

#[derive(Default)]
struct CountingScraper {
    calls: AtomicU64,
}

#[async_trait]
impl ClusterScraper for CountingScraper {
    async fn scrape_cluster_usage(&self) -> ClusterUsage {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ClusterUsage::default()
    }

    async fn scrape_kn_stats(&self) -> KnStats {
        KnStats::default()
    }
}

/// Passes the first three slots through and panics on the fourth.
struct BrokenPolicy {}

impl InvocationPolicy for BrokenPolicy {
    fn resolve(&self, ctx: &PolicyContext<'_>) -> Dispatch {
        if ctx.issued > 3 {
            panic!("policy failure");
        }
        Dispatch::Fire(ctx.function.clone())
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::PassThrough
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_driver_stops_background_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let mut configuration = make_configuration(dir.path(), "knative", 2);
    configuration.loader.enable_metrics_scrapping = true;
    configuration.loader.metric_scraping_period_seconds = 1;
    configuration.loader.iat_distribution = IatDistribution::Equidistant;
    let scraper = Arc::new(CountingScraper::default());
    let mut experiment = Experiment::new(
        configuration,
        vec![make_function("f1", vec![2, 2])],
        Arc::new(ScriptedInvoker::new(true)),
    )
    .with_scraper(scraper.clone())
    .with_policy(Arc::new(BrokenPolicy {}));

    assert!(matches!(
        experiment.run_experiment(false, false).await,
        Err(LoaderError::Task(_))
    ));
    // the fourth slot is due 60 s in
    let samples = scraper.calls.load(Ordering::SeqCst);
    assert!(samples >= 50);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(scraper.calls.load(Ordering::SeqCst), samples);
}

struct FailingDeployer {}

impl Deployer for FailingDeployer {
    fn deploy(&self, _: &LoaderConfiguration, _: &[Function], _: &Path) -> Result<Vec<Function>> {
        Err(LoaderError::Deploy("manifest rejected".to_string()))
    }
}

#[tokio::test]
async fn test_deployment_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let configuration = make_configuration(dir.path(), "knative", 1);
    let mut experiment = Experiment::new(
        configuration,
        vec![make_function("f1", vec![1])],
        Arc::new(ScriptedInvoker::new(true)),
    )
    .with_deployer(Box::new(FailingDeployer {}));
    assert!(matches!(
        experiment.run_experiment(false, false).await,
        Err(LoaderError::Deploy(_))
    ));
}
