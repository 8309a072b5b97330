//! Experiment orchestration.
use std::str::FromStr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinSet;

use crate::collector::RecordCollector;
use crate::config::DriverConfiguration;
use crate::deployer::{Deployer, PreDeployedFunctions};
use crate::dispatcher::DispatchContext;
use crate::driver::FunctionDriver;
use crate::error::{LoaderError, Result};
use crate::function::Function;
use crate::generator::SpecificationGenerator;
use crate::invoker::{AdmissionLink, Invoker};
use crate::policy::{assign_drivers, default_policy_resolver, InvocationPolicy, TrainingMode};
use crate::scrapper::{spawn_scrapper, ClusterScraper};
use crate::specification::{load_specification, save_specification, FunctionSpecification};
use crate::stats::{ExperimentCounters, ExperimentSummary};
use crate::timekeeper::spawn_timekeeper;
use crate::util::CompletionBarrier;

/// One trace replay: deploys the functions, replays their invocations and collects the records.
pub struct Experiment {
    configuration: DriverConfiguration,
    functions: Vec<Function>,
    prompt_functions: Vec<Function>,
    specifications: Vec<FunctionSpecification>,
    generator: SpecificationGenerator,
    invoker: Arc<dyn Invoker>,
    policy: Arc<dyn InvocationPolicy>,
    deployer: Box<dyn Deployer>,
    scraper: Option<Arc<dyn ClusterScraper>>,
    admission: Option<AdmissionLink>,
}

impl Experiment {
    pub fn new(configuration: DriverConfiguration, functions: Vec<Function>, invoker: Arc<dyn Invoker>) -> Self {
        let policy: Arc<dyn InvocationPolicy> = Arc::from(default_policy_resolver(&configuration.loader));
        let generator = SpecificationGenerator::new(configuration.loader.seed);
        Self {
            configuration,
            functions,
            prompt_functions: Vec::new(),
            specifications: Vec::new(),
            generator,
            invoker,
            policy,
            deployer: Box::new(PreDeployedFunctions {}),
            scraper: None,
            admission: None,
        }
    }

    pub fn with_deployer(mut self, deployer: Box<dyn Deployer>) -> Self {
        self.deployer = deployer;
        self
    }

    pub fn with_scraper(mut self, scraper: Arc<dyn ClusterScraper>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    pub fn with_admission_link(mut self, admission: AdmissionLink) -> Self {
        self.admission = Some(admission);
        self
    }

    pub fn with_prompt_functions(mut self, prompt_functions: Vec<Function>) -> Self {
        self.prompt_functions = prompt_functions;
        self
    }

    /// Replaces the policy of the configured training mode.
    pub fn with_policy(mut self, policy: Arc<dyn InvocationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn configuration(&self) -> &DriverConfiguration {
        &self.configuration
    }

    /// Specifications of the functions, filled by generation or loading, indexed like the functions.
    pub fn specifications(&self) -> &[FunctionSpecification] {
        &self.specifications
    }

    /// Generates the specifications of all functions and persists them to the specification directory.
    pub fn generate_specifications(&mut self) -> Result<()> {
        let loader = &self.configuration.loader;
        std::fs::create_dir_all(&loader.specification_dir).map_err(|e| LoaderError::io(&loader.specification_dir, e))?;
        let mut specifications = Vec::with_capacity(self.functions.len());
        for (i, function) in self.functions.iter().enumerate() {
            let spec = self.generator.generate_invocation_data(
                function,
                loader.iat_distribution,
                loader.granularity,
            )?;
            save_specification(&loader.specification_dir, i, &spec)?;
            specifications.push(spec);
        }
        info!(
            "Generated specifications of {} functions in {}",
            specifications.len(),
            loader.specification_dir.display()
        );
        self.specifications = specifications;
        Ok(())
    }

    /// Loads previously generated specifications, checking them against the functions.
    pub fn load_specifications(&mut self) -> Result<()> {
        let dir = &self.configuration.loader.specification_dir;
        let mut specifications = Vec::with_capacity(self.functions.len());
        for (i, function) in self.functions.iter().enumerate() {
            let spec = load_specification(dir, i)?;
            spec.validate(function)?;
            specifications.push(spec);
        }
        self.specifications = specifications;
        Ok(())
    }

    /// Runs the experiment.
    ///
    /// With `iat_only` the specifications are generated and persisted and nothing is invoked.
    /// With `generated` the specifications of a previous run are loaded instead of being generated.
    pub async fn run_experiment(&mut self, iat_only: bool, generated: bool) -> Result<ExperimentSummary> {
        if iat_only {
            self.generate_specifications()?;
            return Ok(ExperimentSummary::default());
        }

        let loader = &self.configuration.loader;
        let manifest_path = &self.configuration.manifest_path;
        self.functions = self.deployer.deploy(loader, &self.functions, manifest_path)?;
        if loader.with_prompt_bank {
            self.prompt_functions = self.deployer.deploy(loader, &self.prompt_functions, manifest_path)?;
        }

        if generated {
            self.load_specifications()?;
        } else {
            self.generate_specifications()?;
        }
        self.internal_run().await
    }

    async fn internal_run(&mut self) -> Result<ExperimentSummary> {
        let mode = &self.configuration.loader.client_training;
        if let Ok(mode) = TrainingMode::from_str(mode) {
            if mode.requires_admission() && self.admission.is_none() {
                warn!("Training mode {} runs without an admission scheduler", mode);
            }
        }
        info!(
            "Starting experiment with {} functions, {} trace minutes, policy {}",
            self.functions.len(),
            self.configuration.trace_duration,
            self.policy.get_name()
        );

        // background processes
        let readiness = CompletionBarrier::new();
        let (collector, sink, total_tx) = RecordCollector::create(&self.configuration)?;
        let collector = collector.spawn(readiness.token());
        let mut scrapper = match (&self.scraper, self.configuration.loader.enable_metrics_scrapping) {
            (Some(scraper), true) => Some(spawn_scrapper(&self.configuration, scraper.clone(), readiness.token())?),
            _ => None,
        };
        let timekeeper = spawn_timekeeper(self.configuration.trace_duration, readiness.token());
        readiness.wait().await;

        let functions: Vec<Arc<Function>> = self.functions.iter().cloned().map(Arc::new).collect();
        let context = Arc::new(DispatchContext {
            configuration: self.configuration.clone(),
            invoker: self.invoker.clone(),
            prompt_functions: self.prompt_functions.iter().cloned().map(Arc::new).collect(),
            admission: self.admission.clone(),
            sink,
        });
        let totals = Arc::new(ExperimentCounters::default());

        let mut drivers = JoinSet::new();
        for assignment in assign_drivers(&functions, self.policy.grouping()) {
            let specification = std::mem::take(&mut self.specifications[assignment.index]);
            let driver = FunctionDriver::new(
                assignment.index,
                functions[assignment.index].clone(),
                assignment.siblings,
                specification,
                context.clone(),
                self.policy.clone(),
                totals.clone(),
            );
            drivers.spawn(driver.run());
        }
        drop(context);

        while let Some(result) = drivers.join_next().await {
            let report = match result.map_err(LoaderError::from).and_then(|r| r) {
                Ok(report) => report,
                Err(e) => {
                    error!("Replay failed, stopping the experiment: {}", e);
                    drivers.abort_all();
                    timekeeper.abort();
                    if let Some(scrapper) = scrapper.take() {
                        if let Err(e) = scrapper.stop().await {
                            warn!("Metrics scrapper failed: {}", e);
                        }
                    }
                    collector.abort();
                    return Err(e);
                }
            };
            if report.terminated_early {
                warn!("Function {} was terminated early", report.name);
            }
            self.specifications[report.index] = report.specification;
        }

        let summary = totals.summary();
        if summary.issued > 0 {
            let _ = total_tx.send(summary.issued as u64);
        } else {
            drop(total_tx);
        }
        if let Some(scrapper) = scrapper {
            scrapper.stop().await?;
        }
        collector.await??;
        timekeeper.abort();

        info!(
            "Experiment finished: {} issued, {} successful, {} failed",
            summary.issued, summary.successful, summary.failed
        );
        Ok(summary)
    }
}
