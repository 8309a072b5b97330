use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::error;

use faas_loader::config::{DriverConfiguration, LoaderConfiguration};
use faas_loader::error::Result;
use faas_loader::experiment::Experiment;
use faas_loader::extra::emulated::EmulatedInvoker;
use faas_loader::extra::synthesizer::{synthesize_functions, SynthesizerConfig};
use faas_loader::function::{load_functions, save_functions};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Replays serverless workload traces
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs one experiment against the emulated function endpoint
    Run {
        /// Path to YAML or JSON file with experiment configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Path to JSON file with the trace functions
        #[arg(short, long)]
        functions: PathBuf,

        /// Path to JSON file with prompt functions
        #[arg(long)]
        prompt_functions: Option<PathBuf>,

        /// Only generate and persist the specifications
        #[arg(long)]
        iat_only: bool,

        /// Load the specifications generated by a previous run
        #[arg(long)]
        generated: bool,

        /// Record every invocation as successful without invoking anything
        #[arg(long)]
        test_mode: bool,
    },
    /// Writes a synthetic trace with a linear RPS ramp
    Synthesize {
        /// Number of functions
        #[arg(short, long)]
        count: usize,

        /// Starting RPS
        #[arg(short, long)]
        beginning: usize,

        /// Final RPS
        #[arg(short, long)]
        target: usize,

        /// RPS increment
        #[arg(short, long)]
        step: usize,

        /// Minutes each RPS level is held
        #[arg(short, long)]
        duration: usize,

        /// Execution time of the functions in milliseconds
        #[arg(short, long)]
        execution: u32,

        /// Memory of the functions in MiB
        #[arg(short, long)]
        memory: u32,

        /// Path to produced JSON file with the functions
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 123)]
        seed: u64,
    },
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Run {
            config,
            functions,
            prompt_functions,
            iat_only,
            generated,
            test_mode,
        } => {
            let loader = LoaderConfiguration::from_file(&config)?;
            let mut configuration = DriverConfiguration::new(loader);
            configuration.test_mode = test_mode;
            let functions = load_functions(&functions)?;
            let prompt_functions = match prompt_functions {
                Some(path) => load_functions(&path)?,
                None => Vec::new(),
            };
            let mut experiment = Experiment::new(configuration, functions, Arc::new(EmulatedInvoker::new()))
                .with_prompt_functions(prompt_functions);
            let summary = experiment.run_experiment(iat_only, generated).await?;
            if !iat_only {
                summary.print_summary(&experiment.configuration().loader.client_training);
            }
        }
        Command::Synthesize {
            count,
            beginning,
            target,
            step,
            duration,
            execution,
            memory,
            output,
            seed,
        } => {
            let functions = synthesize_functions(&SynthesizerConfig {
                functions: count,
                beginning,
                target,
                step,
                duration,
                execution,
                memory,
                seed,
            })?;
            save_functions(&output, &functions)?;
            println!("Saved {} functions to {}", functions.len(), output.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "[{} {}] {}", buf.timestamp_millis(), record.level(), record.args()))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
