//! txai CLI: train classifiers and generators, explain, evaluate.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use txai::core::Seed;
use txai::data::{DatasetKind, SpikeConfig};
use txai::models::ModelType;
use txai::pipeline::{
    ConfigOverrides, ExplanationRunner, RunConfig, RunSummary, StepFlags, DEFAULT_CONFIG_PATH,
};

#[derive(Parser)]
#[command(name = "txai")]
#[command(author, version)]
#[command(about = "Feature-importance experiments for time series classifiers")]
#[command(long_about = "txai: train sequence classifiers, explain them with WinIT and baselines,
and score the explanations by masking.

EXAMPLES:
  # Write a synthetic spike dataset
  txai data synth-spike --out data

  # Train a GRU on it
  txai train --data spike --epochs 20

  # Train WinIT generators for two windows, then explain and evaluate
  txai train-generator --explainer winit --window 5 --window 10
  txai explain --explainer winit --explainer fo --window 5 --window 10
  txai evaluate --explainer winit --explainer fo --window 5 --window 10

  # Everything at once, steps toggled in the config
  txai run --config config/main.yaml

ENVIRONMENT:
  TXAI_DETERMINISTIC   0/false/off or 1/true/on, overrides `deterministic`")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the classifier and save its checkpoint
    Train(RunArgs),
    /// Train the generators the selected explainers need
    TrainGenerator(RunArgs),
    /// Run explainers and write importance arrays
    Explain(RunArgs),
    /// Score saved importance arrays and append result rows
    Evaluate(RunArgs),
    /// Run the whole pipeline; steps come from the config
    Run(RunArgs),
    /// Dataset utilities
    Data {
        #[command(subcommand)]
        command: DataCommands,
    },
}

#[derive(Subcommand)]
enum DataCommands {
    /// Write a synthetic spike dataset in the loader's layout
    SynthSpike {
        /// Data directory; files go to DIR/spike/
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// Training series
        #[arg(long, default_value = "800")]
        n_train: usize,

        /// Test series
        #[arg(long, default_value = "200")]
        n_test: usize,

        /// Features per series
        #[arg(long, default_value = "3")]
        n_vars: usize,

        /// Timesteps per series
        #[arg(long, default_value = "50")]
        seq_len: usize,

        /// Steps between a spike and the label flip
        #[arg(long, default_value = "0")]
        delay: usize,

        /// Generator seed
        #[arg(long, default_value = "1234")]
        seed: u64,
    },
}

/// Options shared by the pipeline commands; each overrides the config file.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dataset name (spike, state, switch, simulated_data_l2x, seqcombmv, mimic, boiler, mitecg, pam)
    #[arg(long, value_name = "NAME")]
    data: Option<String>,

    /// Cross-validation fold
    #[arg(long)]
    cv: Option<usize>,

    /// Explainer (winit, fo, afo, ig, ixg); repeatable
    #[arg(long = "explainer", value_name = "NAME")]
    explainers: Vec<String>,

    /// WinIT window; repeatable
    #[arg(long = "window", value_name = "W")]
    windows: Vec<usize>,

    /// Classifier type: GRU, LSTM or CONV
    #[arg(long, value_name = "TYPE")]
    model_type: Option<String>,

    /// Classifier epochs
    #[arg(long, value_name = "N")]
    epochs: Option<usize>,

    /// Classifier learning rate
    #[arg(long, value_name = "LR")]
    lr: Option<f64>,

    /// Data directory
    #[arg(long, value_name = "DIR")]
    data_path: Option<PathBuf>,

    /// Output directory for importance arrays and results
    #[arg(long, value_name = "DIR")]
    out_path: Option<PathBuf>,

    /// Checkpoint directory
    #[arg(long, value_name = "DIR")]
    ckpt_path: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> Result<ConfigOverrides> {
        let data = self
            .data
            .as_deref()
            .map(str::parse::<DatasetKind>)
            .transpose()?;
        let model_type = self
            .model_type
            .as_deref()
            .map(str::parse::<ModelType>)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        Ok(ConfigOverrides {
            data,
            cv: self.cv,
            explainers: self.explainers.clone(),
            windows: self.windows.clone(),
            model_type,
            epochs: self.epochs,
            lr: self.lr,
            data_path: self.data_path.clone(),
            out_path: self.out_path.clone(),
            ckpt_path: self.ckpt_path.clone(),
        })
    }

    /// Config file plus command-line overrides.
    ///
    /// Without `--config`, `config/main.yaml` is used when present and the
    /// built-in defaults otherwise.
    fn load_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => RunConfig::load(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("Failed to load config {DEFAULT_CONFIG_PATH}"))?,
            None => RunConfig::default(),
        };
        config.apply(&self.overrides()?);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = format!("log_{}.log", chrono::Local::now().format("%Y%m%d-%H%M"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Data { command } => {
            let _guard = init_logging(cli.verbose, None)?;
            handle_data(command)
        }
        Commands::Train(args) => {
            let config = args.load_config()?;
            let _guard = init_logging(cli.verbose, config.paths.log.as_deref())?;
            handle_train(config)
        }
        Commands::TrainGenerator(args) => {
            let config = args.load_config()?;
            let _guard = init_logging(cli.verbose, config.paths.log.as_deref())?;
            handle_train_generator(config)
        }
        Commands::Explain(args) => {
            let mut config = args.load_config()?;
            let _guard = init_logging(cli.verbose, config.paths.log.as_deref())?;
            config.steps = StepFlags {
                train: false,
                traingen: false,
                skipexplain: false,
                eval: false,
            };
            handle_run(config, "Explanation")
        }
        Commands::Evaluate(args) => {
            let mut config = args.load_config()?;
            let _guard = init_logging(cli.verbose, config.paths.log.as_deref())?;
            config.steps = StepFlags {
                train: false,
                traingen: false,
                skipexplain: true,
                eval: true,
            };
            handle_run(config, "Evaluation")
        }
        Commands::Run(args) => {
            let config = args.load_config()?;
            let _guard = init_logging(cli.verbose, config.paths.log.as_deref())?;
            handle_run(config, "Pipeline")
        }
    }
}

fn handle_data(command: DataCommands) -> Result<()> {
    match command {
        DataCommands::SynthSpike {
            out,
            n_train,
            n_test,
            n_vars,
            seq_len,
            delay,
            seed,
        } => {
            let config = SpikeConfig {
                n_train,
                n_test,
                n_vars,
                seq_len,
                delay,
                seed: Seed::new(seed),
                ..SpikeConfig::default()
            };
            let data = config.generate().context("Failed to generate spike data")?;
            data.write(&out)
                .with_context(|| format!("Failed to write spike data to {}", out.display()))?;

            println!("Wrote spike dataset to {}", DatasetKind::Spike.dir(&out).display());
            println!("  Train series: {}", data.train.len());
            println!("  Test series:  {}", data.test.len());
            println!("  Shape (V, L): ({n_vars}, {seq_len})");
            Ok(())
        }
    }
}

fn print_config(title: &str, config: &RunConfig) {
    println!("=== txai {title} ===\n");
    println!("Configuration:");
    println!("  Dataset: {} (cv {})", config.data.name, config.data.cv);
    println!("  Model: {}", config.model_dir());
    println!("  Explainers: {}", config.explainers.names.join(", "));
    println!("  Windows: {:?}", config.explainers.windows);
    println!("  Output: {}", config.paths.out.display());
    println!("  Checkpoints: {}\n", config.paths.ckpt.display());
    tracing::debug!(?config, "resolved configuration");
}

fn handle_train(config: RunConfig) -> Result<()> {
    print_config("Training", &config);
    println!("  Epochs: {}", config.classifier_epochs());
    println!("  Learning rate: {}\n", config.learning_rate());

    let mut runner = ExplanationRunner::new(config).context("Failed to prepare the run")?;
    let report = runner.train_classifier().context("Training failed")?;

    println!("\nTraining complete!");
    println!("  Best epoch: {}", report.best_epoch + 1);
    println!("  Best validation loss: {:.4}", report.best_valid_loss);
    if let Some(auroc) = report.best_valid_auroc {
        println!("  Best validation AUROC: {auroc:.4}");
    }
    if let Some(auroc) = report.test.auroc {
        println!("  Test AUROC: {auroc:.4}");
    }
    println!("  Test accuracy: {:.2}%", report.test.accuracy * 100.0);
    println!("  Training time: {:.1}s", report.training_time_secs);
    println!(
        "  Checkpoint: {}",
        runner.paths().classifier_stem(runner.data().cv()).display()
    );
    Ok(())
}

fn handle_train_generator(config: RunConfig) -> Result<()> {
    print_config("Generator Training", &config);
    let runner = ExplanationRunner::new(config).context("Failed to prepare the run")?;
    let specs = runner.config().explainer_specs()?;
    let stems = runner
        .train_generators(&specs)
        .context("Generator training failed")?;

    if stems.is_empty() {
        println!("No selected explainer needs a generator.");
    }
    for stem in stems {
        println!("Saved generator {}", stem.display());
    }
    Ok(())
}

fn handle_run(config: RunConfig, title: &str) -> Result<()> {
    print_config(title, &config);
    let mut runner = ExplanationRunner::new(config).context("Failed to prepare the run")?;
    let RunSummary {
        explainers,
        rows,
        results_path,
        elapsed_secs,
    } = runner.run().with_context(|| format!("{title} failed"))?;

    println!("\n{title} complete!");
    for explainer in &explainers {
        println!("  {explainer}");
    }
    if rows > 0 {
        println!("  {rows} rows appended to {}", results_path.display());
    }
    println!("  Time elapsed: {elapsed_secs:.1}s");
    Ok(())
}
