use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use vitals::aggregator::WindowedAggregator;
use vitals::alerts::{AlertEvaluator, WebhookNotifier};
use vitals::clock::{Clock, SystemClock};
use vitals::config::Config;
use vitals::error::ConfigError;
use vitals::events::MetricKind;
use vitals::monitoring::PipelineMetrics;
use vitals::processor::{EventDispatcher, Validator};
use vitals::scheduler::PeriodicTask;
use vitals::storage::LogStore;

/// Command-line arguments for the telemetry pipeline
#[derive(Parser)]
#[command(
    name = "vitals",
    about = "Game client telemetry ingestion with real-time spike alerts",
    long_about = "Reads batches of client telemetry events (one JSON body per line), validates \
                  and stores them, keeps per-version crash, exception and jank counts over a \
                  sliding window, and posts webhook alerts when a count crosses its threshold."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Batch input, one JSON body per line
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Read batches from FILE instead of stdin"
    )]
    input: Option<PathBuf>,

    /// Keep the background loops running after input is drained
    #[arg(
        long,
        value_name = "SECS",
        help = "Keep sweeping and evaluating for SECS seconds after input ends (Ctrl+C stops early)"
    )]
    linger: Option<u64>,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in Pipeline::load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Input is not a readable file: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Convert config path to string safely, handling non-UTF-8 paths
    ///
    /// # Returns
    ///
    /// `Ok(Some(path_str))` if config is provided and valid UTF-8,
    /// `Ok(None)` if no config provided,
    /// `Err(String)` if config path contains invalid UTF-8
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }
}

/// Owns the dispatcher and the background loops for one process run
///
/// The loops only hold weak references, so the pipeline keeps the
/// aggregator and evaluator alive.
struct Pipeline {
    dispatcher: EventDispatcher,
    aggregator: Arc<WindowedAggregator>,
    evaluator: Option<Arc<AlertEvaluator>>,
    metrics: Arc<PipelineMetrics>,
    tasks: Vec<PeriodicTask>,
}

impl Pipeline {
    /// Build every component from `config` and start the background loops
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook client cannot be created or a
    /// background thread cannot be spawned.
    fn new(config: &Config) -> anyhow::Result<Self> {
        info!("Initializing pipeline");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = Arc::new(PipelineMetrics::new());
        let mut tasks = Vec::new();

        let aggregator = Arc::new(WindowedAggregator::with_window(
            Arc::clone(&clock),
            config.aggregator.window(),
            config.aggregator.sweep_interval(),
        ));
        tasks.push(
            aggregator
                .start_sweeper()
                .context("failed to start aggregator sweep")?,
        );

        let validator = Validator::with_limits(
            Arc::clone(&clock),
            config.ingest.max_event_age(),
            config.ingest.max_future_skew(),
        );
        let mut dispatcher = EventDispatcher::new(Arc::new(LogStore), Arc::clone(&clock))
            .with_validator(validator)
            .with_metrics(Arc::clone(&metrics));
        if config.ingest.record_realtime {
            dispatcher = dispatcher.with_aggregator(Arc::clone(&aggregator));
        } else {
            info!("Real-time recording disabled; alert rules will see no counts");
        }

        let evaluator = if config.alerts.enabled {
            let notifier = WebhookNotifier::new(
                config.alerts.webhook_url.clone(),
                config.alerts.webhook_timeout(),
            )
            .context("failed to create webhook notifier")?;
            if !notifier.is_enabled() {
                warn!("Alerts enabled without a webhook URL; alerts will only be logged");
            }

            let evaluator = Arc::new(
                AlertEvaluator::new(
                    Arc::clone(&aggregator),
                    Arc::new(notifier),
                    Arc::clone(&clock),
                )
                .with_metrics(Arc::clone(&metrics)),
            );
            for rule in config.alert_rules() {
                evaluator.add_rule(rule);
            }
            info!("Alert evaluator running with {} rules", evaluator.rules().len());

            tasks.push(
                evaluator
                    .start(config.alerts.evaluation_interval())
                    .context("failed to start alert evaluator")?,
            );
            Some(evaluator)
        } else {
            info!("Alerting disabled");
            None
        };

        Ok(Self {
            dispatcher,
            aggregator,
            evaluator,
            metrics,
            tasks,
        })
    }

    /// Load configuration from file or use defaults
    ///
    /// A missing or unreadable file falls back to defaults with a warning;
    /// a file that exists but is invalid is an error.
    fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
        match config_path {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                match Config::from_file(std::path::Path::new(path)) {
                    Ok(config) => Ok(config),
                    Err(ConfigError::ReadError(_)) => {
                        warn!(
                            "Configuration file '{}' not found or unreadable, using defaults",
                            path
                        );
                        Ok(Config::from_env())
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!("Using default configuration");
                Ok(Config::from_env())
            }
        }
    }

    /// Dispatch every non-empty line of `input` and write one response per line
    fn process<R: BufRead, W: Write>(&self, input: R, mut output: W) -> anyhow::Result<()> {
        for line in input.lines() {
            let line = line.context("failed to read input")?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match self.dispatcher.dispatch_json(&line) {
                Ok(response) => serde_json::to_string(&response)?,
                Err(e) => {
                    error!("Rejected batch: {}", e);
                    serde_json::json!({ "error": e.to_string() }).to_string()
                }
            };
            writeln!(output, "{}", response).context("failed to write response")?;
        }
        output.flush().context("failed to flush output")?;
        Ok(())
    }

    fn stop(&mut self) {
        info!("Stopping background loops");
        for task in self.tasks.drain(..) {
            task.stop();
        }

        for kind in MetricKind::ALL {
            for entry in self.aggregator.snapshot(kind) {
                info!(
                    "Live {} count for {:?}: {} ({} sessions)",
                    kind, entry.app_version, entry.count, entry.unique_sessions
                );
            }
        }
        if let Some(evaluator) = &self.evaluator {
            for rule in evaluator.rules().iter().filter(|r| r.last_fired.is_some()) {
                info!("Rule {} last fired at {:?}", rule.id, rule.last_fired);
            }
        }
        self.metrics.log_summary();
    }
}

/// Block until Ctrl+C or until `linger` has elapsed
fn wait_for_shutdown(linger: Duration) -> anyhow::Result<()> {
    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("failed to install SIGINT handler")?;

    info!("Input drained; lingering for {:?}. Press Ctrl+C to stop.", linger);
    match shutdown_receiver.recv_timeout(linger) {
        Ok(()) => info!("Shutdown signal received"),
        Err(RecvTimeoutError::Timeout) => info!("Linger period elapsed"),
        Err(RecvTimeoutError::Disconnected) => warn!("Shutdown channel closed"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting vitals pipeline");

    if let Err(e) = cli.validate() {
        anyhow::bail!("Invalid arguments: {}", e);
    }

    let config_path = cli
        .config_path_str()
        .map_err(|e| anyhow::anyhow!("Invalid configuration path: {}", e))?;
    let config = Pipeline::load_config(config_path).context("failed to load configuration")?;

    let mut pipeline = Pipeline::new(&config)?;
    info!("Pipeline initialized successfully");

    let stdout = std::io::stdout();
    let result = match &cli.input {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            pipeline.process(BufReader::new(file), stdout.lock())
        }
        None => pipeline.process(std::io::stdin().lock(), stdout.lock()),
    };

    if result.is_ok() {
        if let Some(secs) = cli.linger {
            if let Err(e) = wait_for_shutdown(Duration::from_secs(secs)) {
                error!("Error while lingering: {}", e);
            }
        }
    }

    pipeline.stop();
    info!("Pipeline shutdown complete");
    result
}
