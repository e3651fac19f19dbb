mod check_command;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    skiff_config::{LoggingConfig, SkiffConfig},
    skiff_metrics::MetricsRecorderConfig,
    skiff_runtime::{Runtime, RuntimeOptions},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skiff", about = "Skiff, a multi-channel skill runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides `logging.level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime (default when no subcommand is provided).
    Start {
        /// Config file to use instead of the discovered one.
        #[arg(short = 'f', long = "file", env = "SKIFF_CONFIG")]
        file: Option<PathBuf>,
    },
    /// Validate the configuration file and report errors/warnings.
    Check {
        #[arg(short = 'f', long = "file", env = "SKIFF_CONFIG")]
        file: Option<PathBuf>,
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

/// Initialise tracing. `RUST_LOG` wins over `--log-level`, which wins over
/// the config file.
fn init_telemetry(cli: &Cli, logging: &LoggingConfig) {
    let level = log_level(cli, logging);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs || logging.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn log_level<'a>(cli: &'a Cli, logging: &'a LoggingConfig) -> &'a str {
    cli.log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("info")
}

/// Load `file`, or discover the config in the standard locations.
fn load(file: Option<PathBuf>) -> anyhow::Result<(SkiffConfig, Option<PathBuf>)> {
    match file {
        Some(path) => {
            let config = skiff_config::load_config(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok((config, Some(path)))
        },
        None => Ok(skiff_config::discover_and_load()),
    }
}

async fn start(cli: &Cli, file: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = load(file)?;
    init_telemetry(cli, &config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "skiff starting");
    match &path {
        Some(path) => info!(path = %path.display(), "using config file"),
        None => info!("no config file, starting with defaults"),
    }

    let metrics = skiff_metrics::init_metrics(MetricsRecorderConfig {
        enabled: cfg!(feature = "prometheus"),
        global_labels: Vec::new(),
    })?;
    let mut options = RuntimeOptions::default().with_metrics(metrics);
    if let Some(path) = path {
        options = options.with_config_path(path);
    }

    let runtime = Runtime::new(options);
    runtime.run(config).await?;
    info!("skiff stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        None => start(&cli, None).await,
        Some(Commands::Start { file }) => start(&cli, file.clone()).await,
        Some(Commands::Check { file, verbose }) => {
            init_telemetry(&cli, &LoggingConfig::default());
            check_command::check(file.clone(), *verbose)
        },
    }
}
