use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use posewatch::supervisor::{run_unit, signal_token};
use posewatch::{
    DefaultPipelineFactory, PosewatchConfig, ProcessLauncher, Supervisor, ThreadLauncher,
    UnitLauncher,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LauncherKind {
    /// One OS process per camera
    Process,
    /// One OS thread per camera inside this process
    Thread,
}

#[derive(Parser, Debug)]
#[command(name = "posewatch")]
#[command(about = "Multi-camera pose monitoring with motion classification and telemetry")]
#[command(version)]
#[command(long_about = "Runs one isolated pipeline per configured camera. Each pipeline \
captures frames, runs an external pose detector, classifies per-track arm motion, \
records annotated video and emits batched JSON telemetry.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "posewatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting any camera")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// How camera units are isolated from each other
    #[arg(long, value_enum, default_value_t = LauncherKind::Process)]
    launcher: LauncherKind,

    /// Run a single camera's pipeline (used by the process launcher)
    #[arg(long, value_name = "CAMERA_ID", hide = true)]
    worker: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        return print_default_config();
    }

    // Workers log to their own file, so the config is needed before logging
    let config = match PosewatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let guard = init_logging(&args, &config)?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid ({} camera(s))", config.cameras.len());
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let exit_code = match args.worker.clone() {
        Some(id) => run_worker(config, &id).await?,
        None => run_supervisor(&args, config).await?,
    };

    info!("Posewatch exited with code: {}", exit_code);

    // Flush the worker log before exiting
    drop(guard);
    std::process::exit(exit_code);
}

/// Run one camera's pipeline until its source ends or a stop signal arrives
async fn run_worker(config: PosewatchConfig, id: &str) -> Result<i32> {
    let camera = config
        .camera(id)
        .cloned()
        .ok_or_else(|| anyhow!("Camera '{}' is not configured", id))?;

    info!(
        "Worker {} starting (pid {}, {})",
        id,
        std::process::id(),
        camera.source.describe()
    );

    let factory = DefaultPipelineFactory::new(Arc::new(config));
    let stop = signal_token();

    match run_unit(&factory, &camera, stop).await {
        Ok(summary) => {
            info!(
                "Worker {} finished ({:?}): {} processed, {} dropped, {} batch(es) emitted",
                id,
                summary.end_reason,
                summary.frames_processed,
                summary.frames_dropped,
                summary.batches_emitted
            );
            Ok(0)
        }
        Err(e) => {
            error!("Worker {} failed: {}", id, e);
            Ok(1)
        }
    }
}

async fn run_supervisor(args: &Args, config: PosewatchConfig) -> Result<i32> {
    info!("Starting Posewatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let cameras = config.cameras.clone();
    if cameras.is_empty() {
        warn!("No cameras configured, nothing to monitor");
    }

    let launcher: Arc<dyn UnitLauncher> = match args.launcher {
        LauncherKind::Process => Arc::new(ProcessLauncher::current_exe(worker_args(args))?),
        LauncherKind::Thread => Arc::new(ThreadLauncher::new(Arc::new(
            DefaultPipelineFactory::new(Arc::new(config)),
        ))),
    };

    let mut supervisor = Supervisor::new(launcher);
    supervisor.launch(&cameras).await.map_err(|e| {
        error!("Failed to launch cameras: {}", e);
        e
    })?;

    let exit_code = supervisor.run_until_signal().await.map_err(|e| {
        error!("Supervisor error during execution: {}", e);
        e
    })?;

    Ok(exit_code)
}

/// Flags forwarded to every worker process
fn worker_args(args: &Args) -> Vec<String> {
    let mut forwarded = vec!["--config".to_string(), args.config.clone()];
    if args.debug {
        forwarded.push("--debug".to_string());
    } else if args.verbose {
        forwarded.push("--verbose".to_string());
    } else if args.quiet {
        forwarded.push("--quiet".to_string());
    }
    if let Some(format) = &args.log_format {
        forwarded.push("--log-format".to_string());
        forwarded.push(format.clone());
    }
    forwarded
}

fn init_logging(args: &Args, config: &PosewatchConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("posewatch={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Each worker also keeps its own log file under the configured log path
    let (file_writer, guard) = match &args.worker {
        Some(id) => {
            let dir = Path::new(&config.system.log_path);
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, format!("unit_{}.log", id));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Posewatch Configuration File");
    println!("# This is the default configuration with all available options");
    println!("#");
    println!("# One [[cameras]] entry per monitored source. `source` is a capture device");
    println!("# index (live, stops when the stream ends) or a video file path (loops forever).");
    println!("# [[cameras]]");
    println!("# id = \"CAM_01\"");
    println!("# source = 0");
    println!("#");
    println!("# The classifier thresholds apply to the standard deviation, in pixels, of");
    println!("# the first keypoint's vertical position over the last window_seconds of video.");
    println!("# Settings can be overridden with POSEWATCH_<SECTION>__<KEY> variables.");
    println!();

    let rendered = PosewatchConfig::default().to_toml()?;
    println!("{}", rendered);
    Ok(())
}
