use anyhow::{Context, Result};
use clap::Parser;
use docscan::{
    CameraStreamControllerBuilder, DocscanConfig, DocscanError, FacingMode, ReplayEngine, ScanOutcome,
    SyntheticDevice, SyntheticPlatform, UxManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Played back when no `--replay` file is given: a two-sided ID with some
/// positioning trouble on the way.
const DEMO_SCRIPT: &str = r#"
{"framing":"camera-too-far","scanning_status":"scanning-side-in-progress"}
{"framing":"camera-too-far","scanning_status":"scanning-side-in-progress"}
{"scanning_status":"scanning-side-in-progress","document_class":{"country":"croatia","document_type":"id"}}
{"blur":"detected","scanning_status":"scanning-side-in-progress"}
{"scanning_status":"side-scanned","document_class":{"country":"croatia","document_type":"id"},"fields":{"first_name":"ANA","document_number":"112233445"}}
{"scanning_status":"scanning-side-in-progress","scanning_side":"second"}
{"glare":"detected","scanning_status":"scanning-side-in-progress","scanning_side":"second"}
{"scanning_status":"document-scanned","scanning_side":"second","document_class":{"country":"croatia","document_type":"id"},"fields":{"last_name":"HORVAT","date_of_birth":"1990-04-12"}}
"#;

#[derive(Parser, Debug)]
#[command(name = "docscan")]
#[command(about = "Camera-guided document scanning session driver")]
#[command(version)]
#[command(long_about = "Runs a document scanning session: selects a camera, streams frames to a \
recognition engine, and turns per-frame analysis into stable user guidance. Without a real \
platform the session runs against synthetic cameras and a replayed engine script.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "docscan.toml", help = "Path to TOML configuration file")]
    config: PathBuf,

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
    #[arg(long, help = "Validate configuration file and exit without scanning")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Newline-delimited JSON analysis results to replay
    #[arg(long, value_name = "JSONL", help = "Replay engine results from a .jsonl file")]
    replay: Option<PathBuf>,

    /// Override the preferred camera facing
    #[arg(long, value_name = "FACING", help = "Preferred camera: front or back")]
    facing: Option<FacingMode>,
}

/// How a scan session ended
#[derive(Debug)]
enum SessionEnd {
    Scanned(ScanOutcome),
    TimedOut(Duration),
    Failed(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting docscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config.display());

    let mut config = DocscanConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    if let Some(facing) = args.facing {
        config.camera.facing = facing;
    }

    let outcome = run_session(&config, args.replay.as_deref()).await?;
    match outcome {
        Some(SessionEnd::Scanned(outcome)) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Some(SessionEnd::TimedOut(after)) => {
            warn!("No document scanned within {:?}", after);
            std::process::exit(2);
        }
        Some(SessionEnd::Failed(reason)) => {
            error!("Scan failed: {}", reason);
            std::process::exit(1);
        }
        None => {
            info!("Interrupted");
            Ok(())
        }
    }
}

async fn run_session(
    config: &DocscanConfig,
    replay: Option<&std::path::Path>,
) -> Result<Option<SessionEnd>> {
    let engine = match replay {
        Some(path) => ReplayEngine::from_file(path)
            .with_context(|| format!("Failed to load replay script {}", path.display()))?,
        None => ReplayEngine::from_reader(DEMO_SCRIPT.as_bytes())?,
    }
    .with_latency(Duration::from_millis(40));

    let platform = Arc::new(
        SyntheticPlatform::new(vec![
            SyntheticDevice::new("synthetic-front", "Front Camera").with_single_shot_focus(),
            SyntheticDevice::new("synthetic-back", "Back Camera")
                .with_torch()
                .with_single_shot_focus(),
        ])
        .with_frame_size(640, 480),
    );

    let controller = CameraStreamControllerBuilder::new()
        .devices(platform)
        .settings(config.controller_settings())
        .build()?;
    info!("Frames rendered via {:?}", controller.render_path());

    let ux = UxManager::new(controller, Arc::new(engine), config.ux_settings())?;
    let (end_tx, mut end_rx) = mpsc::unbounded_channel();

    ux.on_ui_state_change(|change| {
        info!("Guidance: {} -> {}", change.previous, change.current.key);
    });
    ux.on_frame_processed(|result| {
        debug!(
            "Frame analysed: {:?} ({:?})",
            result.scanning_status, result.processing_status
        );
    });
    let tx = end_tx.clone();
    ux.on_result(move |outcome| {
        let _ = tx.send(SessionEnd::Scanned(outcome.clone()));
    });
    let tx = end_tx.clone();
    ux.on_timeout(move |after| {
        let _ = tx.send(SessionEnd::TimedOut(*after));
    });
    ux.on_error(move |e| {
        let fatal = !e.is_recoverable() || matches!(e, DocscanError::UnsupportedDocument { .. });
        if fatal {
            let _ = end_tx.send(SessionEnd::Failed(e.to_string()));
        } else {
            warn!("Recoverable scan error: {}", e);
        }
    });

    ux.start().await?;
    if let Some(camera) = ux.controller().selected_camera() {
        info!("Scanning with {}", camera.name());
    }

    let end = tokio::select! {
        end = end_rx.recv() => end,
        _ = tokio::signal::ctrl_c() => None,
    };

    ux.dispose();
    ux.controller().release_camera();
    Ok(end)
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docscan={}", log_level)));

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

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Docscan Configuration File");
    println!("# Every key can be overridden with DOCSCAN_<SECTION>__<KEY>");
    println!();
    println!("{}", toml::to_string_pretty(&DocscanConfig::default())?);
    Ok(())
}
