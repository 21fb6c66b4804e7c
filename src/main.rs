//! VIGIL - Real-time security alert console
//!
//! Connects to a NIDS alert feed, deduplicates and throttles the stream,
//! and keeps a bounded, prioritized set of visible notifications.
//!
//! ## Usage
//!
//! ```bash
//! # Run against the feed from ~/.vigil/config.yaml (or defaults)
//! vigil
//!
//! # With verbose logging
//! vigil -v
//!
//! # Against a specific deployment
//! vigil --host 10.1.2.3:8000
//!
//! # Without the terminal chime
//! vigil --silent
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use vigil_config::VigilConfig;
use vigil_core::{init_logging, LogGuard};
use vigil_engine::{
    AlertEngine, Annunciator, BroadcastBus, EngineHandle, EngineRuntime, RuntimeOptions, Silent,
    StaticGate, SurfaceEvent, TerminalBell,
};

/// VIGIL real-time security alert console
///
/// Consumes a live intrusion-detection alert feed, collapses repeated
/// signatures, and surfaces a prioritized notification console.
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.vigil/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Path to the config file (defaults to ~/.vigil/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the feed host, e.g. 127.0.0.1:8000
    #[arg(long)]
    host: Option<String>,

    /// Disable the terminal chime
    #[arg(long)]
    silent: bool,

    /// Print the final engine snapshot as JSON on exit
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    info!("starting vigil");

    match run(cli) {
        Ok(()) => {
            info!("vigil exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("vigil error: {e}");
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> vigil_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

/// Wire the engine and run until Ctrl-C.
#[tokio::main]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = VigilConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.feed.host = host;
        config.validate()?;
    }

    let bus = BroadcastBus::default();
    let surface_rx = bus.subscribe();

    let annunciator: Box<dyn Annunciator> = if cli.silent {
        Box::new(Silent)
    } else {
        Box::new(TerminalBell::from_config(&config.sound))
    };

    let engine = AlertEngine::new(&config, Box::new(bus.clone()), annunciator);
    let options = RuntimeOptions::from_config(&config);
    let (runtime, handle) = EngineRuntime::new(engine, options, &StaticGate::allow());
    let runtime_task = runtime.spawn();

    let console_task = tokio::spawn(run_console(surface_rx));

    info!(feed = %config.feed.ws_url(), "engine running; press Ctrl-C to exit");
    signal::ctrl_c().await?;
    info!("shutting down");

    print_summary(&handle, cli.json).await;

    let _ = handle.shutdown().await;
    let _ = runtime_task.await;
    console_task.abort();

    Ok(())
}

/// Minimal console surface: subscribes to the bus and prints events.
async fn run_console(mut rx: broadcast::Receiver<SurfaceEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => render_event(&event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "console surface lagged behind the bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render_event(event: &SurfaceEvent) {
    match event {
        SurfaceEvent::NewAlert {
            alert,
            notification_id,
        } => {
            let source = alert.source_ip.as_deref().unwrap_or("unknown source");
            println!(
                "[{}] {} #{} {} ({}) - {}",
                alert.received_at.format("%H:%M:%S"),
                alert.level.icon(),
                notification_id,
                alert.title,
                source,
                alert.message
            );
        }
        SurfaceEvent::Refreshed {
            notification_id, ..
        } => {
            println!("      ~ #{notification_id} repeated (merged)");
        }
        SurfaceEvent::Acknowledged { notification_id } => {
            println!("      + #{notification_id} acknowledged");
        }
        SurfaceEvent::Removed { notification_id } => {
            println!("      - #{notification_id} cleared");
        }
        SurfaceEvent::CloseAlerts { scope } => match (&scope.level, scope.hours) {
            (Some(level), _) => println!("      x dismissed all {level} alerts ({})", scope.source),
            (None, Some(hours)) => {
                println!("      x dismissed alerts older than {hours}h ({})", scope.source)
            }
            (None, None) => println!("      x dismissed all alerts ({})", scope.source),
        },
        SurfaceEvent::ConnectionChanged { state } => {
            println!("      * feed {state}");
        }
        SurfaceEvent::ActionFailed {
            notification_id,
            failure,
        } => {
            println!("      ! action on #{notification_id} failed: {failure}");
        }
    }
}

/// Print the closing summary from the engine's final snapshot.
async fn print_summary(handle: &EngineHandle, as_json: bool) {
    let Ok(snapshot) = handle.snapshot().await else {
        return;
    };

    if as_json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "failed to serialize snapshot"),
        }
        return;
    }

    println!();
    println!(
        "session: {} received, {} admitted, {} merged, {} dropped",
        snapshot.stats.received,
        snapshot.stats.admitted,
        snapshot.stats.throttled,
        snapshot.stats.dropped_malformed + snapshot.stats.dropped_rejected,
    );
    if !snapshot.stats.top_source_ips.is_empty() {
        let top: Vec<String> = snapshot
            .stats
            .top_source_ips
            .iter()
            .map(|(ip, count)| format!("{ip} ({count})"))
            .collect();
        println!("top sources: {}", top.join(", "));
    }
    println!(
        "visible: {} total ({} critical, {} high), {} unacknowledged, feed {}",
        snapshot.counts.total,
        snapshot.counts.critical,
        snapshot.counts.high,
        snapshot.counts.unacknowledged,
        snapshot.connection,
    );
}
