//! NextGCore SMF (Session Management Function)
//!
//! EPC mode: applies Gx policy decisions to bearers on the S5/S8 interface.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;

use nextgcore_smfd::{GtpPath, SmfApp, SmfConfig, SmfError, SmfEvent};

/// NextGCore SMF - Session Management Function
#[derive(Parser, Debug)]
#[command(name = "nextgcore-smfd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EPC Session Management Function (Gx / S5-C)", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/nextgcore/smf.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    builder.filter_level(level);
    builder.format_timestamp_millis();

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();
}

fn load_config(path: &str) -> Result<SmfConfig> {
    match SmfConfig::from_file(path) {
        Ok(config) => {
            log::info!("Loading configuration from {}", path);
            Ok(config)
        }
        Err(SmfError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("Configuration file {} not found, using defaults", path);
            Ok(SmfConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path)),
    }
}

enum Wakeup {
    Tick,
    Datagram(SocketAddr, Bytes),
    Error(SmfError),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    log::info!("NextGCore SMF v{} starting...", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let config = load_config(&args.config)?;

    let mut app = SmfApp::new(&config);
    app.init();
    log::info!("SMF state machine initialized");

    let path = GtpPath::open(config.gtpc.socket_addr())
        .await
        .context("Failed to open GTP-C path")?;
    log::info!("NextGCore SMF ready");

    let mut interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        let wakeup = tokio::select! {
            _ = interval.tick() => Wakeup::Tick,
            received = path.recv() => match received {
                Ok((from, data)) => Wakeup::Datagram(from, data),
                Err(e) => Wakeup::Error(e),
            },
        };

        let result = match wakeup {
            Wakeup::Tick => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                app.dispatch(SmfEvent::GtpXactTimer { now: Instant::now() })
            }
            Wakeup::Datagram(from, data) => app.receive(from, data),
            Wakeup::Error(e) => Err(e),
        };
        if let Err(e) = result {
            log::error!("{} ({:?})", e, e.kind());
        }

        if let Err(e) = path.flush(&mut app.xact, &app.context).await {
            log::error!("GTP-C send failed: {}", e);
        }
    }

    log::info!("Shutting down...");
    app.fini();
    log::info!("SMF state machine finalized ({} sessions)", app.context.sess_count());

    log::info!("NextGCore SMF stopped");
    Ok(())
}
