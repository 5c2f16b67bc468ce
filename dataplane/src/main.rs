//! Safari Dataplane - Main entry point
//!
//! Polls the chain for dashboard snapshots and keeps the realtime socket
//! open until interrupted.

use clap::{Arg, ArgMatches, Command};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use safari_dataplane::{
    config::DataplaneConfig,
    dashboard::{DashboardOrchestrator, Poller},
    error::Result,
    providers::ConnectionManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("dataplane")
        .version(safari_dataplane::VERSION)
        .about("Safari Dataplane - Monad network metrics and live block heads")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file layered over config/dataplane"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error); overrides the configured level"),
        )
        .arg(
            Arg::new("rpc-url")
                .long("rpc-url")
                .value_name("URL")
                .help("JSON-RPC endpoint"),
        )
        .arg(
            Arg::new("ws-url")
                .long("ws-url")
                .value_name("URL")
                .help("Realtime WebSocket endpoint"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Fetch one snapshot, print it as JSON and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-auto-refresh")
                .long("no-auto-refresh")
                .help("Only fetch the initial snapshot")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-realtime")
                .long("no-realtime")
                .help("Do not open the realtime connection")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config = load_config(&matches)?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .or_else(|| config.global.log_level.clone())
        .unwrap_or_else(|| config.global.mode.log_level().to_string());
    init_logging(&log_level)?;

    info!(
        system = safari_dataplane::SYSTEM_NAME,
        version = safari_dataplane::VERSION,
        mode = ?config.global.mode,
        "Starting Safari Dataplane"
    );

    let orchestrator = Arc::new(DashboardOrchestrator::from_config(&config)?);

    if matches.get_flag("once") {
        let snapshot = orchestrator.get_dashboard_data().await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let dataplane = Dataplane::start(config, orchestrator).await;

    setup_shutdown_signal().await;
    info!("Shutdown signal received, stopping dataplane...");

    dataplane.stop().await;
    info!("Safari Dataplane stopped");
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("safari_dataplane={},dataplane={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Load configuration and apply command line overrides
fn load_config(matches: &ArgMatches) -> Result<DataplaneConfig> {
    let mut config = DataplaneConfig::load(matches.get_one::<String>("config").map(String::as_str))?;

    if let Some(url) = matches.get_one::<String>("rpc-url") {
        config.rpc.http_url = url.clone();
    }
    if let Some(url) = matches.get_one::<String>("ws-url") {
        config.realtime.ws_url = url.clone();
    }
    if matches.get_flag("no-auto-refresh") {
        config.polling.auto_refresh = false;
    }
    if matches.get_flag("no-realtime") {
        config.realtime.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// Set up graceful shutdown signal handling
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Running poller plus the optional realtime connection
struct Dataplane {
    poller: safari_dataplane::dashboard::PollerHandle,
    realtime: Option<(Arc<ConnectionManager>, tokio::task::JoinHandle<()>)>,
}

impl Dataplane {
    async fn start(config: DataplaneConfig, orchestrator: Arc<DashboardOrchestrator>) -> Self {
        info!("Starting dataplane components...");
        let poller = Poller::spawn(orchestrator, &config.polling);

        let realtime = if config.realtime.enabled {
            let manager = Arc::new(ConnectionManager::new(config.realtime.clone()));
            let listener = tokio::spawn(log_realtime(Arc::clone(&manager)));
            manager.connect().await;
            Some((manager, listener))
        } else {
            info!("Realtime connection disabled");
            None
        };

        Self { poller, realtime }
    }

    async fn stop(self) {
        if let Some((manager, listener)) = self.realtime {
            manager.disconnect().await;
            listener.abort();
        }
        self.poller.shutdown().await;
    }
}

/// Log block heads and connection state changes
async fn log_realtime(manager: Arc<ConnectionManager>) {
    let mut messages = manager.subscribe();
    let mut states = manager.watch_state();

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(state = %state, "Realtime connection state");
            }
            message = messages.recv() => match message {
                Ok(message) => match message.new_head() {
                    Some(head) => info!(
                        block = head.number,
                        transactions = head.transaction_count,
                        gas_used = head.gas_used,
                        "New block head"
                    ),
                    None => debug!(kind = %message.kind, "Realtime message"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime listener lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
