//! Kismet Bridge CLI - Stream drone telemetry batches from a kismet server.

use anyhow::{Context, Result};
use clap::Parser;
use kismet_bridge::{
    adapter::DroneAdapter,
    config::{ActivationConfig, DEFAULT_PORT, DEFAULT_SERVER_NAME},
    delivery::{ListenerFactory, MessageListener},
    message::Message,
    metrics::start_metrics_server,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Kismet Bridge - Stream drone telemetry batches from a kismet server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kismet server hostname
    #[arg(long, env = "KISMET_HOST", default_value = DEFAULT_SERVER_NAME)]
    host: String,

    /// Kismet server port
    #[arg(long, env = "KISMET_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Print each delivered batch (verbose)
    #[arg(short, long)]
    verbose: bool,

    /// Print batches as JSON instead of summaries
    #[arg(long)]
    json: bool,

    /// Print statistics every N seconds (0 = never)
    #[arg(short, long, default_value_t = 30)]
    stats_interval: u64,

    /// Enable Prometheus metrics HTTP endpoint
    #[arg(long)]
    metrics: bool,

    /// Port for Prometheus metrics HTTP endpoint
    #[arg(long, default_value_t = 9090)]
    metrics_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Maximum runtime in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_runtime: u64,
}

/// Listener that echoes each batch to stdout.
struct PrintListener {
    verbose: bool,
    json: bool,
}

impl MessageListener for PrintListener {
    fn on_message(&mut self, message: Message) -> Result<()> {
        debug!("Received batch: {}", message);

        if self.json {
            println!("{}", serde_json::to_string(&message)?);
        } else if self.verbose {
            let when = message
                .server_time()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| message.timestamp.to_string());
            println!("[{}] {}", when, message);
            for value in &message.measured_values {
                let name = message
                    .drone_names
                    .get(&value.drone_id)
                    .map(String::as_str)
                    .unwrap_or("?");
                println!("  {} ({})", value, name);
            }
        }
        Ok(())
    }
}

/// Factory handing out a fresh [`PrintListener`] per delivery.
struct PrintListenerFactory {
    verbose: bool,
    json: bool,
}

impl ListenerFactory for PrintListenerFactory {
    fn acquire(&self) -> Result<Box<dyn MessageListener>> {
        Ok(Box::new(PrintListener {
            verbose: self.verbose,
            json: self.json,
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Kismet Bridge starting...");
    info!("Server: {}:{}", args.host, args.port);

    let config = ActivationConfig::with_server(args.host, args.port);
    let factory: Arc<dyn ListenerFactory> = Arc::new(PrintListenerFactory {
        verbose: args.verbose,
        json: args.json,
    });

    let adapter = DroneAdapter::new();
    adapter.start(tokio::runtime::Handle::current());

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
        let _ = shutdown_tx_clone.send(true);
    });

    // Optional max runtime
    if args.max_runtime > 0 {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(args.max_runtime)).await;
            info!("Max runtime reached");
            let _ = shutdown_tx_clone.send(true);
        });
    }

    // Start stats printer
    if args.stats_interval > 0 {
        let stats = adapter.stats();
        let stats_interval = args.stats_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                println!("\n{}", stats.summary());
            }
        });
    }

    // Start metrics server
    if args.metrics {
        let stats = adapter.stats();
        let metrics_port = args.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(metrics_port, stats).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    adapter
        .activate(config.clone(), Arc::clone(&factory))
        .await
        .with_context(|| format!("Failed to activate kismet listener for {}", config))?;

    // Wait for shutdown
    loop {
        shutdown_rx.changed().await?;
        if *shutdown_rx.borrow() {
            break;
        }
    }

    adapter.deactivate(&config, &factory).await;
    adapter.stop().await;

    // Print final statistics
    println!("\n\nFINAL STATISTICS");
    println!("{}", adapter.stats().summary());

    Ok(())
}
