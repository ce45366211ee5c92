//! CLI front-end for the ingestion engine: scan-only preview, or start the
//! full engine against either real hardware or the in-memory mock roster.

use clap::{Parser, Subcommand};
use phd_ingest::adapters::{BtleplugTransport, MockTransport, TracingEventSink};
use phd_ingest::ports::ble_transport::BleTransport;
use phd_ingest::state::{Engine, EngineConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// phd-ingest CLI: discover and stream IEEE 11073 personal health devices.
#[derive(Parser, Debug)]
#[command(name = "phd-ingest-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the in-memory mock transport instead of real hardware.
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan for nearby devices for a fixed window and print what's found.
    Scan {
        /// Scan duration in seconds.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Run the full engine until Ctrl+C.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    info!("phd-ingest CLI starting");

    match cli.command {
        Commands::Scan { seconds } => handle_scan(cli.mock, seconds).await,
        Commands::Run => handle_run(cli.mock).await,
    }
}

async fn build_transport(mock: bool) -> anyhow::Result<Arc<dyn BleTransport>> {
    if mock {
        Ok(Arc::new(MockTransport::with_default_roster()))
    } else {
        Ok(Arc::new(BtleplugTransport::new().await?))
    }
}

async fn handle_scan(mock: bool, seconds: u64) -> anyhow::Result<()> {
    let transport = build_transport(mock).await?;
    println!("Scanning for {seconds}s...\n");

    use futures::StreamExt;
    let mut stream = transport.start_scan(&[]).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut found = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            item = stream.next() => match item {
                Some(advertisement) => found.push(advertisement),
                None => break,
            }
        }
    }
    let _ = transport.stop_scan().await;

    if found.is_empty() {
        println!("No devices found.");
    } else {
        println!("{:<20} {:<30} {:>6}", "Handle", "Name", "RSSI");
        println!("{}", "-".repeat(60));
        for advertisement in found {
            let name = advertisement.local_name.unwrap_or_else(|| "(unknown)".to_string());
            println!("{:<20} {:<30} {:>6} dBm", advertisement.handle, name, advertisement.rssi);
        }
    }
    Ok(())
}

async fn handle_run(mock: bool) -> anyhow::Result<()> {
    let transport = build_transport(mock).await?;
    let sink = Arc::new(TracingEventSink::new());
    let engine = Engine::new(transport, sink, EngineConfig::default());

    engine.start().await;
    info!("engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    engine.stop().await;
    Ok(())
}
