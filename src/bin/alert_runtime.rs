//! Alert Runtime - polls today's sales and keeps the pending alert list
//!
//! This binary:
//! - Loads configuration from the environment (.env supported)
//! - Builds the lifecycle controller (optionally restoring a JSON snapshot)
//! - Spawns the poll scheduler against the SQLite or mock sales reader
//! - Reads operator commands from stdin until CTRL+C / EOF
//!
//! Usage:
//!   cargo run --release --bin alert_runtime
//!
//! Operator commands (one per line):
//!   list | history [synced|not-online] | sync <id> | not-online <id> | interval <minutes>
//!
//! Environment variables:
//!   SALES_DB_PATH - SQLite database path (default: data/sales.db)
//!   SALES_TABLE - table of sold lines (default: sales)
//!   POLL_INTERVAL_MINUTES - poll cadence, 1-60 (default: 5)
//!   MOCK_MODE - generate fake sales (default: false)
//!   ALERT_IDENTITY_SCHEME - bill-item-line | bill-item (default: bill-item-line)
//!   ALERT_SNAPSHOT_PATH - JSON snapshot file (default: unset)

use dotenv::dotenv;
use log::{error, info, warn};
use salesync::persistence::PersistenceConfig;
use salesync::pipeline::{
    AlertConfig, AlertError, AlertId, LifecycleController, MockSalesReader, PollScheduler,
    ResolutionOutcome, SalesReader, SqliteSalesReader, Urgency,
};
use salesync::pipeline::types::current_timestamp;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

const COMMANDS: &str =
    "list | history [synced|not-online] | sync <id> | not-online <id> | interval <minutes>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Alert Runtime");

    let config = AlertConfig::from_env()?;

    info!("📊 Configuration:");
    info!("   ├─ Reader: {}", if config.mock_mode { "mock" } else { "sqlite" });
    info!("   ├─ Database: {} (table: {})", config.sales_db_path, config.sales_table);
    info!("   ├─ Poll interval: {}", config.poll_interval);
    info!("   ├─ Identity scheme: {}", config.identity_scheme.as_str());
    match &config.snapshot_path {
        Some(path) => info!("   └─ Snapshot: {}", path.display()),
        None => info!("   └─ Snapshot: disabled (in-memory only)"),
    }

    let mut controller = LifecycleController::new(config.identity_scheme);
    if let Some(path) = &config.snapshot_path {
        controller = controller.with_persistence(PersistenceConfig::new(path))?;
    }
    let controller = Arc::new(controller);
    info!(
        "✅ Lifecycle controller ready ({} pending, {} in history, identities: {})",
        controller.list_pending().len(),
        controller.history_counts().total(),
        controller.identity_scheme().as_str()
    );

    let reader: Arc<dyn SalesReader> = if config.mock_mode {
        Arc::new(MockSalesReader::new())
    } else {
        let reader = SqliteSalesReader::new(&config.sales_db_path, &config.sales_table)?;
        if !reader.db_path().exists() {
            warn!(
                "⚠️  Sales database {} not found yet, polls will fail until it appears",
                reader.db_path().display()
            );
        }
        Arc::new(reader)
    };

    let scheduler = PollScheduler::start(controller.clone(), reader, config.poll_interval);

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let mut lines = spawn_stdin_reader();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                    Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
                }
                break;
            }
            line = lines.recv() => {
                match line {
                    Some(line) => handle_command(line.trim(), &controller, &scheduler),
                    None => {
                        // stdin closed (daemonized): keep polling until CTRL+C
                        if let Err(err) = tokio::signal::ctrl_c().await {
                            error!("❌ Failed to listen for CTRL+C: {}", err);
                        }
                        info!("⚠️  Received CTRL+C, shutting down...");
                        break;
                    }
                }
            }
        }
    }

    scheduler.stop().await;

    let counts = controller.history_counts();
    info!("📊 Final state:");
    info!(
        "   ├─ Pending: {} across {} bills",
        controller.list_pending().len(),
        controller.pending_by_bill().len()
    );
    info!("   └─ Resolved: {} synced, {} not online", counts.synced, counts.not_online);
    info!("✅ Alert runtime stopped");
    Ok(())
}

/// Forward stdin lines from a plain thread
///
/// A blocked stdin read must not keep the tokio runtime from shutting down.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!("❌ Failed to read operator input: {}", err);
                    break;
                }
            }
        }
    });
    rx
}

fn handle_command(line: &str, controller: &LifecycleController, scheduler: &PollScheduler) {
    let mut parts = line.split_whitespace();
    let command = match parts.next() {
        Some(command) => command,
        None => return,
    };
    let arg = parts.next();

    match (command, arg) {
        ("list", _) => {
            let now = current_timestamp();
            let pending = controller.list_pending();
            println!("{} pending alerts", pending.len());
            for alert in pending {
                println!(
                    "  {:<24} sku={:<16} qty={:<6} {:?}",
                    alert.id.as_str(),
                    alert.sku,
                    alert.quantity,
                    Urgency::classify(alert.sold_at, now)
                );
            }
        }
        ("history", filter) => {
            let filter = match filter {
                Some("synced") => Some(ResolutionOutcome::Synced),
                Some("not-online") => Some(ResolutionOutcome::NotOnline),
                Some(other) => {
                    println!("unknown history filter '{}'", other);
                    return;
                }
                None => None,
            };
            for alert in controller.list_history(filter) {
                println!(
                    "  {:<24} sku={:<16} {:?} at {}",
                    alert.id.as_str(),
                    alert.sku,
                    alert.state,
                    alert.resolved_at.unwrap_or_default()
                );
            }
        }
        ("sync", Some(id)) => report_resolution(controller.mark_synced(&AlertId::from(id))),
        ("not-online", Some(id)) => {
            report_resolution(controller.mark_not_online(&AlertId::from(id)))
        }
        ("interval", Some(raw)) => match raw.parse::<u32>() {
            Ok(minutes) => match scheduler.set_polling_interval_minutes(minutes) {
                Ok(()) => println!("polling every {}", scheduler.interval()),
                Err(e) => println!("{}", e),
            },
            Err(_) => println!("interval must be a whole number of minutes"),
        },
        _ => println!("commands: {}", COMMANDS),
    }
}

fn report_resolution(result: Result<salesync::pipeline::Alert, AlertError>) {
    match result {
        Ok(alert) => println!("{} -> {:?}", alert.id, alert.state),
        // Stale view: tell the operator to refresh rather than retry
        Err(e @ AlertError::NotFound(_)) => println!("{} (refresh with 'list')", e),
        Err(e @ AlertError::Persistence(_)) => {
            println!("resolved, but not saved to the snapshot: {}", e)
        }
        Err(e) => warn!("Resolution failed: {}", e),
    }
}
