use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pettrak::duration::{format_duration, parse_duration};
use pettrak::{export, AccountSettings, LogSubscriber, Settings};
use pettrak_client::alphatrak::AlphaTrakClient;
use pettrak_coordinator::{ChannelSubscriber, PetRegistry, PetUpdate};
use pettrak_types::Pet;

/// Buffered updates for `--once`; the wait loop re-checks the registry, so
/// dropped updates only delay it.
const UPDATE_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "pettrak")]
#[command(about = "Poll AlphaTRAK pet glucose and activity logs into per-pet snapshots")]
struct Args {
    /// Path to a TOML config file (PETTRAK_* environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "pettrak_coordinator=debug" (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Wait for the first update of every pet, print metrics as JSON and exit
    #[arg(long)]
    once: bool,

    /// How long --once waits for updates (e.g. "90s", "2m")
    #[arg(long, default_value = "2m", requires = "once")]
    once_timeout: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let once_timeout = parse_duration(&args.once_timeout).context("Invalid --once-timeout")?;
    let settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;

    let client = AlphaTrakClient::builder()
        .endpoint(settings.cloud.endpoint.clone())
        .timeout(settings.cloud.request_timeout)
        .build()
        .context("Failed to build AlphaTRAK client")?;

    let mut builder = PetRegistry::builder(Arc::new(client))
        .backoff(settings.backoff())
        .call_timeout(settings.poll.call_timeout)
        .subscriber(Arc::new(LogSubscriber));

    // Only --once consumes updates; the daemon just logs them
    let updates = if args.once {
        let (subscriber, rx) = ChannelSubscriber::channel(UPDATE_BUFFER);
        builder = builder.subscriber(Arc::new(subscriber));
        Some(rx)
    } else {
        None
    };

    let registry = builder.build();
    let pets = register_accounts(&registry, &settings.accounts).await?;
    if pets.is_empty() {
        warn!("No pets matched the configured accounts");
    }

    match updates {
        Some(rx) => export_once(&registry, rx, once_timeout).await,
        None => run_until_shutdown(&registry).await,
    }
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for --once output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Discover each account's pets and register the wanted ones.
async fn register_accounts(
    registry: &PetRegistry,
    accounts: &[AccountSettings],
) -> Result<Vec<Pet>> {
    let mut registered = Vec::new();

    for account in accounts {
        let credential = account.credential();
        let discovered = registry
            .discover_pets(&credential)
            .await
            .with_context(|| format!("Failed to list pets for {}", account.username))?;

        info!(
            username = %account.username,
            pets = discovered.len(),
            "Discovered pets"
        );

        for wanted in &account.pets {
            if !discovered.iter().any(|pet| pet.id.0 == *wanted) {
                warn!(
                    username = %account.username,
                    pet_id = wanted,
                    "Configured pet not found on account"
                );
            }
        }

        for pet in discovered.into_iter().filter(|pet| account.wants(pet.id)) {
            registry.register_pet(credential.clone(), pet.clone());
            registered.push(pet);
        }
    }

    Ok(registered)
}

/// Poll until Ctrl-C.
async fn run_until_shutdown(registry: &PetRegistry) -> Result<()> {
    info!(pets = registry.pets().len(), "Polling, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    for pet in registry.pets() {
        registry.deregister_pet(pet.id);
    }
    Ok(())
}

/// A pet is settled once it has a snapshot or has stopped being polled.
fn all_settled(registry: &PetRegistry) -> bool {
    registry.pets().iter().all(|pet| {
        registry.status(pet.id).is_none_or(|status| {
            status.last_success.is_some() || !status.availability.is_active()
        })
    })
}

/// Wait for every pet's first update, then print the metric map to stdout.
async fn export_once(
    registry: &PetRegistry,
    mut updates: mpsc::Receiver<PetUpdate>,
    timeout: Duration,
) -> Result<()> {
    let waited = tokio::time::timeout(timeout, async {
        while !all_settled(registry) {
            if updates.recv().await.is_none() {
                break;
            }
        }
    })
    .await;

    if waited.is_err() {
        warn!(
            timeout = %format_duration(timeout),
            "Timed out waiting for every pet's first update"
        );
    }

    let json = serde_json::to_string_pretty(&export::registry_to_json(registry))?;
    println!("{}", json);
    Ok(())
}
