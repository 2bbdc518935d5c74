use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use sous_driver::{DriverConfig, ObserverTarget};
use sous_kernel::{CookingKernel, MinuteAnnouncer};
use sous_protocol::{Clock, Recipe, ScaledClock, SessionEvent, Step, SystemClock};
use sous_store::{StoreConfig, TickPolicy};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "sousd")]
#[command(about = "Run one guided cooking session with polling timer observers")]
struct Cli {
    /// Recipe JSON file (a single recipe object). A built-in demo is used if omitted.
    #[arg(long)]
    recipe: Option<PathBuf>,
    /// Number of independent observers polling the session.
    #[arg(long, default_value_t = 2)]
    observers: usize,
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,
    /// Clock speed multiplier, e.g. 60 runs a minute per second.
    #[arg(long, default_value_t = 1)]
    speed: u32,
    /// Carry sub-second remainders between ticks instead of dropping them.
    #[arg(long)]
    carry_remainder: bool,
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

fn demo_recipe() -> Recipe {
    Recipe::new(
        "demo-tomato-soup",
        "Tomato soup",
        vec![
            Step::new("Sweat the onions and garlic", 2),
            Step::new("Add tomatoes and stock, simmer", 3),
            Step::new("Blend and season", 1),
        ],
    )
}

async fn load_recipe(path: &Path) -> Result<Recipe> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed reading recipe {path:?}"))?;
    let recipe: Recipe =
        serde_json::from_str(&raw).with_context(|| format!("failed parsing recipe {path:?}"))?;
    Ok(recipe)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if cli.observers == 0 {
        bail!("at least one observer is required to drive the session");
    }

    let recipe = match &cli.recipe {
        Some(path) => load_recipe(path).await?,
        None => demo_recipe(),
    };
    let recipe_id = recipe.id.clone();

    let base: Arc<dyn Clock> = Arc::new(SystemClock);
    let clock: Arc<dyn Clock> = if cli.speed > 1 {
        Arc::new(ScaledClock::new(base, cli.speed))
    } else {
        base
    };
    let tick_policy = if cli.carry_remainder {
        TickPolicy::CarryRemainder
    } else {
        TickPolicy::Truncate
    };

    let kernel = CookingKernel::builder()
        .clock(clock)
        .store_config(StoreConfig { tick_policy })
        .driver_config(DriverConfig {
            poll_interval_ms: cli.poll_interval_ms,
            ..DriverConfig::default()
        })
        .recipe(recipe)
        .build();

    let mut events = kernel.subscribe_events();
    kernel
        .start_recipe(&recipe_id)
        .with_context(|| format!("could not start session for {recipe_id}"))?;

    let observers: Vec<_> = (0..cli.observers)
        .map(|index| {
            let target = if index % 2 == 0 {
                ObserverTarget::ActiveSession
            } else {
                ObserverTarget::Recipe(recipe_id.clone())
            };
            kernel.attach_observer(target)
        })
        .collect();
    info!(recipe_id = %recipe_id, observers = observers.len(), speed = cli.speed, "session running");

    let mut announcer = MinuteAnnouncer::default();
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(record) => {
                    let rendered = serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_owned());
                    info!(event = %rendered, "session.event");
                    if let Some(view) = kernel.view(&recipe_id)
                        && let Some(message) = announcer.observe(&view)
                    {
                        info!(summary = %view.summary(), "{message}");
                    }
                    if matches!(record.event, SessionEvent::Ended { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "failed listening for ctrl-c");
                }
                info!("interrupted; ending session");
                let _ = kernel.end_session(&recipe_id);
                break;
            }
        }
    }

    for observer in observers {
        observer.stop().await;
    }
    info!(recipe_id = %recipe_id, "session finished");
    Ok(())
}
