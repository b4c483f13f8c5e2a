use std::{
    fmt,
    io::BufRead,
    path::{Path, PathBuf},
    rc::Rc,
    str::FromStr,
};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use drone_rescue_config::{DaemonConfig, DATABASE_URL_ENV};
use tokio::{
    sync::{broadcast, mpsc},
    task,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

mod firebase;
mod geoclue;
mod location;
mod map;
mod routing;
mod session;
mod sse;
mod status;
mod store;
mod target;
mod telemetry;

use firebase::Firebase;
use geoclue::GeoClue;
use map::TerminalMap;
use routing::Osrm;
use session::{LocationSync, SessionCommand};
use store::RealtimeStore;
use telemetry::{Cockpit, FlightMode, StoreWrite};

#[derive(Parser)]
#[command(name = "drone-rescue-daemon", version, about = "Drone rescue location sync and cockpit")]
struct Cli {
    /// Configuration file, defaults to $XDG_CONFIG_HOME/drone-rescue/config.ron
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow this device and the target, routing between them. Reads `recenter` from stdin.
    Map,
    /// Run the simulated cockpit panel. Reads controls such as `power` or `mode LOITER` from stdin.
    Cockpit,
    /// Set the engine flag once and exit
    Power { state: PowerState },
    /// Set the flight mode once and exit
    Mode { mode: FlightMode },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PowerState {
    On,
    Off,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        log::info!("termination requested");
        _ = signal_tx.send(());
    })
    .context("failed to install signal handler")?;

    task::LocalSet::new()
        .run_until(async move {
            match cli.command.unwrap_or(Commands::Map) {
                Commands::Map => {
                    let store = Firebase::new(&config.store.database_url)
                        .context("failed to create store client")?;
                    let router = Osrm::new(&config.routing).context("failed to create router")?;
                    let source = GeoClue::new(
                        config.positioning.desktop_id.clone(),
                        config.positioning.distance_threshold_m,
                    );

                    let sync = LocationSync::new(TerminalMap::default(), router, &config);

                    let mut status = sync.subscribe_status();
                    task::spawn_local(async move {
                        loop {
                            println!("{}", *status.borrow_and_update());
                            if status.changed().await.is_err() {
                                break;
                            }
                        }
                    });

                    sync.run(
                        source,
                        store,
                        stdin_commands::<SessionCommand>(),
                        shutdown_tx.subscribe(),
                    )
                    .await;
                }

                Commands::Cockpit => {
                    let store = Firebase::new(&config.store.database_url)
                        .context("failed to create store client")?;

                    telemetry::run(
                        Cockpit::new(config.store.clone()),
                        Rc::new(store),
                        &config.telemetry,
                        stdin_commands::<telemetry::Command>(),
                        shutdown_tx.subscribe(),
                    )
                    .await;
                }

                Commands::Power { state } => {
                    let write = StoreWrite::engine(&config.store, state == PowerState::On);
                    write_once(&config, write).await?;
                }

                Commands::Mode { mode } => {
                    write_once(&config, StoreWrite::flight_mode(&config.store, mode)).await?;
                }
            }

            Ok::<_, anyhow::Error>(())
        })
        .await
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DaemonConfig> {
    let mut config = match path.map(Path::to_owned).or_else(DaemonConfig::path) {
        Some(path) => DaemonConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            log::warn!("no configuration directory found, using defaults");
            DaemonConfig::default()
        }
    };

    config.apply_overrides(std::env::var(DATABASE_URL_ENV).ok());
    Ok(config)
}

async fn write_once(config: &DaemonConfig, write: StoreWrite) -> anyhow::Result<()> {
    let store =
        Firebase::new(&config.store.database_url).context("failed to create store client")?;

    store
        .set(&write.path, write.value.clone())
        .await
        .with_context(|| format!("failed to set {}", write.path))?;

    log::info!("set {} = {}", write.path, write.value);
    Ok(())
}

/// Parses stdin lines on a dedicated thread. Unparseable lines are logged and skipped.
fn stdin_commands<T>() -> UnboundedReceiverStream<T>
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display,
{
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::warn!("Failed to read stdin: {err:?}");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<T>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(err) => log::warn!("{err}"),
            }
        }
    });

    UnboundedReceiverStream::new(rx)
}
