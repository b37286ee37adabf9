use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use atbuilding::connector::api::{forward_events, Container, ContainerConfig, Router};
use atbuilding::{ConsoleLine, MockOptions, MockVentController, SummaryState};

/// How long to wait for buffered events to reach stdout on exit.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "run_atbuilding")]
#[command(author, version, about = "Run the AuxTel building CSC (dome vents and fan)", long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding `_init.toml` and config overrides
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Initial summary state
    #[arg(long, default_value = "standby", value_parser = parse_state)]
    state: SummaryState,

    /// Simulation mode: 0 = real controller, 1 = in-process mock controller
    #[arg(long, default_value_t = 0)]
    simulate: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run only the mock vent controller
    Mock {
        #[arg(short, long, default_value_t = 15080)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn parse_state(s: &str) -> Result<SummaryState, String> {
    SummaryState::parse(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    // Logs go to stderr; stdout carries the event stream.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Mock { port, host }) => run_mock(port, host).await,
        None => {
            run_csc(ContainerConfig {
                config_dir: cli.config_dir,
                initial_state: cli.state,
                simulation_mode: cli.simulate,
                mock_options: MockOptions::default(),
            })
            .await
        }
    }
}

async fn run_mock(port: u16, host: String) -> Result<()> {
    let options = MockOptions {
        host,
        ..MockOptions::default()
    };
    let mock = MockVentController::start(port, options).await?;
    info!("Mock vent controller running on port {}; Ctrl-C to stop", mock.port());

    tokio::signal::ctrl_c().await?;
    mock.close().await;
    Ok(())
}

/// Run the CSC with a line console on stdin; events go to stdout.
async fn run_csc(config: ContainerConfig) -> Result<()> {
    let container = Container::new(config)?;
    let printer = tokio::spawn(forward_events(container.subscribe(), tokio::io::stdout()));
    container.start_up().await?;

    let router = Router::new(&container);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let reply = match ConsoleLine::parse_line(line) {
            Ok(command) => router.handle(command).await,
            Err(e) => format!(
                "error: {}",
                e.to_string().lines().next().unwrap_or("invalid command")
            ),
        };
        println!("{}", reply);

        if container.csc().summary_state().await == SummaryState::Offline {
            break;
        }
    }

    container.shutdown().await;
    // The printer ends once the last publisher handle is gone.
    match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, printer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("Event output failed: {:#}", e),
        Ok(Err(e)) => warn!("Event output task ended abnormally: {}", e),
        Err(_) => warn!("Event output still busy after {:?}", EVENT_DRAIN_TIMEOUT),
    }
    info!("ATBuilding CSC stopped");
    Ok(())
}
