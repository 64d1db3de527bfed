use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gamewarden_config::WardenConfig;
use gamewarden_engine::ProtocolAdapter;
use gamewarden_simulator::{wait_until, FakeServer, Scenario};
use gamewarden_telemetry::EventLogger;
use tracing::{info, warn};

use crate::agent::Agent;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Administer a live game server
    Run(RunArgs),
    /// Run the agent against a scripted local server
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file; without it `config/gamewarden.yaml` and the
    /// environment are used
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Log filter, overriding the configured level
    #[arg(short, long)]
    pub log_level: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(short, long, default_value = "scenarios/demo.yaml")]
    pub scenario: PathBuf,
    /// Local port for the simulated server, 0 for any
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(short, long)]
    pub log_level: Option<String>,
    /// Seconds to keep running after the last scenario step
    #[arg(long, default_value_t = 2)]
    pub linger: u64,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WardenConfig> {
    let config = match path {
        Some(path) => WardenConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WardenConfig::load().context("loading configuration")?,
    };
    Ok(config)
}

fn init_logging(config: &WardenConfig, level: Option<&String>) -> anyhow::Result<()> {
    let level = level.unwrap_or(&config.telemetry.log_level);
    EventLogger::init(level)?;
    Ok(())
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_live(args),
        Commands::Simulate(args) => run_simulation(args),
    }
}

fn run_live(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;
    init_logging(&config, args.log_level.as_ref())?;
    info!(server = %config.server.address(), game = %config.server.game, "Starting gamewarden");

    let agent = Agent::start(&config)?;
    agent.stop_on_interrupt()?;
    agent.run()
}

fn run_simulation(args: SimulateArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    init_logging(&config, args.log_level.as_ref())?;

    let scenario = Scenario::load(&args.scenario)?;
    let bind = SocketAddr::from(([127, 0, 0, 1], args.port));
    let server = Arc::new(
        FakeServer::bind(&bind.to_string(), &scenario.password)
            .with_context(|| format!("binding simulated server on {bind}"))?,
    );
    scenario.install(&server);

    config.server.host = server.host();
    config.server.port = server.port();
    config.server.password = scenario.password.clone();
    info!(
        server = %server.addr(),
        steps = scenario.steps.len(),
        "Starting gamewarden against simulated server"
    );

    let agent = Agent::start(&config)?;
    agent.stop_on_interrupt()?;

    let running = Arc::new(AtomicBool::new(true));
    let player = {
        let running = running.clone();
        let adapter = agent.adapter.clone();
        let bus = agent.bus.clone();
        let server = server.clone();
        let linger = Duration::from_secs(args.linger);
        let connect_budget = config.connection.retry_budget();
        thread::Builder::new()
            .name("scenario".into())
            .spawn(move || {
                wait_until(connect_budget, || adapter.is_connected() || !bus.is_working());
                if !adapter.is_connected() {
                    warn!("Agent never connected, scenario not played");
                    return;
                }
                let played = scenario.play(&server, &running);
                info!(played, "Scenario finished");
                thread::sleep(linger);
                adapter.shutdown();
            })
            .context("spawning scenario thread")?
    };

    let result = agent.run();
    running.store(false, Ordering::Release);
    if player.join().is_err() {
        warn!("Scenario thread panicked");
    }
    server.stop();
    result
}
