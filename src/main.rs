//! kraz - IRC bot.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kraz::{engine, module, Config, Engine, Identity, Supervisor, TlsConnector};

#[derive(Parser)]
#[command(name = "kraz", version, about = "IRC bot with scheduled modules")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./kraz.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).map_err(|e| {
        error!(path = %cli.config.display(), error = %e, "Failed to load config");
        e
    })?;

    info!(
        nick = %config.nick,
        servers = config.servers.len(),
        channels = config.channels.len(),
        sasl = config.sasl.is_some(),
        "Starting kraz"
    );

    let modules = module::from_config(&config, Utc::now()).context("failed to build modules")?;
    let (engine_links, supervisor_links) = engine::links();

    let identity = Identity {
        nick: config.nick.clone(),
        sasl: config.sasl.clone(),
    };
    let engine = Engine::new(identity, config.channels.clone(), modules, engine_links);
    let connector = TlsConnector::new(config.servers.clone(), config.verify_cert);
    let supervisor = Supervisor::new(connector, supervisor_links);

    tokio::select! {
        _ = engine.run() => {
            error!("protocol engine stopped");
            anyhow::bail!("protocol engine stopped unexpectedly");
        }
        res = supervisor.run() => {
            res.context("connection supervisor failed")?;
        }
    }
    Ok(())
}
