//! openenv server
//!
//! Waits for agents on a TCP port, attaches one demo environment per agent
//! and runs the simulation until every episode ends or the time limit hits.
//!
//! Usage: `openenv-server [config.json]`

mod config;
mod demo;

use anyhow::Result;
use config::CliConfig;
use demo::DemoEnv;
use openenv_bridge::AgentListener;
use openenv_runtime::{Session, SimTime};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match std::env::args().nth(1) {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    config.validate()?;
    info!("openenv server starting with {:?}", config);

    let listener = AgentListener::bind(config.listen.as_str())?;
    info!("Listening on {}", listener.local_addr()?);

    let mut session = Session::new();
    for index in 0..config.environments {
        info!(
            "Waiting for agent {}/{}...",
            index + 1,
            config.environments
        );
        let transport = listener.accept()?;
        let env = DemoEnv::new(&config.demo, index as u64)?;
        session.add_environment(env, transport, config.controller_config())?;
    }

    let summary = match config.sim_time_limit_secs {
        Some(limit) => session.run_until(SimTime::from_secs_f64(limit))?,
        None => session.run()?,
    };
    session.close_all("simulation finished")?;

    for entry in session.registry().list() {
        info!(
            env_id = entry.env_id,
            steps = entry.steps,
            total_reward = entry.total_reward,
            "{} finished ({:?})",
            entry.name,
            entry.status
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
