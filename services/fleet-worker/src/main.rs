use anyhow::{bail, Context, Result};
use robofleet_core::{logging, FleetConfig};
use robofleet_orchestrator::{FleetOrchestrator, Job};
use robofleet_scheduler::LocalScheduler;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const WORKER_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct WorkerVersionHandshake {
    version: &'static str,
    protocol_version: u32,
    jobs: [&'static str; 6],
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    once: bool,
    version_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.version_json {
        let handshake = WorkerVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: WORKER_PROTOCOL_VERSION,
            jobs: [
                "fleet.health_check",
                "missions.process_scheduled",
                "missions.simulate_progress",
                "missions.schedule",
                "missions.simulate_until_complete",
                "robots.send_command",
            ],
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = FleetConfig::load(args.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging);

    info!(
        store = %config.store.path.display(),
        health_interval_secs = config.health.interval_secs,
        dispatch_interval_secs = config.dispatch.interval_secs,
        "Fleet worker starting"
    );

    if args.once {
        return run_once(config).await;
    }

    // Fail fast on an unusable store before scheduling anything
    FleetOrchestrator::open(&config).context("opening fleet store")?;

    let scheduler = LocalScheduler::new(config.clone())?;
    scheduler.spawn_periodic(Job::HealthCheck, config.health.interval());
    scheduler.spawn_periodic(Job::ProcessScheduled, config.dispatch.interval());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    scheduler.shutdown().await;
    Ok(())
}

/// One health check and one dispatch pass, reports printed as JSON
async fn run_once(config: FleetConfig) -> Result<()> {
    let reports = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
        let mut fleet = FleetOrchestrator::open(&config).context("opening fleet store")?;
        let health = fleet.run_fleet_health_check()?;
        let dispatch = fleet.run_mission_dispatch()?;
        Ok(serde_json::json!({
            "health": health,
            "dispatch": dispatch,
        }))
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--once" => parsed.once = true,
            "--version-json" => parsed.version_json = true,
            other => bail!("unrecognized argument: {other}"),
        }
    }
    Ok(parsed)
}
