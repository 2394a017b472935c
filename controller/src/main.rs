// hashpilot — arbitrates a mining fleet between P2Pool and XvB donation
// mining. Two periodic tasks share the state store: telemetry collection
// (short period) and the control loop (decided period).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use hashpilot_core::{StateStore, StoreOptions, TierTable};

use hashpilot_controller::actuator::Switcher;
use hashpilot_controller::client::{BonusClient, ProxyClient, WorkerClient};
use hashpilot_controller::config::Config;
use hashpilot_controller::control::ControlLoop;
use hashpilot_controller::telemetry::TelemetryTask;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cfg = Arc::new(Config::load());
    info!(data_dir = %cfg.data_dir.display(), "hashpilot starting");

    // The store is the only fatal startup dependency: without durable state
    // the controller cannot make auditable decisions.
    let store = StateStore::open(
        &cfg.data_dir,
        StoreOptions {
            history_retention: Duration::from_secs(cfg.history_retention_secs),
            worker_retention: Duration::from_secs(cfg.worker_retention_secs),
        },
    )
    .context("cannot open the state store")?;
    store.set_tiers(TierTable::new(cfg.tiers.clone()));

    let proxy = ProxyClient::new(&cfg.proxy).context("proxy client")?;
    let worker_client = WorkerClient::new(
        cfg.worker_api.port,
        Duration::from_millis(cfg.worker_api.timeout_ms),
    )
    .context("worker client")?;
    let bonus = BonusClient::new(&cfg.bonus).context("donation service client")?;

    let (telemetry, latest_rx) =
        TelemetryTask::new(cfg.clone(), store.clone(), proxy, worker_client.clone(), bonus);
    let switcher = Switcher::new(store.clone(), worker_client, cfg.pools.clone());
    let control = ControlLoop::new(cfg.clone(), store.clone(), switcher, latest_rx);

    tokio::spawn(telemetry.run());
    tokio::spawn(control.run());

    // On shutdown the in-flight hold is abandoned without a final switch:
    // the fleet stays in its last applied mode.
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; leaving fleet in its last applied mode");
    Ok(())
}
