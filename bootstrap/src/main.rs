use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use e2e_bootstrap::{
    cluster::KubeCluster,
    config::Config,
    coordinator::{ExecutionCoordinator, HttpRendezvous, InProcessRendezvous, Rendezvous},
    setup::SuiteBootstrap,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let identity = config.executor_identity()?;
    tracing::info!(
        executor = identity.index,
        total = identity.total,
        role = %identity.role(),
        "Starting e2e bootstrap"
    );

    let cluster = KubeCluster::new(config.kubeconfig.as_deref()).await?;

    let rendezvous: Arc<dyn Rendezvous> = match &config.rendezvous_url {
        Some(url) if identity.total > 1 => Arc::new(HttpRendezvous::new(url)?),
        _ => Arc::new(InProcessRendezvous::new()),
    };

    let coordinator = ExecutionCoordinator::new(
        identity,
        rendezvous,
        config.rendezvous_poll_interval(),
        config.rendezvous_timeout(),
    );

    let bootstrap = SuiteBootstrap::new(Arc::new(cluster), config);
    let context = bootstrap.run(&coordinator).await?;
    println!("{}", serde_json::to_string_pretty(&context)?);

    if bootstrap.chaos_running().await {
        tracing::info!("Chaos injection running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        bootstrap.teardown().await;
    }

    Ok(())
}
