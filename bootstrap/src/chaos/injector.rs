//! Background node killer for the whole suite

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::policy::FailurePolicy;
use super::schedule::ChaosSchedule;
use crate::cluster::{is_node_schedulable, is_node_untainted, SharedCluster};
use crate::error::BootstrapResult;

/// Handle to the running injector task
pub struct ChaosInjector {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ChaosInjector {
    /// Spawn the injection loop. It waits one jittered period before the
    /// first round and exits as soon as `stop` is cancelled.
    pub fn start(
        cluster: SharedCluster,
        policy: Arc<dyn FailurePolicy>,
        schedule: ChaosSchedule,
        stop: CancellationToken,
    ) -> Self {
        info!(
            interval = ?schedule.interval,
            jitter_factor = schedule.jitter_factor,
            failure_ratio = schedule.failure_ratio,
            "Starting chaos injector"
        );
        let token = stop.clone();
        let task = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            loop {
                let wait = schedule.next_wait(&mut rng);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                // A round in progress is abandoned on stop
                tokio::select! {
                    _ = token.cancelled() => break,
                    res = inject_round(&cluster, policy.as_ref(), &schedule, &mut rng) => {
                        if let Err(e) = res {
                            warn!(error = %e, "Chaos round failed");
                        }
                    }
                }
            }
            info!("Chaos injector stopped");
        });

        Self { stop, task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the loop and wait up to `grace` for it to exit
    pub async fn stop(self, grace: Duration) {
        self.stop.cancel();
        let abort = self.task.abort_handle();
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!(error = %e, "Chaos injector task panicked"),
            Err(_) => {
                warn!(?grace, "Chaos injector did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

async fn inject_round(
    cluster: &SharedCluster,
    policy: &dyn FailurePolicy,
    schedule: &ChaosSchedule,
    rng: &mut StdRng,
) -> BootstrapResult<()> {
    let eligible: Vec<String> = cluster
        .list_nodes()
        .await?
        .iter()
        .filter(|n| is_node_schedulable(n) && is_node_untainted(n))
        .filter_map(|n| n.metadata.name.clone())
        .collect();

    let victims = schedule.choose_victims(&eligible, rng);
    info!(
        eligible = eligible.len(),
        victims = ?victims,
        "Chaos round"
    );

    let results = join_all(victims.iter().map(|node| policy.fail_node(node))).await;
    for (node, res) in victims.iter().zip(results) {
        if let Err(e) = res {
            warn!(node = %node, error = %e, "Failed to inject node failure");
        }
    }
    Ok(())
}
