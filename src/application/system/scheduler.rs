use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs `job` every `period` until `shutdown` is cancelled. The first run
/// happens one period after spawning. Jobs log their own failures.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!("Scheduler [{}]: Every {:?}", name, period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Scheduler [{}]: Stopped", name);
                    return;
                }
                _ = tokio::time::sleep(period) => {}
            }
            job().await;
        }
    })
}
