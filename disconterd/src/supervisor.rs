use std::future::Future;
use std::time::Duration;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Run a listener task, restarting it after `delay` whenever it fails.
/// A failing listener never takes down the rest of the daemon. Returns once the
/// token is cancelled or the task finishes cleanly.
pub async fn supervise<F, Fut>(name: &'static str, delay: Duration, cancel: CancellationToken, mut task: F)
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        match task(cancel.clone()).await {
            Ok(()) => break,
            Err(e) => tracing::error!("{} failed: {:#}. Restarting in {:?}", name, e, delay),
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }
    }
}
