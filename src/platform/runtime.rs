use std::future::Future;
use std::time::Duration;

use futures::future::{select, Either};

/// Spawns an async task that runs in the background.
///
/// Uses the ambient tokio runtime when called from inside one and falls back to a
/// lazily-built single-worker runtime otherwise.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
        match Builder::new_multi_thread().worker_threads(1).enable_all().build() {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                log::warn!("failed to build background tokio runtime: {err}");
                None
            }
        }
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else if let Some(runtime) = BACKGROUND_RUNTIME.as_ref() {
        runtime.spawn(future);
    }
}

/// Asynchronously waits for the provided duration.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}

/// Resolves `future`, or `None` once `deadline` elapses first.
///
/// A `None` deadline waits for the future indefinitely.
pub async fn with_deadline<F>(future: F, deadline: Option<Duration>) -> Option<F::Output>
where
    F: Future,
{
    let Some(deadline) = deadline else {
        return Some(future.await);
    };
    let future = std::pin::pin!(future);
    let timer = std::pin::pin!(sleep(deadline));
    match select(future, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}
