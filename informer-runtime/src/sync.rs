//! Tracking whether an informer's cache has been populated
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned by [`SyncBarrier::wait`] when the stop signal fires first
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("stopped before the cache synced")]
pub struct Stopped;

/// Becomes ready once the initial listing has been applied to the cache
///
/// Readiness is monotonic: a relist after a watch failure does not reset it.
/// Cloning produces another handle to the same barrier.
#[derive(Clone, Default, Debug)]
pub struct SyncBarrier(CancellationToken);

impl SyncBarrier {
    /// A barrier that has not synced yet
    #[must_use]
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// Whether the initial listing has been applied
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.0.is_cancelled()
    }

    pub(crate) fn mark_synced(&self) {
        self.0.cancel();
    }

    /// Wait until the cache has synced, or until `stop` fires
    ///
    /// A barrier that has already synced wins even if `stop` has fired too.
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] if `stop` fired before the cache synced.
    pub async fn wait(&self, stop: &CancellationToken) -> Result<(), Stopped> {
        tokio::select! {
            biased;
            () = self.0.cancelled() => Ok(()),
            () = stop.cancelled() => Err(Stopped),
        }
    }

    /// Like [`SyncBarrier::wait`], but reports the outcome as a `bool`
    pub async fn wait_for_sync(&self, stop: &CancellationToken) -> bool {
        self.wait(stop).await.is_ok()
    }
}

/// Wait for several caches to sync
///
/// Returns `false` as soon as `stop` fires before all of them have synced.
pub async fn wait_for_cache_sync<'a, I>(stop: &CancellationToken, barriers: I) -> bool
where
    I: IntoIterator<Item = &'a SyncBarrier>,
{
    for barrier in barriers {
        if barrier.wait(stop).await.is_err() {
            tracing::debug!("stopped while waiting for caches to sync");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{wait_for_cache_sync, Stopped, SyncBarrier};
    use futures::{pin_mut, poll, FutureExt};
    use std::task::Poll;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn it_is_not_synced_on_init() {
        assert!(!SyncBarrier::new().has_synced());
    }

    #[test]
    fn sync_is_shared_between_clones() {
        let barrier = SyncBarrier::new();
        let other = barrier.clone();
        barrier.mark_synced();
        assert!(other.has_synced());
    }

    #[tokio::test]
    async fn wait_resolves_once_synced() {
        let barrier = SyncBarrier::new();
        let stop = CancellationToken::new();
        let wait = barrier.wait(&stop);
        pin_mut!(wait);
        assert_eq!(poll!(wait.as_mut()), Poll::Pending);
        barrier.mark_synced();
        assert_eq!(poll!(wait.as_mut()), Poll::Ready(Ok(())));
    }

    #[tokio::test]
    async fn wait_is_aborted_by_stop() {
        let barrier = SyncBarrier::new();
        let stop = CancellationToken::new();
        stop.cancel();
        assert_eq!(barrier.wait(&stop).await, Err(Stopped));
        assert!(!barrier.wait_for_sync(&stop).await);
    }

    #[tokio::test]
    async fn synced_wins_over_stop() {
        let barrier = SyncBarrier::new();
        barrier.mark_synced();
        let stop = CancellationToken::new();
        stop.cancel();
        assert!(barrier.wait_for_sync(&stop).await);
    }

    #[tokio::test]
    async fn waits_for_every_barrier() {
        let (a, b) = (SyncBarrier::new(), SyncBarrier::new());
        let stop = CancellationToken::new();
        a.mark_synced();
        assert!(wait_for_cache_sync(&stop, [&a, &b]).now_or_never().is_none());
        b.mark_synced();
        assert_eq!(wait_for_cache_sync(&stop, [&a, &b]).now_or_never(), Some(true));
        assert_eq!(wait_for_cache_sync(&stop, std::iter::empty()).now_or_never(), Some(true));
    }
}
