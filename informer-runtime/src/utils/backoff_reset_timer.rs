use super::ResettableBackoff;
use std::time::Duration;
use tokio::time::Instant;

/// A [`ResettableBackoff`] that only starts over once no delay was requested for a while
///
/// Resets requested by [`StreamBackoff`](super::StreamBackoff) after every successful item are
/// ignored. A source that keeps accepting lists but immediately drops every watch therefore
/// still sees the delay grow between relists.
#[derive(Debug)]
pub struct ResetTimerBackoff<B> {
    backoff: B,
    last_backoff: Option<Instant>,
    reset_duration: Duration,
}

impl<B: ResettableBackoff> ResetTimerBackoff<B> {
    /// Wrap `backoff`, resetting it when `reset_duration` passes between two delays
    pub fn new(backoff: B, reset_duration: Duration) -> Self {
        Self {
            backoff,
            last_backoff: None,
            reset_duration,
        }
    }
}

impl<B: ResettableBackoff> Iterator for ResetTimerBackoff<B> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let now = Instant::now();
        if let Some(last_backoff) = self.last_backoff {
            if now > last_backoff + self.reset_duration {
                tracing::debug!(
                    reset_duration = ?self.reset_duration,
                    "quiet for long enough, restarting backoff"
                );
                self.backoff.reset();
            }
        }
        self.last_backoff = Some(now);
        self.backoff.next()
    }
}

impl<B: ResettableBackoff> ResettableBackoff for ResetTimerBackoff<B> {
    // `next` resets once the timer has expired
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::ResetTimerBackoff;
    use crate::utils::{stream_backoff::tests::LinearBackoff, ResettableBackoff};
    use std::time::Duration;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn resets_only_after_a_quiet_period() {
        let mut backoff = ResetTimerBackoff::new(LinearBackoff::new(Duration::from_secs(2)), Duration::from_secs(60));
        assert_eq!(backoff.next(), Some(Duration::from_secs(2)));
        backoff.reset();
        advance(Duration::from_secs(40)).await;
        assert_eq!(backoff.next(), Some(Duration::from_secs(4)));
        backoff.reset();
        advance(Duration::from_secs(40)).await;
        assert_eq!(backoff.next(), Some(Duration::from_secs(6)));
        advance(Duration::from_secs(80)).await;
        assert_eq!(backoff.next(), Some(Duration::from_secs(2)));
        advance(Duration::from_secs(80)).await;
        assert_eq!(backoff.next(), Some(Duration::from_secs(2)));
    }
}
