use super::ResettableBackoff;
use futures::{ready, Stream, TryStream};
use pin_project::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::time::{sleep, Sleep};
use tracing::{debug, trace};

/// Pauses a stream of results after every error, according to a [`ResettableBackoff`]
///
/// The delay after an error is the next value of the backoff; any `Ok` item resets it.
/// When the backoff is exhausted the stream ends right after the error that exhausted it.
#[pin_project]
#[must_use = "streams do nothing unless polled"]
pub struct StreamBackoff<S, B> {
    #[pin]
    inner: S,
    policy: B,
    #[pin]
    phase: Phase,
}

#[pin_project(project = PhaseProj)]
// one per watcher, so the inline sleep is preferred over boxing it
#[allow(clippy::large_enum_variant)]
enum Phase {
    Polling,
    Waiting(#[pin] Sleep),
    Exhausted,
}

impl<S: TryStream, B: ResettableBackoff> StreamBackoff<S, B> {
    /// Wrap `inner`, pausing it according to `policy` after every error
    pub fn new(inner: S, policy: B) -> Self {
        Self {
            inner,
            policy,
            phase: Phase::Polling,
        }
    }
}

impl<S: TryStream, B: ResettableBackoff> Stream for StreamBackoff<S, B> {
    type Item = Result<S::Ok, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        match this.phase.as_mut().project() {
            PhaseProj::Exhausted => return Poll::Ready(None),
            PhaseProj::Waiting(delay) => {
                ready!(delay.poll(cx));
                trace!("backoff elapsed");
                this.phase.set(Phase::Polling);
            }
            PhaseProj::Polling => {}
        }

        let item = ready!(this.inner.try_poll_next(cx));
        match &item {
            Some(Err(_)) => match this.policy.next() {
                Some(delay) => {
                    debug!(?delay, "backing off after error");
                    this.phase.set(Phase::Waiting(sleep(delay)));
                }
                None => {
                    debug!("backoff exhausted, closing stream");
                    this.phase.set(Phase::Exhausted);
                }
            },
            Some(Ok(_)) => this.policy.reset(),
            None => {}
        }
        Poll::Ready(item)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::StreamBackoff;
    use crate::utils::{ResettableBackoff, ResettableBackoffWrapper};
    use backon::ConstantBuilder;
    use futures::{channel::mpsc, pin_mut, poll, stream, StreamExt};
    use std::{task::Poll, time::Duration};

    #[tokio::test(start_paused = true)]
    async fn errors_pause_the_stream() {
        let policy = ResettableBackoffWrapper::new(
            ConstantBuilder::default()
                .with_delay(Duration::from_secs(5))
                .without_max_times(),
        );
        let items = StreamBackoff::new(stream::iter([Err("list failed"), Ok("listed")]), policy);
        pin_mut!(items);
        assert_eq!(poll!(items.next()), Poll::Ready(Some(Err("list failed"))));
        assert_eq!(poll!(items.next()), Poll::Pending);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(poll!(items.next()), Poll::Pending);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(poll!(items.next()), Poll::Ready(Some(Ok("listed"))));
        assert_eq!(poll!(items.next()), Poll::Ready(None));
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_errors_grow_the_delay_until_an_ok() {
        let (tx, rx) = mpsc::unbounded::<Result<u32, u32>>();
        let items = StreamBackoff::new(rx, LinearBackoff::new(Duration::from_secs(1)));
        pin_mut!(items);

        tx.unbounded_send(Err(1)).unwrap();
        tx.unbounded_send(Err(2)).unwrap();
        tx.unbounded_send(Ok(3)).unwrap();
        tx.unbounded_send(Err(4)).unwrap();
        assert_eq!(poll!(items.next()), Poll::Ready(Some(Err(1))));
        // first delay is 1s
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(poll!(items.next()), Poll::Ready(Some(Err(2))));
        // second delay is 2s
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(poll!(items.next()), Poll::Pending);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(poll!(items.next()), Poll::Ready(Some(Ok(3))));
        assert_eq!(poll!(items.next()), Poll::Ready(Some(Err(4))));
        // reset by the ok, so back to 1s
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(tx);
        assert_eq!(poll!(items.next()), Poll::Ready(None));
    }

    #[tokio::test]
    async fn exhausted_backoff_ends_the_stream() {
        let policy = ResettableBackoffWrapper::new(
            ConstantBuilder::default()
                .with_delay(Duration::from_secs(1))
                .with_max_times(0),
        );
        let seen = StreamBackoff::new(stream::iter([Ok(1), Err(2), Ok(3)]), policy)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(seen, vec![Ok(1), Err(2)]);
    }

    /// Deterministic backoff that grows by a fixed step per error
    pub struct LinearBackoff {
        step: Duration,
        current: Duration,
    }

    impl LinearBackoff {
        pub fn new(step: Duration) -> Self {
            Self {
                step,
                current: Duration::ZERO,
            }
        }
    }

    impl Iterator for LinearBackoff {
        type Item = Duration;

        fn next(&mut self) -> Option<Duration> {
            self.current += self.step;
            Some(self.current)
        }
    }

    impl ResettableBackoff for LinearBackoff {
        fn reset(&mut self) {
            self.current = Duration::ZERO;
        }
    }
}
