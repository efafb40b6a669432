use std::{ops::DerefMut, time::Duration};

use backon::{Backoff, BackoffBuilder};

/// A [`Backoff`] that can start over after a success
///
/// Implemented by [`ResettableBackoffWrapper`].
// object safe, so reflectors can hold any policy boxed
pub trait ResettableBackoff: Backoff {
    /// Start over from the first delay
    fn reset(&mut self);
}

impl ResettableBackoff for Box<dyn ResettableBackoff + Send> {
    fn reset(&mut self) {
        Box::deref_mut(self).reset();
    }
}

/// Makes any [`BackoffBuilder`] resettable by building a new [`Backoff`] after every reset
#[derive(Debug)]
pub struct ResettableBackoffWrapper<B: BackoffBuilder> {
    builder: B,
    current: Option<B::Backoff>,
}

impl<B: BackoffBuilder> ResettableBackoffWrapper<B> {
    /// Wrap a builder, building a fresh backoff on first use and after every reset
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            current: None,
        }
    }
}

impl<B: BackoffBuilder + Default> Default for ResettableBackoffWrapper<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B: BackoffBuilder + Clone> Iterator for ResettableBackoffWrapper<B> {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.current
            .get_or_insert_with(|| self.builder.clone().build())
            .next()
    }
}

impl<B: BackoffBuilder + Clone> ResettableBackoff for ResettableBackoffWrapper<B> {
    fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{ResettableBackoff, ResettableBackoffWrapper};
    use backon::{ConstantBuilder, ExponentialBuilder};
    use std::time::Duration;

    #[test]
    fn reset_starts_from_the_first_delay() {
        let mut backoff = ResettableBackoffWrapper::new(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(1))
                .with_factor(2.0)
                .without_max_times(),
        );
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(4)));
        backoff.reset();
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn limited_backoffs_run_out_until_reset() {
        let mut backoff = ResettableBackoffWrapper::new(
            ConstantBuilder::default()
                .with_delay(Duration::from_secs(1))
                .with_max_times(1),
        );
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next(), None);
        backoff.reset();
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
    }
}
