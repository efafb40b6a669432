use crate::{
    utils::{event_flatten::EventFlatten, stream_backoff::StreamBackoff, ResettableBackoff},
    watcher::{self, DefaultBackoff},
};

use futures::{Stream, TryStream};

/// Extension trait for streams returned by [`watcher`](watcher())
pub trait WatchStreamExt: Stream {
    /// Apply the [`DefaultBackoff`] watcher [`ResettableBackoff`] policy
    ///
    /// This is recommended for controllers that want to play nicely with the source.
    fn default_backoff(self) -> StreamBackoff<Self, DefaultBackoff>
    where
        Self: TryStream + Sized,
    {
        StreamBackoff::new(self, DefaultBackoff::default())
    }

    /// Apply a specific [`ResettableBackoff`] policy to a [`Stream`] using [`StreamBackoff`]
    fn backoff<B>(self, b: B) -> StreamBackoff<Self, B>
    where
        B: ResettableBackoff,
        Self: TryStream + Sized,
    {
        StreamBackoff::new(self, b)
    }

    /// Flatten a [`watcher()`] stream into a stream of applied objects
    ///
    /// All Added/Modified events are passed through, and critical errors bubble up.
    fn applied_objects<K>(self) -> EventFlatten<Self>
    where
        Self: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Sized,
    {
        EventFlatten::new(self, false)
    }

    /// Flatten a [`watcher()`] stream into a stream of touched objects
    ///
    /// All Added/Modified/Deleted events are passed through, and critical errors bubble up.
    fn touched_objects<K>(self) -> EventFlatten<Self>
    where
        Self: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Sized,
    {
        EventFlatten::new(self, true)
    }
}

impl<St: ?Sized> WatchStreamExt for St where St: Stream {}

#[cfg(test)]
mod tests {
    use super::WatchStreamExt;
    use crate::watcher::{Error, Event};
    use futures::{stream, StreamExt};

    // not #[test] because this is only a compile check verification
    #[allow(dead_code, unused_must_use)]
    fn test_watcher_stream_type_drift() {
        let _ = stream::empty::<Result<Event<String>, Error>>()
            .default_backoff()
            .touched_objects()
            .boxed();
    }

    #[tokio::test]
    async fn applied_objects_skip_deletions() {
        let objs = stream::iter([
            Ok(Event::Init),
            Ok(Event::InitApply("a")),
            Ok(Event::InitDone),
            Ok(Event::Delete("a")),
            Ok(Event::Apply("b")),
        ])
        .applied_objects()
        .collect::<Vec<Result<&str, Error>>>()
        .await;
        let objs = objs.into_iter().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(objs, vec!["a", "b"]);
    }
}
