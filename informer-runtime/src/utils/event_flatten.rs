use crate::watcher::{Error, Event};
use futures::{ready, Stream};
use pin_project::pin_project;
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// Objects carried by a watcher stream, without the event framing
///
/// Returned by [`applied_objects`](super::WatchStreamExt::applied_objects) and
/// [`touched_objects`](super::WatchStreamExt::touched_objects).
#[pin_project]
#[must_use = "streams do nothing unless polled"]
pub struct EventFlatten<St> {
    #[pin]
    events: St,
    with_deletes: bool,
}

impl<St> EventFlatten<St> {
    pub(super) fn new(events: St, with_deletes: bool) -> Self {
        Self { events, with_deletes }
    }
}

impl<St, K> Stream for EventFlatten<St>
where
    St: Stream<Item = Result<Event<K>, Error>>,
{
    type Item = Result<K, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            let object = match ready!(this.events.as_mut().poll_next(cx)) {
                None => return Poll::Ready(None),
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                Some(Ok(event)) => match event {
                    Event::Apply(obj) | Event::InitApply(obj) => obj,
                    Event::Delete(obj) if *this.with_deletes => obj,
                    Event::Delete(_) | Event::Init | Event::InitDone => continue,
                },
            };
            return Poll::Ready(Some(Ok(object)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EventFlatten;
    use crate::watcher::{Error, Event};
    use futures::{stream, StreamExt};

    fn relisting_session() -> Vec<Result<Event<&'static str>, Error>> {
        vec![
            Ok(Event::Init),
            Ok(Event::InitApply("a")),
            Ok(Event::InitDone),
            Ok(Event::Apply("b")),
            Ok(Event::Delete("a")),
            Err(Error::WatchClosed),
            Ok(Event::Init),
            Ok(Event::InitApply("b")),
            Ok(Event::InitDone),
        ]
    }

    fn render(items: Vec<Result<&str, Error>>) -> Vec<String> {
        items
            .into_iter()
            .map(|item| match item {
                Ok(obj) => obj.to_string(),
                Err(err) => format!("error: {err}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn applied_objects_skip_markers_and_deletes() {
        let items = EventFlatten::new(stream::iter(relisting_session()), false)
            .collect::<Vec<_>>()
            .await;
        let rendered = render(items);
        assert_eq!(rendered.len(), 4);
        assert_eq!(&rendered[..2], &["a", "b"]);
        assert!(rendered[2].starts_with("error: "));
        assert_eq!(rendered[3], "b");
    }

    #[tokio::test]
    async fn touched_objects_include_deletes() {
        let items = EventFlatten::new(stream::iter(relisting_session()), true)
            .filter_map(|item| async move { item.ok() })
            .collect::<Vec<_>>()
            .await;
        assert_eq!(items, vec!["a", "b", "a", "b"]);
    }
}
