//! Watches a remote collection for changes, with error recovery
//!
//! See [`watcher`] for the primary entry point.

use crate::utils::{ResetTimerBackoff, ResettableBackoff, ResettableBackoffWrapper};
use backon::ExponentialBuilder;
use educe::Educe;
use futures::{Stream, StreamExt};
use informer_core::{params::ListParams, BoxWatchStream, ErrorResponse, RemoteSource, Resource, WatchEvent};
use std::{fmt::Debug, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by the [`watcher`] stream
///
/// None of these are fatal: the stream keeps recovering on the next poll.
#[derive(Debug, Error)]
pub enum Error {
    /// The initial listing (or one of its pages) failed
    #[error("failed to perform initial object list: {0}")]
    InitialListFailed(#[source] informer_core::Error),
    /// The source refused to start a watch
    #[error("failed to start watching object: {0}")]
    WatchStartFailed(#[source] informer_core::Error),
    /// The source sent an error event on an open watch
    #[error("error returned by the source during watch: {0}")]
    WatchError(#[source] ErrorResponse),
    /// The watch stream broke
    #[error("watch stream failed: {0}")]
    WatchFailed(#[source] informer_core::Error),
    /// The source ended the watch, typically because its timeout elapsed
    #[error("watch stream was closed by the source")]
    WatchClosed,
}

/// Convenient alias for `Result<T, watcher::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Watch events returned from the [`watcher`]
#[derive(Debug, Clone, PartialEq)]
pub enum Event<K> {
    /// An object was added or modified
    Apply(K),
    /// An object was deleted
    ///
    /// NOTE: This should not be used for managing persistent state elsewhere, since
    /// events may be lost if the watcher is unavailable. A relist is the only reliable
    /// way of noticing deletions that happened while disconnected.
    Delete(K),
    /// The watch stream was restarted
    ///
    /// A series of `InitApply` events are expected to follow until all matching objects
    /// have been listed. This event can be used to prepare a buffer for `InitApply` events.
    Init,
    /// Received an object during `Init`
    ///
    /// Objects returned here are either from the initial stream using the page size, or from a relist.
    InitApply(K),
    /// The initialisation is complete
    ///
    /// This can be used as a signal to replace buffered store contents atomically.
    /// No more `InitApply` events will happen until the next `Init` event.
    ///
    /// Any objects that were previously [`Apply`ed](Event::Apply) but are not listed in any of
    /// the `InitApply` events should be assumed to have been [`Delete`d](Event::Delete).
    InitDone,
}

impl<K> Event<K> {
    /// Flattens out all objects that were added or modified in the event.
    ///
    /// `Delete` objects are ignored, all objects mentioned by `InitApply` events are
    /// emitted individually.
    pub fn into_iter_applied(self) -> impl Iterator<Item = K> {
        match self {
            Event::Apply(obj) | Event::InitApply(obj) => Some(obj),
            Event::Delete(_) | Event::Init | Event::InitDone => None,
        }
        .into_iter()
    }

    /// Flattens out all objects that were added, modified, or deleted in the event.
    ///
    /// Note that `Delete` events may be missed when restarting the stream.
    pub fn into_iter_touched(self) -> impl Iterator<Item = K> {
        match self {
            Event::Apply(obj) | Event::Delete(obj) | Event::InitApply(obj) => Some(obj),
            Event::Init | Event::InitDone => None,
        }
        .into_iter()
    }

    /// Map each object in an event through a mutator fn
    ///
    /// This allows for memory optimizations in watch streams.
    /// If you are chaining a watch stream into a reflector as an in memory state store,
    /// you can control the space used by each object by dropping fields.
    #[must_use]
    pub fn modify(mut self, mut f: impl FnMut(&mut K)) -> Self {
        match &mut self {
            Event::Apply(obj) | Event::Delete(obj) | Event::InitApply(obj) => (f)(obj),
            Event::Init | Event::InitDone => {}
        }
        self
    }
}

#[derive(Educe)]
#[educe(Debug)]
/// The internal finite state machine driving the [`watcher`]
enum State<K> {
    /// The Watcher is empty, and the next poll will start the initial LIST to get all existing objects
    Empty,
    /// The Watcher is in the process of paginating through the initial LIST
    ///
    /// `continue_token` is set when more pages have to be fetched after `objects` are drained.
    InitPage {
        continue_token: Option<String>,
        resource_version: String,
        #[educe(Debug(ignore))]
        objects: std::vec::IntoIter<K>,
    },
    /// The initial LIST was successful, so we should move on to starting the actual watch.
    InitListed { resource_version: String },
    /// The watch is in progress, from this point we just return events from the source.
    ///
    /// If the connection is disrupted or closed then we propagate an error and fall back to
    /// doing a full relist with `Empty`.
    Watching {
        resource_version: String,
        #[educe(Debug(ignore))]
        stream: BoxWatchStream<K>,
    },
}

/// Accumulates all options that can be used on the watcher invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Restrict the watch to a single namespace
    ///
    /// Defaults to all namespaces.
    pub namespace: Option<String>,

    /// A selector to restrict the list of returned objects by their labels.
    ///
    /// Defaults to everything if `None`.
    pub label_selector: Option<String>,

    /// A selector to restrict the list of returned objects by their fields.
    ///
    /// Defaults to everything if `None`.
    pub field_selector: Option<String>,

    /// Timeout for the list/watch call.
    ///
    /// This limits the duration of the call, regardless of any activity or inactivity.
    /// If unset for a watch call, the source decides when to close the watch.
    /// After a watch ends, the watcher relists.
    pub timeout: Option<u32>,

    /// Maximum number of objects retrieved per list operation
    ///
    /// Defaults to 500. `None` fetches the whole listing in one call.
    pub page_size: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            field_selector: None,
            timeout: None,
            page_size: Some(500),
        }
    }
}

/// Builder interface to Config
///
/// Usage:
/// ```
/// use informer_runtime::watcher::Config;
/// let wc = Config::default()
///     .within("default")
///     .timeout(60)
///     .labels("app=nginx");
/// ```
impl Config {
    /// Restrict the watch to a namespace
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Configure the timeout for list/watch calls
    ///
    /// This limits the duration of the call, regardless of any activity or inactivity.
    #[must_use]
    pub fn timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    /// Configure the selector to restrict the list of returned objects by their fields.
    ///
    /// Supports `=`, `==`, `!=` on `metadata.name` and `metadata.namespace`.
    #[must_use]
    pub fn fields(mut self, field_selector: &str) -> Self {
        self.field_selector = Some(field_selector.to_string());
        self
    }

    /// Configure the selector to restrict the list of returned objects by their labels.
    #[must_use]
    pub fn labels(mut self, label_selector: &str) -> Self {
        self.label_selector = Some(label_selector.to_string());
        self
    }

    /// Sets list semantic to paginate with a given size per page, or disables paging with `None`
    #[must_use]
    pub fn page_size(mut self, page_size: impl Into<Option<u32>>) -> Self {
        self.page_size = page_size.into();
        self
    }

    /// Converts generic `watcher::Config` structure to the instance of `ListParams` used for list requests.
    fn to_list_params(&self) -> ListParams {
        ListParams {
            namespace: self.namespace.clone(),
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            timeout: self.timeout,
            limit: self.page_size,
            continue_token: None,
        }
    }

    /// Converts generic `watcher::Config` structure to the instance of `ListParams` used for watch requests.
    fn to_watch_params(&self) -> ListParams {
        ListParams {
            limit: None,
            ..self.to_list_params()
        }
    }
}

async fn list_page<K, S>(
    source: &S,
    config: &Config,
    continue_token: Option<String>,
) -> informer_core::Result<(Option<String>, String, Vec<K>)>
where
    S: RemoteSource<K> + ?Sized,
{
    let mut params = config.to_list_params();
    params.continue_token = continue_token;
    let list = source.list(&params).await?;
    let continue_token = list.metadata.continue_.filter(|t| !t.is_empty());
    let resource_version = list.metadata.resource_version.unwrap_or_default();
    Ok((continue_token, resource_version, list.items))
}

/// Progresses the watcher a single step, returning (event, state)
///
/// This function should be trampolined: if event == `None`
/// then the function should be called again until it returns a Some.
async fn step_trampolined<K, S>(source: &S, config: &Config, state: State<K>) -> (Option<Result<Event<K>>>, State<K>)
where
    K: Resource + Send + 'static,
    S: RemoteSource<K> + ?Sized,
{
    match state {
        State::Empty => match list_page(source, config, None).await {
            Ok((continue_token, resource_version, objects)) => {
                debug!(kind = K::KIND, %resource_version, "listed first page");
                (Some(Ok(Event::Init)), State::InitPage {
                    continue_token,
                    resource_version,
                    objects: objects.into_iter(),
                })
            }
            Err(err) => {
                if err.is_forbidden() {
                    warn!(kind = K::KIND, "watch list error with 403: {err:?}");
                } else {
                    debug!(kind = K::KIND, "watch list error: {err:?}");
                }
                (Some(Err(Error::InitialListFailed(err))), State::Empty)
            }
        },
        State::InitPage {
            continue_token,
            resource_version,
            mut objects,
        } => {
            if let Some(obj) = objects.next() {
                return (Some(Ok(Event::InitApply(obj))), State::InitPage {
                    continue_token,
                    resource_version,
                    objects,
                });
            }
            let Some(token) = continue_token else {
                info!(kind = K::KIND, %resource_version, "initial list complete");
                return (Some(Ok(Event::InitDone)), State::InitListed { resource_version });
            };
            match list_page(source, config, Some(token)).await {
                Ok((continue_token, resource_version, objects)) => (None, State::InitPage {
                    continue_token,
                    resource_version,
                    objects: objects.into_iter(),
                }),
                Err(err) => {
                    debug!(kind = K::KIND, "watch list page error: {err:?}");
                    (Some(Err(Error::InitialListFailed(err))), State::Empty)
                }
            }
        }
        State::InitListed { resource_version } => {
            match source.watch(&config.to_watch_params(), &resource_version).await {
                Ok(stream) => {
                    debug!(kind = K::KIND, %resource_version, "watch started");
                    (None, State::Watching {
                        resource_version,
                        stream,
                    })
                }
                Err(err) => {
                    if err.is_forbidden() {
                        warn!(kind = K::KIND, "watch initlist error with 403: {err:?}");
                    } else {
                        debug!(kind = K::KIND, "watch initlist error: {err:?}");
                    }
                    // The version we listed at has already been compacted away, so start over
                    let next = if err.is_gone() {
                        State::Empty
                    } else {
                        State::InitListed { resource_version }
                    };
                    (Some(Err(Error::WatchStartFailed(err))), next)
                }
            }
        }
        State::Watching {
            resource_version,
            mut stream,
        } => match stream.next().await {
            Some(Ok(WatchEvent::Added(obj) | WatchEvent::Modified(obj))) => {
                let resource_version = obj.meta().resource_version.clone().unwrap_or(resource_version);
                (Some(Ok(Event::Apply(obj))), State::Watching {
                    resource_version,
                    stream,
                })
            }
            Some(Ok(WatchEvent::Deleted(obj))) => {
                let resource_version = obj.meta().resource_version.clone().unwrap_or(resource_version);
                (Some(Ok(Event::Delete(obj))), State::Watching {
                    resource_version,
                    stream,
                })
            }
            Some(Ok(WatchEvent::Bookmark(bm))) => (None, State::Watching {
                resource_version: bm.metadata.resource_version,
                stream,
            }),
            Some(Ok(WatchEvent::Error(err))) => {
                if err.is_gone() {
                    debug!(kind = K::KIND, %resource_version, "watch window expired: {err:?}");
                } else {
                    warn!(kind = K::KIND, "watch error event: {err:?}");
                }
                (Some(Err(Error::WatchError(err))), State::Empty)
            }
            Some(Err(err)) => {
                warn!(kind = K::KIND, "watcher error: {err:?}");
                (Some(Err(Error::WatchFailed(err))), State::Empty)
            }
            None => {
                debug!(kind = K::KIND, %resource_version, "watch closed by source");
                (Some(Err(Error::WatchClosed)), State::Empty)
            }
        },
    }
}

/// Trampoline helper for `step_trampolined`
async fn step<K, S>(source: &S, config: &Config, mut state: State<K>) -> (Result<Event<K>>, State<K>)
where
    K: Resource + Send + 'static,
    S: RemoteSource<K> + ?Sized,
{
    loop {
        match step_trampolined(source, config, state).await {
            (Some(result), new_state) => return (result, new_state),
            (None, new_state) => state = new_state,
        }
    }
}

/// Watches a remote collection for changes continuously
///
/// Compared to [`RemoteSource::watch`], this automatically tries to recover the stream upon errors.
///
/// Errors from the underlying watch are propagated, after which the stream will go into recovery mode
/// on the next poll. You can apply your own backoff by not polling the stream for a duration after errors.
/// Keep in mind that some [`TryStream`](futures::TryStream) combinators (such as
/// [`try_for_each`](futures::TryStreamExt::try_for_each) and [`try_concat`](futures::TryStreamExt::try_concat))
/// will terminate eagerly as soon as they receive an [`Err`].
///
/// The stream will attempt to be recovered on the next poll after an [`Err`] is returned.
/// This will normally happen immediately, but you can use [`StreamBackoff`](crate::utils::StreamBackoff)
/// to introduce an artificial delay. [`default_backoff`] returns a suitable default set of parameters.
///
/// This is intended to provide a safe and atomic input interface for a state store like a
/// [`Reflector`](crate::reflector::Reflector). Direct users may want to use
/// [`WatchStreamExt`](crate::WatchStreamExt) for higher-level constructs:
///
/// ```
/// use futures::TryStreamExt;
/// use informer_core::{RemoteSource, Resource, ResourceExt};
/// use informer_runtime::{watcher, WatchStreamExt};
///
/// async fn print_applied<K, S>(source: S) -> Result<(), watcher::Error>
/// where
///     K: Resource + Send + 'static,
///     S: RemoteSource<K> + 'static,
/// {
///     watcher(source, watcher::Config::default().fields("metadata.name=web"))
///         .default_backoff()
///         .applied_objects()
///         .try_for_each(|obj| async move {
///             println!("saw {} at {:?}", obj.name_any(), obj.resource_version());
///             Ok(())
///         })
///         .await
/// }
/// ```
///
/// # Recovery
///
/// (The details of recovery are considered an implementation detail and should not be relied on to be stable, but are
/// documented here for posterity.)
///
/// Whenever the watch ends, whether the source closed it, it broke, or the source reported an error on it,
/// the watcher starts over with a full list, surfacing the end of the watch as an [`Err`] first.
/// The new listing is announced with [`Event::Init`], so that consumers can compare it against what
/// they have seen and notice deletions that happened while the watch was down.
///
/// If starting the watch fails, the watch is retried from the same version, unless the version
/// is no longer available (`410 Gone`), in which case the watcher relists.
pub fn watcher<K, S>(source: S, config: Config) -> impl Stream<Item = Result<Event<K>>> + Send
where
    K: Resource + Send + 'static,
    S: RemoteSource<K> + 'static,
{
    futures::stream::unfold(
        (source, config, State::Empty),
        |(source, config, state)| async {
            let (event, state) = step(&source, &config, state).await;
            Some((event, (source, config, state)))
        },
    )
}

/// The backoff used by informers unless configured otherwise, see [`DefaultBackoff`]
#[must_use]
pub fn default_backoff() -> DefaultBackoff {
    DefaultBackoff::default()
}

/// Default watcher backoff inspired by client-go's reflector
///
/// Retries forever: starts at 800ms, doubles on every consecutive error up to 30s, with jitter.
/// The delay only starts over after two minutes without errors, so a watch that keeps failing
/// right after a successful list is still retried less and less often.
pub struct DefaultBackoff(Strategy);

type Strategy = ResetTimerBackoff<ResettableBackoffWrapper<ExponentialBuilder>>;

impl Default for DefaultBackoff {
    fn default() -> Self {
        Self(ResetTimerBackoff::new(
            ResettableBackoffWrapper::new(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(800))
                    .with_max_delay(Duration::from_secs(30))
                    .with_factor(2.0)
                    .with_jitter()
                    .without_max_times(),
            ),
            Duration::from_secs(120),
        ))
    }
}

impl Debug for DefaultBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultBackoff").finish_non_exhaustive()
    }
}

impl Iterator for DefaultBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl ResettableBackoff for DefaultBackoff {
    fn reset(&mut self) {
        self.0.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::{watcher, Config, Error, Event};
    use crate::WatchStreamExt;
    use futures::{pin_mut, poll, StreamExt};
    use informer_core::{ErrorResponse, ResourceExt};
    use informer_fake::{objects::Pod, FakeClient};
    use std::time::Duration;
    use tokio::time::Instant;

    fn names(events: &[Event<Pod>]) -> Vec<String> {
        events
            .iter()
            .map(|ev| match ev {
                Event::Init => "init".to_string(),
                Event::InitDone => "init-done".to_string(),
                Event::InitApply(p) => format!("init-apply {}", p.name_any()),
                Event::Apply(p) => format!("apply {}", p.name_any()),
                Event::Delete(p) => format!("delete {}", p.name_any()),
            })
            .collect()
    }

    #[test]
    fn watch_params_drop_page_size() {
        let config = Config::default().within("ns").labels("app=web").timeout(10).page_size(2);
        let lp = config.to_list_params();
        assert_eq!(lp.limit, Some(2));
        assert_eq!(lp.namespace.as_deref(), Some("ns"));
        let wp = config.to_watch_params();
        assert_eq!(wp.limit, None);
        assert_eq!(wp.timeout, Some(10));
        assert_eq!(wp.label_selector.as_deref(), Some("app=web"));
    }

    #[test]
    fn modify_and_flatten_events() {
        let ev = Event::Apply(1).modify(|x| *x += 1);
        assert_eq!(ev, Event::Apply(2));
        assert_eq!(Event::Delete(3).into_iter_applied().count(), 0);
        assert_eq!(Event::Delete(3).into_iter_touched().collect::<Vec<_>>(), vec![3]);
        assert_eq!(Event::<i32>::InitDone.into_iter_touched().count(), 0);
    }

    #[tokio::test]
    async fn lists_in_pages_then_watches() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        for name in ["a", "b", "c"] {
            pods.create(Pod::new(name).within("ns")).unwrap();
        }
        let stream = watcher::<Pod, _>(client.clone(), Config::default().page_size(2));
        pin_mut!(stream);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(stream.next().await.unwrap().unwrap());
        }
        assert_eq!(names(&seen), vec![
            "init",
            "init-apply a",
            "init-apply b",
            "init-apply c",
            "init-done"
        ]);
        assert_eq!(pods.list_calls(), 2);

        pods.create(Pod::new("d").within("ns")).unwrap();
        pods.delete("ns", "a").unwrap();
        let live = vec![stream.next().await.unwrap().unwrap(), stream.next().await.unwrap().unwrap()];
        assert_eq!(names(&live), vec!["apply d", "delete a"]);
    }

    #[tokio::test]
    async fn closed_watch_leads_to_relist() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        pods.create(Pod::new("a").within("ns")).unwrap();
        let stream = watcher::<Pod, _>(client.clone(), Config::default());
        pin_mut!(stream);
        for _ in 0..3 {
            stream.next().await.unwrap().unwrap();
        }
        // let the watch start before cutting it
        assert!(poll!(stream.next()).is_pending());
        pods.disconnect_watchers();
        assert!(matches!(stream.next().await, Some(Err(Error::WatchClosed))));
        assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitApply(p))) if p.name_any() == "a"));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitDone))));
    }

    #[tokio::test]
    async fn list_failures_are_surfaced_and_retried() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        pods.fail_next_list(ErrorResponse::forbidden("pods is forbidden").into());
        let stream = watcher::<Pod, _>(client.clone(), Config::default());
        pin_mut!(stream);
        match stream.next().await {
            Some(Err(Error::InitialListFailed(err))) => assert!(err.is_forbidden()),
            other => panic!("expected a list failure, got {other:?}"),
        }
        assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitDone))));
    }

    #[tokio::test]
    async fn gone_on_watch_start_forces_relist() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        pods.fail_next_watch(ErrorResponse::gone("too old resource version").into());
        let stream = watcher::<Pod, _>(client.clone(), Config::default());
        pin_mut!(stream);
        assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitDone))));
        assert!(matches!(stream.next().await, Some(Err(Error::WatchStartFailed(e))) if e.is_gone()));
        assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
    }

    #[tokio::test]
    async fn later_pages_come_from_the_first_pages_snapshot() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        pods.create(Pod::new("a").within("ns")).unwrap();
        let b = pods.create(Pod::new("b").within("ns")).unwrap();
        let stream = watcher::<Pod, _>(client.clone(), Config::default().page_size(1));
        pin_mut!(stream);
        assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
        assert!(matches!(stream.next().await, Some(Ok(Event::InitApply(p))) if p.name_any() == "a"));

        let b = pods.update(b).unwrap();
        pods.update(b).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(stream.next().await.unwrap().unwrap());
        }
        let versions = seen
            .iter()
            .map(|ev| match ev {
                Event::InitApply(p) | Event::Apply(p) => p.resource_version().unwrap_or_default(),
                _ => String::new(),
            })
            .collect::<Vec<_>>();
        assert_eq!(names(&seen), vec!["init-apply b", "init-done", "apply b", "apply b"]);
        assert_eq!(versions, vec!["2", "", "3", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn relist_delay_grows_while_watches_keep_failing() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        pods.create(Pod::new("a").within("ns")).unwrap();
        let stream = watcher::<Pod, _>(client.clone(), Config::default()).default_backoff();
        pin_mut!(stream);
        for _ in 0..3 {
            stream.next().await.unwrap().unwrap();
        }

        let mut delays = Vec::new();
        for _ in 0..5 {
            assert!(poll!(stream.next()).is_pending());
            pods.disconnect_watchers();
            assert!(matches!(stream.next().await, Some(Err(Error::WatchClosed))));
            let closed = Instant::now();
            assert!(matches!(stream.next().await, Some(Ok(Event::Init))));
            delays.push(closed.elapsed());
            assert!(matches!(stream.next().await, Some(Ok(Event::InitApply(_)))));
            assert!(matches!(stream.next().await, Some(Ok(Event::InitDone))));
        }
        for (attempt, delay) in delays.iter().enumerate() {
            assert!(*delay >= Duration::from_millis(800) * 2u32.pow(attempt as u32), "{delays:?}");
        }
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    }
}
