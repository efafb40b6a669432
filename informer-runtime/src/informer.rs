//! A shareable handle bundling a cache, its handlers and its sync state
use crate::{
    handler::EventHandler,
    lister::Lister,
    reflector::{store, Dispatcher, HandlerId, Reflector, Store},
    sync::{Stopped, SyncBarrier},
    watcher,
};
use informer_core::{RemoteSource, Resource};
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Configuration of an [`Informer`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InformerConfig {
    /// What to list and watch
    pub watcher: watcher::Config,
    /// How often every cached object is redelivered to handlers as an update
    ///
    /// Disabled when `None`.
    pub resync_period: Option<Duration>,
}

impl InformerConfig {
    /// Use the given watcher configuration
    #[must_use]
    pub fn watcher(mut self, config: watcher::Config) -> Self {
        self.watcher = config;
        self
    }

    /// Enable periodic resyncs
    #[must_use]
    pub fn resync_period(mut self, period: Duration) -> Self {
        self.resync_period = Some(period);
        self
    }
}

/// A cache of objects of kind `K`, kept current by a [`Reflector`], with handlers attached to its changes
///
/// The handle is cheap to clone; all clones share the cache, the handlers and the sync state.
///
/// ```no_run
/// use informer_runtime::{handler::HandlerFuncs, Informer, InformerConfig};
/// # use informer_core::{RemoteSource, Resource, ResourceExt};
/// # use tokio_util::sync::CancellationToken;
/// # async fn wrapper<K, S>(source: S) where K: Resource + Send + Sync + 'static, S: RemoteSource<K> + 'static {
/// let stop = CancellationToken::new();
/// let informer = Informer::<K>::spawn(source, InformerConfig::default(), stop.clone());
/// informer.add_handler(HandlerFuncs::default().on_add(|obj: &K| {
///     println!("added {}", obj.name_any());
///     Ok(())
/// }));
/// if informer.wait_for_sync(&stop).await {
///     println!("{} cached", informer.lister().list_all().len());
/// }
/// # }
/// ```
pub struct Informer<K> {
    store: Store<K>,
    dispatcher: Dispatcher<K>,
    synced: SyncBarrier,
}

impl<K> Clone for Informer<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
            synced: self.synced.clone(),
        }
    }
}

impl<K> Debug for Informer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("store", &self.store)
            .field("dispatcher", &self.dispatcher)
            .field("synced", &self.synced.has_synced())
            .finish()
    }
}

impl<K> Informer<K>
where
    K: Resource + Send + Sync + 'static,
{
    /// Create an informer together with the [`Reflector`] that feeds it
    ///
    /// Nothing happens until the reflector is [`run`](Reflector::run).
    pub fn new<S>(source: S, config: InformerConfig) -> (Self, Reflector<K, S>)
    where
        S: RemoteSource<K> + 'static,
    {
        let (reader, writer) = store::store();
        let dispatcher = Dispatcher::default();
        let synced = SyncBarrier::new();
        let reflector = Reflector::new(source, config.watcher, writer, dispatcher.clone(), synced.clone())
            .resync_period(config.resync_period);
        (
            Self {
                store: reader,
                dispatcher,
                synced,
            },
            reflector,
        )
    }

    /// Create an informer and run its reflector on a new tokio task until `stop` fires
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<S>(source: S, config: InformerConfig, stop: CancellationToken) -> Self
    where
        S: RemoteSource<K> + 'static,
    {
        let (informer, reflector) = Self::new(source, config);
        tokio::spawn(reflector.run(stop));
        informer
    }

    /// Register a handler
    ///
    /// The handler is first told about every object that is already cached, as additions,
    /// and then about every change applied afterwards.
    pub fn add_handler(&self, handler: impl EventHandler<K> + 'static) -> HandlerId {
        let store = self.store.clone();
        self.dispatcher.register(Arc::new(handler), move || store.state())
    }

    /// Unregister a handler, returning whether it was registered
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.dispatcher.remove_handler(id)
    }

    /// Read handle to the cache
    #[must_use]
    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    /// Query facade over the cache
    #[must_use]
    pub fn lister(&self) -> Lister<K> {
        Lister::new(self.store.clone())
    }

    /// The barrier tracking whether the initial listing has been applied
    #[must_use]
    pub fn sync_barrier(&self) -> SyncBarrier {
        self.synced.clone()
    }

    /// Whether the initial listing has been applied
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.synced.has_synced()
    }

    /// Wait for the initial listing to be applied, see [`SyncBarrier::wait`]
    ///
    /// # Errors
    ///
    /// Returns [`Stopped`] if `stop` fired first.
    pub async fn wait(&self, stop: &CancellationToken) -> Result<(), Stopped> {
        self.synced.wait(stop).await
    }

    /// Wait for the initial listing to be applied, returning `false` if `stop` fired first
    pub async fn wait_for_sync(&self, stop: &CancellationToken) -> bool {
        self.synced.wait_for_sync(stop).await
    }
}

#[cfg(test)]
mod tests {
    use super::{Informer, InformerConfig};
    use crate::handler::{ChangeEvent, EventHandlerExt, HandlerError, HandlerFuncs};
    use informer_core::ResourceExt;
    use informer_fake::{objects::Pod, FakeClient};
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};
    use tokio_util::sync::CancellationToken;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn late_handlers_get_current_state_first() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        pods.create(Pod::new("a").within("ns")).unwrap();
        let stop = CancellationToken::new();
        let informer = Informer::<Pod>::spawn(client.clone(), InformerConfig::default(), stop.clone());
        assert!(informer.wait_for_sync(&stop).await);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        informer.add_handler(move |ev: &ChangeEvent<Pod>| -> Result<(), HandlerError> {
            sink.lock().push(format!("{} {}", ev.kind(), ev.object().name_any()));
            Ok(())
        });
        pods.create(Pod::new("b").within("ns")).unwrap();
        settle().await;
        stop.cancel();
        assert_eq!(*seen.lock(), vec!["added a", "added b"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn removed_handlers_are_not_called() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        let stop = CancellationToken::new();
        let informer = Informer::<Pod>::spawn(client.clone(), InformerConfig::default(), stop.clone());
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let id = informer.add_handler(HandlerFuncs::default().on_add(move |_: &Pod| {
            *counter.lock() += 1;
            Ok(())
        }));
        assert!(informer.wait_for_sync(&stop).await);
        pods.create(Pod::new("a").within("ns")).unwrap();
        settle().await;
        assert!(informer.remove_handler(id));
        pods.create(Pod::new("b").within("ns")).unwrap();
        settle().await;
        stop.cancel();
        assert_eq!(*count.lock(), 1);
        assert_eq!(informer.lister().list("ns").len(), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn filtered_handlers_follow_label_changes() {
        let client = FakeClient::new();
        let pods = client.tracker::<Pod>();
        let stop = CancellationToken::new();
        let informer = Informer::<Pod>::spawn(client.clone(), InformerConfig::default(), stop.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |ev: &ChangeEvent<Pod>| -> Result<(), HandlerError> {
            sink.lock().push(ev.kind());
            Ok(())
        };
        informer.add_handler(handler.filtered(|p: &Pod| p.labels().contains_key("web")));
        assert!(informer.wait_for_sync(&stop).await);

        let pod = pods.create(Pod::new("a").within("ns")).unwrap();
        let mut labelled = pod.clone();
        labelled.labels_mut().insert("web".into(), "true".into());
        let labelled = pods.update(labelled).unwrap();
        let mut unlabelled = labelled.clone();
        unlabelled.labels_mut().clear();
        pods.update(unlabelled).unwrap();
        settle().await;
        stop.cancel();
        assert_eq!(*seen.lock(), vec!["added", "deleted"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn wait_returns_false_when_stopped_before_sync() {
        let client = FakeClient::new();
        client
            .tracker::<Pod>()
            .fail_next_list(informer_core::Error::Connection("refused".into()));
        let stop = CancellationToken::new();
        let informer = Informer::<Pod>::spawn(client.clone(), InformerConfig::default(), stop.clone());
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });
        assert!(!informer.wait_for_sync(&stop).await);
        assert!(!informer.has_synced());
    }
}
