//! Shared informers for several kinds over one source
use crate::{
    informer::{Informer, InformerConfig},
    reflector::Reflector,
    sync::{wait_for_cache_sync, SyncBarrier},
    watcher,
};
use ahash::AHashMap;
use futures::future::BoxFuture;
use informer_core::{RemoteSource, Resource};
use parking_lot::Mutex;
use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

type Tweak = Arc<dyn Fn(&mut watcher::Config) + Send + Sync>;
type Starter = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

struct Entry {
    kind: &'static str,
    informer: Box<dyn Any + Send + Sync>,
    synced: SyncBarrier,
    starter: Option<Starter>,
}

/// Hands out one shared [`Informer`] per object kind, all reading from the same source
///
/// Every caller asking for the same kind gets a handle to the same cache. Informers are
/// created lazily by [`InformerFactory::informer`] and only begin listing once
/// [`InformerFactory::start`] is called.
///
/// ```no_run
/// # use informer_core::{RemoteSource, Resource};
/// # use tokio_util::sync::CancellationToken;
/// use informer_runtime::InformerFactory;
/// use std::time::Duration;
/// # async fn wrapper<K, S>(source: S) where K: Resource + Send + Sync + 'static, S: RemoteSource<K> + 'static {
/// let factory = InformerFactory::new(source)
///     .namespace("default")
///     .resync_period(Duration::from_secs(15));
/// let things = factory.informer::<K>();
/// let stop = CancellationToken::new();
/// factory.start(&stop);
/// if factory.wait_for_cache_sync(&stop).await {
///     println!("{} cached", things.lister().list_all().len());
/// }
/// # }
/// ```
pub struct InformerFactory<S> {
    source: Arc<S>,
    namespace: Option<String>,
    resync_period: Option<Duration>,
    tweak: Option<Tweak>,
    informers: Mutex<AHashMap<TypeId, Entry>>,
}

impl<S> Debug for InformerFactory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds = self.informers.lock().values().map(|e| e.kind).collect::<Vec<_>>();
        f.debug_struct("InformerFactory")
            .field("namespace", &self.namespace)
            .field("resync_period", &self.resync_period)
            .field("kinds", &kinds)
            .finish_non_exhaustive()
    }
}

impl<S> InformerFactory<S> {
    /// A factory over `source`, watching all namespaces without resyncs
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            namespace: None,
            resync_period: None,
            tweak: None,
            informers: Mutex::default(),
        }
    }

    /// Restrict every informer to one namespace
    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Resync every informer with the given period
    #[must_use]
    pub fn resync_period(mut self, period: Duration) -> Self {
        self.resync_period = Some(period);
        self
    }

    /// Adjust the watcher configuration of every informer, for instance to add selectors
    #[must_use]
    pub fn tweak_list_params(mut self, tweak: impl Fn(&mut watcher::Config) + Send + Sync + 'static) -> Self {
        self.tweak = Some(Arc::new(tweak));
        self
    }

    fn config(&self) -> InformerConfig {
        let mut watcher = watcher::Config::default();
        watcher.namespace.clone_from(&self.namespace);
        if let Some(tweak) = &self.tweak {
            tweak(&mut watcher);
        }
        InformerConfig {
            watcher,
            resync_period: self.resync_period,
        }
    }

    /// The shared informer for kind `K`, created on first use
    ///
    /// Informers requested after [`InformerFactory::start`] are not running until `start` is called again.
    pub fn informer<K>(&self) -> Informer<K>
    where
        K: Resource + Send + Sync + 'static,
        S: RemoteSource<K> + 'static,
    {
        let mut informers = self.informers.lock();
        let key = TypeId::of::<K>();
        if let Some(existing) = informers
            .get(&key)
            .and_then(|entry| entry.informer.downcast_ref::<Informer<K>>())
        {
            return existing.clone();
        }

        let (informer, reflector): (Informer<K>, Reflector<K, Arc<S>>) =
            Informer::new(self.source.clone(), self.config());
        let starter: Starter = Box::new(move |stop| Box::pin(reflector.run(stop)));
        informers.insert(key, Entry {
            kind: K::KIND,
            informer: Box::new(informer.clone()),
            synced: informer.sync_barrier(),
            starter: Some(starter),
        });
        informer
    }

    /// Spawn the reflector of every informer that is not running yet
    ///
    /// All reflectors stop when `stop` fires. Calling `start` again only starts informers
    /// that were requested since the previous call.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start(&self, stop: &CancellationToken) {
        let mut informers = self.informers.lock();
        for entry in informers.values_mut() {
            if let Some(starter) = entry.starter.take() {
                info!(kind = entry.kind, "starting informer");
                tokio::spawn(starter(stop.clone()));
            }
        }
    }

    /// Wait until every informer created so far has synced
    ///
    /// Returns `false` if `stop` fired first.
    pub async fn wait_for_cache_sync(&self, stop: &CancellationToken) -> bool {
        let barriers = self
            .informers
            .lock()
            .values()
            .map(|entry| entry.synced.clone())
            .collect::<Vec<_>>();
        wait_for_cache_sync(stop, &barriers).await
    }
}
