use crate::tracker::ObjectTracker;
use ahash::AHashMap;
use async_trait::async_trait;
use informer_core::{params::ListParams, BoxWatchStream, ObjectList, RemoteSource, Resource, Result};
use parking_lot::Mutex;
use std::{
    any::{Any, TypeId},
    sync::Arc,
};
use tracing::debug;

/// An in-memory [`RemoteSource`] for every kind, backed by one [`ObjectTracker`] per kind
///
/// Clones share the same trackers, so a test can keep a handle for writing objects while
/// informers list and watch through another.
///
/// ```
/// use informer_fake::{objects::Pod, FakeClient};
///
/// let client = FakeClient::new();
/// let pods = client.tracker::<Pod>();
/// pods.create_in("default", Pod::new("busybox")).unwrap();
/// assert!(client.tracker::<Pod>().get("default", "busybox").is_ok());
/// ```
#[derive(Clone, Default)]
pub struct FakeClient {
    trackers: Arc<Mutex<AHashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

impl std::fmt::Debug for FakeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeClient")
            .field("kinds", &self.trackers.lock().len())
            .finish()
    }
}

impl FakeClient {
    /// A client without any objects
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracker holding objects of kind `K`, created on first use
    #[must_use]
    pub fn tracker<K>(&self) -> ObjectTracker<K>
    where
        K: Resource + Clone + Send + Sync + 'static,
    {
        let mut trackers = self.trackers.lock();
        let entry = trackers
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(ObjectTracker::<K>::new()));
        match entry.downcast_ref::<ObjectTracker<K>>() {
            Some(tracker) => tracker.clone(),
            // keyed by TypeId, so this is never hit
            None => ObjectTracker::new(),
        }
    }
}

#[async_trait]
impl<K> RemoteSource<K> for FakeClient
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn list(&self, params: &ListParams) -> Result<ObjectList<K>> {
        debug!(kind = K::KIND, ?params, "list");
        self.tracker::<K>().list(params)
    }

    async fn watch(&self, params: &ListParams, resource_version: &str) -> Result<BoxWatchStream<K>> {
        debug!(kind = K::KIND, ?params, resource_version, "watch");
        self.tracker::<K>().watch(params, resource_version)
    }
}
