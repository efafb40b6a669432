use super::ObjectRef;
use crate::handler::ChangeEvent;
use ahash::{AHashMap, AHashSet};
use informer_core::Resource;
use parking_lot::RwLock;
use std::{fmt::Debug, sync::Arc};

type Cache<K> = Arc<RwLock<AHashMap<ObjectRef, Arc<K>>>>;

/// A writable Store handle
///
/// This is exclusive since it's not safe to share a single `Store` between multiple reflectors.
/// In particular, a relist will clobber the state of other connected reflectors.
pub struct Writer<K> {
    store: Cache<K>,
}

impl<K> Default for Writer<K> {
    fn default() -> Self {
        Self {
            store: Cache::default(),
        }
    }
}

impl<K> Debug for Writer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer").field("len", &self.store.read().len()).finish()
    }
}

fn same_version<K: Resource>(cached: &K, incoming: &K) -> bool {
    match (
        cached.meta().resource_version.as_deref(),
        incoming.meta().resource_version.as_deref(),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl<K: Resource> Writer<K> {
    /// Return a read handle to the store
    ///
    /// Multiple read handles may be obtained, by either calling `as_reader` multiple times,
    /// or by calling `Store::clone()` afterwards.
    #[must_use]
    pub fn as_reader(&self) -> Store<K> {
        Store {
            store: self.store.clone(),
        }
    }

    /// Applies an already computed change to the store
    pub fn apply(&mut self, event: &ChangeEvent<K>) {
        let mut store = self.store.write();
        match event {
            ChangeEvent::Added(obj) | ChangeEvent::Updated { new: obj, .. } => {
                store.insert(ObjectRef::from_obj(obj.as_ref()), obj.clone());
            }
            ChangeEvent::Deleted(obj) => {
                store.remove(&ObjectRef::from_obj(obj.as_ref()));
            }
        }
    }

    /// Inserts or replaces an object, returning the change that was made
    ///
    /// Returns `None` if the cached object already has the same resource version.
    pub fn upsert(&mut self, obj: K) -> Option<ChangeEvent<K>> {
        let key = ObjectRef::from_obj(&obj);
        let mut store = self.store.write();
        match store.get(&key) {
            Some(cached) if same_version(cached.as_ref(), &obj) => None,
            Some(cached) => {
                let old = cached.clone();
                let new = Arc::new(obj);
                store.insert(key, new.clone());
                Some(ChangeEvent::Updated { old, new })
            }
            None => {
                let new = Arc::new(obj);
                store.insert(key, new.clone());
                Some(ChangeEvent::Added(new))
            }
        }
    }

    /// Removes an object, returning the change that was made
    ///
    /// The deletion carries the object as reported by the source. Returns `None` if the
    /// object was not cached.
    pub fn remove(&mut self, obj: K) -> Option<ChangeEvent<K>> {
        let key = ObjectRef::from_obj(&obj);
        self.store
            .write()
            .remove(&key)
            .map(|_| ChangeEvent::Deleted(Arc::new(obj)))
    }

    /// Replaces the contents of the store with a full listing, returning the changes made
    ///
    /// The whole replacement happens under a single write lock, so readers observe either
    /// the old or the new contents. Changes for listed objects come first, in list order,
    /// followed by deletions of everything that was not listed.
    pub fn reconcile(&mut self, objects: Vec<K>) -> Vec<ChangeEvent<K>> {
        let mut events = Vec::new();
        let mut store = self.store.write();
        let mut listed = AHashSet::with_capacity(objects.len());
        for obj in objects {
            let key = ObjectRef::from_obj(&obj);
            match store.get(&key) {
                Some(cached) if same_version(cached.as_ref(), &obj) => {}
                Some(cached) => {
                    let old = cached.clone();
                    let new = Arc::new(obj);
                    store.insert(key.clone(), new.clone());
                    events.push(ChangeEvent::Updated { old, new });
                }
                None => {
                    let new = Arc::new(obj);
                    store.insert(key.clone(), new.clone());
                    events.push(ChangeEvent::Added(new));
                }
            }
            listed.insert(key);
        }
        let mut missing = store
            .keys()
            .filter(|key| !listed.contains(*key))
            .cloned()
            .collect::<Vec<_>>();
        missing.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        for key in missing {
            if let Some(old) = store.remove(&key) {
                events.push(ChangeEvent::Deleted(old));
            }
        }
        events
    }
}

/// A readable cache of objects of kind `K`
///
/// Cloning will produce a new reference to the same backing store.
///
/// Cannot be constructed directly since one writer handle is required,
/// use `Writer::as_reader()` instead.
pub struct Store<K> {
    store: Cache<K>,
}

impl<K> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K> Debug for Store<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}

impl<K> Store<K> {
    /// Retrieve the entry referred to by `key`, if it is in the cache.
    ///
    /// `key.namespace` is ignored for cluster-scoped objects.
    ///
    /// Note that this is a cache and may be stale. Deleted objects may still exist in the cache
    /// despite having been deleted at the source, and new objects may not yet exist in the cache.
    #[must_use]
    pub fn get(&self, key: &ObjectRef) -> Option<Arc<K>> {
        let store = self.store.read();
        store
            .get(key)
            // Try to erase the namespace and try again, in case the object is cluster-scoped
            .or_else(|| {
                key.namespace.as_ref()?;
                let mut cluster_key = key.clone();
                cluster_key.namespace = None;
                store.get(&cluster_key)
            })
            .cloned()
    }

    /// Return a full snapshot of the current values
    #[must_use]
    pub fn state(&self) -> Vec<Arc<K>> {
        self.store.read().values().cloned().collect()
    }

    /// Return all cached objects matching `predicate`
    #[must_use]
    pub fn find<P>(&self, predicate: P) -> Vec<Arc<K>>
    where
        P: Fn(&K) -> bool,
    {
        self.store
            .read()
            .values()
            .filter(|obj| predicate(obj))
            .cloned()
            .collect()
    }

    /// Return the number of elements in the store
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Return whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

/// Create a (Reader, Writer) for a `Store<K>` for a typed resource `K`
///
/// The `Writer` should be passed to a [`Reflector`](super::Reflector),
/// and the [`Store`] is a read-only handle.
#[must_use]
pub fn store<K: Resource>() -> (Store<K>, Writer<K>) {
    let w = Writer::<K>::default();
    let r = w.as_reader();
    (r, w)
}
