//! In-memory storage for one kind of object, with watch support
use async_stream::stream;
use futures::StreamExt;
use informer_core::{
    labels::{FieldSelector, Selector},
    params::ListParams,
    BoxWatchStream, Error, ErrorResponse, ListMeta, ObjectList, Resource, Result, WatchEvent,
};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, VecDeque},
    fmt::Debug,
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::trace;

/// Number of changes kept for resuming watches, unless configured otherwise
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

type Key = (Option<String>, String);

/// A single write, as needed to replay it to a watcher with arbitrary selectors
///
/// `old` is the object as it was before the write, `new` is `None` for deletions.
#[derive(Clone)]
struct Change<K> {
    revision: u64,
    old: Option<K>,
    new: Option<K>,
}

/// What a watcher or a list call selects
struct Filter {
    namespace: Option<String>,
    labels: Selector,
    fields: FieldSelector,
}

impl Filter {
    fn from_params(params: &ListParams) -> Result<Self> {
        let (labels, fields) = params.selectors()?;
        Ok(Self {
            namespace: params.namespace.clone(),
            labels,
            fields,
        })
    }

    fn matches<K: Resource>(&self, obj: &K) -> bool {
        let meta = obj.meta();
        self.namespace
            .as_deref()
            .map_or(true, |ns| meta.namespace.as_deref() == Some(ns))
            && self.labels.matches(&meta.labels)
            && self.fields.matches(meta)
    }

    /// Translates a write into what a watch with this filter observes
    ///
    /// Objects moving into the selection are added, objects moving out of it are deleted.
    fn translate<K: Resource + Clone>(&self, change: &Change<K>) -> Option<WatchEvent<K>> {
        let was = change.old.as_ref().is_some_and(|o| self.matches(o));
        let is = change.new.as_ref().is_some_and(|o| self.matches(o));
        match (was, is, &change.old, &change.new) {
            (true, true, _, Some(new)) => Some(WatchEvent::Modified(new.clone())),
            (false, true, _, Some(new)) => Some(WatchEvent::Added(new.clone())),
            (true, false, _, Some(new)) => Some(WatchEvent::Deleted(new.clone())),
            (true, false, Some(old), None) => {
                let mut deleted = old.clone();
                deleted.meta_mut().resource_version = Some(change.revision.to_string());
                Some(WatchEvent::Deleted(deleted))
            }
            _ => None,
        }
    }
}

struct Watcher<K> {
    filter: Filter,
    tx: mpsc::UnboundedSender<WatchEvent<K>>,
}

struct State<K> {
    objects: BTreeMap<Key, K>,
    revision: u64,
    history: VecDeque<Change<K>>,
    history_limit: usize,
    /// Highest revision that has been dropped from `history`
    compacted: u64,
    watchers: Vec<Watcher<K>>,
    list_calls: usize,
    watch_calls: usize,
    fail_list: Option<Error>,
    fail_watch: Option<Error>,
}

impl<K: Resource + Clone> State<K> {
    fn record(&mut self, change: Change<K>) {
        self.watchers.retain(|w| {
            if let Some(event) = w.filter.translate(&change) {
                w.tx.send(event).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
        self.history.push_back(change);
        while self.history.len() > self.history_limit {
            if let Some(dropped) = self.history.pop_front() {
                self.compacted = dropped.revision;
            }
        }
    }

    /// The objects as they were right after `revision`
    ///
    /// Rolls back every change in the history that is newer than `revision`, so `revision`
    /// must not have been compacted.
    fn snapshot_at(&self, revision: u64) -> BTreeMap<Key, K> {
        let mut objects = self.objects.clone();
        for change in self.history.iter().rev().take_while(|c| c.revision > revision) {
            let Some(key) = change.new.as_ref().or(change.old.as_ref()).and_then(|o| key_of(o).ok()) else {
                continue;
            };
            match &change.old {
                Some(old) => objects.insert(key, old.clone()),
                None => objects.remove(&key),
            };
        }
        objects
    }

    fn bump(&mut self, obj: &mut K) -> u64 {
        self.revision += 1;
        obj.meta_mut().resource_version = Some(self.revision.to_string());
        self.revision
    }
}

fn key_of<K: Resource>(obj: &K) -> Result<Key> {
    let meta = obj.meta();
    match &meta.name {
        Some(name) if !name.is_empty() => Ok((meta.namespace.clone(), name.clone())),
        _ => Err(Error::Validation(format!("{} must have a name", K::KIND))),
    }
}

fn not_found<K: Resource>(namespace: Option<&str>, name: &str) -> Error {
    let scope = namespace.map(|ns| format!(" in namespace {ns:?}")).unwrap_or_default();
    ErrorResponse::not_found(format!("{} {name:?} not found{scope}", K::KIND)).into()
}

/// Stores objects of one kind and serves list and watch calls over them
///
/// Every write is assigned the next resource version of the tracker. Watches can resume from
/// any version that is still in the bounded history; older versions answer `410 Gone`,
/// which makes informers fall back to relisting.
///
/// Cloning produces another handle to the same objects.
pub struct ObjectTracker<K> {
    state: Arc<Mutex<State<K>>>,
}

impl<K> Clone for ObjectTracker<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K> Debug for ObjectTracker<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectTracker")
            .field("objects", &state.objects.len())
            .field("revision", &state.revision)
            .field("watchers", &state.watchers.len())
            .finish()
    }
}

impl<K> Default for ObjectTracker<K> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                revision: 0,
                history: VecDeque::new(),
                history_limit: DEFAULT_HISTORY_LIMIT,
                compacted: 0,
                watchers: Vec::new(),
                list_calls: 0,
                watch_calls: 0,
                fail_list: None,
                fail_watch: None,
            })),
        }
    }
}

impl<K> ObjectTracker<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    /// An empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new object, returning it with its assigned resource version
    ///
    /// # Errors
    ///
    /// Fails with a `409` if an object with the same name already exists in the namespace,
    /// and with [`Error::Validation`] if the object has no name.
    pub fn create(&self, mut obj: K) -> Result<K> {
        let key = key_of(&obj)?;
        let mut state = self.state.lock();
        if state.objects.contains_key(&key) {
            return Err(ErrorResponse::conflict(format!("{} {:?} already exists", K::KIND, key.1)).into());
        }
        let revision = state.bump(&mut obj);
        if obj.meta().uid.is_none() {
            obj.meta_mut().uid = Some(format!("{}-{revision}", K::KIND.to_lowercase()));
        }
        trace!(kind = K::KIND, name = %key.1, revision, "create");
        state.objects.insert(key, obj.clone());
        state.record(Change {
            revision,
            old: None,
            new: Some(obj.clone()),
        });
        Ok(obj)
    }

    /// Store a new object in `namespace`, overriding the namespace of `obj`
    ///
    /// # Errors
    ///
    /// See [`ObjectTracker::create`].
    pub fn create_in(&self, namespace: &str, mut obj: K) -> Result<K> {
        obj.meta_mut().namespace = Some(namespace.to_string());
        self.create(obj)
    }

    /// Replace an existing object, returning it with its new resource version
    ///
    /// # Errors
    ///
    /// Fails with a `404` if the object does not exist, and with a `409` if `obj` carries
    /// a resource version other than the stored one.
    pub fn update(&self, mut obj: K) -> Result<K> {
        let key = key_of(&obj)?;
        let mut state = self.state.lock();
        let Some(old) = state.objects.get(&key).cloned() else {
            return Err(not_found::<K>(key.0.as_deref(), &key.1));
        };
        if let Some(rv) = &obj.meta().resource_version {
            if old.meta().resource_version.as_ref() != Some(rv) {
                return Err(ErrorResponse::conflict(
                    "the object has been modified; please apply your changes to the latest version",
                )
                .into());
            }
        }
        obj.meta_mut().uid.clone_from(&old.meta().uid);
        let revision = state.bump(&mut obj);
        trace!(kind = K::KIND, name = %key.1, revision, "update");
        state.objects.insert(key, obj.clone());
        state.record(Change {
            revision,
            old: Some(old),
            new: Some(obj.clone()),
        });
        Ok(obj)
    }

    /// Remove an object, returning its final state
    ///
    /// The deletion is a write of its own: the returned object carries a new resource version.
    ///
    /// # Errors
    ///
    /// Fails with a `404` if the object does not exist.
    pub fn delete<'a>(&self, namespace: impl Into<Option<&'a str>>, name: &str) -> Result<K> {
        let namespace = namespace.into();
        let key = (namespace.map(String::from), name.to_string());
        let mut state = self.state.lock();
        let Some(old) = state.objects.remove(&key) else {
            return Err(not_found::<K>(namespace, name));
        };
        let mut obj = old.clone();
        let revision = state.bump(&mut obj);
        trace!(kind = K::KIND, name, revision, "delete");
        state.record(Change {
            revision,
            old: Some(old),
            new: None,
        });
        Ok(obj)
    }

    /// Fetch an object
    ///
    /// # Errors
    ///
    /// Fails with a `404` if the object does not exist.
    pub fn get<'a>(&self, namespace: impl Into<Option<&'a str>>, name: &str) -> Result<K> {
        let namespace = namespace.into();
        let key = (namespace.map(String::from), name.to_string());
        self.state
            .lock()
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found::<K>(namespace, name))
    }

    /// The resource version of the latest write
    #[must_use]
    pub fn resource_version(&self) -> String {
        self.state.lock().revision.to_string()
    }

    /// Bound the history used to resume watches
    ///
    /// Versions that fall out of the history can no longer be watched from.
    pub fn set_history_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        state.history_limit = limit;
        while state.history.len() > limit {
            if let Some(dropped) = state.history.pop_front() {
                state.compacted = dropped.revision;
            }
        }
    }

    /// Close every open watch
    ///
    /// Events recorded before the call are still delivered, later ones only reach new watches.
    pub fn disconnect_watchers(&self) {
        self.state.lock().watchers.clear();
    }

    /// Tell every open watch that its version has expired, then close it
    pub fn expire_watchers(&self) {
        let mut state = self.state.lock();
        for watcher in state.watchers.drain(..) {
            let _ = watcher
                .tx
                .send(WatchEvent::Error(ErrorResponse::gone("too old resource version")));
        }
    }

    /// Send a bookmark at the current version to every open watch
    pub fn bookmark(&self) {
        let mut state = self.state.lock();
        let rv = state.revision.to_string();
        state.watchers.retain(|w| {
            w.tx
                .send(WatchEvent::Bookmark(informer_core::watch::Bookmark::at(rv.clone())))
                .is_ok()
        });
    }

    /// Number of watches that are still being consumed
    #[must_use]
    pub fn active_watchers(&self) -> usize {
        let mut state = self.state.lock();
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.len()
    }

    /// Make the next list call fail with `err`
    pub fn fail_next_list(&self, err: Error) {
        self.state.lock().fail_list = Some(err);
    }

    /// Make the next watch call fail with `err`
    pub fn fail_next_watch(&self, err: Error) {
        self.state.lock().fail_watch = Some(err);
    }

    /// Number of list calls served so far, including failed ones and every page
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Number of watch calls served so far, including failed ones
    #[must_use]
    pub fn watch_calls(&self) -> usize {
        self.state.lock().watch_calls
    }

    /// Serve a list call
    ///
    /// Every page is served from the snapshot the first page was taken at, continuing from the
    /// key after the last returned object. Tokens whose snapshot was compacted answer `410 Gone`.
    pub(crate) fn list(&self, params: &ListParams) -> Result<ObjectList<K>> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if let Some(err) = state.fail_list.take() {
            return Err(err);
        }
        let filter = Filter::from_params(params)?;
        let (revision, after) = match &params.continue_token {
            Some(token) => {
                let (revision, namespace, name): (u64, Option<String>, String) = serde_json::from_str(token)
                    .map_err(|e| Error::Validation(format!("invalid continue token: {e}")))?;
                if revision < state.compacted {
                    return Err(ErrorResponse::gone("the provided continue parameter is too old").into());
                }
                (revision, Some((namespace, name)))
            }
            None => (state.revision, None),
        };

        let snapshot;
        let objects = if revision == state.revision {
            &state.objects
        } else {
            snapshot = state.snapshot_at(revision);
            &snapshot
        };
        let mut matching = objects
            .iter()
            .filter(|(key, _)| after.as_ref().map_or(true, |last| *key > last))
            .filter(|(_, obj)| filter.matches(*obj));
        let limit = params.limit.map_or(usize::MAX, |l| l as usize);
        let items = matching
            .by_ref()
            .take(limit)
            .map(|(_, obj)| obj.clone())
            .collect::<Vec<_>>();
        let continue_ = match (matching.next(), items.last()) {
            (Some(_), Some(last)) => {
                let (namespace, name) = key_of(last)?;
                Some(
                    serde_json::to_string(&(revision, namespace, name))
                        .map_err(|e| Error::Validation(format!("invalid continue token: {e}")))?,
                )
            }
            _ => None,
        };
        Ok(ObjectList {
            metadata: ListMeta {
                resource_version: Some(revision.to_string()),
                continue_,
            },
            items,
        })
    }

    /// Serve a watch call
    ///
    /// Changes after `resource_version` that are still in the history are replayed first.
    /// An empty version watches from the latest write.
    pub(crate) fn watch(&self, params: &ListParams, resource_version: &str) -> Result<BoxWatchStream<K>> {
        let mut state = self.state.lock();
        state.watch_calls += 1;
        if let Some(err) = state.fail_watch.take() {
            return Err(err);
        }
        let filter = Filter::from_params(params)?;
        let since = if resource_version.is_empty() {
            state.revision
        } else {
            resource_version
                .parse::<u64>()
                .map_err(|_| Error::Validation(format!("invalid resource version {resource_version:?}")))?
        };
        if since < state.compacted {
            return Err(ErrorResponse::gone(format!("too old resource version: {since} ({})", state.compacted)).into());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        for change in state.history.iter().filter(|c| c.revision > since) {
            if let Some(event) = filter.translate(change) {
                // the receiver is still in scope, so this cannot fail
                let _ = tx.send(event);
            }
        }
        state.watchers.push(Watcher { filter, tx });
        drop(state);

        let deadline = params
            .timeout
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(u64::from(secs)));
        let events = stream! {
            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                        Ok(next) => next,
                        Err(_elapsed) => break,
                    },
                    None => rx.recv().await,
                };
                match next {
                    Some(event) => yield Ok::<_, Error>(event),
                    None => break,
                }
            }
        };
        Ok(events.boxed())
    }
}
