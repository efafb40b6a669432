//! Read-only queries over an informer's cache
//!
//! Listers only ever read the local [`Store`], so they never block on the remote source
//! and may return stale data until the cache has synced.
use crate::reflector::{ObjectRef, Store};
use informer_core::{labels::Selector, Resource};
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;

/// Errors returned by listers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The object is not in the cache
    #[error("{kind} {name:?} not found{}", in_namespace(.namespace))]
    NotFound {
        /// Kind of the object that was looked up
        kind: &'static str,
        /// Namespace that was searched, `None` for cluster-scoped lookups
        namespace: Option<String>,
        /// Name that was looked up
        name: String,
    },
}

fn in_namespace(namespace: &Option<String>) -> String {
    namespace
        .as_deref()
        .map(|ns| format!(" in namespace {ns:?}"))
        .unwrap_or_default()
}

impl Error {
    /// Whether this is a [`Error::NotFound`]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Query facade over a [`Store`]
///
/// Results of `list*` calls are ordered by namespace, then name.
pub struct Lister<K> {
    store: Store<K>,
}

impl<K> Clone for Lister<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K> Debug for Lister<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lister").field("store", &self.store).finish()
    }
}

fn sorted<K: Resource>(mut objs: Vec<Arc<K>>) -> Vec<Arc<K>> {
    objs.sort_by(|a, b| {
        let (a, b) = (a.meta(), b.meta());
        (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name))
    });
    objs
}

impl<K: Resource> Lister<K> {
    /// Wrap a store reader
    #[must_use]
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }

    /// Look up a single object
    ///
    /// Pass `None` as the namespace for cluster-scoped objects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the object is not cached.
    pub fn get<'a>(&self, namespace: impl Into<Option<&'a str>>, name: &str) -> Result<Arc<K>, Error> {
        let namespace = namespace.into();
        let key = match namespace {
            Some(ns) => ObjectRef::new(name).within(ns),
            None => ObjectRef::new(name),
        };
        self.store.get(&key).ok_or_else(|| Error::NotFound {
            kind: K::KIND,
            namespace: namespace.map(String::from),
            name: name.to_string(),
        })
    }

    /// All cached objects in `namespace`, or in every namespace for `None`
    #[must_use]
    pub fn list<'a>(&self, namespace: impl Into<Option<&'a str>>) -> Vec<Arc<K>> {
        match namespace.into() {
            Some(ns) => sorted(self.store.find(|obj| obj.meta().namespace.as_deref() == Some(ns))),
            None => self.list_all(),
        }
    }

    /// All cached objects
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<K>> {
        sorted(self.store.state())
    }

    /// Cached objects in `namespace` (or every namespace for `None`) whose labels match `selector`
    #[must_use]
    pub fn list_selected<'a>(&self, namespace: impl Into<Option<&'a str>>, selector: &Selector) -> Vec<Arc<K>> {
        let namespace = namespace.into();
        sorted(self.store.find(|obj| {
            let meta = obj.meta();
            namespace.map_or(true, |ns| meta.namespace.as_deref() == Some(ns)) && selector.matches(&meta.labels)
        }))
    }

    /// A lister scoped to a single namespace
    #[must_use]
    pub fn namespaced(&self, namespace: &str) -> NamespaceLister<K> {
        NamespaceLister {
            lister: self.clone(),
            namespace: namespace.to_string(),
        }
    }
}

/// A [`Lister`] scoped to one namespace
///
/// Created by [`Lister::namespaced`].
pub struct NamespaceLister<K> {
    lister: Lister<K>,
    namespace: String,
}

impl<K> Clone for NamespaceLister<K> {
    fn clone(&self) -> Self {
        Self {
            lister: self.lister.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<K> Debug for NamespaceLister<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceLister")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<K: Resource> NamespaceLister<K> {
    /// Look up an object by name
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the object is not cached.
    pub fn get(&self, name: &str) -> Result<Arc<K>, Error> {
        self.lister.get(self.namespace.as_str(), name)
    }

    /// All cached objects in the namespace
    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.lister.list(self.namespace.as_str())
    }

    /// Cached objects in the namespace whose labels match `selector`
    #[must_use]
    pub fn list_selected(&self, selector: &Selector) -> Vec<Arc<K>> {
        self.lister.list_selected(self.namespace.as_str(), selector)
    }
}
