//! Change notifications and the handlers that receive them
use crate::reflector::ObjectRef;
use educe::Educe;
use informer_core::Resource;
use std::{fmt::Debug, sync::Arc};

/// Error type returned by an [`EventHandler`]
///
/// Handler errors are logged by the dispatcher and never reach the reflector or other handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A logical change to the local cache
///
/// Events are produced in the order they are applied to the [`Store`](crate::reflector::Store),
/// so for a fixed object they follow the order the remote source emitted its writes.
#[derive(Debug, Educe)]
#[educe(Clone)]
pub enum ChangeEvent<K> {
    /// An object appeared in the cache
    Added(Arc<K>),
    /// A cached object was replaced by a newer version
    ///
    /// Periodic resyncs are delivered as updates where `old` and `new` are the same object.
    Updated {
        /// The state that was cached before this event
        old: Arc<K>,
        /// The state that is cached now
        new: Arc<K>,
    },
    /// An object was removed from the cache, carrying its last known state
    Deleted(Arc<K>),
}

impl<K> ChangeEvent<K> {
    /// The object as it is after the event (the last known state for deletions)
    pub fn object(&self) -> &Arc<K> {
        match self {
            ChangeEvent::Added(obj) | ChangeEvent::Deleted(obj) => obj,
            ChangeEvent::Updated { new, .. } => new,
        }
    }

    /// Short name of the event type, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Added(_) => "added",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted(_) => "deleted",
        }
    }
}

impl<K: Resource> ChangeEvent<K> {
    /// Identity of the object this event is about
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::from_obj(self.object().as_ref())
    }
}

/// Receives [`ChangeEvent`]s from an informer
///
/// Handlers run on the reflector task, one event at a time, so a slow handler delays
/// the processing of every later event. Offload long work to a queue or a spawned task.
///
/// Closures taking a `&ChangeEvent<K>` implement this trait:
///
/// ```
/// use informer_runtime::handler::{ChangeEvent, EventHandler, HandlerError};
/// fn assert_handler<K, H: EventHandler<K>>(_: H) {}
/// assert_handler::<u32, _>(|ev: &ChangeEvent<u32>| -> Result<(), HandlerError> {
///     println!("{} {}", ev.kind(), ev.object());
///     Ok(())
/// });
/// ```
pub trait EventHandler<K>: Send + Sync {
    /// Handle a single change
    ///
    /// # Errors
    ///
    /// Returned errors are logged and otherwise ignored.
    fn handle(&self, event: &ChangeEvent<K>) -> Result<(), HandlerError>;
}

impl<K, F> EventHandler<K> for F
where
    F: Fn(&ChangeEvent<K>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &ChangeEvent<K>) -> Result<(), HandlerError> {
        self(event)
    }
}

type AddFn<K> = Box<dyn Fn(&K) -> Result<(), HandlerError> + Send + Sync>;
type UpdateFn<K> = Box<dyn Fn(&K, &K) -> Result<(), HandlerError> + Send + Sync>;

/// An [`EventHandler`] built from up to three callbacks
///
/// Slots that are not set ignore their events.
///
/// ```
/// use informer_runtime::handler::HandlerFuncs;
/// let handler = HandlerFuncs::<String>::default()
///     .on_add(|obj| {
///         println!("added {obj}");
///         Ok(())
///     })
///     .on_delete(|obj| {
///         println!("deleted {obj}");
///         Ok(())
///     });
/// # let _ = handler;
/// ```
pub struct HandlerFuncs<K> {
    add: Option<AddFn<K>>,
    update: Option<UpdateFn<K>>,
    delete: Option<AddFn<K>>,
}

impl<K> Default for HandlerFuncs<K> {
    fn default() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }
}

impl<K> Debug for HandlerFuncs<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFuncs")
            .field("on_add", &self.add.is_some())
            .field("on_update", &self.update.is_some())
            .field("on_delete", &self.delete.is_some())
            .finish()
    }
}

impl<K> HandlerFuncs<K> {
    /// Called with every object that appears in the cache
    #[must_use]
    pub fn on_add(mut self, f: impl Fn(&K) -> Result<(), HandlerError> + Send + Sync + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    /// Called with the old and new state of every replaced object
    #[must_use]
    pub fn on_update(
        mut self,
        f: impl Fn(&K, &K) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    /// Called with the last known state of every removed object
    #[must_use]
    pub fn on_delete(mut self, f: impl Fn(&K) -> Result<(), HandlerError> + Send + Sync + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<K> EventHandler<K> for HandlerFuncs<K> {
    fn handle(&self, event: &ChangeEvent<K>) -> Result<(), HandlerError> {
        match (event, &self.add, &self.update, &self.delete) {
            (ChangeEvent::Added(obj), Some(f), _, _) => f(obj),
            (ChangeEvent::Updated { old, new }, _, Some(f), _) => f(old, new),
            (ChangeEvent::Deleted(obj), _, _, Some(f)) => f(obj),
            _ => Ok(()),
        }
    }
}

/// An [`EventHandler`] that only sees objects matching a predicate
///
/// Created through [`EventHandlerExt::filtered`]. Updates that move an object into the
/// selection are delivered as additions, updates that move it out as deletions.
pub struct Filtered<H, P> {
    inner: H,
    predicate: P,
}

impl<K, H, P> EventHandler<K> for Filtered<H, P>
where
    H: EventHandler<K>,
    P: Fn(&K) -> bool + Send + Sync,
{
    fn handle(&self, event: &ChangeEvent<K>) -> Result<(), HandlerError> {
        match event {
            ChangeEvent::Added(obj) | ChangeEvent::Deleted(obj) => {
                if (self.predicate)(obj) {
                    self.inner.handle(event)
                } else {
                    Ok(())
                }
            }
            ChangeEvent::Updated { old, new } => match ((self.predicate)(old), (self.predicate)(new)) {
                (true, true) => self.inner.handle(event),
                (true, false) => self.inner.handle(&ChangeEvent::Deleted(old.clone())),
                (false, true) => self.inner.handle(&ChangeEvent::Added(new.clone())),
                (false, false) => Ok(()),
            },
        }
    }
}

/// Combinators for [`EventHandler`]s
pub trait EventHandlerExt<K>: EventHandler<K> + Sized {
    /// Only pass on events for objects matching `predicate`
    fn filtered<P>(self, predicate: P) -> Filtered<Self, P>
    where
        P: Fn(&K) -> bool + Send + Sync,
    {
        Filtered {
            inner: self,
            predicate,
        }
    }
}

impl<K, H: EventHandler<K>> EventHandlerExt<K> for H {}
