use crate::handler::{ChangeEvent, EventHandler};
use informer_core::Resource;
use parking_lot::RwLock;
use std::{
    fmt::{Debug, Display},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{error, trace, warn};

/// Identifies a handler registered with a [`Dispatcher`], for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

type Registered<K> = (HandlerId, Arc<dyn EventHandler<K>>);

/// Fans [`ChangeEvent`]s out to registered handlers
///
/// Every event is passed to every handler, in registration order. Handler failures are
/// isolated: errors are logged, panics are caught and logged, and the next handler runs regardless.
///
/// Cloning produces another handle to the same set of handlers.
pub struct Dispatcher<K> {
    handlers: Arc<RwLock<Vec<Registered<K>>>>,
    next_id: Arc<AtomicU64>,
}

impl<K> Clone for Dispatcher<K> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<K> Default for Dispatcher<K> {
    fn default() -> Self {
        Self {
            handlers: Arc::default(),
            next_id: Arc::default(),
        }
    }
}

impl<K> Debug for Dispatcher<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl<K: Resource + 'static> Dispatcher<K> {
    /// Register a handler for all future events
    pub fn add_handler(&self, handler: impl EventHandler<K> + 'static) -> HandlerId {
        self.register(Arc::new(handler), Vec::new)
    }

    /// Register a handler, first feeding it `replay()` as additions
    ///
    /// `replay` is evaluated and delivered while registration is exclusive, so no event applied
    /// through [`Dispatcher::apply_with`] can fall between the replayed state and the first live event.
    /// The replayed handler must not register further handlers from within `handle`.
    pub(crate) fn register<F>(&self, handler: Arc<dyn EventHandler<K>>, replay: F) -> HandlerId
    where
        F: FnOnce() -> Vec<Arc<K>>,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write();
        for obj in replay() {
            deliver(id, handler.as_ref(), &ChangeEvent::Added(obj));
        }
        handlers.push((id, handler));
        id
    }

    /// Stop delivering events to a handler
    ///
    /// Returns whether the handler was registered. An event that is already being dispatched
    /// may still reach the handler.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(registered, _)| *registered != id);
        handlers.len() != before
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handlers are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Pass a single event to every registered handler
    pub fn dispatch(&self, event: &ChangeEvent<K>) {
        let handlers = self.handlers.read().clone();
        for (id, handler) in &handlers {
            deliver(*id, handler.as_ref(), event);
        }
    }

    /// Run a store mutation and capture the handlers that have to observe its result
    ///
    /// Registration is blocked while `apply` runs, which is what keeps late registrations
    /// consistent with their replay. The returned batch is delivered by [`Batch::dispatch`],
    /// without holding any lock.
    pub fn apply_with<F>(&self, apply: F) -> Batch<K>
    where
        F: FnOnce() -> Vec<ChangeEvent<K>>,
    {
        let handlers = self.handlers.read();
        let events = apply();
        Batch {
            handlers: if events.is_empty() { Vec::new() } else { handlers.clone() },
            events,
        }
    }
}

/// Events produced by a store mutation, paired with the handlers they are owed to
///
/// Created by [`Dispatcher::apply_with`].
#[must_use = "events are only delivered by Batch::dispatch"]
pub struct Batch<K> {
    events: Vec<ChangeEvent<K>>,
    handlers: Vec<Registered<K>>,
}

impl<K: Resource> Batch<K> {
    /// The events in this batch, in application order
    pub fn events(&self) -> &[ChangeEvent<K>] {
        &self.events
    }

    /// Deliver every event to every captured handler
    ///
    /// Events are delivered one at a time: each handler sees an event before any handler
    /// sees the next one.
    pub fn dispatch(self) -> usize {
        for event in &self.events {
            for (id, handler) in &self.handlers {
                deliver(*id, handler.as_ref(), event);
            }
        }
        self.events.len()
    }
}

fn deliver<K: Resource>(id: HandlerId, handler: &dyn EventHandler<K>, event: &ChangeEvent<K>) {
    trace!(handler = %id, kind = K::KIND, event = event.kind(), object = %event.object_ref(), "dispatching");
    match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            handler = %id,
            kind = K::KIND,
            event = event.kind(),
            object = %event.object_ref(),
            error = %err,
            "event handler failed"
        ),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(
                handler = %id,
                kind = K::KIND,
                event = event.kind(),
                object = %event.object_ref(),
                panic = %message,
                "event handler panicked"
            );
        }
    }
}
