//! Caches objects in memory and tells handlers about every change

mod dispatcher;
mod object_ref;
pub mod store;

pub use self::{
    dispatcher::{Batch, Dispatcher, HandlerId},
    object_ref::{Extra as ObjectRefExtra, ObjectRef},
    store::{store, Store, Writer},
};
use crate::{
    handler::ChangeEvent,
    sync::SyncBarrier,
    utils::{ResettableBackoff, WatchStreamExt},
    watcher::{self, watcher, DefaultBackoff},
};
use futures::StreamExt;
use informer_core::{RemoteSource, Resource};
use std::{fmt::Debug, time::Duration};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Keeps a [`Store`] in sync with a [`RemoteSource`] and dispatches the resulting changes
///
/// The reflector lists the collection, reconciles its store against the listing, marks its
/// [`SyncBarrier`] as synced and then follows a watch from the listed version. Whenever the watch
/// ends it relists after a backoff, and reconciling that listing against the cache turns anything
/// that was missed while disconnected into ordinary [`ChangeEvent`]s.
///
/// All of this happens on the task that drives [`Reflector::run`]: store updates and handler
/// invocations are strictly sequential, so per-object event order follows the order of the source.
///
/// Usually created through [`Informer::new`](crate::Informer::new).
pub struct Reflector<K, S> {
    source: S,
    config: watcher::Config,
    writer: Writer<K>,
    dispatcher: Dispatcher<K>,
    synced: SyncBarrier,
    resync_period: Option<Duration>,
    backoff: Box<dyn ResettableBackoff + Send>,
}

impl<K, S> Debug for Reflector<K, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reflector")
            .field("config", &self.config)
            .field("resync_period", &self.resync_period)
            .field("synced", &self.synced.has_synced())
            .finish_non_exhaustive()
    }
}

impl<K, S> Reflector<K, S>
where
    K: Resource + Send + Sync + 'static,
    S: RemoteSource<K> + 'static,
{
    /// Assemble a reflector from its parts
    ///
    /// The [`Writer`] is consumed, so that the reflector is the only party mutating the store.
    pub fn new(
        source: S,
        config: watcher::Config,
        writer: Writer<K>,
        dispatcher: Dispatcher<K>,
        synced: SyncBarrier,
    ) -> Self {
        Self {
            source,
            config,
            writer,
            dispatcher,
            synced,
            resync_period: None,
            backoff: Box::new(DefaultBackoff::default()),
        }
    }

    /// Periodically redeliver every cached object as an update
    ///
    /// `None` (the default) disables resyncs.
    #[must_use]
    pub fn resync_period(mut self, period: Option<Duration>) -> Self {
        self.resync_period = period.filter(|p| !p.is_zero());
        self
    }

    /// Replace the [`DefaultBackoff`] applied between failed or closed watches
    ///
    /// A policy that runs out of delays is followed by the [`DefaultBackoff`] until it is reset,
    /// so the reflector keeps relisting either way.
    #[must_use]
    pub fn backoff(mut self, backoff: impl ResettableBackoff + Send + 'static) -> Self {
        self.backoff = Box::new(OrDefault::new(backoff));
        self
    }

    /// Run until `stop` is cancelled
    ///
    /// Errors are never fatal: they are logged and followed by a relist after a backoff delay.
    /// Once `stop` fires, any open watch is dropped and no further events are dispatched.
    pub async fn run(self, stop: CancellationToken) {
        let Self {
            source,
            config,
            mut writer,
            dispatcher,
            synced,
            resync_period,
            backoff,
        } = self;
        let reader = writer.as_reader();
        let stream = watcher(source, config).backoff(backoff);
        futures::pin_mut!(stream);
        let mut resync = resync_period.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut listed = Vec::new();
        info!(kind = K::KIND, "starting reflector");

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = next_tick(&mut resync) => {
                    if !synced.has_synced() {
                        continue;
                    }
                    let n = dispatcher
                        .apply_with(|| {
                            reader
                                .state()
                                .into_iter()
                                .map(|obj| ChangeEvent::Updated { old: obj.clone(), new: obj })
                                .collect()
                        })
                        .dispatch();
                    debug!(kind = K::KIND, objects = n, "resynced");
                }
                event = stream.next() => match event {
                    Some(Ok(watcher::Event::Init)) => {
                        trace!(kind = K::KIND, "listing");
                        listed.clear();
                    }
                    Some(Ok(watcher::Event::InitApply(obj))) => listed.push(obj),
                    Some(Ok(watcher::Event::InitDone)) => {
                        let objects = std::mem::take(&mut listed);
                        let count = objects.len();
                        let batch = dispatcher.apply_with(|| writer.reconcile(objects));
                        debug!(kind = K::KIND, listed = count, changes = batch.events().len(), "reconciled listing");
                        batch.dispatch();
                        if !synced.has_synced() {
                            info!(kind = K::KIND, objects = count, "cache synced");
                            synced.mark_synced();
                        }
                    }
                    Some(Ok(watcher::Event::Apply(obj))) => {
                        dispatcher
                            .apply_with(|| writer.upsert(obj).into_iter().collect())
                            .dispatch();
                    }
                    Some(Ok(watcher::Event::Delete(obj))) => {
                        dispatcher
                            .apply_with(|| writer.remove(obj).into_iter().collect())
                            .dispatch();
                    }
                    Some(Err(watcher::Error::WatchClosed)) => {
                        debug!(kind = K::KIND, "watch closed, relisting");
                    }
                    Some(Err(err)) => {
                        warn!(kind = K::KIND, error = %err, "list/watch failed, retrying after backoff");
                    }
                    None => {
                        warn!(kind = K::KIND, "backoff gave up, reflector exiting");
                        return;
                    }
                },
            }
        }
        info!(kind = K::KIND, "reflector stopped");
    }
}

/// Continues a custom backoff with the [`DefaultBackoff`] once it is exhausted
struct OrDefault<B> {
    custom: B,
    exhausted: bool,
    fallback: DefaultBackoff,
}

impl<B> OrDefault<B> {
    fn new(custom: B) -> Self {
        Self {
            custom,
            exhausted: false,
            fallback: DefaultBackoff::default(),
        }
    }
}

impl<B: ResettableBackoff> Iterator for OrDefault<B> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if !self.exhausted {
            if let Some(delay) = self.custom.next() {
                return Some(delay);
            }
            warn!("backoff policy exhausted, continuing with the default backoff");
            self.exhausted = true;
        }
        self.fallback.next()
    }
}

impl<B: ResettableBackoff> ResettableBackoff for OrDefault<B> {
    fn reset(&mut self) {
        self.custom.reset();
        self.fallback.reset();
        self.exhausted = false;
    }
}

async fn next_tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}
