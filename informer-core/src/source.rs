//! The list + watch interface that informers are built on
use crate::{metadata::ObjectList, params::ListParams, watch::WatchEvent, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// A stream of raw watch events, as returned by [`RemoteSource::watch`]
pub type BoxWatchStream<K> = BoxStream<'static, Result<WatchEvent<K>>>;

/// A remote collection of objects of kind `K` that can be listed and watched
///
/// This is the only seam between the runtime and a backend. Implementations must assign
/// monotonically increasing resource versions, so that a watch started from the version
/// of a list observes exactly the writes that happened after it.
///
/// Errors follow [`ErrorResponse`](crate::ErrorResponse) codes:
/// a `410` (see [`Error::is_gone`](crate::Error::is_gone)) from either call means the requested
/// version is no longer available and the caller has to list again.
#[async_trait]
pub trait RemoteSource<K>: Send + Sync {
    /// List the collection, returning a consistent snapshot and the version it was taken at
    ///
    /// When `params.limit` is set the result may be truncated, with
    /// [`ListMeta::continue_`](crate::ListMeta::continue_) set to fetch the next page.
    async fn list(&self, params: &ListParams) -> Result<ObjectList<K>>;

    /// Watch the collection for changes made after `resource_version`
    ///
    /// The returned stream ends when the source closes the watch, for instance when
    /// `params.timeout` elapses. Dropping the stream closes the watch.
    async fn watch(&self, params: &ListParams, resource_version: &str) -> Result<BoxWatchStream<K>>;
}

#[async_trait]
impl<K, S> RemoteSource<K> for Arc<S>
where
    K: Send + 'static,
    S: RemoteSource<K> + ?Sized,
{
    async fn list(&self, params: &ListParams) -> Result<ObjectList<K>> {
        (**self).list(params).await
    }

    async fn watch(&self, params: &ListParams, resource_version: &str) -> Result<BoxWatchStream<K>> {
        (**self).watch(params, resource_version).await
    }
}
