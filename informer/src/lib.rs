//! Informer is an umbrella-crate for keeping local caches of remote object collections.
//!
//! # Overview
//!
//! An informer lists a collection once, then follows a watch of it, keeping an in-memory copy
//! that is always consistent with some recent version of the remote collection. Handlers
//! registered on the informer hear about every addition, update and deletion, and listers
//! answer queries from the copy without touching the remote.
//!
//! The main modules are:
//!
//! - [`core`](crate::core) with the [`RemoteSource`](crate::RemoteSource) seam, object metadata and selectors
//! - [`runtime`](crate::runtime) with the [`watcher`](crate::runtime::watcher()), [`Informer`](crate::runtime::Informer),
//!   [`Store`](crate::runtime::Store) and [`InformerFactory`](crate::runtime::InformerFactory)
//! - [`fake`](crate::fake) with an in-memory source for tests, behind the `fake` feature
//!
//! # Using an informer
//!
//! ```no_run
//! use informer::{
//!     runtime::{handler::HandlerFuncs, InformerFactory},
//!     ResourceExt,
//! };
//! # use informer::{Resource, RemoteSource};
//! # use tokio_util::sync::CancellationToken;
//! # async fn wrapper<Pod, S>(source: S) where Pod: Resource + Send + Sync + 'static, S: RemoteSource<Pod> + 'static {
//! let factory = InformerFactory::new(source).namespace("default");
//! let pods = factory.informer::<Pod>();
//! pods.add_handler(HandlerFuncs::default().on_add(|pod: &Pod| {
//!     println!("pod added: {}", pod.name_any());
//!     Ok(())
//! }));
//!
//! let stop = CancellationToken::new();
//! factory.start(&stop);
//! if factory.wait_for_cache_sync(&stop).await {
//!     match pods.lister().get("default", "busybox") {
//!         Ok(pod) => println!("found {}", pod.name_any()),
//!         Err(err) if err.is_not_found() => println!("pod busybox not found"),
//!         Err(err) => println!("{err}"),
//!     }
//! }
//! # }
//! ```
//!
//! For details, see:
//!
//! - [`runtime::watcher`](crate::runtime::watcher()) for how the list and watch calls recover from failures
//! - [`runtime::reflector`](crate::runtime::reflector) for how changes reach the cache and handlers
//! - [`runtime::sync`](crate::runtime::sync) for waiting on the initial listing
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

/// Re-exports from [`informer-runtime`](informer_runtime)
#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
#[doc(inline)]
pub use informer_runtime as runtime;

/// Re-exports from [`informer-fake`](informer_fake)
#[cfg(feature = "fake")]
#[cfg_attr(docsrs, doc(cfg(feature = "fake")))]
#[doc(inline)]
pub use informer_fake as fake;

pub use crate::core::{Error, RemoteSource, Resource, ResourceExt, Result};
/// Re-exports from [`informer_core`](informer_core)
#[doc(inline)]
pub use informer_core as core;
