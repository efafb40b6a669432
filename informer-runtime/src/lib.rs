//! Runtime components for keeping a local cache of a watched collection
//!
//! This crate contains the building blocks of an informer: something that lists and watches a
//! [`RemoteSource`](informer_core::RemoteSource), keeps the result in memory, and tells interested
//! handlers about every change.
//!
//! Newcomers should generally get started with [`InformerFactory`] or [`Informer::spawn`], which manage
//! all state internals for you. The lower layers are public too:
//!
//! - [`watcher()`] turns list + watch calls into one recovering stream of events
//! - [`Reflector`] drives a watcher into a [`Store`] and a [`reflector::Dispatcher`]
//! - [`Lister`](lister::Lister) answers queries from the store
//! - [`SyncBarrier`](sync::SyncBarrier) tells whether the initial listing has been applied

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
// Triggered by many derive macros (educe)
#![allow(clippy::default_trait_access)]
#![allow(clippy::module_name_repetitions)]

pub mod factory;
pub mod handler;
pub mod informer;
pub mod lister;
pub mod reflector;
pub mod sync;
pub mod utils;
pub mod watcher;

pub use factory::InformerFactory;
pub use handler::{ChangeEvent, EventHandler, EventHandlerExt, HandlerFuncs};
pub use informer::{Informer, InformerConfig};
pub use reflector::{Reflector, Store};
pub use sync::wait_for_cache_sync;
pub use utils::WatchStreamExt;
pub use watcher::watcher;
