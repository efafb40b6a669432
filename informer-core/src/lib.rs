//! Crate with types and traits necessary for watching a remote object collection
//!
//! This crate is available as a minimal alternative to `informer` where a runtime is not needed.
//! The same information here is always re-exported from `informer` under `informer::core`.
//!
//! The main pieces are:
//!
//! - [`Resource`] for objects identified by namespace and name, carrying a resource version
//! - [`RemoteSource`] for backends that can list and watch such objects
//! - [`WatchEvent`] / [`ObjectList`] for what a [`RemoteSource`] hands back
//! - [`params::ListParams`] and [`labels::Selector`] for narrowing a collection
#![deny(unsafe_code)]

pub mod labels;

pub mod metadata;
pub use metadata::{ListMeta, ObjectList, ObjectMeta};

pub mod params;

mod resource;
pub use resource::{Resource, ResourceExt};

pub mod source;
pub use source::{BoxWatchStream, RemoteSource};

pub mod watch;
pub use watch::WatchEvent;

mod error;
pub use error::{Error, ErrorResponse};

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
