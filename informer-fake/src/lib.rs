//! An in-memory [`RemoteSource`](informer_core::RemoteSource) for tests and demos
//!
//! [`FakeClient`] stores objects of any [`Resource`](informer_core::Resource) kind in memory and serves
//! list and watch calls the way a real backend would: every write gets an increasing resource
//! version, lists can be paged, watches replay changes after the version they start from and
//! old versions expire with `410 Gone`.
//!
//! Faults can be injected per kind through the [`ObjectTracker`]:
//! failing the next list or watch, closing open watches, or expiring them.
#![deny(unsafe_code)]

mod client;
pub use client::FakeClient;

pub mod objects;

pub mod tracker;
pub use tracker::ObjectTracker;
