//! Types for the watch api

use crate::error::ErrorResponse;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A raw event returned from a watch query
///
/// Events for the same object arrive in the order the source applied the writes.
#[derive(Deserialize, Serialize, Clone)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent<K> {
    /// Object was added
    Added(K),
    /// Object was modified
    Modified(K),
    /// Object was deleted, carrying its last known state
    Deleted(K),
    /// Progress notification, only carrying a resource version.
    ///
    /// Lets a watcher resume from a newer version when nothing it selects has changed.
    Bookmark(Bookmark),
    /// There was some kind of error
    Error(ErrorResponse),
}

impl<K> Debug for WatchEvent<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            WatchEvent::Added(_) => write!(f, "Added event"),
            WatchEvent::Modified(_) => write!(f, "Modified event"),
            WatchEvent::Deleted(_) => write!(f, "Deleted event"),
            WatchEvent::Bookmark(bm) => write!(f, "Bookmark event at {}", bm.metadata.resource_version),
            WatchEvent::Error(e) => write!(f, "Error event: {e:?}"),
        }
    }
}

/// Slimmed down object for [`WatchEvent::Bookmark`].
///
/// Can only be relied upon to have metadata with resource version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    /// Basically empty metadata
    pub metadata: BookmarkMeta,
}

/// Slimmed down metadata for [`WatchEvent::Bookmark`]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkMeta {
    /// The only field we need from a Bookmark event.
    pub resource_version: String,
}

impl Bookmark {
    /// A bookmark at the given resource version
    pub fn at(resource_version: impl Into<String>) -> Self {
        Self {
            metadata: BookmarkMeta {
                resource_version: resource_version.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bookmark, WatchEvent};

    #[test]
    fn events_use_tagged_wire_format() {
        let ev: WatchEvent<u32> = serde_json::from_str(r#"{"type":"MODIFIED","object":7}"#).unwrap();
        assert!(matches!(ev, WatchEvent::Modified(7)));

        let bm = serde_json::to_value(WatchEvent::<u32>::Bookmark(Bookmark::at("42"))).unwrap();
        assert_eq!(bm["type"], "BOOKMARK");
        assert_eq!(bm["object"]["metadata"]["resourceVersion"], "42");
    }

    #[test]
    fn error_events_carry_status() {
        let ev: WatchEvent<u32> =
            serde_json::from_str(r#"{"type":"ERROR","object":{"status":"Failure","code":410}}"#).unwrap();
        assert!(matches!(ev, WatchEvent::Error(e) if e.is_gone()));
    }
}
