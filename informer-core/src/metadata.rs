//! Metadata structs used in traits and lists.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata that every watched object carries
///
/// `name` and `namespace` make up the identity of an object within a collection,
/// `resource_version` is assigned by the [`RemoteSource`](crate::RemoteSource) on every write.
#[derive(Deserialize, Serialize, Clone, Default, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Name of the object, unique within its namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace of the object, `None` for cluster-scoped objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Opaque version token, increasing with every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Unique id of this incarnation of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Labels used for selection
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Metadata attached to list responses
#[derive(Deserialize, Serialize, Clone, Default, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// The collection version the list was served at
    ///
    /// Watches started from this version see every change made after the list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Token for fetching the next page, if the list was truncated
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<String>,
}

/// A generic object list
///
/// This is what [`RemoteSource::list`](crate::RemoteSource::list) returns,
/// and is only used for its `resource_version` and `items` within reflectors and informers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ObjectList<T> {
    /// ListMeta - only really used for its `resourceVersion` and `continue` token
    pub metadata: ListMeta,

    /// The items we are actually interested in
    #[serde(bound(deserialize = "Vec<T>: Deserialize<'de>"))]
    pub items: Vec<T>,
}

impl<T> ObjectList<T> {
    /// `iter` returns an Iterator over the elements of this ObjectList
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for ObjectList<T> {
    type IntoIter = ::std::vec::IntoIter<Self::Item>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ObjectList<T> {
    type IntoIter = ::std::slice::Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{ListMeta, ObjectMeta};

    #[test]
    fn continue_token_uses_wire_name() {
        let meta = ListMeta {
            resource_version: Some("12".into()),
            continue_: Some("abc".into()),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["continue"], "abc");
        assert_eq!(json["resourceVersion"], "12");
    }

    #[test]
    fn empty_fields_are_omitted() {
        let meta = ObjectMeta {
            name: Some("a".into()),
            ..ObjectMeta::default()
        };
        assert_eq!(serde_json::to_string(&meta).unwrap(), r#"{"name":"a"}"#);
    }
}
