use educe::Educe;
use informer_core::{Resource, ResourceExt};
use std::fmt::{Debug, Display};

/// A namespaced (if relevant) reference to an object in a watched collection
///
/// This is the identity key of the [`Store`](super::Store): two objects with the same
/// name and namespace are the same object at different points in time.
///
/// ```
/// use informer_runtime::reflector::ObjectRef;
/// assert_ne!(ObjectRef::new("a"), ObjectRef::new("a").within("default"));
/// assert_eq!(ObjectRef::new("a").within("default").to_string(), "a.default");
/// ```
#[derive(Educe)]
#[educe(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct ObjectRef {
    /// The name of the object
    pub name: String,
    /// The namespace of the object
    ///
    /// Is `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Extra information about the object being referred to
    ///
    /// This is *not* considered when comparing objects.
    #[educe(Hash(ignore), PartialEq(ignore))]
    pub extra: Extra,
}

/// Non-vital information about an object being referred to
///
/// See [`ObjectRef::extra`].
#[derive(Default, Debug, Clone)]
#[non_exhaustive]
pub struct Extra {
    /// The version of the object at the time of reference
    pub resource_version: Option<String>,
}

impl ObjectRef {
    /// A reference to a cluster-scoped object, or a namespaced one once [`within`](Self::within) is called
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            extra: Extra::default(),
        }
    }

    /// Scope the reference to a namespace
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Creates `ObjectRef` from the object's metadata
    #[must_use]
    pub fn from_obj<K: Resource>(obj: &K) -> Self {
        Self {
            name: obj.name_any(),
            namespace: obj.namespace(),
            extra: Extra {
                resource_version: obj.resource_version(),
            },
        }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(namespace) = &self.namespace {
            write!(f, ".{namespace}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
    };

    use super::{Extra, ObjectRef};

    fn hash_value<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn display_should_follow_expected_format() {
        assert_eq!(ObjectRef::new("my-pod").within("ns").to_string(), "my-pod.ns");
        assert_eq!(ObjectRef::new("my-node").to_string(), "my-node");
    }

    #[test]
    fn extra_is_ignored_for_identity() {
        let minimal = ObjectRef::new("a").within("b");
        let with_extra = ObjectRef {
            extra: Extra {
                resource_version: Some("123".to_string()),
            },
            ..minimal.clone()
        };
        assert_eq!(minimal, with_extra);
        assert_eq!(hash_value(&minimal), hash_value(&with_extra));
    }
}
