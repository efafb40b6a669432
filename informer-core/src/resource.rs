use crate::metadata::ObjectMeta;
use std::collections::BTreeMap;

/// An accessor trait for a watched object.
///
/// Implementors carry an [`ObjectMeta`], which SHOULD have:
/// - `.name`
/// - `.resource_version` (once the object has been persisted by a [`RemoteSource`](crate::RemoteSource))
///
/// And optionally:
/// - `.namespace` (absent for cluster-scoped kinds)
///
/// The kind is fixed per type, so a watch session is statically typed over its objects.
pub trait Resource {
    /// Kind of the object, used for logging and for keying shared informers
    const KIND: &'static str;

    /// Metadata that all persisted objects must have
    fn meta(&self) -> &ObjectMeta;
    /// Metadata that all persisted objects must have
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// Helper methods for resources.
pub trait ResourceExt: Resource {
    /// Returns the name of the object, or an empty string if it is unset
    ///
    /// This is intended to provide something quick and simple for standard logging purposes.
    fn name_any(&self) -> String;
    /// The namespace the object is in
    fn namespace(&self) -> Option<String>;
    /// The resource version
    fn resource_version(&self) -> Option<String>;
    /// Unique ID of this incarnation of the object
    fn uid(&self) -> Option<String>;
    /// Returns object labels
    fn labels(&self) -> &BTreeMap<String, String>;
    /// Provides mutable access to the labels
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String>;
}

impl<K: Resource> ResourceExt for K {
    fn name_any(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    fn namespace(&self) -> Option<String> {
        self.meta().namespace.clone()
    }

    fn resource_version(&self) -> Option<String> {
        self.meta().resource_version.clone()
    }

    fn uid(&self) -> Option<String> {
        self.meta().uid.clone()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.meta().labels
    }

    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta_mut().labels
    }
}

#[cfg(test)]
mod tests {
    use super::{Resource, ResourceExt};
    use crate::metadata::ObjectMeta;

    #[derive(Default)]
    struct Widget {
        metadata: ObjectMeta,
    }

    impl Resource for Widget {
        const KIND: &'static str = "Widget";

        fn meta(&self) -> &ObjectMeta {
            &self.metadata
        }

        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    #[test]
    fn ext_methods_read_metadata() {
        let mut w = Widget::default();
        assert_eq!(w.name_any(), "");
        w.meta_mut().name = Some("w1".into());
        w.meta_mut().namespace = Some("default".into());
        w.labels_mut().insert("app".into(), "web".into());
        assert_eq!(w.name_any(), "w1");
        assert_eq!(w.namespace().as_deref(), Some("default"));
        assert_eq!(w.labels().get("app").map(String::as_str), Some("web"));
        assert_eq!(w.resource_version(), None);
    }
}
