//! Sample object kinds for exercising informers
use informer_core::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};

/// A workload instance, trimmed down to what demos and tests look at
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Pod {
    /// Standard object metadata
    pub metadata: ObjectMeta,
    /// Desired state
    #[serde(default)]
    pub spec: PodSpec,
    /// Observed state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

/// Desired state of a [`Pod`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Image of the single container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Node the pod is scheduled to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

/// Observed state of a [`Pod`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PodStatus {
    /// Lifecycle phase, such as `Pending` or `Running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// A replicated workload
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Deployment {
    /// Standard object metadata
    pub metadata: ObjectMeta,
    /// Desired state
    #[serde(default)]
    pub spec: DeploymentSpec,
}

/// Desired state of a [`Deployment`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DeploymentSpec {
    /// Number of desired pods
    #[serde(default)]
    pub replicas: i32,
}

macro_rules! sample_kind {
    ($ty:ident) => {
        impl Resource for $ty {
            const KIND: &'static str = stringify!($ty);

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }

        impl $ty {
            #[doc = concat!("A ", stringify!($ty), " called `name`, without a namespace")]
            #[must_use]
            pub fn new(name: &str) -> Self {
                let mut obj = Self::default();
                obj.metadata.name = Some(name.to_string());
                obj
            }

            /// Place the object in a namespace
            #[must_use]
            pub fn within(mut self, namespace: &str) -> Self {
                self.metadata.namespace = Some(namespace.to_string());
                self
            }

            /// Add a label
            #[must_use]
            pub fn with_label(mut self, key: &str, value: &str) -> Self {
                self.metadata.labels.insert(key.to_string(), value.to_string());
                self
            }

            /// Set the resource version, as a source would
            #[must_use]
            pub fn with_version(mut self, resource_version: &str) -> Self {
                self.metadata.resource_version = Some(resource_version.to_string());
                self
            }
        }
    };
}

sample_kind!(Pod);
sample_kind!(Deployment);

impl Pod {
    /// Set the lifecycle phase
    #[must_use]
    pub fn with_phase(mut self, phase: &str) -> Self {
        self.status = Some(PodStatus {
            phase: Some(phase.to_string()),
        });
        self
    }

    /// The lifecycle phase, if reported
    #[must_use]
    pub fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::{Deployment, Pod};
    use informer_core::{Resource, ResourceExt};

    #[test]
    fn builders_fill_metadata() {
        let pod = Pod::new("busybox")
            .within("default")
            .with_label("app", "web")
            .with_version("7")
            .with_phase("Running");
        assert_eq!(pod.name_any(), "busybox");
        assert_eq!(pod.namespace().as_deref(), Some("default"));
        assert_eq!(pod.labels().get("app").map(String::as_str), Some("web"));
        assert_eq!(pod.resource_version().as_deref(), Some("7"));
        assert_eq!(pod.phase(), Some("Running"));
        assert_eq!(Pod::KIND, "Pod");
        assert_eq!(Deployment::KIND, "Deployment");
    }

    #[test]
    fn serializes_like_an_api_object() {
        let pod = Pod::new("p").within("ns").with_phase("Pending");
        let json = serde_json::to_value(&pod).unwrap();
        assert_eq!(json["metadata"]["name"], "p");
        assert_eq!(json["status"]["phase"], "Pending");
        let back: Pod = serde_json::from_value(json).unwrap();
        assert_eq!(back, pod);
    }
}
