use crate::Labels;
use mesh_policy_core::{TypedResourceIdentifier, EFFECT_LABEL, KUBE_NAMESPACE_TAG, ZONE_TAG};
use serde::{Deserialize, Serialize};

/// Identity and labels shared by every resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceMeta {
    pub name: String,
    pub mesh: String,
    #[serde(default)]
    pub labels: Labels,
}

impl ResourceMeta {
    pub fn new(mesh: impl ToString, name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            mesh: mesh.to_string(),
            labels: Labels::default(),
        }
    }

    pub fn with_labels(mut self, labels: impl Into<Labels>) -> Self {
        self.labels = labels.into();
        self
    }

    /// Shadow resources take effect only when explicitly requested.
    pub fn is_shadow(&self) -> bool {
        self.labels.get(EFFECT_LABEL) == Some("shadow")
    }

    pub fn identifier(&self, resource_type: &str) -> TypedResourceIdentifier {
        let mut id = TypedResourceIdentifier::new(resource_type, &self.mesh, &self.name);
        if let Some(ns) = self.labels.get(KUBE_NAMESPACE_TAG) {
            id = id.with_namespace(ns);
        }
        if let Some(zone) = self.labels.get(ZONE_TAG) {
            id = id.with_zone(zone);
        }
        id
    }
}
