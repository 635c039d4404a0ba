use crate::ResourceMeta;
use mesh_policy_core::{Map, TypedResourceIdentifier, SERVICE_TAG};
use serde::{Deserialize, Serialize};

pub const MESH_SERVICE_KIND: &str = "MeshService";

/// A service backed by the dataplanes its selector matches.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MeshService {
    pub meta: ResourceMeta,
    #[serde(default)]
    pub selector: MeshServiceSelector,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshServiceSelector {
    #[serde(default)]
    pub dataplane_tags: Map,
}

/// A destination outside the mesh, reachable through the mesh's egress.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExternalService {
    pub meta: ResourceMeta,
    #[serde(default)]
    pub tags: Map,
}

/// Advertises the services available in a remote zone.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneIngress {
    pub meta: ResourceMeta,
    #[serde(default)]
    pub available_services: Vec<AvailableService>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AvailableService {
    pub mesh: String,
    #[serde(default)]
    pub tags: Map,
}

// === impl MeshService ===

impl MeshService {
    pub fn new<K: ToString, V: ToString>(
        meta: ResourceMeta,
        dataplane_tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            meta,
            selector: MeshServiceSelector {
                dataplane_tags: dataplane_tags
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        }
    }

    pub fn identifier(&self) -> TypedResourceIdentifier {
        self.meta.identifier(MESH_SERVICE_KIND)
    }
}

// === impl ExternalService ===

impl ExternalService {
    pub fn service(&self) -> Option<&str> {
        self.tags.get(SERVICE_TAG).map(String::as_str)
    }
}

// === impl AvailableService ===

impl AvailableService {
    pub fn service(&self) -> Option<&str> {
        self.tags.get(SERVICE_TAG).map(String::as_str)
    }
}
