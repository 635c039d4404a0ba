use crate::{Dataplane, ResourceMeta, TagSelector, TargetRef};
use mesh_policy_core::Map;
use serde::{Deserialize, Serialize};

/// Configures the listeners of the builtin gateway proxies its selectors match.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MeshGateway {
    pub meta: ResourceMeta,
    #[serde(default)]
    pub selectors: Vec<TagSelector>,
    #[serde(default)]
    pub tags: Map,
    #[serde(default)]
    pub listeners: Vec<GatewayListener>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GatewayListener {
    pub port: u32,
    #[serde(default)]
    pub tags: Map,
}

/// Only the route's own target matters when a policy targets it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshHttpRoute {
    pub meta: ResourceMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<TargetRef>,
}

// === impl MeshGateway ===

impl MeshGateway {
    /// Returns true if `dataplane` is a builtin gateway selected by this resource.
    pub fn selects(&self, dataplane: &Dataplane) -> bool {
        let Some(gateway) = dataplane.networking.gateway.as_ref() else {
            return false;
        };
        dataplane.is_builtin_gateway()
            && dataplane.meta.mesh == self.meta.mesh
            && self.selectors.iter().any(|s| s.matches(&gateway.tags))
    }

    /// Tags of `listener` as seen on `dataplane`: the proxy's gateway tags, overridden by the
    /// gateway's tags, overridden by the listener's.
    pub fn listener_tags(&self, dataplane: &Dataplane, listener: &GatewayListener) -> Map {
        let mut tags = dataplane
            .networking
            .gateway
            .as_ref()
            .map(|gw| gw.tags.clone())
            .unwrap_or_default();
        tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags.extend(listener.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags
    }
}
