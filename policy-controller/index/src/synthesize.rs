//! Representative proxies for whole services.
//!
//! Evaluating policies against every proxy instance costs `policies × instances`. Reachability is
//! only needed per service, so each service is represented by one synthetic proxy carrying the
//! tags all of its instances are assumed to share. Policy constraints on any other tag cannot be
//! answered for a synthetic proxy and are trimmed away, which can only widen what a policy selects.

use crate::MatchContext;
use mesh_policy_api::{
    traffic_permission::MeshTrafficPermission, Dataplane, ExternalService, Inbound, MeshService,
    Policy, ResourceMeta, TargetRef, ZoneIngress,
};
use mesh_policy_core::{
    Map, KUBE_NAMESPACE_TAG, KUBE_PORT_TAG, KUBE_SERVICE_TAG, RESOURCE_ORIGIN_LABEL, SERVICE_TAG,
    ZONE_TAG,
};
use std::collections::{btree_map::Entry, BTreeMap};
use tracing::{debug, trace};

/// The address and port of a synthetic proxy's only inbound.
pub const SYNTHETIC_ADDRESS: &str = "1.1.1.1";
pub const SYNTHETIC_PORT: u32 = 1234;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisConfig {
    /// Tags assumed uniform across all instances of a service.
    pub supported_tags: Vec<String>,

    /// Whether shadow policies are evaluated.
    pub include_shadow: bool,
}

// === impl SynthesisConfig ===

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            supported_tags: default_supported_tags(),
            include_shadow: false,
        }
    }
}

impl SynthesisConfig {
    pub fn is_supported(&self, key: &str) -> bool {
        self.supported_tags.iter().any(|t| t == key)
    }

    pub fn match_context(&self) -> MatchContext<'static> {
        MatchContext {
            include_shadow: self.include_shadow,
            ..MatchContext::default()
        }
    }

    fn supported(&self, tags: &Map) -> Map {
        tags.iter()
            .filter(|(k, _)| self.is_supported(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn default_supported_tags() -> Vec<String> {
    vec![
        KUBE_NAMESPACE_TAG.to_string(),
        KUBE_SERVICE_TAG.to_string(),
        KUBE_PORT_TAG.to_string(),
    ]
}

/// Lists the services of `mesh` with the supported tags of the first instance seen.
///
/// Services come from dataplane inbounds, external services, and the services zone ingresses
/// advertise for `mesh`. The service tag itself is not included in the returned tags.
pub fn build_services(
    mesh: &str,
    dataplanes: &[Dataplane],
    external_services: &[ExternalService],
    zone_ingresses: &[ZoneIngress],
    config: &SynthesisConfig,
) -> BTreeMap<String, Map> {
    let mut services = BTreeMap::new();
    let mut add = |name: &str, tags: &Map| {
        if let Entry::Vacant(entry) = services.entry(name.to_string()) {
            trace!(service = %name, "Discovered service");
            entry.insert(config.supported(tags));
        }
    };

    for dataplane in dataplanes.iter().filter(|dp| dp.meta.mesh == mesh) {
        for inbound in dataplane.active_inbounds() {
            if let Some(name) = inbound.service() {
                add(name, &inbound.tags);
            }
        }
    }

    for es in external_services.iter().filter(|es| es.meta.mesh == mesh) {
        if let Some(name) = es.service() {
            add(name, &es.tags);
        }
    }

    for zi in zone_ingresses {
        for svc in zi.available_services.iter().filter(|svc| svc.mesh == mesh) {
            if let Some(name) = svc.service() {
                add(name, &svc.tags);
            }
        }
    }

    debug!(%mesh, services = services.len(), "Built services");
    services
}

/// Builds the proxy that stands in for every instance of the service `name`.
pub fn service_proxy(mesh: &str, name: &str, tags: &Map) -> Dataplane {
    let mut tags = tags.clone();
    tags.insert(SERVICE_TAG.to_string(), name.to_string());
    synthetic_proxy(mesh, name, tags)
}

/// Builds the proxy that stands in for every dataplane a `MeshService` selects.
pub fn backend_proxy(service: &MeshService, config: &SynthesisConfig) -> Dataplane {
    let mut tags = service.selector.dataplane_tags.clone();
    for key in [RESOURCE_ORIGIN_LABEL, ZONE_TAG] {
        if let Some(v) = service.meta.labels.get(key).filter(|v| !v.is_empty()) {
            tags.insert(key.to_string(), v.to_string());
        }
    }
    tags.extend(config.supported(service.meta.labels.as_ref()));
    synthetic_proxy(&service.meta.mesh, &service.meta.name, tags)
}

fn synthetic_proxy(mesh: &str, name: &str, tags: Map) -> Dataplane {
    Dataplane::new(ResourceMeta::new(mesh, name), SYNTHETIC_ADDRESS).with_inbound(Inbound {
        name: None,
        port: SYNTHETIC_PORT,
        address: None,
        tags,
        state: Default::default(),
    })
}

/// Returns copies of `policies` with top-level constraints `proxy_tags` cannot answer for removed.
///
/// A constraint key is kept if it is the service tag, a supported tag, or a tag the synthetic
/// proxy carries. A subset left without tags selects the same scope as its non-subset kind.
pub fn trim_policies<C: Clone>(
    policies: &[Policy<C>],
    proxy_tags: &Map,
    config: &SynthesisConfig,
) -> Vec<Policy<C>> {
    policies
        .iter()
        .map(|policy| {
            let mut policy = policy.clone();
            if let Some(target_ref) = policy.spec.target_ref.as_mut() {
                trim_target_ref(target_ref, proxy_tags, config);
            }
            policy
        })
        .collect()
}

fn trim_target_ref(target_ref: &mut TargetRef, proxy_tags: &Map, config: &SynthesisConfig) {
    if !target_ref.kind.is_subset() {
        return;
    }

    if let Some(tags) = target_ref.tags.as_mut() {
        tags.retain(|k, _| {
            k == SERVICE_TAG || config.is_supported(k) || proxy_tags.contains_key(k)
        });
    }

    if target_ref.tags.as_ref().map_or(true, Map::is_empty) {
        trace!(kind = %target_ref.kind, "Trimmed all tags");
        target_ref.kind = target_ref.kind.without_subset();
        target_ref.tags = None;
    }
}

/// Returns copies of `policies` with subsets widened for the eager graph.
///
/// Top-level subsets select the whole service. A `from` subset that allows traffic is treated as
/// allowing the whole service, and one that denies traffic is dropped.
pub fn replace_subsets(policies: &[MeshTrafficPermission]) -> Vec<MeshTrafficPermission> {
    policies
        .iter()
        .map(|policy| {
            let mut policy = policy.clone();
            if let Some(target_ref) = policy.spec.target_ref.as_mut() {
                if target_ref.kind.is_subset() {
                    target_ref.kind = target_ref.kind.without_subset();
                    target_ref.tags = None;
                }
            }

            policy.spec.from.retain_mut(|item| {
                if !item.target_ref.kind.is_subset() {
                    return true;
                }
                if !item.default.is_allowed() {
                    return false;
                }
                item.target_ref.kind = item.target_ref.kind.without_subset();
                item.target_ref.tags = None;
                true
            });
            policy
        })
        .collect()
}
