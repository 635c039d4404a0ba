use super::rules::proxy_rules;
use crate::synthesize::{backend_proxy, SynthesisConfig};
use ahash::AHashMap as HashMap;
use mesh_policy_api::{
    traffic_permission::{Conf, MeshTrafficPermission},
    MeshService,
};
use mesh_policy_core::{Rules, TypedResourceIdentifier};
use tracing::trace;

/// Builds the inbound rules of every `MeshService`, keyed by its identifier.
///
/// Each service is represented by a synthetic proxy tagged with its dataplane selector, so policies
/// selecting the service's dataplanes by tag select the service.
pub fn build_backend_rules(
    mesh_services: &[MeshService],
    policies: &[MeshTrafficPermission],
    config: &SynthesisConfig,
) -> HashMap<TypedResourceIdentifier, Rules<Conf>> {
    mesh_services
        .iter()
        .map(|service| {
            let proxy = backend_proxy(service, config);
            let rules = proxy_rules(&proxy, policies, config);
            let id = service.identifier();
            trace!(backend = %id, rules = rules.len(), "Built backend rules");
            (id, rules)
        })
        .collect()
}
