use super::{backends::build_backend_rules, is_cross_mesh, ReachabilityGraph};
use crate::{
    matchers::bind_from_rules,
    synthesize::{service_proxy, trim_policies, SynthesisConfig},
};
use ahash::AHashMap as HashMap;
use mesh_policy_api::{
    traffic_permission::{Conf, MeshTrafficPermission},
    Dataplane, MeshService,
};
use mesh_policy_core::{Map, Rules, TypedResourceIdentifier, SERVICE_TAG};
use std::collections::BTreeMap;
use tracing::{debug, instrument, trace};

/// Keeps the inbound rules of every service and backend, and evaluates them per query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RulesGraph {
    mesh: String,
    services: HashMap<String, Rules<Conf>>,
    backends: HashMap<TypedResourceIdentifier, Rules<Conf>>,
}

// === impl RulesGraph ===

impl RulesGraph {
    #[instrument(
        skip_all,
        fields(
            %mesh,
            services = services.len(),
            backends = mesh_services.len(),
            policies = policies.len(),
        )
    )]
    pub fn build(
        mesh: &str,
        services: &BTreeMap<String, Map>,
        mesh_services: &[MeshService],
        policies: &[MeshTrafficPermission],
        config: &SynthesisConfig,
    ) -> Self {
        let services = build_service_rules(mesh, services, policies, config);
        let backends = build_backend_rules(mesh_services, policies, config);
        debug!(services = services.len(), backends = backends.len(), "Built graph");
        Self {
            mesh: mesh.to_string(),
            services,
            backends,
        }
    }

    pub fn from_rules(
        mesh: impl ToString,
        services: HashMap<String, Rules<Conf>>,
        backends: HashMap<TypedResourceIdentifier, Rules<Conf>>,
    ) -> Self {
        Self {
            mesh: mesh.to_string(),
            services,
            backends,
        }
    }

    pub fn service_rules(&self, service: &str) -> Option<&Rules<Conf>> {
        self.services.get(service)
    }

    pub fn backend_rules(&self, backend: &TypedResourceIdentifier) -> Option<&Rules<Conf>> {
        self.backends.get(backend)
    }
}

impl ReachabilityGraph for RulesGraph {
    fn can_reach(&self, from_tags: &Map, to_tags: &Map) -> bool {
        if is_cross_mesh(&self.mesh, to_tags) {
            return true;
        }
        let Some(to) = to_tags.get(SERVICE_TAG) else {
            return false;
        };
        self.services
            .get(to)
            .is_some_and(|rules| is_allowed(rules, from_tags))
    }

    fn can_reach_backend(&self, from_tags: &Map, to: &TypedResourceIdentifier) -> bool {
        if to.mesh != self.mesh {
            return true;
        }
        self.backends
            .get(to)
            .is_some_and(|rules| is_allowed(rules, from_tags))
    }
}

/// Traffic is allowed only by a matching rule that allows it.
pub(super) fn is_allowed(rules: &Rules<Conf>, from_tags: &Map) -> bool {
    rules.compute_conf(from_tags).is_some_and(Conf::is_allowed)
}

/// Builds the inbound rules of each service's synthetic proxy.
pub(super) fn build_service_rules(
    mesh: &str,
    services: &BTreeMap<String, Map>,
    policies: &[MeshTrafficPermission],
    config: &SynthesisConfig,
) -> HashMap<String, Rules<Conf>> {
    services
        .iter()
        .map(|(name, tags)| {
            let proxy = service_proxy(mesh, name, tags);
            let rules = proxy_rules(&proxy, policies, config);
            trace!(service = %name, rules = rules.len(), "Built service rules");
            (name.clone(), rules)
        })
        .collect()
}

/// Binds trimmed copies of `policies` to a synthetic proxy and returns its only listener's rules.
pub(super) fn proxy_rules(
    proxy: &Dataplane,
    policies: &[MeshTrafficPermission],
    config: &SynthesisConfig,
) -> Rules<Conf> {
    let Some(inbound) = proxy.networking.inbound.first() else {
        return Rules::default();
    };
    let trimmed = trim_policies(policies, &inbound.tags, config);
    bind_from_rules(proxy, &trimmed, config.match_context())
        .remove(&proxy.listener(inbound))
        .unwrap_or_default()
}
