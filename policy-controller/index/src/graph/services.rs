use super::{
    backends::build_backend_rules,
    is_cross_mesh,
    rules::{build_service_rules, is_allowed},
    ReachabilityGraph,
};
use crate::synthesize::{replace_subsets, SynthesisConfig};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use mesh_policy_api::{
    traffic_permission::{Conf, MeshTrafficPermission},
    MeshService,
};
use mesh_policy_core::{Map, Rules, TypedResourceIdentifier, SERVICE_TAG};
use std::{collections::BTreeMap, hash::Hash};
use tracing::{debug, instrument};

/// Reachability between every pair of services, evaluated when the graph is built.
///
/// Subset entries are widened before evaluation (see [`replace_subsets`]), so edges are decided
/// per service rather than per instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServicesGraph {
    mesh: String,
    edges: Edges<String>,
    backend_edges: Edges<TypedResourceIdentifier>,
}

#[derive(Clone, Debug, PartialEq)]
struct Edges<K: Hash + Eq> {
    /// Destinations every client may reach.
    from_all: HashSet<K>,

    /// Destinations each client service may reach, besides those in `from_all`.
    connections: HashMap<String, HashSet<K>>,
}

// === impl ServicesGraph ===

impl ServicesGraph {
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
        let policies = replace_subsets(policies);

        let mut edges = Edges::default();
        for (to, rules) in build_service_rules(mesh, services, &policies, config) {
            edges.insert(to, &rules, services);
        }

        let mut backend_edges = Edges::default();
        for (to, rules) in build_backend_rules(mesh_services, &policies, config) {
            backend_edges.insert(to, &rules, services);
        }

        debug!(
            from_all = edges.from_all.len(),
            clients = edges.connections.len(),
            "Built graph",
        );
        Self {
            mesh: mesh.to_string(),
            edges,
            backend_edges,
        }
    }

    pub fn from_all(&self) -> &HashSet<String> {
        &self.edges.from_all
    }

    pub fn connections(&self) -> &HashMap<String, HashSet<String>> {
        &self.edges.connections
    }
}

impl ReachabilityGraph for ServicesGraph {
    fn can_reach(&self, from_tags: &Map, to_tags: &Map) -> bool {
        if is_cross_mesh(&self.mesh, to_tags) {
            return true;
        }
        match to_tags.get(SERVICE_TAG) {
            Some(to) => self.edges.contains(from_tags, to),
            None => false,
        }
    }

    fn can_reach_backend(&self, from_tags: &Map, to: &TypedResourceIdentifier) -> bool {
        if to.mesh != self.mesh {
            return true;
        }
        self.backend_edges.contains(from_tags, to)
    }
}

// === impl Edges ===

impl<K: Hash + Eq> Default for Edges<K> {
    fn default() -> Self {
        Self {
            from_all: HashSet::new(),
            connections: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone> Edges<K> {
    /// Records which services may reach `to`.
    ///
    /// A destination is reachable from all clients when a mesh-wide rule exists and every rule
    /// allows traffic. Otherwise each known service, including `to` itself, is checked.
    fn insert(&mut self, to: K, rules: &Rules<Conf>, services: &BTreeMap<String, Map>) {
        let mesh_wide = rules.iter().any(|rule| rule.subset.is_mesh());
        if mesh_wide && rules.iter().all(|rule| rule.conf.is_allowed()) {
            self.from_all.insert(to);
            return;
        }

        for (from, tags) in services {
            let mut from_tags = tags.clone();
            from_tags.insert(SERVICE_TAG.to_string(), from.clone());
            if is_allowed(rules, &from_tags) {
                self.connections
                    .entry(from.clone())
                    .or_default()
                    .insert(to.clone());
            }
        }
    }

    fn contains<Q>(&self, from_tags: &Map, to: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.from_all.contains(to) {
            return true;
        }
        from_tags
            .get(SERVICE_TAG)
            .and_then(|from| self.connections.get(from))
            .is_some_and(|tos| tos.contains(to))
    }
}
