#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_policy_api as api;
pub use mesh_policy_core as core;
pub use mesh_policy_index as index;

mod admission;
mod config;
mod validation;


pub use self::{
    admission::{Admission, Validate},
    config::{EngineConfig, GraphMode},
    validation::{validate_target_ref, ValidationError, Violation},
};

use self::{
    api::{
        traffic_permission::{Conf, MeshTrafficPermission},
        Dataplane, ExternalService, MeshGateway, MeshHttpRoute, MeshService, Policy, PolicyConf,
        ZoneIngress,
    },
    index::{
        build_services, matched_policies, Graph, MatchContext, MatchedPolicies, RulesGraph,
        ServicesGraph, SynthesisConfig,
    },
};
use tracing::{debug, instrument};

/// The resources of one mesh that policies are resolved against.
#[derive(Clone, Debug, Default)]
pub struct MeshSnapshot {
    pub mesh: String,
    pub dataplanes: Vec<Dataplane>,
    pub external_services: Vec<ExternalService>,
    pub zone_ingresses: Vec<ZoneIngress>,
    pub mesh_services: Vec<MeshService>,
    pub gateways: Vec<MeshGateway>,
    pub http_routes: Vec<MeshHttpRoute>,
    pub traffic_permissions: Vec<MeshTrafficPermission>,
}

/// Resolves policies for proxies and builds reachability graphs, according to one
/// configuration.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    synthesis: SynthesisConfig,
    admission: Admission,
}

// === impl MeshSnapshot ===

impl MeshSnapshot {
    pub fn new(mesh: impl ToString) -> Self {
        Self {
            mesh: mesh.to_string(),
            ..Default::default()
        }
    }
}

// === impl Engine ===

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let synthesis = config.synthesis();
        Self {
            config,
            synthesis,
            admission: Admission::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the `MeshTrafficPermission` reachability graph of the snapshot's mesh.
    #[instrument(skip_all, fields(mesh = %snapshot.mesh, mode = %self.config.graph))]
    pub fn build_graph(&self, snapshot: &MeshSnapshot) -> Graph {
        let mesh = snapshot.mesh.as_str();
        let services = build_services(
            mesh,
            &snapshot.dataplanes,
            &snapshot.external_services,
            &snapshot.zone_ingresses,
            &self.synthesis,
        );
        let mesh_services = snapshot
            .mesh_services
            .iter()
            .filter(|ms| ms.meta.mesh == mesh)
            .cloned()
            .collect::<Vec<_>>();

        let graph: Graph = match self.config.graph {
            GraphMode::Lazy => RulesGraph::build(
                mesh,
                &services,
                &mesh_services,
                &snapshot.traffic_permissions,
                &self.synthesis,
            )
            .into(),
            GraphMode::Eager => ServicesGraph::build(
                mesh,
                &services,
                &mesh_services,
                &snapshot.traffic_permissions,
                &self.synthesis,
            )
            .into(),
        };
        debug!(services = services.len(), "Built reachability graph");
        graph
    }

    /// Resolves `policies` for `dataplane`, with gateways and routes taken from `snapshot`.
    pub fn matched_policies<C: PolicyConf>(
        &self,
        snapshot: &MeshSnapshot,
        dataplane: &Dataplane,
        policies: &[Policy<C>],
    ) -> MatchedPolicies<C> {
        matched_policies(dataplane, policies, self.match_context(snapshot))
    }

    /// Resolves the snapshot's traffic permissions for `dataplane`.
    pub fn traffic_permissions(
        &self,
        snapshot: &MeshSnapshot,
        dataplane: &Dataplane,
    ) -> MatchedPolicies<Conf> {
        self.matched_policies(snapshot, dataplane, &snapshot.traffic_permissions)
    }

    pub fn validate<C>(&self, policy: &Policy<C>) -> Result<(), ValidationError>
    where
        C: PolicyConf + Validate,
    {
        self.admission.validate(policy)
    }

    fn match_context<'s>(&self, snapshot: &'s MeshSnapshot) -> MatchContext<'s> {
        MatchContext {
            gateways: &snapshot.gateways,
            http_routes: &snapshot.http_routes,
            include_shadow: self.config.include_shadow,
        }
    }
}
