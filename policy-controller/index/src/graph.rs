//! `MeshTrafficPermission` reachability.
//!
//! [`RulesGraph`] keeps the rules that apply to each destination and evaluates them per query.
//! [`ServicesGraph`] evaluates every (client, destination) pair up front. Both answer the same
//! questions through [`ReachabilityGraph`].

mod backends;
mod rules;
mod services;

pub use self::{backends::build_backend_rules, rules::RulesGraph, services::ServicesGraph};
use mesh_policy_core::{Map, TypedResourceIdentifier, MESH_TAG};

pub trait ReachabilityGraph {
    /// Returns true if a client tagged `from_tags` may reach the service tagged `to_tags`.
    fn can_reach(&self, from_tags: &Map, to_tags: &Map) -> bool;

    /// Returns true if a client tagged `from_tags` may reach the backend `to`.
    fn can_reach_backend(&self, from_tags: &Map, to: &TypedResourceIdentifier) -> bool;
}

/// Either graph, as selected by configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum Graph {
    Rules(RulesGraph),
    Services(ServicesGraph),
}

// === impl Graph ===

impl ReachabilityGraph for Graph {
    fn can_reach(&self, from_tags: &Map, to_tags: &Map) -> bool {
        match self {
            Self::Rules(g) => g.can_reach(from_tags, to_tags),
            Self::Services(g) => g.can_reach(from_tags, to_tags),
        }
    }

    fn can_reach_backend(&self, from_tags: &Map, to: &TypedResourceIdentifier) -> bool {
        match self {
            Self::Rules(g) => g.can_reach_backend(from_tags, to),
            Self::Services(g) => g.can_reach_backend(from_tags, to),
        }
    }
}

impl From<RulesGraph> for Graph {
    fn from(g: RulesGraph) -> Self {
        Self::Rules(g)
    }
}

impl From<ServicesGraph> for Graph {
    fn from(g: ServicesGraph) -> Self {
        Self::Services(g)
    }
}

/// Reachability across meshes can't be determined here, so it's always allowed.
fn is_cross_mesh(mesh: &str, to_tags: &Map) -> bool {
    to_tags.get(MESH_TAG).is_some_and(|m| m != mesh)
}
