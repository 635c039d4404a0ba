//! Policy resolution primitives.
//!
//! A policy scopes itself with tag constraints. Constraints are normalized into a [`Subset`], and
//! every (subset, configuration) pair contributed by the policies that apply to a proxy is folded
//! into an ordered [`Rules`] collection. [`Rules::compute`] then answers which configuration
//! applies to a concrete set of tags.
//!
//! This crate knows nothing about resource shapes; see `mesh-policy-api` for those.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod identifier;
pub mod rules;
mod subset;

pub use self::{
    identifier::{InboundListener, TypedResourceIdentifier},
    rules::{Merge, Rule, RuleItem, Rules},
    subset::{Map, Subset},
};

/// Identifies the logical service a proxy inbound belongs to.
pub const SERVICE_TAG: &str = "kuma.io/service";

/// Marks a destination that lives in another mesh.
pub const MESH_TAG: &str = "kuma.io/mesh";

pub const ZONE_TAG: &str = "kuma.io/zone";

pub const KUBE_NAMESPACE_TAG: &str = "k8s.kuma.io/namespace";
pub const KUBE_SERVICE_TAG: &str = "k8s.kuma.io/service-name";
pub const KUBE_PORT_TAG: &str = "k8s.kuma.io/service-port";

pub const RESOURCE_ORIGIN_LABEL: &str = "kuma.io/origin";

/// Label value `shadow` excludes a policy from matching unless shadow policies are requested.
pub const EFFECT_LABEL: &str = "kuma.io/effect";

/// A tag value that accepts any value, including a missing key.
pub const WILDCARD: &str = "*";
