//! Resource shapes consumed by the policy resolver.
//!
//! Every policy type shares the [`Policy`] shape: a top-level [`TargetRef`] selecting the proxies
//! the policy applies to, plus `from` and `to` entries carrying a policy-specific configuration.
//! Topology resources ([`Dataplane`], [`MeshService`], [`ExternalService`], [`ZoneIngress`],
//! [`MeshGateway`]) describe the proxies and services those policies are evaluated against.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod dataplane;
mod gateway;
pub mod labels;
mod meta;
pub mod policy;
mod service;
pub mod target_ref;
pub mod traffic_permission;

pub use self::{
    dataplane::{Dataplane, GatewayType, Inbound, InboundState, Networking, ProxyGateway},
    gateway::{GatewayListener, MeshGateway, MeshHttpRoute},
    labels::{Labels, TagSelector},
    meta::ResourceMeta,
    policy::{Policy, PolicyConf, PolicyItem, PolicySpec, Role},
    service::{
        AvailableService, ExternalService, MeshService, MeshServiceSelector, ZoneIngress,
        MESH_SERVICE_KIND,
    },
    target_ref::{ProxyType, TargetRef, TargetRefKind},
    traffic_permission::MeshTrafficPermission,
};
pub use mesh_policy_core::Map;
