use crate::{ResourceMeta, TargetRef, TargetRefKind};
use mesh_policy_core::{Merge, TypedResourceIdentifier};
use serde::{Deserialize, Serialize};

/// A policy of any type: a top-level target plus `from` and `to` entries carrying `C`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Policy<C> {
    pub meta: ResourceMeta,
    pub spec: PolicySpec<C>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec<C> {
    /// Defaults to the whole mesh when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<TargetRef>,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<PolicyItem<C>>,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<PolicyItem<C>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyItem<C> {
    pub target_ref: TargetRef,
    pub default: C,
}

/// Where a target reference appears within a policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    TopLevel,
    From,
    To,
}

/// Implemented by the configuration type of each policy type.
pub trait PolicyConf: Merge + std::fmt::Debug {
    /// The resource type name, e.g. `MeshTrafficPermission`.
    const KIND: &'static str;

    /// Target reference kinds accepted in `role`. An empty list means the policy type does not
    /// support entries in that role.
    fn supported_kinds(role: Role) -> &'static [TargetRefKind];
}

// === impl Policy ===

impl<C> Policy<C> {
    pub fn new(meta: ResourceMeta, target_ref: TargetRef) -> Self {
        Self {
            meta,
            spec: PolicySpec {
                target_ref: Some(target_ref),
                from: Vec::new(),
                to: Vec::new(),
            },
        }
    }

    pub fn with_from(mut self, target_ref: TargetRef, default: C) -> Self {
        self.spec.from.push(PolicyItem {
            target_ref,
            default,
        });
        self
    }

    pub fn with_to(mut self, target_ref: TargetRef, default: C) -> Self {
        self.spec.to.push(PolicyItem {
            target_ref,
            default,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn target_ref(&self) -> TargetRef {
        self.spec.target_ref.clone().unwrap_or_else(TargetRef::mesh)
    }

    pub fn target_ref_kind(&self) -> TargetRefKind {
        self.spec
            .target_ref
            .as_ref()
            .map_or(TargetRefKind::Mesh, |tr| tr.kind)
    }
}

impl<C: PolicyConf> Policy<C> {
    pub fn identifier(&self) -> TypedResourceIdentifier {
        self.meta.identifier(C::KIND)
    }
}
