//! Access control between services.

use crate::{Policy, PolicyConf, Role, TargetRefKind};
use mesh_policy_core::Merge;
use serde::{Deserialize, Serialize};

pub type MeshTrafficPermission = Policy<Conf>;

pub const KIND: &str = "MeshTrafficPermission";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Action {
    Allow,
    Deny,
    /// Allows traffic while reporting it as if it were denied.
    AllowWithShadowDeny,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Conf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

// === impl Action ===

impl Action {
    #[inline]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow | Self::AllowWithShadowDeny)
    }
}

// === impl Conf ===

impl Conf {
    pub fn new(action: Action) -> Self {
        Self {
            action: Some(action),
        }
    }

    /// A configuration without an action never allows traffic.
    pub fn is_allowed(&self) -> bool {
        self.action.is_some_and(Action::is_allowed)
    }
}

impl Merge for Conf {
    fn merge(&mut self, other: &Self) {
        if other.action.is_some() {
            self.action = other.action;
        }
    }
}

impl PolicyConf for Conf {
    const KIND: &'static str = KIND;

    fn supported_kinds(role: Role) -> &'static [TargetRefKind] {
        match role {
            Role::TopLevel => &[
                TargetRefKind::Mesh,
                TargetRefKind::MeshSubset,
                TargetRefKind::MeshService,
                TargetRefKind::MeshServiceSubset,
                TargetRefKind::Dataplane,
            ],
            Role::From => &[
                TargetRefKind::Mesh,
                TargetRefKind::MeshSubset,
                TargetRefKind::MeshService,
                TargetRefKind::MeshServiceSubset,
            ],
            Role::To => &[],
        }
    }
}
