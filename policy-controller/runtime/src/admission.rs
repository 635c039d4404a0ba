use crate::validation::{validate_target_ref, ValidationError};
use mesh_policy_api::{
    traffic_permission::Conf as TrafficPermissionConf, Policy, PolicyConf, PolicyItem, Role,
    TargetRefKind,
};
use tracing::{debug, info, instrument};

/// Checks policies before they are accepted into a mesh.
#[derive(Clone, Debug, Default)]
pub struct Admission {}

/// Checks specific to one policy type's configuration.
pub trait Validate {
    /// Records problems with the configuration found at `field`.
    fn validate(&self, _field: &str, _errors: &mut ValidationError) {}
}

// === impl Admission ===

impl Admission {
    pub fn new() -> Self {
        Self {}
    }

    /// Validates every target reference in `policy` against the kinds its type accepts in each
    /// role, and each entry's configuration. All violations are reported together.
    #[instrument(skip_all, fields(kind = C::KIND, mesh = %policy.meta.mesh, name = %policy.name()))]
    pub fn validate<C>(&self, policy: &Policy<C>) -> Result<(), ValidationError>
    where
        C: PolicyConf + Validate,
    {
        let mut errors = ValidationError::default();

        if let Some(target_ref) = policy.spec.target_ref.as_ref() {
            validate_target_ref(
                "spec.targetRef",
                target_ref,
                C::supported_kinds(Role::TopLevel),
                &mut errors,
            );
        }

        let from = C::supported_kinds(Role::From);
        let to = C::supported_kinds(Role::To);
        match (from.is_empty(), to.is_empty()) {
            (false, false) if policy.spec.from.is_empty() && policy.spec.to.is_empty() => {
                errors.add("spec", "at least one of 'from', 'to' has to be defined");
            }
            (false, true) if policy.spec.from.is_empty() => {
                errors.add("spec.from", "needs at least one item");
            }
            (true, false) if policy.spec.to.is_empty() => {
                errors.add("spec.to", "needs at least one item");
            }
            _ => {}
        }

        validate_items("spec.from", &policy.spec.from, from, &mut errors);
        validate_items("spec.to", &policy.spec.to, to, &mut errors);

        if let Err(error) = errors.into_result() {
            info!(%error, "Denied");
            return Err(error);
        }
        debug!("Admitted");
        Ok(())
    }
}

fn validate_items<C: Validate>(
    field: &str,
    items: &[PolicyItem<C>],
    supported: &[TargetRefKind],
    errors: &mut ValidationError,
) {
    if supported.is_empty() {
        if !items.is_empty() {
            errors.add(field, "must not be defined");
        }
        return;
    }

    for (i, item) in items.iter().enumerate() {
        validate_target_ref(
            &format!("{field}[{i}].targetRef"),
            &item.target_ref,
            supported,
            errors,
        );
        item.default.validate(&format!("{field}[{i}].default"), errors);
    }
}

impl Validate for TrafficPermissionConf {
    fn validate(&self, field: &str, errors: &mut ValidationError) {
        if self.action.is_none() {
            errors.add(format!("{field}.action"), "must be defined");
        }
    }
}
