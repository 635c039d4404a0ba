use mesh_policy_api::{TargetRef, TargetRefKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

const TAG_CHARS_REGEX: &str = r"^[a-zA-Z0-9.\-_:/]*$";

static TAG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(TAG_CHARS_REGEX).expect("tag regex must compile"));

/// One problem with one field of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// Every problem found while validating a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Error)]
#[error("{}", display_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

// === impl Violation ===

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// === impl ValidationError ===

impl ValidationError {
    pub fn add(&mut self, field: impl ToString, message: impl ToString) {
        self.violations.push(Violation {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn display_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates `target_ref`, found at `field`, against the kinds a policy type accepts there.
///
/// An unsupported kind is reported alone; the remaining checks only apply to supported kinds.
pub fn validate_target_ref(
    field: &str,
    target_ref: &TargetRef,
    supported: &[TargetRefKind],
    errors: &mut ValidationError,
) {
    let kind = target_ref.kind;
    if !supported.contains(&kind) {
        errors.add(format!("{field}.kind"), "value is not supported");
        return;
    }

    let name_is_empty = target_ref.name.as_deref().map_or(true, str::is_empty);
    let not_allowed = |errors: &mut ValidationError, key: &str| {
        errors.add(format!("{field}.{key}"), format!("could not be set with kind {kind}"));
    };

    match kind {
        TargetRefKind::Mesh => {
            if target_ref.name.is_some() {
                errors.add(format!("{field}.name"), "must not be set");
            }
            if target_ref.tags.is_some() {
                not_allowed(errors, "tags");
            }
            if target_ref.mesh.is_some() {
                not_allowed(errors, "mesh");
            }
        }

        TargetRefKind::MeshSubset => {
            if target_ref.name.is_some() {
                errors.add(format!("{field}.name"), "must not be set");
            }
            if target_ref.mesh.is_some() {
                not_allowed(errors, "mesh");
            }
            validate_tags(field, target_ref, errors);
        }

        TargetRefKind::MeshService => {
            if target_ref.tags.is_some() {
                not_allowed(errors, "tags");
            }
            if name_is_empty {
                errors.add(format!("{field}.name"), "cannot be empty");
            }
        }

        TargetRefKind::MeshServiceSubset => {
            if name_is_empty {
                errors.add(format!("{field}.name"), "cannot be empty");
            }
            validate_tags(field, target_ref, errors);
        }

        TargetRefKind::MeshGateway | TargetRefKind::MeshHttpRoute => {
            if name_is_empty {
                errors.add(format!("{field}.name"), "cannot be empty");
            }
            if target_ref.mesh.is_some() {
                not_allowed(errors, "mesh");
            }
            if target_ref.tags.is_some() {
                validate_tags(field, target_ref, errors);
            }
        }

        TargetRefKind::Dataplane => {
            if target_ref.tags.is_some() {
                not_allowed(errors, "tags");
            }
            if target_ref.mesh.is_some() {
                not_allowed(errors, "mesh");
            }
            if target_ref.name.is_some() && name_is_empty {
                errors.add(format!("{field}.name"), "cannot be empty");
            }
        }

        TargetRefKind::MeshExternalService | TargetRefKind::MeshMultiZoneService => {
            if name_is_empty {
                errors.add(format!("{field}.name"), "cannot be empty");
            }
            if target_ref.tags.is_some() {
                not_allowed(errors, "tags");
            }
        }
    }

    if target_ref.proxy_types.is_some()
        && !matches!(kind, TargetRefKind::Mesh | TargetRefKind::MeshSubset)
    {
        not_allowed(errors, "proxyTypes");
    }
    if target_ref.section_name.is_some() && kind != TargetRefKind::Dataplane {
        not_allowed(errors, "sectionName");
    }
    if target_ref.labels.is_some() && kind != TargetRefKind::Dataplane {
        not_allowed(errors, "labels");
    }
}

/// Subset kinds need at least one tag, and every tag must use the tag character set.
fn validate_tags(field: &str, target_ref: &TargetRef, errors: &mut ValidationError) {
    let tags = match target_ref.tags.as_ref() {
        Some(tags) if !tags.is_empty() => tags,
        _ => {
            if target_ref.kind.is_subset() {
                errors.add(format!("{field}.tags"), "must be set and non-empty");
            }
            return;
        }
    };

    for (key, value) in tags {
        let path = format!("{field}.tags[{key:?}]");
        if key.is_empty() {
            errors.add(&path, "tag name must be non-empty");
        } else if !TAG_CHARS.is_match(key) {
            errors.add(
                &path,
                format!("tag name must match the regex: {TAG_CHARS_REGEX}"),
            );
        }
        if value.is_empty() {
            errors.add(&path, "tag value must be non-empty");
        } else if !TAG_CHARS.is_match(value) {
            errors.add(
                &path,
                format!("tag value must match the regex: {TAG_CHARS_REGEX}"),
            );
        }
    }
}
