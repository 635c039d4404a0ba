use ahash::AHashMap as HashMap;
use anyhow::{bail, Result};
use mesh_policy_api::{
    Dataplane, MeshGateway, MeshHttpRoute, Policy, PolicyConf, PolicyItem, ResourceMeta,
    TargetRef, TargetRefKind,
};
use mesh_policy_core::{InboundListener, RuleItem, Rules, Subset, TypedResourceIdentifier};
use std::cmp::Ordering;
use tracing::{debug, instrument, trace, warn};

/// Resources a policy's target may refer to, besides the proxy itself.
#[derive(Copy, Clone, Debug, Default)]
pub struct MatchContext<'r> {
    pub gateways: &'r [MeshGateway],
    pub http_routes: &'r [MeshHttpRoute],
    pub include_shadow: bool,
}

/// The policies of one type that apply to a proxy, resolved into rules.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedPolicies<C> {
    /// Matched policies, in merge order.
    pub policies: Vec<TypedResourceIdentifier>,

    /// Rules for traffic received on each listener, built from `from` entries.
    ///
    /// Listeners that no policy selects have no entry; callers treat a missing listener as
    /// having empty rules.
    pub from_rules: HashMap<InboundListener, Rules<C>>,

    /// Rules for traffic sent by the proxy, built from `to` entries.
    pub to_rules: Rules<C>,

    /// Describes each policy that could not be evaluated and was skipped.
    pub warnings: Vec<String>,
}

/// The parts of a proxy a top-level target selects.
#[derive(Debug, Default)]
struct Selection {
    listeners: Vec<InboundListener>,
    delegated_gateway: bool,
}

/// A matched policy with its entries converted into rule items.
struct Matched<'p, C> {
    policy: &'p Policy<C>,
    from: Vec<RuleItem<C>>,
    to: Vec<RuleItem<C>>,
}

/// Resolves the policies in `policies` that apply to `dataplane`.
///
/// A policy that cannot be evaluated is skipped with a warning; it never fails the whole proxy.
#[instrument(
    skip(dataplane, policies, cx),
    fields(
        mesh = %dataplane.meta.mesh,
        dataplane = %dataplane.meta.name,
        kind = C::KIND,
    )
)]
pub fn matched_policies<C: PolicyConf>(
    dataplane: &Dataplane,
    policies: &[Policy<C>],
    cx: MatchContext<'_>,
) -> MatchedPolicies<C> {
    let gateway = select_gateway(dataplane, cx.gateways);

    let mut warnings = Vec::new();
    let mut matched = Vec::<Matched<'_, C>>::new();
    let mut selected = Vec::<Vec<InboundListener>>::new();
    for policy in policies {
        if policy.meta.mesh != dataplane.meta.mesh {
            continue;
        }
        if policy.meta.is_shadow() && !cx.include_shadow {
            trace!(policy = %policy.name(), "Skipping shadow policy");
            continue;
        }

        let target_ref = policy.target_ref();
        let selection = match select(&policy.meta, &target_ref, dataplane, gateway, cx) {
            Ok(selection) => selection,
            Err(error) => {
                warn!(%error, policy = %policy.name(), "Unable to resolve targetRef");
                warnings.push(format!(
                    "unable to resolve TargetRef on policy: mesh:{} name:{} error:{:?}",
                    policy.meta.mesh,
                    policy.name(),
                    error.to_string(),
                ));
                continue;
            }
        };
        if selection.listeners.is_empty() && !selection.delegated_gateway {
            trace!(policy = %policy.name(), "Policy does not select dataplane");
            continue;
        }

        let items = rule_items(policy, &policy.spec.from)
            .and_then(|from| Ok((from, rule_items(policy, &policy.spec.to)?)));
        let (from, to) = match items {
            Ok(items) => items,
            Err(error) => {
                warn!(%error, policy = %policy.name(), "Unable to build rules");
                warnings.push(format!(
                    "unable to build rules from policy: mesh:{} name:{} error:{:?}",
                    policy.meta.mesh,
                    policy.name(),
                    error.to_string(),
                ));
                continue;
            }
        };

        debug!(
            policy = %policy.name(),
            listeners = selection.listeners.len(),
            delegated = selection.delegated_gateway,
            "Policy selects dataplane",
        );
        matched.push(Matched { policy, from, to });
        selected.push(selection.listeners);
    }

    let mut by_listener = HashMap::<InboundListener, Vec<usize>>::new();
    for (i, listeners) in selected.into_iter().enumerate() {
        for listener in listeners {
            by_listener.entry(listener).or_default().push(i);
        }
    }

    let mut order = (0..matched.len()).collect::<Vec<_>>();
    order.sort_by(|a, b| compare_by_target_ref(matched[*a].policy, matched[*b].policy));

    let from_rules = by_listener
        .into_iter()
        .map(|(listener, mut idxs)| {
            idxs.sort_by(|a, b| compare_by_target_ref(matched[*a].policy, matched[*b].policy));
            let items = idxs
                .iter()
                .flat_map(|i| matched[*i].from.iter().cloned())
                .collect();
            (listener, Rules::build(items))
        })
        .collect();

    let to_rules = Rules::build(
        order
            .iter()
            .flat_map(|i| matched[*i].to.iter().cloned())
            .collect(),
    );

    MatchedPolicies {
        policies: order
            .iter()
            .map(|i| matched[*i].policy.identifier())
            .collect(),
        from_rules,
        to_rules,
        warnings,
    }
}

/// Builds the rules for traffic received on each of `dataplane`'s listeners.
pub fn bind_from_rules<C: PolicyConf>(
    dataplane: &Dataplane,
    policies: &[Policy<C>],
    cx: MatchContext<'_>,
) -> HashMap<InboundListener, Rules<C>> {
    matched_policies(dataplane, policies, cx).from_rules
}

/// Builds the rules for traffic sent by `dataplane`.
pub fn bind_to_rules<C: PolicyConf>(
    dataplane: &Dataplane,
    policies: &[Policy<C>],
    cx: MatchContext<'_>,
) -> Rules<C> {
    matched_policies(dataplane, policies, cx).to_rules
}

/// Orders policies so that, when merged in order, narrower top-level targets override broader
/// ones. Among equal targets the policy with the lexicographically smallest name comes last.
pub fn sort_by_target_ref<C>(policies: &mut [&Policy<C>]) {
    policies.sort_by(|a, b| compare_by_target_ref(a, b));
}

fn compare_by_target_ref<C>(a: &Policy<C>, b: &Policy<C>) -> Ordering {
    let (ka, kb) = (a.target_ref_kind(), b.target_ref_kind());
    ka.cmp(&kb)
        .then_with(|| {
            if ka == TargetRefKind::MeshGateway {
                let tags = |p: &Policy<C>| {
                    p.spec
                        .target_ref
                        .as_ref()
                        .map_or(0, |tr| tr.tags().count())
                };
                tags(a).cmp(&tags(b))
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.name().cmp(a.name()))
}

fn rule_items<C: PolicyConf>(
    policy: &Policy<C>,
    entries: &[PolicyItem<C>],
) -> Result<Vec<RuleItem<C>>> {
    let origin = policy.identifier();
    entries
        .iter()
        .map(|entry| {
            Ok(RuleItem {
                subset: entry.target_ref.as_subset()?,
                conf: entry.default.clone(),
                origin: origin.clone(),
            })
        })
        .collect()
}

/// Finds the builtin gateway configuration that applies to `dataplane`, if any.
fn select_gateway<'g>(
    dataplane: &Dataplane,
    gateways: &'g [MeshGateway],
) -> Option<&'g MeshGateway> {
    if !dataplane.is_builtin_gateway() {
        return None;
    }
    gateways.iter().find(|gw| gw.selects(dataplane))
}

fn select(
    meta: &ResourceMeta,
    target_ref: &TargetRef,
    dataplane: &Dataplane,
    gateway: Option<&MeshGateway>,
    cx: MatchContext<'_>,
) -> Result<Selection> {
    match target_ref.kind {
        TargetRefKind::Mesh | TargetRefKind::MeshSubset => {
            if !target_ref.supports_proxy_type(dataplane.proxy_type()) {
                return Ok(Selection::default());
            }
            Ok(select_by_subset(&target_ref.as_subset()?, dataplane, gateway))
        }

        TargetRefKind::MeshService | TargetRefKind::MeshServiceSubset => {
            Ok(select_by_subset(&target_ref.as_subset()?, dataplane, gateway))
        }

        TargetRefKind::MeshGateway => {
            let Some(gateway) = gateway else {
                return Ok(Selection::default());
            };
            if gateway.meta.name != target_ref.name() {
                return Ok(Selection::default());
            }
            let subset = target_ref.tags().collect::<Subset>();
            let selection = select_by_subset(&subset, dataplane, Some(gateway));
            Ok(Selection {
                listeners: selection.listeners,
                delegated_gateway: false,
            })
        }

        TargetRefKind::MeshHttpRoute => {
            let Some(route) = cx
                .http_routes
                .iter()
                .find(|r| r.meta.mesh == meta.mesh && r.meta.name == target_ref.name())
            else {
                bail!(
                    "couldn't resolve MeshHTTPRoute targetRef with name '{}'",
                    target_ref.name()
                );
            };
            let route_ref = route.target_ref.clone().unwrap_or_else(TargetRef::mesh);
            if route_ref.kind == TargetRefKind::MeshHttpRoute {
                bail!("MeshHTTPRoute '{}' targets another MeshHTTPRoute", route.meta.name);
            }
            select(&route.meta, &route_ref, dataplane, gateway, cx)
        }

        TargetRefKind::Dataplane => Ok(select_dataplane(target_ref, dataplane)),

        kind => bail!("unsupported targetRef kind '{kind}'"),
    }
}

fn select_by_subset(
    subset: &Subset,
    dataplane: &Dataplane,
    gateway: Option<&MeshGateway>,
) -> Selection {
    let mut listeners = dataplane
        .active_inbounds()
        .filter(|inbound| subset.satisfied_by(&inbound.tags))
        .map(|inbound| dataplane.listener(inbound))
        .collect::<Vec<_>>();

    if let Some(gateway) = gateway {
        for listener in &gateway.listeners {
            if !subset.satisfied_by(&gateway.listener_tags(dataplane, listener)) {
                continue;
            }
            let listener = InboundListener::new(&dataplane.networking.address, listener.port);
            if !listeners.contains(&listener) {
                listeners.push(listener);
            }
        }
    }

    let delegated_gateway = dataplane.is_delegated_gateway()
        && dataplane
            .networking
            .gateway
            .as_ref()
            .is_some_and(|gw| subset.satisfied_by(&gw.tags));

    Selection {
        listeners,
        delegated_gateway,
    }
}

fn select_dataplane(target_ref: &TargetRef, dataplane: &Dataplane) -> Selection {
    if let Some(name) = target_ref.name.as_deref() {
        if name != dataplane.meta.name {
            return Selection::default();
        }
    }
    if let Some(labels) = target_ref.labels.as_ref() {
        if !labels
            .iter()
            .all(|(k, v)| dataplane.meta.labels.get(k) == Some(v.as_str()))
        {
            return Selection::default();
        }
    }

    let section = target_ref.section_name.as_deref();
    Selection {
        listeners: dataplane
            .active_inbounds()
            .filter(|inbound| section.map_or(true, |s| inbound.is_section(s)))
            .map(|inbound| dataplane.listener(inbound))
            .collect(),
        delegated_gateway: false,
    }
}
