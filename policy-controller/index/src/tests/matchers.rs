use super::*;
use crate::{bind_to_rules, matched_policies, MatchContext};
use mesh_policy_api::{
    GatewayListener, GatewayType, Labels, MeshGateway, MeshHttpRoute, PolicyConf, ProxyType,
    Role, TagSelector, TargetRefKind,
};
use mesh_policy_core::{InboundListener, Merge, Subset, TypedResourceIdentifier};

const ADDRESS: &str = "10.0.0.1";

/// A minimal outbound configuration for exercising `to` entries.
#[derive(Clone, Debug, Default, PartialEq)]
struct Retries {
    attempts: Option<u32>,
    backoff_ms: Option<u32>,
}

impl Merge for Retries {
    fn merge(&mut self, other: &Self) {
        if other.attempts.is_some() {
            self.attempts = other.attempts;
        }
        if other.backoff_ms.is_some() {
            self.backoff_ms = other.backoff_ms;
        }
    }
}

impl PolicyConf for Retries {
    const KIND: &'static str = "MeshRetry";

    fn supported_kinds(role: Role) -> &'static [TargetRefKind] {
        match role {
            Role::From => &[],
            _ => &[
                TargetRefKind::Mesh,
                TargetRefKind::MeshService,
                TargetRefKind::MeshServiceSubset,
            ],
        }
    }
}

fn web_dataplane() -> Dataplane {
    mk_dataplane(
        "web-1",
        ADDRESS,
        [
            (8080, service_tags("web")),
            (9090, tags(&[(SERVICE_TAG, "admin"), ("version", "v2")])),
        ],
    )
}

fn listener(port: u32) -> InboundListener {
    InboundListener::new(ADDRESS, port)
}

fn mtp_id(name: &str) -> TypedResourceIdentifier {
    TypedResourceIdentifier::new("MeshTrafficPermission", MESH, name)
}

fn action_on(
    from_rules: &ahash::AHashMap<InboundListener, mesh_policy_core::Rules<Conf>>,
    port: u32,
    from_tags: &Map,
) -> Option<Action> {
    from_rules
        .get(&listener(port))
        .and_then(|rules| rules.compute_conf(from_tags))
        .and_then(|conf| conf.action)
}

#[test]
fn builds_rules_per_listener() {
    let _test = TestConfig::default();

    let policies = vec![
        mk_mtp("web-only", TargetRef::mesh_service("web")).with_from(TargetRef::mesh(), allow()),
        mk_mtp("everything", TargetRef::mesh()).with_from(TargetRef::mesh(), deny()),
    ];
    let matched = matched_policies(&web_dataplane(), &policies, MatchContext::default());

    assert!(matched.warnings.is_empty());
    assert_eq!(matched.from_rules.len(), 2);
    assert_eq!(
        action_on(&matched.from_rules, 8080, &Map::new()),
        Some(Action::Allow)
    );
    assert_eq!(
        action_on(&matched.from_rules, 9090, &Map::new()),
        Some(Action::Deny)
    );

    let web = matched
        .from_rules
        .get(&listener(8080))
        .and_then(|rules| rules.get(&Subset::mesh()))
        .expect("web listener must have a mesh-wide rule");
    assert_eq!(web.origin, vec![mtp_id("everything"), mtp_id("web-only")]);

    assert_eq!(
        matched.policies,
        vec![mtp_id("everything"), mtp_id("web-only")]
    );
}

#[test]
fn policies_are_merged_from_broad_to_narrow() {
    let _test = TestConfig::default();

    for (policies, expected, msg) in [
        (
            vec![
                mk_mtp("service", TargetRef::mesh_service("admin"))
                    .with_from(TargetRef::mesh(), allow()),
                mk_mtp("subset", TargetRef::mesh_subset([("version", "v2")]))
                    .with_from(TargetRef::mesh(), deny()),
                mk_mtp("mesh", TargetRef::mesh()).with_from(TargetRef::mesh(), deny()),
            ],
            Action::Allow,
            "MeshService overrides MeshSubset and Mesh",
        ),
        (
            vec![
                mk_mtp("service", TargetRef::mesh_service("admin"))
                    .with_from(TargetRef::mesh(), allow()),
                mk_mtp(
                    "service-subset",
                    TargetRef::mesh_service_subset("admin", [("version", "v2")]),
                )
                .with_from(TargetRef::mesh(), deny()),
            ],
            Action::Deny,
            "MeshServiceSubset overrides MeshService",
        ),
        (
            vec![
                mk_mtp("aaa", TargetRef::mesh()).with_from(TargetRef::mesh(), allow()),
                mk_mtp("bbb", TargetRef::mesh()).with_from(TargetRef::mesh(), deny()),
            ],
            Action::Allow,
            "the smallest name wins between equal targets",
        ),
        (
            vec![
                mk_mtp("bbb", TargetRef::mesh()).with_from(TargetRef::mesh(), deny()),
                mk_mtp("aaa", TargetRef::mesh()).with_from(TargetRef::mesh(), allow()),
            ],
            Action::Allow,
            "input order does not matter",
        ),
        (
            vec![
                mk_mtp("dataplane", TargetRef::dataplane().with_name("web-1"))
                    .with_from(TargetRef::mesh(), deny()),
                mk_mtp("service", TargetRef::mesh_service("admin"))
                    .with_from(TargetRef::mesh(), allow()),
            ],
            Action::Deny,
            "Dataplane overrides everything else",
        ),
    ] {
        let matched = matched_policies(&web_dataplane(), &policies, MatchContext::default());
        assert_eq!(
            action_on(&matched.from_rules, 9090, &Map::new()),
            Some(expected),
            "{}",
            msg
        );
    }
}

#[test]
fn entries_of_unselected_policies_are_ignored() {
    let _test = TestConfig::default();

    let policies = vec![
        mk_mtp("mesh", TargetRef::mesh()).with_from(TargetRef::mesh(), allow()),
        mk_mtp("db", TargetRef::mesh_service("db")).with_from(TargetRef::mesh(), deny()),
        mk_mtp("v1", TargetRef::mesh_subset([("version", "v1")]))
            .with_from(TargetRef::mesh(), deny()),
    ];
    let matched = matched_policies(&web_dataplane(), &policies, MatchContext::default());

    assert_eq!(matched.policies, vec![mtp_id("mesh")]);
    for port in [8080, 9090] {
        assert_eq!(
            action_on(&matched.from_rules, port, &Map::new()),
            Some(Action::Allow)
        );
    }
}

#[test]
fn from_entries_are_resolved_by_client_tags() {
    let _test = TestConfig::default();

    let policies = vec![mk_mtp("web", TargetRef::mesh_service("web"))
        .with_from(TargetRef::mesh(), deny())
        .with_from(TargetRef::mesh_service("frontend"), allow())
        .with_from(
            TargetRef::mesh_service_subset("frontend", [("version", "canary")]),
            shadow_deny(),
        )];
    let matched = matched_policies(&web_dataplane(), &policies, MatchContext::default());

    for (client, expected) in [
        (service_tags("backend"), Action::Deny),
        (service_tags("frontend"), Action::Allow),
        (
            tags(&[(SERVICE_TAG, "frontend"), ("version", "canary")]),
            Action::AllowWithShadowDeny,
        ),
    ] {
        assert_eq!(
            action_on(&matched.from_rules, 8080, &client),
            Some(expected),
            "{:?}",
            client
        );
    }
    assert!(!matched.from_rules.contains_key(&listener(9090)));
}

#[test]
fn ignored_inbounds_are_not_selected() {
    let _test = TestConfig::default();

    let dataplane = web_dataplane().with_inbound(
        Inbound::new(7070, service_tags("metrics"))
            .with_state(mesh_policy_api::InboundState::Ignored),
    );
    let policies = vec![mk_mtp("mesh", TargetRef::mesh()).with_from(TargetRef::mesh(), allow())];
    let matched = matched_policies(&dataplane, &policies, MatchContext::default());

    assert!(matched.from_rules.contains_key(&listener(8080)));
    assert!(matched.from_rules.contains_key(&listener(9090)));
    assert!(!matched.from_rules.contains_key(&listener(7070)));
}

#[test]
fn dataplane_targets() {
    let _test = TestConfig::default();

    let dataplane = Dataplane {
        meta: ResourceMeta::new(MESH, "web-1")
            .with_labels([("team", "payments")].into_iter().collect::<Labels>()),
        ..web_dataplane()
    };
    let dataplane = Dataplane {
        networking: mesh_policy_api::Networking {
            inbound: vec![
                Inbound::new(8080, service_tags("web")).with_name("http"),
                Inbound::new(9090, service_tags("admin")),
            ],
            ..dataplane.networking.clone()
        },
        ..dataplane
    };

    for (target_ref, expected, msg) in [
        (TargetRef::dataplane(), vec![8080, 9090], "all dataplanes"),
        (
            TargetRef::dataplane().with_name("web-1"),
            vec![8080, 9090],
            "by name",
        ),
        (TargetRef::dataplane().with_name("web-2"), vec![], "other name"),
        (
            TargetRef::dataplane().with_labels([("team", "payments")]),
            vec![8080, 9090],
            "by labels",
        ),
        (
            TargetRef::dataplane().with_labels([("team", "billing")]),
            vec![],
            "other labels",
        ),
        (
            TargetRef::dataplane()
                .with_name("web-1")
                .with_section_name("http"),
            vec![8080],
            "section by inbound name",
        ),
        (
            TargetRef::dataplane()
                .with_name("web-1")
                .with_section_name("9090"),
            vec![9090],
            "section by port",
        ),
        (
            TargetRef::dataplane().with_section_name("grpc"),
            vec![],
            "unknown section",
        ),
    ] {
        let policies = vec![mk_mtp("dp", target_ref).with_from(TargetRef::mesh(), allow())];
        let matched = matched_policies(&dataplane, &policies, MatchContext::default());

        let mut ports = matched
            .from_rules
            .keys()
            .map(|l| l.port)
            .collect::<Vec<_>>();
        ports.sort_unstable();
        assert_eq!(ports, expected, "{}", msg);
    }
}

#[test]
fn proxy_types_restrict_mesh_targets() {
    let _test = TestConfig::default();

    let gateway_only = vec![mk_mtp(
        "gateways",
        TargetRef::mesh().with_proxy_types([ProxyType::Gateway]),
    )
    .with_from(TargetRef::mesh(), allow())];

    let sidecar = matched_policies(&web_dataplane(), &gateway_only, MatchContext::default());
    assert!(sidecar.policies.is_empty());
    assert!(sidecar.from_rules.is_empty());

    let delegated = Dataplane::new(ResourceMeta::new(MESH, "edge-1"), "10.0.0.2")
        .with_gateway(GatewayType::Delegated, [(SERVICE_TAG, "edge")]);
    let matched = matched_policies(&delegated, &gateway_only, MatchContext::default());
    assert_eq!(matched.policies, vec![mtp_id("gateways")]);
    assert!(matched.from_rules.is_empty());

    let sidecars_only = vec![mk_mtp(
        "sidecars",
        TargetRef::mesh().with_proxy_types([ProxyType::Sidecar]),
    )
    .with_from(TargetRef::mesh(), allow())];
    let matched = matched_policies(&web_dataplane(), &sidecars_only, MatchContext::default());
    assert_eq!(matched.policies, vec![mtp_id("sidecars")]);
    assert_eq!(matched.from_rules.len(), 2);
}

#[test]
fn builtin_gateway_listeners() {
    let _test = TestConfig::default();

    let dataplane = Dataplane::new(ResourceMeta::new(MESH, "edge-1"), "10.0.0.2")
        .with_gateway(GatewayType::Builtin, [(SERVICE_TAG, "edge")]);
    let gateways = vec![MeshGateway {
        meta: ResourceMeta::new(MESH, "edge"),
        selectors: vec![TagSelector::from_iter([(SERVICE_TAG, "edge")])],
        tags: Map::new(),
        listeners: vec![
            GatewayListener {
                port: 80,
                tags: tags(&[("port", "http")]),
            },
            GatewayListener {
                port: 443,
                tags: tags(&[("port", "https")]),
            },
        ],
    }];
    let cx = MatchContext {
        gateways: &gateways,
        ..MatchContext::default()
    };

    for (target_ref, expected, msg) in [
        (TargetRef::mesh(), vec![80, 443], "mesh selects every listener"),
        (
            TargetRef::mesh_service("edge"),
            vec![80, 443],
            "service selects every listener",
        ),
        (
            TargetRef::mesh_gateway("edge"),
            vec![80, 443],
            "gateway selects every listener",
        ),
        (
            TargetRef::mesh_gateway("edge").with_tags([("port", "https")]),
            vec![443],
            "gateway tags select listeners",
        ),
        (
            TargetRef::mesh_subset([("port", "http")]),
            vec![80],
            "subsets match listener tags",
        ),
        (TargetRef::mesh_gateway("other"), vec![], "other gateway"),
    ] {
        let policies = vec![mk_mtp("gw", target_ref).with_from(TargetRef::mesh(), allow())];
        let matched = matched_policies(&dataplane, &policies, cx);

        let mut ports = matched
            .from_rules
            .keys()
            .map(|l| {
                assert_eq!(l.address, "10.0.0.2");
                l.port
            })
            .collect::<Vec<_>>();
        ports.sort_unstable();
        assert_eq!(ports, expected, "{}", msg);
    }
}

#[test]
fn http_route_targets_resolve_through_the_route() {
    let _test = TestConfig::default();

    let routes = vec![
        MeshHttpRoute {
            meta: ResourceMeta::new(MESH, "to-web"),
            target_ref: Some(TargetRef::mesh_service("web")),
        },
        MeshHttpRoute {
            meta: ResourceMeta::new(MESH, "loop"),
            target_ref: Some(TargetRef::mesh_http_route("to-web")),
        },
    ];
    let cx = MatchContext {
        http_routes: &routes,
        ..MatchContext::default()
    };

    let policies = vec![
        mk_mtp("via-route", TargetRef::mesh_http_route("to-web"))
            .with_from(TargetRef::mesh(), allow()),
        mk_mtp("missing", TargetRef::mesh_http_route("unknown"))
            .with_from(TargetRef::mesh(), allow()),
        mk_mtp("nested", TargetRef::mesh_http_route("loop")).with_from(TargetRef::mesh(), allow()),
    ];
    let matched = matched_policies(&web_dataplane(), &policies, cx);

    assert_eq!(matched.policies, vec![mtp_id("via-route")]);
    assert_eq!(
        action_on(&matched.from_rules, 8080, &Map::new()),
        Some(Action::Allow)
    );
    assert!(!matched.from_rules.contains_key(&listener(9090)));

    assert_eq!(matched.warnings.len(), 2, "{:?}", matched.warnings);
    assert!(matched.warnings[0].starts_with(
        "unable to resolve TargetRef on policy: mesh:default name:missing error:"
    ));
    assert!(matched.warnings[0].contains("unknown"));
    assert!(matched.warnings[1].contains("name:nested"));
}

#[test]
fn unresolvable_policies_are_skipped() {
    let _test = TestConfig::default();

    let policies = vec![
        mk_mtp("mesh", TargetRef::mesh()).with_from(TargetRef::mesh(), deny()),
        mk_mtp("bad-target", TargetRef::new(TargetRefKind::MeshExternalService))
            .with_from(TargetRef::mesh(), allow()),
        mk_mtp("bad-entry", TargetRef::mesh())
            .with_from(TargetRef::mesh(), allow())
            .with_from(TargetRef::mesh_gateway("edge"), allow()),
    ];
    let matched = matched_policies(&web_dataplane(), &policies, MatchContext::default());

    assert_eq!(matched.policies, vec![mtp_id("mesh")]);
    assert_eq!(
        action_on(&matched.from_rules, 8080, &Map::new()),
        Some(Action::Deny)
    );
    assert_eq!(
        matched.warnings,
        vec![
            "unable to resolve TargetRef on policy: mesh:default name:bad-target \
             error:\"unsupported targetRef kind 'MeshExternalService'\""
                .to_string(),
            "unable to build rules from policy: mesh:default name:bad-entry \
             error:\"unsupported targetRef kind 'MeshGateway'\""
                .to_string(),
        ]
    );
}

#[test]
fn shadow_and_foreign_policies() {
    let _test = TestConfig::default();

    let shadow = Policy {
        meta: ResourceMeta::new(MESH, "shadow").with_labels(
            [(mesh_policy_core::EFFECT_LABEL, "shadow")]
                .into_iter()
                .collect::<Labels>(),
        ),
        ..mk_mtp("shadow", TargetRef::mesh()).with_from(TargetRef::mesh(), allow())
    };
    let foreign = Policy {
        meta: ResourceMeta::new("other", "foreign"),
        ..mk_mtp("foreign", TargetRef::mesh()).with_from(TargetRef::mesh(), allow())
    };
    let policies = vec![shadow, foreign];

    let matched = matched_policies(&web_dataplane(), &policies, MatchContext::default());
    assert!(matched.policies.is_empty());
    assert!(matched.from_rules.is_empty());

    let cx = MatchContext {
        include_shadow: true,
        ..MatchContext::default()
    };
    let matched = matched_policies(&web_dataplane(), &policies, cx);
    assert_eq!(matched.policies, vec![mtp_id("shadow")]);
    assert_eq!(
        action_on(&matched.from_rules, 8080, &Map::new()),
        Some(Action::Allow)
    );
}

#[test]
fn to_rules_merge_destination_entries() {
    let _test = TestConfig::default();

    let retries = |attempts, backoff_ms| Retries {
        attempts,
        backoff_ms,
    };
    let policies = vec![
        Policy::new(ResourceMeta::new(MESH, "api"), TargetRef::mesh_service("web"))
            .with_to(TargetRef::mesh_service("api"), retries(None, Some(50))),
        Policy::new(ResourceMeta::new(MESH, "defaults"), TargetRef::mesh())
            .with_to(TargetRef::mesh(), retries(Some(3), Some(10))),
        Policy::new(ResourceMeta::new(MESH, "db"), TargetRef::mesh_service("db"))
            .with_to(TargetRef::mesh(), retries(Some(9), None)),
    ];

    let rules = bind_to_rules(&web_dataplane(), &policies, MatchContext::default());
    assert_eq!(rules.len(), 2);
    assert_eq!(
        rules.compute_conf(&service_tags("api")),
        Some(&retries(Some(3), Some(50)))
    );
    assert_eq!(
        rules.compute_conf(&service_tags("db")),
        Some(&retries(Some(3), Some(10)))
    );

    let api = rules
        .compute(&service_tags("api"))
        .expect("api must have a rule");
    assert_eq!(
        api.origin,
        vec![
            TypedResourceIdentifier::new("MeshRetry", MESH, "defaults"),
            TypedResourceIdentifier::new("MeshRetry", MESH, "api"),
        ]
    );
}
