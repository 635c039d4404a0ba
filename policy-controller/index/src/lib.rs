//! Mesh Policy Index
//!
//! Binds policies to the proxies they select and derives reachability between services:
//!
//! - The [`matchers`] bind a policy type to one proxy. Every policy whose top-level target selects
//!   a listener of the proxy contributes its `from` entries to that listener's rules, and its `to`
//!   entries to the proxy's outbound rules.
//! - The [`synthesize`] module builds one representative proxy per service (or `MeshService`
//!   backend) so that policies are evaluated once per service rather than once per instance.
//!   Policies are trimmed of constraints a representative proxy cannot answer for.
//! - The [`graph`] module builds `MeshTrafficPermission` reachability from the per-service rules,
//!   either lazily (rules are kept and evaluated per query) or eagerly (every pair is evaluated
//!   up front).
//!
//! ```text
//! [ Policy ] -> [ Synthetic proxy ] -> [ Rules per listener ] -> [ Graph ]
//! ```
//!
//! Every build is a pure function of a snapshot. Inputs are never modified.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod graph;
pub mod matchers;
pub mod synthesize;


pub use self::{
    graph::{Graph, ReachabilityGraph, RulesGraph, ServicesGraph},
    matchers::{bind_from_rules, bind_to_rules, matched_policies, MatchContext, MatchedPolicies},
    synthesize::{build_services, SynthesisConfig},
};
