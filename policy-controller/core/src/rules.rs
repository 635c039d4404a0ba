use crate::{Map, Subset, TypedResourceIdentifier};
use ahash::AHashSet as HashSet;
use tracing::trace;

/// Folds configuration contributed by several policy entries into one.
///
/// Implemented by each policy type's configuration; the resolver never inspects a configuration
/// beyond calling this.
pub trait Merge: Clone {
    /// Merges `other` into `self`. Values set in `other` take precedence.
    fn merge(&mut self, other: &Self);
}

/// One entry contributed by a policy, before resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleItem<C> {
    pub subset: Subset,
    pub conf: C,
    pub origin: TypedResourceIdentifier,
}

/// The configuration that applies to every tag map satisfying `subset`.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule<C> {
    pub subset: Subset,
    pub conf: C,

    /// The policies that contributed to `conf`, in merge order.
    pub origin: Vec<TypedResourceIdentifier>,
}

/// Rules ordered from most to least specific.
#[derive(Clone, Debug, PartialEq)]
pub struct Rules<C>(Vec<Rule<C>>);

// === impl Rules ===

impl<C> Default for Rules<C> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<C: Merge> Rules<C> {
    /// Builds rules from entries listed in priority order: when several entries apply to the same
    /// tags, later entries override earlier ones.
    ///
    /// Each distinct subset, and each union of compatible subsets, gets a rule whose configuration
    /// merges every entry that applies to it. The first rule matched by [`Rules::compute`] is
    /// therefore the merge of all entries satisfied by the given tags.
    pub fn build(items: Vec<RuleItem<C>>) -> Self {
        if items.is_empty() {
            return Self::default();
        }

        let mut subsets = Vec::<Subset>::new();
        let mut seen = HashSet::<Subset>::new();
        for item in &items {
            if seen.insert(item.subset.clone()) {
                subsets.push(item.subset.clone());
            }
        }

        // Close the set under union. Every pair is visited once: each subset is combined with
        // all subsets that precede it, including unions appended along the way.
        let mut i = 0;
        while i < subsets.len() {
            for j in 0..i {
                if subsets[i].is_compatible(&subsets[j]) {
                    let union = subsets[i].union(&subsets[j]);
                    if seen.insert(union.clone()) {
                        subsets.push(union);
                    }
                }
            }
            i += 1;
        }

        let mut rules = subsets
            .into_iter()
            .filter_map(|subset| {
                let mut applicable = items.iter().filter(|item| item.subset.includes(&subset));
                let first = applicable.next()?;
                let mut conf = first.conf.clone();
                let mut origin = vec![first.origin.clone()];
                for item in applicable {
                    conf.merge(&item.conf);
                    if !origin.contains(&item.origin) {
                        origin.push(item.origin.clone());
                    }
                }
                trace!(%subset, origins = origin.len(), "Built rule");
                Some(Rule {
                    subset,
                    conf,
                    origin,
                })
            })
            .collect::<Vec<_>>();

        // Stable, so equally specific rules keep their construction order.
        rules.sort_by(|a, b| b.subset.specificity().cmp(&a.subset.specificity()));

        Self(rules)
    }
}

impl<C> Rules<C> {
    /// Returns the most specific rule satisfied by `tags`, if any.
    pub fn compute(&self, tags: &Map) -> Option<&Rule<C>> {
        self.0.iter().find(|rule| rule.subset.satisfied_by(tags))
    }

    pub fn compute_conf(&self, tags: &Map) -> Option<&C> {
        self.compute(tags).map(|rule| &rule.conf)
    }

    /// Returns the rule whose subset is exactly `subset`, if any.
    pub fn get(&self, subset: &Subset) -> Option<&Rule<C>> {
        self.0.iter().find(|rule| rule.subset == *subset)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule<C>> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'r, C> IntoIterator for &'r Rules<C> {
    type Item = &'r Rule<C>;
    type IntoIter = std::slice::Iter<'r, Rule<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SERVICE_TAG;
    use maplit::btreemap;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Timeouts {
        idle: Option<u32>,
        request: Option<u32>,
    }

    impl Merge for Timeouts {
        fn merge(&mut self, other: &Self) {
            if other.idle.is_some() {
                self.idle = other.idle;
            }
            if other.request.is_some() {
                self.request = other.request;
            }
        }
    }

    fn item(
        subset: Subset,
        idle: Option<u32>,
        request: Option<u32>,
        name: &str,
    ) -> RuleItem<Timeouts> {
        RuleItem {
            subset,
            conf: Timeouts { idle, request },
            origin: TypedResourceIdentifier::new("MeshTimeout", "default", name),
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty() {
        let rules = Rules::<Timeouts>::build(vec![]);
        assert!(rules.is_empty());
        assert_eq!(rules.compute(&Map::new()), None);
    }

    #[test]
    fn most_specific_rule_wins() {
        let rules = Rules::build(vec![
            item(Subset::mesh(), Some(1), None, "mesh"),
            item(Subset::service("web"), Some(2), None, "web"),
        ]);

        let web = rules.compute(&tags(&[(SERVICE_TAG, "web")])).unwrap();
        assert_eq!(web.conf.idle, Some(2));
        assert_eq!(web.subset, Subset::service("web"));

        let api = rules.compute(&tags(&[(SERVICE_TAG, "api")])).unwrap();
        assert_eq!(api.conf.idle, Some(1));
        assert!(api.subset.is_mesh());
    }

    #[test]
    fn applicable_entries_are_merged_in_order() {
        let rules = Rules::build(vec![
            item(Subset::mesh(), Some(1), Some(10), "mesh"),
            item(Subset::service("web"), Some(2), None, "web"),
        ]);

        let rule = rules.compute(&tags(&[(SERVICE_TAG, "web")])).unwrap();
        assert_eq!(
            rule.conf,
            Timeouts {
                idle: Some(2),
                request: Some(10),
            }
        );
        assert_eq!(
            rule.origin.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            vec!["mesh", "web"]
        );
    }

    #[test]
    fn later_entries_override_earlier_ones() {
        let rules = Rules::build(vec![
            item(Subset::service("web"), Some(1), None, "b"),
            item(Subset::service("web"), Some(2), None, "a"),
        ]);
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules.compute_conf(&tags(&[(SERVICE_TAG, "web")])).unwrap().idle,
            Some(2)
        );
    }

    #[test]
    fn intersecting_subsets_are_combined() {
        let zone: Subset = [("zone", "east")].into_iter().collect();
        let version: Subset = [("version", "v1")].into_iter().collect();
        let rules = Rules::build(vec![
            item(zone, Some(1), None, "zone"),
            item(version, None, Some(5), "version"),
        ]);

        // {zone, version}, {zone}, {version}
        assert_eq!(rules.len(), 3);

        let both = rules
            .compute(&tags(&[("zone", "east"), ("version", "v1")]))
            .unwrap();
        assert_eq!(
            both.conf,
            Timeouts {
                idle: Some(1),
                request: Some(5),
            }
        );

        let only_zone = rules.compute(&tags(&[("zone", "east")])).unwrap();
        assert_eq!(only_zone.conf.request, None);

        assert!(rules.compute(&tags(&[("zone", "west")])).is_none());
    }

    #[test]
    fn conflicting_subsets_are_not_combined() {
        let v1: Subset = [("version", "v1")].into_iter().collect();
        let v2: Subset = [("version", "v2")].into_iter().collect();
        let rules = Rules::build(vec![
            item(v1, Some(1), None, "v1"),
            item(v2, Some(2), None, "v2"),
        ]);
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn service_outranks_tag_count() {
        let rules = Rules::build(vec![
            item(
                btreemap! { "zone" => "east", "version" => "v1" }
                    .into_iter()
                    .collect(),
                Some(1),
                None,
                "tags",
            ),
            item(Subset::service("web"), Some(2), None, "web"),
        ]);

        let first = rules.iter().next().unwrap();
        assert!(first.subset.get(SERVICE_TAG).is_some());
    }

    #[test]
    fn compute_is_deterministic() {
        let build = || {
            Rules::build(vec![
                item([("a", "1")].into_iter().collect(), Some(1), None, "a"),
                item([("b", "1")].into_iter().collect(), Some(2), None, "b"),
                item([("c", "1")].into_iter().collect(), Some(3), None, "c"),
            ])
        };
        let rules = build();
        assert_eq!(rules, build());

        let t = tags(&[("a", "1"), ("c", "1")]);
        let expected = rules.compute(&t).cloned();
        for _ in 0..10 {
            assert_eq!(rules.compute(&t).cloned(), expected);
        }
        assert_eq!(expected.unwrap().conf.idle, Some(3));
    }
}
