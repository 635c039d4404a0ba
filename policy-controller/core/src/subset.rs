use crate::{SERVICE_TAG, WILDCARD};
use std::{collections::BTreeMap, fmt};

pub type Map = BTreeMap<String, String>;

/// A conjunction of `key = value` constraints over proxy tags.
///
/// The empty subset is mesh-wide: every tag map satisfies it. Wildcard values are dropped on
/// construction since they never constrain a match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subset(Map);

// === impl Subset ===

impl Subset {
    /// The mesh-wide subset.
    pub fn mesh() -> Self {
        Self::default()
    }

    pub fn service(name: impl ToString) -> Self {
        Some((SERVICE_TAG.to_string(), name.to_string()))
            .into_iter()
            .collect()
    }

    #[inline]
    pub fn is_mesh(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if every constraint has its key present in `tags` with an equal value.
    pub fn satisfied_by(&self, tags: &Map) -> bool {
        self.0.iter().all(|(k, v)| tags.get(k) == Some(v))
    }

    /// Returns true if every tag map satisfying `other` also satisfies `self`, i.e. `self`
    /// is at most as narrow as `other`.
    pub fn includes(&self, other: &Subset) -> bool {
        self.0.iter().all(|(k, v)| other.0.get(k) == Some(v))
    }

    /// Returns true if some tag map can satisfy both subsets.
    pub fn is_compatible(&self, other: &Subset) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).map_or(true, |ov| ov == v))
    }

    /// The narrowest subset satisfied exactly by the tag maps satisfying both subsets.
    ///
    /// Only meaningful for compatible subsets; on conflict `self` wins.
    pub fn union(&self, other: &Subset) -> Subset {
        let mut map = other.0.clone();
        map.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(map)
    }

    /// Orders subsets from least to most specific. A service-scoped subset is more specific
    /// than any subset that doesn't name a service; ties are broken by constraint count.
    pub fn specificity(&self) -> (bool, usize) {
        (self.0.contains_key(SERVICE_TAG), self.0.len())
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for Subset {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .filter(|(_, v)| v != WILDCARD)
                .collect(),
        )
    }
}

impl From<&Map> for Subset {
    fn from(tags: &Map) -> Self {
        tags.iter().collect()
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("mesh");
        }

        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}
