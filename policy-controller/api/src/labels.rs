use mesh_policy_core::{Map, WILDCARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Resource labels, shared cheaply between the resource and anything derived from it.
#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

/// Selects tag maps by requiring every listed key, with an equal value unless the value is `*`.
///
/// Unlike a policy subset, a wildcard value still requires the key to be present.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TagSelector(Map);

// === TagSelector ===

impl TagSelector {
    pub fn from_map(map: Map) -> Self {
        Self(map)
    }

    pub fn matches(&self, tags: &Map) -> bool {
        self.0.iter().all(|(k, v)| match tags.get(k) {
            Some(tv) => v == WILDCARD || tv == v,
            None => false,
        })
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for TagSelector {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl AsRef<Map> for TagSelector {
    #[inline]
    fn as_ref(&self) -> &Map {
        &self.0
    }
}

// === Labels ===

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for Labels {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }
}

impl Serialize for Labels {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from)
    }
}
