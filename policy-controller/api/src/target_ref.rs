use anyhow::{bail, Result};
use mesh_policy_core::{Map, Subset, SERVICE_TAG};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects a scope of the mesh that a policy, or one of its entries, applies to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub kind: TargetRefKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_types: Option<Vec<ProxyType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map>,
}

/// Kinds are ordered from the broadest to the narrowest scope when used at the top level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum TargetRefKind {
    Mesh,
    MeshSubset,
    MeshGateway,
    MeshService,
    MeshServiceSubset,
    MeshExternalService,
    MeshMultiZoneService,
    #[serde(rename = "MeshHTTPRoute")]
    MeshHttpRoute,
    Dataplane,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ProxyType {
    Sidecar,
    Gateway,
}

// === impl TargetRef ===

impl TargetRef {
    pub fn new(kind: TargetRefKind) -> Self {
        Self {
            kind,
            name: None,
            tags: None,
            mesh: None,
            section_name: None,
            proxy_types: None,
            labels: None,
        }
    }

    pub fn mesh() -> Self {
        Self::new(TargetRefKind::Mesh)
    }

    pub fn mesh_subset<K: ToString, V: ToString>(tags: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::new(TargetRefKind::MeshSubset).with_tags(tags)
    }

    pub fn mesh_service(name: impl ToString) -> Self {
        Self::new(TargetRefKind::MeshService).with_name(name)
    }

    pub fn mesh_service_subset<K: ToString, V: ToString>(
        name: impl ToString,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self::new(TargetRefKind::MeshServiceSubset)
            .with_name(name)
            .with_tags(tags)
    }

    pub fn mesh_gateway(name: impl ToString) -> Self {
        Self::new(TargetRefKind::MeshGateway).with_name(name)
    }

    pub fn mesh_http_route(name: impl ToString) -> Self {
        Self::new(TargetRefKind::MeshHttpRoute).with_name(name)
    }

    pub fn dataplane() -> Self {
        Self::new(TargetRefKind::Dataplane)
    }

    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_tags<K: ToString, V: ToString>(
        mut self,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.tags = Some(
            tags.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_mesh(mut self, mesh: impl ToString) -> Self {
        self.mesh = Some(mesh.to_string());
        self
    }

    pub fn with_section_name(mut self, section: impl ToString) -> Self {
        self.section_name = Some(section.to_string());
        self
    }

    pub fn with_proxy_types(mut self, types: impl IntoIterator<Item = ProxyType>) -> Self {
        self.proxy_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_labels<K: ToString, V: ToString>(
        mut self,
        labels: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.labels = Some(
            labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn tags(&self) -> impl Iterator<Item = (&String, &String)> {
        self.tags.iter().flatten()
    }

    /// Returns true if proxies of type `proxy_type` may be selected by this reference.
    pub fn supports_proxy_type(&self, proxy_type: ProxyType) -> bool {
        match self.proxy_types.as_deref() {
            None | Some([]) => true,
            Some(types) => types.contains(&proxy_type),
        }
    }

    /// Converts the reference into the tag constraints it implies.
    pub fn as_subset(&self) -> Result<Subset> {
        let subset = match self.kind {
            TargetRefKind::Mesh => Subset::mesh(),
            TargetRefKind::MeshSubset => self.tags().collect(),
            TargetRefKind::MeshService => {
                let Some(name) = self.name.as_deref() else {
                    bail!("MeshService targetRef has no name");
                };
                Subset::service(name)
            }
            TargetRefKind::MeshServiceSubset => {
                let Some(name) = self.name.as_deref() else {
                    bail!("MeshServiceSubset targetRef has no name");
                };
                self.tags()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .chain(Some((SERVICE_TAG, name)))
                    .collect()
            }
            kind => bail!("unsupported targetRef kind '{kind}'"),
        };
        Ok(subset)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = self.name.as_deref() {
            write!(f, "/{name}")?;
        }
        if let Some(tags) = self.tags.as_ref() {
            write!(f, "{tags:?}")?;
        }
        Ok(())
    }
}

// === impl TargetRefKind ===

impl TargetRefKind {
    pub fn is_subset(self) -> bool {
        matches!(self, Self::MeshSubset | Self::MeshServiceSubset)
    }

    /// Maps a subset kind to the kind that selects the same scope without tags.
    pub fn without_subset(self) -> Self {
        match self {
            Self::MeshSubset => Self::Mesh,
            Self::MeshServiceSubset => Self::MeshService,
            kind => kind,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mesh => "Mesh",
            Self::MeshSubset => "MeshSubset",
            Self::MeshGateway => "MeshGateway",
            Self::MeshService => "MeshService",
            Self::MeshServiceSubset => "MeshServiceSubset",
            Self::MeshExternalService => "MeshExternalService",
            Self::MeshMultiZoneService => "MeshMultiZoneService",
            Self::MeshHttpRoute => "MeshHTTPRoute",
            Self::Dataplane => "Dataplane",
        }
    }
}

impl fmt::Display for TargetRefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
