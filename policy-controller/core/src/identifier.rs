use std::fmt;

/// Identifies one socket a proxy accepts inbound connections on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InboundListener {
    pub address: String,
    pub port: u32,
}

/// Identifies a resource independently of any instance backing it, e.g. a `MeshService`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypedResourceIdentifier {
    pub resource_type: String,
    pub name: String,
    pub mesh: String,
    pub namespace: String,
    pub zone: String,
}

// === impl InboundListener ===

impl InboundListener {
    pub fn new(address: impl ToString, port: u32) -> Self {
        Self {
            address: address.to_string(),
            port,
        }
    }
}

impl fmt::Display for InboundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// === impl TypedResourceIdentifier ===

impl TypedResourceIdentifier {
    pub fn new(resource_type: impl ToString, mesh: impl ToString, name: impl ToString) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            mesh: mesh.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl ToString) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_zone(mut self, zone: impl ToString) -> Self {
        self.zone = zone.to_string();
        self
    }
}

impl fmt::Display for TypedResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.mesh)?;
        if !self.zone.is_empty() {
            write!(f, ":{}", self.zone)?;
        }
        if !self.namespace.is_empty() {
            write!(f, ":{}", self.namespace)?;
        }
        write!(f, ":{}", self.name)
    }
}
