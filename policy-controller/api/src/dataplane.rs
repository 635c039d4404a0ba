use crate::{ProxyType, ResourceMeta};
use mesh_policy_core::{InboundListener, Map, SERVICE_TAG};
use serde::{Deserialize, Serialize};

/// A proxy: either a sidecar with inbounds, or a gateway.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Dataplane {
    pub meta: ResourceMeta,
    pub networking: Networking,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Networking {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<ProxyGateway>,
    #[serde(default)]
    pub inbound: Vec<Inbound>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ProxyGateway {
    #[serde(default)]
    pub tags: Map,
    #[serde(default, rename = "type")]
    pub gateway_type: GatewayType,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum GatewayType {
    #[default]
    Delegated,
    Builtin,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Inbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: u32,
    /// Overrides the proxy address for this inbound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub tags: Map,
    #[serde(default)]
    pub state: InboundState,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum InboundState {
    #[default]
    Ready,
    NotReady,
    /// Ignored inbounds receive no configuration at all.
    Ignored,
}

// === impl Dataplane ===

impl Dataplane {
    pub fn new(meta: ResourceMeta, address: impl ToString) -> Self {
        Self {
            meta,
            networking: Networking {
                address: address.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_inbound(mut self, inbound: Inbound) -> Self {
        self.networking.inbound.push(inbound);
        self
    }

    pub fn with_gateway<K: ToString, V: ToString>(
        mut self,
        gateway_type: GatewayType,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.networking.gateway = Some(ProxyGateway {
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            gateway_type,
        });
        self
    }

    pub fn proxy_type(&self) -> ProxyType {
        if self.networking.gateway.is_some() {
            ProxyType::Gateway
        } else {
            ProxyType::Sidecar
        }
    }

    pub fn is_builtin_gateway(&self) -> bool {
        matches!(
            self.networking.gateway,
            Some(ProxyGateway {
                gateway_type: GatewayType::Builtin,
                ..
            })
        )
    }

    pub fn is_delegated_gateway(&self) -> bool {
        matches!(
            self.networking.gateway,
            Some(ProxyGateway {
                gateway_type: GatewayType::Delegated,
                ..
            })
        )
    }

    /// Inbounds that are not ignored.
    pub fn active_inbounds(&self) -> impl Iterator<Item = &Inbound> {
        self.networking
            .inbound
            .iter()
            .filter(|inbound| inbound.state != InboundState::Ignored)
    }

    pub fn listener(&self, inbound: &Inbound) -> InboundListener {
        let address = inbound
            .address
            .as_deref()
            .unwrap_or(&self.networking.address);
        InboundListener::new(address, inbound.port)
    }
}

// === impl Inbound ===

impl Inbound {
    pub fn new<K: ToString, V: ToString>(
        port: u32,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            name: None,
            port,
            address: None,
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            state: InboundState::Ready,
        }
    }

    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_state(mut self, state: InboundState) -> Self {
        self.state = state;
        self
    }

    pub fn service(&self) -> Option<&str> {
        self.tags.get(SERVICE_TAG).map(String::as_str)
    }

    /// Returns true if `section` names this inbound, either by name or by port.
    pub fn is_section(&self, section: &str) -> bool {
        self.name.as_deref() == Some(section) || self.port.to_string() == section
    }
}
