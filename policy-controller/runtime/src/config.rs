use anyhow::{anyhow, Error, Result};
use mesh_policy_index::synthesize::{default_supported_tags, SynthesisConfig};
use serde::Deserialize;

/// Configures how policies are resolved and how reachability is evaluated.
#[derive(Clone, Debug, PartialEq, Eq, clap::Args, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Tags assumed to be uniform across every instance of a service.
    ///
    /// Constraints on other tags are dropped when policies are matched against whole services.
    #[clap(
        long = "supported-tag",
        value_delimiter = ',',
        default_values_t = default_supported_tags()
    )]
    pub supported_tags: Vec<String>,

    /// How the reachability graph is built: `lazy` keeps rules per destination, `eager`
    /// evaluates every pair of services up front.
    #[clap(long, default_value = "lazy", env = "MESH_POLICY_GRAPH")]
    pub graph: GraphMode,

    /// Evaluates policies labeled with the shadow effect.
    #[clap(long)]
    pub include_shadow: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphMode {
    #[default]
    Lazy,
    Eager,
}

// === impl EngineConfig ===

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supported_tags: default_supported_tags(),
            graph: GraphMode::default(),
            include_shadow: false,
        }
    }
}

impl EngineConfig {
    pub fn synthesis(&self) -> SynthesisConfig {
        SynthesisConfig {
            supported_tags: self.supported_tags.clone(),
            include_shadow: self.include_shadow,
        }
    }
}

// === impl GraphMode ===

impl std::str::FromStr for GraphMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lazy" => Ok(Self::Lazy),
            "eager" => Ok(Self::Eager),
            s => Err(anyhow!("invalid graph mode: {:?}", s)),
        }
    }
}

impl std::fmt::Display for GraphMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lazy => f.write_str("lazy"),
            Self::Eager => f.write_str("eager"),
        }
    }
}
