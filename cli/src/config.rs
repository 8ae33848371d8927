use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use txstream_api::crossover::CrossoverConfig;
use txstream_api::provider;

pub const DEFAULT_CHECKPOINT_PATH: &str = "txstream-tape.json";

/// Base URLs of the three services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub bitbus: String,
    pub bitsocket: String,
    pub bitfs: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bitbus: provider::BITBUS_TXO_URL.to_string(),
            bitsocket: provider::BITSOCKET_TXO_URL.to_string(),
            bitfs: provider::BITFS_URL.to_string(),
        }
    }
}

/// Contents of the TOML configuration file.
///
/// ```toml
/// token = "..."
/// from = 600000
/// poll = 10
/// checkpoint = "tape.json"
///
/// [query.find]
/// "out.s2" = "19HxigV4QyBv3tHpQVcUEQyq1pzZVdoAut"
///
/// [endpoints]
/// bitbus = "https://bob.bitbus.network"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub endpoints: Endpoints,
    pub checkpoint: PathBuf,
    #[serde(flatten)]
    pub crossover: CrossoverConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            checkpoint: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            crossover: CrossoverConfig::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("invalid configuration")
    }

    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("in {}", path.display()))
    }
}
