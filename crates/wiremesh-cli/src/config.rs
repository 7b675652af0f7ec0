use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};
use wiremesh_types::Network;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read network: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse network: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to parse network: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to serialize network: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk encoding of a network snapshot, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    pub fn decode(self, contents: &str) -> Result<Network, ConfigError> {
        Ok(match self {
            Self::Toml => toml::from_str(contents)?,
            Self::Json => serde_json::from_str(contents)?,
        })
    }

    pub fn encode(self, network: &Network) -> Result<String, ConfigError> {
        Ok(match self {
            Self::Toml => toml::to_string_pretty(network)?,
            Self::Json => serde_json::to_string_pretty(network)?,
        })
    }
}

pub async fn load(path: &Path) -> Result<Network, ConfigError> {
    debug!(path = %path.display(), "loading network");

    let contents = tokio::fs::read_to_string(path).await?;
    let network = Format::of(path).decode(&contents)?;
    info!(
        path = %path.display(),
        network = %network.identifier,
        peer_count = network.peers.len(),
        connection_count = network.connections.len(),
        "loaded network"
    );
    Ok(network)
}

pub async fn save(path: &Path, network: &Network) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = Format::of(path).encode(network)?;
    tokio::fs::write(path, contents).await?;
    info!(
        path = %path.display(),
        network = %network.identifier,
        peer_count = network.peers.len(),
        "saved network"
    );
    Ok(())
}
