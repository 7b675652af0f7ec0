//! The work behind each subcommand, kept apart from argument parsing so it
//! can be driven from tests.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;
use wiremesh_core::{
    CheckResult, RenderOptions, ValidationContext, check_field, check_network, config_file_name,
    next_available_address, render_peer_config_with,
};
use wiremesh_types::{ConnectionId, FieldValue, Network, peers_of};

use crate::error::CliError;

/// A rendered peer config and the file name it should be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub file_name: String,
    pub contents: String,
}

pub fn render_config(
    network: &Network,
    peer_id: &str,
    options: &RenderOptions,
) -> Result<RenderedConfig, CliError> {
    let peer_id: Uuid = peer_id.parse()?;
    let peer = network
        .peers
        .get(&peer_id)
        .ok_or(CliError::PeerNotFound(peer_id))?;

    let contents = render_peer_config_with(network, peer_id, options)?;
    Ok(RenderedConfig {
        file_name: config_file_name(&peer.name),
        contents,
    })
}

/// Write `config` into `dir`, creating it if needed.
pub async fn write_config(dir: &Path, config: &RenderedConfig) -> Result<PathBuf, CliError> {
    let path = dir.join(&config.file_name);
    let write = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &config.contents).await
    };
    write.await.map_err(|source| CliError::Write {
        path: path.display().to_string(),
        source,
    })?;

    info!(path = %path.display(), "wrote peer config");
    Ok(path)
}

pub fn next_address(network: &Network) -> Result<Ipv4Addr, CliError> {
    next_available_address(network).ok_or(CliError::NetworkFull)
}

pub fn connection_id(a: &str, b: &str) -> Result<ConnectionId, CliError> {
    Ok(ConnectionId::new(a.parse()?, b.parse()?))
}

/// The two peers named by a connection id, greater id first.
pub fn split_connection_id(id: &str) -> Result<(Uuid, Uuid), CliError> {
    Ok(peers_of(id)?)
}

/// Check `payload` (JSON) against the grammar of `field`. With a network the
/// address rules also see the subnet, the other peers and active leases;
/// `peer` names the peer being edited so its own address is not a clash.
pub fn validate_payload(
    network: Option<&Network>,
    peer: Option<&str>,
    field: &str,
    payload: &str,
) -> Result<CheckResult, CliError> {
    let value: FieldValue = serde_json::from_str(payload)?;
    let peer = peer.map(str::parse::<Uuid>).transpose()?;

    let context = network.map(|network| {
        let context = ValidationContext::new(network);
        match peer {
            Some(id) => context.for_peer(id),
            None => context,
        }
    });
    Ok(check_field(field, &value, context.as_ref()))
}

pub fn check(network: &Network) -> Result<(), CliError> {
    check_network(network)?;
    info!(
        network = %network.identifier,
        peer_count = network.peers.len(),
        connection_count = network.connections.len(),
        "network is consistent"
    );
    Ok(())
}
