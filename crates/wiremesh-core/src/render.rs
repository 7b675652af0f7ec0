// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wiremesh_types::{Connection, ConnectionId, Mobility, Network, Peer};

/// Prefix length written on the `Address` line, whatever the subnet's own
/// prefix is.
pub const INTERFACE_PREFIX: u8 = 24;

const FILE_STEM_MAX: usize = 32;

#[derive(Debug, Error)]
pub enum RenderError {
    /// The caller asked for a peer that is not in the network.
    #[error("peer not found: {0}")]
    PeerNotFound(Uuid),

    /// A connection key names a peer that does not exist. The snapshot is
    /// corrupt; this is not a user input problem.
    #[error("connection {connection} references unknown peer {peer}")]
    DanglingConnection { connection: ConnectionId, peer: Uuid },

    /// A connection key joins a peer to itself. Also a corrupt snapshot.
    #[error("connection {0} joins a peer to itself")]
    SelfConnection(ConnectionId),

    #[error("failed to format config: {0}")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Only emit keys `wg setconf` understands: no `Address`, `DNS`, `MTU` or
    /// hook lines.
    pub stripped: bool,
    /// Generator line written as a leading comment, followed by the network
    /// identifier.
    pub banner: Option<String>,
}

/// One `[Peer]` block: the other end of an enabled connection.
struct Link<'a> {
    id: Uuid,
    peer: &'a Peer,
    connection: &'a Connection,
    from_a: bool,
}

/// Render the wg-quick config for `peer_id` with default options.
pub fn render_peer_config(network: &Network, peer_id: Uuid) -> Result<String, RenderError> {
    render_peer_config_with(network, peer_id, &RenderOptions::default())
}

/// Render the config `peer_id` needs to reach every peer it has an enabled
/// connection with. `[Peer]` blocks are ordered by the other peer's id.
#[tracing::instrument(skip(network, options), fields(network = %network.identifier, stripped = options.stripped))]
pub fn render_peer_config_with(
    network: &Network,
    peer_id: Uuid,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    let this = network
        .peers
        .get(&peer_id)
        .ok_or(RenderError::PeerNotFound(peer_id))?;

    let mut config = String::new();
    if let Some(banner) = &options.banner {
        writeln!(config, "# {banner}")?;
        writeln!(config, "# network: {}", network.identifier)?;
        writeln!(config)?;
    }

    write_interface(&mut config, this, options.stripped)?;

    let links = links_of(network, peer_id)?;
    for link in &links {
        writeln!(config)?;
        write_peer(&mut config, link)?;
    }

    info!(
        peer = %this.name,
        peer_count = links.len(),
        "rendered peer config"
    );
    Ok(config)
}

fn write_interface(config: &mut String, this: &Peer, stripped: bool) -> Result<(), RenderError> {
    writeln!(config, "[Interface]")?;
    writeln!(config, "PrivateKey = {}", this.private_key)?;
    if !stripped {
        writeln!(config, "Address = {}/{INTERFACE_PREFIX}", this.address)?;
    }

    match this.listen_port() {
        Some(port) => writeln!(config, "ListenPort = {port}")?,
        None if this.mobility == Mobility::Static => {
            warn!(endpoint = %this.endpoint, "static peer has no endpoint port, omitting ListenPort");
        }
        None => {}
    }

    if stripped {
        return Ok(());
    }
    if let Some(dns) = this.dns.get() {
        writeln!(config, "DNS = {dns}")?;
    }
    if let Some(mtu) = this.mtu.get() {
        writeln!(config, "MTU = {mtu}")?;
    }
    let hooks = [
        ("PreUp", &this.scripts.pre_up),
        ("PostUp", &this.scripts.post_up),
        ("PreDown", &this.scripts.pre_down),
        ("PostDown", &this.scripts.post_down),
    ];
    for (key, hook) in hooks {
        if let Some(cmd) = hook.get() {
            writeln!(config, "{key} = {cmd}")?;
        }
    }
    Ok(())
}

fn links_of(network: &Network, peer_id: Uuid) -> Result<Vec<Link<'_>>, RenderError> {
    let mut links = Vec::new();
    for (connection_id, connection) in network.connections_of(peer_id) {
        if !connection.enabled {
            debug!(connection = %connection_id, "skipping disabled connection");
            continue;
        }
        if connection_id.is_self_connection() {
            return Err(RenderError::SelfConnection(*connection_id));
        }
        let Some(other_id) = connection_id.other(peer_id) else {
            continue;
        };
        let other = network
            .peers
            .get(&other_id)
            .ok_or(RenderError::DanglingConnection {
                connection: *connection_id,
                peer: other_id,
            })?;
        links.push(Link {
            id: other_id,
            peer: other,
            connection,
            from_a: connection_id.a() == peer_id,
        });
    }
    links.sort_by_key(|link| link.id);
    Ok(links)
}

fn write_peer(config: &mut String, link: &Link<'_>) -> Result<(), RenderError> {
    let Link { id, peer, connection, from_a } = link;

    writeln!(config, "# Peer: {} ({id})", peer.name)?;
    writeln!(config, "[Peer]")?;
    writeln!(config, "PublicKey = {}", peer.public_key)?;
    writeln!(config, "PresharedKey = {}", connection.pre_shared_key)?;
    writeln!(config, "AllowedIPs = {}", connection.allowed_ips(*from_a))?;
    if let Some(keepalive) = connection.persistent_keepalive.get() {
        writeln!(config, "PersistentKeepalive = {keepalive}")?;
    }
    if peer.mobility == Mobility::Static {
        if peer.endpoint.is_empty() {
            warn!(peer = %id, "static peer has no endpoint, omitting Endpoint");
        } else {
            writeln!(config, "Endpoint = {}", peer.endpoint)?;
        }
    }
    Ok(())
}

/// Turn a peer name into a download filename: anything outside
/// `[A-Za-z0-9_=+.-]` becomes `-`, runs of `-` collapse, a trailing `-` is
/// dropped and the stem is cut to 32 characters.
pub fn config_file_name(peer_name: &str) -> String {
    let mut stem = String::with_capacity(peer_name.len());
    for c in peer_name.chars() {
        let c = if c.is_ascii_alphanumeric() || "_=+.-".contains(c) { c } else { '-' };
        if c == '-' && stem.ends_with('-') {
            continue;
        }
        stem.push(c);
    }
    let stem = stem.trim_end_matches('-');
    let stem = &stem[..stem.len().min(FILE_STEM_MAX)];
    if stem.is_empty() {
        return "peer.conf".to_string();
    }
    format!("{stem}.conf")
}
