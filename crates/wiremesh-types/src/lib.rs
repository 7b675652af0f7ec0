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

//! wiremesh-types: Shared data model for a WireGuard mesh.
//!
//! This crate contains the network snapshot (peers and the pairwise
//! connections between them), the canonical connection identifier, and the
//! field-edit payload exchanged with editors.

#![warn(missing_docs)]

pub mod connection;
pub mod edit;

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use connection::{ConnectionId, ConnectionIdError, connection_id, peers_of};
pub use edit::{FieldValue, Scalar};

/// An optional override: when `enabled` is false the value is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledValue<T> {
    /// Whether the override is in effect.
    pub enabled: bool,
    /// The override value.
    pub value: T,
}

impl<T> EnabledValue<T> {
    /// An override that is switched on.
    pub fn on(value: T) -> Self {
        Self { enabled: true, value }
    }

    /// An override that is switched off, keeping `value` around for later.
    pub fn off(value: T) -> Self {
        Self { enabled: false, value }
    }

    /// The value, if the override is enabled.
    pub fn get(&self) -> Option<&T> {
        self.enabled.then_some(&self.value)
    }
}

/// Whether a peer has a fixed, dialable endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mobility {
    /// Reachable at a fixed `host:port` and listens on that port.
    Static,
    /// No stable endpoint (laptops, phones).
    #[default]
    Roaming,
}

impl Mobility {
    /// Wire name of this mobility.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Roaming => "roaming",
        }
    }
}

impl fmt::Display for Mobility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// wg-quick hook commands for a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    /// Runs before the interface is brought up.
    pub pre_up: EnabledValue<String>,
    /// Runs after the interface is brought up.
    pub post_up: EnabledValue<String>,
    /// Runs before the interface is torn down.
    pub pre_down: EnabledValue<String>,
    /// Runs after the interface is torn down.
    pub post_down: EnabledValue<String>,
}

impl Scripts {
    /// Wire names of the four hooks, in the order wg-quick runs them.
    pub const KEYS: [&'static str; 4] = ["pre_up", "post_up", "pre_down", "post_down"];

    /// The hooks paired with their wire names, in [`Scripts::KEYS`] order.
    pub fn entries(&self) -> [(&'static str, &EnabledValue<String>); 4] {
        [
            ("pre_up", &self.pre_up),
            ("post_up", &self.post_up),
            ("pre_down", &self.pre_down),
            ("post_down", &self.post_down),
        ]
    }
}

/// A VPN endpoint in the mesh. Keyed by its UUID in [`Network::peers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Human-readable label (e.g. "Dad's laptop").
    pub name: String,
    /// Address inside the network subnet, unique per network.
    pub address: Ipv4Addr,
    /// Static or roaming.
    #[serde(default)]
    pub mobility: Mobility,
    /// `host:port` for static peers, empty for roaming ones.
    #[serde(default)]
    pub endpoint: String,
    /// WireGuard public key.
    pub public_key: String,
    /// WireGuard private key.
    pub private_key: String,
    /// DNS servers pushed into the interface, comma-separated.
    #[serde(default)]
    pub dns: EnabledValue<String>,
    /// Interface MTU.
    #[serde(default)]
    pub mtu: EnabledValue<u16>,
    /// Keepalive interval in seconds.
    #[serde(default)]
    pub persistent_keepalive: EnabledValue<u16>,
    /// wg-quick hooks.
    #[serde(default)]
    pub scripts: Scripts,
    /// When this peer was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When this peer was last modified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Peer {
    /// The port of a static peer's endpoint, used as its `ListenPort`.
    pub fn listen_port(&self) -> Option<u16> {
        if self.mobility != Mobility::Static {
            return None;
        }
        let (_, port) = self.endpoint.rsplit_once(':')?;
        port.parse().ok()
    }
}

/// The link between two peers. Keyed by [`ConnectionId`] in
/// [`Network::connections`]; `a` is the first peer of the id, `b` the second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Disabled connections are left out of generated configs.
    pub enabled: bool,
    /// Symmetric key shared by both sides.
    pub pre_shared_key: String,
    /// Routes `a` sends to `b`, comma-separated CIDRs.
    pub allowed_ips_a_to_b: String,
    /// Routes `b` sends to `a`, comma-separated CIDRs.
    pub allowed_ips_b_to_a: String,
    /// Keepalive interval in seconds.
    #[serde(default)]
    pub persistent_keepalive: EnabledValue<u16>,
}

impl Connection {
    /// The `AllowedIPs` the peer at `from_a` side routes to the other peer.
    pub fn allowed_ips(&self, from_a: bool) -> &str {
        if from_a {
            &self.allowed_ips_a_to_b
        } else {
            &self.allowed_ips_b_to_a
        }
    }
}

/// An address held for a peer that is still being set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// The reserved address.
    pub address: Ipv4Addr,
    /// The peer the address is held for.
    pub peer_id: Uuid,
    /// The lease no longer counts after this instant.
    pub valid_until: DateTime<Utc>,
}

impl Lease {
    /// Whether the lease still holds its address at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

/// A snapshot of the whole mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Stable name of the mesh.
    pub identifier: String,
    /// Address space peers are allocated from.
    pub subnet: Ipv4Network,
    /// Peers by id.
    #[serde(default)]
    pub peers: HashMap<Uuid, Peer>,
    /// Connections by canonical pair id. Two keys naming the same pair in
    /// different orders are rejected on load.
    #[serde(default, deserialize_with = "deserialize_connections")]
    pub connections: HashMap<ConnectionId, Connection>,
    /// Outstanding address reservations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leases: Vec<Lease>,
    /// Last time any part of the network changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Network {
    /// An empty network over `subnet`.
    pub fn new(identifier: impl Into<String>, subnet: Ipv4Network) -> Self {
        Self {
            identifier: identifier.into(),
            subnet,
            peers: HashMap::new(),
            connections: HashMap::new(),
            leases: Vec::new(),
            updated_at: None,
        }
    }

    /// Connections that involve `peer_id`, in map order.
    pub fn connections_of(
        &self,
        peer_id: Uuid,
    ) -> impl Iterator<Item = (&ConnectionId, &Connection)> {
        self.connections
            .iter()
            .filter(move |(id, _)| id.contains(peer_id))
    }

    /// The connection between two peers, in either argument order.
    pub fn connection_between(&self, x: Uuid, y: Uuid) -> Option<&Connection> {
        self.connections.get(&ConnectionId::new(x, y))
    }
}

fn deserialize_connections<'de, D>(
    deserializer: D,
) -> Result<HashMap<ConnectionId, Connection>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ConnectionsVisitor;

    impl<'de> Visitor<'de> for ConnectionsVisitor {
        type Value = HashMap<ConnectionId, Connection>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of connection ids to connections")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut connections = HashMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((id, connection)) = access.next_entry::<ConnectionId, Connection>()? {
                if connections.insert(id, connection).is_some() {
                    return Err(de::Error::custom(format!("duplicate connection {id}")));
                }
            }
            Ok(connections)
        }
    }

    deserializer.deserialize_map(ConnectionsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn peer(mobility: Mobility, endpoint: &str) -> Peer {
        Peer {
            name: "home-pi".to_string(),
            address: Ipv4Addr::new(10, 0, 0, 1),
            mobility,
            endpoint: endpoint.to_string(),
            public_key: "pub".to_string(),
            private_key: "priv".to_string(),
            dns: EnabledValue::default(),
            mtu: EnabledValue::default(),
            persistent_keepalive: EnabledValue::default(),
            scripts: Scripts::default(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test_case(Mobility::Static, "1.2.3.4:51820", Some(51820) ; "static ipv4")]
    #[test_case(Mobility::Static, "vpn.example.com:443", Some(443) ; "static fqdn")]
    #[test_case(Mobility::Static, "vpn.example.com", None ; "static without port")]
    #[test_case(Mobility::Roaming, "1.2.3.4:51820", None ; "roaming ignores endpoint")]
    fn listen_port(mobility: Mobility, endpoint: &str, expected: Option<u16>) {
        assert_eq!(peer(mobility, endpoint).listen_port(), expected);
    }

    #[test]
    fn network_serializes_with_string_keys() {
        let mut network = Network::new("home", "10.0.0.0/24".parse().unwrap());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        network.peers.insert(a, peer(Mobility::Static, "1.2.3.4:51820"));
        network.connections.insert(
            ConnectionId::new(a, b),
            Connection {
                enabled: true,
                pre_shared_key: "psk".to_string(),
                allowed_ips_a_to_b: "10.0.0.2/32".to_string(),
                allowed_ips_b_to_a: "10.0.0.1/32".to_string(),
                persistent_keepalive: EnabledValue::off(25),
            },
        );

        let json = serde_json::to_string(&network).unwrap();
        assert!(json.contains("\"subnet\":\"10.0.0.0/24\""));
        assert!(json.contains("\"mobility\":\"static\""));
        assert!(json.contains(&ConnectionId::new(a, b).to_string()));

        let parsed: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, network);
    }

    #[test]
    fn reversed_duplicate_connection_fails_to_load() {
        let low = "11111111-1111-4111-8111-111111111111";
        let high = "ffffffff-ffff-4fff-bfff-ffffffffffff";
        let connection = |psk: &str, enabled: bool| {
            serde_json::json!({
                "enabled": enabled,
                "pre_shared_key": psk,
                "allowed_ips_a_to_b": "10.0.0.0/24",
                "allowed_ips_b_to_a": "10.0.0.0/24",
            })
        };
        let json = serde_json::json!({
            "identifier": "home",
            "subnet": "10.0.0.0/24",
            "connections": {
                format!("{high}*{low}"): connection("first", true),
                format!("{low}*{high}"): connection("second", false),
            },
        });

        let err = serde_json::from_value::<Network>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate connection"), "{err}");
    }

    #[test]
    fn self_connection_key_fails_to_load() {
        let id = "11111111-1111-4111-8111-111111111111";
        let json = format!(
            r#"{{"identifier":"home","subnet":"10.0.0.0/24","connections":{{"{id}*{id}":{{"enabled":true,"pre_shared_key":"","allowed_ips_a_to_b":"","allowed_ips_b_to_a":""}}}}}}"#
        );
        assert!(serde_json::from_str::<Network>(&json).is_err());
    }

    #[test]
    fn connection_between_ignores_argument_order() {
        let mut network = Network::new("home", "10.0.0.0/24".parse().unwrap());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        network.connections.insert(
            ConnectionId::new(b, a),
            Connection {
                enabled: false,
                pre_shared_key: String::new(),
                allowed_ips_a_to_b: String::new(),
                allowed_ips_b_to_a: String::new(),
                persistent_keepalive: EnabledValue::default(),
            },
        );
        assert!(network.connection_between(a, b).is_some());
        assert!(network.connection_between(b, a).is_some());
        assert_eq!(network.connections_of(a).count(), 1);
        assert_eq!(network.connections_of(Uuid::new_v4()).count(), 0);
    }
}
