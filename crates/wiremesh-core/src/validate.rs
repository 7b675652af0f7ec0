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

//! Per-field grammar checks for user-editable network fields.
//!
//! Every [`Field`] maps to exactly one rule function; the
//! composite `scripts` rule reuses the single-hook rule. Rules never mutate
//! their input and never panic.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use wiremesh_types::{ConnectionId, EnabledValue, FieldValue, Network, Scalar, Scripts};

// ---------------------------------------------------------------------------
// Grammars
// ---------------------------------------------------------------------------

macro_rules! octet {
    () => {
        r"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)"
    };
}

macro_rules! ipv4 {
    () => {
        concat!(octet!(), r"\.", octet!(), r"\.", octet!(), r"\.", octet!())
    };
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| unreachable!())
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
});

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| compile(concat!("^", ipv4!(), "$")));

static CIDR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(concat!("^", ipv4!(), r"/(?:3[0-2]|[12][0-9]|[0-9])$")));

static FQDN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)^(?:(?:xn--)?[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9])?\.)*(?:xn--)?[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.[a-z]{2,}$",
    )
});

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^.*;\s*$"));

/// Parse a dotted quad, tolerating leading zeros in an octet.
pub fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    if !IPV4_RE.is_match(s) {
        return None;
    }
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(s.split('.')) {
        *slot = part.parse().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

fn is_port(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) && s.parse::<u16>().is_ok()
}

fn is_endpoint(s: &str) -> bool {
    let Some((host, port)) = s.rsplit_once(':') else {
        return false;
    };
    is_port(port) && (IPV4_RE.is_match(host) || FQDN_RE.is_match(host))
}

/// Comma-separated items; whitespace is allowed only after a comma.
fn is_list_of(s: &str, item: &Regex) -> bool {
    s.split(',')
        .enumerate()
        .all(|(i, part)| item.is_match(if i == 0 { part } else { part.trim_start() }))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a field value was rejected. The message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("peerId needs to follow uuid4 standards")]
    InvalidPeerId,

    #[error("name cannot be empty")]
    EmptyName,

    #[error("address is not IPv4")]
    NotIpv4Address,

    #[error("address is not in the network subnet")]
    AddressNotInSubnet,

    #[error("address is the subnet's network address")]
    AddressIsSubnetNetwork,

    #[error("address is the subnet's broadcast address")]
    AddressIsSubnetBroadcast,

    #[error("address is already taken by {0}")]
    AddressTaken(String),

    #[error("address is reserved for another peer")]
    AddressReserved,

    #[error("mobility must be either 'static' or 'roaming'")]
    InvalidMobility,

    #[error("endpoint is not IPv4 nor an FQDN")]
    InvalidEndpoint,

    #[error("DNS is invalid")]
    InvalidDns,

    #[error("MTU is invalid")]
    InvalidMtu,

    #[error("Persistent Keepalive is invalid")]
    InvalidPersistentKeepalive,

    #[error("script needs to end with a semicolon")]
    ScriptMissingSemicolon,

    #[error("scripts must include '{0}'")]
    MissingScript(&'static str),

    #[error("AllowedIPs is not in CIDR format")]
    InvalidAllowedIps,

    #[error("{0} cannot be empty")]
    EmptyKey(&'static str),

    #[error("invalid field type")]
    InvalidFieldType,

    #[error("field doesn't exist: {0}")]
    UnknownField(String),
}

// ---------------------------------------------------------------------------
// Fields and rules
// ---------------------------------------------------------------------------

/// Every field an editor can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    PeerId,
    Name,
    Address,
    Mobility,
    Endpoint,
    Dns,
    Mtu,
    PersistentKeepalive,
    Script,
    Scripts,
    AllowedIpsAToB,
    AllowedIpsBToA,
    PublicKey,
    PrivateKey,
    PreSharedKey,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Self::PeerId,
        Self::Name,
        Self::Address,
        Self::Mobility,
        Self::Endpoint,
        Self::Dns,
        Self::Mtu,
        Self::PersistentKeepalive,
        Self::Script,
        Self::Scripts,
        Self::AllowedIpsAToB,
        Self::AllowedIpsBToA,
        Self::PublicKey,
        Self::PrivateKey,
        Self::PreSharedKey,
    ];

    /// Wire name of the field.
    pub fn name(self) -> &'static str {
        match self {
            Self::PeerId => "peerId",
            Self::Name => "name",
            Self::Address => "address",
            Self::Mobility => "mobility",
            Self::Endpoint => "endpoint",
            Self::Dns => "dns",
            Self::Mtu => "mtu",
            Self::PersistentKeepalive => "persistent_keepalive",
            Self::Script => "script",
            Self::Scripts => "scripts",
            Self::AllowedIpsAToB => "allowed_ips_a_to_b",
            Self::AllowedIpsBToA => "allowed_ips_b_to_a",
            Self::PublicKey => "public_key",
            Self::PrivateKey => "private_key",
            Self::PreSharedKey => "pre_shared_key",
        }
    }

    fn rule(self) -> Rule {
        match self {
            Self::PeerId => peer_id,
            Self::Name => name,
            Self::Address => address,
            Self::Mobility => mobility,
            Self::Endpoint => endpoint,
            Self::Dns => dns,
            Self::Mtu => mtu,
            Self::PersistentKeepalive => persistent_keepalive,
            Self::Script => script,
            Self::Scripts => scripts,
            Self::AllowedIpsAToB | Self::AllowedIpsBToA => allowed_ips,
            Self::PublicKey => public_key,
            Self::PrivateKey => private_key,
            Self::PreSharedKey => pre_shared_key,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Scripts::KEYS.contains(&s) {
            return Ok(Self::Script);
        }
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()))
    }
}

/// What a rule may consult beyond the value itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// The committed network the edit applies to.
    pub network: &'a Network,
    /// The peer being edited, if it already exists.
    pub peer: Option<Uuid>,
    /// Instant used to decide whether leases are still active.
    pub now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network, peer: None, now: Utc::now() }
    }

    /// Validate on behalf of an existing peer, so its own address is not
    /// reported as taken.
    pub fn for_peer(mut self, peer: Uuid) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

type Rule = fn(&FieldValue, Option<&ValidationContext<'_>>) -> Result<(), ValidationError>;

fn text(value: &FieldValue) -> Result<&str, ValidationError> {
    match value {
        FieldValue::Text(s) => Ok(s),
        _ => Err(ValidationError::InvalidFieldType),
    }
}

fn toggle(value: &FieldValue) -> Result<&EnabledValue<Scalar>, ValidationError> {
    match value {
        FieldValue::Toggle(t) => Ok(t),
        _ => Err(ValidationError::InvalidFieldType),
    }
}

fn peer_id(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    if UUID_RE.is_match(text(value)?) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPeerId)
    }
}

fn name(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    if text(value)?.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

fn address(value: &FieldValue, ctx: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    let ip = parse_ipv4(text(value)?).ok_or(ValidationError::NotIpv4Address)?;
    let Some(ctx) = ctx else {
        return Ok(());
    };

    let subnet = ctx.network.subnet;
    if !subnet.contains(ip) {
        return Err(ValidationError::AddressNotInSubnet);
    }
    if subnet.prefix() < 31 {
        if ip == subnet.network() {
            return Err(ValidationError::AddressIsSubnetNetwork);
        }
        if ip == subnet.broadcast() {
            return Err(ValidationError::AddressIsSubnetBroadcast);
        }
    }
    let is_other = |id: &Uuid| ctx.peer != Some(*id);
    if let Some((_, peer)) = ctx
        .network
        .peers
        .iter()
        .find(|(id, p)| p.address == ip && is_other(*id))
    {
        return Err(ValidationError::AddressTaken(peer.name.clone()));
    }
    if ctx
        .network
        .leases
        .iter()
        .any(|lease| lease.address == ip && lease.is_active(ctx.now) && is_other(&lease.peer_id))
    {
        return Err(ValidationError::AddressReserved);
    }
    Ok(())
}

fn mobility(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    match text(value)? {
        "static" | "roaming" => Ok(()),
        _ => Err(ValidationError::InvalidMobility),
    }
}

fn endpoint(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    if is_endpoint(text(value)?) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEndpoint)
    }
}

fn dns(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    let toggle = toggle(value)?;
    if !toggle.enabled {
        return Ok(());
    }
    match toggle.value.as_text() {
        Some(list) if is_list_of(list, &IPV4_RE) => Ok(()),
        _ => Err(ValidationError::InvalidDns),
    }
}

fn in_u16_range(toggle: &EnabledValue<Scalar>) -> bool {
    !toggle.enabled || toggle.value.as_integer().is_some_and(|v| v > 0 && v < 65536)
}

fn mtu(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    if in_u16_range(toggle(value)?) {
        Ok(())
    } else {
        Err(ValidationError::InvalidMtu)
    }
}

fn persistent_keepalive(
    value: &FieldValue,
    _: Option<&ValidationContext<'_>>,
) -> Result<(), ValidationError> {
    if in_u16_range(toggle(value)?) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPersistentKeepalive)
    }
}

fn check_hook(hook: &EnabledValue<Scalar>) -> Result<(), ValidationError> {
    match (hook.enabled, hook.value.as_text()) {
        (true, Some(cmd)) if !SCRIPT_RE.is_match(cmd) => {
            Err(ValidationError::ScriptMissingSemicolon)
        }
        _ => Ok(()),
    }
}

fn script(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    check_hook(toggle(value)?)
}

fn scripts(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    let FieldValue::Scripts(hooks) = value else {
        return Err(ValidationError::InvalidFieldType);
    };
    check_hooks(hooks)
}

fn check_hooks(hooks: &BTreeMap<String, EnabledValue<Scalar>>) -> Result<(), ValidationError> {
    for key in Scripts::KEYS {
        let hook = hooks.get(key).ok_or(ValidationError::MissingScript(key))?;
        check_hook(hook)?;
    }
    Ok(())
}

fn allowed_ips(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    if is_list_of(text(value)?, &CIDR_RE) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAllowedIps)
    }
}

fn non_empty_key(value: &FieldValue, field: &'static str) -> Result<(), ValidationError> {
    if text(value)?.is_empty() {
        return Err(ValidationError::EmptyKey(field));
    }
    Ok(())
}

fn public_key(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    non_empty_key(value, "public_key")
}

fn private_key(value: &FieldValue, _: Option<&ValidationContext<'_>>) -> Result<(), ValidationError> {
    non_empty_key(value, "private_key")
}

fn pre_shared_key(
    value: &FieldValue,
    _: Option<&ValidationContext<'_>>,
) -> Result<(), ValidationError> {
    non_empty_key(value, "pre_shared_key")
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Check one field value against its grammar.
#[tracing::instrument(level = "debug", skip(value, context), fields(kind = value.kind()))]
pub fn validate(
    field: Field,
    value: &FieldValue,
    context: Option<&ValidationContext<'_>>,
) -> Result<(), ValidationError> {
    let result = field.rule()(value, context);
    if let Err(e) = &result {
        debug!(error = %e, "field rejected");
    }
    result
}

/// Outcome of a check by field name: `status` is true on success, `msg`
/// carries the rejection message otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: bool,
    pub msg: String,
}

impl From<Result<(), ValidationError>> for CheckResult {
    fn from(result: Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => Self { status: true, msg: String::new() },
            Err(e) => Self { status: false, msg: e.to_string() },
        }
    }
}

/// Check a field given its wire name. Unknown names fail.
pub fn check_field(
    field_name: &str,
    value: &FieldValue,
    context: Option<&ValidationContext<'_>>,
) -> CheckResult {
    field_name
        .parse::<Field>()
        .and_then(|field| validate(field, value, context))
        .into()
}

// ---------------------------------------------------------------------------
// Whole-network integrity
// ---------------------------------------------------------------------------

/// A committed snapshot that breaks a data-model invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("peer {peer} has address {address} outside subnet {subnet}")]
    OutsideSubnet {
        peer: Uuid,
        address: Ipv4Addr,
        subnet: String,
    },

    #[error("address {address} is shared by peers {first} and {second}")]
    DuplicateAddress {
        address: Ipv4Addr,
        first: Uuid,
        second: Uuid,
    },

    #[error("peer {peer} has the subnet's network address {address}")]
    NetworkAddress { peer: Uuid, address: Ipv4Addr },

    #[error("peer {peer} has the subnet's broadcast address {address}")]
    BroadcastAddress { peer: Uuid, address: Ipv4Addr },

    #[error("connection {connection} references unknown peer {peer}")]
    UnknownPeer { connection: ConnectionId, peer: Uuid },

    #[error("connection {0} joins a peer to itself")]
    SelfConnection(ConnectionId),
}

/// Verify that addresses are unique, inside the subnet and not its network or
/// broadcast address, and that every connection joins two distinct known
/// peers. Peers and connections are checked in id order so the
/// reported violation is stable.
#[tracing::instrument(skip(network), fields(network = %network.identifier))]
pub fn check_network(network: &Network) -> Result<(), IntegrityError> {
    let mut peers: Vec<_> = network.peers.iter().collect();
    peers.sort_by_key(|(id, _)| **id);

    let mut seen: BTreeMap<Ipv4Addr, Uuid> = BTreeMap::new();
    for (id, peer) in peers {
        if !network.subnet.contains(peer.address) {
            return Err(IntegrityError::OutsideSubnet {
                peer: *id,
                address: peer.address,
                subnet: network.subnet.to_string(),
            });
        }
        if network.subnet.prefix() < 31 {
            if peer.address == network.subnet.network() {
                return Err(IntegrityError::NetworkAddress { peer: *id, address: peer.address });
            }
            if peer.address == network.subnet.broadcast() {
                return Err(IntegrityError::BroadcastAddress { peer: *id, address: peer.address });
            }
        }
        if let Some(first) = seen.insert(peer.address, *id) {
            return Err(IntegrityError::DuplicateAddress {
                address: peer.address,
                first,
                second: *id,
            });
        }
    }

    let mut connections: Vec<_> = network.connections.keys().collect();
    connections.sort();
    for connection in connections {
        if connection.is_self_connection() {
            return Err(IntegrityError::SelfConnection(*connection));
        }
        let (a, b) = connection.peers();
        for peer in [a, b] {
            if !network.peers.contains_key(&peer) {
                return Err(IntegrityError::UnknownPeer { connection: *connection, peer });
            }
        }
    }

    debug!(
        peer_count = network.peers.len(),
        connection_count = network.connections.len(),
        "network is consistent"
    );
    Ok(())
}
