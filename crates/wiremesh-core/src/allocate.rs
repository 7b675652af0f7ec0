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

use std::collections::HashSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use tracing::{debug, warn};
use wiremesh_types::Network;

fn ip_to_u32(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

fn u32_to_ip(n: u32) -> Ipv4Addr {
    Ipv4Addr::from(n)
}

/// Addresses the allocator may hand out from `subnet`, ascending.
///
/// The scan starts at the masked network address and skips anything whose
/// last octet is `0` or `255`. That rule is octet-based, not prefix-based: a
/// /30 still yields its network and broadcast addresses unless they happen to
/// end in `.0`/`.255`, and a /25 loses only one of its two edges.
pub fn candidates(subnet: Ipv4Network) -> impl Iterator<Item = Ipv4Addr> {
    let start = ip_to_u32(subnet.network()) as u64;
    let size = 1u64 << (32 - u32::from(subnet.prefix()));
    (start..start + size)
        .map(|n| u32_to_ip(n as u32))
        .filter(|ip| !matches!(ip.octets()[3], 0 | 255))
}

/// The first candidate in `subnet` that is not in `taken`.
pub fn first_free(subnet: Ipv4Network, taken: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
    candidates(subnet).find(|ip| !taken.contains(ip))
}

/// Addresses held at `now`: every peer's address plus unexpired leases.
pub fn taken_addresses(network: &Network, now: DateTime<Utc>) -> HashSet<Ipv4Addr> {
    let peers = network.peers.values().map(|p| p.address);
    let leased = network
        .leases
        .iter()
        .filter(|lease| lease.is_active(now))
        .map(|lease| lease.address);
    peers.chain(leased).collect()
}

/// The lowest free address in the network, or `None` when the subnet is full.
pub fn next_available_address(network: &Network) -> Option<Ipv4Addr> {
    next_available_address_at(network, Utc::now())
}

/// [`next_available_address`] with lease expiry judged at `now`.
#[tracing::instrument(skip(network), fields(network = %network.identifier, subnet = %network.subnet))]
pub fn next_available_address_at(network: &Network, now: DateTime<Utc>) -> Option<Ipv4Addr> {
    let taken = taken_addresses(network, now);
    debug!(taken = taken.len(), "scanning subnet for a free address");

    let found = first_free(network.subnet, &taken);
    match found {
        Some(address) => debug!(%address, "found free address"),
        None => warn!("no available addresses in this network"),
    }
    found
}
