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

//! Canonical, order-independent identifiers for peer pairs.
//!
//! A connection is keyed by `"<greater>*<lesser>"`. Peer ids are UUIDs, whose
//! canonical lowercase hyphenated text orders the same way as their bytes, so
//! comparing [`Uuid`] values is the lexicographic comparison of their strings.
//! `*` never occurs in a UUID, which makes the encoding reversible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Separator between the two peer ids.
pub const SEPARATOR: char = '*';

/// Errors from parsing a connection id string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionIdError {
    /// The string does not contain exactly one separator.
    #[error("connection id must be two peer ids joined by '*': {0}")]
    Malformed(String),

    /// One half is not a peer id.
    #[error("connection id contains an invalid peer id: {0}")]
    InvalidPeerId(String),

    /// Both halves name the same peer.
    #[error("connection id joins peer {0} to itself")]
    SelfConnection(Uuid),
}

/// An unordered pair of peer ids, stored greater-first.
///
/// Every constructor canonicalizes, so `ConnectionId::new(x, y)` and
/// `ConnectionId::new(y, x)` compare and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConnectionId {
    a: Uuid,
    b: Uuid,
}

impl ConnectionId {
    /// The id of the connection between `x` and `y`, in either order.
    pub fn new(x: Uuid, y: Uuid) -> Self {
        if x > y { Self { a: x, b: y } } else { Self { a: y, b: x } }
    }

    /// The greater peer id (the `a` side).
    pub fn a(&self) -> Uuid {
        self.a
    }

    /// The lesser peer id (the `b` side).
    pub fn b(&self) -> Uuid {
        self.b
    }

    /// Both peer ids, `a` first.
    pub fn peers(&self) -> (Uuid, Uuid) {
        (self.a, self.b)
    }

    /// Whether both ends are the same peer. Only reachable through
    /// [`ConnectionId::new`]; parsing rejects it.
    pub fn is_self_connection(&self) -> bool {
        self.a == self.b
    }

    /// Whether `peer` is one of the two ends.
    pub fn contains(&self, peer: Uuid) -> bool {
        self.a == peer || self.b == peer
    }

    /// The end opposite `peer`, or `None` if `peer` is not an end.
    pub fn other(&self, peer: Uuid) -> Option<Uuid> {
        if self.a == peer {
            Some(self.b)
        } else if self.b == peer {
            Some(self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.a, self.b)
    }
}

impl FromStr for ConnectionId {
    type Err = ConnectionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(SEPARATOR)
            .filter(|(_, rest)| !rest.contains(SEPARATOR))
            .ok_or_else(|| ConnectionIdError::Malformed(s.to_string()))?;
        let parse = |half: &str| {
            Uuid::parse_str(half).map_err(|_| ConnectionIdError::InvalidPeerId(half.to_string()))
        };
        let (a, b) = (parse(a)?, parse(b)?);
        if a == b {
            return Err(ConnectionIdError::SelfConnection(a));
        }
        Ok(Self::new(a, b))
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ConnectionIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// The canonical connection id string for two peers.
pub fn connection_id(x: Uuid, y: Uuid) -> String {
    ConnectionId::new(x, y).to_string()
}

/// The two peers named by a connection id string, greater id first.
pub fn peers_of(connection_id: &str) -> Result<(Uuid, Uuid), ConnectionIdError> {
    connection_id.parse::<ConnectionId>().map(|id| id.peers())
}
