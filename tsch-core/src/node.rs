/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node identity: link-layer addresses, node ids and dense node indices.
//!
//! ```text
//! LinkAddr (EUI-64)  ──►  node id (u16, 1-based)  ──►  dense index (u16)
//! ```
//!
//! The dense index is what Orchestra hashes onto timeslots.  It is the
//! position of the node in the deployment table, optionally passed through a
//! multiplicative shuffle so that neighbouring ids do not land on adjacent
//! slots.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

/// Length of an IEEE 802.15.4 extended address.
pub const LINKADDR_SIZE: usize = 8;

// ── LinkAddr ──────────────────────────────────────────────────────────────────

/// An 8-byte link-layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LinkAddr(pub [u8; LINKADDR_SIZE]);

impl LinkAddr {
    /// The all-zero address, also used as the TSCH broadcast address.
    pub const NULL: LinkAddr = LinkAddr([0; LINKADDR_SIZE]);

    /// Address with only the last byte set, as used by simulated motes.
    pub const fn from_node_id(id: u8) -> Self {
        LinkAddr([0, 0, 0, 0, 0, 0, 0, id])
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// The 16-bit short address formed by the last two bytes.
    fn short(&self) -> [u8; 2] {
        [self.0[6], self.0[7]]
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Error returned when parsing a colon-separated MAC string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid link-layer address '{0}' (expected 8 colon-separated hex bytes)")]
pub struct ParseLinkAddrError(pub String);

impl FromStr for LinkAddr {
    type Err = ParseLinkAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; LINKADDR_SIZE];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseLinkAddrError(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseLinkAddrError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseLinkAddrError(s.to_string()));
        }
        Ok(LinkAddr(bytes))
    }
}

// ── Index lookup seam ─────────────────────────────────────────────────────────

/// Identity lookups Orchestra needs from the rest of the stack.
pub trait NodeIndexLookup {
    /// Node id for a link-layer address, `None` for broadcast/unknown.
    fn id_from_addr(&self, addr: &LinkAddr) -> Option<u16>;

    /// Dense index for a node id, `None` if the id is unknown.
    fn index_from_id(&self, id: u16) -> Option<u16>;

    /// Convenience: address → id → index.
    fn index_from_addr(&self, addr: &LinkAddr) -> Option<u16> {
        self.id_from_addr(addr).and_then(|id| self.index_from_id(id))
    }
}

// ── NodeDirectory ─────────────────────────────────────────────────────────────

/// Multiplicative index shuffle: `index * multiplier mod modulus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexShuffle {
    pub multiplier: u16,
    pub modulus: u16,
}

impl IndexShuffle {
    fn apply(&self, index: u16) -> u16 {
        if self.modulus == 0 {
            return index;
        }
        ((index as u32 * self.multiplier as u32) % self.modulus as u32) as u16
    }
}

/// Deployment table mapping node ids to MAC addresses.
///
/// With an empty table the directory falls back to simulation addressing:
/// the node id is the last address byte.
#[derive(Debug, Clone, Default)]
pub struct NodeDirectory {
    /// `(id, mac)` in deployment order; the position is the raw index.
    entries: Vec<(u16, LinkAddr)>,
    shuffle: Option<IndexShuffle>,
}

impl NodeDirectory {
    pub fn new(entries: Vec<(u16, LinkAddr)>, shuffle: Option<IndexShuffle>) -> Self {
        debug!(
            node_count = entries.len(),
            shuffle = ?shuffle,
            "node directory initialised"
        );
        Self { entries, shuffle }
    }

    fn map_index(&self, raw: u16) -> u16 {
        match &self.shuffle {
            Some(s) => s.apply(raw),
            None => raw,
        }
    }

    /// MAC address registered for `id`.
    pub fn addr_from_id(&self, id: u16) -> Option<LinkAddr> {
        if self.entries.is_empty() {
            return u8::try_from(id).ok().filter(|&b| b != 0).map(LinkAddr::from_node_id);
        }
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, addr)| *addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NodeIndexLookup for NodeDirectory {
    fn id_from_addr(&self, addr: &LinkAddr) -> Option<u16> {
        if addr.is_null() {
            return None;
        }
        if self.entries.is_empty() {
            return match addr.0[7] {
                0 => None,
                id => Some(id as u16),
            };
        }
        // Short addresses are assumed unique network-wide
        self.entries
            .iter()
            .find(|(_, mac)| mac.short() == addr.short())
            .map(|(id, _)| *id)
    }

    fn index_from_id(&self, id: u16) -> Option<u16> {
        if self.entries.is_empty() {
            return Some(self.map_index(id));
        }
        self.entries
            .iter()
            .position(|(entry_id, _)| *entry_id == id)
            .and_then(|pos| u16::try_from(pos).ok())
            .map(|raw| self.map_index(raw))
    }
}
