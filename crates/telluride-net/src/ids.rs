//! Integer identifiers used throughout the network layer.
//!
//! Node names are strings at the topology boundary and in reporting; hot
//! paths carry interned ids. All ids are cheap `Copy` values.

use std::fmt::{self, Display};

/// Interned node identifier. The string ↔ id table lives on the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Index into per-node arrays.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of an admitted (or in-flight) reservation.
///
/// Reservations are interned in the world's arena at the initiator;
/// messages and time-cards carry the id, never the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReservationId(u32);

impl ReservationId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of a transient protocol instance, unique per node and never
/// reused, so a message addressed to a torn-down instance misses cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolId(u64);

impl ProtocolId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identifier of an installed rule, unique per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(u64);

impl RuleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule{}", self.0)
    }
}

/// Stable reference to one memory slot on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRef {
    /// Owning node.
    pub node: NodeId,
    /// Index into the owner's memory array.
    pub index: usize,
}

impl Display for MemoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.m{}", self.node, self.index)
    }
}
