//! Per-node quantum memory state.
//!
//! Every memory is exclusively owned by its node. Rules and time-cards hold
//! the memory *index*; a transient protocol marks itself attached for the
//! duration it drives the memory. All state mutation goes through the
//! manager so the owning node can re-evaluate its rules after each change.

use telluride_sim::Time;
use tracing::trace;

use crate::ids::{MemoryRef, ProtocolId};

/// Lifecycle states of a quantum memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    /// Empty and available for entanglement generation.
    Raw,
    /// Held by a protocol mid-attempt.
    Occupied,
    /// Shares an entangled pair with a remote memory.
    Entangled,
    /// Coherence lapsed; not eligible for any rule.
    Expired,
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MemoryState::Raw => "RAW",
            MemoryState::Occupied => "OCCUPIED",
            MemoryState::Entangled => "ENTANGLED",
            MemoryState::Expired => "EXPIRED",
        };
        f.write_str(label)
    }
}

/// Observable state of one memory slot.
#[derive(Debug, Clone)]
pub struct MemoryInfo {
    /// Index in the owning node's memory array.
    pub index: usize,
    /// Current lifecycle state.
    pub state: MemoryState,
    /// Remote half of the pair when entangled.
    pub remote: Option<MemoryRef>,
    /// Pair fidelity; zero when not entangled.
    pub fidelity: f64,
    /// Simulation time the current pair was established.
    pub entangle_time: Option<Time>,
    /// Protocol currently driving this memory, if any.
    pub attached: Option<ProtocolId>,
}

impl MemoryInfo {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: MemoryState::Raw,
            remote: None,
            fidelity: 0.0,
            entangle_time: None,
            attached: None,
        }
    }

    /// Returns `true` when no protocol is driving this memory.
    pub fn is_free(&self) -> bool {
        self.attached.is_none()
    }
}

/// Ordered array of memories on one node.
pub struct MemoryManager {
    memories: Vec<MemoryInfo>,
}

impl MemoryManager {
    /// Creates a manager with `size` raw memories.
    pub fn new(size: usize) -> Self {
        Self {
            memories: (0..size).map(MemoryInfo::new).collect(),
        }
    }

    /// Number of memories.
    pub fn len(&self) -> usize {
        self.memories.len()
    }

    /// Returns `true` when the node has no memories.
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Borrows one memory.
    pub fn get(&self, index: usize) -> &MemoryInfo {
        &self.memories[index]
    }

    /// Iterates all memories in index order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryInfo> {
        self.memories.iter()
    }

    /// Marks a memory occupied by an in-flight attempt.
    pub fn set_occupied(&mut self, index: usize) {
        trace!(memory = index, "memory -> OCCUPIED");
        self.memories[index].state = MemoryState::Occupied;
    }

    /// Records a fresh entangled pair.
    ///
    /// The signature enforces the entanglement invariant: an ENTANGLED
    /// memory always has a remote half and an establishment time.
    pub fn set_entangled(&mut self, index: usize, remote: MemoryRef, fidelity: f64, now: Time) {
        trace!(memory = index, %remote, fidelity, "memory -> ENTANGLED");
        let memory = &mut self.memories[index];
        memory.state = MemoryState::Entangled;
        memory.remote = Some(remote);
        memory.fidelity = fidelity;
        memory.entangle_time = Some(now);
    }

    /// Updates the fidelity of an entangled memory in place.
    pub fn set_fidelity(&mut self, index: usize, fidelity: f64) {
        debug_assert_eq!(self.memories[index].state, MemoryState::Entangled);
        self.memories[index].fidelity = fidelity;
    }

    /// Resets a memory to RAW, clearing all pair information.
    pub fn set_raw(&mut self, index: usize) {
        trace!(memory = index, "memory -> RAW");
        let memory = &mut self.memories[index];
        memory.state = MemoryState::Raw;
        memory.remote = None;
        memory.fidelity = 0.0;
        memory.entangle_time = None;
    }

    /// Attaches a protocol to a memory.
    ///
    /// # Panics
    ///
    /// Panics if the memory is already attached; rules must not double-bind.
    pub fn attach(&mut self, index: usize, protocol: ProtocolId) {
        let memory = &mut self.memories[index];
        assert!(
            memory.attached.is_none(),
            "memory {index} already attached to {}",
            memory.attached.expect("checked above")
        );
        memory.attached = Some(protocol);
    }

    /// Detaches whatever protocol holds the memory.
    pub fn detach(&mut self, index: usize) {
        self.memories[index].attached = None;
    }
}
