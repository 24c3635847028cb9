//! Transient entanglement sub-protocols.
//!
//! A protocol instance is spawned by a rule firing, holds its memories
//! exclusively while it runs, and is torn down when it finalizes, when its
//! pairing is refused, or when its rule expires. Instances are addressed
//! by a per-node id that is never reused.

mod generation;
mod purification;
mod swapping;

pub use generation::{Generation, GenerationStage};
pub use purification::{Purification, purified_fidelity, success_probability};
pub use swapping::{SwappingA, SwappingB};

use crate::ids::{ProtocolId, ReservationId, RuleId};

/// A live protocol instance and its owning rule.
#[derive(Debug)]
pub struct ProtocolEntry {
    /// Instance id, unique per node.
    pub id: ProtocolId,
    /// Rule that spawned the instance.
    pub rule: RuleId,
    /// Reservation the rule belongs to.
    pub reservation: ReservationId,
    /// Kind-specific state machine.
    pub kind: ProtocolKind,
}

/// The protocol kinds a rule can instantiate.
#[derive(Debug)]
pub enum ProtocolKind {
    /// One side of BSM-mediated entanglement generation.
    Generation(Generation),
    /// One side of BBPSSW purification (active or passive).
    Purification(Purification),
    /// Middle-node swapping.
    SwappingA(SwappingA),
    /// Endpoint swapping, waiting for the middle's verdict.
    SwappingB(SwappingB),
}

impl ProtocolKind {
    /// Memory indices this instance currently holds.
    pub fn memories(&self) -> Vec<usize> {
        match self {
            ProtocolKind::Generation(g) => vec![g.memory],
            ProtocolKind::Purification(p) => match p.meas {
                Some(meas) => vec![p.kept, meas],
                None => vec![p.kept],
            },
            ProtocolKind::SwappingA(a) => vec![a.left, a.right],
            ProtocolKind::SwappingB(b) => vec![b.memory],
        }
    }
}
