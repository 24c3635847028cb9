//! BBPSSW entanglement purification.
//!
//! Purification consumes two same-fidelity pairs with the same remote node
//! and, on success, lifts the kept pair's fidelity while the measured pair
//! resets to RAW; on failure both reset. The side holding the left-facing
//! memories of a hop is *active*: it draws the verdict once its pairing is
//! approved and ships it to the passive side, so both halves commit the
//! same outcome. The passive side parks one instance per eligible memory;
//! the active side's matcher merges the two that correspond to its kept
//! and measured pair.

use tracing::{debug, trace};

use crate::ids::{NodeId, ProtocolId};
use crate::message::PurificationMessage;
use crate::network::Ctx;
use crate::node::RouterNode;
use crate::protocols::ProtocolKind;

/// Post-purification fidelity of the kept pair (canonical BBPSSW).
pub fn purified_fidelity(f: f64) -> f64 {
    let g = (1.0 - f) / 3.0;
    (f * f + g * g) / (f * f + 2.0 * f * g + 5.0 * g * g)
}

/// Success probability of a purification attempt (canonical BBPSSW).
pub fn success_probability(f: f64) -> f64 {
    let g = (1.0 - f) / 3.0;
    f * f + 2.0 * f * g + 5.0 * g * g
}

/// One side of a purification attempt.
#[derive(Debug)]
pub struct Purification {
    /// Memory whose pair survives on success.
    pub kept: usize,
    /// Memory measured away; absent while a passive instance is parked.
    pub meas: Option<usize>,
    /// Whether this side draws the verdict.
    pub active: bool,
    /// Counterpart instance, known after pairing.
    pub peer_protocol: Option<ProtocolId>,
}

impl Purification {
    /// Creates the active side over a kept/measured pair.
    pub fn active(kept: usize, meas: usize) -> Self {
        Self {
            kept,
            meas: Some(meas),
            active: true,
            peer_protocol: None,
        }
    }

    /// Creates a parked passive instance holding one memory.
    pub fn passive(kept: usize) -> Self {
        Self {
            kept,
            meas: None,
            active: false,
            peer_protocol: None,
        }
    }
}

impl RouterNode {
    /// Handles the outcome commitment on the passive side.
    pub(crate) fn handle_purification(
        &mut self,
        _from: NodeId,
        message: PurificationMessage,
        ctx: &mut Ctx<'_>,
    ) {
        let PurificationMessage::Outcome {
            to_protocol,
            success,
        } = message;
        let Some(entry) = self.protocols.remove(&to_protocol) else {
            trace!(node = %self.name, %to_protocol, "outcome for missing instance");
            return;
        };
        let ProtocolKind::Purification(purification) = entry.kind else {
            panic!("purification outcome addressed to a non-purification instance");
        };
        self.rules.unregister_protocol(entry.rule, to_protocol);
        let meas = purification
            .meas
            .expect("merged passive purification holds a measured memory");
        self.apply_purification(purification.kept, meas, success, ctx);
    }

    /// Applies a purification verdict to the local kept/measured pair.
    ///
    /// Both sides call this with the same verdict and the same pre-attempt
    /// fidelity, so the surviving halves stay symmetric.
    pub(crate) fn apply_purification(
        &mut self,
        kept: usize,
        meas: usize,
        success: bool,
        ctx: &mut Ctx<'_>,
    ) {
        self.memories.detach(kept);
        self.memories.detach(meas);
        if success {
            let fidelity = self.memories.get(kept).fidelity;
            let lifted = purified_fidelity(fidelity);
            self.memories.set_fidelity(kept, lifted);
            debug!(node = %self.name, memory = kept, fidelity, lifted, "purification succeeded");
        } else {
            self.memories.set_raw(kept);
        }
        self.memories.set_raw(meas);
        self.evaluate(kept, ctx);
        self.evaluate(meas, ctx);
    }
}
