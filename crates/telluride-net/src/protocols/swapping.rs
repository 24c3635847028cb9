//! Entanglement swapping.
//!
//! A middle node holding pairs toward both of its halved-path neighbors
//! runs `SwappingA`: it pairs with the `SwappingB` instance parked at each
//! endpoint, draws success once, and ships the verdict to both. Endpoints
//! rewrite their pair's remote half to the opposite endpoint on success or
//! reset to RAW on failure. The middle's two memories always reset.
//!
//! The two halves being swapped may have gone through different histories,
//! so the middle computes the surviving pair's fidelity once, from the
//! weaker half, and sends the same value to both endpoints.

use tracing::{debug, trace};

use crate::ids::{NodeId, ProtocolId};
use crate::message::{Message, SwappingMessage};
use crate::network::Ctx;
use crate::node::RouterNode;
use crate::protocols::ProtocolKind;

/// Middle-node side of a swap.
#[derive(Debug)]
pub struct SwappingA {
    /// Memory entangled toward the left halved-path neighbor.
    pub left: usize,
    /// Memory entangled toward the right halved-path neighbor.
    pub right: usize,
    /// Left endpoint instance and node, known after pairing.
    pub left_peer: Option<(ProtocolId, NodeId)>,
    /// Right endpoint instance and node, known after pairing.
    pub right_peer: Option<(ProtocolId, NodeId)>,
    /// Success probability of the Bell-state measurement.
    pub success_prob: f64,
    /// Fidelity degradation applied by a successful swap.
    pub degradation: f64,
}

impl SwappingA {
    /// Creates a middle-node swap over a left/right memory pair.
    pub fn new(left: usize, right: usize, success_prob: f64, degradation: f64) -> Self {
        Self {
            left,
            right,
            left_peer: None,
            right_peer: None,
            success_prob,
            degradation,
        }
    }
}

/// Endpoint side of a swap: parks until the middle's verdict arrives.
#[derive(Debug)]
pub struct SwappingB {
    /// Memory whose pair the swap rewrites.
    pub memory: usize,
}

impl RouterNode {
    /// Handles a swap verdict at an endpoint.
    pub(crate) fn handle_swapping(
        &mut self,
        _from: NodeId,
        message: SwappingMessage,
        ctx: &mut Ctx<'_>,
    ) {
        let SwappingMessage::Result {
            to_protocol,
            success,
            new_remote,
            new_fidelity,
        } = message;
        let Some(entry) = self.protocols.remove(&to_protocol) else {
            trace!(node = %self.name, %to_protocol, "swap result for missing instance");
            return;
        };
        let ProtocolKind::SwappingB(endpoint) = entry.kind else {
            panic!("swap result addressed to a non-endpoint instance");
        };
        self.rules.unregister_protocol(entry.rule, to_protocol);
        self.memories.detach(endpoint.memory);
        if success {
            let remote = new_remote.expect("successful swap carries the new remote half");
            self.memories
                .set_entangled(endpoint.memory, remote, new_fidelity, ctx.now());
            debug!(
                node = %self.name,
                memory = endpoint.memory,
                remote = %remote,
                fidelity = new_fidelity,
                "swap applied"
            );
        } else {
            self.memories.set_raw(endpoint.memory);
        }
        self.evaluate(endpoint.memory, ctx);
    }

    /// Performs the middle's Bell-state measurement once both endpoints
    /// have accepted the pairing.
    pub(crate) fn perform_swap(&mut self, protocol: ProtocolId, ctx: &mut Ctx<'_>) {
        let entry = self
            .protocols
            .remove(&protocol)
            .expect("swap instance exists when both pairings are approved");
        let ProtocolKind::SwappingA(swap) = entry.kind else {
            panic!("perform_swap on a non-middle instance");
        };
        self.rules.unregister_protocol(entry.rule, protocol);

        let success = self.rng.chance(swap.success_prob);
        let left_info = self.memories.get(swap.left).clone();
        let right_info = self.memories.get(swap.right).clone();
        // The surviving end-to-end pair is only as good as its weaker half.
        let new_fidelity = left_info.fidelity.min(right_info.fidelity) * swap.degradation;

        let (left_pid, left_node) = swap.left_peer.expect("left endpoint paired");
        let (right_pid, right_node) = swap.right_peer.expect("right endpoint paired");
        let left_remote = left_info.remote.expect("left memory entangled");
        let right_remote = right_info.remote.expect("right memory entangled");

        debug!(
            node = %self.name,
            left = swap.left,
            right = swap.right,
            success,
            new_fidelity,
            "swap attempted"
        );

        ctx.send(
            self.id,
            left_node,
            Message::Swapping(SwappingMessage::Result {
                to_protocol: left_pid,
                success,
                new_remote: success.then_some(right_remote),
                new_fidelity,
            }),
        );
        ctx.send(
            self.id,
            right_node,
            Message::Swapping(SwappingMessage::Result {
                to_protocol: right_pid,
                success,
                new_remote: success.then_some(left_remote),
                new_fidelity,
            }),
        );

        // Middle memories always reset after an attempt.
        self.memories.detach(swap.left);
        self.memories.detach(swap.right);
        self.memories.set_raw(swap.left);
        self.memories.set_raw(swap.right);
        self.evaluate(swap.left, ctx);
        self.evaluate(swap.right, ctx);
    }
}
