//! Bell-state-measurement middle nodes.
//!
//! A BSM node has no memories and runs no rules. It pairs the two emission
//! triggers of a generation round by their shared key, draws the verdict
//! once from its own RNG with the per-link probability the topology
//! supplies, and answers both sides. A trigger whose partner never arrives
//! (its protocol expired mid-round) parks harmlessly.

use std::collections::HashMap;

use telluride_sim::SimRng;
use tracing::trace;

use crate::ids::{NodeId, ProtocolId};
use crate::message::{GenerationMessage, Message};
use crate::network::Ctx;

/// Middle node performing Bell-state measurements.
pub struct BsmNode {
    /// Own node id.
    pub id: NodeId,
    name: String,
    rng: SimRng,
    /// First trigger of each round, keyed by the primary instance.
    pending: HashMap<(NodeId, ProtocolId), (NodeId, ProtocolId)>,
}

impl BsmNode {
    /// Creates a BSM node with its forked RNG stream.
    pub fn new(id: NodeId, name: String, rng: SimRng) -> Self {
        Self {
            id,
            name,
            rng,
            pending: HashMap::new(),
        }
    }

    /// Handles a message delivered to this node.
    ///
    /// # Panics
    ///
    /// Panics on any non-trigger message; nothing else ever addresses a
    /// BSM node.
    pub(crate) fn handle_message(&mut self, _from: NodeId, message: Message, ctx: &mut Ctx<'_>) {
        let Message::BsmTrigger(trigger) = message else {
            panic!("unexpected message at BSM node {}", self.name);
        };
        if let Some(first) = self.pending.remove(&trigger.key) {
            let probability = ctx.topology.bsm_success_prob(self.id);
            let success = self.rng.chance(probability);
            trace!(node = %self.name, success, probability, "BSM round resolved");
            for (node, protocol) in [first, trigger.reply] {
                ctx.send(
                    self.id,
                    node,
                    Message::Generation(GenerationMessage::MeasResult {
                        to_protocol: protocol,
                        success,
                    }),
                );
            }
        } else {
            self.pending.insert(trigger.key, trigger.reply);
        }
    }
}
