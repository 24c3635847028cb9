//! BSM-mediated entanglement generation.
//!
//! Two `Generation` instances pair across a hop, one per router, with the
//! BSM middle node as referee. The right-facing side initiates pairing
//! (primary); the left-facing side parks until the request arrives. Once
//! paired, the sides negotiate an emission round, each sends a trigger to
//! the middle, and the middle's single verdict finalizes both memories
//! symmetrically: ENTANGLED at raw fidelity on success, RAW on failure.
//! Failed attempts retry implicitly when the rule re-fires.

use tracing::{debug, trace};

use crate::ids::{MemoryRef, NodeId, ProtocolId};
use crate::message::{BsmTrigger, GenerationMessage, Message};
use crate::network::Ctx;
use crate::node::RouterNode;
use crate::protocols::ProtocolKind;

/// Progress of one generation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    /// Spawned; primary has requested pairing, secondary is parked.
    Created,
    /// Counterpart known; negotiation in flight.
    Paired,
    /// Emission trigger sent; awaiting the middle's verdict.
    WaitingMeas,
}

/// One side of a generation attempt.
#[derive(Debug)]
pub struct Generation {
    /// Local memory being entangled.
    pub memory: usize,
    /// BSM node mediating the hop.
    pub middle: NodeId,
    /// Router on the other side of the hop.
    pub peer: NodeId,
    /// Whether this side initiates pairing and negotiation.
    pub primary: bool,
    /// Counterpart instance, known after pairing.
    pub peer_protocol: Option<ProtocolId>,
    /// Counterpart memory, known after pairing.
    pub peer_memory: Option<MemoryRef>,
    /// Progress marker.
    pub stage: GenerationStage,
}

impl Generation {
    /// Creates an unpaired instance.
    pub fn new(memory: usize, middle: NodeId, peer: NodeId, primary: bool) -> Self {
        Self {
            memory,
            middle,
            peer,
            primary,
            peer_protocol: None,
            peer_memory: None,
            stage: GenerationStage::Created,
        }
    }
}

impl RouterNode {
    /// Handles generation traffic addressed to this node.
    pub(crate) fn handle_generation(
        &mut self,
        from: NodeId,
        message: GenerationMessage,
        ctx: &mut Ctx<'_>,
    ) {
        match message {
            GenerationMessage::Negotiate {
                to_protocol,
                from_protocol,
            } => {
                let Some(entry) = self.protocols.get_mut(&to_protocol) else {
                    trace!(node = %self.name, %to_protocol, "negotiate for missing instance");
                    return;
                };
                let ProtocolKind::Generation(generation) = &mut entry.kind else {
                    panic!("negotiate addressed to a non-generation instance");
                };
                generation.stage = GenerationStage::WaitingMeas;
                let middle = generation.middle;
                ctx.send(
                    self.id,
                    from,
                    Message::Generation(GenerationMessage::NegotiateAck {
                        to_protocol: from_protocol,
                    }),
                );
                // Both triggers of a round share the primary's key.
                ctx.send(
                    self.id,
                    middle,
                    Message::BsmTrigger(BsmTrigger {
                        key: (from, from_protocol),
                        reply: (self.id, to_protocol),
                    }),
                );
            }
            GenerationMessage::NegotiateAck { to_protocol } => {
                let Some(entry) = self.protocols.get_mut(&to_protocol) else {
                    trace!(node = %self.name, %to_protocol, "ack for missing instance");
                    return;
                };
                let ProtocolKind::Generation(generation) = &mut entry.kind else {
                    panic!("negotiate-ack addressed to a non-generation instance");
                };
                generation.stage = GenerationStage::WaitingMeas;
                let middle = generation.middle;
                ctx.send(
                    self.id,
                    middle,
                    Message::BsmTrigger(BsmTrigger {
                        key: (self.id, to_protocol),
                        reply: (self.id, to_protocol),
                    }),
                );
            }
            GenerationMessage::MeasResult {
                to_protocol,
                success,
            } => self.finalize_generation(to_protocol, success, ctx),
        }
    }

    fn finalize_generation(&mut self, protocol: ProtocolId, success: bool, ctx: &mut Ctx<'_>) {
        let Some(entry) = self.protocols.remove(&protocol) else {
            trace!(node = %self.name, %protocol, "measurement for missing instance");
            return;
        };
        let ProtocolKind::Generation(generation) = entry.kind else {
            panic!("measurement addressed to a non-generation instance");
        };
        self.rules.unregister_protocol(entry.rule, protocol);
        self.memories.detach(generation.memory);
        if success {
            let peer_memory = generation
                .peer_memory
                .expect("paired generation knows its counterpart memory");
            self.memories.set_entangled(
                generation.memory,
                peer_memory,
                ctx.config.memo_fidelity,
                ctx.now(),
            );
            debug!(
                node = %self.name,
                memory = generation.memory,
                peer = %peer_memory,
                "entanglement generated"
            );
        } else {
            self.memories.set_raw(generation.memory);
        }
        self.evaluate(generation.memory, ctx);
    }
}
