//! Classical messages exchanged between protocol instances.
//!
//! The messaging fabric is lossless by modelling choice: a send schedules a
//! delivery event at `now + classical_delay(source, destination)` and the
//! timeline's FIFO-stable ordering keeps same-pair messages in send order.
//!
//! Every message names its target: reservation messages address the peer
//! node's reservation protocol, pairing messages address the resource
//! layer, and the remaining kinds address a specific protocol instance by
//! id. A message whose target instance has since been torn down misses
//! cleanly and is dropped with a debug trace.

use crate::ids::{MemoryRef, NodeId, ProtocolId, ReservationId};
use crate::reservation::QCap;

/// Top-level classical message.
#[derive(Debug, Clone)]
pub enum Message {
    /// Reservation protocol traffic (REQUEST / REJECT / APPROVE).
    Reservation(RsvpMessage),
    /// Resource-layer pairing handshake.
    Pairing(PairingMessage),
    /// Entanglement-generation protocol traffic.
    Generation(GenerationMessage),
    /// Purification outcome commitment.
    Purification(PurificationMessage),
    /// Swapping results from a middle node.
    Swapping(SwappingMessage),
    /// Emission trigger from a router to its BSM middle node.
    BsmTrigger(BsmTrigger),
}

/// Reservation protocol message.
#[derive(Debug, Clone)]
pub struct RsvpMessage {
    /// Reservation the message concerns.
    pub reservation: ReservationId,
    /// Phase payload.
    pub kind: RsvpKind,
}

/// The three phases of the reservation protocol.
#[derive(Debug, Clone)]
pub enum RsvpKind {
    /// Forwarded toward the responder, accumulating the path.
    Request {
        /// Path accumulator; one token per node traversed so far.
        qcaps: Vec<QCap>,
    },
    /// Unwinds tentative reservations back toward the initiator.
    Reject,
    /// Propagates back toward the initiator installing rules.
    Approve {
        /// Final path fixed by the responder.
        path: Vec<NodeId>,
    },
}

/// Pairing handshake between rule-spawned protocol instances.
#[derive(Debug, Clone)]
pub enum PairingMessage {
    /// Asks the peer's resource layer to find the counterpart instance.
    Request {
        /// Requesting protocol instance.
        ini_protocol: ProtocolId,
        /// Memories the requesting instance holds.
        ini_memories: Vec<MemoryRef>,
        /// Reservation the requesting rule belongs to.
        reservation: ReservationId,
        /// How to recognize the counterpart among waiting instances.
        matcher: Matcher,
    },
    /// Answer to a pairing request.
    Response {
        /// The requesting instance the answer is for.
        to_protocol: ProtocolId,
        /// Whether a counterpart was found.
        approved: bool,
        /// The counterpart instance when approved.
        paired: Option<ProtocolId>,
        /// Memories held by the counterpart when approved.
        paired_memories: Vec<MemoryRef>,
    },
    /// Cancels a previously approved pairing; the receiver releases its
    /// instance so the rule can re-fire.
    Abort {
        /// Instance to release.
        to_protocol: ProtocolId,
    },
}

/// Counterpart resolver carried inside a pairing request.
///
/// Expressed as tagged data rather than a predicate function so it can
/// travel in a message and stay inspectable.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// A generation instance whose configured peer is the requesting node,
    /// under the same reservation.
    GenerationPeer {
        /// Node the waiting instance must point at.
        peer: NodeId,
        /// Reservation the waiting instance must belong to.
        reservation: ReservationId,
    },
    /// The pair of passive purification instances holding the two remote
    /// halves of the requesting side's kept and measured memories.
    PurificationPeer {
        /// Remote half of the kept memory.
        kept_remote: MemoryRef,
        /// Remote half of the measured memory.
        meas_remote: MemoryRef,
    },
    /// The swapping endpoint holding the given memory.
    SwappingPeer {
        /// Memory the waiting endpoint instance must hold.
        remote_memory: MemoryRef,
    },
}

/// Entanglement-generation protocol traffic.
#[derive(Debug, Clone)]
pub enum GenerationMessage {
    /// Primary side proposes an emission round.
    Negotiate {
        /// Secondary instance being addressed.
        to_protocol: ProtocolId,
        /// Primary instance, for the acknowledgement.
        from_protocol: ProtocolId,
    },
    /// Secondary side confirms; both sides emit.
    NegotiateAck {
        /// Primary instance being addressed.
        to_protocol: ProtocolId,
    },
    /// Bell-state measurement verdict from the middle node.
    MeasResult {
        /// Generation instance being addressed.
        to_protocol: ProtocolId,
        /// Whether the measurement heralded a pair.
        success: bool,
    },
}

/// Purification outcome committed by the active side.
#[derive(Debug, Clone)]
pub enum PurificationMessage {
    /// Both sides apply the same verdict.
    Outcome {
        /// Passive instance being addressed.
        to_protocol: ProtocolId,
        /// Whether purification succeeded.
        success: bool,
    },
}

/// Swapping traffic from the middle's `SwappingA` to endpoint `SwappingB`s.
#[derive(Debug, Clone)]
pub enum SwappingMessage {
    /// Result of the middle's Bell-state measurement.
    Result {
        /// Endpoint instance being addressed.
        to_protocol: ProtocolId,
        /// Whether the swap succeeded.
        success: bool,
        /// New remote half of the endpoint's pair on success.
        new_remote: Option<MemoryRef>,
        /// New pair fidelity on success.
        new_fidelity: f64,
    },
}

/// Emission trigger sent by a generation instance to its BSM middle node.
///
/// The middle pairs the two triggers of a round by their shared key (the
/// primary instance), draws the verdict once, and answers both sides.
#[derive(Debug, Clone)]
pub struct BsmTrigger {
    /// Round key: the primary generation instance.
    pub key: (NodeId, ProtocolId),
    /// Where the verdict for this side should go.
    pub reply: (NodeId, ProtocolId),
}
