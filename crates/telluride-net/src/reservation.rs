//! Three-phase reservation protocol and its bookkeeping.
//!
//! A request travels as REQUEST toward the responder, reserving memory
//! time-slots at every hop and accumulating the path in QCap tokens. The
//! responder fixes the path, installs its rules, and answers APPROVE,
//! which installs rules at every hop on the way back to the initiator. A
//! failed admission anywhere answers REJECT, which unwinds the tentative
//! reservations hop by hop. There is no partial success: a request either
//! fully installs along the path or fully unwinds.

use telluride_sim::Time;
use tracing::{debug, warn};

use crate::ids::{NodeId, ReservationId};
use crate::message::{Message, RsvpKind, RsvpMessage};
use crate::network::{Ctx, EventKind, PRIORITY_MEMORY_RESET, PRIORITY_NORMAL, RequestStatus};
use crate::node::RouterNode;
use crate::routing;
use crate::rules::{RESERVATION_RULE_PRIORITY, RuleKind};
use crate::topology::Topology;

/// An admitted (or in-flight) entanglement request. Immutable once created.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Node that created the request.
    pub initiator: NodeId,
    /// Node entanglement is requested with.
    pub responder: NodeId,
    /// Time entanglement should start being attempted (ps).
    pub start_time: Time,
    /// Time resources are released (ps).
    pub end_time: Time,
    /// Number of entangled pairs requested.
    pub memory_size: usize,
    /// Desired end-to-end fidelity.
    pub target_fidelity: f64,
    /// Virtual-link reservations overlap freely on time-cards.
    pub is_virtual: bool,
}

impl Reservation {
    /// Creates a reservation.
    ///
    /// # Panics
    ///
    /// Panics unless `start_time < end_time` and `memory_size >= 1`; the
    /// public request surface validates before constructing.
    pub fn new(
        initiator: NodeId,
        responder: NodeId,
        start_time: Time,
        end_time: Time,
        memory_size: usize,
        target_fidelity: f64,
        is_virtual: bool,
    ) -> Self {
        assert!(start_time < end_time, "reservation window is empty");
        assert!(memory_size >= 1, "reservation requests no memories");
        Self {
            initiator,
            responder,
            start_time,
            end_time,
            memory_size,
            target_fidelity,
            is_virtual,
        }
    }
}

/// Path-accumulator token appended by each node a REQUEST traverses.
#[derive(Debug, Clone)]
pub struct QCap {
    /// Node that appended the token.
    pub node: NodeId,
}

/// Reservation ledger for one memory slot.
///
/// Non-virtual reservations are kept sorted by start time and pairwise
/// time-disjoint; virtual reservations overlap arbitrarily and never block
/// an addition.
#[derive(Debug)]
pub struct MemoryTimeCard {
    /// Index of the memory this card tracks.
    pub memory_index: usize,
    physical: Vec<ReservationId>,
    virtuals: Vec<ReservationId>,
}

impl MemoryTimeCard {
    /// Creates an empty card for one memory.
    pub fn new(memory_index: usize) -> Self {
        Self {
            memory_index,
            physical: Vec::new(),
            virtuals: Vec::new(),
        }
    }

    /// Attempts to add a reservation to this card.
    ///
    /// The insertion position comes from a lower-bound search over the
    /// sorted non-virtual reservations; a candidate overlapping either
    /// neighbor is rejected. Virtual reservations always fit.
    pub fn add(&mut self, id: ReservationId, table: &[Reservation]) -> bool {
        let candidate = &table[id.index()];
        if candidate.is_virtual {
            self.virtuals.push(id);
            return true;
        }
        let position = self
            .physical
            .partition_point(|r| table[r.index()].start_time < candidate.start_time);
        if position > 0 {
            let previous = &table[self.physical[position - 1].index()];
            if previous.end_time >= candidate.start_time {
                return false;
            }
        }
        if position < self.physical.len() {
            let next = &table[self.physical[position].index()];
            if next.start_time <= candidate.end_time {
                return false;
            }
        }
        self.physical.insert(position, id);
        true
    }

    /// Removes a reservation from this card, if present.
    pub fn remove(&mut self, id: ReservationId) -> bool {
        if let Some(position) = self.physical.iter().position(|r| *r == id) {
            self.physical.remove(position);
            return true;
        }
        if let Some(position) = self.virtuals.iter().position(|r| *r == id) {
            self.virtuals.remove(position);
            return true;
        }
        false
    }

    /// Returns `true` when the reservation holds this memory.
    pub fn contains(&self, id: ReservationId) -> bool {
        self.physical.contains(&id) || self.virtuals.contains(&id)
    }

    /// Non-virtual reservations, sorted by start time.
    pub fn physical_reservations(&self) -> &[ReservationId] {
        &self.physical
    }

    /// Virtual reservations, in insertion order.
    pub fn virtual_reservations(&self) -> &[ReservationId] {
        &self.virtuals
    }
}

/// Per-node reservation protocol state.
pub struct RsvpState {
    /// One card per memory, in memory index order.
    pub timecards: Vec<MemoryTimeCard>,
    /// Success probability configured into spawned `SwappingA` instances.
    pub es_success_prob: f64,
    /// Degradation configured into spawned `SwappingA` instances.
    pub es_degradation: f64,
    /// Every reservation this node has approved.
    pub accepted: Vec<ReservationId>,
}

impl RsvpState {
    /// Creates the state for a node with `memo_size` memories.
    pub fn new(memo_size: usize, es_success_prob: f64, es_degradation: f64) -> Self {
        Self {
            timecards: (0..memo_size).map(MemoryTimeCard::new).collect(),
            es_success_prob,
            es_degradation,
            accepted: Vec::new(),
        }
    }

    /// Sets the swapping success probability for rules created later.
    pub fn set_swapping_success_rate(&mut self, prob: f64) {
        assert!((0.0..=1.0).contains(&prob));
        self.es_success_prob = prob;
    }

    /// Sets the swapping degradation for rules created later.
    pub fn set_swapping_degradation(&mut self, degradation: f64) {
        assert!((0.0..=1.0).contains(&degradation));
        self.es_degradation = degradation;
    }

    /// Attempts to reserve `required` memories for the reservation.
    ///
    /// Cards are tried in index order; on shortfall every tentative add is
    /// rolled back and the call fails.
    pub fn schedule(
        &mut self,
        id: ReservationId,
        table: &[Reservation],
        required: usize,
    ) -> bool {
        let mut added = Vec::new();
        for card in &mut self.timecards {
            if card.add(id, table) {
                added.push(card.memory_index);
                if added.len() == required {
                    return true;
                }
            }
        }
        for index in added {
            self.timecards[index].remove(id);
        }
        false
    }

    /// Memory indices reserved for the reservation, in reservation order.
    pub fn reserved_indices(&self, id: ReservationId) -> Vec<usize> {
        self.timecards
            .iter()
            .filter(|card| card.contains(id))
            .map(|card| card.memory_index)
            .collect()
    }

    /// Removes the reservation from every card it appears on.
    pub fn remove_everywhere(&mut self, id: ReservationId) {
        for card in &mut self.timecards {
            card.remove(id);
        }
    }
}

// ============================================================================
// Rule creation for an approved path
// ============================================================================

/// Left/right neighbors of a middle node in the repeatedly halved path.
///
/// The path is halved (keeping endpoints) until the node sits at an odd
/// position; its immediate neighbors in that path are the two sides its
/// swap joins.
pub fn swap_neighbors(path: &[NodeId], node: NodeId) -> (NodeId, NodeId) {
    let mut current: Vec<NodeId> = path.to_vec();
    let mut position = current
        .iter()
        .position(|n| *n == node)
        .expect("node lies on the path");
    while position % 2 == 0 {
        let last = current.len() - 1;
        current = current
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0 || *i == last)
            .map(|(_, n)| *n)
            .collect();
        position = current
            .iter()
            .position(|n| *n == node)
            .expect("halving keeps the node");
    }
    (current[position - 1], current[position + 1])
}

/// Creates the rule kinds for one node's role in an approved path.
///
/// `indices` are the memory slots reserved on this node, in reservation
/// order: the first `memory_size` face the left path neighbor, the rest
/// face the right, except endpoints which have one set only. A hop to a
/// non-physical (virtual) neighbor skips generation; when the right side
/// is virtual, its otherwise idle first slot is donated to the left
/// generation set to feed the middle swap on the virtual side.
pub fn create_rules(
    node: NodeId,
    path: &[NodeId],
    indices: &[usize],
    memory_size: usize,
    topology: &Topology,
) -> Vec<RuleKind> {
    let position = path
        .iter()
        .position(|n| *n == node)
        .expect("node lies on the approved path");
    let last = path.len() - 1;
    let m = memory_size;
    let mut kinds = Vec::new();

    // Entanglement generation toward the left neighbor.
    if position > 0 && topology.is_physical_neighbor(node, path[position - 1]) {
        let mut eligible: Vec<usize> = indices[..m].to_vec();
        if position < last && !topology.is_physical_neighbor(node, path[position + 1]) {
            if let Some(&donated) = indices.get(m) {
                eligible.push(donated);
            }
        }
        let middle = topology
            .middle_between(node, path[position - 1])
            .expect("physical neighbors share a middle node");
        kinds.push(RuleKind::GenerateLeft {
            indices: eligible,
            peer: path[position - 1],
            middle,
        });
    }

    // Entanglement generation toward the right neighbor.
    if position < last && topology.is_physical_neighbor(node, path[position + 1]) {
        let eligible = if position == 0 {
            indices.to_vec()
        } else {
            indices[m..].to_vec()
        };
        let middle = topology
            .middle_between(node, path[position + 1])
            .expect("physical neighbors share a middle node");
        kinds.push(RuleKind::GenerateRight {
            indices: eligible,
            peer: path[position + 1],
            middle,
        });
    }

    // Purification: the left-facing side of each hop is active.
    if position > 0 {
        kinds.push(RuleKind::Purify {
            indices: indices[..m].to_vec(),
        });
    }
    if position < last {
        let eligible = if position == 0 {
            indices.to_vec()
        } else {
            indices[m..].to_vec()
        };
        kinds.push(RuleKind::PurifyPassive { indices: eligible });
    }

    // Swapping.
    if position == 0 {
        kinds.push(RuleKind::SwapEnd {
            indices: indices.to_vec(),
            far: path[last],
        });
    } else if position == last {
        kinds.push(RuleKind::SwapEnd {
            indices: indices.to_vec(),
            far: path[0],
        });
    } else {
        let (left, right) = swap_neighbors(path, node);
        kinds.push(RuleKind::SwapMiddle {
            indices: indices.to_vec(),
            left,
            right,
        });
        kinds.push(RuleKind::SwapMiddleWait {
            indices: indices.to_vec(),
            left,
            right,
        });
    }

    kinds
}

// ============================================================================
// Protocol handlers
// ============================================================================

impl RouterNode {
    /// Entry point at the initiator: reserve locally and launch REQUEST.
    pub(crate) fn start_request(
        &mut self,
        id: ReservationId,
        ctx: &mut Ctx<'_>,
    ) -> crate::error::Result<()> {
        let reservation = ctx.reservations[id.index()].clone();
        let required = reservation.memory_size;
        if !self.rsvp.schedule(id, ctx.reservations, required) {
            return Err(crate::error::NetError::AdmissionFailure {
                node: self.name.clone(),
                memories: required,
                start: reservation.start_time,
                end: reservation.end_time,
            });
        }
        let next = match routing::next_hop(ctx.topology, self.id, reservation.responder) {
            Ok(next) => next,
            Err(err) => {
                self.rsvp.remove_everywhere(id);
                return Err(err);
            }
        };
        debug!(node = %self.name, reservation = %id, "request admitted locally, forwarding");
        ctx.send(
            self.id,
            next,
            Message::Reservation(RsvpMessage {
                reservation: id,
                kind: RsvpKind::Request {
                    qcaps: vec![QCap { node: self.id }],
                },
            }),
        );
        Ok(())
    }

    /// Handles REQUEST / REJECT / APPROVE at any node.
    pub(crate) fn handle_rsvp(&mut self, _from: NodeId, msg: RsvpMessage, ctx: &mut Ctx<'_>) {
        let id = msg.reservation;
        let reservation = ctx.reservations[id.index()].clone();
        match msg.kind {
            RsvpKind::Request { mut qcaps } => {
                assert!(
                    ctx.now() < reservation.start_time,
                    "REQUEST reached {} after the reservation window opened",
                    self.name
                );
                let required = if self.id == reservation.responder {
                    reservation.memory_size
                } else {
                    2 * reservation.memory_size
                };
                if !self.rsvp.schedule(id, ctx.reservations, required) {
                    debug!(node = %self.name, reservation = %id, "admission failed, rejecting");
                    self.route_rsvp(reservation.initiator, id, RsvpKind::Reject, ctx);
                    return;
                }
                qcaps.push(QCap { node: self.id });
                if self.id == reservation.responder {
                    let path: Vec<NodeId> = qcaps.iter().map(|q| q.node).collect();
                    self.install_rules(&path, id, ctx);
                    if reservation.is_virtual {
                        ctx.register_virtual(reservation.initiator, reservation.responder);
                    }
                    self.route_rsvp(reservation.initiator, id, RsvpKind::Approve { path }, ctx);
                } else {
                    match routing::next_hop(ctx.topology, self.id, reservation.responder) {
                        Ok(next) => ctx.send(
                            self.id,
                            next,
                            Message::Reservation(RsvpMessage {
                                reservation: id,
                                kind: RsvpKind::Request { qcaps },
                            }),
                        ),
                        Err(err) => {
                            // Greedy dead-end counts as admission failure.
                            warn!(node = %self.name, %err, "cannot forward REQUEST");
                            self.rsvp.remove_everywhere(id);
                            self.route_rsvp(reservation.initiator, id, RsvpKind::Reject, ctx);
                        }
                    }
                }
            }
            RsvpKind::Reject => {
                self.rsvp.remove_everywhere(id);
                if self.id == reservation.initiator {
                    ctx.set_status(id, RequestStatus::Rejected);
                } else {
                    self.route_rsvp(reservation.initiator, id, RsvpKind::Reject, ctx);
                }
            }
            RsvpKind::Approve { path } => {
                if path.contains(&self.id) {
                    self.install_rules(&path, id, ctx);
                } else {
                    // Asymmetric greedy tie-breaks can detour the reply.
                    warn!(node = %self.name, reservation = %id, "APPROVE visited off-path node");
                }
                if self.id == reservation.initiator {
                    ctx.set_status(id, RequestStatus::Approved { path });
                } else {
                    self.route_rsvp(reservation.initiator, id, RsvpKind::Approve { path }, ctx);
                }
            }
        }
    }

    /// Creates and installs this node's rules for an approved path, and
    /// schedules activation, expiry, and memory restoration.
    fn install_rules(&mut self, path: &[NodeId], id: ReservationId, ctx: &mut Ctx<'_>) {
        let reservation = ctx.reservations[id.index()].clone();
        let indices = self.rsvp.reserved_indices(id);
        let kinds = create_rules(self.id, path, &indices, reservation.memory_size, ctx.topology);
        debug!(
            node = %self.name,
            reservation = %id,
            rules = kinds.len(),
            memories = indices.len(),
            "installing rules"
        );
        for kind in kinds {
            self.rules
                .install(RESERVATION_RULE_PRIORITY, kind, id, reservation.target_fidelity);
        }
        self.rsvp.accepted.push(id);

        ctx.schedule_at(
            reservation.start_time,
            PRIORITY_NORMAL,
            EventKind::LoadRules {
                node: self.id,
                reservation: id,
            },
        );
        // Rules expire strictly before their memories are wiped: expiry at
        // the normal priority, restoration behind every normal event.
        ctx.schedule_at(
            reservation.end_time,
            PRIORITY_NORMAL,
            EventKind::ExpireRules {
                node: self.id,
                reservation: id,
            },
        );
        for index in indices {
            ctx.schedule_at(
                reservation.end_time,
                PRIORITY_MEMORY_RESET,
                EventKind::ResetMemory {
                    node: self.id,
                    memory: index,
                },
            );
        }
    }

    /// Routes a reservation message toward a distant node, dropping it
    /// with a warning when greedy forwarding dead-ends.
    fn route_rsvp(
        &self,
        target: NodeId,
        reservation: ReservationId,
        kind: RsvpKind,
        ctx: &mut Ctx<'_>,
    ) {
        match routing::next_hop(ctx.topology, self.id, target) {
            Ok(next) => ctx.send(
                self.id,
                next,
                Message::Reservation(RsvpMessage { reservation, kind }),
            ),
            Err(err) => warn!(node = %self.name, %err, "cannot route reservation reply"),
        }
    }
}
