//! Quantum router node: memories, rules, and transient protocols.
//!
//! The node is the serialization point for its own resources. Every memory
//! mutation funnels through the node, which re-evaluates its active rules
//! after each change and fires the first match whose selected memories are
//! all free. A fired rule spawns a protocol instance; instances without a
//! pairing destination park in the waiting set for the peer's request, the
//! rest run the pairing handshake. A refused pairing releases the instance
//! so the rule can try again on a later evaluation.

use std::collections::HashMap;

use telluride_sim::SimRng;
use tracing::{debug, trace, warn};

use crate::ids::{MemoryRef, NodeId, ProtocolId, ReservationId, RuleId};
use crate::memory::{MemoryManager, MemoryState};
use crate::message::{GenerationMessage, Matcher, Message, PairingMessage, PurificationMessage};
use crate::network::Ctx;
use crate::protocols::{
    Generation, GenerationStage, ProtocolEntry, ProtocolKind, Purification, SwappingA, SwappingB,
    success_probability,
};
use crate::reservation::RsvpState;
use crate::rules::{RuleKind, RuleManager};
use crate::topology::NetworkConfig;

/// What to do once the pairing-response borrow is dropped.
enum AfterPairing {
    StartGeneration {
        memory: usize,
        peer: NodeId,
        peer_protocol: ProtocolId,
        this: ProtocolId,
    },
    RunPurification {
        kept: usize,
        meas: usize,
        peer_node: NodeId,
        peer_protocol: ProtocolId,
        this: ProtocolId,
    },
    TrySwap {
        this: ProtocolId,
        ready: bool,
    },
    Release {
        this: ProtocolId,
        abort: Vec<(ProtocolId, NodeId)>,
    },
    Stale,
}

/// One memory-equipped repeater node.
pub struct RouterNode {
    /// Own node id.
    pub id: NodeId,
    pub(crate) name: String,
    /// Quantum memory array.
    pub memories: MemoryManager,
    /// Installed rules.
    pub rules: RuleManager,
    /// Reservation protocol state.
    pub rsvp: RsvpState,
    pub(crate) protocols: HashMap<ProtocolId, ProtocolEntry>,
    pub(crate) waiting: Vec<ProtocolId>,
    pub(crate) rng: SimRng,
    next_protocol: u64,
}

impl RouterNode {
    /// Creates a node with raw memories and no rules.
    pub fn new(
        id: NodeId,
        name: String,
        memo_size: usize,
        config: &NetworkConfig,
        rng: SimRng,
    ) -> Self {
        Self {
            id,
            name,
            memories: MemoryManager::new(memo_size),
            rules: RuleManager::new(),
            rsvp: RsvpState::new(memo_size, config.swap_success_prob, config.swap_degradation),
            protocols: HashMap::new(),
            waiting: Vec::new(),
            rng,
            next_protocol: 0,
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dispatches a delivered classical message by its target layer.
    pub(crate) fn handle_message(&mut self, from: NodeId, message: Message, ctx: &mut Ctx<'_>) {
        match message {
            Message::Reservation(msg) => self.handle_rsvp(from, msg, ctx),
            Message::Pairing(PairingMessage::Request {
                ini_protocol,
                ini_memories,
                reservation,
                matcher,
            }) => self.on_pair_request(from, ini_protocol, &ini_memories, reservation, matcher, ctx),
            Message::Pairing(PairingMessage::Response {
                to_protocol,
                approved,
                paired,
                paired_memories,
            }) => self.on_pair_response(from, to_protocol, approved, paired, &paired_memories, ctx),
            Message::Pairing(PairingMessage::Abort { to_protocol }) => {
                self.release_protocol(to_protocol, ctx);
            }
            Message::Generation(msg) => self.handle_generation(from, msg, ctx),
            Message::Purification(msg) => self.handle_purification(from, msg, ctx),
            Message::Swapping(msg) => self.handle_swapping(from, msg, ctx),
            Message::BsmTrigger(_) => {
                panic!("emission trigger delivered to router {}", self.name)
            }
        }
    }

    /// Re-evaluates the active rules against one changed memory and fires
    /// the first match.
    pub(crate) fn evaluate(&mut self, index: usize, ctx: &mut Ctx<'_>) {
        let changed = self.memories.get(index).clone();
        if let Some((rule, selected)) = self.rules.first_match(&changed, &self.memories, &self.name)
        {
            self.fire_rule(rule, selected, ctx);
        }
    }

    fn alloc_protocol(&mut self) -> ProtocolId {
        let id = ProtocolId::new(self.next_protocol);
        self.next_protocol += 1;
        id
    }

    /// Executes a rule's action over its selected memories.
    fn fire_rule(&mut self, rule_id: RuleId, selected: Vec<usize>, ctx: &mut Ctx<'_>) {
        let rule = self.rules.rule(rule_id).expect("fired rule exists");
        let kind = rule.kind.clone();
        let reservation = rule.reservation;
        let protocol = self.alloc_protocol();
        for &index in &selected {
            self.memories.attach(index, protocol);
        }
        self.rules.register_protocol(rule_id, protocol);
        trace!(node = %self.name, rule = %rule_id, %protocol, ?selected, "rule fired");

        match kind {
            RuleKind::GenerateLeft { peer, middle, .. } => {
                self.protocols.insert(
                    protocol,
                    ProtocolEntry {
                        id: protocol,
                        rule: rule_id,
                        reservation,
                        kind: ProtocolKind::Generation(Generation::new(
                            selected[0],
                            middle,
                            peer,
                            false,
                        )),
                    },
                );
                self.waiting.push(protocol);
            }
            RuleKind::GenerateRight { peer, middle, .. } => {
                let memory = selected[0];
                self.protocols.insert(
                    protocol,
                    ProtocolEntry {
                        id: protocol,
                        rule: rule_id,
                        reservation,
                        kind: ProtocolKind::Generation(Generation::new(memory, middle, peer, true)),
                    },
                );
                ctx.send(
                    self.id,
                    peer,
                    Message::Pairing(PairingMessage::Request {
                        ini_protocol: protocol,
                        ini_memories: vec![MemoryRef {
                            node: self.id,
                            index: memory,
                        }],
                        reservation,
                        matcher: Matcher::GenerationPeer {
                            peer: self.id,
                            reservation,
                        },
                    }),
                );
            }
            RuleKind::Purify { .. } => {
                let (kept, meas) = (selected[0], selected[1]);
                let kept_remote = self.memories.get(kept).remote.expect("entangled memory");
                let meas_remote = self.memories.get(meas).remote.expect("entangled memory");
                self.protocols.insert(
                    protocol,
                    ProtocolEntry {
                        id: protocol,
                        rule: rule_id,
                        reservation,
                        kind: ProtocolKind::Purification(Purification::active(kept, meas)),
                    },
                );
                ctx.send(
                    self.id,
                    kept_remote.node,
                    Message::Pairing(PairingMessage::Request {
                        ini_protocol: protocol,
                        ini_memories: vec![
                            MemoryRef {
                                node: self.id,
                                index: kept,
                            },
                            MemoryRef {
                                node: self.id,
                                index: meas,
                            },
                        ],
                        reservation,
                        matcher: Matcher::PurificationPeer {
                            kept_remote,
                            meas_remote,
                        },
                    }),
                );
            }
            RuleKind::PurifyPassive { .. } => {
                self.protocols.insert(
                    protocol,
                    ProtocolEntry {
                        id: protocol,
                        rule: rule_id,
                        reservation,
                        kind: ProtocolKind::Purification(Purification::passive(selected[0])),
                    },
                );
                self.waiting.push(protocol);
            }
            RuleKind::SwapMiddle { left, .. } => {
                let (first, second) = (selected[0], selected[1]);
                let first_faces_left =
                    self.memories.get(first).remote.map(|r| r.node) == Some(left);
                let (left_memory, right_memory) = if first_faces_left {
                    (first, second)
                } else {
                    (second, first)
                };
                self.protocols.insert(
                    protocol,
                    ProtocolEntry {
                        id: protocol,
                        rule: rule_id,
                        reservation,
                        kind: ProtocolKind::SwappingA(SwappingA::new(
                            left_memory,
                            right_memory,
                            self.rsvp.es_success_prob,
                            self.rsvp.es_degradation,
                        )),
                    },
                );
                for memory in [left_memory, right_memory] {
                    let remote = self.memories.get(memory).remote.expect("entangled memory");
                    ctx.send(
                        self.id,
                        remote.node,
                        Message::Pairing(PairingMessage::Request {
                            ini_protocol: protocol,
                            ini_memories: vec![MemoryRef {
                                node: self.id,
                                index: memory,
                            }],
                            reservation,
                            matcher: Matcher::SwappingPeer {
                                remote_memory: remote,
                            },
                        }),
                    );
                }
            }
            RuleKind::SwapMiddleWait { .. } | RuleKind::SwapEnd { .. } => {
                self.protocols.insert(
                    protocol,
                    ProtocolEntry {
                        id: protocol,
                        rule: rule_id,
                        reservation,
                        kind: ProtocolKind::SwappingB(SwappingB {
                            memory: selected[0],
                        }),
                    },
                );
                self.waiting.push(protocol);
            }
        }
    }

    /// Resolves a peer's pairing request against the waiting set.
    fn on_pair_request(
        &mut self,
        from: NodeId,
        ini_protocol: ProtocolId,
        ini_memories: &[MemoryRef],
        _reservation: ReservationId,
        matcher: Matcher,
        ctx: &mut Ctx<'_>,
    ) {
        let resolved = match matcher {
            Matcher::GenerationPeer {
                peer,
                reservation: wanted,
            } => {
                let found = self.waiting.iter().position(|pid| {
                    self.protocols.get(pid).is_some_and(|entry| {
                        entry.reservation == wanted
                            && matches!(
                                &entry.kind,
                                ProtocolKind::Generation(g) if g.peer == peer && !g.primary
                            )
                    })
                });
                found.map(|position| {
                    let pid = self.waiting.remove(position);
                    let entry = self.protocols.get_mut(&pid).expect("waiting instance exists");
                    let ProtocolKind::Generation(generation) = &mut entry.kind else {
                        unreachable!("matcher selected a generation instance");
                    };
                    generation.peer_protocol = Some(ini_protocol);
                    generation.peer_memory = Some(ini_memories[0]);
                    generation.stage = GenerationStage::Paired;
                    let memory = generation.memory;
                    self.memories.set_occupied(memory);
                    (
                        pid,
                        vec![MemoryRef {
                            node: self.id,
                            index: memory,
                        }],
                    )
                })
            }
            Matcher::PurificationPeer {
                kept_remote,
                meas_remote,
            } => {
                let find = |protocols: &HashMap<ProtocolId, ProtocolEntry>,
                            waiting: &[ProtocolId],
                            index: usize| {
                    waiting.iter().copied().find(|pid| {
                        protocols.get(pid).is_some_and(|entry| {
                            matches!(
                                &entry.kind,
                                ProtocolKind::Purification(p)
                                    if !p.active && p.meas.is_none() && p.kept == index
                            )
                        })
                    })
                };
                let kept_pid = find(&self.protocols, &self.waiting, kept_remote.index);
                let meas_pid = find(&self.protocols, &self.waiting, meas_remote.index);
                match (kept_pid, meas_pid) {
                    (Some(kept_pid), Some(meas_pid)) if kept_pid != meas_pid => {
                        self.waiting.retain(|p| *p != kept_pid && *p != meas_pid);
                        // The measured side's parked instance dissolves into
                        // the kept side's; its memory moves over with it.
                        let absorbed = self
                            .protocols
                            .remove(&meas_pid)
                            .expect("waiting instance exists");
                        self.rules.unregister_protocol(absorbed.rule, meas_pid);
                        self.memories.detach(meas_remote.index);
                        self.memories.attach(meas_remote.index, kept_pid);
                        let entry = self
                            .protocols
                            .get_mut(&kept_pid)
                            .expect("waiting instance exists");
                        let ProtocolKind::Purification(purification) = &mut entry.kind else {
                            unreachable!("matcher selected purification instances");
                        };
                        purification.meas = Some(meas_remote.index);
                        purification.peer_protocol = Some(ini_protocol);
                        Some((kept_pid, vec![kept_remote, meas_remote]))
                    }
                    _ => None,
                }
            }
            Matcher::SwappingPeer { remote_memory } => {
                let found = self.waiting.iter().position(|pid| {
                    self.protocols.get(pid).is_some_and(|entry| {
                        matches!(
                            &entry.kind,
                            ProtocolKind::SwappingB(b) if b.memory == remote_memory.index
                        )
                    })
                });
                found.map(|position| {
                    let pid = self.waiting.remove(position);
                    (
                        pid,
                        vec![MemoryRef {
                            node: self.id,
                            index: remote_memory.index,
                        }],
                    )
                })
            }
        };

        match resolved {
            Some((paired, paired_memories)) => {
                ctx.send(
                    self.id,
                    from,
                    Message::Pairing(PairingMessage::Response {
                        to_protocol: ini_protocol,
                        approved: true,
                        paired: Some(paired),
                        paired_memories,
                    }),
                );
            }
            None => {
                trace!(node = %self.name, from = %from, "no counterpart waiting, refusing");
                ctx.send(
                    self.id,
                    from,
                    Message::Pairing(PairingMessage::Response {
                        to_protocol: ini_protocol,
                        approved: false,
                        paired: None,
                        paired_memories: Vec::new(),
                    }),
                );
            }
        }
    }

    /// Applies a pairing answer to the requesting instance.
    fn on_pair_response(
        &mut self,
        from: NodeId,
        to_protocol: ProtocolId,
        approved: bool,
        paired: Option<ProtocolId>,
        paired_memories: &[MemoryRef],
        ctx: &mut Ctx<'_>,
    ) {
        let action = {
            let Some(entry) = self.protocols.get_mut(&to_protocol) else {
                // The requester expired meanwhile; free the counterpart the
                // peer reserved for us, if any.
                if approved {
                    if let Some(peer) = paired {
                        ctx.send(
                            self.id,
                            from,
                            Message::Pairing(PairingMessage::Abort { to_protocol: peer }),
                        );
                    }
                }
                return;
            };
            match &mut entry.kind {
                ProtocolKind::Generation(generation) => {
                    if approved {
                        let peer_protocol = paired.expect("approved answer names the counterpart");
                        generation.peer_protocol = Some(peer_protocol);
                        generation.peer_memory = Some(paired_memories[0]);
                        generation.stage = GenerationStage::Paired;
                        AfterPairing::StartGeneration {
                            memory: generation.memory,
                            peer: generation.peer,
                            peer_protocol,
                            this: to_protocol,
                        }
                    } else {
                        AfterPairing::Release {
                            this: to_protocol,
                            abort: Vec::new(),
                        }
                    }
                }
                ProtocolKind::Purification(purification) => {
                    if !purification.active {
                        trace!(node = %self.name, "pairing answer for a passive instance");
                        AfterPairing::Stale
                    } else if approved {
                        let peer_protocol = paired.expect("approved answer names the counterpart");
                        purification.peer_protocol = Some(peer_protocol);
                        AfterPairing::RunPurification {
                            kept: purification.kept,
                            meas: purification
                                .meas
                                .expect("active purification holds both memories"),
                            peer_node: from,
                            peer_protocol,
                            this: to_protocol,
                        }
                    } else {
                        AfterPairing::Release {
                            this: to_protocol,
                            abort: Vec::new(),
                        }
                    }
                }
                ProtocolKind::SwappingA(swap) => {
                    if approved {
                        let peer_protocol = paired.expect("approved answer names the counterpart");
                        let endpoint_memory = paired_memories[0];
                        if self.memories.get(swap.left).remote == Some(endpoint_memory) {
                            swap.left_peer = Some((peer_protocol, from));
                        } else if self.memories.get(swap.right).remote == Some(endpoint_memory) {
                            swap.right_peer = Some((peer_protocol, from));
                        } else {
                            warn!(node = %self.name, "pairing answer names an unknown memory");
                        }
                        AfterPairing::TrySwap {
                            this: to_protocol,
                            ready: swap.left_peer.is_some() && swap.right_peer.is_some(),
                        }
                    } else {
                        let abort = [swap.left_peer, swap.right_peer]
                            .into_iter()
                            .flatten()
                            .collect();
                        AfterPairing::Release {
                            this: to_protocol,
                            abort,
                        }
                    }
                }
                ProtocolKind::SwappingB(_) => {
                    trace!(node = %self.name, "pairing answer for an endpoint instance");
                    AfterPairing::Stale
                }
            }
        };

        match action {
            AfterPairing::StartGeneration {
                memory,
                peer,
                peer_protocol,
                this,
            } => {
                self.memories.set_occupied(memory);
                ctx.send(
                    self.id,
                    peer,
                    Message::Generation(GenerationMessage::Negotiate {
                        to_protocol: peer_protocol,
                        from_protocol: this,
                    }),
                );
            }
            AfterPairing::RunPurification {
                kept,
                meas,
                peer_node,
                peer_protocol,
                this,
            } => {
                let entry = self.protocols.remove(&this).expect("instance exists");
                self.rules.unregister_protocol(entry.rule, this);
                let fidelity = self.memories.get(kept).fidelity;
                let success = self.rng.chance(success_probability(fidelity));
                debug!(node = %self.name, kept, meas, fidelity, success, "purification attempted");
                ctx.send(
                    self.id,
                    peer_node,
                    Message::Purification(PurificationMessage::Outcome {
                        to_protocol: peer_protocol,
                        success,
                    }),
                );
                self.apply_purification(kept, meas, success, ctx);
            }
            AfterPairing::TrySwap { this, ready } => {
                if ready {
                    self.perform_swap(this, ctx);
                }
            }
            AfterPairing::Release { this, abort } => {
                for (protocol, node) in abort {
                    ctx.send(
                        self.id,
                        node,
                        Message::Pairing(PairingMessage::Abort {
                            to_protocol: protocol,
                        }),
                    );
                }
                self.release_protocol(this, ctx);
            }
            AfterPairing::Stale => {}
        }
    }

    /// Releases an instance whose pairing fell through: memories detach,
    /// in-flight attempts reset to RAW, and the rules get another look.
    pub(crate) fn release_protocol(&mut self, protocol: ProtocolId, ctx: &mut Ctx<'_>) {
        let Some(entry) = self.protocols.remove(&protocol) else {
            return;
        };
        self.rules.unregister_protocol(entry.rule, protocol);
        self.waiting.retain(|p| *p != protocol);
        let held = entry.kind.memories();
        for &index in &held {
            if self.memories.get(index).attached == Some(protocol) {
                self.memories.detach(index);
                if self.memories.get(index).state == MemoryState::Occupied {
                    self.memories.set_raw(index);
                }
            }
        }
        trace!(node = %self.name, %protocol, "protocol released");
        for index in held {
            self.evaluate(index, ctx);
        }
    }

    /// Drops an instance during rule expiry. No re-evaluation; the memory
    /// restoration events that follow take care of the final state.
    fn teardown_protocol(&mut self, protocol: ProtocolId) {
        let Some(entry) = self.protocols.remove(&protocol) else {
            return;
        };
        self.waiting.retain(|p| *p != protocol);
        for index in entry.kind.memories() {
            if self.memories.get(index).attached == Some(protocol) {
                self.memories.detach(index);
            }
        }
    }

    /// Activates a reservation's rules and gives them a first look at
    /// every memory.
    pub(crate) fn load_rules(&mut self, reservation: ReservationId, ctx: &mut Ctx<'_>) {
        debug!(node = %self.name, %reservation, "rules active");
        self.rules.activate(reservation);
        for index in 0..self.memories.len() {
            self.evaluate(index, ctx);
        }
    }

    /// Expires a reservation's rules, tearing down their protocols.
    pub(crate) fn expire_rules(&mut self, reservation: ReservationId) {
        debug!(node = %self.name, %reservation, "rules expired");
        for rule in self.rules.expire(reservation) {
            for protocol in rule.protocols {
                self.teardown_protocol(protocol);
            }
        }
    }

    /// Restores a reserved memory to RAW at the end of its window.
    pub(crate) fn reset_memory(&mut self, index: usize, ctx: &mut Ctx<'_>) {
        if let Some(protocol) = self.memories.get(index).attached {
            self.teardown_protocol(protocol);
        }
        self.memories.set_raw(index);
        self.evaluate(index, ctx);
    }
}
