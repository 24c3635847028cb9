//! Condition/action rules driving the entanglement pipeline.
//!
//! Rules are installed when APPROVE propagates, become active at the
//! reservation's start time, and expire at its end time. After every
//! memory state change the owning node walks its active rules in priority
//! order (descending, load order breaking ties) and fires the first rule
//! whose condition selects only free memories.
//!
//! Conditions and actions are tagged variants carrying their parameters,
//! dispatched on the tag by the owning node.

use std::collections::HashSet;

use tracing::warn;

use crate::ids::{NodeId, ProtocolId, ReservationId, RuleId};
use crate::memory::{MemoryInfo, MemoryManager, MemoryState};

/// Priority assigned to every rule created by the reservation protocol.
pub const RESERVATION_RULE_PRIORITY: u8 = 10;

/// Rule kinds, each carrying the parameters its condition and action need.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Generate entanglement with the left path neighbor; this side parks
    /// and waits for the peer's pairing request.
    GenerateLeft {
        /// Memory indices eligible for generation toward the left.
        indices: Vec<usize>,
        /// Left path neighbor.
        peer: NodeId,
        /// BSM node mediating the hop.
        middle: NodeId,
    },
    /// Generate entanglement with the right path neighbor; this side
    /// initiates the pairing request.
    GenerateRight {
        /// Memory indices eligible for generation toward the right.
        indices: Vec<usize>,
        /// Right path neighbor.
        peer: NodeId,
        /// BSM node mediating the hop.
        middle: NodeId,
    },
    /// Purify two same-fidelity pairs with the same remote node; this side
    /// performs the measurement draw.
    Purify {
        /// Memory indices eligible for purification.
        indices: Vec<usize>,
    },
    /// Park a passive purification instance for each low-fidelity pair,
    /// awaiting the peer's pairing request.
    PurifyPassive {
        /// Memory indices eligible for passive purification.
        indices: Vec<usize>,
    },
    /// Middle-node swap: fire when one memory faces `left` and another
    /// faces `right`, both at target fidelity.
    SwapMiddle {
        /// Memory indices eligible for swapping.
        indices: Vec<usize>,
        /// Left neighbor in the halved path.
        left: NodeId,
        /// Right neighbor in the halved path.
        right: NodeId,
    },
    /// Middle-node endpoint role: a pair not yet facing `left`/`right`
    /// still has a swap ahead of it; park an endpoint instance for it.
    SwapMiddleWait {
        /// Memory indices eligible.
        indices: Vec<usize>,
        /// Left neighbor in the halved path.
        left: NodeId,
        /// Right neighbor in the halved path.
        right: NodeId,
    },
    /// Path-endpoint role: park an endpoint instance for every pair not
    /// yet facing the far end of the path.
    SwapEnd {
        /// Memory indices eligible.
        indices: Vec<usize>,
        /// Far endpoint of the path.
        far: NodeId,
    },
}

impl RuleKind {
    /// Evaluates the condition against a changed memory.
    ///
    /// Returns the ordered memories to bind, or empty when the rule does
    /// not match. Attached memories never match; they belong to another
    /// rule's active protocol.
    pub fn select(
        &self,
        changed: &MemoryInfo,
        memories: &MemoryManager,
        target_fidelity: f64,
        node: &str,
    ) -> Vec<usize> {
        if !changed.is_free() {
            return Vec::new();
        }
        match self {
            RuleKind::GenerateLeft { indices, .. } | RuleKind::GenerateRight { indices, .. } => {
                if changed.state == MemoryState::Raw && indices.contains(&changed.index) {
                    vec![changed.index]
                } else {
                    Vec::new()
                }
            }
            RuleKind::Purify { indices } => {
                if !indices.contains(&changed.index)
                    || changed.state != MemoryState::Entangled
                    || changed.fidelity >= target_fidelity
                {
                    return Vec::new();
                }
                let Some(remote) = changed.remote else {
                    return Vec::new();
                };
                for info in memories.iter() {
                    if info.index != changed.index
                        && indices.contains(&info.index)
                        && info.state == MemoryState::Entangled
                        && info.is_free()
                        && info.remote.map(|r| r.node) == Some(remote.node)
                        && info.fidelity == changed.fidelity
                    {
                        assert_ne!(
                            info.remote, changed.remote,
                            "two memories entangled with the same remote memory"
                        );
                        return vec![changed.index, info.index];
                    }
                }
                Vec::new()
            }
            RuleKind::PurifyPassive { indices } => {
                if indices.contains(&changed.index)
                    && changed.state == MemoryState::Entangled
                    && changed.fidelity < target_fidelity
                {
                    vec![changed.index]
                } else {
                    Vec::new()
                }
            }
            RuleKind::SwapMiddle {
                indices,
                left,
                right,
            } => {
                let eligible = |info: &MemoryInfo, facing: NodeId| {
                    (info.state == MemoryState::Entangled || info.state == MemoryState::Occupied)
                        && indices.contains(&info.index)
                        && info.is_free()
                        && info.remote.map(|r| r.node) == Some(facing)
                        && info.fidelity >= target_fidelity
                };
                let other_facing = if eligible(changed, *left) {
                    *right
                } else if eligible(changed, *right) {
                    *left
                } else {
                    return Vec::new();
                };
                for info in memories.iter() {
                    if info.index != changed.index && eligible(info, other_facing) {
                        if changed.state == MemoryState::Occupied
                            || info.state == MemoryState::Occupied
                        {
                            warn!(
                                node,
                                memory = changed.index,
                                "OCCUPIED memory satisfied the middle-swap condition"
                            );
                        }
                        return vec![changed.index, info.index];
                    }
                }
                Vec::new()
            }
            RuleKind::SwapMiddleWait {
                indices,
                left,
                right,
            } => {
                let facing = changed.remote.map(|r| r.node);
                if changed.state == MemoryState::Entangled
                    && indices.contains(&changed.index)
                    && facing != Some(*left)
                    && facing != Some(*right)
                    && changed.fidelity >= target_fidelity
                {
                    vec![changed.index]
                } else {
                    Vec::new()
                }
            }
            RuleKind::SwapEnd { indices, far } => {
                if changed.state == MemoryState::Entangled
                    && indices.contains(&changed.index)
                    && changed.remote.map(|r| r.node) != Some(*far)
                    && changed.fidelity >= target_fidelity
                {
                    vec![changed.index]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// One installed rule.
#[derive(Debug)]
pub struct Rule {
    /// Per-node stable id.
    pub id: RuleId,
    /// Dispatch priority; higher evaluates first.
    pub priority: u8,
    /// Condition/action payload.
    pub kind: RuleKind,
    /// Reservation that installed the rule.
    pub reservation: ReservationId,
    /// Fidelity the reservation asked for.
    pub target_fidelity: f64,
    /// Set at the reservation's start time, cleared at expiry.
    pub active: bool,
    /// Protocol instances this rule has spawned and still owns.
    pub protocols: HashSet<ProtocolId>,
    load_seq: u64,
}

/// Per-node rule set.
pub struct RuleManager {
    rules: Vec<Rule>,
    next_id: u64,
    next_load_seq: u64,
}

impl RuleManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            next_id: 0,
            next_load_seq: 0,
        }
    }

    /// Installs an inactive rule; it starts evaluating once activated.
    pub fn install(
        &mut self,
        priority: u8,
        kind: RuleKind,
        reservation: ReservationId,
        target_fidelity: f64,
    ) -> RuleId {
        let id = RuleId::new(self.next_id);
        self.next_id += 1;
        self.rules.push(Rule {
            id,
            priority,
            kind,
            reservation,
            target_fidelity,
            active: false,
            protocols: HashSet::new(),
            load_seq: 0,
        });
        id
    }

    /// Activates every rule of a reservation, assigning load order.
    pub fn activate(&mut self, reservation: ReservationId) {
        for rule in &mut self.rules {
            if rule.reservation == reservation && !rule.active {
                rule.active = true;
                rule.load_seq = self.next_load_seq;
                self.next_load_seq += 1;
            }
        }
    }

    /// Removes every rule of a reservation, returning them so the node can
    /// tear down their protocols.
    pub fn expire(&mut self, reservation: ReservationId) -> Vec<Rule> {
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.rules.len());
        for rule in self.rules.drain(..) {
            if rule.reservation == reservation {
                expired.push(rule);
            } else {
                kept.push(rule);
            }
        }
        self.rules = kept;
        expired
    }

    /// Finds the first active rule matching the changed memory.
    ///
    /// Rules evaluate in descending priority; load order breaks ties.
    pub fn first_match(
        &self,
        changed: &MemoryInfo,
        memories: &MemoryManager,
        node: &str,
    ) -> Option<(RuleId, Vec<usize>)> {
        let mut order: Vec<&Rule> = self.rules.iter().filter(|r| r.active).collect();
        order.sort_by_key(|r| (std::cmp::Reverse(r.priority), r.load_seq));

        for rule in order {
            let selected = rule
                .kind
                .select(changed, memories, rule.target_fidelity, node);
            if !selected.is_empty() {
                return Some((rule.id, selected));
            }
        }
        None
    }

    /// Borrows a rule by id.
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Records a spawned protocol as owned by its rule.
    pub fn register_protocol(&mut self, id: RuleId, protocol: ProtocolId) {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.id == id) {
            rule.protocols.insert(protocol);
        }
    }

    /// Forgets a finished or released protocol.
    pub fn unregister_protocol(&mut self, id: RuleId, protocol: ProtocolId) {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.id == id) {
            rule.protocols.remove(&protocol);
        }
    }

    /// Number of active rules.
    pub fn active_count(&self) -> usize {
        self.rules.iter().filter(|r| r.active).count()
    }
}

impl Default for RuleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MemoryRef;

    fn entangled(
        memories: &mut MemoryManager,
        index: usize,
        remote_node: u32,
        remote_index: usize,
        fidelity: f64,
    ) {
        memories.set_entangled(
            index,
            MemoryRef {
                node: NodeId::new(remote_node),
                index: remote_index,
            },
            fidelity,
            100,
        );
    }

    #[test]
    fn generate_matches_raw_reserved_memory() {
        let memories = MemoryManager::new(4);
        let kind = RuleKind::GenerateRight {
            indices: vec![0, 1],
            peer: NodeId::new(1),
            middle: NodeId::new(2),
        };

        assert_eq!(kind.select(memories.get(0), &memories, 0.9, "a"), vec![0]);
        // Index 3 is not reserved for this rule.
        assert!(kind.select(memories.get(3), &memories, 0.9, "a").is_empty());
    }

    #[test]
    fn generate_ignores_attached_memory() {
        let mut memories = MemoryManager::new(2);
        memories.attach(0, ProtocolId::new(7));
        let kind = RuleKind::GenerateLeft {
            indices: vec![0, 1],
            peer: NodeId::new(1),
            middle: NodeId::new(2),
        };
        assert!(kind.select(memories.get(0), &memories, 0.9, "a").is_empty());
        assert_eq!(kind.select(memories.get(1), &memories, 0.9, "a"), vec![1]);
    }

    #[test]
    fn purify_needs_matching_partner() {
        let mut memories = MemoryManager::new(4);
        let kind = RuleKind::Purify {
            indices: vec![0, 1, 2],
        };

        entangled(&mut memories, 0, 5, 0, 0.8);
        assert!(kind.select(memories.get(0), &memories, 0.9, "a").is_empty());

        // Partner with a different remote node does not match.
        entangled(&mut memories, 1, 6, 0, 0.8);
        assert!(kind.select(memories.get(0), &memories, 0.9, "a").is_empty());

        // Same remote node, same fidelity, distinct remote memory: match.
        entangled(&mut memories, 2, 5, 1, 0.8);
        assert_eq!(
            kind.select(memories.get(0), &memories, 0.9, "a"),
            vec![0, 2]
        );
    }

    #[test]
    fn purify_skips_pairs_at_target() {
        let mut memories = MemoryManager::new(2);
        let kind = RuleKind::Purify {
            indices: vec![0, 1],
        };
        entangled(&mut memories, 0, 5, 0, 0.95);
        entangled(&mut memories, 1, 5, 1, 0.95);
        assert!(kind.select(memories.get(0), &memories, 0.9, "a").is_empty());
    }

    #[test]
    fn swap_middle_needs_both_sides() {
        let mut memories = MemoryManager::new(4);
        let kind = RuleKind::SwapMiddle {
            indices: vec![0, 1, 2, 3],
            left: NodeId::new(10),
            right: NodeId::new(20),
        };

        entangled(&mut memories, 0, 10, 0, 0.95);
        assert!(kind.select(memories.get(0), &memories, 0.9, "m").is_empty());

        entangled(&mut memories, 1, 20, 0, 0.95);
        assert_eq!(
            kind.select(memories.get(0), &memories, 0.9, "m"),
            vec![0, 1]
        );
        // Evaluation from the right-facing side binds in changed-first order.
        assert_eq!(
            kind.select(memories.get(1), &memories, 0.9, "m"),
            vec![1, 0]
        );
    }

    #[test]
    fn swap_middle_respects_target_fidelity() {
        let mut memories = MemoryManager::new(2);
        let kind = RuleKind::SwapMiddle {
            indices: vec![0, 1],
            left: NodeId::new(10),
            right: NodeId::new(20),
        };
        entangled(&mut memories, 0, 10, 0, 0.85);
        entangled(&mut memories, 1, 20, 0, 0.95);
        assert!(kind.select(memories.get(1), &memories, 0.9, "m").is_empty());
    }

    #[test]
    fn swap_end_skips_far_endpoint_pairs() {
        let mut memories = MemoryManager::new(2);
        let far = NodeId::new(30);
        let kind = RuleKind::SwapEnd {
            indices: vec![0, 1],
            far,
        };

        entangled(&mut memories, 0, 30, 0, 0.95);
        assert!(kind.select(memories.get(0), &memories, 0.9, "u").is_empty());

        entangled(&mut memories, 1, 11, 0, 0.95);
        assert_eq!(kind.select(memories.get(1), &memories, 0.9, "u"), vec![1]);
    }

    #[test]
    fn rules_fire_in_priority_then_load_order() {
        let mut manager = RuleManager::new();
        let memories = MemoryManager::new(1);
        let reservation = ReservationId::new(0);

        let low = manager.install(
            5,
            RuleKind::GenerateLeft {
                indices: vec![0],
                peer: NodeId::new(1),
                middle: NodeId::new(2),
            },
            reservation,
            0.9,
        );
        let high = manager.install(
            10,
            RuleKind::GenerateRight {
                indices: vec![0],
                peer: NodeId::new(1),
                middle: NodeId::new(2),
            },
            reservation,
            0.9,
        );
        manager.activate(reservation);

        let (fired, _) = manager
            .first_match(memories.get(0), &memories, "a")
            .expect("a rule matches");
        assert_eq!(fired, high);
        assert_ne!(fired, low);
    }

    #[test]
    fn inactive_rules_do_not_fire() {
        let mut manager = RuleManager::new();
        let memories = MemoryManager::new(1);
        manager.install(
            10,
            RuleKind::GenerateLeft {
                indices: vec![0],
                peer: NodeId::new(1),
                middle: NodeId::new(2),
            },
            ReservationId::new(0),
            0.9,
        );

        assert!(manager.first_match(memories.get(0), &memories, "a").is_none());
    }

    #[test]
    fn expire_removes_only_the_reservation() {
        let mut manager = RuleManager::new();
        let keep = ReservationId::new(0);
        let gone = ReservationId::new(1);
        for reservation in [keep, gone, gone] {
            manager.install(
                10,
                RuleKind::PurifyPassive { indices: vec![0] },
                reservation,
                0.9,
            );
        }
        manager.activate(keep);
        manager.activate(gone);

        let expired = manager.expire(gone);
        assert_eq!(expired.len(), 2);
        assert_eq!(manager.active_count(), 1);
    }
}
