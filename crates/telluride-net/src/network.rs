//! The network world: nodes, timeline, and the public request surface.
//!
//! `Network` owns every node, the topology, the reservation arena, and the
//! timeline. It is the single sequencer: `run` drains the timeline and
//! dispatches each event to the node it concerns, handing the node a
//! context with the scheduling surface. All apparent concurrency resolves
//! through the timeline's `(time, priority, insertion-order)` dequeue
//! order.

use std::collections::{HashMap, HashSet};

use telluride_sim::{SimRng, Time, Timeline};
use tracing::info;

use crate::bsm::BsmNode;
use crate::error::{NetError, Result};
use crate::ids::{NodeId, ReservationId};
use crate::memory::MemoryState;
use crate::message::Message;
use crate::node::RouterNode;
use crate::reservation::Reservation;
use crate::topology::{NetworkConfig, Topology};

/// Priority of ordinary events: message deliveries, rule activation and
/// expiry.
pub(crate) const PRIORITY_NORMAL: u8 = 0;
/// Priority of end-of-reservation memory restoration, behind every normal
/// event at the same timestamp so rules expire before memories are wiped.
pub(crate) const PRIORITY_MEMORY_RESET: u8 = 1;

/// Events the world dispatches.
#[derive(Debug)]
pub enum EventKind {
    /// A classical message arriving at its destination.
    Deliver {
        /// Sending node.
        from: NodeId,
        /// Receiving node.
        to: NodeId,
        /// Payload.
        message: Message,
    },
    /// A reservation's rules become active at its start time.
    LoadRules {
        /// Node owning the rules.
        node: NodeId,
        /// Reservation whose rules activate.
        reservation: ReservationId,
    },
    /// A reservation's rules expire at its end time.
    ExpireRules {
        /// Node owning the rules.
        node: NodeId,
        /// Reservation whose rules expire.
        reservation: ReservationId,
    },
    /// A reserved memory is restored to RAW after expiry.
    ResetMemory {
        /// Node owning the memory.
        node: NodeId,
        /// Memory index to restore.
        memory: usize,
    },
}

/// Terminal outcome of a request, observed at the initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Still traveling the path.
    Pending,
    /// Admitted along the whole path.
    Approved {
        /// The path the responder fixed.
        path: Vec<NodeId>,
    },
    /// Unwound by an admission failure somewhere on the path.
    Rejected,
}

/// Scheduling surface handed to nodes while they handle an event.
pub struct Ctx<'a> {
    pub(crate) timeline: &'a mut Timeline<EventKind>,
    /// Immutable network topology.
    pub topology: &'a Topology,
    /// Simulation tunables.
    pub config: &'a NetworkConfig,
    /// Reservation arena; ids index into it.
    pub reservations: &'a [Reservation],
    statuses: &'a mut HashMap<ReservationId, RequestStatus>,
    virtual_links: &'a mut HashSet<(NodeId, NodeId)>,
}

impl Ctx<'_> {
    /// Current simulation time.
    pub fn now(&self) -> Time {
        self.timeline.now()
    }

    /// Sends a classical message, honoring the channel delay.
    pub fn send(&mut self, from: NodeId, to: NodeId, message: Message) {
        let delay = self.topology.classical_delay(from, to);
        self.timeline.schedule_in(
            delay,
            PRIORITY_NORMAL,
            EventKind::Deliver { from, to, message },
        );
    }

    /// Schedules a world event at an absolute time.
    pub fn schedule_at(&mut self, time: Time, priority: u8, kind: EventKind) {
        self.timeline.schedule_at(time, priority, kind);
    }

    /// Records the terminal outcome of a request.
    pub fn set_status(&mut self, id: ReservationId, status: RequestStatus) {
        info!(reservation = %id, ?status, "request resolved");
        self.statuses.insert(id, status);
    }

    /// Records an established virtual link between two routers.
    pub fn register_virtual(&mut self, a: NodeId, b: NodeId) {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.virtual_links.insert(key);
    }
}

enum NodeSlot {
    Router(RouterNode),
    Bsm(BsmNode),
}

/// Reporting view of one memory slot.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    /// Memory index.
    pub index: usize,
    /// Lifecycle state.
    pub state: MemoryState,
    /// Remote node name when entangled.
    pub remote_node: Option<String>,
    /// Remote memory index when entangled.
    pub remote_memory: Option<usize>,
    /// Pair fidelity.
    pub fidelity: f64,
    /// Time the pair was established (ps).
    pub entangle_time: Option<Time>,
}

/// A simulated quantum repeater network.
pub struct Network {
    timeline: Timeline<EventKind>,
    topology: Topology,
    config: NetworkConfig,
    nodes: Vec<NodeSlot>,
    reservations: Vec<Reservation>,
    statuses: HashMap<ReservationId, RequestStatus>,
    virtual_links: HashSet<(NodeId, NodeId)>,
}

impl Network {
    /// Builds the network stack over a topology.
    pub fn new(topology: Topology, config: NetworkConfig) -> Self {
        let mut master = SimRng::new(config.seed);
        let nodes = (0..topology.node_count())
            .map(|i| {
                let id = NodeId::new(i as u32);
                let name = topology.name(id).to_string();
                if topology.is_router(id) {
                    NodeSlot::Router(RouterNode::new(
                        id,
                        name,
                        topology.memo_size(id),
                        &config,
                        master.fork(),
                    ))
                } else {
                    NodeSlot::Bsm(BsmNode::new(id, name, master.fork()))
                }
            })
            .collect();
        Self {
            timeline: Timeline::new(),
            topology,
            config,
            nodes,
            reservations: Vec::new(),
            statuses: HashMap::new(),
            virtual_links: HashSet::new(),
        }
    }

    /// Builds a network from a topology JSON string.
    pub fn from_json_str(json: &str, config: NetworkConfig) -> Result<Self> {
        let topology = Topology::from_json_str(json, &config)?;
        Ok(Self::new(topology, config))
    }

    /// Builds a network from a topology JSON file.
    pub fn from_json_file(path: &std::path::Path, config: NetworkConfig) -> Result<Self> {
        let topology = Topology::from_json_file(path, &config)?;
        Ok(Self::new(topology, config))
    }

    /// Issues an entanglement request at a node's network manager.
    ///
    /// Preconditions: both names exist and are routers, the window lies in
    /// the future with `start < end`, `memory_size >= 1`,
    /// `0 < target_fidelity <= 1`, and the responder is physically
    /// reachable. Local admission failure surfaces synchronously; remote
    /// failure arrives later as a REJECT and flips the status.
    pub fn request(
        &mut self,
        initiator: &str,
        responder: &str,
        start_time: Time,
        end_time: Time,
        memory_size: usize,
        target_fidelity: f64,
    ) -> Result<ReservationId> {
        self.request_with(
            initiator,
            responder,
            start_time,
            end_time,
            memory_size,
            target_fidelity,
            false,
        )
    }

    /// Issues a request, optionally flagged as a virtual-link reservation.
    #[allow(clippy::too_many_arguments)]
    pub fn request_with(
        &mut self,
        initiator: &str,
        responder: &str,
        start_time: Time,
        end_time: Time,
        memory_size: usize,
        target_fidelity: f64,
        is_virtual: bool,
    ) -> Result<ReservationId> {
        let initiator = self.router_id(initiator)?;
        let responder = self.router_id(responder)?;
        if initiator == responder {
            return Err(NetError::InvalidRequest(
                "initiator and responder are the same node".into(),
            ));
        }
        if start_time <= self.timeline.now() {
            return Err(NetError::InvalidRequest(format!(
                "start time {start_time} is not in the future"
            )));
        }
        if start_time >= end_time {
            return Err(NetError::InvalidRequest(format!(
                "window [{start_time}, {end_time}] is empty"
            )));
        }
        if memory_size == 0 {
            return Err(NetError::InvalidRequest("memory_size must be >= 1".into()));
        }
        if !(target_fidelity > 0.0 && target_fidelity <= 1.0) {
            return Err(NetError::InvalidRequest(format!(
                "target fidelity {target_fidelity} outside (0, 1]"
            )));
        }

        let id = ReservationId::new(self.reservations.len() as u32);
        self.reservations.push(Reservation::new(
            initiator,
            responder,
            start_time,
            end_time,
            memory_size,
            target_fidelity,
            is_virtual,
        ));
        self.statuses.insert(id, RequestStatus::Pending);

        let Self {
            timeline,
            topology,
            config,
            nodes,
            reservations,
            statuses,
            virtual_links,
        } = self;
        let mut ctx = Ctx {
            timeline,
            topology,
            config,
            reservations,
            statuses,
            virtual_links,
        };
        let outcome = match &mut nodes[initiator.index()] {
            NodeSlot::Router(node) => node.start_request(id, &mut ctx),
            NodeSlot::Bsm(_) => unreachable!("validated as a router"),
        };
        if let Err(err) = outcome {
            self.statuses.insert(id, RequestStatus::Rejected);
            return Err(err);
        }
        Ok(id)
    }

    /// Runs the simulation until the timeline drains or passes the stop
    /// time. Re-entrant: raise the stop time and call again to continue.
    pub fn run(&mut self) {
        while let Some(event) = self.timeline.next() {
            self.dispatch(event.kind);
        }
    }

    fn dispatch(&mut self, kind: EventKind) {
        let Self {
            timeline,
            topology,
            config,
            nodes,
            reservations,
            statuses,
            virtual_links,
        } = self;
        let mut ctx = Ctx {
            timeline,
            topology,
            config,
            reservations,
            statuses,
            virtual_links,
        };
        match kind {
            EventKind::Deliver { from, to, message } => match &mut nodes[to.index()] {
                NodeSlot::Router(node) => node.handle_message(from, message, &mut ctx),
                NodeSlot::Bsm(node) => node.handle_message(from, message, &mut ctx),
            },
            EventKind::LoadRules { node, reservation } => {
                router_slot(nodes, node).load_rules(reservation, &mut ctx);
            }
            EventKind::ExpireRules { node, reservation } => {
                router_slot(nodes, node).expire_rules(reservation);
            }
            EventKind::ResetMemory { node, memory } => {
                router_slot(nodes, node).reset_memory(memory, &mut ctx);
            }
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> Time {
        self.timeline.now()
    }

    /// Sets or clears the soft stop time.
    pub fn set_stop_time(&mut self, stop_time: Option<Time>) {
        self.timeline.set_stop_time(stop_time);
    }

    /// Total events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.timeline.events_processed()
    }

    /// The topology the network runs over.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Terminal status of a request.
    pub fn status(&self, id: ReservationId) -> &RequestStatus {
        &self.statuses[&id]
    }

    /// The approved path of a request, as node names.
    pub fn approved_path(&self, id: ReservationId) -> Option<Vec<String>> {
        match self.statuses.get(&id)? {
            RequestStatus::Approved { path } => Some(
                path.iter()
                    .map(|n| self.topology.name(*n).to_string())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Established virtual links, as name pairs.
    pub fn virtual_links(&self) -> Vec<(String, String)> {
        let mut links: Vec<(String, String)> = self
            .virtual_links
            .iter()
            .map(|(a, b)| {
                (
                    self.topology.name(*a).to_string(),
                    self.topology.name(*b).to_string(),
                )
            })
            .collect();
        links.sort();
        links
    }

    /// Snapshot of every memory on a router, the reporting surface for
    /// experiments.
    pub fn memories(&self, node: &str) -> Result<Vec<MemorySnapshot>> {
        let router = self.router(node)?;
        Ok(router
            .memories
            .iter()
            .map(|info| MemorySnapshot {
                index: info.index,
                state: info.state,
                remote_node: info.remote.map(|r| self.topology.name(r.node).to_string()),
                remote_memory: info.remote.map(|r| r.index),
                fidelity: info.fidelity,
                entangle_time: info.entangle_time,
            })
            .collect())
    }

    /// Memory indices a reservation holds on a router.
    pub fn reserved_memories(&self, node: &str, id: ReservationId) -> Result<Vec<usize>> {
        Ok(self.router(node)?.rsvp.reserved_indices(id))
    }

    /// Reservations a router has approved, in approval order.
    pub fn accepted_reservations(&self, node: &str) -> Result<Vec<ReservationId>> {
        Ok(self.router(node)?.rsvp.accepted.clone())
    }

    /// Number of active rules on a router.
    pub fn active_rules(&self, node: &str) -> Result<usize> {
        Ok(self.router(node)?.rules.active_count())
    }

    /// Sets the swapping success rate on one router's reservation protocol.
    pub fn set_swapping_success_rate(&mut self, node: &str, prob: f64) -> Result<()> {
        self.router_mut(node)?.rsvp.set_swapping_success_rate(prob);
        Ok(())
    }

    /// Sets the swapping degradation on one router's reservation protocol.
    pub fn set_swapping_degradation(&mut self, node: &str, degradation: f64) -> Result<()> {
        self.router_mut(node)?
            .rsvp
            .set_swapping_degradation(degradation);
        Ok(())
    }

    fn router_id(&self, name: &str) -> Result<NodeId> {
        let id = self.topology.id(name)?;
        if !self.topology.is_router(id) {
            return Err(NetError::InvalidRequest(format!(
                "{name} is a BSM node, not a router"
            )));
        }
        Ok(id)
    }

    fn router(&self, name: &str) -> Result<&RouterNode> {
        let id = self.router_id(name)?;
        match &self.nodes[id.index()] {
            NodeSlot::Router(node) => Ok(node),
            NodeSlot::Bsm(_) => unreachable!("validated as a router"),
        }
    }

    fn router_mut(&mut self, name: &str) -> Result<&mut RouterNode> {
        let id = self.router_id(name)?;
        match &mut self.nodes[id.index()] {
            NodeSlot::Router(node) => Ok(node),
            NodeSlot::Bsm(_) => unreachable!("validated as a router"),
        }
    }
}

fn router_slot(nodes: &mut [NodeSlot], id: NodeId) -> &mut RouterNode {
    match &mut nodes[id.index()] {
        NodeSlot::Router(node) => node,
        NodeSlot::Bsm(_) => panic!("event addressed to a BSM node"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telluride_sim::sec_to_ps;

    fn pair_network() -> Network {
        let topology = Topology::builder()
            .router("u", 4)
            .router("v", 4)
            .link("u", "v")
            .build(&NetworkConfig::default())
            .unwrap();
        Network::new(topology, NetworkConfig::default())
    }

    #[test]
    fn request_validates_preconditions() {
        let mut network = pair_network();

        assert!(matches!(
            network.request("u", "u", 100, 200, 1, 0.9),
            Err(NetError::InvalidRequest(_))
        ));
        assert!(matches!(
            network.request("u", "v", 0, 200, 1, 0.9),
            Err(NetError::InvalidRequest(_))
        ));
        assert!(matches!(
            network.request("u", "v", 200, 100, 1, 0.9),
            Err(NetError::InvalidRequest(_))
        ));
        assert!(matches!(
            network.request("u", "v", 100, 200, 0, 0.9),
            Err(NetError::InvalidRequest(_))
        ));
        assert!(matches!(
            network.request("u", "v", 100, 200, 1, 1.5),
            Err(NetError::InvalidRequest(_))
        ));
        assert!(matches!(
            network.request("u", "nope", 100, 200, 1, 0.9),
            Err(NetError::UnknownNode(_))
        ));
        assert!(matches!(
            network.request("u", "bsm.u.v", 100, 200, 1, 0.9),
            Err(NetError::InvalidRequest(_))
        ));
    }

    #[test]
    fn local_admission_failure_is_synchronous() {
        let mut network = pair_network();
        // The initiator only has 4 memories.
        let err = network
            .request("u", "v", sec_to_ps(1), sec_to_ps(2), 5, 0.9)
            .unwrap_err();
        assert!(matches!(err, NetError::AdmissionFailure { .. }));
    }

    #[test]
    fn unreachable_responder_rolls_back() {
        let topology = Topology::builder()
            .router("u", 4)
            .router("island", 4)
            .router("v", 4)
            .link("u", "v")
            .build(&NetworkConfig::default())
            .unwrap();
        let mut network = Network::new(topology, NetworkConfig::default());

        let err = network
            .request("u", "island", sec_to_ps(1), sec_to_ps(2), 1, 0.9)
            .unwrap_err();
        assert!(matches!(err, NetError::PathExhaustion { .. }));
        // The rolled-back request leaves the cards empty for a new one.
        let id = network
            .request("u", "v", sec_to_ps(1), sec_to_ps(2), 4, 0.9)
            .unwrap();
        assert_eq!(network.status(id), &RequestStatus::Pending);
    }
}
