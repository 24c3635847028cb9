//! Network topology: nodes, channels, and derived tables.
//!
//! The topology is immutable once built. It owns the string ↔ id table for
//! node names, the physical-adjacency relation (two routers are physical
//! neighbors when they share a BSM middle node), the per-middle generation
//! success probability supplied by the physical layer, the classical-delay
//! table, and the all-pairs shortest-distance matrix the greedy router
//! consults.
//!
//! Topologies come from a JSON file (shape fixed for compatibility with
//! existing configurations) or from [`TopologyBuilder`] in tests and
//! embeddings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use telluride_sim::{Time, ms_to_ps};

use crate::error::{NetError, Result};
use crate::ids::NodeId;

/// Default raw fidelity of a freshly generated pair.
pub const DEFAULT_MEMO_FIDELITY: f64 = 0.9349367588934053;

/// Simulation-wide tunables.
///
/// These are the knobs the original driver scripts set before issuing
/// requests; everything defaults to those scripts' baseline values.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Seed for the master RNG; every node forks its own stream from it.
    pub seed: u64,
    /// Fidelity assigned to a memory when generation succeeds.
    pub memo_fidelity: f64,
    /// Memory emission efficiency, enters the generation success rate.
    pub memo_efficiency: f64,
    /// Detector efficiency at BSM nodes, enters squared.
    pub detector_efficiency: f64,
    /// Classical channel delay used when no `cchannels` entry overrides it.
    pub default_classical_delay: Time,
    /// Success probability of an entanglement-swapping attempt.
    pub swap_success_prob: f64,
    /// Fidelity degradation factor applied by a successful swap.
    pub swap_degradation: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            memo_fidelity: DEFAULT_MEMO_FIDELITY,
            memo_efficiency: 1.0,
            detector_efficiency: 0.9,
            default_classical_delay: ms_to_ps(1),
            swap_success_prob: 1.0,
            swap_degradation: 0.95,
        }
    }
}

impl NetworkConfig {
    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the raw fidelity of generated pairs.
    pub fn with_memo_fidelity(mut self, fidelity: f64) -> Self {
        self.memo_fidelity = fidelity;
        self
    }

    /// Sets the swapping success probability and degradation.
    pub fn with_swapping(mut self, success_prob: f64, degradation: f64) -> Self {
        self.swap_success_prob = success_prob;
        self.swap_degradation = degradation;
        self
    }

    /// Sets the default classical channel delay.
    pub fn with_classical_delay(mut self, delay: Time) -> Self {
        self.default_classical_delay = delay;
        self
    }
}

// ============================================================================
// JSON topology file
// ============================================================================

/// On-disk topology description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySpec {
    /// All nodes, routers and BSM middles alike.
    pub nodes: Vec<NodeSpec>,
    /// Quantum channels; each connects a router to a BSM node.
    #[serde(default)]
    pub qchannels: Vec<QChannelSpec>,
    /// Classical channels overriding the default delay.
    #[serde(default)]
    pub cchannels: Vec<CChannelSpec>,
}

/// One node entry in the topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeTypeSpec,
    #[serde(default)]
    pub memo_size: usize,
}

/// Node classes understood by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeTypeSpec {
    QuantumRouter,
    #[serde(rename = "BSMNode")]
    BsmNode,
}

/// One quantum channel entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QChannelSpec {
    pub source: String,
    pub destination: String,
    pub attenuation: f64,
    pub distance: f64,
}

/// One classical channel entry. Delay is in picoseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CChannelSpec {
    pub source: String,
    pub destination: String,
    pub delay: u64,
}

// ============================================================================
// Topology
// ============================================================================

/// Node class with router payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Memory-equipped repeater node.
    Router {
        /// Number of quantum memories on the node.
        memo_size: usize,
    },
    /// Middle node performing Bell-state measurements.
    Bsm,
}

/// Immutable network topology with derived routing tables.
#[derive(Debug)]
pub struct Topology {
    names: Vec<String>,
    ids: HashMap<String, NodeId>,
    classes: Vec<NodeClass>,
    /// Per router: physical router neighbors, sorted by name.
    neighbors: Vec<Vec<NodeId>>,
    /// Per router: neighbor router → mediating BSM node.
    middles: Vec<HashMap<NodeId, NodeId>>,
    /// Per BSM node: generation success probability per attempt.
    bsm_success: Vec<f64>,
    /// All-pairs shortest distance over the physical router graph (meters).
    dist: Vec<Vec<f64>>,
    /// Static shortest-path forwarding table (kept for reference; the
    /// effective next hop is the greedy choice in `routing`).
    forwarding: Vec<HashMap<NodeId, NodeId>>,
    cdelays: HashMap<(NodeId, NodeId), Time>,
    default_cdelay: Time,
}

impl Topology {
    /// Builds a topology from a parsed spec.
    pub fn from_spec(spec: &TopologySpec, config: &NetworkConfig) -> Result<Self> {
        let mut builder = TopologyBuilder::new();
        for node in &spec.nodes {
            match node.kind {
                NodeTypeSpec::QuantumRouter => {
                    builder = builder.router(&node.name, node.memo_size);
                }
                NodeTypeSpec::BsmNode => {
                    builder.bsm_names.push(node.name.clone());
                }
            }
        }

        // Group quantum channels by their BSM endpoint.
        let mut by_bsm: HashMap<&str, Vec<&QChannelSpec>> = HashMap::new();
        for qc in &spec.qchannels {
            let bsm = if builder.bsm_names.iter().any(|n| n == &qc.source) {
                qc.source.as_str()
            } else if builder.bsm_names.iter().any(|n| n == &qc.destination) {
                qc.destination.as_str()
            } else {
                return Err(NetError::Topology(format!(
                    "qchannel {} -> {} has no BSM endpoint",
                    qc.source, qc.destination
                )));
            };
            by_bsm.entry(bsm).or_default().push(qc);
        }

        for bsm in &builder.bsm_names.clone() {
            let channels = by_bsm.remove(bsm.as_str()).unwrap_or_default();
            if channels.len() != 2 {
                return Err(NetError::Topology(format!(
                    "BSM node {bsm} has {} quantum channels, expected 2",
                    channels.len()
                )));
            }
            let router_of = |qc: &QChannelSpec| {
                if qc.source == *bsm {
                    qc.destination.clone()
                } else {
                    qc.source.clone()
                }
            };
            let (a, b) = (router_of(channels[0]), router_of(channels[1]));
            let distance = channels[0].distance + channels[1].distance;
            let attenuation = (channels[0].attenuation + channels[1].attenuation) / 2.0;
            builder.links.push(BuilderLink {
                a,
                b,
                middle: Some(bsm.clone()),
                distance,
                attenuation,
                success_prob: None,
            });
        }

        for cc in &spec.cchannels {
            builder = builder.classical_delay(&cc.source, &cc.destination, cc.delay);
        }

        builder.build(config)
    }

    /// Parses and builds a topology from a JSON string.
    pub fn from_json_str(json: &str, config: &NetworkConfig) -> Result<Self> {
        let spec: TopologySpec = serde_json::from_str(json)?;
        Self::from_spec(&spec, config)
    }

    /// Loads and builds a topology from a JSON file.
    pub fn from_json_file(path: &std::path::Path, config: &NetworkConfig) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text, config)
    }

    /// Starts a programmatic topology description.
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::new()
    }

    /// Resolves a node name to its id.
    pub fn id(&self, name: &str) -> Result<NodeId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| NetError::UnknownNode(name.to_string()))
    }

    /// Returns the name of a node.
    pub fn name(&self, id: NodeId) -> &str {
        &self.names[id.index()]
    }

    /// Total node count, routers and BSM nodes.
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Returns the class of a node.
    pub fn class(&self, id: NodeId) -> NodeClass {
        self.classes[id.index()]
    }

    /// Returns `true` when the node is a quantum router.
    pub fn is_router(&self, id: NodeId) -> bool {
        matches!(self.classes[id.index()], NodeClass::Router { .. })
    }

    /// Memory count of a router node.
    pub fn memo_size(&self, id: NodeId) -> usize {
        match self.classes[id.index()] {
            NodeClass::Router { memo_size } => memo_size,
            NodeClass::Bsm => 0,
        }
    }

    /// Physical router neighbors of a router, sorted by name.
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        &self.neighbors[id.index()]
    }

    /// Returns `true` when `a` and `b` share a BSM middle node.
    pub fn is_physical_neighbor(&self, a: NodeId, b: NodeId) -> bool {
        self.middles[a.index()].contains_key(&b)
    }

    /// The BSM node mediating the hop between two physical neighbors.
    pub fn middle_between(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        self.middles[a.index()].get(&b).copied()
    }

    /// Generation success probability per attempt at a BSM node.
    pub fn bsm_success_prob(&self, bsm: NodeId) -> f64 {
        self.bsm_success[bsm.index()]
    }

    /// Shortest physical distance between two routers (meters).
    ///
    /// Returns `f64::INFINITY` when no physical path exists.
    pub fn distance(&self, a: NodeId, b: NodeId) -> f64 {
        self.dist[a.index()][b.index()]
    }

    /// Static shortest-path next hop. Reference data only; forwarding uses
    /// the greedy selection in [`crate::routing`].
    pub fn static_next_hop(&self, from: NodeId, destination: NodeId) -> Option<NodeId> {
        self.forwarding[from.index()].get(&destination).copied()
    }

    /// Classical channel delay between two nodes.
    pub fn classical_delay(&self, a: NodeId, b: NodeId) -> Time {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.cdelays.get(&key).copied().unwrap_or(self.default_cdelay)
    }

    /// Iterates all router ids in id order.
    pub fn routers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.names.len())
            .map(|i| NodeId::new(i as u32))
            .filter(|id| self.is_router(*id))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Options for one physical hop added through the builder.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Total hop length in meters.
    pub distance: f64,
    /// Channel attenuation coefficient.
    pub attenuation: f64,
    /// Explicit per-attempt success probability, bypassing the formula.
    pub success_prob: Option<f64>,
    /// Name for the mediating BSM node; generated when absent.
    pub middle: Option<String>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            distance: 1_000.0,
            attenuation: 1e-5,
            success_prob: None,
            middle: None,
        }
    }
}

#[derive(Debug, Clone)]
struct BuilderLink {
    a: String,
    b: String,
    middle: Option<String>,
    distance: f64,
    attenuation: f64,
    success_prob: Option<f64>,
}

/// Programmatic topology construction.
pub struct TopologyBuilder {
    routers: Vec<(String, usize)>,
    bsm_names: Vec<String>,
    links: Vec<BuilderLink>,
    cdelays: Vec<(String, String, Time)>,
}

impl TopologyBuilder {
    fn new() -> Self {
        Self {
            routers: Vec::new(),
            bsm_names: Vec::new(),
            links: Vec::new(),
            cdelays: Vec::new(),
        }
    }

    /// Adds a router node with the given memory count.
    pub fn router(mut self, name: &str, memo_size: usize) -> Self {
        self.routers.push((name.to_string(), memo_size));
        self
    }

    /// Adds a physical hop between two routers with default options.
    pub fn link(self, a: &str, b: &str) -> Self {
        self.link_with(a, b, LinkOptions::default())
    }

    /// Adds a physical hop between two routers.
    pub fn link_with(mut self, a: &str, b: &str, opts: LinkOptions) -> Self {
        self.links.push(BuilderLink {
            a: a.to_string(),
            b: b.to_string(),
            middle: opts.middle,
            distance: opts.distance,
            attenuation: opts.attenuation,
            success_prob: opts.success_prob,
        });
        self
    }

    /// Overrides the classical delay between two nodes.
    pub fn classical_delay(mut self, a: &str, b: &str, delay: Time) -> Self {
        self.cdelays.push((a.to_string(), b.to_string(), delay));
        self
    }

    /// Finalizes the topology, interning names and deriving the routing
    /// tables.
    pub fn build(self, config: &NetworkConfig) -> Result<Topology> {
        let mut names = Vec::new();
        let mut ids = HashMap::new();
        let mut classes = Vec::new();

        let intern = |name: &str, class: NodeClass, names: &mut Vec<String>,
                          ids: &mut HashMap<String, NodeId>,
                          classes: &mut Vec<NodeClass>|
         -> Result<NodeId> {
            if ids.contains_key(name) {
                return Err(NetError::Topology(format!("duplicate node name: {name}")));
            }
            let id = NodeId::new(names.len() as u32);
            names.push(name.to_string());
            ids.insert(name.to_string(), id);
            classes.push(class);
            Ok(id)
        };

        for (name, memo_size) in &self.routers {
            if *memo_size == 0 {
                return Err(NetError::Topology(format!(
                    "router {name} has no memories"
                )));
            }
            intern(
                name,
                NodeClass::Router {
                    memo_size: *memo_size,
                },
                &mut names,
                &mut ids,
                &mut classes,
            )?;
        }
        for name in &self.bsm_names {
            intern(name, NodeClass::Bsm, &mut names, &mut ids, &mut classes)?;
        }

        let lookup = |name: &str, ids: &HashMap<String, NodeId>| -> Result<NodeId> {
            ids.get(name)
                .copied()
                .ok_or_else(|| NetError::UnknownNode(name.to_string()))
        };

        let mut neighbors: Vec<Vec<NodeId>> = vec![Vec::new(); names.len()];
        let mut middles: Vec<HashMap<NodeId, NodeId>> = vec![HashMap::new(); names.len()];
        let mut bsm_success: Vec<f64> = vec![0.0; names.len()];
        let mut hop_dist: HashMap<(NodeId, NodeId), f64> = HashMap::new();

        for link in &self.links {
            let a = lookup(&link.a, &ids)?;
            let b = lookup(&link.b, &ids)?;
            if !matches!(classes[a.index()], NodeClass::Router { .. })
                || !matches!(classes[b.index()], NodeClass::Router { .. })
            {
                return Err(NetError::Topology(format!(
                    "link {} -- {} must join two routers",
                    link.a, link.b
                )));
            }
            let middle_name = link
                .middle
                .clone()
                .unwrap_or_else(|| format!("bsm.{}.{}", link.a, link.b));
            let middle = if let Some(id) = ids.get(&middle_name).copied() {
                id
            } else {
                intern(
                    &middle_name,
                    NodeClass::Bsm,
                    &mut names,
                    &mut ids,
                    &mut classes,
                )?
            };
            if classes[middle.index()] != NodeClass::Bsm {
                return Err(NetError::Topology(format!(
                    "middle node {middle_name} is not a BSM node"
                )));
            }

            // Physical layer contract: eta_a * eta_b * eta_det^2 * (1 - e^{-alpha L}).
            let success = link.success_prob.unwrap_or_else(|| {
                config.memo_efficiency
                    * config.memo_efficiency
                    * config.detector_efficiency
                    * config.detector_efficiency
                    * (1.0 - (-link.attenuation * link.distance).exp())
            });

            neighbors[a.index()].push(b);
            neighbors[b.index()].push(a);
            middles[a.index()].insert(b, middle);
            middles[b.index()].insert(a, middle);
            while bsm_success.len() < names.len() {
                bsm_success.push(0.0);
            }
            bsm_success[middle.index()] = success;
            let key = if a <= b { (a, b) } else { (b, a) };
            let entry = hop_dist.entry(key).or_insert(f64::INFINITY);
            *entry = entry.min(link.distance);
        }

        // Late-interned middle nodes grew the name table past the initial
        // per-node arrays.
        neighbors.resize(names.len(), Vec::new());
        middles.resize(names.len(), HashMap::new());

        for list in &mut neighbors {
            list.sort_by(|x, y| names[x.index()].cmp(&names[y.index()]));
            list.dedup();
        }

        // All-pairs shortest distances (Floyd-Warshall) over routers, plus
        // next-hop reconstruction for the static forwarding table.
        let n = names.len();
        let mut dist = vec![vec![f64::INFINITY; n]; n];
        let mut next: Vec<HashMap<NodeId, NodeId>> = vec![HashMap::new(); n];
        for i in 0..n {
            dist[i][i] = 0.0;
        }
        for (&(a, b), &d) in &hop_dist {
            dist[a.index()][b.index()] = d;
            dist[b.index()][a.index()] = d;
            next[a.index()].insert(b, b);
            next[b.index()].insert(a, a);
        }
        for k in 0..n {
            for i in 0..n {
                if !dist[i][k].is_finite() {
                    continue;
                }
                for j in 0..n {
                    let through = dist[i][k] + dist[k][j];
                    if through < dist[i][j] {
                        dist[i][j] = through;
                        let hop = next[i][&NodeId::new(k as u32)];
                        next[i].insert(NodeId::new(j as u32), hop);
                    }
                }
            }
        }

        let mut cdelays = HashMap::new();
        for (a, b, delay) in &self.cdelays {
            let a = lookup(a, &ids)?;
            let b = lookup(b, &ids)?;
            let key = if a <= b { (a, b) } else { (b, a) };
            cdelays.insert(key, *delay);
        }

        Ok(Topology {
            names,
            ids,
            classes,
            neighbors,
            middles,
            bsm_success,
            dist,
            forwarding: next,
            cdelays,
            default_cdelay: config.default_classical_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_topology() -> Topology {
        Topology::builder()
            .router("a", 4)
            .router("b", 4)
            .router("c", 4)
            .link("a", "b")
            .link("b", "c")
            .build(&NetworkConfig::default())
            .unwrap()
    }

    #[test]
    fn builder_interns_and_classifies_nodes() {
        let topo = line_topology();
        assert_eq!(topo.node_count(), 5); // 3 routers + 2 generated BSMs

        let a = topo.id("a").unwrap();
        assert!(topo.is_router(a));
        assert_eq!(topo.memo_size(a), 4);
        assert_eq!(topo.name(a), "a");

        let bsm = topo.id("bsm.a.b").unwrap();
        assert!(!topo.is_router(bsm));
    }

    #[test]
    fn physical_adjacency_goes_through_bsm() {
        let topo = line_topology();
        let (a, b, c) = (
            topo.id("a").unwrap(),
            topo.id("b").unwrap(),
            topo.id("c").unwrap(),
        );

        assert!(topo.is_physical_neighbor(a, b));
        assert!(topo.is_physical_neighbor(b, a));
        assert!(!topo.is_physical_neighbor(a, c));
        assert_eq!(topo.middle_between(a, b), topo.middle_between(b, a));
        assert_eq!(topo.neighbors(b), &[a, c]);
    }

    #[test]
    fn all_pairs_distances() {
        let topo = line_topology();
        let (a, b, c) = (
            topo.id("a").unwrap(),
            topo.id("b").unwrap(),
            topo.id("c").unwrap(),
        );

        assert!((topo.distance(a, b) - 1_000.0).abs() < 1e-9);
        assert!((topo.distance(a, c) - 2_000.0).abs() < 1e-9);
        assert_eq!(topo.static_next_hop(a, c), Some(b));
    }

    #[test]
    fn unreachable_routers_have_infinite_distance() {
        let topo = Topology::builder()
            .router("a", 1)
            .router("b", 1)
            .router("island", 1)
            .link("a", "b")
            .build(&NetworkConfig::default())
            .unwrap();
        let a = topo.id("a").unwrap();
        let island = topo.id("island").unwrap();
        assert!(!topo.distance(a, island).is_finite());
        assert_eq!(topo.static_next_hop(a, island), None);
    }

    #[test]
    fn explicit_success_prob_overrides_formula() {
        let topo = Topology::builder()
            .router("a", 1)
            .router("b", 1)
            .link_with(
                "a",
                "b",
                LinkOptions {
                    success_prob: Some(0.5),
                    ..LinkOptions::default()
                },
            )
            .build(&NetworkConfig::default())
            .unwrap();
        let mid = topo.id("bsm.a.b").unwrap();
        assert!((topo.bsm_success_prob(mid) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn derived_success_prob_uses_physical_formula() {
        let config = NetworkConfig::default();
        let topo = Topology::builder()
            .router("a", 1)
            .router("b", 1)
            .link_with(
                "a",
                "b",
                LinkOptions {
                    distance: 1_000.0,
                    attenuation: 1e-5,
                    ..LinkOptions::default()
                },
            )
            .build(&config)
            .unwrap();
        let mid = topo.id("bsm.a.b").unwrap();
        let expected = 0.9 * 0.9 * (1.0 - (-1e-5f64 * 1_000.0).exp());
        assert!((topo.bsm_success_prob(mid) - expected).abs() < 1e-12);
    }

    #[test]
    fn classical_delay_defaults_and_overrides() {
        let topo = Topology::builder()
            .router("a", 1)
            .router("b", 1)
            .link("a", "b")
            .classical_delay("a", "b", 42)
            .build(&NetworkConfig::default())
            .unwrap();
        let (a, b) = (topo.id("a").unwrap(), topo.id("b").unwrap());
        let bsm = topo.id("bsm.a.b").unwrap();

        assert_eq!(topo.classical_delay(a, b), 42);
        assert_eq!(topo.classical_delay(b, a), 42);
        assert_eq!(topo.classical_delay(a, bsm), ms_to_ps(1));
    }

    #[test]
    fn json_round_trip() {
        let json = r#"{
            "nodes": [
                {"name": "u", "type": "QuantumRouter", "memo_size": 8},
                {"name": "v", "type": "QuantumRouter", "memo_size": 8},
                {"name": "m", "type": "BSMNode", "memo_size": 0}
            ],
            "qchannels": [
                {"source": "u", "destination": "m", "attenuation": 1e-5, "distance": 500.0},
                {"source": "v", "destination": "m", "attenuation": 1e-5, "distance": 500.0}
            ],
            "cchannels": [
                {"source": "u", "destination": "v", "delay": 1000000000}
            ]
        }"#;
        let topo = Topology::from_json_str(json, &NetworkConfig::default()).unwrap();
        let (u, v) = (topo.id("u").unwrap(), topo.id("v").unwrap());

        assert!(topo.is_physical_neighbor(u, v));
        assert_eq!(topo.middle_between(u, v), Some(topo.id("m").unwrap()));
        assert!((topo.distance(u, v) - 1_000.0).abs() < 1e-9);
        assert_eq!(topo.classical_delay(u, v), 1_000_000_000);
    }

    #[test]
    fn bsm_with_one_channel_is_rejected() {
        let json = r#"{
            "nodes": [
                {"name": "u", "type": "QuantumRouter", "memo_size": 1},
                {"name": "m", "type": "BSMNode", "memo_size": 0}
            ],
            "qchannels": [
                {"source": "u", "destination": "m", "attenuation": 1e-5, "distance": 500.0}
            ],
            "cchannels": []
        }"#;
        let err = Topology::from_json_str(json, &NetworkConfig::default()).unwrap_err();
        assert!(matches!(err, NetError::Topology(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Topology::builder()
            .router("a", 1)
            .router("a", 1)
            .build(&NetworkConfig::default())
            .unwrap_err();
        assert!(matches!(err, NetError::Topology(_)));
    }

    #[test]
    fn memoryless_router_is_rejected() {
        let err = Topology::builder()
            .router("a", 0)
            .build(&NetworkConfig::default())
            .unwrap_err();
        assert!(matches!(err, NetError::Topology(_)));
    }
}
