//! Greedy next-hop selection.
//!
//! Forwarding is greedy over the all-pairs shortest-distance matrix
//! restricted to the current node's *physical* neighbors: pick the
//! neighbor closest to the destination, breaking ties by lexicographic
//! node name. Virtual links never appear in the candidate set. The greedy
//! choice can differ from the global shortest path; that is the documented
//! behavior, and the static forwarding table on the topology exists only
//! as reference data.

use crate::error::{NetError, Result};
use crate::ids::NodeId;
use crate::topology::Topology;

/// Picks the next hop from `from` toward `destination`.
///
/// Fails with [`NetError::PathExhaustion`] when no physical neighbor has a
/// finite distance to the destination (greedy dead-end).
pub fn next_hop(topology: &Topology, from: NodeId, destination: NodeId) -> Result<NodeId> {
    debug_assert_ne!(from, destination, "routing to self");
    let mut best: Option<(f64, NodeId)> = None;
    for &neighbor in topology.neighbors(from) {
        let distance = topology.distance(neighbor, destination);
        if !distance.is_finite() {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_distance, best_node)) => {
                distance < best_distance
                    || (distance == best_distance
                        && topology.name(neighbor) < topology.name(best_node))
            }
        };
        if better {
            best = Some((distance, neighbor));
        }
    }
    best.map(|(_, node)| node).ok_or_else(|| NetError::PathExhaustion {
        node: topology.name(from).to_string(),
        destination: topology.name(destination).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{LinkOptions, NetworkConfig, Topology};

    #[test]
    fn direct_neighbor_wins() {
        let topo = Topology::builder()
            .router("a", 1)
            .router("b", 1)
            .router("c", 1)
            .link("a", "b")
            .link("b", "c")
            .build(&NetworkConfig::default())
            .unwrap();
        let (a, b, c) = (
            topo.id("a").unwrap(),
            topo.id("b").unwrap(),
            topo.id("c").unwrap(),
        );

        assert_eq!(next_hop(&topo, a, c).unwrap(), b);
        assert_eq!(next_hop(&topo, b, c).unwrap(), c);
    }

    #[test]
    fn greedy_can_disagree_with_shortest_path() {
        // From u, neighbor a sits closer to v (distance 200) than neighbor
        // b (300), so greedy picks a even though the u-b-v path is shorter
        // end to end (100 + 300 < 1000 + 200).
        let topo = Topology::builder()
            .router("u", 1)
            .router("v", 1)
            .router("a", 1)
            .router("b", 1)
            .link_with("u", "a", LinkOptions { distance: 1_000.0, ..LinkOptions::default() })
            .link_with("u", "b", LinkOptions { distance: 100.0, ..LinkOptions::default() })
            .link_with("a", "v", LinkOptions { distance: 200.0, ..LinkOptions::default() })
            .link_with("b", "v", LinkOptions { distance: 300.0, ..LinkOptions::default() })
            .build(&NetworkConfig::default())
            .unwrap();
        let (u, v, a, b) = (
            topo.id("u").unwrap(),
            topo.id("v").unwrap(),
            topo.id("a").unwrap(),
            topo.id("b").unwrap(),
        );

        assert_eq!(next_hop(&topo, u, v).unwrap(), a);
        // The static table still records the true shortest path.
        assert_eq!(topo.static_next_hop(u, v), Some(b));
    }

    #[test]
    fn ties_break_lexicographically() {
        let topo = Topology::builder()
            .router("u", 1)
            .router("v", 1)
            .router("beta", 1)
            .router("alpha", 1)
            .link("u", "beta")
            .link("u", "alpha")
            .link("beta", "v")
            .link("alpha", "v")
            .build(&NetworkConfig::default())
            .unwrap();
        let (u, v) = (topo.id("u").unwrap(), topo.id("v").unwrap());

        assert_eq!(next_hop(&topo, u, v).unwrap(), topo.id("alpha").unwrap());
    }

    #[test]
    fn dead_end_is_path_exhaustion() {
        let topo = Topology::builder()
            .router("a", 1)
            .router("b", 1)
            .router("island", 1)
            .link("a", "b")
            .build(&NetworkConfig::default())
            .unwrap();
        let (a, island) = (topo.id("a").unwrap(), topo.id("island").unwrap());

        let err = next_hop(&topo, a, island).unwrap_err();
        assert!(matches!(err, NetError::PathExhaustion { .. }));
    }
}
