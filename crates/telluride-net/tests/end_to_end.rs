//! End-to-end scenarios over full network stacks.
//!
//! These tests drive the public request surface and observe the per-memory
//! reporting surface, covering the admission protocol, the rule engine,
//! and the three sub-protocols together.

use telluride_net::{
    LinkOptions, NetError, Network, NetworkConfig, RequestStatus, Topology, purified_fidelity,
};
use telluride_sim::{Time, sec_to_ps};

const MEMO_FIDELITY: f64 = 0.9349367588934053;

/// Linear chain u - a - b - c - v with a BSM middle per hop.
fn chain_topology(memo: usize, success_prob: f64, config: &NetworkConfig) -> Topology {
    let mut builder = Topology::builder();
    for name in ["u", "a", "b", "c", "v"] {
        builder = builder.router(name, memo);
    }
    for (left, right) in [("u", "a"), ("a", "b"), ("b", "c"), ("c", "v")] {
        builder = builder.link_with(
            left,
            right,
            LinkOptions {
                success_prob: Some(success_prob),
                ..LinkOptions::default()
            },
        );
    }
    builder.build(config).unwrap()
}

fn pair_topology(memo: usize, success_prob: f64, config: &NetworkConfig) -> Topology {
    Topology::builder()
        .router("u", memo)
        .router("v", memo)
        .link_with(
            "u",
            "v",
            LinkOptions {
                success_prob: Some(success_prob),
                ..LinkOptions::default()
            },
        )
        .build(config)
        .unwrap()
}

/// Every entangled memory must have a symmetric remote half.
fn assert_symmetric_pairs(network: &Network, nodes: &[&str]) {
    for node in nodes {
        for memory in network.memories(node).unwrap() {
            let Some(remote_node) = &memory.remote_node else {
                continue;
            };
            let remote = network.memories(remote_node).unwrap();
            let half = &remote[memory.remote_memory.unwrap()];
            assert_eq!(
                half.remote_node.as_deref(),
                Some(*node),
                "{node}.m{} points at {remote_node} but not back",
                memory.index
            );
            assert_eq!(half.remote_memory, Some(memory.index));
            assert!(
                (half.fidelity - memory.fidelity).abs() < 1e-12,
                "pair fidelities diverged: {} vs {}",
                half.fidelity,
                memory.fidelity
            );
        }
    }
}

#[test]
fn happy_path_linear_chain() {
    let config = NetworkConfig::default()
        .with_seed(7)
        .with_memo_fidelity(MEMO_FIDELITY)
        .with_swapping(0.9, 0.99);
    let topology = chain_topology(10, 0.1, &config);
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(2), sec_to_ps(10), 5, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(9)));
    network.run();

    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));
    assert_eq!(
        network.approved_path(request).unwrap(),
        vec!["u", "a", "b", "c", "v"]
    );

    let end_to_end: Vec<_> = network
        .memories("u")
        .unwrap()
        .into_iter()
        .filter(|m| m.remote_node.as_deref() == Some("v") && m.fidelity >= 0.9)
        .collect();
    assert!(
        !end_to_end.is_empty(),
        "initiator never reached the responder: {:?}",
        network.memories("u").unwrap()
    );
    assert_symmetric_pairs(&network, &["u", "a", "b", "c", "v"]);
}

#[test]
fn memory_conservation_along_the_path() {
    let config = NetworkConfig::default().with_seed(3);
    let topology = chain_topology(10, 0.1, &config);
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(2), sec_to_ps(4), 2, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1)));
    network.run();

    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));
    // Endpoints contribute M memories, middles 2M: 2 * (|path| - 1) * M.
    let mut total = 0;
    for (node, expected) in [("u", 2), ("a", 4), ("b", 4), ("c", 4), ("v", 2)] {
        let reserved = network.reserved_memories(node, request).unwrap();
        assert_eq!(reserved.len(), expected, "wrong share at {node}");
        total += reserved.len();
    }
    assert_eq!(total, 2 * 4 * 2);
}

#[test]
fn contention_admits_exactly_one() {
    let config = NetworkConfig::default().with_seed(11);
    // Both paths cross b, whose ten memories satisfy one reservation only.
    let mut builder = Topology::builder();
    for (name, memo) in [
        ("u", 10),
        ("a", 10),
        ("b", 10),
        ("c", 10),
        ("v", 10),
        ("s", 10),
        ("t", 10),
    ] {
        builder = builder.router(name, memo);
    }
    for (left, right) in [
        ("u", "a"),
        ("a", "b"),
        ("b", "c"),
        ("c", "v"),
        ("s", "b"),
        ("b", "t"),
    ] {
        builder = builder.link(left, right);
    }
    let topology = builder.build(&config).unwrap();
    let mut network = Network::new(topology, config);

    let first = network
        .request("u", "v", sec_to_ps(2), sec_to_ps(10), 5, 0.9)
        .unwrap();
    let second = network
        .request("s", "t", sec_to_ps(2), sec_to_ps(10), 5, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1)));
    network.run();

    let statuses = [network.status(first), network.status(second)];
    let approved = statuses
        .iter()
        .filter(|s| matches!(s, RequestStatus::Approved { .. }))
        .count();
    let rejected = statuses
        .iter()
        .filter(|s| matches!(s, RequestStatus::Rejected))
        .count();
    assert_eq!((approved, rejected), (1, 1), "statuses: {statuses:?}");

    // The unwound request left no trace on the shared node's cards.
    let loser = if matches!(network.status(first), RequestStatus::Rejected) {
        first
    } else {
        second
    };
    assert!(network.reserved_memories("b", loser).unwrap().is_empty());
    assert!(network.reserved_memories("a", loser).unwrap().is_empty());
}

#[test]
fn disjoint_windows_both_approve() {
    let config = NetworkConfig::default().with_seed(5);
    let topology = pair_topology(6, 0.2, &config);
    let mut network = Network::new(topology, config);

    let first = network
        .request("u", "v", sec_to_ps(2), sec_to_ps(4), 6, 0.9)
        .unwrap();
    let second = network
        .request("u", "v", sec_to_ps(5), sec_to_ps(8), 6, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1)));
    network.run();

    assert!(matches!(
        network.status(first),
        RequestStatus::Approved { .. }
    ));
    assert!(matches!(
        network.status(second),
        RequestStatus::Approved { .. }
    ));
}

#[test]
fn virtual_reservation_overlaps_physical() {
    let config = NetworkConfig::default().with_seed(9);
    let topology = pair_topology(4, 0.2, &config);
    let mut network = Network::new(topology, config);

    let physical = network
        .request("u", "v", sec_to_ps(2), sec_to_ps(4), 4, 0.9)
        .unwrap();
    let virtual_link = network
        .request_with("u", "v", sec_to_ps(2), sec_to_ps(4), 4, 0.9, true)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1)));
    network.run();

    assert!(matches!(
        network.status(physical),
        RequestStatus::Approved { .. }
    ));
    assert!(matches!(
        network.status(virtual_link),
        RequestStatus::Approved { .. }
    ));
    assert_eq!(
        network.virtual_links(),
        vec![("u".to_string(), "v".to_string())]
    );
}

#[test]
fn greedy_forwarding_beats_the_shortest_path() {
    let config = NetworkConfig::default().with_seed(2);
    // From u, neighbor a is closer to v than neighbor b, but the b route
    // is shorter end to end. The greedy choice must win.
    let topology = Topology::builder()
        .router("u", 6)
        .router("v", 6)
        .router("a", 6)
        .router("b", 6)
        .link_with("u", "a", LinkOptions { distance: 1_000.0, success_prob: Some(0.2), ..LinkOptions::default() })
        .link_with("u", "b", LinkOptions { distance: 100.0, success_prob: Some(0.2), ..LinkOptions::default() })
        .link_with("a", "v", LinkOptions { distance: 200.0, success_prob: Some(0.2), ..LinkOptions::default() })
        .link_with("b", "v", LinkOptions { distance: 300.0, success_prob: Some(0.2), ..LinkOptions::default() })
        .build(&config)
        .unwrap();
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(2), sec_to_ps(4), 2, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1)));
    network.run();

    assert_eq!(network.approved_path(request).unwrap(), vec!["u", "a", "v"]);
}

#[test]
fn single_swap_degrades_fidelity() {
    // Path length 3: one middle, one swap, no purification needed.
    let config = NetworkConfig::default()
        .with_seed(13)
        .with_memo_fidelity(MEMO_FIDELITY)
        .with_swapping(1.0, 0.95);
    let topology = Topology::builder()
        .router("u", 4)
        .router("a", 8)
        .router("v", 4)
        .link_with("u", "a", LinkOptions { success_prob: Some(0.2), ..LinkOptions::default() })
        .link_with("a", "v", LinkOptions { success_prob: Some(0.2), ..LinkOptions::default() })
        .build(&config)
        .unwrap();
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(8), 2, 0.85)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(7)));
    network.run();

    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));
    let expected = MEMO_FIDELITY * 0.95;
    let swapped: Vec<_> = network
        .memories("u")
        .unwrap()
        .into_iter()
        .filter(|m| m.remote_node.as_deref() == Some("v"))
        .collect();
    assert!(!swapped.is_empty(), "no end-to-end pair after the swap");
    for memory in &swapped {
        assert!(
            (memory.fidelity - expected).abs() < 1e-9,
            "fidelity {} != {expected}",
            memory.fidelity
        );
    }
    assert_symmetric_pairs(&network, &["u", "a", "v"]);
}

#[test]
fn direct_neighbors_need_no_swap() {
    // Path length 2: generation alone must reach the responder.
    let config = NetworkConfig::default()
        .with_seed(17)
        .with_memo_fidelity(MEMO_FIDELITY);
    let topology = pair_topology(3, 0.2, &config);
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(4), 3, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(3)));
    network.run();

    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));
    let done = network
        .memories("u")
        .unwrap()
        .into_iter()
        .filter(|m| m.remote_node.as_deref() == Some("v"))
        .count();
    assert!(done >= 1, "no direct pair generated");
    assert_symmetric_pairs(&network, &["u", "v"]);
}

#[test]
fn purification_lifts_fidelity_by_the_canonical_formula() {
    let raw = 0.8;
    let config = NetworkConfig::default().with_seed(23).with_memo_fidelity(raw);
    let topology = pair_topology(2, 0.25, &config);
    let mut network = Network::new(topology, config);

    network
        .request("u", "v", sec_to_ps(1), sec_to_ps(20), 2, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(19)));
    network.run();

    let expected = purified_fidelity(raw);
    let lifted: Vec<_> = network
        .memories("v")
        .unwrap()
        .into_iter()
        .filter(|m| m.fidelity > raw)
        .collect();
    assert!(
        !lifted.is_empty(),
        "no purified pair: {:?}",
        network.memories("v").unwrap()
    );
    for memory in &lifted {
        assert!(
            (memory.fidelity - expected).abs() < 1e-9,
            "lifted fidelity {} is not BBPSSW({raw}) = {expected}",
            memory.fidelity
        );
    }
    assert_symmetric_pairs(&network, &["u", "v"]);
}

#[test]
fn zero_success_probability_never_entangles() {
    let config = NetworkConfig::default().with_seed(29);
    let topology = pair_topology(2, 0.0, &config);
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(2), 2, 0.9)
        .unwrap();
    network.run();

    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));
    // The simulation terminated (run returned) and nothing ever reached
    // ENTANGLED; after the window every memory is RAW again.
    for node in ["u", "v"] {
        for memory in network.memories(node).unwrap() {
            assert_eq!(memory.state, telluride_net::MemoryState::Raw);
            assert!(memory.remote_node.is_none());
        }
    }
}

#[test]
fn reservation_end_cleans_everything() {
    let config = NetworkConfig::default().with_seed(31);
    let topology = chain_topology(6, 0.2, &config);
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(3), 3, 0.9)
        .unwrap();
    network.run();

    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));
    assert!(network.now() >= sec_to_ps(3));
    for node in ["u", "a", "b", "c", "v"] {
        assert_eq!(network.active_rules(node).unwrap(), 0, "rules left at {node}");
        for memory in network.memories(node).unwrap() {
            assert_eq!(
                memory.state,
                telluride_net::MemoryState::Raw,
                "{node}.m{} not restored",
                memory.index
            );
        }
    }
}

#[test]
fn exact_capacity_fits() {
    let config = NetworkConfig::default().with_seed(37);
    let topology = pair_topology(4, 0.2, &config);
    let mut network = Network::new(topology, config);

    // memory_size equals the full memory array on both endpoints.
    let request = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(2), 4, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1) / 2));
    network.run();
    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));

    // One more pair does not fit anywhere in the same window.
    let err = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(2), 1, 0.9)
        .unwrap_err();
    assert!(matches!(err, NetError::AdmissionFailure { .. }));
}

#[test]
fn reruns_with_the_same_seed_are_identical() {
    let run = || {
        let config = NetworkConfig::default()
            .with_seed(101)
            .with_memo_fidelity(MEMO_FIDELITY)
            .with_swapping(0.9, 0.99);
        let topology = chain_topology(6, 0.15, &config);
        let mut network = Network::new(topology, config);
        network
            .request("u", "v", sec_to_ps(2), sec_to_ps(6), 2, 0.9)
            .unwrap();
        network.set_stop_time(Some(sec_to_ps(5)));
        network.run();
        let snapshot: Vec<String> = ["u", "a", "b", "c", "v"]
            .iter()
            .flat_map(|n| {
                network
                    .memories(n)
                    .unwrap()
                    .into_iter()
                    .map(move |m| format!("{n} {m:?}"))
            })
            .collect();
        (network.events_processed(), snapshot)
    };

    assert_eq!(run(), run());
}

#[test]
fn stop_time_pauses_and_resumes() {
    let config = NetworkConfig::default().with_seed(41);
    let topology = pair_topology(2, 0.2, &config);
    let mut network = Network::new(topology, config);

    let request = network
        .request("u", "v", sec_to_ps(1), sec_to_ps(3), 2, 0.9)
        .unwrap();
    network.set_stop_time(Some(sec_to_ps(1) / 100));
    network.run();
    let paused_at: Time = network.now();
    assert!(paused_at < sec_to_ps(1) / 100);
    assert!(matches!(
        network.status(request),
        RequestStatus::Approved { .. }
    ));

    // Raising the stop time continues the same run.
    network.set_stop_time(Some(sec_to_ps(2)));
    network.run();
    assert!(network.now() > paused_at);
}
