//! # telluride-net: network management for quantum repeater simulation
//!
//! This crate is the network-management layer of the Telluride simulator:
//! it turns an entanglement request at one node into a reserved,
//! rule-driven schedule of generation, purification, and swapping
//! operations along a multi-hop path, executed over the deterministic
//! discrete-event kernel in `telluride-sim`.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Network                               │
//! │   Timeline    Topology    reservation arena    request surface │
//! │                                                                │
//! │  ┌──────────────────────────┐   ┌─────────────────────────┐    │
//! │  │       RouterNode         │   │        BsmNode          │    │
//! │  │  MemoryManager           │   │  trigger pairing        │    │
//! │  │  RuleManager             │   │  success draw           │    │
//! │  │  reservation protocol    │   └─────────────────────────┘    │
//! │  │  transient protocols     │                                  │
//! │  └──────────────────────────┘                                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request travels as REQUEST hop by hop toward the responder,
//! reserving memory time-slots; the responder fixes the path and APPROVE
//! installs condition/action rules on the way back. From the reservation's
//! start time the rules react to memory state changes, spawning the paired
//! sub-protocols that drive the entanglement pipeline until the end-to-end
//! pair exists or the window closes.
//!
//! ## Quick start
//!
//! ```
//! use telluride_net::{Network, NetworkConfig, Topology};
//! use telluride_sim::sec_to_ps;
//!
//! let topology = Topology::builder()
//!     .router("u", 8)
//!     .router("v", 8)
//!     .link("u", "v")
//!     .build(&NetworkConfig::default())
//!     .unwrap();
//! let mut network = Network::new(topology, NetworkConfig::default());
//!
//! let request = network
//!     .request("u", "v", sec_to_ps(1), sec_to_ps(3), 2, 0.9)
//!     .unwrap();
//! network.run();
//!
//! for memory in network.memories("u").unwrap() {
//!     println!("{} {:?} {}", memory.index, memory.remote_node, memory.fidelity);
//! }
//! # let _ = request;
//! ```

mod bsm;
mod error;
mod ids;
mod memory;
mod message;
mod network;
mod node;
mod protocols;
mod reservation;
pub mod routing;
mod rules;
mod topology;

pub use bsm::BsmNode;
pub use error::{NetError, Result};
pub use ids::{MemoryRef, NodeId, ProtocolId, ReservationId, RuleId};
pub use memory::{MemoryInfo, MemoryManager, MemoryState};
pub use message::{
    BsmTrigger, GenerationMessage, Matcher, Message, PairingMessage, PurificationMessage,
    RsvpKind, RsvpMessage, SwappingMessage,
};
pub use network::{Ctx, EventKind, MemorySnapshot, Network, RequestStatus};
pub use node::RouterNode;
pub use protocols::{
    Generation, GenerationStage, ProtocolEntry, ProtocolKind, Purification, SwappingA, SwappingB,
    purified_fidelity, success_probability,
};
pub use reservation::{
    MemoryTimeCard, QCap, Reservation, RsvpState, create_rules, swap_neighbors,
};
pub use rules::{RESERVATION_RULE_PRIORITY, Rule, RuleKind, RuleManager};
pub use topology::{
    CChannelSpec, DEFAULT_MEMO_FIDELITY, LinkOptions, NetworkConfig, NodeClass, NodeSpec,
    NodeTypeSpec, QChannelSpec, Topology, TopologyBuilder, TopologySpec,
};
