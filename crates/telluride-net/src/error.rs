//! Error types for the network-management layer.

use telluride_sim::Time;
use thiserror::Error;

/// Network-management errors.
///
/// Admission and routing failures are recoverable and surface as REJECT
/// when they occur away from the request entry point. Programmer errors
/// (time running backward, messages delivered to the wrong node class)
/// are not represented here; those abort the simulation.
#[derive(Error, Debug)]
pub enum NetError {
    /// The node could not fit the reservation on its memory time-cards.
    #[error("admission failed at {node}: cannot reserve {memories} memories in [{start}, {end}]")]
    AdmissionFailure {
        /// Node that rejected the reservation.
        node: String,
        /// Memories the reservation required on this node.
        memories: usize,
        /// Requested window start (ps).
        start: Time,
        /// Requested window end (ps).
        end: Time,
    },

    /// Greedy forwarding found no physical neighbor closer to the target.
    #[error("no physical neighbor of {node} leads toward {destination}")]
    PathExhaustion {
        /// Node attempting to forward.
        node: String,
        /// Final destination of the message.
        destination: String,
    },

    /// A node name that does not exist in the topology.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A request violated its preconditions.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The topology file is structurally invalid.
    #[error("malformed topology: {0}")]
    Topology(String),

    /// IO error while reading a topology file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while parsing a topology file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for network-management operations.
pub type Result<T> = std::result::Result<T, NetError>;
