//! Telluride driver.
//!
//! Loads a topology, issues one entanglement request, runs the simulation
//! to the stop time, and prints the request outcome plus the per-memory
//! entanglement tables of both endpoints.
//!
//! ```bash
//! telluride --topology net.json --from u --to v \
//!     --start 2 --end 10 --memories 5 --fidelity 0.9
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use telluride_net::{DEFAULT_MEMO_FIDELITY, Network, NetworkConfig, RequestStatus};
use telluride_sim::{Time, ps_to_sec};

/// Discrete-event simulator for quantum repeater networks.
#[derive(Parser)]
#[command(name = "telluride", version, about, long_about = None)]
struct Cli {
    /// Topology JSON file.
    #[arg(short, long)]
    topology: PathBuf,

    /// Initiating node.
    #[arg(long)]
    from: String,

    /// Responding node.
    #[arg(long)]
    to: String,

    /// Window start, in seconds of simulated time.
    #[arg(long, default_value_t = 2.0)]
    start: f64,

    /// Window end, in seconds of simulated time.
    #[arg(long, default_value_t = 10.0)]
    end: f64,

    /// Number of entangled pairs to request.
    #[arg(long, default_value_t = 5)]
    memories: usize,

    /// Target end-to-end fidelity.
    #[arg(long, default_value_t = 0.9)]
    fidelity: f64,

    /// Reserve as a virtual link (overlap-exempt).
    #[arg(long = "virtual")]
    virtual_link: bool,

    /// RNG seed; reruns with the same seed are identical.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Raw fidelity of freshly generated pairs.
    #[arg(long, default_value_t = DEFAULT_MEMO_FIDELITY)]
    memo_fidelity: f64,

    /// Swapping success probability.
    #[arg(long, default_value_t = 0.9)]
    swap_success: f64,

    /// Swapping fidelity degradation.
    #[arg(long, default_value_t = 0.99)]
    swap_degradation: f64,

    /// Stop time in seconds; defaults to just before the window end so
    /// the tables show the entangled state rather than the cleanup.
    #[arg(long)]
    stop: Option<f64>,
}

fn seconds_to_ps(seconds: f64) -> Result<Time> {
    if !(seconds.is_finite() && seconds >= 0.0) {
        bail!("time {seconds} is not a non-negative number of seconds");
    }
    Ok((seconds * 1e12) as Time)
}

fn print_memories(network: &Network, node: &str) -> Result<()> {
    println!("{node} memories");
    println!("Index:\tEntangled Node:\tFidelity:\tEntanglement Time:");
    for memory in network.memories(node)? {
        println!(
            "{:6}\t{:15}\t{:9.6}\t{}",
            memory.index,
            memory.remote_node.as_deref().unwrap_or("-"),
            memory.fidelity,
            memory
                .entangle_time
                .map_or_else(|| "-".to_string(), |t| format!("{:.6}s", ps_to_sec(t))),
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = NetworkConfig::default()
        .with_seed(cli.seed)
        .with_memo_fidelity(cli.memo_fidelity)
        .with_swapping(cli.swap_success, cli.swap_degradation);

    let mut network = Network::from_json_file(&cli.topology, config)
        .with_context(|| format!("loading topology {}", cli.topology.display()))?;

    let start = seconds_to_ps(cli.start)?;
    let end = seconds_to_ps(cli.end)?;
    let stop = match cli.stop {
        Some(seconds) => seconds_to_ps(seconds)?,
        None => end.saturating_sub(1),
    };

    let request = network.request_with(
        &cli.from,
        &cli.to,
        start,
        end,
        cli.memories,
        cli.fidelity,
        cli.virtual_link,
    )?;

    network.set_stop_time(Some(stop));
    network.run();

    match network.status(request) {
        RequestStatus::Approved { .. } => {
            let path = network.approved_path(request).unwrap_or_default();
            println!("request APPROVED over path {}", path.join(" - "));
        }
        RequestStatus::Rejected => println!("request REJECTED"),
        RequestStatus::Pending => println!("request still pending at stop time"),
    }
    println!(
        "t = {:.6}s, {} events",
        ps_to_sec(network.now()),
        network.events_processed()
    );
    println!("--------------------------------------");
    print_memories(&network, &cli.from)?;
    print_memories(&network, &cli.to)?;

    if cli.virtual_link {
        for (a, b) in network.virtual_links() {
            println!("virtual link: {a} <-> {b}");
        }
    }

    Ok(())
}
