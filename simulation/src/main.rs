//! Encounter - opportunistic routing simulator
//!
//! Runs the per-node routing engine over a contact schedule and prints
//! delivery statistics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use encounter_core::{EncounterResult, NodeId};
use encounter_dtn::{
    EnergyConfig, FailureSchedule, InitialEnergy, NeighborSchedule, PolicyKind, RouterConfig, SprayConfig,
};
use encounter_logging::{EncounterSubscriberBuilder, LogConfig};
use encounter_sim::{PlanBuilder, SimConfig, Simulation, scenarios};

#[derive(Parser)]
#[command(
    name = "encounter-sim",
    about = "Opportunistic routing simulation over a contact schedule",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write JSONL logs to this directory instead of the console
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one routing policy
    Run {
        /// Routing policy
        #[arg(short, long, value_enum, default_value = "prophet")]
        policy: PolicyArg,

        /// Print the delivery-predictability table of these nodes after the run
        #[arg(long, value_delimiter = ',')]
        report: Vec<String>,

        #[command(flatten)]
        world: WorldArgs,
    },

    /// Run every routing preset over the same world
    Compare {
        #[command(flatten)]
        world: WorldArgs,
    },

    /// Print a generated neighbor schedule in the file format
    Plan {
        #[command(flatten)]
        plan: PlanArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Epidemic,
    Prophet,
    Spray,
    BinarySpray,
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyArg {
    Line,
    Rotating,
    Random,
}

#[derive(Args)]
struct PlanArgs {
    /// Number of nodes
    #[arg(short, long, default_value = "50")]
    nodes: u32,

    /// Simulated seconds
    #[arg(short, long, default_value = "3600")]
    duration: u64,

    /// Schedule window length in seconds
    #[arg(short, long, default_value = "600")]
    window: u64,

    /// Generated topology when no neighbor file is given
    #[arg(short, long, value_enum, default_value = "random")]
    topology: TopologyArg,

    /// Random matchings per window (random topology)
    #[arg(long, default_value = "2")]
    rounds: usize,

    /// Seed for every random choice
    #[arg(short, long, default_value = "1")]
    seed: u64,
}

#[derive(Args)]
struct WorldArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Neighbor schedule file (`slot node peer...` per line)
    #[arg(long)]
    neighbors: Option<PathBuf>,

    /// Failure schedule file (`slot node...` per line)
    #[arg(long)]
    failures: Option<PathBuf>,

    /// Probability that an unscheduled pair meets during a window
    #[arg(long, default_value = "0.0")]
    chance: f64,

    /// Seconds between generated messages
    #[arg(long, default_value = "30")]
    message_interval: f64,

    /// Initial copies for spray-and-wait
    #[arg(long)]
    copies: Option<u32>,

    /// Starting energy: one value, or a min,max range; enables energy limits
    #[arg(long, value_delimiter = ',')]
    energy: Vec<f64>,

    /// Energy per scan
    #[arg(long, default_value = "0.1")]
    scan_energy: f64,

    /// Energy per second of sending or receiving
    #[arg(long, default_value = "0.08")]
    transmit_energy: f64,

    /// Seconds between scans
    #[arg(long, default_value = "30")]
    scan_interval: f64,
}

impl PolicyArg {
    fn router(self) -> RouterConfig {
        match self {
            PolicyArg::Epidemic => RouterConfig::default(),
            PolicyArg::Prophet => RouterConfig::prophet(),
            PolicyArg::Spray => RouterConfig::spray_and_wait(),
            PolicyArg::BinarySpray => RouterConfig::binary_spray_and_wait(),
        }
    }
}

impl PlanArgs {
    fn schedule(&self) -> NeighborSchedule {
        self.plan().to_schedule()
    }

    fn plan(&self) -> encounter_sim::EncounterPlan {
        let builder = PlanBuilder::new(self.nodes)
            .window(self.window)
            .duration(self.duration);
        match self.topology {
            TopologyArg::Line => builder.line(),
            TopologyArg::Rotating => builder.rotating(),
            TopologyArg::Random => builder.random(self.rounds, &mut ChaCha8Rng::seed_from_u64(self.seed)),
        }
    }
}

impl WorldArgs {
    fn config(&self, mut router: RouterConfig) -> anyhow::Result<SimConfig> {
        if let (Some(copies), PolicyKind::SprayAndWait(spray)) = (self.copies, &mut router.policy) {
            *spray = SprayConfig {
                initial_copies: copies,
                ..*spray
            };
        }

        if !self.energy.is_empty() {
            let initial = InitialEnergy::from_values(&self.energy).context("invalid --energy")?;
            router = router.with_energy(EnergyConfig::constrained(
                initial,
                self.scan_energy,
                self.transmit_energy,
                self.scan_interval,
            ));
        }

        Ok(SimConfig {
            router,
            node_count: self.plan.nodes,
            duration_secs: self.plan.duration as f64,
            window_secs: self.plan.window as f64,
            chance_contact_probability: self.chance,
            message_interval_secs: Some(self.message_interval),
            seed: self.plan.seed,
            ..SimConfig::default()
        })
    }

    fn schedules(&self) -> anyhow::Result<(Arc<NeighborSchedule>, Arc<FailureSchedule>)> {
        let neighbors = match &self.neighbors {
            Some(path) => NeighborSchedule::from_file(path)?,
            None => self.plan.schedule(),
        };
        let failures = match &self.failures {
            Some(path) => FailureSchedule::from_file(path)?,
            None => FailureSchedule::default(),
        };
        Ok((Arc::new(neighbors), Arc::new(failures)))
    }
}

fn parse_nodes(names: &[String]) -> EncounterResult<Vec<NodeId>> {
    names.iter().map(|name| Ok(name.parse::<NodeId>()?)).collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.log_dir {
        Some(dir) => LogConfig::simulation_run(dir.clone()),
        None if cli.verbose => LogConfig::development(),
        None => LogConfig {
            default_level: "info".to_string(),
            ..LogConfig::development()
        },
    };
    let _guard = EncounterSubscriberBuilder::new()
        .with_config(config)
        .try_init()
        .context("failed to set up logging")?;

    match cli.command {
        Commands::Run { policy, report, world } => {
            let watched = parse_nodes(&report)?;
            let config = world.config(policy.router())?;
            let (neighbors, failures) = world.schedules()?;

            let mut sim = Simulation::new(config, neighbors, failures)?;
            println!("{}", sim.run());

            for node in &watched {
                match sim.predictability_report(node) {
                    Some(table) => println!("\n{}: {}", node, table),
                    None => println!("\n{}: no predictability model", node),
                }
            }
        }
        Commands::Compare { world } => {
            let config = world.config(RouterConfig::default())?;
            let (neighbors, failures) = world.schedules()?;
            for report in scenarios::compare_policies(&config, neighbors, failures)? {
                println!("{}\n", report);
            }
        }
        Commands::Plan { plan } => {
            print!("{}", plan.plan());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_core::{EncounterError, IdentityError};

    #[test]
    fn test_parse_nodes() {
        let names = vec!["n3".to_string(), "n12".to_string()];
        assert_eq!(parse_nodes(&names).unwrap(), vec![NodeId::node(3), NodeId::node(12)]);
        assert!(parse_nodes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_nodes_rejects_bad_names() {
        let err = parse_nodes(&["n".to_string()]).unwrap_err();
        assert!(matches!(err, EncounterError::Identity(IdentityError::MissingIndex(_))));

        let err = parse_nodes(&["7".to_string()]).unwrap_err();
        assert!(matches!(err, EncounterError::Identity(IdentityError::InvalidFormat(_))));
    }
}
