//! capq-sim - drive a managed parent queue from a scheduler config file.
//!
//! Creates the parent, auto-creates a leaf per submission, runs a number of
//! queue management passes and prints where the capacity ended up.

use std::path::PathBuf;

use anyhow::{Context, Result};
use capq_capacity::Resource;
use capq_id::QueuePath;
use capq_queues::{InMemorySchedulerContext, ManagedParentQueue, QueueManagementWorker};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

use output::{LeafRow, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "capq-sim", version, about)]
struct Cli {
    /// Scheduler configuration file (TOML).
    #[arg(long, short = 'c', env = "CAPQ_CONFIG")]
    config: PathBuf,

    /// Managed parent queue to drive.
    #[arg(long, short = 'p')]
    parent: String,

    #[arg(long, default_value_t = 10_240)]
    cluster_memory_mb: i64,

    #[arg(long, default_value_t = 10)]
    cluster_vcores: i32,

    /// Submit one application to a leaf, as LEAF or LEAF:USER. Repeatable.
    #[arg(long = "submit", value_name = "LEAF[:USER]")]
    submissions: Vec<Submission>,

    /// Queue management passes to run after the submissions.
    #[arg(long, default_value_t = 1)]
    passes: u32,

    #[arg(long, env = "CAPQ_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Clone)]
struct Submission {
    leaf: String,
    user: String,
}

impl std::str::FromStr for Submission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (leaf, user) = match s.split_once(':') {
            Some((leaf, user)) => (leaf, user),
            None => (s, s),
        };
        if leaf.is_empty() || user.is_empty() {
            return Err(format!("invalid submission '{s}', expected LEAF[:USER]"));
        }
        Ok(Self {
            leaf: leaf.to_string(),
            user: user.to_string(),
        })
    }
}

fn init_tracing(cli: &Cli) {
    // Prefer RUST_LOG, fall back to --log-level / CAPQ_LOG_LEVEL.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = capq_queues::SchedulerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let parent_path = QueuePath::parse(&cli.parent).context("invalid parent queue path")?;
    let interval = config.edit_policy_interval(&parent_path);

    let cluster = Resource::new(cli.cluster_memory_mb, cli.cluster_vcores);
    let context = InMemorySchedulerContext::builder(config)
        .cluster_resource(cluster)
        .build();
    let parent = ManagedParentQueue::new_under_root(context, parent_path)
        .with_context(|| format!("creating managed parent {}", cli.parent))?;

    info!(
        parent = %cli.parent,
        %cluster,
        submissions = cli.submissions.len(),
        "Starting simulation"
    );

    for submission in &cli.submissions {
        let leaf = match parent.child_queue(&submission.leaf) {
            Some(leaf) => leaf,
            None => match parent.auto_create_leaf_queue(&submission.leaf) {
                Ok(leaf) => leaf,
                Err(e) => {
                    warn!(leaf = %submission.leaf, error = %e, "Submission rejected");
                    continue;
                }
            },
        };
        let id = leaf.submit_application(&submission.user);
        info!(
            leaf = %submission.leaf,
            user = %submission.user,
            application = %id,
            "Submitted application"
        );
    }

    let mut worker = QueueManagementWorker::new(interval);
    worker.register(parent.clone());
    for pass in 1..=cli.passes {
        let stats = worker.run_once();
        info!(
            pass,
            interval_ms = u64::try_from(worker.interval().as_millis()).unwrap_or(u64::MAX),
            changes_applied = stats.changes_applied,
            parents_failed = stats.parents_failed,
            "Ran queue management pass"
        );
        if stats.parents_failed > 0 {
            warn!(pass, "Queue management pass failed, see previous errors");
        }
    }

    let rows: Vec<LeafRow> = parent
        .child_queues()
        .iter()
        .map(|leaf| LeafRow::from_leaf(leaf))
        .collect();
    output::print_output(&rows, cli.format);

    Ok(())
}
