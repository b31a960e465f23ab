//! Output formatting.

use capq_capacity::NO_LABEL;
use capq_queues::{AutoCreatedLeafQueue, QueueNode};
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Capacity and application counts of one leaf, default partition only.
#[derive(Debug, Serialize, Tabled)]
pub struct LeafRow {
    #[tabled(rename = "QUEUE")]
    pub queue: String,
    #[tabled(rename = "CAPACITY")]
    pub capacity: f32,
    #[tabled(rename = "ABS CAPACITY")]
    pub absolute_capacity: f32,
    #[tabled(rename = "ABS MAX")]
    pub absolute_maximum_capacity: f32,
    #[tabled(rename = "MIN RESOURCE")]
    pub effective_min_resource: String,
    #[tabled(rename = "ACTIVE")]
    pub active_applications: usize,
    #[tabled(rename = "PENDING")]
    pub pending_applications: usize,
}

impl LeafRow {
    pub fn from_leaf(leaf: &AutoCreatedLeafQueue) -> Self {
        let caps = leaf.queue_capacities().get(NO_LABEL);
        Self {
            queue: leaf.queue_path().to_string(),
            capacity: caps.capacity,
            absolute_capacity: caps.absolute_capacity,
            absolute_maximum_capacity: caps.absolute_maximum_capacity,
            effective_min_resource: leaf.effective_min_resource(NO_LABEL).to_string(),
            active_applications: leaf.applications().len(),
            pending_applications: leaf.pending_applications().len(),
        }
    }
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No leaf queues.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
    }
}
