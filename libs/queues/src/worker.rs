//! Background queue management worker.
//!
//! Periodically asks every registered managed parent's policy for changes and
//! applies them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::parent::ManagedParentQueue;
use crate::queue::QueueNode;

/// Shortest interval the worker runs at. Shorter intervals are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Statistics from one edit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditPassStats {
    pub parents_processed: usize,
    pub parents_failed: usize,
    pub changes_applied: usize,
}

/// Runs queue management passes on a fixed interval.
pub struct QueueManagementWorker {
    parents: Vec<Arc<ManagedParentQueue>>,
    interval: Duration,
}

impl QueueManagementWorker {
    pub fn new(interval: Duration) -> Self {
        Self {
            parents: Vec::new(),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Adds a managed parent to every subsequent pass.
    pub fn register(&mut self, parent: Arc<ManagedParentQueue>) {
        self.parents.push(parent);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            parents = self.parents.len(),
            "Starting queue management worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately; wait a full interval instead.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.run_once();
                    if stats.changes_applied > 0 || stats.parents_failed > 0 {
                        info!(
                            parents_processed = stats.parents_processed,
                            parents_failed = stats.parents_failed,
                            changes_applied = stats.changes_applied,
                            "Queue management pass complete"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Queue management worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Runs a single pass over every registered parent.
    ///
    /// A failing parent is logged and skipped; the others still run.
    pub fn run_once(&self) -> EditPassStats {
        let mut stats = EditPassStats::default();

        for parent in &self.parents {
            let changes = match parent.compute_queue_management_changes() {
                Ok(changes) => changes,
                Err(e) => {
                    error!(queue = %parent.queue_path(), error = %e, "Computing queue management changes failed");
                    stats.parents_failed += 1;
                    continue;
                }
            };

            if !changes.is_empty() {
                if let Err(e) = parent.validate_and_apply_queue_management_changes(&changes) {
                    warn!(queue = %parent.queue_path(), error = %e, "Applying queue management changes failed");
                    stats.parents_failed += 1;
                    continue;
                }
                stats.changes_applied += changes.len();
            }
            stats.parents_processed += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::context::InMemorySchedulerContext;
    use capq_capacity::{Resource, NO_LABEL};
    use capq_id::QueuePath;

    const CONFIG: &str = r#"
[[queues]]
path = "root.users"
capacity = 50

[queues.leaf-queue-template]
capacity = 40
"#;

    fn parent() -> Arc<ManagedParentQueue> {
        let ctx = InMemorySchedulerContext::builder(SchedulerConfig::from_toml_str(CONFIG).unwrap())
            .cluster_resource(Resource::new(10_240, 10))
            .build();
        ManagedParentQueue::new_under_root(ctx, QueuePath::parse("root.users").unwrap()).unwrap()
    }

    #[test]
    fn test_zero_interval_is_raised_to_minimum() {
        let worker = QueueManagementWorker::new(Duration::ZERO);
        assert_eq!(worker.interval(), MIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_runs_and_stops() {
        let mut worker = QueueManagementWorker::new(Duration::ZERO);
        worker.register(parent());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_run_once_with_no_parents() {
        let worker = QueueManagementWorker::new(Duration::from_millis(10));
        assert_eq!(worker.run_once(), EditPassStats::default());
    }

    #[test]
    fn test_run_once_reclaims_idle_leaf() {
        let parent = parent();
        let leaf = parent.auto_create_leaf_queue("alice").unwrap();
        assert_eq!(leaf.queue_capacities().capacity(NO_LABEL), 0.4);

        let mut worker = QueueManagementWorker::new(Duration::from_millis(10));
        worker.register(parent.clone());

        let stats = worker.run_once();
        assert_eq!(stats.parents_processed, 1);
        assert_eq!(stats.changes_applied, 1);
        assert_eq!(leaf.queue_capacities().capacity(NO_LABEL), 0.0);

        // Converged: nothing left to do.
        let stats = worker.run_once();
        assert_eq!(stats.changes_applied, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let parent = parent();
        let leaf = parent.auto_create_leaf_queue("alice").unwrap();
        leaf.submit_application("alice");

        let mut worker = QueueManagementWorker::new(Duration::from_millis(100));
        worker.register(parent);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(250)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Leaf keeps its share while it has work.
        assert_eq!(leaf.queue_capacities().capacity(NO_LABEL), 0.4);
    }
}
