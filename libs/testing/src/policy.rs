use std::collections::VecDeque;
use std::sync::Arc;

use capq_queues::context::SchedulerContext;
use capq_queues::{
    AutoCreatedLeafQueue, LeafQueueTemplate, ParentSnapshot, PolicyError, PolicyRegistry,
    QueueManagementChange, QueueManagementPolicy, QueueNode,
};
use parking_lot::Mutex;

/// Registry name of [`ScriptedPolicy`].
pub const SCRIPTED: &str = "scripted";

/// A call made on a [`ScriptedPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyCall {
    Init,
    Reinitialize,
    Compute,
    InitialConfiguration(String),
    Commit(Vec<String>),
    UpdateTemplate,
}

#[derive(Debug)]
enum Plan {
    /// Leaf name and the capacity to give it in every label.
    Leaves(Vec<(String, f32)>),
    Changes(Vec<QueueManagementChange>),
}

#[derive(Debug, Default)]
struct Script {
    calls: Vec<PolicyCall>,
    plans: VecDeque<Plan>,
    fail_compute: Option<PolicyError>,
    fail_initial: Option<PolicyError>,
    fail_commit: Option<PolicyError>,
    zero_initial: bool,
}

/// A policy that replays planned batches and records every call.
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    script: Mutex<Script>,
}

impl ScriptedPolicy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers this instance under [`SCRIPTED`]. Every parent created from
    /// `registry` shares it.
    pub fn install(self: &Arc<Self>, registry: &PolicyRegistry) {
        let policy = Arc::clone(self);
        registry.register(SCRIPTED, move || policy.clone() as Arc<dyn QueueManagementPolicy>);
    }

    /// Queues a batch for the next compute, targeting leaves by name.
    pub fn plan(&self, leaves: &[(&str, f32)]) {
        let leaves = leaves
            .iter()
            .map(|(name, capacity)| (name.to_string(), *capacity))
            .collect();
        self.script.lock().plans.push_back(Plan::Leaves(leaves));
    }

    /// Queues a prebuilt batch for the next compute.
    pub fn plan_changes(&self, changes: Vec<QueueManagementChange>) {
        self.script.lock().plans.push_back(Plan::Changes(changes));
    }

    pub fn fail_compute(&self, error: PolicyError) {
        self.script.lock().fail_compute = Some(error);
    }

    pub fn fail_initial_configuration(&self, error: PolicyError) {
        self.script.lock().fail_initial = Some(error);
    }

    pub fn fail_commit(&self, error: PolicyError) {
        self.script.lock().fail_commit = Some(error);
    }

    /// Hands new leaves zero capacity instead of the template's.
    pub fn grant_nothing_initially(&self) {
        self.script.lock().zero_initial = true;
    }

    pub fn calls(&self) -> Vec<PolicyCall> {
        self.script.lock().calls.clone()
    }

    /// Leaf names of every committed batch, oldest first.
    pub fn commits(&self) -> Vec<Vec<String>> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PolicyCall::Commit(names) => Some(names.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.script.lock().calls.clear();
    }
}

fn with_capacity(template: &LeafQueueTemplate, capacity: f32) -> LeafQueueTemplate {
    let mut capacities = template.queue_capacities().clone();
    let labels: Vec<String> = capacities
        .existing_node_labels()
        .map(str::to_string)
        .collect();
    for label in labels {
        capacities.set_capacity(&label, capacity);
    }
    template.with_capacities(capacities)
}

impl QueueManagementPolicy for ScriptedPolicy {
    fn name(&self) -> &str {
        SCRIPTED
    }

    fn init(&self, _context: &dyn SchedulerContext, _parent: &ParentSnapshot) -> Result<(), PolicyError> {
        self.script.lock().calls.push(PolicyCall::Init);
        Ok(())
    }

    fn reinitialize(
        &self,
        _context: &dyn SchedulerContext,
        _parent: &ParentSnapshot,
    ) -> Result<(), PolicyError> {
        self.script.lock().calls.push(PolicyCall::Reinitialize);
        Ok(())
    }

    fn compute_queue_management_changes(
        &self,
        parent: &ParentSnapshot,
    ) -> Result<Vec<QueueManagementChange>, PolicyError> {
        let mut script = self.script.lock();
        script.calls.push(PolicyCall::Compute);
        if let Some(error) = script.fail_compute.clone() {
            return Err(error);
        }

        match script.plans.pop_front() {
            None => Ok(Vec::new()),
            Some(Plan::Changes(changes)) => Ok(changes),
            Some(Plan::Leaves(leaves)) => leaves
                .into_iter()
                .map(|(name, capacity)| {
                    let leaf = parent
                        .child(&name)
                        .ok_or_else(|| PolicyError::UnknownLeaf(name.clone()))?;
                    Ok::<_, PolicyError>(QueueManagementChange::update_queue(
                        leaf.clone() as Arc<dyn QueueNode>,
                        with_capacity(&parent.template, capacity),
                    ))
                })
                .collect(),
        }
    }

    fn initial_leaf_queue_configuration(
        &self,
        parent: &ParentSnapshot,
        leaf: &AutoCreatedLeafQueue,
    ) -> Result<LeafQueueTemplate, PolicyError> {
        let mut script = self.script.lock();
        script
            .calls
            .push(PolicyCall::InitialConfiguration(leaf.queue_name().to_string()));
        if let Some(error) = script.fail_initial.clone() {
            return Err(error);
        }
        if script.zero_initial {
            return Ok(with_capacity(&parent.template, 0.0));
        }
        Ok(parent.template.as_ref().clone())
    }

    fn commit_queue_management_changes(
        &self,
        changes: &[QueueManagementChange],
    ) -> Result<(), PolicyError> {
        let mut script = self.script.lock();
        let names = changes
            .iter()
            .map(|change| change.queue().queue_name().to_string())
            .collect();
        script.calls.push(PolicyCall::Commit(names));
        match script.fail_commit.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn update_template_absolute_capacities(
        &self,
        _parent: &ParentSnapshot,
    ) -> Result<(), PolicyError> {
        self.script.lock().calls.push(PolicyCall::UpdateTemplate);
        Ok(())
    }
}
