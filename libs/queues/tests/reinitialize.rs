//! Reinitialization of a managed parent and absolute-resource derivation.

use std::sync::Arc;
use std::time::Duration;

use capq_capacity::{DominantResourceCalculator, Resource, ResourceCalculator, NO_LABEL};
use capq_id::QueuePath;
use capq_queues::policy::GUARANTEED_OR_ZERO;
use capq_queues::{
    InMemorySchedulerContext, ManagedParentQueue, ParsedQueue, PolicyError, QueueKind,
    QueueManagementWorker, QueueNode, QueueResult, SchedulerConfig,
};
use capq_testing::{
    context, context_with_policy, managed_parent, ParentConfig, PolicyCall, ScriptedPolicy,
    CLUSTER, SCRIPTED,
};
use proptest::prelude::*;

fn users_path() -> QueuePath {
    QueuePath::parse("root.users").unwrap()
}

fn reinitialize(parent: &ManagedParentQueue) -> QueueResult<()> {
    parent.reinitialize(&ParsedQueue::managed_parent(users_path()), &CLUSTER)
}

fn child_sum(parent: &ManagedParentQueue) -> f32 {
    parent
        .child_queues()
        .iter()
        .map(|leaf| leaf.queue_capacities().capacity(NO_LABEL))
        .sum()
}

fn scripted(
    config: ParentConfig,
) -> (
    Arc<InMemorySchedulerContext>,
    Arc<ScriptedPolicy>,
    Arc<ManagedParentQueue>,
) {
    let policy = ScriptedPolicy::new();
    let ctx = context_with_policy(config.policy(SCRIPTED).build(), &policy);
    let parent = managed_parent(ctx.clone(), "root.users");
    (ctx, policy, parent)
}

#[test]
fn test_reinitialize_resets_leaves_and_runs_a_pass() {
    let (_, policy, parent) = scripted(
        ParentConfig::new("root.users")
            .capacity(50.0)
            .template_capacity(20.0),
    );
    parent.auto_create_leaf_queue("a").unwrap();
    parent.auto_create_leaf_queue("b").unwrap();
    policy.clear_calls();

    reinitialize(&parent).unwrap();

    for leaf in parent.child_queues() {
        assert_eq!(leaf.queue_capacities().capacity(NO_LABEL), 0.0);
    }
    assert_eq!(
        policy.calls(),
        vec![
            PolicyCall::Reinitialize,
            PolicyCall::Compute,
            PolicyCall::Commit(Vec::new()),
        ]
    );
}

#[test]
fn test_reinitialize_applies_computed_grants() {
    let (_, policy, parent) = scripted(
        ParentConfig::new("root.users")
            .capacity(50.0)
            .template_capacity(20.0),
    );
    parent.auto_create_leaf_queue("a").unwrap();
    parent.auto_create_leaf_queue("b").unwrap();

    policy.plan(&[("b", 0.2)]);
    reinitialize(&parent).unwrap();

    assert_eq!(parent.child_queue("a").unwrap().queue_capacities().capacity(NO_LABEL), 0.0);
    assert_eq!(parent.child_queue("b").unwrap().queue_capacities().capacity(NO_LABEL), 0.2);
}

#[test]
fn test_reinitialize_rejects_overcommitted_children() {
    let (_, policy, parent) = scripted(
        ParentConfig::new("root.users")
            .capacity(50.0)
            .template_capacity(20.0)
            .fail_on_exceeding_parent_capacity(),
    );
    // Admission compares absolute values: 3 × 0.1 fits in 0.5.
    for name in ["a", "b", "c"] {
        parent.auto_create_leaf_queue(name).unwrap();
    }
    policy.clear_calls();

    // Reinitialization compares capacities: 3 × 0.2 exceeds 0.5.
    let err = reinitialize(&parent).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("exceeds guaranteed capacity"));

    assert_eq!(parent.queue_capacities().capacity(NO_LABEL), 0.5);
    assert!((child_sum(&parent) - 0.6).abs() < 1e-6);
    assert!(policy.calls().is_empty());
}

#[test]
fn test_rejected_config_change_keeps_prior_state() {
    let config = ParentConfig::new("root.users")
        .capacity(50.0)
        .template_capacity(20.0)
        .fail_on_exceeding_parent_capacity();
    let (ctx, _, parent) = scripted(config.clone());
    parent.auto_create_leaf_queue("a").unwrap();
    parent.auto_create_leaf_queue("b").unwrap();

    ctx.set_configuration(
        config
            .capacity(30.0)
            .template_capacity(10.0)
            .policy(SCRIPTED)
            .build(),
    );
    assert!(reinitialize(&parent).unwrap_err().is_config());

    assert_eq!(parent.queue_capacities().capacity(NO_LABEL), 0.5);
    assert_eq!(
        parent.leaf_queue_template().queue_capacities().capacity(NO_LABEL),
        0.2
    );
    assert_eq!(parent.child_queue("a").unwrap().queue_capacities().capacity(NO_LABEL), 0.2);
}

#[test]
fn test_accepted_config_change_updates_template() {
    let config = ParentConfig::new("root.users")
        .capacity(50.0)
        .template_capacity(20.0);
    let (ctx, _, parent) = scripted(config.clone());
    parent.auto_create_leaf_queue("a").unwrap();

    ctx.set_configuration(
        config
            .capacity(80.0)
            .template_capacity(25.0)
            .policy(SCRIPTED)
            .build(),
    );
    reinitialize(&parent).unwrap();

    assert_eq!(parent.queue_capacities().capacity(NO_LABEL), 0.8);
    let template = parent.leaf_queue_template();
    assert_eq!(template.queue_capacities().capacity(NO_LABEL), 0.25);
    assert_eq!(template.queue_capacities().absolute_capacity(NO_LABEL), 0.25 * 0.8);
}

#[test]
fn test_reinitialize_rejects_wrong_kind() {
    let (_, _, parent) = scripted(ParentConfig::new("root.users").capacity(50.0));

    let err = parent
        .reinitialize(&ParsedQueue::new(users_path(), QueueKind::Leaf), &CLUSTER)
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_policy_failure_during_reinitialize() {
    let (_, policy, parent) = scripted(
        ParentConfig::new("root.users")
            .capacity(50.0)
            .template_capacity(20.0),
    );
    policy.fail_compute(PolicyError::NotInitialized);

    let err = reinitialize(&parent).unwrap_err();
    assert!(err.is_reconciliation());
}

#[test]
fn test_reinitialize_swaps_to_configured_policy() {
    let config = ParentConfig::new("root.users")
        .capacity(50.0)
        .template_capacity(20.0);
    let policy = ScriptedPolicy::new();
    let ctx = context_with_policy(config.build(), &policy);
    let parent = managed_parent(ctx.clone(), "root.users");
    assert_eq!(parent.management_policy().name(), GUARANTEED_OR_ZERO);
    assert!(policy.calls().is_empty());

    ctx.set_configuration(config.policy(SCRIPTED).build());
    reinitialize(&parent).unwrap();

    assert_eq!(parent.management_policy().name(), SCRIPTED);
    assert_eq!(policy.calls()[0], PolicyCall::Init);
}

#[test]
fn test_guaranteed_or_zero_regrants_busy_leaf() {
    let parent = managed_parent(
        context(
            ParentConfig::new("root.users")
                .capacity(50.0)
                .template_capacity(40.0)
                .build(),
        ),
        "root.users",
    );
    let busy = parent.auto_create_leaf_queue("busy").unwrap();
    let idle = parent.auto_create_leaf_queue("idle").unwrap();
    busy.submit_application("alice");

    reinitialize(&parent).unwrap();

    assert_eq!(busy.queue_capacities().capacity(NO_LABEL), 0.4);
    assert_eq!(idle.queue_capacities().capacity(NO_LABEL), 0.0);
}

fn absolute_config(parent_min: Resource, template_min: Resource) -> SchedulerConfig {
    SchedulerConfig::from_toml_str(&format!(
        r#"
resource-calculator = "dominant"

[[queues]]
path = "root.users"
capacity = {{ memory-mb = {}, vcores = {} }}

[queues.leaf-queue-template]
capacity = {{ memory-mb = {}, vcores = {} }}
"#,
        parent_min.memory_mb, parent_min.vcores, template_min.memory_mb, template_min.vcores
    ))
    .unwrap()
}

#[test]
fn test_absolute_derivation_with_empty_cluster_is_defined() {
    let ctx = InMemorySchedulerContext::builder(absolute_config(
        Resource::new(4096, 4),
        Resource::new(1024, 1),
    ))
    .build();
    let parent = ManagedParentQueue::new_under_root(ctx, users_path()).unwrap();

    let template = parent.leaf_queue_template();
    let caps = template.queue_capacities().get(NO_LABEL);
    assert_eq!(caps.capacity, 0.0);
    assert_eq!(caps.absolute_capacity, 0.0);
    assert!(caps.maximum_capacity.is_finite());
    assert!(caps.absolute_maximum_capacity.is_finite());

    let leaf = parent.auto_create_leaf_queue("alice").unwrap();
    assert!(!leaf.queue_capacities().capacity(NO_LABEL).is_nan());
}

#[test]
fn test_admission_after_cluster_grows_respects_parent_share() {
    // Built before any node registered: every absolute share starts at zero.
    let ctx = InMemorySchedulerContext::builder(absolute_config(
        Resource::new(5120, 5),
        Resource::new(1024, 1),
    ))
    .build();
    let parent = ManagedParentQueue::new_under_root(ctx.clone(), users_path()).unwrap();

    ctx.set_cluster_resource(CLUSTER);
    parent.update_cluster_resource(&CLUSTER);
    let parent_share = parent.queue_capacities().absolute_capacity(NO_LABEL);
    assert_eq!(parent_share, 0.5);

    for i in 0..12 {
        let leaf = parent.auto_create_leaf_queue(&format!("user{i}")).unwrap();
        leaf.submit_application(&format!("user{i}"));
    }
    let granted = |parent: &ManagedParentQueue| {
        parent
            .child_queues()
            .iter()
            .filter(|leaf| leaf.queue_capacities().capacity(NO_LABEL) > 0.0)
            .count()
    };
    let absolute_sum = |parent: &ManagedParentQueue| -> f32 {
        parent
            .child_queues()
            .iter()
            .map(|leaf| leaf.queue_capacities().absolute_capacity(NO_LABEL))
            .sum()
    };
    assert_eq!(granted(&parent), 5);
    assert!(absolute_sum(&parent) <= parent_share + 1e-6);

    let mut worker = QueueManagementWorker::new(Duration::from_secs(1));
    worker.register(parent.clone());
    let stats = worker.run_once();

    assert_eq!(stats.parents_failed, 0);
    assert_eq!(granted(&parent), 5);
    assert!(absolute_sum(&parent) <= parent_share + 1e-6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_absolute_template_matches_derivation(
        memory in 1024i64..1_048_576,
        vcores in 1i32..1024,
        parent_pct in 1i64..=100,
        template_pct in 1i64..=100,
    ) {
        let cluster = Resource::new(memory, vcores);
        let parent_min = Resource::new(
            memory * parent_pct / 100,
            (vcores as i64 * parent_pct / 100) as i32,
        );
        let template_min = Resource::new(
            parent_min.memory_mb * template_pct / 100,
            (parent_min.vcores as i64 * template_pct / 100) as i32,
        );

        let ctx = InMemorySchedulerContext::builder(absolute_config(parent_min, template_min))
            .cluster_resource(cluster)
            .build();
        let parent = ManagedParentQueue::new_under_root(ctx, users_path()).unwrap();

        let calculator = DominantResourceCalculator;
        let parent_caps = parent.queue_capacities().get(NO_LABEL);
        let template = parent.leaf_queue_template();
        let caps = template.queue_capacities().get(NO_LABEL);

        prop_assert_eq!(parent_caps.capacity, calculator.divide(&cluster, &parent_min, &cluster));
        prop_assert_eq!(caps.capacity, calculator.divide(&cluster, &template_min, &parent_min));
        prop_assert_eq!(caps.absolute_capacity, caps.capacity * parent_caps.absolute_capacity);
        prop_assert!(caps.capacity.is_finite());
    }

    #[test]
    fn prop_successful_reinitialize_conserves_capacity(
        template_pct in 1u32..=50,
        children in 0usize..6,
    ) {
        let (_, policy, parent) = scripted(
            ParentConfig::new("root.users")
                .capacity(50.0)
                .template_capacity(template_pct as f32)
                .fail_on_exceeding_parent_capacity(),
        );
        for i in 0..children {
            if parent.auto_create_leaf_queue(&format!("user{i}")).is_err() {
                break;
            }
        }
        let before = child_sum(&parent);

        // Grant every leaf again in the pass that follows.
        let grants: Vec<(String, f32)> = parent
            .child_queues()
            .iter()
            .map(|leaf| (leaf.queue_name().to_string(), template_pct as f32 / 100.0))
            .collect();
        let grants: Vec<(&str, f32)> = grants.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        policy.plan(&grants);

        match reinitialize(&parent) {
            Ok(()) => {
                prop_assert!(before <= 0.5);
                prop_assert!(child_sum(&parent) <= before + 1e-6);
            }
            Err(err) => {
                prop_assert!(err.is_config());
                prop_assert!(before > 0.5);
            }
        }
    }
}
