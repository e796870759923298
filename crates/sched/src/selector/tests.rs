use std::sync::Arc;

use quiver_core::{keys, ConfigRegistry, ConfigValue};

use crate::job::Job;
use crate::resource::{ResourceId, ResourceManager};
use crate::selector::{FlatSearchPass, PassChain, SelectorPass};
use crate::task::{ResourceLabel, Task, TaskKind};

fn registry_with(enable: bool, threshold: i64, devices: Vec<u32>) -> ConfigRegistry {
    let registry = ConfigRegistry::new();
    registry.register(keys::GPU_ENABLE, ConfigValue::Bool(enable));
    registry.register(keys::GPU_SEARCH_THRESHOLD, ConfigValue::Int(threshold));
    registry.register(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(devices));
    registry
}

struct Fixture {
    registry: ConfigRegistry,
    resources: Arc<ResourceManager>,
    chain: PassChain,
}

fn fixture(enable: bool, threshold: i64, devices: Vec<u32>) -> Fixture {
    let registry = registry_with(enable, threshold, devices);
    let resources = ResourceManager::new(&registry);
    resources.enumerate().unwrap();

    let mut chain = PassChain::new();
    chain
        .register(FlatSearchPass::new(&registry, &resources) as Arc<dyn SelectorPass>)
        .unwrap();

    Fixture { registry, resources, chain }
}

fn search_label(chain: &PassChain, nq: u64) -> ResourceLabel {
    let mut task = Task::new(TaskKind::Search, Job::search(nq));
    chain.evaluate(&mut task);
    task.label().expect("evaluate always commits a label")
}

#[test]
fn threshold_boundary_is_exclusive_lower_bound() {
    // nq = threshold - 1 pins cpu; nq = threshold pins a gpu.
    let f = fixture(true, 100, vec![0, 1]);

    assert_eq!(search_label(&f.chain, 99), ResourceLabel::Pinned(ResourceId::Cpu));
    assert!(matches!(
        search_label(&f.chain, 100),
        ResourceLabel::Pinned(ResourceId::Gpu(_))
    ));
}

#[test]
fn disabled_gpu_routes_everything_to_cpu() {
    let f = fixture(false, 100, vec![0, 1]);
    assert_eq!(search_label(&f.chain, 1000), ResourceLabel::Pinned(ResourceId::Cpu));
    assert_eq!(search_label(&f.chain, 1), ResourceLabel::Pinned(ResourceId::Cpu));
}

#[test]
fn round_robin_cycles_in_device_list_order() {
    let f = fixture(true, 10, vec![4, 2, 7]);

    let mut seen = Vec::new();
    for _ in 0..9 {
        match search_label(&f.chain, 10) {
            ResourceLabel::Pinned(ResourceId::Gpu(device)) => seen.push(device),
            other => panic!("expected gpu label, got {:?}", other),
        }
    }
    assert_eq!(seen, vec![4, 2, 7, 4, 2, 7, 4, 2, 7]);
}

#[test]
fn mixed_batch_splits_between_cpu_and_gpus() {
    // devices [0,1], threshold 100: nq 50, 150, 150, 150
    // -> cpu, gpu0, gpu1, gpu0.
    let f = fixture(true, 100, vec![0, 1]);

    assert_eq!(search_label(&f.chain, 50), ResourceLabel::Pinned(ResourceId::Cpu));
    assert_eq!(search_label(&f.chain, 150), ResourceLabel::Pinned(ResourceId::Gpu(0)));
    assert_eq!(search_label(&f.chain, 150), ResourceLabel::Pinned(ResourceId::Gpu(1)));
    assert_eq!(search_label(&f.chain, 150), ResourceLabel::Pinned(ResourceId::Gpu(0)));
}

#[test]
fn shrinking_device_list_never_selects_out_of_range() {
    // Shrink from 2 devices to 1 mid-rotation.
    let f = fixture(true, 10, vec![0, 1]);

    assert_eq!(search_label(&f.chain, 10), ResourceLabel::Pinned(ResourceId::Gpu(0)));
    assert_eq!(search_label(&f.chain, 10), ResourceLabel::Pinned(ResourceId::Gpu(1)));

    f.registry
        .set(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(vec![5]))
        .unwrap();

    for _ in 0..4 {
        assert_eq!(search_label(&f.chain, 10), ResourceLabel::Pinned(ResourceId::Gpu(5)));
    }
}

#[test]
fn empty_device_list_fails_closed() {
    let f = fixture(true, 100, vec![0, 1]);

    assert_eq!(search_label(&f.chain, 150), ResourceLabel::Pinned(ResourceId::Gpu(0)));
    assert_eq!(search_label(&f.chain, 150), ResourceLabel::Pinned(ResourceId::Gpu(1)));

    f.registry
        .set(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(vec![]))
        .unwrap();

    assert_eq!(search_label(&f.chain, 150), ResourceLabel::Pinned(ResourceId::Cpu));
}

#[test]
fn committed_label_survives_re_evaluation() {
    // Re-running the chain neither changes the label nor advances the
    // rotation.
    let f = fixture(true, 10, vec![0, 1]);

    let mut task = Task::new(TaskKind::Search, Job::search(50));
    f.chain.evaluate(&mut task);
    assert_eq!(task.label(), Some(ResourceLabel::Pinned(ResourceId::Gpu(0))));

    f.chain.evaluate(&mut task);
    assert_eq!(task.label(), Some(ResourceLabel::Pinned(ResourceId::Gpu(0))));

    // Next fresh task continues the rotation where it left off.
    assert_eq!(search_label(&f.chain, 50), ResourceLabel::Pinned(ResourceId::Gpu(1)));
}

#[test]
fn threshold_change_applies_without_reconstruction() {
    let f = fixture(true, 100, vec![0]);

    assert_eq!(search_label(&f.chain, 50), ResourceLabel::Pinned(ResourceId::Cpu));

    f.registry
        .set(keys::GPU_SEARCH_THRESHOLD, ConfigValue::Int(40))
        .unwrap();
    assert_eq!(search_label(&f.chain, 50), ResourceLabel::Pinned(ResourceId::Gpu(0)));

    f.registry
        .set(keys::GPU_SEARCH_THRESHOLD, ConfigValue::Int(60))
        .unwrap();
    assert_eq!(search_label(&f.chain, 50), ResourceLabel::Pinned(ResourceId::Cpu));
}

#[test]
fn enable_flag_flips_live() {
    let f = fixture(true, 10, vec![0]);
    assert_eq!(search_label(&f.chain, 500), ResourceLabel::Pinned(ResourceId::Gpu(0)));

    f.registry.set(keys::GPU_ENABLE, ConfigValue::Bool(false)).unwrap();
    assert_eq!(search_label(&f.chain, 500), ResourceLabel::Pinned(ResourceId::Cpu));
}

#[test]
fn non_search_task_is_not_applicable() {
    let f = fixture(true, 10, vec![0]);

    let mut task = Task::new(TaskKind::BuildIndex, Job::build_index());
    f.chain.evaluate(&mut task);
    assert_eq!(task.label(), Some(ResourceLabel::Unconstrained));

    // Declining left the rotation untouched.
    assert_eq!(search_label(&f.chain, 50), ResourceLabel::Pinned(ResourceId::Gpu(0)));
}

#[test]
fn empty_chain_commits_unconstrained() {
    let chain = PassChain::new();
    let mut task = Task::new(TaskKind::Search, Job::search(10));
    chain.evaluate(&mut task);
    assert_eq!(task.label(), Some(ResourceLabel::Unconstrained));
}

#[test]
fn init_fails_on_missing_config_key() {
    let registry = ConfigRegistry::new();
    registry.register(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(vec![0]));
    let resources = ResourceManager::new(&registry);
    resources.enumerate().unwrap();

    // gpu.enable and gpu.search_threshold were never registered.
    let mut chain = PassChain::new();
    let result = chain.register(FlatSearchPass::new(&registry, &resources) as Arc<dyn SelectorPass>);
    assert!(result.is_err());
    assert!(chain.is_empty());
}

#[test]
fn dropped_pass_leaves_no_observer_behind() {
    let registry = registry_with(true, 10, vec![0]);
    let resources = ResourceManager::new(&registry);
    resources.enumerate().unwrap();

    {
        let mut chain = PassChain::new();
        chain
            .register(FlatSearchPass::new(&registry, &resources) as Arc<dyn SelectorPass>)
            .unwrap();
        assert_eq!(registry.subscriber_count(keys::GPU_SEARCH_THRESHOLD), 1);
    }

    assert_eq!(registry.subscriber_count(keys::GPU_SEARCH_THRESHOLD), 0);
    // Updating after the pass is gone must not crash.
    registry
        .set(keys::GPU_SEARCH_THRESHOLD, ConfigValue::Int(5))
        .unwrap();
}

#[test]
fn concurrent_evaluations_distribute_evenly() {
    // The cursor advances atomically, so two concurrent evaluations never
    // reuse a pre-advance index.
    let f = fixture(true, 1, vec![0, 1]);
    let chain = Arc::new(f.chain);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let chain = Arc::clone(&chain);
        handles.push(std::thread::spawn(move || {
            let mut counts = [0usize; 2];
            for _ in 0..50 {
                let mut task = Task::new(TaskKind::Search, Job::search(10));
                chain.evaluate(&mut task);
                match task.label() {
                    Some(ResourceLabel::Pinned(ResourceId::Gpu(device))) => {
                        counts[device as usize] += 1;
                    }
                    other => panic!("expected gpu label, got {:?}", other),
                }
            }
            counts
        }));
    }

    let mut totals = [0usize; 2];
    for handle in handles {
        let counts = handle.join().unwrap();
        totals[0] += counts[0];
        totals[1] += counts[1];
    }
    assert_eq!(totals[0] + totals[1], 200);
    assert_eq!(totals[0], 100, "round-robin must split evenly, got {:?}", totals);
    assert_eq!(totals[1], 100);

    let _ = &f.resources;
}
