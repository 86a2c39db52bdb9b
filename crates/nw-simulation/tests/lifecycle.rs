//! End-to-end lifecycle: scheduled objects are built, discovered through the
//! registry by a small scheduler, driven through `prepare`/`update`/`reinit`,
//! and disappear when dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nw_core::{InstanceRegistry, Trackable};
use nw_simulation::{
    Clock, ScheduleConfig, Scheduled, ScheduledObject, SimError, SimResult, scheduled,
};
use parking_lot::Mutex;

const PHASES: [&str; 5] = ["start", "groups", "thresholds", "resets", "end"];

type CallLog = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Scheduled types
// ---------------------------------------------------------------------------

trait Group: Scheduled {
    fn n(&self) -> usize;
}

struct NeuronGroup {
    base: ScheduledObject,
    n: usize,
    log: CallLog,
    prepared: AtomicUsize,
}

impl Scheduled for NeuronGroup {
    fn base(&self) -> &ScheduledObject {
        &self.base
    }

    fn prepare(&self) -> SimResult<()> {
        self.prepared.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn update(&self) -> SimResult<()> {
        self.log.lock().push(format!("neurons/{}", self.n));
        Ok(())
    }
}

impl Group for NeuronGroup {
    fn n(&self) -> usize {
        self.n
    }
}
scheduled!(NeuronGroup: dyn Group);

struct PoissonGroup {
    base: ScheduledObject,
    n: usize,
    log: CallLog,
}

impl Scheduled for PoissonGroup {
    fn base(&self) -> &ScheduledObject {
        &self.base
    }

    fn update(&self) -> SimResult<()> {
        self.log.lock().push(format!("poisson/{}", self.n));
        Ok(())
    }
}

impl Group for PoissonGroup {
    fn n(&self) -> usize {
        self.n
    }
}
scheduled!(PoissonGroup: dyn Group);

struct StateMonitor {
    base: ScheduledObject,
    log: CallLog,
    reinits: AtomicUsize,
}

impl Scheduled for StateMonitor {
    fn base(&self) -> &ScheduledObject {
        &self.base
    }

    fn update(&self) -> SimResult<()> {
        self.log.lock().push("monitor".to_owned());
        Ok(())
    }

    fn reinit(&self) -> SimResult<()> {
        self.reinits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
scheduled!(StateMonitor);

struct Silent {
    base: ScheduledObject,
}

impl Scheduled for Silent {
    fn base(&self) -> &ScheduledObject {
        &self.base
    }
}
scheduled!(Silent);

struct Scratch {
    base: ScheduledObject,
}

impl Scheduled for Scratch {
    fn base(&self) -> &ScheduledObject {
        &self.base
    }

    fn update(&self) -> SimResult<()> {
        Ok(())
    }
}
scheduled!(untracked Scratch);

// ---------------------------------------------------------------------------
// Test scheduler
// ---------------------------------------------------------------------------

/// Minimal stand-in for the external scheduler: discovers every scheduled
/// object in its registry and walks them in (clock, phase, order) order.
struct Network {
    registry: InstanceRegistry,
}

impl Network {
    fn new(registry: &InstanceRegistry) -> Self {
        Self {
            registry: registry.clone(),
        }
    }

    fn objects(&self) -> Vec<Arc<dyn Scheduled>> {
        let mut objects = self.registry.get::<dyn Scheduled>().unwrap_or_default();
        objects.sort_by(|a, b| {
            let clock = |o: &Arc<dyn Scheduled>| o.clock().map(|c| c.id());
            let phase = |o: &Arc<dyn Scheduled>| {
                o.when()
                    .and_then(|w| PHASES.iter().position(|p| *p == w))
                    .unwrap_or(PHASES.len())
            };
            let order = |o: &Arc<dyn Scheduled>| o.order().unwrap_or(f64::INFINITY);
            clock(a)
                .cmp(&clock(b))
                .then(phase(a).cmp(&phase(b)))
                .then(order(a).total_cmp(&order(b)))
        });
        objects
    }

    fn run(&self, steps: u64) -> SimResult<()> {
        let objects = self.objects();
        for object in &objects {
            object.prepare()?;
        }
        for _ in 0..steps {
            for object in objects.iter().filter(|o| o.active()) {
                object.update()?;
            }
            let mut advanced = Vec::new();
            for clock in objects.iter().filter_map(|o| o.clock()) {
                if !advanced.contains(&clock.id()) {
                    clock.advance();
                    advanced.push(clock.id());
                }
            }
        }
        Ok(())
    }

    fn reinit(&self) -> SimResult<()> {
        for object in self.objects() {
            object.reinit()?;
            if let Some(clock) = object.clock() {
                clock.reinit();
            }
        }
        Ok(())
    }
}

fn config(when: &str, order: f64, clock: &Arc<Clock>) -> ScheduleConfig {
    ScheduleConfig::default()
        .with_when(when)
        .with_order(order)
        .with_clock(Arc::clone(clock))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn three_subclasses_then_drop_one() {
    init_tracing();
    let registry = InstanceRegistry::new();
    let log = CallLog::default();
    let clock = Arc::new(Clock::new(0.1).unwrap());

    let neurons = registry.create(|tracker| NeuronGroup {
        base: ScheduledObject::new(tracker, config("groups", 0.0, &clock)),
        n: 10,
        log: log.clone(),
        prepared: AtomicUsize::new(0),
    });
    let poisson = registry.create(|tracker| PoissonGroup {
        base: ScheduledObject::new(tracker, config("groups", 1.0, &clock)),
        n: 5,
        log: log.clone(),
    });
    let monitor = registry.create(|tracker| StateMonitor {
        base: ScheduledObject::new(tracker, config("end", 0.0, &clock)),
        log: log.clone(),
        reinits: AtomicUsize::new(0),
    });

    let all = registry.get::<dyn Scheduled>().unwrap();
    let mut ids: Vec<_> = all.iter().map(|o| o.instance_id()).collect();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            neurons.instance_id(),
            poisson.instance_id(),
            monitor.instance_id()
        ]
    );
    let sizes: Vec<usize> = registry
        .get::<dyn Group>()
        .unwrap()
        .iter()
        .map(|g| g.n())
        .collect();
    assert_eq!(sizes, vec![10, 5]);
    drop(all);

    drop(poisson);
    assert_eq!(registry.get::<dyn Scheduled>().unwrap().len(), 2);
    assert_eq!(registry.get::<dyn Group>().unwrap().len(), 1);
    assert!(registry.get::<PoissonGroup>().unwrap().is_empty());
    assert_eq!(registry.handle_count::<dyn Scheduled>(), 2);
}

#[test]
fn network_runs_objects_in_schedule_order() {
    let registry = InstanceRegistry::new();
    let log = CallLog::default();
    let clock = Arc::new(Clock::new(0.5).unwrap());

    let _monitor = registry.create(|tracker| StateMonitor {
        base: ScheduledObject::new(tracker, config("end", 0.0, &clock)),
        log: log.clone(),
        reinits: AtomicUsize::new(0),
    });
    let _poisson = registry.create(|tracker| PoissonGroup {
        base: ScheduledObject::new(tracker, config("groups", 2.0, &clock)),
        n: 3,
        log: log.clone(),
    });
    let neurons = registry.create(|tracker| NeuronGroup {
        base: ScheduledObject::new(tracker, config("groups", -1.0, &clock)),
        n: 7,
        log: log.clone(),
        prepared: AtomicUsize::new(0),
    });

    let network = Network::new(&registry);
    network.run(2).unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "neurons/7",
            "poisson/3",
            "monitor",
            "neurons/7",
            "poisson/3",
            "monitor"
        ]
    );
    assert_eq!(clock.tick(), 2);
    assert!((clock.t() - 1.0).abs() < f64::EPSILON);

    // A second run prepares again.
    network.run(0).unwrap();
    assert_eq!(neurons.prepared.load(Ordering::Relaxed), 2);
}

#[test]
fn inactive_objects_are_skipped() {
    let registry = InstanceRegistry::new();
    let log = CallLog::default();
    let clock = Arc::new(Clock::new(1.0).unwrap());

    let group = registry.create(|tracker| NeuronGroup {
        base: ScheduledObject::new(tracker, config("groups", 0.0, &clock)),
        n: 1,
        log: log.clone(),
        prepared: AtomicUsize::new(0),
    });
    let monitor = registry.create(|tracker| StateMonitor {
        base: ScheduledObject::new(tracker, config("end", 0.0, &clock)),
        log: log.clone(),
        reinits: AtomicUsize::new(0),
    });
    group.contained_objects().push(monitor.clone());

    group.set_active(false);
    assert!(!monitor.active());
    Network::new(&registry).run(1).unwrap();
    assert!(log.lock().is_empty());

    monitor.set_active(true);
    assert!(!group.active());
    Network::new(&registry).run(1).unwrap();
    assert_eq!(*log.lock(), vec!["monitor"]);
}

#[test]
fn reinit_rewinds_objects_and_clocks() {
    let registry = InstanceRegistry::new();
    let clock = Arc::new(Clock::new(1.0).unwrap());
    let monitor = registry.create(|tracker| StateMonitor {
        base: ScheduledObject::new(tracker, config("end", 0.0, &clock)),
        log: CallLog::default(),
        reinits: AtomicUsize::new(0),
    });

    let network = Network::new(&registry);
    network.run(3).unwrap();
    assert_eq!(clock.tick(), 3);

    network.reinit().unwrap();
    assert_eq!(clock.tick(), 0);
    assert_eq!(monitor.reinits.load(Ordering::Relaxed), 1);
}

#[test]
fn missing_update_fails_the_run() {
    let registry = InstanceRegistry::new();
    let clock = Arc::new(Clock::new(1.0).unwrap());
    let _silent = registry.create(|tracker| Silent {
        base: ScheduledObject::new(tracker, config("start", 0.0, &clock)),
    });

    let err = Network::new(&registry).run(1).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Silent must define an update() method");

    let bare = ScheduledObject::create_in(&registry, config("start", 1.0, &clock));
    assert!(matches!(
        bare.update(),
        Err(SimError::NotImplemented {
            class: "ScheduledObject"
        })
    ));
}

#[test]
fn untracked_objects_are_invisible_to_the_network() {
    let registry = InstanceRegistry::new();
    let scratch = registry.create(|tracker| Scratch {
        base: ScheduledObject::new(tracker, ScheduleConfig::default()),
    });
    assert!(!scratch.is_tracked());
    assert!(Network::new(&registry).objects().is_empty());

    scratch.start_tracking();
    assert_eq!(Network::new(&registry).objects().len(), 1);
    assert_eq!(registry.get::<Scratch>().unwrap().len(), 1);
}

#[test]
fn objects_default_to_the_shared_clock() {
    let registry = InstanceRegistry::new();
    let a = ScheduledObject::create_in(&registry, ScheduleConfig::default());
    let b = ScheduledObject::create_in(&registry, ScheduleConfig::default().with_when("end"));
    let (ca, cb) = (a.clock().unwrap(), b.clock().unwrap());
    assert!(Arc::ptr_eq(&ca, &cb));
    assert_eq!(ca.id(), nw_simulation::default_clock().id());
}

#[test]
fn querying_an_unrelated_type_fails() {
    #[derive(Debug)]
    struct Spreadsheet;
    let registry = InstanceRegistry::new();
    let err = registry.get::<Spreadsheet>().unwrap_err();
    assert!(err.to_string().contains("Spreadsheet"));
}
