//! Supervisor lifecycle: startup with config RPC, clean stop, exit codes,
//! error-driven restart cascades.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rsc::config::ConfigStore;
use rsc::runtime::{AppLink, Worker};
use rsc::supervisor::{Launcher, Supervisor};
use rsc::{Error, Result};

#[derive(Clone)]
struct Probe {
    builds: Arc<AtomicUsize>,
    ticks: Arc<AtomicUsize>,
    config_value: Arc<AtomicI64>,
}

impl Probe {
    fn new() -> Self {
        Self {
            builds: Arc::new(AtomicUsize::new(0)),
            ticks: Arc::new(AtomicUsize::new(0)),
            config_value: Arc::new(AtomicI64::new(-1)),
        }
    }
}

struct TestWorker {
    name: &'static str,
    probe: Probe,
    fail_after: Option<usize>,
    exit_code: Option<i32>,
    ticks_this_run: usize,
}

impl Worker for TestWorker {
    fn name(&self) -> &'static str {
        self.name
    }
    fn setup(&mut self, app: &mut AppLink) -> Result<()> {
        let value = app.config_i64("test", "value", 7)?;
        self.probe.config_value.store(value, Ordering::SeqCst);
        Ok(())
    }
    fn tick(&mut self, _app: &mut AppLink) -> Result<()> {
        self.ticks_this_run += 1;
        self.probe.ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if self.ticks_this_run >= limit {
                return Err(Error::failed("probe worker failure"));
            }
        }
        Ok(())
    }
    fn teardown(&mut self) -> Result<Option<i32>> {
        Ok(self.exit_code)
    }
}

struct TestLauncher {
    name: &'static str,
    probe: Probe,
    fail_after: Option<usize>,
    exit_code: Option<i32>,
}

impl TestLauncher {
    fn new(name: &'static str, probe: &Probe) -> Self {
        Self {
            name,
            probe: probe.clone(),
            fail_after: None,
            exit_code: None,
        }
    }
    fn failing_after(mut self, ticks: usize) -> Self {
        self.fail_after = Some(ticks);
        self
    }
    fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

impl Launcher for TestLauncher {
    fn name(&self) -> &'static str {
        self.name
    }
    fn build(&mut self) -> Result<Box<dyn Worker>> {
        self.probe.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestWorker {
            name: self.name,
            probe: self.probe.clone(),
            fail_after: self.fail_after,
            exit_code: self.exit_code,
            ticks_this_run: 0,
        }))
    }
}

fn store(content: &str) -> ConfigStore {
    let mut config = ConfigStore::new();
    config.read(content).unwrap();
    config
}

#[test]
fn start_serves_config_and_stop_is_clean() {
    let probe = Probe::new();
    let mut supervisor = Supervisor::new(store("[test]\nvalue = 42\n"));
    supervisor.register(Box::new(TestLauncher::new("probe", &probe)), &[]);

    supervisor.start("probe").unwrap();
    assert_eq!(probe.config_value.load(Ordering::SeqCst), 42);
    thread::sleep(Duration::from_millis(50));
    assert!(probe.ticks.load(Ordering::SeqCst) > 0);

    let code = supervisor.stop("probe").unwrap();
    assert_eq!(code, Some(0));
}

#[test]
fn missing_config_options_fall_back_to_defaults() {
    let probe = Probe::new();
    let mut supervisor = Supervisor::new(store(""));
    supervisor.register(Box::new(TestLauncher::new("probe", &probe)), &[]);
    supervisor.start("probe").unwrap();
    assert_eq!(probe.config_value.load(Ordering::SeqCst), 7);
    supervisor.stop("probe").unwrap();
}

#[test]
fn worker_exit_codes_are_offset_past_the_reserved_range() {
    let probe = Probe::new();
    let mut supervisor = Supervisor::new(store(""));
    supervisor.register(
        Box::new(TestLauncher::new("probe", &probe).with_exit_code(2)),
        &[],
    );
    supervisor.start("probe").unwrap();
    let code = supervisor.stop("probe").unwrap();
    // SHUTDOWN_ERROR (3) marks the end of the reserved range
    assert_eq!(code, Some(5));
}

#[test]
fn stopping_twice_is_harmless() {
    let probe = Probe::new();
    let mut supervisor = Supervisor::new(store(""));
    supervisor.register(Box::new(TestLauncher::new("probe", &probe)), &[]);
    supervisor.start("probe").unwrap();
    assert_eq!(supervisor.stop("probe").unwrap(), Some(0));
    assert_eq!(supervisor.stop("probe").unwrap(), None);
}

/// A failing worker is restarted together with its dependents,
/// so dependents never keep stale channel endpoints.
#[test]
fn worker_error_restarts_the_dependents_too() {
    let failing = Probe::new();
    let dependent = Probe::new();
    let mut supervisor = Supervisor::new(store(""));
    supervisor.register(
        Box::new(TestLauncher::new("flaky", &failing).failing_after(5)),
        &[],
    );
    supervisor.register(Box::new(TestLauncher::new("follower", &dependent)), &["flaky"]);

    supervisor.start_all().unwrap();
    assert_eq!(failing.builds.load(Ordering::SeqCst), 1);
    assert_eq!(dependent.builds.load(Ordering::SeqCst), 1);

    // let the flaky worker run into its failure
    thread::sleep(Duration::from_millis(150));
    let mut frames = 0;
    supervisor.poll(&mut |_| frames += 1).unwrap();

    assert!(
        failing.builds.load(Ordering::SeqCst) >= 2,
        "failing worker was not restarted"
    );
    assert!(
        dependent.builds.load(Ordering::SeqCst) >= 2,
        "dependent was not restarted with its principal"
    );
    assert_eq!(frames, 0);
    supervisor.stop_all();
}
