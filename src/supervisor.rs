//! Worker supervision: startup, config RPC, restart cascades, shutdown.
//!
//! Each worker is registered as a named service with a [`Launcher`] that can
//! build a fresh worker instance (including fresh data-plane channel
//! endpoints) on every start. Services declare which other services they
//! depend on; restarting a service also restarts its direct dependents,
//! because the dependents hold channel endpoints that go stale when the
//! principal is recreated.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::channel::{duplex, Duplex};
use crate::config::ConfigStore;
use crate::message::{Message, TelemetryFrame};
use crate::runtime::{run_worker, Worker};
use crate::{Error, Result};

/// How long a worker may take to come up
pub const START_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a worker may take to stop before it is abandoned
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Capacity of the supervisor ↔ worker message channels
const LINK_CAPACITY: usize = 256;
/// Poll step while waiting for startup / shutdown
const POLL_STEP: Duration = Duration::from_millis(5);

/// Builds worker instances for a service. Called on every (re)start, so the
/// implementation must create fresh channel endpoints each time (stale ones
/// are republished through [`crate::channel::Slot`]s).
pub trait Launcher {
    /// Service name; also the worker thread name (≤ 15 characters)
    fn name(&self) -> &'static str;
    /// Creates a new worker instance with freshly wired endpoints
    fn build(&mut self) -> Result<Box<dyn Worker>>;
}

struct Running {
    link: Duplex<Message, Message>,
    handle: thread::JoinHandle<i32>,
}

struct Service {
    launcher: Box<dyn Launcher>,
    depends_on: Vec<&'static str>,
    running: Option<Running>,
}

/// The service table. Owns the config store and answers config RPC.
pub struct Supervisor {
    services: Vec<Service>,
    config: ConfigStore,
}

impl Supervisor {
    /// Creates a supervisor around a config store
    pub fn new(config: ConfigStore) -> Self {
        Self {
            services: Vec::new(),
            config,
        }
    }
    /// Registers a service. `depends_on` names services this one holds
    /// channel endpoints of; it is restarted whenever one of them is.
    pub fn register(&mut self, launcher: Box<dyn Launcher>, depends_on: &[&'static str]) {
        self.services.push(Service {
            launcher,
            depends_on: depends_on.to_vec(),
            running: None,
        });
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.services
            .iter()
            .position(|s| s.launcher.name() == name)
            .ok_or_else(|| Error::Supervisor(format!("unknown service: {name}")))
    }

    fn dependent_indices(&self, name: &str) -> Vec<usize> {
        self.services
            .iter()
            .enumerate()
            .filter(|(_, s)| s.depends_on.contains(&name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Starts a service and waits for its `Initialized` frame, answering
    /// config requests in the meantime (a worker that needs configuration
    /// for its setup would otherwise deadlock).
    pub fn start(&mut self, name: &str) -> Result<()> {
        let idx = self.index_of(name)?;
        self.start_idx(idx)
    }

    fn start_idx(&mut self, idx: usize) -> Result<()> {
        if self.services[idx].running.is_some() {
            return Ok(());
        }
        let name = self.services[idx].launcher.name();
        let worker = self.services[idx].launcher.build()?;
        let (sup_link, worker_link) = duplex::<Message, Message>(LINK_CAPACITY);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || run_worker(worker, worker_link))?;
        self.services[idx].running = Some(Running {
            link: sup_link,
            handle,
        });
        info!(service = name, "starting");

        let deadline = Instant::now() + START_TIMEOUT;
        loop {
            let running = self.services[idx]
                .running
                .as_ref()
                .ok_or_else(|| Error::Supervisor(format!("{name} vanished during startup")))?;
            match running.link.try_recv() {
                Ok(Message::Initialized) => {
                    info!(service = name, "initialized");
                    return Ok(());
                }
                Ok(Message::ConfigRequest {
                    section,
                    option,
                    kind,
                }) => {
                    let link = running.link.clone();
                    self.answer_config(&link, &section, &option, kind);
                }
                Ok(Message::Error(e)) => {
                    warn!(service = name, error = %e, "failed during startup");
                    self.stop(name)?;
                    return Err(Error::Supervisor(format!("initializing {name} failed: {e}")));
                }
                Ok(_) | Err(Error::ChannelEmpty) => {}
                Err(e) => {
                    self.stop(name)?;
                    return Err(Error::Supervisor(format!(
                        "{name} link broke during startup: {e}"
                    )));
                }
            }
            if Instant::now() >= deadline {
                self.stop(name)?;
                return Err(Error::Supervisor(format!("initializing {name} timed out")));
            }
            thread::sleep(POLL_STEP);
        }
    }

    /// Stops a service cooperatively; returns its exit code. A worker that
    /// does not finish within [`STOP_TIMEOUT`] is abandoned (its handle is
    /// dropped, its channel endpoints close) and `None` is returned.
    pub fn stop(&mut self, name: &str) -> Result<Option<i32>> {
        let idx = self.index_of(name)?;
        Ok(self.stop_idx(idx))
    }

    fn stop_idx(&mut self, idx: usize) -> Option<i32> {
        let name = self.services[idx].launcher.name();
        let Some(running) = self.services[idx].running.take() else {
            return None;
        };
        if let Err(e) = running.link.send(Message::Stop) {
            // already half-dead; proceed with the join
            debug!(service = name, error = %e, "stop signal not delivered");
        }
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !running.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(POLL_STEP);
        }
        if running.handle.is_finished() {
            match running.handle.join() {
                Ok(code) => {
                    info!(service = name, code, "stopped");
                    Some(code)
                }
                Err(_) => {
                    error!(service = name, "worker thread panicked");
                    None
                }
            }
        } else {
            // Threads cannot be killed; dropping the link closes the
            // worker's endpoints, which will fail it out eventually.
            warn!(service = name, "did not stop in time, abandoning");
            None
        }
    }

    /// Restarts a service together with its direct dependents.
    pub fn restart(&mut self, name: &str) -> Result<()> {
        let idx = self.index_of(name)?;
        let dependents = self.dependent_indices(name);
        warn!(service = name, dependents = dependents.len(), "restarting");
        self.stop_idx(idx);
        for &dep in &dependents {
            self.stop_idx(dep);
        }
        self.start_idx(idx)?;
        for &dep in &dependents {
            self.start_idx(dep)?;
        }
        Ok(())
    }

    /// Starts every registered service in registration order.
    pub fn start_all(&mut self) -> Result<()> {
        for idx in 0..self.services.len() {
            self.start_idx(idx)?;
        }
        Ok(())
    }

    /// Stops every running service, in reverse registration order.
    pub fn stop_all(&mut self) {
        for idx in (0..self.services.len()).rev() {
            self.stop_idx(idx);
        }
    }

    /// Drains every service link once, without blocking: answers config
    /// requests, forwards telemetry to `on_data`, restarts failed services
    /// (including those that died silently).
    pub fn poll(&mut self, on_data: &mut dyn FnMut(TelemetryFrame)) -> Result<()> {
        let mut to_restart: Vec<&'static str> = Vec::new();
        for service in &self.services {
            let name = service.launcher.name();
            let Some(running) = service.running.as_ref() else {
                continue;
            };
            loop {
                match running.link.try_recv() {
                    Ok(Message::Error(e)) => {
                        warn!(service = name, error = %e, "worker error");
                        to_restart.push(name);
                        break;
                    }
                    Ok(Message::ConfigRequest {
                        section,
                        option,
                        kind,
                    }) => {
                        self.answer_config(&running.link, &section, &option, kind);
                    }
                    Ok(Message::Data(frame)) => on_data(frame),
                    Ok(_) => {}
                    Err(Error::ChannelEmpty) => break,
                    Err(_) => {
                        if running.handle.is_finished() {
                            warn!(service = name, "worker died silently");
                            to_restart.push(name);
                        }
                        break;
                    }
                }
            }
        }
        for name in to_restart {
            self.restart(name)?;
        }
        Ok(())
    }

    fn answer_config(
        &self,
        link: &Duplex<Message, Message>,
        section: &str,
        option: &str,
        kind: crate::config::ConfigKind,
    ) {
        let value = match self.config.lookup(section, option, kind) {
            Ok(v) => v,
            Err(e) => {
                warn!(section, option, error = %e, "config lookup failed");
                None
            }
        };
        if value.is_none() {
            debug!(section, option, "requested config value does not exist");
        }
        let _ = link.send(Message::ConfigResponse {
            section: section.to_owned(),
            option: option.to_owned(),
            value,
        });
    }
}
