//! Worker runtime: lifecycle host and supervisor link.
//!
//! Every worker runs in its own thread and follows the same lifecycle,
//! enforced by [`run_worker`]:
//!
//! 1. `setup()` — fails with [`ExitCode::InitError`], after signalling the
//!    supervisor with an error frame.
//! 2. `Initialized` is sent; the supervisor considers the worker up.
//! 3. `tick()` in a loop until a `Stop` frame arrives. A tick error is
//!    signalled and ends the loop with [`ExitCode::RuntimeError`] — except
//!    peer-disconnect errors, which are survived (the peer is being
//!    restarted and the endpoints will be re-wired shortly).
//! 4. `teardown()` — must leave hardware in a safe state.
//!
//! The host also enforces a minimum loop period so a do-nothing tick cannot
//! saturate a CPU core.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::channel::Duplex;
use crate::config::{ConfigKind, ConfigValue, DEFAULT_SECTION};
use crate::message::{Message, TelemetryFrame};
use crate::{Error, Result};

/// Reserved worker exit codes. Worker-specific codes returned from
/// `teardown()` are offset past [`ExitCode::ShutdownError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean shutdown
    Success = 0,
    /// `setup()` failed
    InitError = 1,
    /// `tick()` failed
    RuntimeError = 2,
    /// `teardown()` failed
    ShutdownError = 3,
}

/// Default minimum loop period; caps the CPU cost of idle workers
pub const DEFAULT_MIN_LOOP_PERIOD: Duration = Duration::from_millis(5);

/// Back-off before retrying a tick after a transient peer disconnect
const DISCONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Config-RPC answer timeout
const CONFIG_TIMEOUT: Duration = Duration::from_secs(2);

/// A loop-based worker hosted by [`run_worker`].
pub trait Worker: Send {
    /// Worker name, also used as the thread name (≤ 15 characters)
    fn name(&self) -> &'static str;
    /// One-time initialization; config lookups happen here
    fn setup(&mut self, app: &mut AppLink) -> Result<()>;
    /// One loop iteration; must not block for long
    fn tick(&mut self, app: &mut AppLink) -> Result<()>;
    /// Final cleanup; may return a worker-specific exit code
    fn teardown(&mut self) -> Result<Option<i32>> {
        Ok(None)
    }
}

/// The worker-side end of the supervisor channel.
///
/// Carries the config RPC, telemetry sends and the cached `debug`/`testing`
/// flags every worker needs.
pub struct AppLink {
    chan: Duplex<Message, Message>,
    debug: bool,
    testing: bool,
}

impl AppLink {
    /// Wraps a worker-side channel end
    pub fn new(chan: Duplex<Message, Message>) -> Self {
        Self {
            chan,
            debug: false,
            testing: false,
        }
    }
    /// Fetches the flags every worker needs. Called by the host before the
    /// worker's own `setup()`.
    fn setup(&mut self) -> Result<()> {
        self.debug = self.config_bool(DEFAULT_SECTION, "debug", false)?;
        self.testing = self.config_bool(DEFAULT_SECTION, "testing", false)?;
        Ok(())
    }
    /// True when `--debug` was given
    pub fn is_debug_enabled(&self) -> bool {
        self.debug
    }
    /// True when `--testing` was given
    pub fn is_testing_enabled(&self) -> bool {
        self.testing
    }
    /// Sends a telemetry frame; a full channel drops the frame (telemetry
    /// is best-effort)
    pub fn send_data(&self, frame: TelemetryFrame) -> Result<()> {
        match self.chan.try_send(Message::Data(frame)) {
            Ok(()) | Err(Error::ChannelFull) => Ok(()),
            Err(e) => Err(e),
        }
    }
    /// Looks up a string option, substituting `default` when unset
    pub fn config_str(&self, section: &str, option: &str, default: &str) -> Result<String> {
        Ok(match self.request(section, option, ConfigKind::Str)? {
            Some(ConfigValue::Str(v)) => v,
            _ => default.to_owned(),
        })
    }
    /// Looks up an integer option, substituting `default` when unset
    pub fn config_i64(&self, section: &str, option: &str, default: i64) -> Result<i64> {
        Ok(match self.request(section, option, ConfigKind::Int)? {
            Some(ConfigValue::Int(v)) => v,
            _ => default,
        })
    }
    /// Looks up a float option, substituting `default` when unset
    pub fn config_f64(&self, section: &str, option: &str, default: f64) -> Result<f64> {
        Ok(match self.request(section, option, ConfigKind::Float)? {
            Some(ConfigValue::Float(v)) => v,
            _ => default,
        })
    }
    /// Looks up a boolean option, substituting `default` when unset
    pub fn config_bool(&self, section: &str, option: &str, default: bool) -> Result<bool> {
        Ok(match self.request(section, option, ConfigKind::Bool)? {
            Some(ConfigValue::Bool(v)) => v,
            _ => default,
        })
    }
    fn request(
        &self,
        section: &str,
        option: &str,
        kind: ConfigKind,
    ) -> Result<Option<ConfigValue>> {
        self.chan.send(Message::config_request(section, option, kind))?;
        match self.chan.recv_timeout(CONFIG_TIMEOUT) {
            Ok(Message::ConfigResponse {
                section: rs,
                option: ro,
                value,
            }) => {
                if !rs.eq_ignore_ascii_case(section) || !ro.eq_ignore_ascii_case(option) {
                    return Err(Error::Config(format!(
                        "config response mismatch: asked [{section}].{option}, got [{rs}].{ro}"
                    )));
                }
                Ok(value)
            }
            Ok(other) => Err(Error::Config(format!(
                "unexpected frame while waiting for config answer: {other:?}"
            ))),
            Err(Error::Timeout) => Err(Error::Config(format!(
                "no answer for config value [{section}].{option}"
            ))),
            Err(e) => Err(e),
        }
    }
    fn send(&self, msg: Message) -> Result<()> {
        self.chan.send(msg)
    }
    fn try_recv(&self) -> Result<Message> {
        self.chan.try_recv()
    }
}

/// Hosts a worker for its whole lifecycle. Returns the process-style exit
/// code described in [`ExitCode`].
pub fn run_worker(mut worker: Box<dyn Worker>, chan: Duplex<Message, Message>) -> i32 {
    run_worker_with_period(&mut *worker, chan, DEFAULT_MIN_LOOP_PERIOD)
}

/// [`run_worker`] with an explicit minimum loop period.
pub fn run_worker_with_period(
    worker: &mut dyn Worker,
    chan: Duplex<Message, Message>,
    min_loop_period: Duration,
) -> i32 {
    let mut app = AppLink::new(chan);
    let name = worker.name();

    if let Err(e) = app.setup().and_then(|()| worker.setup(&mut app)) {
        error!(worker = name, error = %e, "setup failed");
        let _ = app.send(Message::error(&e));
        return ExitCode::InitError as i32;
    }
    if app.send(Message::Initialized).is_err() {
        // supervisor is gone before we even started
        return ExitCode::InitError as i32;
    }
    debug!(worker = name, "initialized");

    let mut exit = ExitCode::Success;
    let mut last_loop = Instant::now();
    loop {
        match app.try_recv() {
            Ok(Message::Stop) => break,
            Ok(_) | Err(Error::ChannelEmpty) => {}
            Err(_) => {
                // the supervisor end is gone; nobody can stop us any more
                warn!(worker = name, "supervisor link lost, stopping");
                break;
            }
        }
        match worker.tick(&mut app) {
            Ok(()) => {}
            Err(e) if e.is_transient_disconnect() => {
                // A peer worker closed its endpoints, most likely because it
                // is being restarted. Keep living; this worker is either
                // restarted as a dependent or the endpoints come back.
                debug!(worker = name, "peer disconnected, retrying");
                thread::sleep(DISCONNECT_RETRY_DELAY);
            }
            Err(e) => {
                error!(worker = name, error = %e, "loop failed");
                let _ = app.send(Message::error(&e));
                exit = ExitCode::RuntimeError;
                break;
            }
        }
        let elapsed = last_loop.elapsed();
        if elapsed < min_loop_period {
            thread::sleep(min_loop_period - elapsed);
        }
        last_loop = Instant::now();
    }

    match worker.teardown() {
        Err(e) => {
            error!(worker = name, error = %e, "shutdown failed");
            ExitCode::ShutdownError as i32
        }
        Ok(Some(code)) => ExitCode::ShutdownError as i32 + code,
        Ok(None) => exit as i32,
    }
}
