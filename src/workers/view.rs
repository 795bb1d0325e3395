//! View worker: turns the OSC/UDP operator stream into commands.

use std::net::UdpSocket;
use std::time::Duration;

use rosc::OscPacket;
use tracing::debug;

use crate::channel::{bounded, Receiver, Sender, Slot};
use crate::command::Command;
use crate::runtime::{AppLink, Worker};
use crate::stage::InputState;
use crate::supervisor::Launcher;
use crate::workers::{names, DATA_CHANNEL_CAPACITY};
use crate::{Error, Result};

/// Socket poll timeout; keeps the loop responsive to stop requests
const SOCKET_TIMEOUT: Duration = Duration::from_millis(100);

/// Listens on the OSC endpoint, maintains the [`InputState`] and emits a
/// command whenever the reconstructed command differs from the last one
/// sent.
pub struct ViewWorker {
    commands: Sender<Command>,
    socket: Option<UdpSocket>,
    state: Option<InputState>,
    last_sent: Command,
    buf: Vec<u8>,
}

impl ViewWorker {
    fn new(commands: Sender<Command>) -> Self {
        Self {
            commands,
            socket: None,
            state: None,
            last_sent: Command::Stop,
            buf: vec![0; 1536],
        }
    }

    fn dispatch(state: &mut InputState, packet: OscPacket) {
        match packet {
            OscPacket::Message(msg) => state.apply(&msg),
            OscPacket::Bundle(bundle) => {
                for inner in bundle.content {
                    Self::dispatch(state, inner);
                }
            }
        }
    }
}

impl Worker for ViewWorker {
    fn name(&self) -> &'static str {
        names::VIEW
    }

    fn setup(&mut self, app: &mut AppLink) -> Result<()> {
        let ip = app.config_str("input", "ip", "0.0.0.0")?;
        let port = app.config_i64("input", "port", 1337)?;
        let port = u16::try_from(port)
            .map_err(|_| Error::invalid_data(format!("bad input port: {port}")))?;
        let max_speed = app.config_f64("default", "max_speed", 1.0)?;

        let socket = UdpSocket::bind((ip.as_str(), port))?;
        socket.set_read_timeout(Some(SOCKET_TIMEOUT))?;
        debug!(ip = %ip, port, "osc endpoint bound");
        self.socket = Some(socket);
        self.state = Some(InputState::new(max_speed));
        Ok(())
    }

    fn tick(&mut self, _app: &mut AppLink) -> Result<()> {
        let (Some(socket), Some(state)) = (self.socket.as_ref(), self.state.as_mut()) else {
            return Err(Error::failed("view worker not set up"));
        };
        match socket.recv(&mut self.buf) {
            Ok(size) => match rosc::decoder::decode_udp(&self.buf[..size]) {
                Ok((_, packet)) => Self::dispatch(state, packet),
                Err(e) => debug!(error = %e, "undecodable osc packet dropped"),
            },
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }

        let command = state.command();
        if command != self.last_sent {
            self.commands.send(command.clone())?;
            debug!(?command, "command sent");
            self.last_sent = command;
        }
        Ok(())
    }
}

/// Builds [`ViewWorker`] instances and publishes the command receiver for
/// [`crate::workers::ControlLauncher`].
pub struct ViewLauncher {
    commands: Slot<Receiver<Command>>,
}

impl ViewLauncher {
    /// `commands` receives the control-side endpoint on every build
    pub fn new(commands: Slot<Receiver<Command>>) -> Self {
        Self { commands }
    }
}

impl Launcher for ViewLauncher {
    fn name(&self) -> &'static str {
        names::VIEW
    }
    fn build(&mut self) -> Result<Box<dyn Worker>> {
        let (tx, rx) = bounded::<Command>(DATA_CHANNEL_CAPACITY);
        self.commands.put(rx);
        Ok(Box::new(ViewWorker::new(tx)))
    }
}
