// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::backend::StreamBackend;
use crate::error::{BridgeError, BridgeResult};
use crate::framing;
use crate::protocol::{Command, Response, StreamFormat, StreamMode, DEVICE_DEFAULT};
use crate::server::StreamServer;
use labwired_config::BridgeConfig;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};

/// One request/response exchange with a stream server.
pub trait Channel: Send {
    fn transact(&mut self, command: &Command) -> BridgeResult<Response>;
}

/// Authenticated TCP connection to an out-of-process server.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Connect and authenticate, giving up once `budget` has elapsed.
    pub fn connect(addr: SocketAddr, authkey: &[u8], budget: Duration) -> BridgeResult<Self> {
        let deadline = Instant::now() + budget;
        let mut stream = TcpStream::connect_timeout(&addr, budget)?;
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(1));
        stream.set_read_timeout(Some(remaining))?;
        stream.set_write_timeout(Some(remaining))?;
        framing::connect_handshake(&mut stream, authkey)?;
        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Channel for TcpChannel {
    fn transact(&mut self, command: &Command) -> BridgeResult<Response> {
        framing::send_message(&mut self.stream, command)?;
        framing::recv_message(&mut self.stream)
    }
}

/// In-process channel driving a [`StreamServer`] directly.
#[derive(Debug)]
pub struct LocalChannel<B: StreamBackend> {
    server: StreamServer<B>,
}

impl<B: StreamBackend> LocalChannel<B> {
    pub fn new(backend: B) -> Self {
        Self {
            server: StreamServer::new(backend),
        }
    }

    pub fn server(&self) -> &StreamServer<B> {
        &self.server
    }
}

impl<B: StreamBackend> Channel for LocalChannel<B> {
    fn transact(&mut self, command: &Command) -> BridgeResult<Response> {
        if self.server.is_closed() {
            return Err(BridgeError::NotConnected);
        }
        Ok(self.server.handle(command.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting(u32),
    Connected,
    Closed,
}

/// Peripheral-side handle to one stream server.
///
/// When the connection could not be established, or was lost, every operation
/// degrades to its "no effect" answer instead of failing.
pub struct BridgeClient {
    channel: Option<Box<dyn Channel>>,
    state: ConnectionState,
    attempts: u32,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl BridgeClient {
    pub fn disconnected() -> Self {
        Self {
            channel: None,
            state: ConnectionState::Disconnected,
            attempts: 0,
        }
    }

    pub fn with_channel(channel: Box<dyn Channel>) -> Self {
        Self {
            channel: Some(channel),
            state: ConnectionState::Connected,
            attempts: 0,
        }
    }

    /// Try to reach the server within the configured attempt budget.
    pub fn connect(config: &BridgeConfig) -> Self {
        let mut client = Self::disconnected();
        let addr = match config.socket_addr() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!("Bridge not connected: {:#}", e);
                return client;
            }
        };

        let delay = config.retry_delay();
        let budget = config.connect_attempts;
        for attempt in 0..budget {
            client.state = ConnectionState::Connecting(budget - attempt);
            client.attempts += 1;
            match TcpChannel::connect(addr, config.authkey.as_bytes(), delay) {
                Ok(channel) => {
                    tracing::info!("Bridge connected to {} after {} attempt(s)", addr, client.attempts);
                    client.channel = Some(Box::new(channel));
                    client.state = ConnectionState::Connected;
                    return client;
                }
                Err(e) => tracing::debug!("Bridge attempt {} to {} failed: {}", client.attempts, addr, e),
            }
            if attempt + 1 < budget {
                std::thread::sleep(delay);
            }
        }

        client.state = ConnectionState::Disconnected;
        tracing::error!(
            "Bridge not connected to {} after {} attempts; stream disabled",
            addr,
            client.attempts
        );
        client
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn transact(&mut self, command: Command) -> Option<Response> {
        let channel = self.channel.as_mut()?;
        match channel.transact(&command) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!("Bridge {} failed: {}; connection dropped", command.name(), e);
                self.channel = None;
                self.state = ConnectionState::Disconnected;
                None
            }
        }
    }

    fn flag(&mut self, command: Command) -> bool {
        let name = command.name();
        match self.transact(command) {
            Some(Response::Flag { value }) => value,
            Some(other) => {
                tracing::error!("{}", BridgeError::UnexpectedResponse {
                    command: name,
                    response: format!("{:?}", other),
                });
                false
            }
            None => false,
        }
    }

    pub fn set_mode(&mut self, mode: StreamMode) -> bool {
        self.flag(Command::SetMode { mode })
    }

    /// Returns the device index the server selected, or the sentinel on failure.
    pub fn set_device(&mut self, device: u32) -> u32 {
        match self.transact(Command::SetDevice { device }) {
            Some(Response::Device { index }) => index,
            _ => DEVICE_DEFAULT,
        }
    }

    pub fn set_filename(&mut self, base_dir: &Path, name: &str) -> bool {
        self.flag(Command::SetFilename {
            base_dir: base_dir.to_path_buf(),
            name: name.to_string(),
        })
    }

    pub fn configure(&mut self, format: StreamFormat) -> bool {
        self.flag(Command::Configure { format })
    }

    /// Returns whether the server reports the stream active.
    pub fn enable(&mut self) -> bool {
        self.flag(Command::Enable)
    }

    pub fn disable(&mut self) -> bool {
        self.flag(Command::Disable)
    }

    pub fn read(&mut self, size: u32) -> (Vec<u8>, bool) {
        match self.transact(Command::Read { size }) {
            Some(Response::Data { data, eos }) => (data, eos),
            _ => (Vec::new(), false),
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        if self.channel.is_some() {
            self.flag(Command::Write {
                data: data.to_vec(),
            });
        }
    }

    /// Ask the server to shut down and drop the connection.
    pub fn close(&mut self) {
        if self.channel.is_some() {
            self.flag(Command::Close);
        }
        self.channel = None;
        self.state = ConnectionState::Closed;
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if self.channel.is_some() {
            self.close();
        }
    }
}
