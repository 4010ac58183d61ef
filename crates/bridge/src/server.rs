// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::backend::{fit_block, StreamBackend};
use crate::error::BridgeResult;
use crate::framing;
use crate::protocol::{Command, Response, StreamFormat, StreamMode, DEVICE_DEFAULT};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub enum StreamTarget {
    /// Platform default device for the current mode.
    #[default]
    None,
    Device(u32),
    File(PathBuf),
}

/// Backend-side view of the one stream a server owns.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StreamSession {
    pub mode: StreamMode,
    pub target: StreamTarget,
    pub format: Option<StreamFormat>,
    pub active: bool,
    pub eos: bool,
}

/// Executes bridge commands against a backend. Transport-agnostic.
pub struct StreamServer<B: StreamBackend> {
    backend: B,
    session: StreamSession,
    closed: bool,
}

impl<B: StreamBackend> std::fmt::Debug for StreamServer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamServer")
            .field("session", &self.session)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<B: StreamBackend> StreamServer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: StreamSession::default(),
            closed: false,
        }
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.session).unwrap_or(serde_json::Value::Null)
    }

    /// Execute one command. Every command yields exactly one response.
    pub fn handle(&mut self, command: Command) -> Response {
        tracing::debug!("Bridge command {} ({})", command.name(), command.code());
        match command {
            Command::SetMode { mode } => Response::flag(self.set_mode(mode)),
            Command::SetDevice { device } => Response::Device {
                index: self.set_device(device),
            },
            Command::SetFilename { base_dir, name } => {
                Response::flag(self.set_filename(&base_dir, &name))
            }
            Command::Configure { format } => Response::flag(self.configure(format)),
            Command::Enable => Response::flag(self.enable()),
            Command::Disable => Response::flag(self.disable()),
            Command::Read { size } => {
                let (data, eos) = self.read(size as usize);
                Response::Data { data, eos }
            }
            Command::Write { data } => Response::flag(self.write(&data)),
            Command::Close => {
                self.shutdown();
                Response::flag(true)
            }
        }
    }

    fn set_mode(&mut self, mode: StreamMode) -> bool {
        if self.session.active && mode != self.session.mode {
            tracing::warn!(
                "Stream mode switched from {:?} to {:?} while active",
                self.session.mode,
                mode
            );
        }
        self.session.mode = mode;
        tracing::info!("Stream mode set to {:?}", mode);
        true
    }

    fn set_device(&mut self, device: u32) -> u32 {
        let devices = self.backend.devices();
        for d in &devices {
            tracing::debug!(
                "Device {}: {} (capture={}, playback={})",
                d.index,
                d.name,
                d.capture,
                d.playback
            );
        }

        let resolved = if device == DEVICE_DEFAULT {
            self.backend.default_device(self.session.mode)
        } else {
            devices
                .iter()
                .find(|d| d.index == device && d.supports(self.session.mode))
                .map(|d| d.index)
        };

        match resolved {
            Some(index) => {
                self.session.target = StreamTarget::Device(index);
                tracing::info!("Streaming device set to {}", index);
                index
            }
            None => {
                self.session.target = StreamTarget::None;
                tracing::error!(
                    "No device {:#x} for {:?} stream",
                    device,
                    self.session.mode
                );
                DEVICE_DEFAULT
            }
        }
    }

    fn set_filename(&mut self, base_dir: &Path, name: &str) -> bool {
        self.session.target = StreamTarget::None;
        if name.is_empty() {
            return true;
        }

        let path = base_dir.join(name);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.backend.extensions(self.session.mode).contains(&ext.as_str()) {
            tracing::error!("Unsupported file extension '{}' for {:?}", ext, path);
            return false;
        }

        let valid = match self.session.mode {
            StreamMode::Input => path.is_file(),
            StreamMode::Output => match std::fs::remove_file(&path) {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                Err(e) => {
                    tracing::error!("Cannot replace {:?}: {}", path, e);
                    false
                }
            },
            StreamMode::None => false,
        };

        if valid {
            tracing::info!("Stream file set to {:?}", path);
            self.session.target = StreamTarget::File(path);
        } else {
            tracing::error!("File {:?} is not usable for {:?}", path, self.session.mode);
        }
        valid
    }

    fn configure(&mut self, format: StreamFormat) -> bool {
        if !format.is_valid() || !self.backend.accepts(&format) {
            tracing::error!("Rejected stream configuration {:?}", format);
            return false;
        }
        tracing::info!("Stream configured: {:?}", format);
        self.session.format = Some(format);
        true
    }

    fn enable(&mut self) -> bool {
        if self.session.active {
            tracing::info!("Stream already active");
            return true;
        }
        if self.session.mode == StreamMode::None || self.session.format.is_none() {
            tracing::error!("Stream enable without mode or configuration");
            return false;
        }

        self.session.eos = false;
        match self.backend.open(&self.session) {
            Ok(()) => {
                self.session.active = true;
                tracing::info!("Stream enabled ({:?})", self.session.target);
            }
            Err(e) => {
                tracing::error!("Failed to enable stream: {}", e);
                self.backend.close();
            }
        }
        self.session.active
    }

    fn disable(&mut self) -> bool {
        self.backend.close();
        if self.session.active {
            tracing::info!("Stream disabled");
        }
        self.session.active = false;
        self.session.active
    }

    fn read(&mut self, size: usize) -> (Vec<u8>, bool) {
        if !self.session.active || self.session.mode != StreamMode::Input {
            tracing::warn!("Read of {} bytes while stream is not capturing", size);
            return (Vec::new(), self.session.eos);
        }
        if self.session.eos {
            return (Vec::new(), true);
        }
        match self.backend.read(size) {
            Ok(block) => {
                self.session.eos = block.eos;
                (fit_block(block.data, size), block.eos)
            }
            Err(e) => {
                tracing::error!("Stream read failed: {}", e);
                self.session.eos = true;
                (fit_block(Vec::new(), size), true)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> bool {
        if !self.session.active || self.session.mode != StreamMode::Output {
            tracing::warn!("Dropping {} bytes: stream is not playing back", data.len());
            return false;
        }
        match self.backend.write(data) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Stream write failed: {}", e);
                false
            }
        }
    }

    /// Release backend resources and refuse further work.
    pub fn shutdown(&mut self) {
        self.disable();
        self.closed = true;
    }
}

impl<B: StreamBackend> Drop for StreamServer<B> {
    fn drop(&mut self) {
        self.backend.close();
    }
}

/// TCP front end serving exactly one authenticated client.
pub struct BridgeServer<B: StreamBackend> {
    listener: TcpListener,
    authkey: Vec<u8>,
    server: StreamServer<B>,
}

impl<B: StreamBackend> BridgeServer<B> {
    pub fn bind(addr: &str, authkey: &str, backend: B) -> BridgeResult<Self> {
        let listener = TcpListener::bind(addr)?;
        tracing::info!("Stream server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            authkey: authkey.as_bytes().to_vec(),
            server: StreamServer::new(backend),
        })
    }

    pub fn local_addr(&self) -> BridgeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one client and serve it until CLOSE or disconnect.
    ///
    /// Consumes the server so the listening socket is released on return.
    pub fn run(mut self) -> BridgeResult<()> {
        let (mut stream, peer) = self.listener.accept()?;
        tracing::info!("Connection accepted from {}", peer);
        if let Err(e) = framing::accept_handshake(&mut stream, &self.authkey) {
            tracing::error!("Client {} failed authentication: {}", peer, e);
            return Err(e);
        }
        let result = self.serve(&mut stream);
        self.server.shutdown();
        tracing::info!("Stream server stopped");
        result
    }

    fn serve(&mut self, stream: &mut TcpStream) -> BridgeResult<()> {
        stream.set_nodelay(true)?;
        loop {
            let command: Command = match framing::recv_message(stream) {
                Ok(cmd) => cmd,
                Err(crate::error::BridgeError::Io(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    tracing::warn!("Client disconnected without CLOSE");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let response = self.server.handle(command);
            framing::send_message(stream, &response)?;
            if self.server.is_closed() {
                return Ok(());
            }
        }
    }
}
