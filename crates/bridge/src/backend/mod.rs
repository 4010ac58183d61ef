// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod audio;
pub mod synthetic;
pub mod video;

use crate::error::BackendResult;
use crate::protocol::{StreamFormat, StreamMode};
use crate::server::StreamSession;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub use audio::{AudioBackend, AudioDeviceHost, LiveStream};
pub use synthetic::{SyntheticAudioHost, SyntheticVideoHost};
pub use video::{FrameSink, FrameSource, VideoBackend, VideoDeviceHost};

/// How long a live-capture READ waits for data before zero-padding.
pub const LIVE_READ_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub capture: bool,
    pub playback: bool,
}

impl DeviceInfo {
    pub fn supports(&self, mode: StreamMode) -> bool {
        match mode {
            StreamMode::Input => self.capture,
            StreamMode::Output => self.playback,
            StreamMode::None => false,
        }
    }
}

/// First device able to serve `mode`.
pub fn first_device_for(devices: &[DeviceInfo], mode: StreamMode) -> Option<u32> {
    devices.iter().find(|d| d.supports(mode)).map(|d| d.index)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBlock {
    pub data: Vec<u8>,
    pub eos: bool,
}

/// The concrete I/O owner behind one bridge server.
///
/// Every method runs on the server's command loop. Live devices may run their
/// own callback thread, but only through a [`StreamBuffer`].
pub trait StreamBackend: Send {
    /// Lower-case file extensions accepted for `mode`.
    fn extensions(&self, mode: StreamMode) -> &'static [&'static str];
    fn devices(&self) -> Vec<DeviceInfo>;
    fn accepts(&self, format: &StreamFormat) -> bool;
    /// Acquire the device or file the session points at.
    fn open(&mut self, session: &StreamSession) -> BackendResult<()>;
    fn read(&mut self, size: usize) -> BackendResult<ReadBlock>;
    fn write(&mut self, data: &[u8]) -> BackendResult<()>;
    /// Release everything acquired by `open`. Safe to call at any time.
    fn close(&mut self);

    fn default_device(&self, mode: StreamMode) -> Option<u32> {
        first_device_for(&self.devices(), mode)
    }
}

/// Zero-pad or truncate `data` to exactly `size` bytes.
pub fn fit_block(mut data: Vec<u8>, size: usize) -> Vec<u8> {
    data.resize(size, 0);
    data
}

/// Byte queue shared between the command loop and a live-device thread.
///
/// The device thread is the only producer for capture and the only consumer
/// for playback.
#[derive(Debug, Clone, Default)]
pub struct StreamBuffer {
    shared: Arc<(Mutex<VecDeque<u8>>, Condvar)>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, data: &[u8]) {
        let (lock, cvar) = &*self.shared;
        if let Ok(mut queue) = lock.lock() {
            queue.extend(data.iter().copied());
            cvar.notify_all();
        }
    }

    pub fn len(&self) -> usize {
        self.shared.0.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut queue) = self.shared.0.lock() {
            queue.clear();
        }
    }

    /// Take up to `size` bytes without waiting.
    pub fn take(&self, size: usize) -> Vec<u8> {
        match self.shared.0.lock() {
            Ok(mut queue) => {
                let n = size.min(queue.len());
                queue.drain(..n).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Wait until `size` bytes are queued or `timeout` passes, then take up to
    /// `size` bytes.
    pub fn take_wait(&self, size: usize, timeout: Duration) -> Vec<u8> {
        let (lock, cvar) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let Ok(mut queue) = lock.lock() else {
            return Vec::new();
        };
        while queue.len() < size {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match cvar.wait_timeout(queue, deadline - now) {
                Ok((guard, _)) => queue = guard,
                Err(_) => return Vec::new(),
            }
        }
        let n = size.min(queue.len());
        queue.drain(..n).collect()
    }
}
