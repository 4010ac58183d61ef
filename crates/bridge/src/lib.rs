// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Out-of-process streaming bridge for virtual streaming interfaces.
//!
//! A peripheral model owns a [`BridgeClient`]; a separate process runs a
//! [`BridgeServer`] that owns the real audio or video backend. The two talk
//! over an authenticated, length-prefixed JSON channel.

pub mod backend;
pub mod client;
pub mod color;
pub mod error;
pub mod frame;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod y4m;

pub use backend::{AudioBackend, StreamBackend, SyntheticAudioHost, SyntheticVideoHost, VideoBackend};
pub use client::{BridgeClient, Channel, ConnectionState, LocalChannel, TcpChannel};
pub use error::{BackendError, BridgeError};
pub use frame::FrameRateMatcher;
pub use protocol::{
    AudioFormat, ColorSpace, Command, Response, StreamFormat, StreamMode, VideoFormat,
    DEVICE_DEFAULT, MAX_FRAME_DIMENSION,
};
pub use server::{BridgeServer, StreamServer, StreamSession, StreamTarget};
