// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Bridge I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed bridge message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Bridge message of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("Bridge authentication failed")]
    AuthenticationFailed,
    #[error("Unexpected response to {command}: {response}")]
    UnexpectedResponse {
        command: &'static str,
        response: String,
    },
    #[error("Bridge is not connected")]
    NotConnected,
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Unsupported file extension: {0:?}")]
    UnsupportedExtension(PathBuf),
    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),
    #[error("No such device: {0}")]
    NoSuchDevice(u32),
    #[error("Malformed container: {0}")]
    Container(String),
}

pub type BackendResult<T> = Result<T, BackendError>;
