// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Typed command/response messages exchanged between a peripheral model and
//! its streaming server.
//!
//! Every command produces exactly one response. Failures are never sent as a
//! distinct error variant: the server answers with the shape the command
//! expects (`false`, an empty payload, ...) so the peripheral can only ever
//! observe "the operation had no effect".

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SET_DEVICE argument meaning "use the platform default for the current mode".
pub const DEVICE_DEFAULT: u32 = 0xFFFF_FFFF;

/// Audio bit depths a stream may be configured with.
pub const SUPPORTED_SAMPLE_BITS: [u32; 4] = [8, 16, 24, 32];

/// Largest frame width or height a video stream may be configured with.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// Stream direction, encoded as the CONTROL.MODE field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    #[default]
    None,
    Input,
    Output,
}

impl StreamMode {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            1 => StreamMode::Input,
            2 => StreamMode::Output,
            _ => StreamMode::None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            StreamMode::None => 0,
            StreamMode::Input => 1,
            StreamMode::Output => 2,
        }
    }
}

/// Pixel layouts a video peripheral can request (FRAME_COLOR register).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    Grayscale8,
    Rgb888,
    Bgr565,
    Yuv420,
    Nv12,
    Nv21,
}

impl ColorSpace {
    pub const ALL: [ColorSpace; 6] = [
        ColorSpace::Grayscale8,
        ColorSpace::Rgb888,
        ColorSpace::Bgr565,
        ColorSpace::Yuv420,
        ColorSpace::Nv12,
        ColorSpace::Nv21,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u32 {
        match self {
            ColorSpace::Grayscale8 => 0,
            ColorSpace::Rgb888 => 1,
            ColorSpace::Bgr565 => 2,
            ColorSpace::Yuv420 => 3,
            ColorSpace::Nv12 => 4,
            ColorSpace::Nv21 => 5,
        }
    }

    /// Size in bytes of one `width` x `height` frame in this layout, or
    /// `None` if it does not fit in `usize`.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        let pixels = w.checked_mul(h)?;
        match self {
            ColorSpace::Grayscale8 => Some(pixels),
            ColorSpace::Rgb888 => pixels.checked_mul(3),
            ColorSpace::Bgr565 => pixels.checked_mul(2),
            ColorSpace::Yuv420 | ColorSpace::Nv12 | ColorSpace::Nv21 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?.checked_mul(2)?;
                pixels.checked_add(chroma)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channels: u32,
    pub sample_rate: u32,
    pub sample_bits: u32,
}

impl AudioFormat {
    pub fn is_valid(&self) -> bool {
        self.channels > 0
            && self.sample_rate > 0
            && SUPPORTED_SAMPLE_BITS.contains(&self.sample_bits)
    }

    /// Bytes per interleaved frame (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        (self.channels * self.sample_bits.div_ceil(8)) as usize
    }
}

/// Video format as the peripheral registers carry it; the color code is kept
/// raw so an out-of-range value can be rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub rate: u32,
    pub color: u32,
}

impl VideoFormat {
    pub fn color_space(&self) -> Option<ColorSpace> {
        ColorSpace::from_code(self.color)
    }

    pub fn is_valid(&self) -> bool {
        (1..=MAX_FRAME_DIMENSION).contains(&self.width)
            && (1..=MAX_FRAME_DIMENSION).contains(&self.height)
            && self.rate > 0
            && self.color_space().is_some()
    }

    /// Bytes per frame; 0 when the color code or geometry is unusable.
    pub fn frame_size(&self) -> usize {
        self.color_space()
            .and_then(|c| c.frame_size(self.width, self.height))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
}

impl StreamFormat {
    pub fn is_valid(&self) -> bool {
        match self {
            StreamFormat::Audio(a) => a.is_valid(),
            StreamFormat::Video(v) => v.is_valid(),
        }
    }
}

impl From<AudioFormat> for StreamFormat {
    fn from(format: AudioFormat) -> Self {
        StreamFormat::Audio(format)
    }
}

impl From<VideoFormat> for StreamFormat {
    fn from(format: VideoFormat) -> Self {
        StreamFormat::Video(format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    SetMode {
        mode: StreamMode,
    },
    SetDevice {
        device: u32,
    },
    SetFilename {
        base_dir: PathBuf,
        name: String,
    },
    Configure {
        format: StreamFormat,
    },
    Enable,
    Disable,
    Read {
        size: u32,
    },
    Write {
        #[serde(with = "b64")]
        data: Vec<u8>,
    },
    Close,
}

impl Command {
    /// Numeric command code, stable across releases and used in logs.
    pub fn code(&self) -> u32 {
        match self {
            Command::SetMode { .. } => 1,
            Command::SetDevice { .. } => 2,
            Command::SetFilename { .. } => 3,
            Command::Configure { .. } => 4,
            Command::Enable => 5,
            Command::Disable => 6,
            Command::Read { .. } => 7,
            Command::Write { .. } => 8,
            Command::Close => 9,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::SetMode { .. } => "SET_MODE",
            Command::SetDevice { .. } => "SET_DEVICE",
            Command::SetFilename { .. } => "SET_FILENAME",
            Command::Configure { .. } => "CONFIGURE",
            Command::Enable => "ENABLE",
            Command::Disable => "DISABLE",
            Command::Read { .. } => "READ",
            Command::Write { .. } => "WRITE",
            Command::Close => "CLOSE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resp", rename_all = "snake_case")]
pub enum Response {
    Flag {
        value: bool,
    },
    Device {
        index: u32,
    },
    Data {
        #[serde(with = "b64")]
        data: Vec<u8>,
        eos: bool,
    },
}

impl Response {
    pub fn flag(value: bool) -> Self {
        Response::Flag { value }
    }
}

/// Byte payloads travel as base64 strings inside the JSON body.
mod b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
