// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{DeviceInfo, ReadBlock, StreamBackend, StreamBuffer, LIVE_READ_DEADLINE};
use crate::error::{BackendError, BackendResult};
use crate::protocol::{AudioFormat, StreamFormat, StreamMode};
use crate::server::{StreamSession, StreamTarget};
use std::fs::File;
use std::io::{BufReader, BufWriter};

/// A running capture or playback stream on a live device.
pub trait LiveStream: Send {
    /// Begin moving samples between the device and `buffer`.
    fn start(&mut self, buffer: StreamBuffer) -> BackendResult<()>;
    fn stop(&mut self);
}

/// Enumerates and opens live audio devices.
pub trait AudioDeviceHost: Send {
    fn devices(&self) -> Vec<DeviceInfo>;
    fn open(
        &mut self,
        index: u32,
        mode: StreamMode,
        format: &AudioFormat,
    ) -> BackendResult<Box<dyn LiveStream>>;
}

/// Append one PCM sample as little-endian bytes. 8-bit PCM is unsigned.
pub(crate) fn encode_sample(sample: i32, bits: u32, out: &mut Vec<u8>) {
    match bits {
        8 => out.push((sample + 128).clamp(0, 255) as u8),
        16 => out.extend_from_slice(&(sample as i16).to_le_bytes()),
        24 => out.extend_from_slice(&sample.to_le_bytes()[..3]),
        _ => out.extend_from_slice(&sample.to_le_bytes()),
    }
}

pub(crate) fn decode_sample(bytes: &[u8], bits: u32) -> i32 {
    match bits {
        8 => bytes[0] as i32 - 128,
        16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        24 => (i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]])) >> 8,
        _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

enum AudioStream {
    FileIn {
        reader: hound::WavReader<BufReader<File>>,
        bits: u32,
        frame_bytes: usize,
        /// Decoded bytes beyond the last requested block.
        pending: Vec<u8>,
    },
    FileOut {
        writer: hound::WavWriter<BufWriter<File>>,
        bits: u32,
        pending: Vec<u8>,
    },
    Live {
        stream: Box<dyn LiveStream>,
        mode: StreamMode,
    },
}

/// WAV files plus live devices supplied by an [`AudioDeviceHost`].
pub struct AudioBackend<H: AudioDeviceHost> {
    host: H,
    stream: Option<AudioStream>,
    buffer: StreamBuffer,
}

impl<H: AudioDeviceHost> AudioBackend<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            stream: None,
            buffer: StreamBuffer::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn open_wav_input(path: &std::path::Path, format: &AudioFormat) -> BackendResult<AudioStream> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(BackendError::UnsupportedFormat(
                "floating point WAV data".to_string(),
            ));
        }
        let bits = spec.bits_per_sample as u32;
        if spec.channels as u32 != format.channels
            || spec.sample_rate != format.sample_rate
            || bits != format.sample_bits
        {
            tracing::warn!(
                "File properties ({}ch, {}Hz, {}bit) don't match configured ({}ch, {}Hz, {}bit)",
                spec.channels,
                spec.sample_rate,
                bits,
                format.channels,
                format.sample_rate,
                format.sample_bits
            );
        }
        tracing::info!(
            "Input file {:?}: channels={}, rate={}, bits={}",
            path,
            spec.channels,
            spec.sample_rate,
            bits
        );
        Ok(AudioStream::FileIn {
            reader,
            bits,
            frame_bytes: (spec.channels as usize) * bits.div_ceil(8) as usize,
            pending: Vec::new(),
        })
    }

    fn open_wav_output(path: &std::path::Path, format: &AudioFormat) -> BackendResult<AudioStream> {
        let spec = hound::WavSpec {
            channels: format.channels as u16,
            sample_rate: format.sample_rate,
            bits_per_sample: format.sample_bits as u16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)?;
        tracing::info!(
            "Output file {:?}: channels={}, rate={}, bits={}",
            path,
            format.channels,
            format.sample_rate,
            format.sample_bits
        );
        Ok(AudioStream::FileOut {
            writer,
            bits: format.sample_bits,
            pending: Vec::new(),
        })
    }
}

impl<H: AudioDeviceHost> StreamBackend for AudioBackend<H> {
    fn extensions(&self, _mode: StreamMode) -> &'static [&'static str] {
        &["wav"]
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.host.devices()
    }

    fn accepts(&self, format: &StreamFormat) -> bool {
        matches!(format, StreamFormat::Audio(_))
    }

    fn open(&mut self, session: &StreamSession) -> BackendResult<()> {
        let Some(StreamFormat::Audio(format)) = session.format else {
            return Err(BackendError::UnsupportedFormat(
                "audio stream is not configured".to_string(),
            ));
        };
        self.close();

        let stream = match (&session.target, session.mode) {
            (StreamTarget::File(path), StreamMode::Input) => Self::open_wav_input(path, &format)?,
            (StreamTarget::File(path), StreamMode::Output) => {
                Self::open_wav_output(path, &format)?
            }
            (target, mode) => {
                let index = match target {
                    StreamTarget::Device(index) => *index,
                    _ => self
                        .default_device(mode)
                        .ok_or(BackendError::NoSuchDevice(crate::protocol::DEVICE_DEFAULT))?,
                };
                let mut stream = self.host.open(index, mode, &format)?;
                self.buffer.clear();
                stream.start(self.buffer.clone())?;
                tracing::info!(
                    "Audio device {} streaming: channels={}, rate={}, bits={}",
                    index,
                    format.channels,
                    format.sample_rate,
                    format.sample_bits
                );
                AudioStream::Live { stream, mode }
            }
        };
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self, size: usize) -> BackendResult<ReadBlock> {
        match self.stream.as_mut() {
            Some(AudioStream::FileIn {
                reader,
                bits,
                frame_bytes,
                pending,
            }) => {
                // Whole frames are decoded; the tail of the last one waits in `pending`.
                let frames = size.saturating_sub(pending.len()).div_ceil(*frame_bytes);
                let samples = frames * reader.spec().channels as usize;
                for sample in reader.samples::<i32>().take(samples) {
                    encode_sample(sample?, *bits, pending);
                }
                let data: Vec<u8> = pending.drain(..size.min(pending.len())).collect();
                let eos = data.is_empty() && size > 0;
                if eos {
                    tracing::debug!("End of audio file reached");
                }
                Ok(ReadBlock { data, eos })
            }
            Some(AudioStream::Live {
                mode: StreamMode::Input,
                ..
            }) => {
                let data = self.buffer.take_wait(size, LIVE_READ_DEADLINE);
                if data.len() < size {
                    tracing::warn!(
                        "Capture underrun: {} of {} bytes available",
                        data.len(),
                        size
                    );
                }
                Ok(ReadBlock { data, eos: false })
            }
            _ => Ok(ReadBlock::default()),
        }
    }

    fn write(&mut self, data: &[u8]) -> BackendResult<()> {
        match self.stream.as_mut() {
            Some(AudioStream::FileOut {
                writer,
                bits,
                pending,
            }) => {
                pending.extend_from_slice(data);
                let width = bits.div_ceil(8) as usize;
                let whole = pending.len() - pending.len() % width;
                for chunk in pending[..whole].chunks_exact(width) {
                    writer.write_sample(decode_sample(chunk, *bits))?;
                }
                pending.drain(..whole);
                Ok(())
            }
            Some(AudioStream::Live {
                mode: StreamMode::Output,
                ..
            }) => {
                self.buffer.push(data);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        match self.stream.take() {
            Some(AudioStream::FileOut {
                writer, pending, ..
            }) => {
                if !pending.is_empty() {
                    tracing::warn!("Discarding {} bytes of partial sample", pending.len());
                }
                if let Err(e) = writer.finalize() {
                    tracing::error!("Failed to finalize WAV output: {}", e);
                }
            }
            Some(AudioStream::Live { mut stream, .. }) => {
                stream.stop();
                self.buffer.clear();
            }
            Some(AudioStream::FileIn { .. }) | None => {}
        }
    }
}
