// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::control::{RegisterWrite, StreamControl};
use crate::regs::{RegisterBank, RegisterSlot};
use crate::timer::TimerDmaBlock;
use crate::vsi::StreamHandler;
use labwired_bridge::{AudioFormat, BridgeClient, StreamFormat, DEVICE_DEFAULT};
use labwired_config::StreamKind;
use std::path::PathBuf;

pub const DEVICE: usize = 2;
pub const FILENAME: usize = 3;
pub const CHANNELS: usize = 4;
pub const SAMPLE_RATE: usize = 5;
pub const SAMPLE_BITS: usize = 6;

/// Audio input/output stream relayed to an audio bridge server.
#[derive(Debug)]
pub struct AudioStream {
    stream: StreamControl,
}

impl AudioStream {
    pub fn new(client: BridgeClient, work_dir: PathBuf) -> Self {
        Self {
            stream: StreamControl::new(client, work_dir),
        }
    }

    pub fn control(&self) -> &StreamControl {
        &self.stream
    }

    pub fn format(bank: &RegisterBank) -> AudioFormat {
        AudioFormat {
            channels: bank.get(CHANNELS),
            sample_rate: bank.get(SAMPLE_RATE),
            sample_bits: bank.get(SAMPLE_BITS),
        }
    }
}

fn write_control(h: &mut AudioStream, bank: &mut RegisterBank, value: u32) -> u32 {
    let format = StreamFormat::Audio(AudioStream::format(bank));
    h.stream.write_control(bank, value, format)
}

fn read_status(h: &mut AudioStream, bank: &mut RegisterBank) -> u32 {
    h.stream.read_status(bank)
}

fn write_device(h: &mut AudioStream, _bank: &mut RegisterBank, value: u32) -> u32 {
    let index = h.stream.client_mut().set_device(value);
    tracing::info!("Audio device {:#x} requested, {:#x} selected", value, index);
    index
}

fn write_filename(h: &mut AudioStream, bank: &mut RegisterBank, value: u32) -> u32 {
    h.stream.write_filename(bank, value)
}

fn read_filename(h: &mut AudioStream, _bank: &mut RegisterBank) -> u32 {
    h.stream.filename_len()
}

impl StreamHandler for AudioStream {
    fn kind(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn register_map() -> Vec<RegisterSlot<Self>> {
        vec![
            RegisterSlot::new("CONTROL", 0).on_write(write_control),
            RegisterSlot::new("STATUS", 0).on_read(read_status).read_only(),
            RegisterSlot::new("DEVICE", DEVICE_DEFAULT).on_write(write_device),
            RegisterSlot::new("FILENAME", 0)
                .on_read(read_filename)
                .on_write(write_filename),
            RegisterSlot::new("CHANNELS", 1),
            RegisterSlot::new("SAMPLE_RATE", 16000),
            RegisterSlot::new("SAMPLE_BITS", 16),
        ]
    }

    fn timer_event(
        &mut self,
        bank: &mut RegisterBank,
        _block: &mut TimerDmaBlock,
    ) -> Option<RegisterWrite> {
        self.stream.timer_event(bank)
    }

    fn read_block(&mut self, bank: &mut RegisterBank, size: usize) -> Vec<u8> {
        self.stream
            .read_block(bank, size)
            .map(|(data, _)| data)
            .unwrap_or_default()
    }

    fn write_block(&mut self, bank: &mut RegisterBank, data: &[u8]) {
        if !self.stream.write_block(bank, data) {
            tracing::trace!("Audio stream inactive; dropped {} bytes", data.len());
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "connection": self.stream.client().state(),
            "filename": self.stream.latch(),
        })
    }
}
