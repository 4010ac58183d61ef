// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sensor peripheral replaying `<name>.<n>.sds` recordings from the work
//! directory. Data is either polled sample by sample through a FIFO or
//! pulled in DMA blocks.

use crate::control::RegisterWrite;
use crate::fifo::FifoBuffer;
use crate::recording::RecordingReader;
use crate::regs::{RegisterBank, RegisterSlot};
use crate::replay::SensorReplayEngine;
use crate::timer::TimerDmaBlock;
use crate::vsi::StreamHandler;
use bitflags::bitflags;
use labwired_config::StreamKind;
use std::path::PathBuf;

pub const CONTROL: usize = 0;
pub const STATUS: usize = 1;
pub const SENSOR_NAME_LEN: usize = 2;
pub const SENSOR_NAME_CHAR: usize = 3;
pub const SENSOR_NAME_VALID: usize = 4;
pub const SAMPLE_SIZE: usize = 5;
pub const SAMPLE_COUNT: usize = 6;
pub const SAMPLE_PORT: usize = 7;
pub const DATA_THRESHOLD: usize = 8;
pub const FIFO_SIZE: usize = 9;

pub const RECORDING_EXTENSION: &str = "sds";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SensorControl: u32 {
        const ENABLE = 1 << 0;
        const DMA    = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SensorStatus: u32 {
        const OVERFLOW = 1 << 0;
    }
}

bitflags! {
    /// Bits this peripheral raises in the VSI IRQ status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SensorIrq: u32 {
        const THRESHOLD = 1 << 0;
        const OVERFLOW  = 1 << 1;
    }
}

#[derive(Debug)]
pub struct SensorStream {
    work_dir: PathBuf,
    name: Vec<u8>,
    /// Enables so far; selects the recording file for the next one.
    sensor_idx: u32,
    fifo: FifoBuffer,
    engine: SensorReplayEngine,
}

impl SensorStream {
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            name: Vec::new(),
            sensor_idx: 0,
            fifo: FifoBuffer::default(),
            engine: SensorReplayEngine::new(),
        }
    }

    pub fn engine(&self) -> &SensorReplayEngine {
        &self.engine
    }

    pub fn fifo(&self) -> &FifoBuffer {
        &self.fifo
    }

    pub fn recording_path(&self) -> PathBuf {
        let name = String::from_utf8_lossy(&self.name);
        self.work_dir
            .join(format!("{}.{}.{}", name, self.sensor_idx, RECORDING_EXTENSION))
    }

    fn control(bank: &RegisterBank) -> SensorControl {
        SensorControl::from_bits_retain(bank.get(CONTROL))
    }

    /// Bytes one timer event moves: a FIFO block in DMA mode, else one sample.
    fn unit(bank: &RegisterBank) -> u32 {
        if Self::control(bank).contains(SensorControl::DMA) {
            bank.get(FIFO_SIZE)
        } else {
            bank.get(SAMPLE_SIZE)
        }
    }

    fn enable(&mut self, bank: &RegisterBank, control: SensorControl) {
        tracing::info!("Sensor enabled");
        if bank.get(SENSOR_NAME_VALID) != 0 {
            let path = self.recording_path();
            match RecordingReader::open(&path) {
                Ok(reader) => self.engine.attach(Box::new(reader)),
                Err(e) => tracing::warn!("Cannot open recording {:?}: {}", path, e),
            }
        }
        if !control.contains(SensorControl::DMA) {
            let sample_size = bank.get(SAMPLE_SIZE) as usize;
            let capacity = (bank.get(FIFO_SIZE) as usize / sample_size) * sample_size;
            let watermark = bank.get(DATA_THRESHOLD) as usize * sample_size;
            self.fifo = FifoBuffer::new(capacity, watermark);
        }
        self.sensor_idx += 1;
    }
}

fn write_control(h: &mut SensorStream, bank: &mut RegisterBank, value: u32) -> u32 {
    let old = SensorStream::control(bank);
    let new = SensorControl::from_bits_retain(value);
    if (old ^ new).contains(SensorControl::ENABLE) {
        bank.set(STATUS, 0);
        h.engine.flush();
        if new.contains(SensorControl::ENABLE) {
            h.enable(bank, new);
        } else {
            h.engine.detach();
            tracing::info!("Sensor disabled");
        }
    }
    value
}

fn read_status(_h: &mut SensorStream, bank: &mut RegisterBank) -> u32 {
    let value = bank.get(STATUS);
    bank.clear_bits(STATUS, SensorStatus::OVERFLOW.bits());
    value
}

fn write_name_len(h: &mut SensorStream, bank: &mut RegisterBank, value: u32) -> u32 {
    h.name.clear();
    bank.set(SENSOR_NAME_VALID, 0);
    value
}

fn write_name_char(h: &mut SensorStream, bank: &mut RegisterBank, value: u32) -> u32 {
    let expected = bank.get(SENSOR_NAME_LEN) as usize;
    if h.name.len() < expected {
        h.name.push((value & 0xFF) as u8);
    }
    if h.name.len() == expected {
        let path = h.recording_path();
        let valid = path.is_file();
        bank.set(SENSOR_NAME_VALID, valid as u32);
        tracing::debug!("Sensor recording {:?} valid: {}", path, valid);
    }
    value
}

fn read_sample_count(h: &mut SensorStream, bank: &mut RegisterBank) -> u32 {
    let count = (h.fifo.count() / bank.get(SAMPLE_SIZE).max(1) as usize) as u32;
    bank.set(SAMPLE_COUNT, count);
    count
}

fn read_sample_port(h: &mut SensorStream, _bank: &mut RegisterBank) -> u32 {
    h.fifo.get().map(u32::from).unwrap_or(0)
}

fn write_at_least_one(_h: &mut SensorStream, _bank: &mut RegisterBank, value: u32) -> u32 {
    value.max(1)
}

impl StreamHandler for SensorStream {
    fn kind(&self) -> StreamKind {
        StreamKind::Sensor
    }

    fn register_map() -> Vec<RegisterSlot<Self>> {
        vec![
            RegisterSlot::new("CONTROL", 0).on_write(write_control),
            RegisterSlot::new("STATUS", 0).on_read(read_status).read_only(),
            RegisterSlot::new("SENSOR_NAME_LEN", 0).on_write(write_name_len),
            RegisterSlot::new("SENSOR_NAME_CHAR", 0).on_write(write_name_char),
            RegisterSlot::new("SENSOR_NAME_VALID", 0).read_only(),
            RegisterSlot::new("SAMPLE_SIZE", 1).on_write(write_at_least_one),
            RegisterSlot::new("SAMPLE_COUNT", 0)
                .on_read(read_sample_count)
                .read_only(),
            RegisterSlot::new("SAMPLE_PORT", 0)
                .on_read(read_sample_port)
                .read_only(),
            RegisterSlot::new("DATA_THRESHOLD", 0).on_write(write_at_least_one),
            RegisterSlot::new("FIFO_SIZE", 1).on_write(write_at_least_one),
        ]
    }

    fn timer_event(
        &mut self,
        bank: &mut RegisterBank,
        block: &mut TimerDmaBlock,
    ) -> Option<RegisterWrite> {
        let control = Self::control(bank);
        if !control.contains(SensorControl::ENABLE) {
            return None;
        }

        self.engine.track_time();

        if control.contains(SensorControl::DMA) {
            block.raise(SensorIrq::THRESHOLD.bits());
            return None;
        }

        let data = self.engine.get_data(bank.get(SAMPLE_SIZE) as usize);
        for byte in data {
            if !self.fifo.put(byte) {
                bank.set_bits(STATUS, SensorStatus::OVERFLOW.bits());
                block.raise(SensorIrq::OVERFLOW.bits());
                tracing::debug!("Sensor FIFO overflow");
                break;
            }
        }
        if self.fifo.threshold() {
            block.raise(SensorIrq::THRESHOLD.bits());
        }
        None
    }

    fn on_timer_interval(&mut self, bank: &RegisterBank, interval: u32) -> u32 {
        if Self::control(bank).contains(SensorControl::ENABLE) {
            self.engine.update_timer(interval, Self::unit(bank))
        } else {
            interval
        }
    }

    fn read_block(&mut self, bank: &mut RegisterBank, size: usize) -> Vec<u8> {
        if !Self::control(bank).contains(SensorControl::ENABLE) {
            return Vec::new();
        }
        self.engine.get_data(size)
    }

    fn write_block(&mut self, _bank: &mut RegisterBank, data: &[u8]) {
        tracing::trace!("Sensor ignores {} byte DMA write", data.len());
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "recording": self.recording_path(),
            "fifo": self.fifo,
            "interval_us": self.engine.interval(),
            "elapsed_us": self.engine.elapsed_us(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsi::{VirtualStreamInterface, Vsi, VsiSlot};

    fn sensor() -> Vsi<SensorStream> {
        Vsi::new(VsiSlot::new(2).unwrap(), SensorStream::new(PathBuf::from(".")))
    }

    #[test]
    fn test_zero_sizes_are_stored_as_one() {
        let mut vsi = sensor();
        assert_eq!(vsi.write_register(SAMPLE_SIZE, 0), 1);
        assert_eq!(vsi.write_register(DATA_THRESHOLD, 0), 1);
        assert_eq!(vsi.write_register(FIFO_SIZE, 0), 1);
        assert_eq!(vsi.write_register(FIFO_SIZE, 64), 64);
        assert_eq!(vsi.write_register(SAMPLE_COUNT, 5), 0);
    }

    #[test]
    fn test_missing_recording_is_not_valid() {
        let mut vsi = sensor();
        vsi.write_register(SENSOR_NAME_LEN, 3);
        for c in b"zzz" {
            vsi.write_register(SENSOR_NAME_CHAR, *c as u32);
        }
        assert_eq!(vsi.read_register(SENSOR_NAME_VALID), 0);
        assert_eq!(
            vsi.handler().recording_path(),
            PathBuf::from("./zzz.0.sds")
        );
    }

    #[test]
    fn test_empty_fifo_port_reads_zero() {
        let mut vsi = sensor();
        assert_eq!(vsi.read_register(SAMPLE_PORT), 0);
        assert_eq!(vsi.read_register(SAMPLE_COUNT), 0);
        assert_eq!(vsi.read_data_dma(8), vec![0; 8]);
    }
}
