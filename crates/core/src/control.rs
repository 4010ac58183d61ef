// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! CONTROL/STATUS decoding and the enable state machine shared by the
//! bridge-backed (audio and video) peripherals.

use crate::filename::FilenameLatch;
use crate::regs::RegisterBank;
use bitflags::bitflags;
use labwired_bridge::{BridgeClient, StreamFormat, StreamMode};
use std::path::PathBuf;

/// CONTROL and STATUS sit at the same index for every bridged stream.
pub const CONTROL: usize = 0;
pub const STATUS: usize = 1;

const MODE_SHIFT: u32 = 1;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        const ENABLE     = 1 << 0;
        const MODE       = 0b11 << MODE_SHIFT;
        const CONTINUOUS = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        const ACTIVE     = 1 << 0;
        const DATA       = 1 << 1;
        const EOS        = 1 << 2;
        const FILE_NAME  = 1 << 3;
        const FILE_VALID = 1 << 4;
    }
}

impl Control {
    pub fn mode(self) -> StreamMode {
        StreamMode::from_bits((self & Control::MODE).bits() >> MODE_SHIFT)
    }

    pub fn with_mode(mode: StreamMode) -> Self {
        Control::from_bits_retain(mode.bits() << MODE_SHIFT)
    }
}

/// A register write a handler asks the instance to perform through the
/// dispatch table, so the target register's side effects run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub index: usize,
    pub value: u32,
}

/// Per-instance stream state behind CONTROL, STATUS and FILENAME.
#[derive(Debug)]
pub struct StreamControl {
    client: BridgeClient,
    latch: FilenameLatch,
    work_dir: PathBuf,
}

impl StreamControl {
    pub fn new(client: BridgeClient, work_dir: PathBuf) -> Self {
        Self {
            client,
            latch: FilenameLatch::new(),
            work_dir,
        }
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut BridgeClient {
        &mut self.client
    }

    pub fn latch(&self) -> &FilenameLatch {
        &self.latch
    }

    pub fn status(bank: &RegisterBank) -> Status {
        Status::from_bits_retain(bank.get(STATUS))
    }

    pub fn control(bank: &RegisterBank) -> Control {
        Control::from_bits_retain(bank.get(CONTROL))
    }

    /// CONTROL write. Returns the value to store.
    pub fn write_control(
        &mut self,
        bank: &mut RegisterBank,
        value: u32,
        format: StreamFormat,
    ) -> u32 {
        let old = Self::control(bank);
        let mut new = Control::from_bits_retain(value);

        // Stop first so a stop-and-switch write renegotiates an idle stream.
        if old.contains(Control::ENABLE) && !new.contains(Control::ENABLE) {
            self.client.disable();
            bank.clear_bits(STATUS, Status::ACTIVE.bits());
            tracing::info!("Stream disabled");
        }

        if (old ^ new).intersects(Control::MODE) {
            let mode = new.mode();
            if self.client.set_mode(mode) {
                tracing::info!("Stream mode set to {:?}", mode);
            } else {
                self.client.set_mode(StreamMode::None);
                new.remove(Control::MODE);
                tracing::error!("Stream mode {:?} rejected; mode cleared", mode);
            }
        }

        if !old.contains(Control::ENABLE) && new.contains(Control::ENABLE) {
            self.enable(bank, format);
        }

        new.bits()
    }

    fn enable(&mut self, bank: &mut RegisterBank, format: StreamFormat) {
        if !format.is_valid() {
            tracing::error!("Stream enable aborted: invalid format {:?}", format);
            return;
        }
        if !self.client.configure(format) {
            tracing::error!("Stream enable aborted: backend rejected {:?}", format);
            return;
        }
        if self.client.enable() {
            bank.set_bits(STATUS, Status::ACTIVE.bits());
            bank.clear_bits(STATUS, Status::EOS.bits());
            tracing::info!("Stream active with {:?}", format);
        } else {
            tracing::error!("Stream enable failed");
        }
    }

    /// STATUS read. DATA clears as a side effect.
    pub fn read_status(&mut self, bank: &mut RegisterBank) -> u32 {
        let value = bank.get(STATUS);
        bank.clear_bits(STATUS, Status::DATA.bits());
        value
    }

    /// FILENAME write of one character.
    pub fn write_filename(&mut self, bank: &mut RegisterBank, value: u32) -> u32 {
        let byte = (value & 0xFF) as u8;
        if let Some(name) = self.latch.push(byte) {
            let valid = self.client.set_filename(&self.work_dir, &name);
            self.latch.resolve(valid);
            if valid {
                tracing::info!("File name {:?} accepted", name);
            } else {
                tracing::error!("File name {:?} rejected", name);
            }
        }

        let mut status = Self::status(bank);
        status.set(Status::FILE_NAME, self.latch.is_latched());
        status.set(Status::FILE_VALID, self.latch.is_valid());
        bank.set(STATUS, status.bits());
        byte as u32
    }

    /// FILENAME read: length of the name assembled so far.
    pub fn filename_len(&self) -> u32 {
        self.latch.len() as u32
    }

    /// One-shot streams switch themselves off after a single timer event.
    pub fn timer_event(&self, bank: &RegisterBank) -> Option<RegisterWrite> {
        let control = Self::control(bank);
        if control.contains(Control::CONTINUOUS) || !control.contains(Control::ENABLE) {
            return None;
        }
        Some(RegisterWrite {
            index: CONTROL,
            value: (control - Control::ENABLE).bits(),
        })
    }

    /// Pull one block. `None` while the stream is not active.
    pub fn read_block(&mut self, bank: &mut RegisterBank, size: usize) -> Option<(Vec<u8>, bool)> {
        if !Self::status(bank).contains(Status::ACTIVE) {
            return None;
        }
        let (data, eos) = self.client.read(size as u32);
        if eos {
            bank.set_bits(STATUS, Status::EOS.bits());
            tracing::debug!("End of stream");
        }
        bank.set_bits(STATUS, Status::DATA.bits());
        Some((data, eos))
    }

    /// Push one block. Returns false and drops `data` while not active.
    pub fn write_block(&mut self, bank: &mut RegisterBank, data: &[u8]) -> bool {
        if !Self::status(bank).contains(Status::ACTIVE) {
            return false;
        }
        self.client.write(data);
        bank.set_bits(STATUS, Status::DATA.bits());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labwired_bridge::{AudioBackend, AudioFormat, LocalChannel, SyntheticAudioHost};

    fn control_over_local() -> StreamControl {
        let channel = LocalChannel::new(AudioBackend::new(SyntheticAudioHost));
        StreamControl::new(
            BridgeClient::with_channel(Box::new(channel)),
            PathBuf::from("."),
        )
    }

    fn mono16() -> StreamFormat {
        StreamFormat::Audio(AudioFormat {
            channels: 1,
            sample_rate: 16000,
            sample_bits: 16,
        })
    }

    #[test]
    fn test_mode_field_round_trip() {
        let control = Control::ENABLE | Control::with_mode(StreamMode::Output);
        assert_eq!(control.bits(), 0b101);
        assert_eq!(control.mode(), StreamMode::Output);
    }

    #[test]
    fn test_enable_and_disable_toggle_active() {
        let mut stream = control_over_local();
        let mut bank = RegisterBank::new(8);
        let value = (Control::ENABLE | Control::with_mode(StreamMode::Input)).bits();

        let stored = stream.write_control(&mut bank, value, mono16());
        bank.set(CONTROL, stored);
        assert_eq!(stored, value);
        assert!(StreamControl::status(&bank).contains(Status::ACTIVE));

        let stored = stream.write_control(&mut bank, stored & !Control::ENABLE.bits(), mono16());
        bank.set(CONTROL, stored);
        assert!(!StreamControl::status(&bank).contains(Status::ACTIVE));
    }

    #[test]
    fn test_stop_and_switch_mode_in_one_write() {
        let mut stream = control_over_local();
        let mut bank = RegisterBank::new(8);
        let value = (Control::ENABLE | Control::with_mode(StreamMode::Input)).bits();
        let stored = stream.write_control(&mut bank, value, mono16());
        bank.set(CONTROL, stored);
        assert!(StreamControl::status(&bank).contains(Status::ACTIVE));

        let stored =
            stream.write_control(&mut bank, Control::with_mode(StreamMode::Output).bits(), mono16());
        assert_eq!(Control::from_bits_retain(stored).mode(), StreamMode::Output);
        assert!(!StreamControl::status(&bank).contains(Status::ACTIVE));
    }

    #[test]
    fn test_invalid_format_keeps_active_clear() {
        let mut stream = control_over_local();
        let mut bank = RegisterBank::new(8);
        let bad = StreamFormat::Audio(AudioFormat {
            channels: 0,
            sample_rate: 16000,
            sample_bits: 16,
        });
        let value = (Control::ENABLE | Control::with_mode(StreamMode::Input)).bits();
        stream.write_control(&mut bank, value, bad);
        assert!(!StreamControl::status(&bank).contains(Status::ACTIVE));
    }

    #[test]
    fn test_disconnected_client_clears_mode() {
        let mut stream = StreamControl::new(BridgeClient::disconnected(), PathBuf::from("."));
        let mut bank = RegisterBank::new(8);
        let value = (Control::ENABLE | Control::with_mode(StreamMode::Input)).bits();
        let stored = stream.write_control(&mut bank, value, mono16());
        assert_eq!(stored, Control::ENABLE.bits());
        assert_eq!(StreamControl::status(&bank), Status::empty());
        assert_eq!(stream.read_block(&mut bank, 16), None);
    }

    #[test]
    fn test_status_read_clears_data_only() {
        let mut stream = control_over_local();
        let mut bank = RegisterBank::new(8);
        bank.set(STATUS, (Status::ACTIVE | Status::DATA).bits());
        assert_eq!(stream.read_status(&mut bank), (Status::ACTIVE | Status::DATA).bits());
        assert_eq!(stream.read_status(&mut bank), Status::ACTIVE.bits());
    }

    #[test]
    fn test_one_shot_requests_disable() {
        let stream = control_over_local();
        let mut bank = RegisterBank::new(8);
        bank.set(CONTROL, Control::ENABLE.bits());
        assert_eq!(
            stream.timer_event(&bank),
            Some(RegisterWrite {
                index: CONTROL,
                value: 0
            })
        );
        bank.set(CONTROL, (Control::ENABLE | Control::CONTINUOUS).bits());
        assert_eq!(stream.timer_event(&bank), None);
    }
}
