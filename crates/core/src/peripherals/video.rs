// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::control::{RegisterWrite, Status, StreamControl};
use crate::regs::{RegisterBank, RegisterSlot};
use crate::timer::TimerDmaBlock;
use crate::vsi::StreamHandler;
use labwired_bridge::{BridgeClient, StreamFormat, VideoFormat};
use labwired_config::StreamKind;
use std::path::PathBuf;

pub const FILENAME: usize = 2;
pub const FRAME_WIDTH: usize = 3;
pub const FRAME_HEIGHT: usize = 4;
pub const FRAME_RATE: usize = 5;
pub const FRAME_COLOR: usize = 6;
pub const FRAME_COUNT: usize = 7;

/// Video capture/display stream relayed to a video bridge server.
#[derive(Debug)]
pub struct VideoStream {
    stream: StreamControl,
}

impl VideoStream {
    pub fn new(client: BridgeClient, work_dir: PathBuf) -> Self {
        Self {
            stream: StreamControl::new(client, work_dir),
        }
    }

    pub fn control(&self) -> &StreamControl {
        &self.stream
    }

    pub fn format(bank: &RegisterBank) -> VideoFormat {
        VideoFormat {
            width: bank.get(FRAME_WIDTH),
            height: bank.get(FRAME_HEIGHT),
            rate: bank.get(FRAME_RATE),
            color: bank.get(FRAME_COLOR),
        }
    }

    fn count_frame(bank: &mut RegisterBank) {
        bank.set(FRAME_COUNT, bank.get(FRAME_COUNT).wrapping_add(1));
    }
}

fn write_control(h: &mut VideoStream, bank: &mut RegisterBank, value: u32) -> u32 {
    let format = StreamFormat::Video(VideoStream::format(bank));
    h.stream.write_control(bank, value, format)
}

fn read_status(h: &mut VideoStream, bank: &mut RegisterBank) -> u32 {
    h.stream.read_status(bank)
}

fn write_filename(h: &mut VideoStream, bank: &mut RegisterBank, value: u32) -> u32 {
    h.stream.write_filename(bank, value)
}

fn read_filename(h: &mut VideoStream, _bank: &mut RegisterBank) -> u32 {
    h.stream.filename_len()
}

impl StreamHandler for VideoStream {
    fn kind(&self) -> StreamKind {
        StreamKind::Video
    }

    fn register_map() -> Vec<RegisterSlot<Self>> {
        vec![
            RegisterSlot::new("CONTROL", 0).on_write(write_control),
            RegisterSlot::new("STATUS", 0).on_read(read_status).read_only(),
            RegisterSlot::new("FILENAME", 0)
                .on_read(read_filename)
                .on_write(write_filename),
            RegisterSlot::new("FRAME_WIDTH", 300),
            RegisterSlot::new("FRAME_HEIGHT", 300),
            RegisterSlot::new("FRAME_RATE", 0),
            RegisterSlot::new("FRAME_COLOR", 0),
            RegisterSlot::new("FRAME_COUNT", 0).read_only(),
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
        match self.stream.read_block(bank, size) {
            Some((data, _)) => {
                if !StreamControl::status(bank).contains(Status::EOS) {
                    Self::count_frame(bank);
                }
                data
            }
            None => Vec::new(),
        }
    }

    fn write_block(&mut self, bank: &mut RegisterBank, data: &[u8]) {
        if self.stream.write_block(bank, data) {
            Self::count_frame(bank);
        } else {
            tracing::trace!("Video stream inactive; dropped {} byte frame", data.len());
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "connection": self.stream.client().state(),
            "filename": self.stream.latch(),
        })
    }
}
