// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::control::RegisterWrite;
use crate::regs::{RegisterBank, RegisterFile, RegisterSlot, MAX_REGISTERS};
use crate::timer::{TimerDmaBlock, TIMER_INTERVAL};
use crate::{Peripheral, SimResult, SimulationError, TimerEventResult};
use labwired_config::{StreamKind, MAX_VSI_INSTANCES};

/// Offset of user register 0 within a VSI block.
pub const REGS_OFFSET: u64 = 0x300;
/// Size of one VSI block in the address map.
pub const VSI_BLOCK_SIZE: u64 = 0x10000;
pub const VSI_SECURE_BASE: u64 = 0x5FF0_0000;
pub const VSI_NON_SECURE_BASE: u64 = 0x4FF0_0000;
pub const VSI_IRQ_BASE: u32 = 224;

/// VSI slot number, fixing base address and IRQ line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct VsiSlot(u8);

impl VsiSlot {
    pub fn new(index: u8) -> Option<Self> {
        (index < MAX_VSI_INSTANCES).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn base_address(self, secure: bool) -> u64 {
        let base = if secure {
            VSI_SECURE_BASE
        } else {
            VSI_NON_SECURE_BASE
        };
        base + VSI_BLOCK_SIZE * self.0 as u64
    }

    pub fn irq(self) -> u32 {
        VSI_IRQ_BASE + self.0 as u32
    }
}

/// Stream-specific behaviour behind a VSI instance's user registers.
pub trait StreamHandler: std::fmt::Debug + Send + Sized {
    fn kind(&self) -> StreamKind;

    /// Dispatch table, built once per instance.
    fn register_map() -> Vec<RegisterSlot<Self>>;

    /// Runs once per timer event, before the block decides IRQ/DMA.
    fn timer_event(
        &mut self,
        bank: &mut RegisterBank,
        block: &mut TimerDmaBlock,
    ) -> Option<RegisterWrite>;

    /// Timer Interval write; returns the interval to program.
    fn on_timer_interval(&mut self, _bank: &RegisterBank, interval: u32) -> u32 {
        interval
    }

    fn read_block(&mut self, bank: &mut RegisterBank, size: usize) -> Vec<u8>;

    fn write_block(&mut self, bank: &mut RegisterBank, data: &[u8]);

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Host-facing surface of one VSI instance.
pub trait VirtualStreamInterface: Peripheral {
    fn slot(&self) -> VsiSlot;
    fn kind(&self) -> StreamKind;
    fn read_word(&mut self, offset: u64) -> SimResult<u32>;
    fn write_word(&mut self, offset: u64, value: u32) -> SimResult<()>;
    fn timer_event(&mut self) -> TimerEventResult;
    /// Always returns exactly `size` bytes.
    fn read_data_dma(&mut self, size: usize) -> Vec<u8>;
    fn write_data_dma(&mut self, data: &[u8]);
}

#[derive(Debug)]
pub struct Vsi<H: StreamHandler> {
    slot: VsiSlot,
    handler: H,
    regs: RegisterFile<H>,
    block: TimerDmaBlock,
}

impl<H: StreamHandler> Vsi<H> {
    pub fn new(slot: VsiSlot, handler: H) -> Self {
        Self {
            slot,
            handler,
            regs: RegisterFile::new(H::register_map()),
            block: TimerDmaBlock::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn block(&self) -> &TimerDmaBlock {
        &self.block
    }

    pub fn read_register(&mut self, index: usize) -> u32 {
        self.regs.read(&mut self.handler, index)
    }

    pub fn write_register(&mut self, index: usize, value: u32) -> u32 {
        self.regs.write(&mut self.handler, index, value)
    }

    pub fn peek_register(&self, index: usize) -> u32 {
        self.regs.peek(index)
    }

    fn register_index(offset: u64) -> Option<usize> {
        let end = REGS_OFFSET + 4 * MAX_REGISTERS as u64;
        (REGS_OFFSET..end)
            .contains(&offset)
            .then(|| ((offset - REGS_OFFSET) / 4) as usize)
    }

    /// Word value without read side effects.
    fn peek_word(&self, offset: u64) -> SimResult<u32> {
        match Self::register_index(offset) {
            Some(index) => Ok(self.regs.peek(index)),
            None => self
                .block
                .read(offset)
                .ok_or(SimulationError::MemoryViolation(offset)),
        }
    }
}

impl<H: StreamHandler> VirtualStreamInterface for Vsi<H> {
    fn slot(&self) -> VsiSlot {
        self.slot
    }

    fn kind(&self) -> StreamKind {
        self.handler.kind()
    }

    fn read_word(&mut self, offset: u64) -> SimResult<u32> {
        if offset % 4 != 0 {
            return Err(SimulationError::UnalignedAccess(offset));
        }
        match Self::register_index(offset) {
            Some(index) => Ok(self.read_register(index)),
            None => self
                .block
                .read(offset)
                .ok_or(SimulationError::MemoryViolation(offset)),
        }
    }

    fn write_word(&mut self, offset: u64, value: u32) -> SimResult<()> {
        if offset % 4 != 0 {
            return Err(SimulationError::UnalignedAccess(offset));
        }
        if let Some(index) = Self::register_index(offset) {
            self.write_register(index, value);
            return Ok(());
        }
        if offset == TIMER_INTERVAL {
            let interval = self.handler.on_timer_interval(self.regs.bank(), value);
            self.block.set_interval(interval);
            return Ok(());
        }
        if self.block.write(offset, value) {
            Ok(())
        } else {
            Err(SimulationError::MemoryViolation(offset))
        }
    }

    fn timer_event(&mut self) -> TimerEventResult {
        if !self.block.is_running() {
            tracing::trace!("VSI{} timer event while stopped", self.slot.0);
            return TimerEventResult::default();
        }
        let request = self.handler.timer_event(self.regs.bank_mut(), &mut self.block);
        if let Some(RegisterWrite { index, value }) = request {
            self.regs.write(&mut self.handler, index, value);
        }
        let result = self.block.fire();
        tracing::trace!("VSI{} timer event: {:?}", self.slot.0, result);
        result
    }

    fn read_data_dma(&mut self, size: usize) -> Vec<u8> {
        let mut data = self.handler.read_block(self.regs.bank_mut(), size);
        if data.len() != size {
            tracing::trace!("DMA read got {} of {} bytes", data.len(), size);
        }
        data.resize(size, 0);
        self.block.advance_block();
        data
    }

    fn write_data_dma(&mut self, data: &[u8]) {
        self.handler.write_block(self.regs.bank_mut(), data);
        self.block.advance_block();
    }
}

impl<H: StreamHandler> Peripheral for Vsi<H> {
    // Side-effecting register reads fire on byte lane 0 only.
    fn read(&mut self, offset: u64) -> SimResult<u8> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let reg_val = if byte_offset == 0 {
            self.read_word(reg_offset)?
        } else {
            self.peek_word(reg_offset)?
        };
        Ok(((reg_val >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;

        let mut reg_val = self.peek_word(reg_offset)?;
        let mask = 0xFF << (byte_offset * 8);
        reg_val &= !mask;
        reg_val |= (value as u32) << (byte_offset * 8);

        self.write_word(reg_offset, reg_val)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "slot": self.slot,
            "kind": self.handler.kind(),
            "block": self.block,
            "registers": self.regs.bank(),
            "stream": self.handler.snapshot(),
        })
    }
}
