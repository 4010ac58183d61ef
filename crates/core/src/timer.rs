// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{DmaDirection, TimerEventResult};
use bitflags::bitflags;

pub const IRQ_ENABLE: u64 = 0x000;
pub const IRQ_SET: u64 = 0x004;
pub const IRQ_CLEAR: u64 = 0x008;
pub const IRQ_STATUS: u64 = 0x00C;
pub const TIMER_CONTROL: u64 = 0x100;
pub const TIMER_INTERVAL: u64 = 0x104;
pub const TIMER_COUNT: u64 = 0x108;
pub const DMA_CONTROL: u64 = 0x200;
pub const DMA_ADDRESS: u64 = 0x204;
pub const DMA_BLOCK_SIZE: u64 = 0x208;
pub const DMA_BLOCK_NUM: u64 = 0x20C;
pub const DMA_BLOCK_INDEX: u64 = 0x210;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerControl: u32 {
        const RUN      = 1 << 0;
        const PERIODIC = 1 << 1;
        const TRIG_IRQ = 1 << 2;
        const TRIG_DMA = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaControl: u32 {
        const ENABLE    = 1 << 0;
        /// Set: memory to peripheral.
        const DIRECTION = 1 << 1;
    }
}

/// IRQ, Timer and DMA registers common to every VSI instance.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct TimerDmaBlock {
    irq_enable: u32,
    irq_status: u32,
    timer_control: u32,
    /// Microseconds between timer events.
    timer_interval: u32,
    timer_count: u32,
    dma_control: u32,
    dma_address: u32,
    dma_block_size: u32,
    dma_block_num: u32,
    dma_block_index: u32,
}

impl TimerDmaBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, offset: u64) -> Option<u32> {
        let value = match offset {
            IRQ_ENABLE => self.irq_enable,
            IRQ_SET | IRQ_CLEAR => 0,
            IRQ_STATUS => self.irq_status,
            TIMER_CONTROL => self.timer_control,
            TIMER_INTERVAL => self.timer_interval,
            TIMER_COUNT => self.timer_count,
            DMA_CONTROL => self.dma_control,
            DMA_ADDRESS => self.dma_address,
            DMA_BLOCK_SIZE => self.dma_block_size,
            DMA_BLOCK_NUM => self.dma_block_num,
            DMA_BLOCK_INDEX => self.dma_block_index,
            _ => return None,
        };
        Some(value)
    }

    /// Returns false when `offset` is not part of the block.
    pub fn write(&mut self, offset: u64, value: u32) -> bool {
        match offset {
            IRQ_ENABLE => self.irq_enable = value,
            IRQ_SET => self.raise(value),
            IRQ_CLEAR => self.clear(value),
            IRQ_STATUS => self.irq_status = value,
            TIMER_CONTROL => {
                let was_running = self.is_running();
                self.timer_control = value;
                if !was_running && self.is_running() {
                    self.timer_count = 0;
                    tracing::debug!("VSI timer started, interval {} us", self.timer_interval);
                }
            }
            TIMER_INTERVAL => self.timer_interval = value,
            DMA_CONTROL => {
                self.dma_control = value;
                if self.dma_control().contains(DmaControl::ENABLE) {
                    self.dma_block_index = 0;
                }
            }
            DMA_ADDRESS => self.dma_address = value,
            DMA_BLOCK_SIZE => self.dma_block_size = value,
            DMA_BLOCK_NUM => self.dma_block_num = value,
            TIMER_COUNT | DMA_BLOCK_INDEX => {
                tracing::debug!("Ignoring write to read-only VSI offset {:#x}", offset);
            }
            _ => return false,
        }
        true
    }

    pub fn irq_status(&self) -> u32 {
        self.irq_status
    }

    pub fn raise(&mut self, bits: u32) {
        self.irq_status |= bits;
    }

    pub fn clear(&mut self, bits: u32) {
        self.irq_status &= !bits;
    }

    pub fn interval(&self) -> u32 {
        self.timer_interval
    }

    pub fn set_interval(&mut self, interval: u32) {
        self.timer_interval = interval;
    }

    pub fn timer_control(&self) -> TimerControl {
        TimerControl::from_bits_retain(self.timer_control)
    }

    pub fn dma_control(&self) -> DmaControl {
        DmaControl::from_bits_retain(self.dma_control)
    }

    pub fn is_running(&self) -> bool {
        self.timer_control().contains(TimerControl::RUN)
    }

    pub fn timer_count(&self) -> u32 {
        self.timer_count
    }

    pub fn block_index(&self) -> u32 {
        self.dma_block_index
    }

    pub fn dma_direction(&self) -> DmaDirection {
        if self.dma_control().contains(DmaControl::DIRECTION) {
            DmaDirection::MemoryToPeripheral
        } else {
            DmaDirection::PeripheralToMemory
        }
    }

    /// Account for one elapsed interval and decide what the host does next.
    pub fn fire(&mut self) -> TimerEventResult {
        let control = self.timer_control();
        self.timer_count = self.timer_count.wrapping_add(1);
        if !control.contains(TimerControl::PERIODIC) {
            self.timer_control &= !TimerControl::RUN.bits();
        }

        let irq = control.contains(TimerControl::TRIG_IRQ) && self.irq_status != 0;
        let dma = (control.contains(TimerControl::TRIG_DMA)
            && self.dma_control().contains(DmaControl::ENABLE))
        .then(|| self.dma_direction());
        TimerEventResult { irq, dma }
    }

    /// Move to the next DMA block, wrapping at BlockNum.
    pub fn advance_block(&mut self) {
        if self.dma_block_num == 0 {
            return;
        }
        self.dma_block_index = (self.dma_block_index + 1) % self.dma_block_num;
    }
}
