// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! In-process model of the virtual streaming interface (VSI) peripherals.
//!
//! Each instance is a [`vsi::Vsi`]: a register file whose per-index side
//! effects are dispatched to a stream handler, plus the IRQ/Timer/DMA block
//! shared by every instance type. Audio and video handlers talk to an
//! out-of-process bridge server; the sensor handler replays local recordings.

pub mod control;
pub mod fifo;
pub mod filename;
pub mod peripherals;
pub mod recording;
pub mod regs;
pub mod replay;
pub mod timer;
pub mod vsi;

pub use vsi::{StreamHandler, VirtualStreamInterface, Vsi, VsiSlot};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Unaligned word access at {0:#x}")]
    UnalignedAccess(u64),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Direction of a VSI DMA block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DmaDirection {
    /// Peripheral to memory: the host calls `read_data_dma`.
    PeripheralToMemory,
    /// Memory to peripheral: the host calls `write_data_dma`.
    MemoryToPeripheral,
}

/// What the host should do after a timer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct TimerEventResult {
    pub irq: bool,
    pub dma: Option<DmaDirection>,
}

/// Trait representing a memory-mapped peripheral
///
/// Reads take `&mut self` because some registers clear state when read.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
