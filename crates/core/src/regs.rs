// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Index-addressed user register file with per-slot side effects.

/// Hardware limit of user registers per VSI instance.
pub const MAX_REGISTERS: usize = 64;

/// Raw register values of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegisterBank {
    values: Vec<u32>,
}

impl RegisterBank {
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![0; len.min(MAX_REGISTERS)],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> u32 {
        self.values.get(index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, value: u32) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    pub fn set_bits(&mut self, index: usize, bits: u32) {
        self.set(index, self.get(index) | bits);
    }

    pub fn clear_bits(&mut self, index: usize, bits: u32) {
        self.set(index, self.get(index) & !bits);
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }
}

pub type ReadHook<H> = fn(&mut H, &mut RegisterBank) -> u32;
pub type WriteHook<H> = fn(&mut H, &mut RegisterBank, u32) -> u32;

enum WriteAccess<H> {
    Store,
    ReadOnly,
    Hook(WriteHook<H>),
}

/// Dispatch entry for one register index.
pub struct RegisterSlot<H> {
    pub name: &'static str,
    pub reset: u32,
    read: Option<ReadHook<H>>,
    write: WriteAccess<H>,
}

impl<H> RegisterSlot<H> {
    /// Plain storage register.
    pub fn new(name: &'static str, reset: u32) -> Self {
        Self {
            name,
            reset,
            read: None,
            write: WriteAccess::Store,
        }
    }

    pub fn on_read(mut self, hook: ReadHook<H>) -> Self {
        self.read = Some(hook);
        self
    }

    /// The hook returns the value that ends up stored.
    pub fn on_write(mut self, hook: WriteHook<H>) -> Self {
        self.write = WriteAccess::Hook(hook);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.write = WriteAccess::ReadOnly;
        self
    }
}

/// Register values plus a dispatch table built once per instance.
///
/// Out-of-range indices read as zero and drop writes.
pub struct RegisterFile<H> {
    bank: RegisterBank,
    slots: Vec<RegisterSlot<H>>,
}

impl<H> std::fmt::Debug for RegisterFile<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.slots
                    .iter()
                    .zip(self.bank.values())
                    .map(|(slot, value)| (slot.name, format!("{:#010x}", value))),
            )
            .finish()
    }
}

impl<H> RegisterFile<H> {
    pub fn new(mut slots: Vec<RegisterSlot<H>>) -> Self {
        if slots.len() > MAX_REGISTERS {
            tracing::warn!(
                "Register map has {} entries; keeping the first {}",
                slots.len(),
                MAX_REGISTERS
            );
            slots.truncate(MAX_REGISTERS);
        }
        let mut bank = RegisterBank::new(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            bank.set(index, slot.reset);
        }
        Self { bank, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.slots.get(index).map(|s| s.name)
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut RegisterBank {
        &mut self.bank
    }

    /// Stored value without running the read hook.
    pub fn peek(&self, index: usize) -> u32 {
        self.bank.get(index)
    }

    pub fn read(&mut self, handler: &mut H, index: usize) -> u32 {
        let Some(slot) = self.slots.get(index) else {
            tracing::warn!("Read of unmapped register index {}", index);
            return 0;
        };
        let value = match slot.read {
            Some(hook) => hook(handler, &mut self.bank),
            None => self.bank.get(index),
        };
        tracing::trace!("Regs[{}] {} -> {:#x}", index, slot.name, value);
        value
    }

    /// Returns the value actually stored.
    pub fn write(&mut self, handler: &mut H, index: usize, value: u32) -> u32 {
        let Some(slot) = self.slots.get(index) else {
            tracing::warn!("Write of {:#x} to unmapped register index {}", value, index);
            return 0;
        };
        let stored = match &slot.write {
            WriteAccess::Store => value,
            WriteAccess::ReadOnly => {
                tracing::debug!("Ignoring write to read-only register {}", slot.name);
                self.bank.get(index)
            }
            WriteAccess::Hook(hook) => hook(handler, &mut self.bank, value),
        };
        self.bank.set(index, stored);
        tracing::trace!("Regs[{}] {} <- {:#x} (stored {:#x})", index, slot.name, value, stored);
        stored
    }
}
