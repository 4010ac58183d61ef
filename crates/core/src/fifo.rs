// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Fixed-capacity byte ring with a fill watermark.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FifoBuffer {
    #[serde(skip)]
    data: Vec<u8>,
    put_idx: usize,
    get_idx: usize,
    count: usize,
    watermark: usize,
    threshold: bool,
}

impl Default for FifoBuffer {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl FifoBuffer {
    pub fn new(capacity: usize, watermark: usize) -> Self {
        Self {
            data: vec![0; capacity],
            put_idx: 0,
            get_idx: 0,
            count: 0,
            watermark,
            threshold: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    pub fn threshold(&self) -> bool {
        self.threshold
    }

    /// Returns false and leaves the buffer untouched when full.
    pub fn put(&mut self, byte: u8) -> bool {
        if self.is_full() {
            tracing::trace!("FIFO full, dropping {:#04x}", byte);
            return false;
        }
        self.data[self.put_idx] = byte;
        self.put_idx = (self.put_idx + 1) % self.capacity();
        self.count += 1;
        if self.watermark != 0 && self.count >= self.watermark {
            self.threshold = true;
        }
        true
    }

    pub fn get(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.data[self.get_idx];
        self.get_idx = (self.get_idx + 1) % self.capacity();
        self.count -= 1;
        if self.count < self.watermark {
            self.threshold = false;
        }
        Some(byte)
    }
}
