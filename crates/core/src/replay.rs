// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Paces recorded sensor data against the recording's own timestamps.
//!
//! Records are pulled lazily. Once the recording has advanced by
//! [`SLIDE_MS`] since the last estimate, the engine measures a
//! [`WINDOW_MS`] span of upcoming records and derives the timer interval
//! (in microseconds) that delivers them at their captured rate. The
//! difference between the time the timer has actually covered and the
//! recording's own elapsed time is spread across the window, so replay
//! converges back onto the original cadence.

use crate::recording::RecordSource;
use std::collections::VecDeque;

pub const WINDOW_MS: u32 = 10_000;
pub const SLIDE_MS: u32 = 1_000;

#[derive(Debug, Default)]
pub struct SensorReplayEngine {
    source: Option<Box<dyn RecordSource>>,
    buffer: VecDeque<u8>,
    /// Timestamps and payload sizes of records not yet fully behind `cnt`.
    timestamps: Vec<u32>,
    sizes: Vec<u32>,
    first_timestamp: Option<u32>,
    /// Index of the next record consumption will start.
    cnt: usize,
    /// `cnt` at the last interval estimate.
    cnt_old: usize,
    /// Bytes left in the record currently being consumed.
    active_remaining: u32,
    window_ms: u32,
    interval: u32,
    initial_interval: u32,
    elapsed_us: i64,
    timer_events: u32,
}

impl SensorReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, source: Box<dyn RecordSource>) {
        self.source = Some(source);
    }

    pub fn detach(&mut self) {
        self.source = None;
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Drop buffered data and pacing state. The source stays attached.
    pub fn flush(&mut self) {
        tracing::debug!("Flushing replay state");
        let source = self.source.take();
        *self = Self {
            source,
            ..Self::default()
        };
    }

    /// Current estimate in microseconds; 0 until one exists.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }

    pub fn elapsed_us(&self) -> i64 {
        self.elapsed_us
    }

    pub fn timer_events(&self) -> u32 {
        self.timer_events
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn pull_record(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.next_record() {
            Ok(Some(record)) => {
                self.first_timestamp.get_or_insert(record.timestamp_ms);
                self.timestamps.push(record.timestamp_ms);
                self.sizes.push(record.payload_size());
                self.buffer.extend(record.payload);
                true
            }
            Ok(None) => {
                tracing::trace!("Recording exhausted");
                false
            }
            Err(e) => {
                tracing::warn!("Recording read failed: {}; replay stopped", e);
                self.source = None;
                false
            }
        }
    }

    /// Next `size` bytes of recorded payload, or zeros once the recording
    /// cannot supply that many.
    pub fn get_data(&mut self, size: usize) -> Vec<u8> {
        while self.buffer.len() < size && self.pull_record() {}
        if self.buffer.len() < size {
            tracing::trace!("No recorded data for {} bytes", size);
            return vec![0; size];
        }
        let data: Vec<u8> = self.buffer.drain(..size).collect();
        self.consume(size as u64);
        data
    }

    fn consume(&mut self, mut bytes: u64) {
        while bytes > 0 {
            if self.active_remaining == 0 {
                match self.sizes.get(self.cnt) {
                    Some(&size) => {
                        self.active_remaining = size;
                        self.cnt += 1;
                        continue;
                    }
                    None => break,
                }
            }
            let take = bytes.min(self.active_remaining as u64);
            self.active_remaining -= take as u32;
            bytes -= take;
        }
    }

    fn compute_window(&mut self) {
        let mut window = 0;
        let mut seen = 0;
        loop {
            if self.timestamps.is_empty() {
                self.pull_record();
            }
            if self.timestamps.len() == seen {
                break;
            }
            seen = self.timestamps.len();

            let start = self.timestamps[self.cnt.min(seen - 1)];
            let end = self.timestamps[seen - 1];
            window = end.saturating_sub(start);
            if window >= WINDOW_MS {
                break;
            }
            self.pull_record();
        }
        self.window_ms = window;
        tracing::debug!("Replay window {} ms", window);
    }

    /// `unit` is the number of bytes one timer event moves.
    fn compute_interval(&mut self, unit: u32) {
        let end = self.sizes.len().saturating_sub(1);
        let total: u64 = self
            .sizes
            .get(self.cnt..end)
            .map(|s| s.iter().map(|&v| v as u64).sum())
            .unwrap_or(0);
        let num = total / unit.max(1) as u64;
        if num == 0 {
            self.interval = 0;
            return;
        }

        let mut interval = (self.window_ms as f64 * 1000.0 / num as f64).round() as i64;
        let start = self.timestamps[self.cnt];
        let first = self.first_timestamp.unwrap_or(start);
        let record_elapsed_us = start.saturating_sub(first) as i64 * 1000;
        if self.elapsed_us != record_elapsed_us {
            let drift = (self.elapsed_us - record_elapsed_us) as f64 / num as f64;
            interval -= drift.round() as i64;
        }
        if interval < 1 {
            tracing::warn!("Replay interval correction went to {} us; clamped to 1", interval);
            interval = 1;
        }
        self.interval = interval.min(u32::MAX as i64) as u32;
        tracing::debug!("Replay interval {} us over {} samples", self.interval, num);
    }

    /// Called with the timer's current interval; returns the interval to use.
    pub fn update_timer(&mut self, interval: u32, unit: u32) -> u32 {
        let delta = if self.timestamps.is_empty() {
            SLIDE_MS
        } else if let Some(&current) = self.timestamps.get(self.cnt) {
            let last = self.timestamps.get(self.cnt_old).copied().unwrap_or(current);
            current.saturating_sub(last)
        } else {
            0
        };

        if delta >= SLIDE_MS {
            self.compute_window();
            self.compute_interval(unit);
            self.cnt_old = self.cnt;
            self.prune();
        }

        if self.timer_events == 0 {
            self.initial_interval = interval;
        }
        if self.interval > 0 {
            self.interval
        } else {
            interval
        }
    }

    /// Forget records that consumption has fully moved past.
    fn prune(&mut self) {
        let done = self.cnt.min(self.cnt_old);
        if done == 0 {
            return;
        }
        self.timestamps.drain(..done);
        self.sizes.drain(..done);
        self.cnt -= done;
        self.cnt_old -= done;
    }

    /// Advance the elapsed-time tracker by one timer event.
    pub fn track_time(&mut self) {
        if self.timer_events < 2 {
            self.elapsed_us += self.initial_interval as i64;
            self.timer_events += 1;
        } else {
            self.elapsed_us += self.interval as i64;
        }
    }
}
