// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Timestamped sensor recordings: an 8-byte little-endian header
//! (timestamp in ms, payload length) followed by the payload, repeated.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const RECORD_HEADER_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("Recording I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Record payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedRecord {
    pub timestamp_ms: u32,
    pub payload: Vec<u8>,
}

impl TimedRecord {
    pub fn new(timestamp_ms: u32, payload: Vec<u8>) -> Self {
        Self {
            timestamp_ms,
            payload,
        }
    }

    pub fn payload_size(&self) -> u32 {
        self.payload.len() as u32
    }
}

/// Sequential supply of records.
pub trait RecordSource: std::fmt::Debug + Send {
    /// `Ok(None)` once the recording is exhausted.
    fn next_record(&mut self) -> Result<Option<TimedRecord>, RecordingError>;
}

#[derive(Debug)]
pub struct RecordingReader<R> {
    inner: R,
}

impl RecordingReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RecordingError> {
        let file = File::open(path.as_ref())?;
        tracing::info!("Opened recording {:?}", path.as_ref());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> RecordingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Send + std::fmt::Debug> RecordSource for RecordingReader<R> {
    fn next_record(&mut self) -> Result<Option<TimedRecord>, RecordingError> {
        let mut header = Vec::with_capacity(RECORD_HEADER_LEN);
        (&mut self.inner)
            .take(RECORD_HEADER_LEN as u64)
            .read_to_end(&mut header)?;
        if header.len() < RECORD_HEADER_LEN {
            if !header.is_empty() {
                tracing::warn!("Recording ends in a truncated header ({} bytes)", header.len());
            }
            return Ok(None);
        }

        let timestamp_ms = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let mut payload = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut payload)?;
        if payload.len() < len as usize {
            tracing::warn!(
                "Record at {} ms truncated: {} of {} bytes",
                timestamp_ms,
                payload.len(),
                len
            );
        }
        Ok(Some(TimedRecord {
            timestamp_ms,
            payload,
        }))
    }
}

/// In-memory record list, mostly for synthetic replays.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecording {
    records: VecDeque<TimedRecord>,
}

impl MemoryRecording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TimedRecord) {
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<TimedRecord> for MemoryRecording {
    fn from_iter<I: IntoIterator<Item = TimedRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl RecordSource for MemoryRecording {
    fn next_record(&mut self) -> Result<Option<TimedRecord>, RecordingError> {
        Ok(self.records.pop_front())
    }
}

#[derive(Debug)]
pub struct RecordingWriter<W: Write> {
    inner: W,
    records: usize,
}

impl RecordingWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, RecordingError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    pub fn write_record(&mut self, timestamp_ms: u32, payload: &[u8]) -> Result<(), RecordingError> {
        let len = u32::try_from(payload.len())
            .map_err(|_| RecordingError::PayloadTooLarge(payload.len()))?;
        self.inner.write_all(&timestamp_ms.to_le_bytes())?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(mut self) -> Result<W, RecordingError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
