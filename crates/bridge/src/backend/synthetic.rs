// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Built-in device hosts that need no hardware: a tone generator microphone,
//! a real-time draining speaker, a colour-bar camera and a discarding display.

use super::audio::{encode_sample, AudioDeviceHost, LiveStream};
use super::video::{FrameSink, FrameSource, VideoDeviceHost};
use super::{DeviceInfo, StreamBuffer};
use crate::error::{BackendError, BackendResult};
use crate::protocol::{AudioFormat, StreamMode, VideoFormat};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(10);
const TONE_HZ: f64 = 440.0;

pub const SYNTHETIC_MICROPHONE: u32 = 0;
pub const SYNTHETIC_SPEAKER: u32 = 1;
pub const TEST_PATTERN_CAMERA: u32 = 0;
pub const NULL_DISPLAY: u32 = 1;

fn device(index: u32, name: &str, capture: bool) -> DeviceInfo {
    DeviceInfo {
        index,
        name: name.to_string(),
        capture,
        playback: !capture,
    }
}

fn check_device(devices: &[DeviceInfo], index: u32, mode: StreamMode) -> BackendResult<()> {
    if devices.iter().any(|d| d.index == index && d.supports(mode)) {
        Ok(())
    } else {
        Err(BackendError::NoSuchDevice(index))
    }
}

#[derive(Debug, Default)]
pub struct SyntheticAudioHost;

impl AudioDeviceHost for SyntheticAudioHost {
    fn devices(&self) -> Vec<DeviceInfo> {
        vec![
            device(SYNTHETIC_MICROPHONE, "synthetic microphone", true),
            device(SYNTHETIC_SPEAKER, "synthetic speaker", false),
        ]
    }

    fn open(
        &mut self,
        index: u32,
        mode: StreamMode,
        format: &AudioFormat,
    ) -> BackendResult<Box<dyn LiveStream>> {
        check_device(&self.devices(), index, mode)?;
        Ok(Box::new(SyntheticAudioStream {
            mode,
            format: *format,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

struct SyntheticAudioStream {
    mode: StreamMode,
    format: AudioFormat,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

fn tone_chunk(format: &AudioFormat, start_frame: u64, frames: u64) -> Vec<u8> {
    let peak = ((1i64 << (format.sample_bits - 1)) - 1) as f64 * 0.5;
    let mut out = Vec::with_capacity(frames as usize * format.frame_bytes());
    for n in start_frame..start_frame + frames {
        let t = n as f64 / format.sample_rate as f64;
        let sample = ((2.0 * std::f64::consts::PI * TONE_HZ * t).sin() * peak) as i32;
        for _ in 0..format.channels {
            encode_sample(sample, format.sample_bits, &mut out);
        }
    }
    out
}

impl LiveStream for SyntheticAudioStream {
    fn start(&mut self, buffer: StreamBuffer) -> BackendResult<()> {
        self.stop();
        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let format = self.format;
        let frames_per_tick = (format.sample_rate as u64 / 100).max(1);
        let mode = self.mode;

        let worker = std::thread::Builder::new()
            .name("synthetic-audio".to_string())
            .spawn(move || {
                let mut frame = 0u64;
                while !stop.load(Ordering::SeqCst) {
                    match mode {
                        StreamMode::Input => {
                            buffer.push(&tone_chunk(&format, frame, frames_per_tick));
                            frame += frames_per_tick;
                        }
                        _ => {
                            let drained =
                                buffer.take(frames_per_tick as usize * format.frame_bytes());
                            tracing::trace!("Speaker played {} bytes", drained.len());
                        }
                    }
                    std::thread::sleep(TICK);
                }
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Synthetic audio worker panicked");
            }
        }
    }
}

impl Drop for SyntheticAudioStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Default)]
pub struct SyntheticVideoHost;

impl VideoDeviceHost for SyntheticVideoHost {
    fn devices(&self) -> Vec<DeviceInfo> {
        vec![
            device(TEST_PATTERN_CAMERA, "colour bar camera", true),
            device(NULL_DISPLAY, "null display", false),
        ]
    }

    fn open_camera(
        &mut self,
        index: u32,
        _format: &VideoFormat,
    ) -> BackendResult<Box<dyn FrameSource>> {
        check_device(&self.devices(), index, StreamMode::Input)?;
        Ok(Box::new(TestPatternCamera::new(640, 480)))
    }

    fn open_display(
        &mut self,
        index: u32,
        format: &VideoFormat,
    ) -> BackendResult<Box<dyn FrameSink>> {
        check_device(&self.devices(), index, StreamMode::Output)?;
        tracing::info!("Null display opened at {}x{}", format.width, format.height);
        Ok(Box::new(NullDisplay::default()))
    }
}

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Colour bars that scroll one bar per frame; frames are produced on demand.
#[derive(Debug)]
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPatternCamera {
    pub const FPS: f64 = 30.0;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: 0,
        }
    }
}

impl FrameSource for TestPatternCamera {
    fn native_fps(&self) -> Option<f64> {
        Some(Self::FPS)
    }

    fn next_frame(&mut self) -> BackendResult<Option<RgbImage>> {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let shift = self.frame as usize;
        let frame = RgbImage::from_fn(self.width, self.height, |x, _| {
            Rgb(BARS[((x / bar_width) as usize + shift) % BARS.len()])
        });
        self.frame += 1;
        Ok(Some(frame))
    }

    fn skip(&mut self, count: u32) -> BackendResult<bool> {
        self.frame += count as u64;
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct NullDisplay {
    frames: u64,
}

impl FrameSink for NullDisplay {
    fn write_frame(&mut self, frame: &RgbImage) -> BackendResult<()> {
        self.frames += 1;
        tracing::trace!(
            "Display frame {} ({}x{})",
            self.frames,
            frame.width(),
            frame.height()
        );
        Ok(())
    }
}
