// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{DeviceInfo, ReadBlock, StreamBackend};
use crate::color;
use crate::error::{BackendError, BackendResult};
use crate::frame::{fit_frame, FrameRateMatcher};
use crate::protocol::{StreamFormat, StreamMode, VideoFormat, DEVICE_DEFAULT};
use crate::server::{StreamSession, StreamTarget};
use crate::y4m::{Y4mReader, Y4mWriter};
use image::RgbImage;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub const VIDEO_EXTENSIONS: &[&str] = &["y4m", "png", "bmp", "jpg", "jpeg", "pnm", "ppm"];

pub trait FrameSource: Send {
    /// Capture rate of the source, when it has one.
    fn native_fps(&self) -> Option<f64>;
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> BackendResult<Option<RgbImage>>;

    /// Discard `count` frames. Returns false if the source ran out.
    fn skip(&mut self, count: u32) -> BackendResult<bool> {
        for _ in 0..count {
            if self.next_frame()?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True once the last frame has been delivered.
    fn is_finished(&self) -> bool {
        false
    }
}

pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> BackendResult<()>;

    fn finish(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// Enumerates cameras and displays.
pub trait VideoDeviceHost: Send {
    fn devices(&self) -> Vec<DeviceInfo>;
    fn open_camera(&mut self, index: u32, format: &VideoFormat)
        -> BackendResult<Box<dyn FrameSource>>;
    fn open_display(&mut self, index: u32, format: &VideoFormat)
        -> BackendResult<Box<dyn FrameSink>>;
}

/// A still image delivered as a single frame.
struct StillImageSource {
    frame: Option<RgbImage>,
}

impl FrameSource for StillImageSource {
    fn native_fps(&self) -> Option<f64> {
        None
    }

    fn next_frame(&mut self) -> BackendResult<Option<RgbImage>> {
        Ok(self.frame.take())
    }

    fn is_finished(&self) -> bool {
        self.frame.is_none()
    }
}

struct Y4mSource(Y4mReader<BufReader<File>>);

impl FrameSource for Y4mSource {
    fn native_fps(&self) -> Option<f64> {
        Some(self.0.fps())
    }

    fn next_frame(&mut self) -> BackendResult<Option<RgbImage>> {
        self.0.next_frame()
    }

    fn skip(&mut self, count: u32) -> BackendResult<bool> {
        self.0.skip_frames(count)
    }
}

/// Overwrites an image file with every frame written.
struct ImageFileSink {
    path: PathBuf,
}

impl FrameSink for ImageFileSink {
    fn write_frame(&mut self, frame: &RgbImage) -> BackendResult<()> {
        frame.save(&self.path)?;
        Ok(())
    }
}

struct Y4mSink(Option<Y4mWriter<BufWriter<File>>>);

impl FrameSink for Y4mSink {
    fn write_frame(&mut self, frame: &RgbImage) -> BackendResult<()> {
        match self.0.as_mut() {
            Some(writer) => writer.write_frame(frame),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> BackendResult<()> {
        if let Some(writer) = self.0.take() {
            writer.finish()?;
        }
        Ok(())
    }
}

fn is_y4m(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("y4m"))
}

/// Video files and devices supplied by a [`VideoDeviceHost`].
pub struct VideoBackend<H: VideoDeviceHost> {
    host: H,
    format: Option<VideoFormat>,
    input: Option<(Box<dyn FrameSource>, FrameRateMatcher)>,
    output: Option<Box<dyn FrameSink>>,
}

impl<H: VideoDeviceHost> VideoBackend<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            format: None,
            input: None,
            output: None,
        }
    }

    /// Frame-rate ratio of the open input stream, if any.
    pub fn frame_ratio(&self) -> Option<f64> {
        self.input.as_ref().map(|(_, m)| m.ratio())
    }

    fn device_index(&self, target: &StreamTarget, mode: StreamMode) -> BackendResult<u32> {
        match target {
            StreamTarget::Device(index) => Ok(*index),
            _ => self
                .default_device(mode)
                .ok_or(BackendError::NoSuchDevice(DEVICE_DEFAULT)),
        }
    }

    fn open_source(
        &mut self,
        target: &StreamTarget,
        format: &VideoFormat,
    ) -> BackendResult<Box<dyn FrameSource>> {
        match target {
            StreamTarget::File(path) if is_y4m(path) => {
                let reader = Y4mReader::new(BufReader::new(File::open(path)?))?;
                tracing::info!(
                    "Input file {:?}: {}x{} at {} fps",
                    path,
                    reader.width(),
                    reader.height(),
                    reader.fps()
                );
                Ok(Box::new(Y4mSource(reader)))
            }
            StreamTarget::File(path) => {
                let frame = image::open(path)?.to_rgb8();
                tracing::info!(
                    "Input image {:?}: {}x{}",
                    path,
                    frame.width(),
                    frame.height()
                );
                Ok(Box::new(StillImageSource { frame: Some(frame) }))
            }
            _ => {
                let index = self.device_index(target, StreamMode::Input)?;
                self.host.open_camera(index, format)
            }
        }
    }

    fn open_sink(
        &mut self,
        target: &StreamTarget,
        format: &VideoFormat,
    ) -> BackendResult<Box<dyn FrameSink>> {
        match target {
            StreamTarget::File(path) if is_y4m(path) => {
                let writer = Y4mWriter::new(
                    BufWriter::new(File::create(path)?),
                    format.width,
                    format.height,
                    format.rate,
                )?;
                Ok(Box::new(Y4mSink(Some(writer))))
            }
            StreamTarget::File(path) => Ok(Box::new(ImageFileSink { path: path.clone() })),
            _ => {
                let index = self.device_index(target, StreamMode::Output)?;
                self.host.open_display(index, format)
            }
        }
    }
}

impl<H: VideoDeviceHost> StreamBackend for VideoBackend<H> {
    fn extensions(&self, _mode: StreamMode) -> &'static [&'static str] {
        VIDEO_EXTENSIONS
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.host.devices()
    }

    fn accepts(&self, format: &StreamFormat) -> bool {
        matches!(format, StreamFormat::Video(_))
    }

    fn open(&mut self, session: &StreamSession) -> BackendResult<()> {
        let Some(StreamFormat::Video(format)) = session.format else {
            return Err(BackendError::UnsupportedFormat(
                "video stream is not configured".to_string(),
            ));
        };
        self.close();

        match session.mode {
            StreamMode::Input => {
                let source = self.open_source(&session.target, &format)?;
                let native = source.native_fps().unwrap_or(format.rate as f64);
                let matcher = FrameRateMatcher::new(native, format.rate as f64);
                if matcher.ratio() > 1.0 {
                    tracing::info!(
                        "Source runs at {} fps, target {} fps: frame ratio {:.3}",
                        native,
                        format.rate,
                        matcher.ratio()
                    );
                }
                self.input = Some((source, matcher));
            }
            StreamMode::Output => {
                self.output = Some(self.open_sink(&session.target, &format)?);
            }
            StreamMode::None => {
                return Err(BackendError::UnsupportedFormat(
                    "stream mode not selected".to_string(),
                ))
            }
        }
        self.format = Some(format);
        Ok(())
    }

    fn read(&mut self, size: usize) -> BackendResult<ReadBlock> {
        let (Some((source, matcher)), Some(format)) = (self.input.as_mut(), self.format) else {
            return Ok(ReadBlock::default());
        };
        let Some(space) = format.color_space() else {
            return Err(BackendError::UnsupportedFormat(format!(
                "color code {}",
                format.color
            )));
        };

        let Some(frame) = source.next_frame()? else {
            tracing::debug!("End of video stream");
            return Ok(ReadBlock {
                data: Vec::new(),
                eos: true,
            });
        };
        let dropped = matcher.frames_to_drop();
        if dropped > 0 {
            tracing::trace!("Dropping {} source frame(s)", dropped);
            source.skip(dropped)?;
        }

        let frame = fit_frame(frame, format.width, format.height);
        let mut data = color::encode(&frame, space);
        if size > 0 {
            data.resize(size, 0);
        }
        Ok(ReadBlock {
            data,
            eos: source.is_finished(),
        })
    }

    fn write(&mut self, data: &[u8]) -> BackendResult<()> {
        let (Some(sink), Some(format)) = (self.output.as_mut(), self.format) else {
            return Ok(());
        };
        let space = format
            .color_space()
            .ok_or_else(|| BackendError::UnsupportedFormat(format!("color code {}", format.color)))?;
        let frame = color::decode(data, format.width, format.height, space).ok_or_else(|| {
            BackendError::UnsupportedFormat(format!(
                "frame of {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                format.frame_size(),
                format.width,
                format.height,
                space
            ))
        })?;
        sink.write_frame(&frame)
    }

    fn close(&mut self) {
        self.input = None;
        if let Some(mut sink) = self.output.take() {
            if let Err(e) = sink.finish() {
                tracing::error!("Failed to finish video output: {}", e);
            }
        }
        self.format = None;
    }
}
