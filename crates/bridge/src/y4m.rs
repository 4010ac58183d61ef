// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Minimal YUV4MPEG2 container reader/writer (4:2:0 and mono only).

use crate::color;
use crate::error::{BackendError, BackendResult};
use crate::protocol::{ColorSpace, MAX_FRAME_DIMENSION};
use image::{Rgb, RgbImage};
use std::io::{BufRead, Read, Write};

const MAGIC: &str = "YUV4MPEG2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chroma {
    C420,
    Mono,
}

#[derive(Debug)]
pub struct Y4mReader<R> {
    inner: R,
    width: u32,
    height: u32,
    fps: f64,
    chroma: Chroma,
}

fn parse_rate(token: &str) -> Option<f64> {
    let (num, den) = token.split_once(':')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    (den > 0.0).then_some(num / den)
}

impl<R: BufRead> Y4mReader<R> {
    pub fn new(mut inner: R) -> BackendResult<Self> {
        let mut header = String::new();
        inner.read_line(&mut header)?;
        let mut tokens = header.split_ascii_whitespace();
        if tokens.next() != Some(MAGIC) {
            return Err(BackendError::Container("missing YUV4MPEG2 signature".into()));
        }

        let (mut width, mut height, mut fps, mut chroma) = (0, 0, 25.0, Chroma::C420);
        for token in tokens {
            let mut chars = token.chars();
            let tag = chars.next();
            let value = chars.as_str();
            match tag {
                Some('W') => width = value.parse().unwrap_or(0),
                Some('H') => height = value.parse().unwrap_or(0),
                Some('F') => fps = parse_rate(value).unwrap_or(fps),
                Some('C') if value.starts_with("420") => chroma = Chroma::C420,
                Some('C') if value == "mono" => chroma = Chroma::Mono,
                Some('C') => {
                    return Err(BackendError::Container(format!(
                        "unsupported chroma '{}'",
                        value
                    )))
                }
                _ => {}
            }
        }
        if width == 0 || height == 0 {
            return Err(BackendError::Container("missing frame geometry".into()));
        }
        if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
            return Err(BackendError::Container(format!(
                "frame geometry {}x{} exceeds {} pixels per side",
                width, height, MAX_FRAME_DIMENSION
            )));
        }

        Ok(Self {
            inner,
            width,
            height,
            fps,
            chroma,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_len(&self) -> usize {
        match self.chroma {
            Chroma::C420 => ColorSpace::Yuv420
                .frame_size(self.width, self.height)
                .unwrap_or(0),
            Chroma::Mono => self.width as usize * self.height as usize,
        }
    }

    /// Next frame, or `None` at end of stream.
    pub fn next_frame(&mut self) -> BackendResult<Option<RgbImage>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.starts_with("FRAME") {
            return Err(BackendError::Container("expected FRAME marker".into()));
        }
        let mut data = vec![0u8; self.frame_len()];
        match self.inner.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let frame = match self.chroma {
            Chroma::C420 => color::decode(&data, self.width, self.height, ColorSpace::Yuv420),
            Chroma::Mono => color::decode(&data, self.width, self.height, ColorSpace::Grayscale8)
                .map(|gray| {
                    RgbImage::from_fn(self.width, self.height, |x, y| {
                        let [l, _, _] = gray.get_pixel(x, y).0;
                        let v = ((l as i32 - 16) * 255 / 219).clamp(0, 255) as u8;
                        Rgb([v, v, v])
                    })
                }),
        };
        frame
            .map(Some)
            .ok_or_else(|| BackendError::Container("frame size mismatch".into()))
    }

    /// Skip `count` frames without decoding them. Returns false on end of stream.
    pub fn skip_frames(&mut self, count: u32) -> BackendResult<bool> {
        let len = self.frame_len() as u64;
        for _ in 0..count {
            let mut line = String::new();
            if self.inner.read_line(&mut line)? == 0 {
                return Ok(false);
            }
            let skipped = std::io::copy(&mut (&mut self.inner).take(len), &mut std::io::sink())?;
            if skipped < len {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug)]
pub struct Y4mWriter<W: Write> {
    inner: W,
    width: u32,
    height: u32,
}

impl<W: Write> Y4mWriter<W> {
    pub fn new(mut inner: W, width: u32, height: u32, fps: u32) -> BackendResult<Self> {
        writeln!(
            inner,
            "{} W{} H{} F{}:1 Ip A1:1 C420jpeg",
            MAGIC, width, height, fps
        )?;
        Ok(Self {
            inner,
            width,
            height,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> BackendResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(BackendError::UnsupportedFormat(format!(
                "frame {}x{} does not match stream {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        self.inner.write_all(b"FRAME\n")?;
        self.inner
            .write_all(&color::encode(frame, ColorSpace::Yuv420))?;
        Ok(())
    }

    pub fn finish(mut self) -> BackendResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
