// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Relative tolerance under which two aspect ratios count as equal.
pub const ASPECT_RTOL: f64 = 1e-3;

/// Skips source frames when the source runs faster than the requested rate.
///
/// The fractional remainder is carried across reads so the long-run delivered
/// rate converges on the target instead of rounding on every frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct FrameRateMatcher {
    ratio: f64,
    drop: f64,
}

impl FrameRateMatcher {
    pub fn new(native_fps: f64, target_fps: f64) -> Self {
        let ratio = if target_fps > 0.0 && native_fps > target_fps {
            native_fps / target_fps
        } else {
            1.0
        };
        Self { ratio, drop: 0.0 }
    }

    /// A matcher that never drops anything.
    pub fn passthrough() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Number of whole frames to discard before delivering the next one.
    pub fn frames_to_drop(&mut self) -> u32 {
        self.drop += self.ratio - 1.0;
        if self.drop > 1.0 {
            let whole = self.drop.floor();
            self.drop -= whole;
            whole as u32
        } else {
            0
        }
    }
}

impl Default for FrameRateMatcher {
    fn default() -> Self {
        Self::passthrough()
    }
}

fn aspect_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= ASPECT_RTOL * b.abs()
}

/// Crop the longer dimension around the center so the frame matches the
/// `width`/`height` aspect ratio. Frames already within tolerance are returned
/// untouched.
pub fn crop_to_aspect(frame: RgbImage, width: u32, height: u32) -> RgbImage {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 || width == 0 || height == 0 {
        return frame;
    }
    let target = width as f64 / height as f64;
    let source = w as f64 / h as f64;
    if aspect_close(source, target) {
        return frame;
    }
    let (crop_w, crop_h) = if source > target {
        (((h as f64 * target).round() as u32).clamp(1, w), h)
    } else {
        (w, ((w as f64 / target).round() as u32).clamp(1, h))
    };
    let x = (w - crop_w) / 2;
    let y = (h - crop_h) / 2;
    imageops::crop_imm(&frame, x, y, crop_w, crop_h).to_image()
}

/// Bring a source frame to the exact target geometry: crop, then resize.
pub fn fit_frame(frame: RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        return frame;
    }
    let cropped = crop_to_aspect(frame, width, height);
    if cropped.dimensions() == (width, height) {
        return cropped;
    }
    imageops::resize(&cropped, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    #[test]
    fn test_no_drop_when_source_is_slower() {
        let mut m = FrameRateMatcher::new(15.0, 30.0);
        assert_eq!(m.ratio(), 1.0);
        assert!((0..10).all(|_| m.frames_to_drop() == 0));
    }

    #[test]
    fn test_60_to_24_drops_one_and_a_half_on_average() {
        let mut m = FrameRateMatcher::new(60.0, 24.0);
        let drops: Vec<u32> = (0..4).map(|_| m.frames_to_drop()).collect();
        assert_eq!(drops, vec![1, 2, 1, 2]);
        let total: u32 = (0..1000).map(|_| m.frames_to_drop()).sum();
        assert_eq!(total, 1500);
    }

    proptest! {
        #[test]
        fn test_two_consecutive_reads_drop_two_or_three(warmup in 0usize..200) {
            let mut m = FrameRateMatcher::new(60.0, 24.0);
            for _ in 0..warmup {
                m.frames_to_drop();
            }
            let pair = m.frames_to_drop() + m.frames_to_drop();
            prop_assert!((2..=3).contains(&pair));
        }

        #[test]
        fn test_long_run_drop_rate_tracks_ratio(native in 1u32..240, target in 1u32..120) {
            let mut m = FrameRateMatcher::new(native as f64, target as f64);
            let reads = 600u32;
            let dropped: u32 = (0..reads).map(|_| m.frames_to_drop()).sum();
            let expected = (m.ratio() - 1.0) * reads as f64;
            prop_assert!((dropped as f64 - expected).abs() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_crop_wide_frame_keeps_center() {
        let mut frame = RgbImage::new(400, 100);
        frame.put_pixel(200, 50, Rgb([255, 0, 0]));
        let cropped = crop_to_aspect(frame, 100, 100);
        assert_eq!(cropped.dimensions(), (100, 100));
        assert_eq!(cropped.get_pixel(50, 50).0, [255, 0, 0]);
    }

    #[test]
    fn test_crop_tall_frame() {
        let cropped = crop_to_aspect(RgbImage::new(90, 320), 16, 9);
        assert_eq!(cropped.dimensions(), (90, 51));
    }

    #[test]
    fn test_crop_within_tolerance_is_noop() {
        let cropped = crop_to_aspect(RgbImage::new(1001, 1000), 300, 300);
        assert_eq!(cropped.dimensions(), (1001, 1000));
    }

    #[test]
    fn test_fit_frame_reaches_target_geometry() {
        let fitted = fit_frame(RgbImage::new(640, 480), 300, 300);
        assert_eq!(fitted.dimensions(), (300, 300));
        let same = fit_frame(RgbImage::new(32, 16), 32, 16);
        assert_eq!(same.dimensions(), (32, 16));
    }
}
