// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Conversion between RGB frames and the pixel layouts a video peripheral can
//! request. YUV variants use BT.601 studio-swing coefficients with 2x2 chroma
//! subsampling; odd dimensions round the chroma planes up.

use crate::protocol::ColorSpace;
use image::{Rgb, RgbImage};

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn luma(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

fn chroma(r: i32, g: i32, b: i32) -> (u8, u8) {
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp_u8(u), clamp_u8(v))
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    Rgb([
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    ])
}

fn gray(px: &Rgb<u8>) -> u8 {
    let [r, g, b] = px.0;
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8
}

/// Average RGB over each 2x2 block, then convert to (U, V).
fn chroma_planes(frame: &RgbImage) -> (Vec<u8>, Vec<u8>) {
    let (w, h) = frame.dimensions();
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut u_plane = Vec::with_capacity((cw * ch) as usize);
    let mut v_plane = Vec::with_capacity((cw * ch) as usize);
    for cy in 0..ch {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
            for y in (cy * 2)..((cy * 2 + 2).min(h)) {
                for x in (cx * 2)..((cx * 2 + 2).min(w)) {
                    let [pr, pg, pb] = frame.get_pixel(x, y).0;
                    r += pr as i32;
                    g += pg as i32;
                    b += pb as i32;
                    n += 1;
                }
            }
            let (u, v) = chroma(r / n, g / n, b / n);
            u_plane.push(u);
            v_plane.push(v);
        }
    }
    (u_plane, v_plane)
}

/// Encode an RGB frame into `space`.
pub fn encode(frame: &RgbImage, space: ColorSpace) -> Vec<u8> {
    let (w, h) = frame.dimensions();
    let mut out = Vec::with_capacity(space.frame_size(w, h).unwrap_or(0));
    match space {
        ColorSpace::Grayscale8 => out.extend(frame.pixels().map(gray)),
        ColorSpace::Rgb888 => out.extend_from_slice(frame.as_raw()),
        ColorSpace::Bgr565 => {
            for px in frame.pixels() {
                let [r, g, b] = px.0;
                let packed =
                    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3);
                out.extend_from_slice(&packed.to_le_bytes());
            }
        }
        ColorSpace::Yuv420 | ColorSpace::Nv12 | ColorSpace::Nv21 => {
            out.extend(
                frame
                    .pixels()
                    .map(|px| luma(px.0[0] as i32, px.0[1] as i32, px.0[2] as i32)),
            );
            let (u, v) = chroma_planes(frame);
            match space {
                ColorSpace::Yuv420 => {
                    out.extend_from_slice(&u);
                    out.extend_from_slice(&v);
                }
                ColorSpace::Nv12 => {
                    for (cu, cv) in u.iter().zip(&v) {
                        out.push(*cu);
                        out.push(*cv);
                    }
                }
                _ => {
                    for (cu, cv) in u.iter().zip(&v) {
                        out.push(*cv);
                        out.push(*cu);
                    }
                }
            }
        }
    }
    out
}

/// Decode `data` laid out in `space` back into an RGB frame.
///
/// Returns `None` when the buffer length does not match the geometry.
pub fn decode(data: &[u8], width: u32, height: u32, space: ColorSpace) -> Option<RgbImage> {
    if width == 0 || height == 0 || Some(data.len()) != space.frame_size(width, height) {
        return None;
    }
    let pixels = width as usize * height as usize;
    let index = |x: u32, y: u32| y as usize * width as usize + x as usize;
    let frame = match space {
        ColorSpace::Grayscale8 => {
            RgbImage::from_fn(width, height, |x, y| {
                let l = data[index(x, y)];
                Rgb([l, l, l])
            })
        }
        ColorSpace::Rgb888 => RgbImage::from_raw(width, height, data.to_vec())?,
        ColorSpace::Bgr565 => RgbImage::from_fn(width, height, |x, y| {
            let i = index(x, y) * 2;
            let packed = u16::from_le_bytes([data[i], data[i + 1]]);
            let r = ((packed >> 11) & 0x1F) as u8;
            let g = ((packed >> 5) & 0x3F) as u8;
            let b = (packed & 0x1F) as u8;
            Rgb([(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)])
        }),
        ColorSpace::Yuv420 | ColorSpace::Nv12 | ColorSpace::Nv21 => {
            let cw = width.div_ceil(2) as usize;
            let chroma_len = cw * height.div_ceil(2) as usize;
            let (luma_plane, rest) = data.split_at(pixels);
            RgbImage::from_fn(width, height, |x, y| {
                let l = luma_plane[index(x, y)];
                let c = (y as usize / 2) * cw + x as usize / 2;
                let (u, v) = match space {
                    ColorSpace::Yuv420 => (rest[c], rest[chroma_len + c]),
                    ColorSpace::Nv12 => (rest[2 * c], rest[2 * c + 1]),
                    _ => (rest[2 * c + 1], rest[2 * c]),
                };
                yuv_to_rgb(l, u, v)
            })
        }
    };
    Some(frame)
}
