// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};
use labwired_bridge::color;
use labwired_bridge::frame::fit_frame;
use labwired_bridge::ColorSpace;

fn camera_frame() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn bench_encode(c: &mut Criterion) {
    let frame = camera_frame();
    for space in ColorSpace::ALL {
        c.bench_function(&format!("encode_640x480_{:?}", space), |b| {
            b.iter(|| color::encode(black_box(&frame), space))
        });
    }
}

fn bench_decode(c: &mut Criterion) {
    let frame = camera_frame();
    let nv12 = color::encode(&frame, ColorSpace::Nv12);
    c.bench_function("decode_640x480_Nv12", |b| {
        b.iter(|| color::decode(black_box(&nv12), 640, 480, ColorSpace::Nv12))
    });
}

fn bench_fit(c: &mut Criterion) {
    let frame = camera_frame();
    c.bench_function("fit_640x480_to_300x300", |b| {
        b.iter(|| fit_frame(black_box(frame.clone()), 300, 300))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_fit);
criterion_main!(benches);
