// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Moving colour-bar test pattern.
//!
//! Eight vertical bars with a 50-line band that inverts every colour and
//! slides down two lines per frame.

use v4l2_enc::{FourCc, RawFrame};

/// Raw formats the pattern can be rendered into.
pub const SUPPORTED_FORMATS: [FourCc; 4] =
    [FourCc::NV12, FourCc::NV12M, FourCc::YUV420, FourCc::YUV420M];

const BOX_HEIGHT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Yuv {
    y: u8,
    u: u8,
    v: u8,
}

impl Yuv {
    const fn new(y: u8, u: u8, v: u8) -> Self {
        Self { y, u, v }
    }

    fn inverted(self) -> Self {
        Self::new(255 - self.y, 255 - self.u, 255 - self.v)
    }
}

const BARS: [Yuv; 8] = [
    Yuv::new(104, 128, 128), // 40% grey
    Yuv::new(180, 128, 128), // white
    Yuv::new(168, 44, 136),  // cyan
    Yuv::new(133, 63, 52),   // green
    Yuv::new(63, 193, 204),  // magenta
    Yuv::new(51, 109, 212),  // red
    Yuv::new(28, 212, 120),  // blue
    Yuv::new(16, 128, 128),  // black
];

struct Geometry {
    width: usize,
    height: usize,
    bar_width: usize,
    box_rows: std::ops::Range<usize>,
}

impl Geometry {
    fn new(width: u32, height: u32, step: u32) -> Self {
        let travel = height.saturating_sub(BOX_HEIGHT).max(1);
        let box_y = (step.wrapping_mul(2) % travel) as usize;
        Self {
            width: width as usize,
            height: height as usize,
            bar_width: (width as usize / BARS.len()).max(1),
            box_rows: box_y..box_y + BOX_HEIGHT as usize,
        }
    }

    fn color(&self, x: usize, y: usize) -> Yuv {
        let bar = BARS[(x / self.bar_width).min(BARS.len() - 1)];
        if self.box_rows.contains(&y) {
            bar.inverted()
        } else {
            bar
        }
    }

    fn chroma_width(&self) -> usize {
        self.width.div_ceil(2)
    }

    fn chroma_height(&self) -> usize {
        self.height.div_ceil(2)
    }
}

/// Renders pattern step `step` into `frame`.
///
/// Does nothing for a pixel format outside [`SUPPORTED_FORMATS`]. Planes that
/// are shorter than the negotiated layout are filled as far as they go.
pub fn fill(frame: &mut RawFrame<'_>, step: u32) {
    let strides = [
        frame.bytes_per_line(0) as usize,
        frame.bytes_per_line(1) as usize,
        frame.bytes_per_line(2) as usize,
    ];
    let (width, height, pixel_format) = (frame.width(), frame.height(), frame.pixel_format());
    fill_planes(
        pixel_format,
        &Geometry::new(width, height, step),
        strides,
        frame.planes_mut(),
    );
}

fn fill_planes(
    pixel_format: FourCc,
    geometry: &Geometry,
    strides: [usize; 3],
    planes: &mut [&mut [u8]],
) {
    let luma_stride = strides[0].max(geometry.width);
    match (pixel_format, planes) {
        (FourCc::NV12, [plane, ..]) => {
            let (luma, chroma) = split(plane, luma_stride * geometry.height);
            fill_luma(luma, luma_stride, geometry);
            fill_interleaved_chroma(chroma, luma_stride, geometry);
        }
        (FourCc::NV12M, [luma, chroma, ..]) => {
            fill_luma(luma, luma_stride, geometry);
            fill_interleaved_chroma(chroma, strides[1], geometry);
        }
        (FourCc::YUV420, [plane, ..]) => {
            let chroma_stride = luma_stride / 2;
            let chroma_len = chroma_stride * geometry.chroma_height();
            let (luma, rest) = split(plane, luma_stride * geometry.height);
            let (u, v) = split(rest, chroma_len);
            fill_luma(luma, luma_stride, geometry);
            fill_planar_chroma(u, chroma_stride, geometry, |c| c.u);
            fill_planar_chroma(v, chroma_stride, geometry, |c| c.v);
        }
        (FourCc::YUV420M, [luma, u, v, ..]) => {
            fill_luma(luma, luma_stride, geometry);
            fill_planar_chroma(u, strides[1], geometry, |c| c.u);
            fill_planar_chroma(v, strides[2], geometry, |c| c.v);
        }
        _ => {}
    }
}

fn split(plane: &mut [u8], at: usize) -> (&mut [u8], &mut [u8]) {
    let at = at.min(plane.len());
    plane.split_at_mut(at)
}

fn fill_luma(plane: &mut [u8], stride: usize, geometry: &Geometry) {
    for (y, row) in plane
        .chunks_mut(stride.max(1))
        .take(geometry.height)
        .enumerate()
    {
        for (x, pixel) in row.iter_mut().take(geometry.width).enumerate() {
            *pixel = geometry.color(x, y).y;
        }
    }
}

fn fill_interleaved_chroma(plane: &mut [u8], stride: usize, geometry: &Geometry) {
    for (cy, row) in plane
        .chunks_mut(stride.max(2))
        .take(geometry.chroma_height())
        .enumerate()
    {
        for (cx, pair) in row
            .chunks_exact_mut(2)
            .take(geometry.chroma_width())
            .enumerate()
        {
            let color = geometry.color(cx * 2, cy * 2);
            pair[0] = color.u;
            pair[1] = color.v;
        }
    }
}

fn fill_planar_chroma(
    plane: &mut [u8],
    stride: usize,
    geometry: &Geometry,
    component: impl Fn(Yuv) -> u8,
) {
    for (cy, row) in plane
        .chunks_mut(stride.max(1))
        .take(geometry.chroma_height())
        .enumerate()
    {
        for (cx, sample) in row.iter_mut().take(geometry.chroma_width()).enumerate() {
            *sample = component(geometry.color(cx * 2, cy * 2));
        }
    }
}
