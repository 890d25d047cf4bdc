// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Queue, pixel-format and geometry types shared by the transport and the session.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use v4l2_enc_sys as sys;

use crate::{Error, Result};

/// A V4L2 four-character pixel format code.
///
/// Serializes as its four-character string, e.g. `"NV12"`. Parsing also
/// accepts the kernel's symbolic names for the formats in [`FourCc::NAMED`],
/// so `"NV12M"` and `"NM12"` are the same format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCc(u32);

impl FourCc {
    /// Semi-planar 4:2:0, luma and chroma in one memory plane.
    pub const NV12: FourCc = FourCc::from_bytes(*b"NV12");
    /// Semi-planar 4:2:0, luma and chroma in separate memory planes.
    pub const NV12M: FourCc = FourCc::from_bytes(*b"NM12");
    /// Planar 4:2:0 (I420) in one memory plane.
    pub const YUV420: FourCc = FourCc::from_bytes(*b"YU12");
    /// Planar 4:2:0 (I420) with one memory plane per component.
    pub const YUV420M: FourCc = FourCc::from_bytes(*b"YM12");
    /// H.264 Annex-B elementary stream.
    pub const H264: FourCc = FourCc::from_bytes(*b"H264");

    /// Symbolic names accepted in place of the four-character code.
    pub const NAMED: [(&'static str, FourCc); 5] = [
        ("NV12", FourCc::NV12),
        ("NV12M", FourCc::NV12M),
        ("YUV420", FourCc::YUV420),
        ("YUV420M", FourCc::YUV420M),
        ("H264", FourCc::H264),
    ];

    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

impl FromStr for FourCc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((_, fourcc)) = Self::NAMED.iter().find(|(name, _)| *name == s) {
            return Ok(*fourcc);
        }
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidArgument(format!("'{s}' is not a four-character code")))?;
        if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(Error::InvalidArgument(format!(
                "'{s}' contains non-printable characters"
            )));
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl TryFrom<String> for FourCc {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FourCc> for String {
    fn from(value: FourCc) -> Self {
        value.to_string()
    }
}

/// Which of the encoder's two queues a buffer or format belongs to.
///
/// On a memory-to-memory encoder the raw [`Direction::Input`] queue is the
/// kernel's OUTPUT buffer type and the coded [`Direction::Output`] queue is its
/// CAPTURE buffer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Raw frames fed to the encoder.
    Input,
    /// Coded frames produced by the encoder.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Whether the device exposes single-planar or multi-planar buffer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferShape {
    SinglePlanar,
    MultiPlanar,
}

/// A queue as addressed by the kernel: direction plus buffer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueType {
    pub direction: Direction,
    pub shape: BufferShape,
}

impl QueueType {
    pub const fn new(direction: Direction, shape: BufferShape) -> Self {
        Self { direction, shape }
    }

    /// The `enum v4l2_buf_type` value for this queue.
    pub const fn buf_type(self) -> u32 {
        match (self.direction, self.shape) {
            (Direction::Input, BufferShape::SinglePlanar) => sys::V4L2_BUF_TYPE_VIDEO_OUTPUT,
            (Direction::Input, BufferShape::MultiPlanar) => sys::V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE,
            (Direction::Output, BufferShape::SinglePlanar) => sys::V4L2_BUF_TYPE_VIDEO_CAPTURE,
            (Direction::Output, BufferShape::MultiPlanar) => {
                sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE
            }
        }
    }

    pub const fn is_multiplanar(self) -> bool {
        matches!(self.shape, BufferShape::MultiPlanar)
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            BufferShape::SinglePlanar => write!(f, "{}", self.direction),
            BufferShape::MultiPlanar => write!(f, "{} (mplane)", self.direction),
        }
    }
}

/// How buffer memory is shared between the process and the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Device memory mapped into the process.
    Mmap,
    /// Memory supplied by the process per submission.
    UserPtr,
    /// Memory imported from DMA-BUF file descriptors.
    DmaBuf,
}

impl MemoryKind {
    pub const fn to_raw(self) -> u32 {
        match self {
            MemoryKind::Mmap => sys::V4L2_MEMORY_MMAP,
            MemoryKind::UserPtr => sys::V4L2_MEMORY_USERPTR,
            MemoryKind::DmaBuf => sys::V4L2_MEMORY_DMABUF,
        }
    }
}

/// Layout of one memory plane as negotiated with the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneFormat {
    pub bytes_per_line: u32,
    pub size_image: u32,
}

/// A negotiated (or requested) format for one queue.
///
/// `planes` lists the memory planes. An empty list in a request lets the device
/// choose the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub width: u32,
    pub height: u32,
    pub pixel_format: FourCc,
    pub planes: Vec<PlaneFormat>,
}

impl Format {
    pub fn new(width: u32, height: u32, pixel_format: FourCc) -> Self {
        Self {
            width,
            height,
            pixel_format,
            planes: Vec::new(),
        }
    }

    /// Adds a memory plane with the given stride and size.
    pub fn with_plane(mut self, bytes_per_line: u32, size_image: u32) -> Self {
        self.planes.push(PlaneFormat {
            bytes_per_line,
            size_image,
        });
        self
    }

    pub fn planes_count(&self) -> usize {
        self.planes.len()
    }

    /// Line stride of the first plane, or the width when the device did not report one.
    pub fn stride(&self) -> u32 {
        self.planes
            .first()
            .map(|p| p.bytes_per_line)
            .filter(|s| *s > 0)
            .unwrap_or(self.width)
    }

    pub fn same_size(&self, other: &Format) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// A rectangle in pixel units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }
}

/// A rational number, used for frame intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Selection rectangle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    Crop,
    CropDefault,
    CropBounds,
}

impl SelectionTarget {
    pub const fn to_raw(self) -> u32 {
        match self {
            SelectionTarget::Crop => sys::V4L2_SEL_TGT_CROP,
            SelectionTarget::CropDefault => sys::V4L2_SEL_TGT_CROP_DEFAULT,
            SelectionTarget::CropBounds => sys::V4L2_SEL_TGT_CROP_BOUNDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_parses_and_prints() {
        let fourcc: FourCc = "NV12".parse().unwrap();
        assert_eq!(fourcc, FourCc::NV12);
        assert_eq!(FourCc::H264.to_string(), "H264");
        assert!("NV1".parse::<FourCc>().is_err());
        assert!("NV123".parse::<FourCc>().is_err());
    }

    #[test]
    fn symbolic_names_resolve_to_codes() {
        assert_eq!("NV12M".parse::<FourCc>().unwrap(), FourCc::NV12M);
        assert_eq!("NM12".parse::<FourCc>().unwrap(), FourCc::NV12M);
        assert_eq!("YUV420M".parse::<FourCc>().unwrap().to_string(), "YM12");
        assert_eq!("YUV420".parse::<FourCc>().unwrap(), FourCc::YUV420);
        assert!("NV12X".parse::<FourCc>().is_err());
    }

    #[test]
    fn fourcc_matches_kernel_byte_order() {
        assert_eq!(FourCc::NV12.code(), 0x3231_564e);
        assert_eq!(FourCc::H264.code(), 0x3436_3248);
    }

    #[test]
    fn queue_types_map_to_kernel_buffer_types() {
        let raw = QueueType::new(Direction::Input, BufferShape::MultiPlanar);
        let coded = QueueType::new(Direction::Output, BufferShape::SinglePlanar);
        assert_eq!(raw.buf_type(), sys::V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE);
        assert_eq!(coded.buf_type(), sys::V4L2_BUF_TYPE_VIDEO_CAPTURE);
        assert!(raw.is_multiplanar());
        assert!(!coded.is_multiplanar());
    }
}
