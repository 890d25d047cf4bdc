// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Views of the raw frame being produced and the coded frame being returned.

use crate::{
    Error,
    format::{Format, FourCc},
    transport::BufferFlags,
};

/// Write access to the raw input slot selected for the current iteration.
///
/// Only valid inside the callback passed to [`crate::EncoderSession::run_once`];
/// the device may start reading the slot as soon as the callback returns.
pub struct RawFrame<'a> {
    planes: Vec<&'a mut [u8]>,
    format: &'a Format,
    frame_number: u64,
    slot: u32,
}

impl<'a> RawFrame<'a> {
    pub(crate) fn new(
        planes: Vec<&'a mut [u8]>,
        format: &'a Format,
        frame_number: u64,
        slot: u32,
    ) -> Self {
        Self {
            planes,
            format,
            frame_number,
            slot,
        }
    }

    /// The frame counter value this frame will be stamped with.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// The negotiated raw format, including per-plane strides.
    pub fn format(&self) -> &Format {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn pixel_format(&self) -> FourCc {
        self.format.pixel_format
    }

    /// Number of memory planes.
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<&mut [u8]> {
        self.planes.get_mut(plane).map(|p| &mut **p)
    }

    /// All memory planes at once, for layouts that write several together.
    pub fn planes_mut(&mut self) -> &mut [&'a mut [u8]] {
        &mut self.planes
    }

    /// Line stride of memory plane `plane`, falling back to the frame width.
    pub fn bytes_per_line(&self, plane: usize) -> u32 {
        self.format
            .planes
            .get(plane)
            .map(|p| p.bytes_per_line)
            .filter(|s| *s > 0)
            .unwrap_or(self.format.width)
    }
}

/// Picture type of a coded frame, from the buffer flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Key,
    Predicted,
    Bidirectional,
    Unknown,
}

impl FrameKind {
    pub fn from_flags(flags: BufferFlags) -> Self {
        if flags.is_keyframe() {
            FrameKind::Key
        } else if flags.contains(BufferFlags::PFRAME) {
            FrameKind::Predicted
        } else if flags.contains(BufferFlags::BFRAME) {
            FrameKind::Bidirectional
        } else {
            FrameKind::Unknown
        }
    }

    pub fn is_key(self) -> bool {
        self == FrameKind::Key
    }
}

/// A coded frame, borrowing the output slot's memory until the next call on the session.
#[derive(Debug, Clone, Copy)]
pub struct EncodedFrame<'a> {
    /// Frame number recovered from the coded buffer's timestamp.
    pub frame_number: u64,
    /// Output slot the frame was coded into.
    pub slot: u32,
    pub sequence: u32,
    pub kind: FrameKind,
    pub errored: bool,
    /// Coded bytes; empty for an errored frame.
    pub payload: &'a [u8],
}

impl EncodedFrame<'_> {
    pub fn is_keyframe(&self) -> bool {
        self.kind.is_key()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns [`Error::EncodeFrame`] if the device flagged this frame.
    pub fn error(&self) -> Option<Error> {
        self.errored.then_some(Error::EncodeFrame {
            frame: self.frame_number,
        })
    }

    pub fn into_owned(self) -> OwnedEncodedFrame {
        OwnedEncodedFrame::from(self)
    }
}

/// An [`EncodedFrame`] with its payload copied out of the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedEncodedFrame {
    pub frame_number: u64,
    pub slot: u32,
    pub sequence: u32,
    pub kind: FrameKind,
    pub errored: bool,
    pub payload: Vec<u8>,
}

impl From<EncodedFrame<'_>> for OwnedEncodedFrame {
    fn from(frame: EncodedFrame<'_>) -> Self {
        Self {
            frame_number: frame.frame_number,
            slot: frame.slot,
            sequence: frame.sequence,
            kind: frame.kind,
            errored: frame.errored,
            payload: frame.payload.to_vec(),
        }
    }
}

impl OwnedEncodedFrame {
    pub fn is_keyframe(&self) -> bool {
        self.kind.is_key()
    }
}
