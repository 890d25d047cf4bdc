// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The coded bitstream sink.
//!
//! Coded frames are appended as a raw Annex-B elementary stream with no framing
//! of their own. Frame boundaries can be recovered afterwards by scanning for
//! NAL unit start codes with [`nal_units`].

use std::{fmt, io::Write};

use tracing::trace;

use crate::{Result, frame::EncodedFrame};

/// Appends coded payloads to a writer in submission order.
pub struct BitstreamWriter<W: Write> {
    inner: W,
    frames: u64,
    bytes: u64,
    skipped: u64,
}

impl<W: Write> BitstreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            frames: 0,
            bytes: 0,
            skipped: 0,
        }
    }

    /// Appends one coded frame.
    ///
    /// Errored and empty frames write nothing and count as skipped.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub fn write_frame(&mut self, frame: &EncodedFrame<'_>) -> Result<usize> {
        if frame.errored || frame.payload.is_empty() {
            self.skipped += 1;
            trace!(frame = frame.frame_number, "Skipping frame without payload");
            return Ok(0);
        }
        self.inner.write_all(frame.payload)?;
        self.frames += 1;
        self.bytes += frame.payload.len() as u64;
        Ok(frame.payload.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// H.264 NAL unit types (ITU-T H.264 table 7-1) seen in encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    NonIdrSlice,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    Filler,
    Other(u8),
}

impl NalUnitType {
    /// Classifies a NAL unit from its header byte.
    pub fn from_header(header: u8) -> Self {
        match header & 0x1f {
            1 => NalUnitType::NonIdrSlice,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::Filler,
            other => NalUnitType::Other(other),
        }
    }

    /// True for slices of a picture (which start a new coded frame).
    pub fn is_slice(self) -> bool {
        matches!(self, NalUnitType::NonIdrSlice | NalUnitType::IdrSlice)
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NalUnitType::NonIdrSlice => f.write_str("non-IDR slice"),
            NalUnitType::IdrSlice => f.write_str("IDR slice"),
            NalUnitType::Sei => f.write_str("SEI"),
            NalUnitType::Sps => f.write_str("SPS"),
            NalUnitType::Pps => f.write_str("PPS"),
            NalUnitType::AccessUnitDelimiter => f.write_str("AUD"),
            NalUnitType::EndOfSequence => f.write_str("end of sequence"),
            NalUnitType::EndOfStream => f.write_str("end of stream"),
            NalUnitType::Filler => f.write_str("filler"),
            NalUnitType::Other(t) => write!(f, "type {t}"),
        }
    }
}

/// One NAL unit of an Annex-B stream, without its start code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// Offset of the first byte after the start code.
    pub offset: usize,
    pub data: &'a [u8],
}

impl NalUnit<'_> {
    pub fn unit_type(&self) -> Option<NalUnitType> {
        self.data.first().map(|h| NalUnitType::from_header(*h))
    }
}

/// Iterator over the NAL units of an Annex-B byte stream.
pub struct NalUnits<'a> {
    stream: &'a [u8],
    pos: Option<usize>,
}

/// Splits `stream` at three- and four-byte start codes.
///
/// Bytes before the first start code are ignored. Trailing zero bytes that belong
/// to the next start code are not included in a unit.
pub fn nal_units(stream: &[u8]) -> NalUnits<'_> {
    NalUnits {
        stream,
        pos: find_start_code(stream, 0).map(|(_, payload)| payload),
    }
}

/// Returns `(start, payload)` of the first `00 00 01` at or after `from`, where
/// `start` includes one leading zero byte of a four-byte code.
fn find_start_code(stream: &[u8], from: usize) -> Option<(usize, usize)> {
    let tail = stream.get(from..)?;
    let at = tail.windows(3).position(|w| w == [0, 0, 1])? + from;
    let start = if at > from && stream[at - 1] == 0 {
        at - 1
    } else {
        at
    };
    Some((start, at + 3))
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = NalUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let begin = self.pos?;
        let (end, next) = match find_start_code(self.stream, begin) {
            Some((start, payload)) => (start, Some(payload)),
            None => (self.stream.len(), None),
        };
        self.pos = next;
        Some(NalUnit {
            offset: begin,
            data: &self.stream[begin..end],
        })
    }
}
