// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encoder controls.

use v4l2_enc_sys as sys;

use crate::config::EncoderSetup;

/// A raw control id/value pair as passed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub id: u32,
    pub value: i32,
}

/// H.264 entropy coder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyMode {
    Cavlc,
    Cabac,
}

/// The controls the encoder core knows how to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderControl {
    /// Emit SPS/PPS in front of every IDR frame.
    PrependSpsPps(bool),
    IFrameQp(u32),
    PFrameQp(u32),
    Entropy(EntropyMode),
    GopClosure(bool),
    GopSize(u32),
    /// H.264 I-frame period.
    IPeriod(u32),
    /// Code the next frame as a keyframe.
    ForceKeyFrame,
}

impl EncoderControl {
    pub const fn id(self) -> u32 {
        match self {
            EncoderControl::PrependSpsPps(_) => sys::V4L2_CID_MPEG_VIDEO_PREPEND_SPSPPS_TO_IDR,
            EncoderControl::IFrameQp(_) => sys::V4L2_CID_MPEG_VIDEO_H264_I_FRAME_QP,
            EncoderControl::PFrameQp(_) => sys::V4L2_CID_MPEG_VIDEO_H264_P_FRAME_QP,
            EncoderControl::Entropy(_) => sys::V4L2_CID_MPEG_VIDEO_H264_ENTROPY_MODE,
            EncoderControl::GopClosure(_) => sys::V4L2_CID_MPEG_VIDEO_GOP_CLOSURE,
            EncoderControl::GopSize(_) => sys::V4L2_CID_MPEG_VIDEO_GOP_SIZE,
            EncoderControl::IPeriod(_) => sys::V4L2_CID_MPEG_VIDEO_H264_I_PERIOD,
            EncoderControl::ForceKeyFrame => sys::V4L2_CID_MPEG_VIDEO_FORCE_KEY_FRAME,
        }
    }

    pub fn value(self) -> i32 {
        match self {
            EncoderControl::PrependSpsPps(on) | EncoderControl::GopClosure(on) => on as i32,
            EncoderControl::IFrameQp(v)
            | EncoderControl::PFrameQp(v)
            | EncoderControl::GopSize(v)
            | EncoderControl::IPeriod(v) => i32::try_from(v).unwrap_or(i32::MAX),
            EncoderControl::Entropy(EntropyMode::Cavlc) => {
                sys::V4L2_MPEG_VIDEO_H264_ENTROPY_MODE_CAVLC as i32
            }
            EncoderControl::Entropy(EntropyMode::Cabac) => {
                sys::V4L2_MPEG_VIDEO_H264_ENTROPY_MODE_CABAC as i32
            }
            EncoderControl::ForceKeyFrame => 1,
        }
    }
}

impl From<EncoderControl> for Control {
    fn from(control: EncoderControl) -> Self {
        Control {
            id: control.id(),
            value: control.value(),
        }
    }
}

/// The controls `configure` applies, in the order they are set.
///
/// A closed GOP takes its cadence from the GOP size; an open one from the
/// H.264 I-frame period.
pub fn setup_controls(setup: &EncoderSetup) -> Vec<EncoderControl> {
    let cadence = if setup.gop_closure {
        EncoderControl::GopSize(setup.gop_size)
    } else {
        EncoderControl::IPeriod(setup.gop_size)
    };
    vec![
        EncoderControl::PrependSpsPps(true),
        EncoderControl::IFrameQp(setup.qp_i),
        EncoderControl::PFrameQp(setup.qp_p),
        EncoderControl::Entropy(EntropyMode::Cabac),
        EncoderControl::GopClosure(setup.gop_closure),
        cadence,
    ]
}
