// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Typed ioctl entry points for the video and media-controller nodes.
//!
//! Each wrapper is generated by `nix` from the request direction, magic, number
//! and argument type.

use nix::errno::Errno;
use v4l2_enc_sys as sys;

use crate::{Error, Result};

const VIDEO_MAGIC: u8 = b'V';
const MEDIA_MAGIC: u8 = b'|';

nix::ioctl_read!(querycap, VIDEO_MAGIC, 0, sys::v4l2_capability);
nix::ioctl_readwrite!(enum_fmt, VIDEO_MAGIC, 2, sys::v4l2_fmtdesc);
nix::ioctl_readwrite!(g_fmt, VIDEO_MAGIC, 4, sys::v4l2_format);
nix::ioctl_readwrite!(s_fmt, VIDEO_MAGIC, 5, sys::v4l2_format);
nix::ioctl_readwrite!(reqbufs, VIDEO_MAGIC, 8, sys::v4l2_requestbuffers);
nix::ioctl_readwrite!(querybuf, VIDEO_MAGIC, 9, sys::v4l2_buffer);
nix::ioctl_readwrite!(qbuf, VIDEO_MAGIC, 15, sys::v4l2_buffer);
nix::ioctl_readwrite!(dqbuf, VIDEO_MAGIC, 17, sys::v4l2_buffer);
nix::ioctl_write_ptr!(streamon, VIDEO_MAGIC, 18, libc::c_int);
nix::ioctl_write_ptr!(streamoff, VIDEO_MAGIC, 19, libc::c_int);
nix::ioctl_readwrite!(s_parm, VIDEO_MAGIC, 22, sys::v4l2_streamparm);
nix::ioctl_readwrite!(s_ctrl, VIDEO_MAGIC, 28, sys::v4l2_control);
nix::ioctl_readwrite!(try_fmt, VIDEO_MAGIC, 64, sys::v4l2_format);
nix::ioctl_readwrite!(s_ext_ctrls, VIDEO_MAGIC, 72, sys::v4l2_ext_controls);
nix::ioctl_readwrite!(create_bufs, VIDEO_MAGIC, 92, sys::v4l2_create_buffers);
nix::ioctl_readwrite!(g_selection, VIDEO_MAGIC, 94, sys::v4l2_selection);
nix::ioctl_readwrite!(s_selection, VIDEO_MAGIC, 95, sys::v4l2_selection);

nix::ioctl_readwrite!(media_device_info, MEDIA_MAGIC, 0x00, sys::media_device_info);
nix::ioctl_readwrite!(media_g_topology, MEDIA_MAGIC, 0x04, sys::media_v2_topology);
nix::ioctl_read!(media_request_alloc, MEDIA_MAGIC, 0x05, libc::c_int);
nix::ioctl_none!(media_request_queue, MEDIA_MAGIC, 0x80);
nix::ioctl_none!(media_request_reinit, MEDIA_MAGIC, 0x81);

/// Runs one ioctl, restarting it on `EINTR`.
///
/// Other failures become [`Error::Transport`] tagged with `operation`.
pub(crate) fn retry(
    operation: &'static str,
    mut call: impl FnMut() -> nix::Result<libc::c_int>,
) -> Result<()> {
    loop {
        match call() {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno_error(operation, errno)),
        }
    }
}

pub(crate) fn errno_error(operation: &'static str, errno: Errno) -> Error {
    Error::from_errno(operation, errno as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_calls_are_restarted() {
        let mut attempts = 0;
        retry("VIDIOC_DQBUF", || {
            attempts += 1;
            if attempts < 3 {
                Err(Errno::EINTR)
            } else {
                Ok(0)
            }
        })
        .unwrap();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn failures_keep_the_operation_name() {
        let err = retry("VIDIOC_QBUF", || Err(Errno::EBUSY)).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                operation: "VIDIOC_QBUF",
                code: libc::EBUSY
            }
        ));
        assert!(matches!(
            errno_error("poll", Errno::ETIMEDOUT),
            Error::Timeout
        ));
    }
}
