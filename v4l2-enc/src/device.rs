// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Linux implementations of the [`crate::Transport`] and [`crate::MediaBus`] seams.
//!
//! # Key Types
//!
//! - [`V4l2Device`]: ioctl/mmap/poll transport over an opened video node and its media root
//! - [`MmapRegion`]: one mapped buffer plane, unmapped on drop
//! - [`MediaRequest`]: one media request file descriptor, closed on drop
//! - [`SysfsMediaBus`]: enumerates `/dev/media*` and names nodes through sysfs

use std::{
    fs::OpenOptions,
    os::{fd::OwnedFd, unix::fs::OpenOptionsExt},
    path::Path,
};

use crate::{Error, Result};

pub(crate) mod ioctl;
pub mod mmap;
pub mod request;
pub mod sysfs;
pub mod v4l2;

pub use mmap::MmapRegion;
pub use request::MediaRequest;
pub use sysfs::SysfsMediaBus;
pub use v4l2::V4l2Device;

/// Opens a device node read-write, optionally non-blocking.
pub(crate) fn open_node(path: &Path, nonblocking: bool) -> Result<OwnedFd> {
    let flags = if nonblocking { libc::O_NONBLOCK } else { 0 };
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(flags | libc::O_CLOEXEC)
        .open(path)
        .map(OwnedFd::from)
        .map_err(|source| Error::OpenFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Converts a NUL-padded kernel string field.
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Converts a NUL-padded `char` array, as the media headers declare them.
pub(crate) fn c_chars(chars: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
    c_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_strings_stop_at_the_first_nul() {
        assert_eq!(c_string(b"vicodec\0\0junk"), "vicodec");
        assert_eq!(c_string(b"full"), "full");
        let chars = [b'e' as libc::c_char, b'n' as libc::c_char, 0, b'x' as libc::c_char];
        assert_eq!(c_chars(&chars), "en");
    }
}
