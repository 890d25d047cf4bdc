// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII ownership of a mapped buffer plane.

use std::{num::NonZeroUsize, os::fd::BorrowedFd, ptr::NonNull};

use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};
use tracing::error;

use crate::{Error, Result, device::ioctl::errno_error, transport::PlaneMemory};

/// A device buffer plane mapped read-write and shared into the process.
///
/// The region is unmapped when dropped. It stays valid after the device node
/// is closed, but its contents are only meaningful while the buffer exists.
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The region is plain memory owned by this value.
unsafe impl Send for MmapRegion {}

impl MmapRegion {
    /// Maps `len` bytes of `fd` at the driver-provided `offset` cookie.
    pub(crate) fn map(fd: BorrowedFd<'_>, offset: u32, len: u32) -> Result<Self> {
        let len = NonZeroUsize::new(len as usize)
            .ok_or_else(|| Error::InvalidArgument("cannot map an empty plane".into()))?;
        // SAFETY: a fresh shared mapping; no existing memory is aliased.
        let addr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        }
        .map_err(|errno| errno_error("mmap", errno))?;
        Ok(Self {
            ptr: addr.cast(),
            len: len.get(),
        })
    }
}

impl PlaneMemory for MmapRegion {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live mapping owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: unmaps exactly the region mapped in `map`.
        if let Err(errno) = unsafe { munmap(self.ptr.cast(), self.len) } {
            error!(len = self.len, %errno, "Failed to unmap buffer plane");
        }
    }
}
