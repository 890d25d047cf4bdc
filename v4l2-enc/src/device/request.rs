// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Media requests: atomic batches of controls bound to one buffer submission.

use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use crate::{Result, device::ioctl};

/// An allocated media request. The file descriptor is closed on drop.
#[derive(Debug)]
pub struct MediaRequest {
    fd: OwnedFd,
}

impl MediaRequest {
    /// Allocates a request on the media root `media`.
    pub(crate) fn alloc(media: BorrowedFd<'_>) -> Result<Self> {
        let mut raw: libc::c_int = -1;
        // SAFETY: MEDIA_IOC_REQUEST_ALLOC writes one int.
        ioctl::retry("MEDIA_IOC_REQUEST_ALLOC", || unsafe {
            ioctl::media_request_alloc(media.as_raw_fd(), &mut raw)
        })?;
        // SAFETY: the kernel just handed us ownership of this descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { fd })
    }

    /// Submits everything bound to the request.
    pub fn queue(&self) -> Result<()> {
        // SAFETY: the request ioctls take no argument.
        ioctl::retry("MEDIA_REQUEST_IOC_QUEUE", || unsafe {
            ioctl::media_request_queue(self.fd.as_raw_fd())
        })
    }

    /// Returns a completed request to the idle state so it can be reused.
    pub fn reinit(&self) -> Result<()> {
        // SAFETY: as above.
        ioctl::retry("MEDIA_REQUEST_IOC_REINIT", || unsafe {
            ioctl::media_request_reinit(self.fd.as_raw_fd())
        })
    }
}

impl AsRawFd for MediaRequest {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
