// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The narrow synchronous kernel interface the encoder core is written against.
//!
//! [`Transport`] is implemented for real hardware by [`crate::device::V4l2Device`].
//! Every call either succeeds or returns an [`crate::Error`] carrying the kernel's
//! error code; none of them retain state the caller cannot see.

use std::time::Duration;

use v4l2_enc_sys as sys;

use crate::{
    Result,
    controls::Control,
    format::{Format, FourCc, Fraction, MemoryKind, QueueType, Rect, SelectionTarget},
};

/// A plane of buffer memory shared with the device.
///
/// Implementations own the mapping and release it when dropped.
pub trait PlaneMemory {
    fn as_slice(&self) -> &[u8];

    fn as_mut_slice(&mut self) -> &mut [u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity and feature bits reported by the capability probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Capabilities of the opened node (`device_caps` when the driver reports it).
    pub capabilities: u32,
}

impl DeviceCapabilities {
    pub fn supports_m2m(&self) -> bool {
        self.capabilities & sys::V4L2_CAP_VIDEO_M2M != 0
    }

    pub fn supports_m2m_mplane(&self) -> bool {
        self.capabilities & sys::V4L2_CAP_VIDEO_M2M_MPLANE != 0
    }

    pub fn supports_streaming(&self) -> bool {
        self.capabilities & sys::V4L2_CAP_STREAMING != 0
    }
}

/// Capabilities a queue reports for a memory kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferCapabilities(pub u32);

impl BufferCapabilities {
    /// Drivers predating capability reporting return zero; those only support mmap.
    pub fn supports_mmap(self) -> bool {
        self.0 == 0 || self.0 & sys::V4L2_BUF_CAP_SUPPORTS_MMAP != 0
    }

    pub fn supports_dmabuf(self) -> bool {
        self.0 & sys::V4L2_BUF_CAP_SUPPORTS_DMABUF != 0
    }

    pub fn supports_requests(self) -> bool {
        self.0 & sys::V4L2_BUF_CAP_SUPPORTS_REQUESTS != 0
    }

    pub fn supports(self, memory: MemoryKind) -> bool {
        match memory {
            MemoryKind::Mmap => self.supports_mmap(),
            MemoryKind::UserPtr => self.0 & sys::V4L2_BUF_CAP_SUPPORTS_USERPTR != 0,
            MemoryKind::DmaBuf => self.supports_dmabuf(),
        }
    }
}

/// `v4l2_buffer::flags` of a completed buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags(pub u32);

impl BufferFlags {
    pub const KEYFRAME: BufferFlags = BufferFlags(sys::V4L2_BUF_FLAG_KEYFRAME);
    pub const PFRAME: BufferFlags = BufferFlags(sys::V4L2_BUF_FLAG_PFRAME);
    pub const BFRAME: BufferFlags = BufferFlags(sys::V4L2_BUF_FLAG_BFRAME);
    pub const ERROR: BufferFlags = BufferFlags(sys::V4L2_BUF_FLAG_ERROR);
    pub const LAST: BufferFlags = BufferFlags(sys::V4L2_BUF_FLAG_LAST);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | other.0)
    }

    pub const fn is_keyframe(self) -> bool {
        self.contains(Self::KEYFRAME)
    }

    pub const fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Offset and length of one plane of a buffer slot, as returned by a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneInfo {
    pub length: u32,
    /// Cookie to pass to `mmap` for this plane.
    pub offset: u32,
}

/// Layout of one buffer slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLayout {
    pub index: u32,
    pub planes: Vec<PlaneInfo>,
}

/// A buffer handed back by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedBuffer {
    pub index: u32,
    pub flags: BufferFlags,
    /// Bytes written per plane.
    pub bytes_used: Vec<u32>,
    pub timestamp_ns: u64,
    pub sequence: u32,
}

/// Everything needed to enqueue one buffer slot.
#[derive(Debug)]
pub struct Submission<'a, R> {
    pub queue: QueueType,
    pub memory: MemoryKind,
    pub index: u32,
    /// Payload size per plane; zero for buffers the device fills.
    pub bytes_used: Vec<u32>,
    pub timestamp_ns: u64,
    /// Atomic-batch handle the buffer is bound to, if any.
    pub request: Option<&'a R>,
}

/// Synchronous operations on an open encoder device.
///
/// Errors carry the errno of the failing call (see [`crate::Error::from_errno`]).
pub trait Transport {
    /// A mapped buffer plane, unmapped on drop.
    type Mapping: PlaneMemory;
    /// An atomic-batch (media request) handle, closed on drop.
    type Request;

    fn query_capabilities(&mut self) -> Result<DeviceCapabilities>;

    /// Returns the pixel format at `index` on `queue`, or `None` past the end of the list.
    fn enum_format(&mut self, queue: QueueType, index: u32) -> Result<Option<FourCc>>;

    fn get_format(&mut self, queue: QueueType) -> Result<Format>;

    /// Sets the format and returns what the device actually accepted.
    fn set_format(&mut self, queue: QueueType, format: &Format) -> Result<Format>;

    fn try_format(&mut self, queue: QueueType, format: &Format) -> Result<Format>;

    fn get_selection(&mut self, queue: QueueType, target: SelectionTarget) -> Result<Rect>;

    fn set_selection(
        &mut self,
        queue: QueueType,
        target: SelectionTarget,
        rect: Rect,
    ) -> Result<Rect>;

    /// Sets the time per frame and returns the value the device applied.
    fn set_frame_interval(&mut self, queue: QueueType, interval: Fraction) -> Result<Fraction>;

    /// Probes which memory kinds and features `queue` supports without allocating.
    fn buffer_capabilities(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
    ) -> Result<BufferCapabilities>;

    /// Allocates `count` slots; returns how many the device granted.
    fn request_buffers(&mut self, queue: QueueType, memory: MemoryKind, count: u32)
    -> Result<u32>;

    /// Frees every slot on `queue`.
    fn release_buffers(&mut self, queue: QueueType, memory: MemoryKind) -> Result<()>;

    fn query_buffer(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
        index: u32,
    ) -> Result<BufferLayout>;

    /// Maps one plane read-write and shared.
    fn map_plane(&mut self, plane: &PlaneInfo) -> Result<Self::Mapping>;

    fn alloc_request(&mut self) -> Result<Self::Request>;

    fn queue_request(&mut self, request: &Self::Request) -> Result<()>;

    fn reinit_request(&mut self, request: &Self::Request) -> Result<()>;

    fn queue_buffer(&mut self, submission: &Submission<'_, Self::Request>) -> Result<()>;

    /// Dequeues a completed buffer, or returns `None` when nothing is ready yet.
    fn dequeue_buffer(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
    ) -> Result<Option<CompletedBuffer>>;

    fn set_control(&mut self, control: Control) -> Result<()>;

    /// Sets several controls at once, staged in `request` when one is given.
    fn set_ext_controls(
        &mut self,
        controls: &[Control],
        request: Option<&Self::Request>,
    ) -> Result<()>;

    fn stream_on(&mut self, queue: QueueType) -> Result<()>;

    fn stream_off(&mut self, queue: QueueType) -> Result<()>;

    /// Waits until either queue has a completed buffer.
    ///
    /// Returns `false` if `timeout` elapsed with nothing ready.
    fn poll(&mut self, timeout: Duration) -> Result<bool>;
}
