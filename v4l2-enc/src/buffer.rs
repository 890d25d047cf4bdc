// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer pools for the encoder's two queues.
//!
//! A [`BufferPool`] owns every slot of one queue: the mapped planes (unmapped
//! when dropped) and, for the raw input queue, one atomic-batch handle per slot
//! (closed when dropped). The kernel-side allocation is released explicitly with
//! [`BufferPool::release`], which needs the transport and is idempotent.

use tracing::{debug, warn};

use crate::{
    Error, Result,
    format::{Direction, Format, MemoryKind, QueueType},
    transport::{PlaneInfo, PlaneMemory, Transport},
};

/// One plane of a buffer slot.
pub struct Plane<M> {
    mapping: Option<M>,
    info: PlaneInfo,
    bytes_used: u32,
}

impl<M: PlaneMemory> Plane<M> {
    /// Length of the plane as reported by the device.
    pub fn length(&self) -> u32 {
        self.info.length
    }

    pub fn offset(&self) -> u32 {
        self.info.offset
    }

    pub fn bytes_used(&self) -> u32 {
        self.bytes_used
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// The mapped memory, or `None` for pools that are not memory-mapped.
    pub fn data(&self) -> Option<&[u8]> {
        self.mapping.as_ref().map(|m| m.as_slice())
    }

    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.mapping.as_mut().map(|m| m.as_mut_slice())
    }
}

/// One hardware slot.
pub struct Buffer<T: Transport> {
    index: u32,
    direction: Direction,
    planes: Vec<Plane<T::Mapping>>,
    request: Option<T::Request>,
    queued: bool,
}

impl<T: Transport> Buffer<T> {
    /// Queries slot `index` and maps its planes. On error everything already
    /// mapped for this slot is dropped, and with it unmapped.
    fn prepare(
        transport: &mut T,
        queue: QueueType,
        memory: MemoryKind,
        index: u32,
    ) -> Result<Self> {
        let layout = transport.query_buffer(queue, memory, index)?;
        if layout.planes.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{queue} slot {index} reports no planes"
            )));
        }

        let mut planes = Vec::with_capacity(layout.planes.len());
        for info in &layout.planes {
            let mapping = match memory {
                MemoryKind::Mmap => Some(transport.map_plane(info)?),
                MemoryKind::UserPtr | MemoryKind::DmaBuf => None,
            };
            planes.push(Plane {
                mapping,
                info: *info,
                bytes_used: 0,
            });
        }

        let request = match queue.direction {
            Direction::Input => Some(transport.alloc_request()?),
            Direction::Output => None,
        };

        Ok(Self {
            index,
            direction: queue.direction,
            planes,
            request,
            queued: false,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn planes(&self) -> &[Plane<T::Mapping>] {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut [Plane<T::Mapping>] {
        &mut self.planes
    }

    /// Mapped memory of plane `plane`.
    pub fn plane_data(&self, plane: usize) -> Option<&[u8]> {
        self.planes.get(plane).and_then(Plane::data)
    }

    /// The atomic-batch handle bound to this slot. Only raw input slots carry one.
    pub fn request(&self) -> Option<&T::Request> {
        self.request.as_ref()
    }

    /// True between a successful submission and its matching completion.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub(crate) fn mark_queued(&mut self, bytes_used: &[u32]) {
        for (plane, used) in self.planes.iter_mut().zip(bytes_used) {
            plane.bytes_used = *used;
        }
        self.queued = true;
    }

    pub(crate) fn mark_done(&mut self, bytes_used: &[u32]) {
        for (plane, used) in self.planes.iter_mut().zip(bytes_used) {
            plane.bytes_used = *used;
        }
        self.queued = false;
    }

    pub(crate) fn mark_abandoned(&mut self) {
        self.queued = false;
    }

    /// Full length of every plane, the payload size of a filled raw frame.
    pub(crate) fn plane_lengths(&self) -> Vec<u32> {
        self.planes.iter().map(|p| p.info.length).collect()
    }
}

/// The fixed set of slots of one queue.
pub struct BufferPool<T: Transport> {
    queue: QueueType,
    memory: MemoryKind,
    format: Format,
    buffers: Vec<Buffer<T>>,
    next: usize,
    allocated: bool,
}

impl<T: Transport> BufferPool<T> {
    /// Allocates, queries and maps `count` slots on `queue`.
    ///
    /// Slots on the raw input queue each get an atomic-batch handle as well.
    ///
    /// # Arguments
    ///
    /// * `transport` - The device the slots live on
    /// * `queue` - Queue to allocate on
    /// * `memory` - Memory kind; only [`MemoryKind::Mmap`] slots are mapped
    /// * `format` - The format negotiated for `queue`, kept for producers
    /// * `count` - Number of slots to request
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero `count`. Any transport
    /// failure is propagated after the pool is rolled back: every mapped plane
    /// unmapped, every atomic-batch handle closed and the kernel allocation
    /// released.
    pub fn allocate(
        transport: &mut T,
        queue: QueueType,
        memory: MemoryKind,
        format: &Format,
        count: u32,
    ) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidArgument(format!(
                "cannot allocate an empty {queue} pool"
            )));
        }

        let granted = transport.request_buffers(queue, memory, count)?;
        let mut pool = Self {
            queue,
            memory,
            format: format.clone(),
            buffers: Vec::with_capacity(granted as usize),
            next: 0,
            allocated: true,
        };

        if granted == 0 {
            pool.release_quietly(transport);
            return Err(Error::from_errno("request_buffers", libc::ENOMEM));
        }
        if granted != count {
            debug!(%queue, requested = count, granted, "Device adjusted slot count");
        }

        for index in 0..granted {
            match Buffer::prepare(transport, queue, memory, index) {
                Ok(buffer) => pool.buffers.push(buffer),
                Err(e) => {
                    debug!(%queue, index, "Slot setup failed, rolling back pool: {e}");
                    pool.release_quietly(transport);
                    return Err(e);
                }
            }
        }

        debug!(
            %queue,
            slots = pool.buffers.len(),
            planes = pool.buffers.first().map_or(0, |b| b.planes.len()),
            "Allocated buffer pool"
        );
        Ok(pool)
    }

    /// Unmaps every plane, closes every atomic-batch handle and releases the
    /// kernel-side allocation.
    ///
    /// Safe to call more than once and on a partially built pool.
    pub fn release(&mut self, transport: &mut T) -> Result<()> {
        self.buffers.clear();
        self.next = 0;
        if self.allocated {
            self.allocated = false;
            transport.release_buffers(self.queue, self.memory)?;
            debug!(queue = %self.queue, "Released buffer pool");
        }
        Ok(())
    }

    pub(crate) fn release_quietly(&mut self, transport: &mut T) {
        if let Err(e) = self.release(transport) {
            warn!(queue = %self.queue, "Releasing buffer pool failed: {e}");
        }
    }

    /// Returns the next slot index in round-robin order and advances.
    pub fn next_slot(&mut self) -> Option<u32> {
        let buffer = self.buffers.get(self.next)?;
        let index = buffer.index;
        self.next = (self.next + 1) % self.buffers.len();
        Some(index)
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn memory(&self) -> MemoryKind {
        self.memory
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// True once [`BufferPool::release`] has run.
    pub fn is_released(&self) -> bool {
        !self.allocated
    }

    pub fn buffer(&self, index: u32) -> Option<&Buffer<T>> {
        self.buffers.iter().find(|b| b.index == index)
    }

    pub fn buffer_mut(&mut self, index: u32) -> Option<&mut Buffer<T>> {
        self.buffers.iter_mut().find(|b| b.index == index)
    }

    /// Mutable access to a slot together with the pool's format.
    pub(crate) fn slot_with_format(&mut self, index: u32) -> Option<(&mut Buffer<T>, &Format)> {
        let buffer = self.buffers.iter_mut().find(|b| b.index == index)?;
        Some((buffer, &self.format))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer<T>> {
        self.buffers.iter()
    }

    pub fn queued_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.queued).count()
    }

    pub(crate) fn abandon_all(&mut self) {
        for buffer in &mut self.buffers {
            buffer.mark_abandoned();
        }
    }
}
