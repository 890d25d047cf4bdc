// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-ins for the kernel seams, shared by the integration tests.
//!
//! [`SimDevice`] behaves like a memory-to-memory H.264 encoder: it accepts
//! formats, hands out slots, encodes a queued raw/coded pair when polled and
//! copies the raw timestamp to the coded buffer. Every knob on [`SimState`] is
//! a fault or quirk a real driver can exhibit. Tests keep a [`SimHandle`] to
//! inspect and steer the device after the session has taken ownership of it.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashSet, VecDeque},
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

use v4l2_enc::{
    Direction, EncoderSession, Error, Format, FourCc, MediaBus, MemoryKind, QueueType,
    ResolvedDevice, Result, SessionOptions, Transport,
    controls::Control,
    format::{BufferShape, Fraction, Rect, SelectionTarget},
    topology::{
        DevNode, Entity, EntityFunction, Interface, Link, MediaDeviceInfo, MediaGraph,
        MediaSnapshot, Pad,
    },
    transport::{
        BufferCapabilities, BufferFlags, BufferLayout, CompletedBuffer, DeviceCapabilities,
        PlaneInfo, PlaneMemory, Submission,
    },
};
use v4l2_enc_sys as sys;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

pub fn init_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

fn errno(operation: &'static str, code: i32) -> Error {
    Error::from_errno(operation, code)
}

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Input => 0,
        Direction::Output => 1,
    }
}

/// Bytes at the start of every coded mapping: an IDR slice NAL unit whose
/// second byte is the slot index.
pub fn coded_pattern(index: u32, len: usize) -> Vec<u8> {
    let mut data = vec![0xa5; len];
    let header = [0, 0, 0, 1, 0x65, index as u8];
    let n = header.len().min(len);
    data[..n].copy_from_slice(&header[..n]);
    data
}

/// A mapped plane backed by heap memory.
pub struct SimMapping {
    data: Vec<u8>,
    live: Rc<Cell<usize>>,
}

impl PlaneMemory for SimMapping {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for SimMapping {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

/// An allocated request handle.
#[derive(Debug)]
pub struct SimRequest {
    pub id: u32,
    live: Rc<Cell<usize>>,
}

impl Drop for SimRequest {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

#[derive(Debug, Clone)]
pub struct InputJob {
    pub index: u32,
    pub timestamp_ns: u64,
    pub request: Option<u32>,
    pub bytes_used: Vec<u32>,
}

/// Everything the simulated device knows, plus fault injection knobs.
pub struct SimState {
    pub capabilities: DeviceCapabilities,
    pub buffer_caps: u32,
    pub coded_formats: Vec<FourCc>,
    pub raw_formats: Vec<FourCc>,
    /// Raw frame sizes are rounded up to this many pixels.
    pub alignment: u32,
    pub formats: [Option<Format>; 2],
    pub selection: Option<Rect>,
    pub frame_interval: Option<Fraction>,
    /// Controls applied with `set_control`, in order.
    pub controls: Vec<Control>,
    /// `(controls, request id)` for every `set_ext_controls` call.
    pub ext_controls: Vec<(Vec<Control>, Option<u32>)>,
    /// Names of calls in the order they arrived.
    pub calls: Vec<&'static str>,

    pub granted: [u32; 2],
    /// Overrides how many slots `request_buffers` grants.
    pub grant_override: Option<u32>,
    pub released: Vec<QueueType>,
    pub queued: [HashSet<u32>; 2],
    pub streaming: [bool; 2],

    pub live_mappings: Rc<Cell<usize>>,
    pub live_requests: Rc<Cell<usize>>,
    pub map_calls: usize,
    pub request_allocs: usize,
    pub next_request_id: u32,
    pub queued_requests: HashSet<u32>,
    pub reinits: Vec<u32>,
    pub forced_requests: HashSet<u32>,
    pub force_next: bool,

    pub pending_input: VecDeque<InputJob>,
    pub pending_output: VecDeque<u32>,
    pub done: [VecDeque<CompletedBuffer>; 2],
    pub encoded: u64,
    /// Keyframe cadence of the simulated encoder.
    pub gop: u64,

    // Faults.
    pub fail_query_at: Option<(Direction, u32)>,
    /// Fails the n-th (1-based) `map_plane` call.
    pub fail_map_at: Option<usize>,
    /// Fails the n-th (1-based) `alloc_request` call.
    pub fail_request_alloc_at: Option<usize>,
    pub fail_control: Option<u32>,
    pub fail_stream_on: Option<Direction>,
    pub fail_queue_input: bool,
    pub fail_release: bool,
    /// Fails this many `reinit_request` calls.
    pub fail_reinit: u32,
    /// Polls that report nothing ready before the device does any work.
    pub poll_timeouts: u32,
    /// Dequeue calls that report "not ready" regardless of state.
    pub not_ready: u32,
    /// The next dequeue on this queue reports the wrong slot index.
    pub index_override: Option<(Direction, u32)>,
    /// Encoded frame number the device flags as errored.
    pub error_frame: Option<u64>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "sim-enc".into(),
                card: "Simulated encoder".into(),
                bus_info: "platform:sim-enc".into(),
                capabilities: sys::V4L2_CAP_VIDEO_M2M_MPLANE | sys::V4L2_CAP_STREAMING,
            },
            buffer_caps: sys::V4L2_BUF_CAP_SUPPORTS_MMAP | sys::V4L2_BUF_CAP_SUPPORTS_REQUESTS,
            coded_formats: vec![FourCc::H264],
            raw_formats: vec![FourCc::NV12, FourCc::NV12M, FourCc::YUV420, FourCc::YUV420M],
            alignment: 16,
            formats: [None, None],
            selection: None,
            frame_interval: None,
            controls: Vec::new(),
            ext_controls: Vec::new(),
            calls: Vec::new(),
            granted: [0; 2],
            grant_override: None,
            released: Vec::new(),
            queued: [HashSet::new(), HashSet::new()],
            streaming: [false; 2],
            live_mappings: Rc::new(Cell::new(0)),
            live_requests: Rc::new(Cell::new(0)),
            map_calls: 0,
            request_allocs: 0,
            next_request_id: 100,
            queued_requests: HashSet::new(),
            reinits: Vec::new(),
            forced_requests: HashSet::new(),
            force_next: false,
            pending_input: VecDeque::new(),
            pending_output: VecDeque::new(),
            done: [VecDeque::new(), VecDeque::new()],
            encoded: 0,
            gop: 3,
            fail_query_at: None,
            fail_map_at: None,
            fail_request_alloc_at: None,
            fail_control: None,
            fail_stream_on: None,
            fail_queue_input: false,
            fail_release: false,
            fail_reinit: 0,
            poll_timeouts: 0,
            not_ready: 0,
            index_override: None,
            error_frame: None,
        }
    }
}

impl SimState {
    pub fn live_mappings(&self) -> usize {
        self.live_mappings.get()
    }

    pub fn live_requests(&self) -> usize {
        self.live_requests.get()
    }

    pub fn format(&self, direction: Direction) -> Option<&Format> {
        self.formats[slot(direction)].as_ref()
    }

    pub fn is_streaming(&self, direction: Direction) -> bool {
        self.streaming[slot(direction)]
    }

    pub fn released_count(&self, direction: Direction) -> usize {
        self.released
            .iter()
            .filter(|q| q.direction == direction)
            .count()
    }

    fn negotiate(&self, queue: QueueType, format: &Format) -> Format {
        match queue.direction {
            Direction::Output => {
                let pixel_format = if self.coded_formats.contains(&format.pixel_format) {
                    format.pixel_format
                } else {
                    self.coded_formats[0]
                };
                let size = format
                    .planes
                    .first()
                    .map(|p| p.size_image)
                    .filter(|s| *s > 0)
                    .unwrap_or(1024 * 1024);
                Format::new(format.width, format.height, pixel_format).with_plane(0, size)
            }
            Direction::Input => {
                let pixel_format = if self.raw_formats.contains(&format.pixel_format) {
                    format.pixel_format
                } else {
                    FourCc::NV12
                };
                let align = self.alignment.max(1);
                let width = format.width.div_ceil(align) * align;
                let height = format.height.div_ceil(align) * align;
                let luma = width * height;
                let raw = Format::new(width, height, pixel_format);
                match (pixel_format, queue.shape) {
                    (FourCc::NV12M, BufferShape::MultiPlanar) => raw
                        .with_plane(width, luma)
                        .with_plane(width, luma / 2),
                    (FourCc::YUV420M, BufferShape::MultiPlanar) => raw
                        .with_plane(width, luma)
                        .with_plane(width / 2, luma / 4)
                        .with_plane(width / 2, luma / 4),
                    _ => raw.with_plane(width, luma * 3 / 2),
                }
            }
        }
    }

    /// Encodes every pair that is ready, as the device would in the background.
    fn process(&mut self) {
        if !self.streaming[0] || !self.streaming[1] {
            return;
        }
        loop {
            let ready = self.pending_input.front().is_some_and(|job| {
                job.request
                    .is_none_or(|id| self.queued_requests.contains(&id))
            });
            if !ready || self.pending_output.is_empty() {
                return;
            }
            let (Some(job), Some(out)) =
                (self.pending_input.pop_front(), self.pending_output.pop_front())
            else {
                return;
            };

            let frame = self.encoded;
            let forced = match job.request {
                Some(id) => self.forced_requests.remove(&id),
                None => std::mem::take(&mut self.force_next),
            };
            let mut flags = if forced || frame % self.gop == 0 {
                BufferFlags::KEYFRAME
            } else {
                BufferFlags::PFRAME
            };
            if self.error_frame == Some(frame) {
                flags = flags | BufferFlags::ERROR;
            }
            let coded_len = self.formats[1]
                .as_ref()
                .and_then(|f| f.planes.first())
                .map_or(0, |p| p.size_image);
            let bytes = (64 + frame as u32).min(coded_len);

            self.done[0].push_back(CompletedBuffer {
                index: job.index,
                flags: BufferFlags::empty(),
                bytes_used: job.bytes_used.clone(),
                timestamp_ns: job.timestamp_ns,
                sequence: frame as u32,
            });
            self.done[1].push_back(CompletedBuffer {
                index: out,
                flags,
                bytes_used: vec![bytes],
                timestamp_ns: job.timestamp_ns,
                sequence: frame as u32,
            });
            self.encoded += 1;
        }
    }
}

pub type SimHandle = Rc<RefCell<SimState>>;

/// The simulated encoder as the session sees it.
pub struct SimDevice {
    state: SimHandle,
}

impl SimDevice {
    pub fn new(state: SimHandle) -> Self {
        Self { state }
    }
}

/// A fresh device plus the handle tests keep to observe it.
pub fn sim() -> (SimDevice, SimHandle) {
    sim_with(SimState::default())
}

pub fn sim_with(state: SimState) -> (SimDevice, SimHandle) {
    let handle = Rc::new(RefCell::new(state));
    (SimDevice::new(handle.clone()), handle)
}

/// Small pools and short waits keep the tests fast.
pub fn test_options() -> SessionOptions {
    SessionOptions {
        buffer_count: 3,
        coded_buffer_size: 64 * 1024,
        poll_timeout_ms: 5,
        dequeue_retries: 4,
    }
}

pub fn session_with(state: SimState) -> (EncoderSession<SimDevice>, SimHandle) {
    init_logging();
    let (device, handle) = sim_with(state);
    (EncoderSession::from_transport(device, test_options()), handle)
}

impl Transport for SimDevice {
    type Mapping = SimMapping;
    type Request = SimRequest;

    fn query_capabilities(&mut self) -> Result<DeviceCapabilities> {
        let mut s = self.state.borrow_mut();
        s.calls.push("query_capabilities");
        Ok(s.capabilities.clone())
    }

    fn enum_format(&mut self, queue: QueueType, index: u32) -> Result<Option<FourCc>> {
        let s = self.state.borrow();
        let list = match queue.direction {
            Direction::Input => &s.raw_formats,
            Direction::Output => &s.coded_formats,
        };
        Ok(list.get(index as usize).copied())
    }

    fn get_format(&mut self, queue: QueueType) -> Result<Format> {
        let s = self.state.borrow();
        s.formats[slot(queue.direction)]
            .clone()
            .ok_or_else(|| errno("VIDIOC_G_FMT", libc::EINVAL))
    }

    fn set_format(&mut self, queue: QueueType, format: &Format) -> Result<Format> {
        let mut s = self.state.borrow_mut();
        s.calls.push(match queue.direction {
            Direction::Input => "set_format(input)",
            Direction::Output => "set_format(output)",
        });
        let applied = s.negotiate(queue, format);
        s.formats[slot(queue.direction)] = Some(applied.clone());
        Ok(applied)
    }

    fn try_format(&mut self, queue: QueueType, format: &Format) -> Result<Format> {
        Ok(self.state.borrow().negotiate(queue, format))
    }

    fn get_selection(&mut self, queue: QueueType, _target: SelectionTarget) -> Result<Rect> {
        let s = self.state.borrow();
        match (s.selection, &s.formats[slot(queue.direction)]) {
            (Some(rect), _) => Ok(rect),
            (None, Some(format)) => Ok(Rect::from_size(format.width, format.height)),
            (None, None) => Err(errno("VIDIOC_G_SELECTION", libc::EINVAL)),
        }
    }

    fn set_selection(
        &mut self,
        _queue: QueueType,
        _target: SelectionTarget,
        rect: Rect,
    ) -> Result<Rect> {
        let mut s = self.state.borrow_mut();
        s.calls.push("set_selection");
        s.selection = Some(rect);
        Ok(rect)
    }

    fn set_frame_interval(&mut self, _queue: QueueType, interval: Fraction) -> Result<Fraction> {
        let mut s = self.state.borrow_mut();
        s.calls.push("set_frame_interval");
        s.frame_interval = Some(interval);
        Ok(interval)
    }

    fn buffer_capabilities(
        &mut self,
        _queue: QueueType,
        _memory: MemoryKind,
    ) -> Result<BufferCapabilities> {
        Ok(BufferCapabilities(self.state.borrow().buffer_caps))
    }

    fn request_buffers(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
        count: u32,
    ) -> Result<u32> {
        let mut s = self.state.borrow_mut();
        if memory != MemoryKind::Mmap {
            return Err(errno("VIDIOC_REQBUFS", libc::EINVAL));
        }
        s.calls.push(match queue.direction {
            Direction::Input => "request_buffers(input)",
            Direction::Output => "request_buffers(output)",
        });
        let granted = s.grant_override.unwrap_or(count);
        s.granted[slot(queue.direction)] = granted;
        Ok(granted)
    }

    fn release_buffers(&mut self, queue: QueueType, _memory: MemoryKind) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.released.push(queue);
        let i = slot(queue.direction);
        s.granted[i] = 0;
        s.queued[i].clear();
        if s.fail_release {
            return Err(errno("VIDIOC_REQBUFS", libc::EBUSY));
        }
        Ok(())
    }

    fn query_buffer(
        &mut self,
        queue: QueueType,
        _memory: MemoryKind,
        index: u32,
    ) -> Result<BufferLayout> {
        let s = self.state.borrow();
        let i = slot(queue.direction);
        if index >= s.granted[i] || s.fail_query_at == Some((queue.direction, index)) {
            return Err(errno("VIDIOC_QUERYBUF", libc::EINVAL));
        }
        let format = s.formats[i]
            .as_ref()
            .ok_or_else(|| errno("VIDIOC_QUERYBUF", libc::EINVAL))?;
        let planes = format
            .planes
            .iter()
            .enumerate()
            .map(|(plane, p)| PlaneInfo {
                length: p.size_image,
                offset: ((i as u32) << 24) | (index << 8) | plane as u32,
            })
            .collect();
        Ok(BufferLayout { index, planes })
    }

    fn map_plane(&mut self, plane: &PlaneInfo) -> Result<SimMapping> {
        let mut s = self.state.borrow_mut();
        s.map_calls += 1;
        if s.fail_map_at == Some(s.map_calls) {
            return Err(errno("mmap", libc::ENOMEM));
        }
        let len = plane.length as usize;
        let index = (plane.offset >> 8) & 0xffff;
        let data = if plane.offset >> 24 == 1 {
            coded_pattern(index, len)
        } else {
            vec![0; len]
        };
        s.live_mappings.set(s.live_mappings.get() + 1);
        Ok(SimMapping {
            data,
            live: s.live_mappings.clone(),
        })
    }

    fn alloc_request(&mut self) -> Result<SimRequest> {
        let mut s = self.state.borrow_mut();
        s.request_allocs += 1;
        if s.fail_request_alloc_at == Some(s.request_allocs) {
            return Err(errno("MEDIA_IOC_REQUEST_ALLOC", libc::ENOMEM));
        }
        let id = s.next_request_id;
        s.next_request_id += 1;
        s.live_requests.set(s.live_requests.get() + 1);
        Ok(SimRequest {
            id,
            live: s.live_requests.clone(),
        })
    }

    fn queue_request(&mut self, request: &SimRequest) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if !s.pending_input.iter().any(|job| job.request == Some(request.id)) {
            return Err(errno("MEDIA_REQUEST_IOC_QUEUE", libc::ENOENT));
        }
        if !s.queued_requests.insert(request.id) {
            return Err(errno("MEDIA_REQUEST_IOC_QUEUE", libc::EBUSY));
        }
        Ok(())
    }

    fn reinit_request(&mut self, request: &SimRequest) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push("reinit_request");
        if s.fail_reinit > 0 {
            s.fail_reinit -= 1;
            return Err(errno("MEDIA_REQUEST_IOC_REINIT", libc::EBUSY));
        }
        s.queued_requests.remove(&request.id);
        s.forced_requests.remove(&request.id);
        s.pending_input.retain(|job| job.request != Some(request.id));
        s.reinits.push(request.id);
        Ok(())
    }

    fn queue_buffer(&mut self, submission: &Submission<'_, SimRequest>) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let i = slot(submission.queue.direction);
        if submission.index >= s.granted[i] || s.queued[i].contains(&submission.index) {
            return Err(errno("VIDIOC_QBUF", libc::EINVAL));
        }
        match submission.queue.direction {
            Direction::Input => {
                if s.fail_queue_input {
                    return Err(errno("VIDIOC_QBUF", libc::EIO));
                }
                s.pending_input.push_back(InputJob {
                    index: submission.index,
                    timestamp_ns: submission.timestamp_ns,
                    request: submission.request.map(|r| r.id),
                    bytes_used: submission.bytes_used.clone(),
                });
            }
            Direction::Output => s.pending_output.push_back(submission.index),
        }
        s.queued[i].insert(submission.index);
        Ok(())
    }

    fn dequeue_buffer(
        &mut self,
        queue: QueueType,
        _memory: MemoryKind,
    ) -> Result<Option<CompletedBuffer>> {
        let mut s = self.state.borrow_mut();
        if s.not_ready > 0 {
            s.not_ready -= 1;
            return Ok(None);
        }
        let i = slot(queue.direction);
        let Some(mut done) = s.done[i].pop_front() else {
            return Ok(None);
        };
        s.queued[i].remove(&done.index);
        if let Some((direction, index)) = s.index_override
            && direction == queue.direction
        {
            s.index_override = None;
            done.index = index;
        }
        Ok(Some(done))
    }

    fn set_control(&mut self, control: Control) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if s.fail_control == Some(control.id) {
            return Err(errno("VIDIOC_S_CTRL", libc::EINVAL));
        }
        if control.id == sys::V4L2_CID_MPEG_VIDEO_FORCE_KEY_FRAME {
            s.force_next = true;
        }
        s.controls.push(control);
        Ok(())
    }

    fn set_ext_controls(
        &mut self,
        controls: &[Control],
        request: Option<&SimRequest>,
    ) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let forced = controls
            .iter()
            .any(|c| c.id == sys::V4L2_CID_MPEG_VIDEO_FORCE_KEY_FRAME);
        match (forced, request) {
            (true, Some(request)) => {
                s.forced_requests.insert(request.id);
            }
            (true, None) => s.force_next = true,
            (false, _) => {}
        }
        s.ext_controls
            .push((controls.to_vec(), request.map(|r| r.id)));
        Ok(())
    }

    fn stream_on(&mut self, queue: QueueType) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if s.fail_stream_on == Some(queue.direction) {
            return Err(errno("VIDIOC_STREAMON", libc::EIO));
        }
        s.streaming[slot(queue.direction)] = true;
        Ok(())
    }

    fn stream_off(&mut self, queue: QueueType) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let i = slot(queue.direction);
        s.streaming[i] = false;
        s.queued[i].clear();
        s.done[i].clear();
        match queue.direction {
            Direction::Input => s.pending_input.clear(),
            Direction::Output => s.pending_output.clear(),
        }
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<bool> {
        let mut s = self.state.borrow_mut();
        if s.poll_timeouts > 0 {
            s.poll_timeouts -= 1;
            return Ok(false);
        }
        s.process();
        Ok(!s.done[0].is_empty() || !s.done[1].is_empty())
    }
}

/// Builds a media graph with a V4L I/O entity feeding `function` through one
/// data link, exposed through a video interface with device number `81:minor`.
///
/// ```text
/// interface 10 (81:minor) ──► entity 1 (I/O) ── pad 2 ──► pad 4 ── entity 3 (function)
/// ```
pub fn m2m_graph(function: EntityFunction, minor: u32) -> MediaGraph {
    MediaGraph::from_parts(
        7,
        [
            entity(1, "sim-enc-source", EntityFunction::IO_V4L),
            entity(3, "sim-enc-proc", function),
            entity(5, "sim-enc-sink", EntityFunction::IO_V4L),
        ],
        [
            interface(10, 81, minor),
            interface(11, 81, minor + 1),
        ],
        [
            pad(2, 1, sys::MEDIA_PAD_FL_SOURCE),
            pad(4, 3, sys::MEDIA_PAD_FL_SINK),
            pad(6, 3, sys::MEDIA_PAD_FL_SOURCE),
            pad(7, 5, sys::MEDIA_PAD_FL_SINK),
        ],
        [
            data_link(8, 2, 4),
            data_link(9, 6, 7),
            interface_link(12, 10, 1),
            interface_link(13, 11, 5),
        ],
    )
}

pub fn entity(id: u32, name: &str, function: EntityFunction) -> Entity {
    Entity {
        id,
        name: name.into(),
        function,
        flags: 0,
    }
}

pub fn interface(id: u32, major: u32, minor: u32) -> Interface {
    Interface {
        id,
        intf_type: sys::MEDIA_INTF_T_V4L_VIDEO,
        flags: 0,
        devnode: DevNode { major, minor },
    }
}

pub fn pad(id: u32, entity_id: u32, flags: u32) -> Pad {
    Pad {
        id,
        entity_id,
        flags,
        index: 0,
    }
}

pub fn data_link(id: u32, source_id: u32, sink_id: u32) -> Link {
    Link {
        id,
        source_id,
        sink_id,
        flags: sys::MEDIA_LNK_FL_ENABLED | sys::MEDIA_LNK_FL_DATA_LINK,
    }
}

pub fn interface_link(id: u32, source_id: u32, sink_id: u32) -> Link {
    Link {
        id,
        source_id,
        sink_id,
        flags: sys::MEDIA_LNK_FL_ENABLED | sys::MEDIA_LNK_FL_INTERFACE_LINK,
    }
}

/// One media root on a [`SimBus`]. `None` means the root cannot be read.
pub struct SimRoot {
    pub path: PathBuf,
    pub snapshot: Option<MediaSnapshot>,
}

impl SimRoot {
    pub fn new(path: &str, driver: &str, graph: MediaGraph) -> Self {
        Self {
            path: PathBuf::from(path),
            snapshot: Some(MediaSnapshot {
                info: MediaDeviceInfo {
                    driver: driver.into(),
                    model: format!("{driver} model"),
                    ..Default::default()
                },
                graph,
            }),
        }
    }

    pub fn unreadable(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            snapshot: None,
        }
    }
}

/// An in-memory device-graph service.
#[derive(Default)]
pub struct SimBus {
    pub roots: Vec<SimRoot>,
    pub devnodes: BTreeMap<(u32, u32), PathBuf>,
    /// Roots snapshotted, in order.
    pub visited: Vec<PathBuf>,
    pub opened: Vec<ResolvedDevice>,
    /// State handed to devices opened through this bus.
    pub device: Option<SimHandle>,
    pub fail_open: bool,
}

impl SimBus {
    pub fn new(roots: Vec<SimRoot>) -> Self {
        let devnodes = (0..8)
            .map(|minor| ((81, minor), PathBuf::from(format!("/dev/video{minor}"))))
            .collect();
        Self {
            roots,
            devnodes,
            ..Default::default()
        }
    }
}

impl MediaBus for SimBus {
    type Transport = SimDevice;

    fn candidates(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.roots.iter().map(|r| r.path.clone()).collect())
    }

    fn snapshot(&mut self, root: &Path) -> Result<MediaSnapshot> {
        self.visited.push(root.to_path_buf());
        self.roots
            .iter()
            .find(|r| r.path == root)
            .and_then(|r| r.snapshot.clone())
            .ok_or_else(|| errno("MEDIA_IOC_G_TOPOLOGY", libc::EACCES))
    }

    fn devnode_path(&self, devnode: DevNode) -> Result<PathBuf> {
        self.devnodes
            .get(&(devnode.major, devnode.minor))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("device node {devnode}")))
    }

    fn open(&mut self, device: &ResolvedDevice) -> Result<SimDevice> {
        if self.fail_open {
            return Err(Error::OpenFailed {
                path: device.video_node_path.clone(),
                source: std::io::Error::from_raw_os_error(libc::ENOENT),
            });
        }
        self.opened.push(device.clone());
        let state = self
            .device
            .get_or_insert_with(|| Rc::new(RefCell::new(SimState::default())))
            .clone();
        Ok(SimDevice::new(state))
    }
}
