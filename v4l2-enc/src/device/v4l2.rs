// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The kernel transport over a V4L2 video node.

use std::{
    os::fd::{AsFd, AsRawFd, OwnedFd},
    path::{Path, PathBuf},
    time::Duration,
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};
use tracing::trace;
use v4l2_enc_sys as sys;

use crate::{
    Error, Result,
    controls::Control,
    device::{
        MediaRequest, MmapRegion, c_string,
        ioctl::{self, errno_error},
        open_node,
    },
    format::{
        BufferShape, Format, FourCc, Fraction, MemoryKind, PlaneFormat, QueueType, Rect,
        SelectionTarget,
    },
    topology::ResolvedDevice,
    transport::{
        BufferCapabilities, BufferFlags, BufferLayout, CompletedBuffer, DeviceCapabilities,
        PlaneInfo, Submission, Transport,
    },
};

const NSEC_PER_SEC: u64 = 1_000_000_000;
const NSEC_PER_USEC: u64 = 1_000;
const MAX_PLANES: usize = sys::VIDEO_MAX_PLANES as usize;

type IoctlFn<A> = unsafe fn(libc::c_int, *mut A) -> nix::Result<libc::c_int>;

/// An open encoder: the streaming video node plus the media root that owns it.
///
/// The video node is opened non-blocking, so dequeueing with nothing ready
/// reports "not ready" instead of sleeping. Both descriptors close on drop.
#[derive(Debug)]
pub struct V4l2Device {
    video: OwnedFd,
    media: OwnedFd,
    video_path: PathBuf,
}

impl V4l2Device {
    /// Opens both nodes of a resolved device.
    ///
    /// # Errors
    ///
    /// [`Error::OpenFailed`] naming the node that could not be opened.
    pub fn open(device: &ResolvedDevice) -> Result<Self> {
        let media = open_node(&device.control_node_path, false)?;
        let video = open_node(&device.video_node_path, true)?;
        Ok(Self {
            video,
            media,
            video_path: device.video_node_path.clone(),
        })
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    /// Issues `call` on the video node.
    ///
    /// # Safety
    ///
    /// Any pointer embedded in `arg` must stay valid for the duration of the call.
    unsafe fn video_ioctl<A>(
        &self,
        operation: &'static str,
        call: IoctlFn<A>,
        arg: &mut A,
    ) -> Result<()> {
        let fd = self.video.as_raw_fd();
        let arg: *mut A = arg;
        // SAFETY: `call` is declared with the argument type its request encodes.
        ioctl::retry(operation, || unsafe { call(fd, arg) })
    }

    fn format_ioctl(
        &self,
        operation: &'static str,
        call: IoctlFn<sys::v4l2_format>,
        queue: QueueType,
        format: &Format,
    ) -> Result<Format> {
        let mut raw = to_raw_format(queue, format);
        // SAFETY: v4l2_format carries no pointers for video buffer types.
        unsafe { self.video_ioctl(operation, call, &mut raw)? };
        Ok(from_raw_format(queue, &raw))
    }

    fn stream_ioctl(
        &self,
        operation: &'static str,
        call: unsafe fn(libc::c_int, *const libc::c_int) -> nix::Result<libc::c_int>,
        queue: QueueType,
    ) -> Result<()> {
        let fd = self.video.as_raw_fd();
        let buf_type = queue.buf_type() as libc::c_int;
        // SAFETY: STREAMON/STREAMOFF read one int.
        ioctl::retry(operation, || unsafe { call(fd, &buf_type) })
    }
}

/// Selection calls take the single-planar type for either buffer shape.
fn selection_type(queue: QueueType) -> u32 {
    QueueType::new(queue.direction, BufferShape::SinglePlanar).buf_type()
}

fn to_raw_format(queue: QueueType, format: &Format) -> sys::v4l2_format {
    let mut raw = sys::v4l2_format {
        type_: queue.buf_type(),
        ..Default::default()
    };
    if queue.is_multiplanar() {
        let mut pix_mp = sys::v4l2_pix_format_mplane {
            width: format.width,
            height: format.height,
            pixelformat: format.pixel_format.code(),
            field: sys::V4L2_FIELD_NONE,
            num_planes: format.planes.len().min(MAX_PLANES) as u8,
            ..Default::default()
        };
        for (dst, src) in pix_mp.plane_fmt.iter_mut().zip(&format.planes) {
            dst.bytesperline = src.bytes_per_line;
            dst.sizeimage = src.size_image;
        }
        raw.fmt.pix_mp = pix_mp;
    } else {
        let plane = format.planes.first().copied().unwrap_or_default();
        raw.fmt.pix = sys::v4l2_pix_format {
            width: format.width,
            height: format.height,
            pixelformat: format.pixel_format.code(),
            field: sys::V4L2_FIELD_NONE,
            bytesperline: plane.bytes_per_line,
            sizeimage: plane.size_image,
            ..Default::default()
        };
    }
    raw
}

fn from_raw_format(queue: QueueType, raw: &sys::v4l2_format) -> Format {
    if queue.is_multiplanar() {
        // SAFETY: the kernel fills pix_mp for multi-planar types.
        let pix_mp = unsafe { raw.fmt.pix_mp };
        let count = (pix_mp.num_planes as usize).min(MAX_PLANES);
        Format {
            width: pix_mp.width,
            height: pix_mp.height,
            pixel_format: FourCc::from_code(pix_mp.pixelformat),
            planes: pix_mp.plane_fmt[..count]
                .iter()
                .map(|p| PlaneFormat {
                    bytes_per_line: p.bytesperline,
                    size_image: p.sizeimage,
                })
                .collect(),
        }
    } else {
        // SAFETY: the kernel fills pix for single-planar types.
        let pix = unsafe { raw.fmt.pix };
        Format::new(pix.width, pix.height, FourCc::from_code(pix.pixelformat))
            .with_plane(pix.bytesperline, pix.sizeimage)
    }
}

fn timestamp_to_timeval(ns: u64) -> sys::timeval {
    sys::timeval {
        tv_sec: (ns / NSEC_PER_SEC) as _,
        tv_usec: ((ns % NSEC_PER_SEC) / NSEC_PER_USEC) as _,
    }
}

fn timeval_to_timestamp(tv: &sys::timeval) -> u64 {
    (tv.tv_sec as u64) * NSEC_PER_SEC + (tv.tv_usec as u64) * NSEC_PER_USEC
}

/// A zeroed `v4l2_buffer` for `queue`, with `planes` attached for multi-planar types.
fn empty_buffer(
    queue: QueueType,
    memory: MemoryKind,
    planes: &mut [sys::v4l2_plane; MAX_PLANES],
) -> sys::v4l2_buffer {
    let mut buffer = sys::v4l2_buffer {
        type_: queue.buf_type(),
        memory: memory.to_raw(),
        ..Default::default()
    };
    if queue.is_multiplanar() {
        buffer.m.planes = planes.as_mut_ptr();
        buffer.length = sys::VIDEO_MAX_PLANES;
    }
    buffer
}

fn zeroed_planes() -> [sys::v4l2_plane; MAX_PLANES] {
    [sys::v4l2_plane::default(); MAX_PLANES]
}

impl Transport for V4l2Device {
    type Mapping = MmapRegion;
    type Request = MediaRequest;

    fn query_capabilities(&mut self) -> Result<DeviceCapabilities> {
        let mut caps = sys::v4l2_capability::default();
        // SAFETY: v4l2_capability carries no pointers.
        unsafe { self.video_ioctl("VIDIOC_QUERYCAP", ioctl::querycap, &mut caps)? };
        let capabilities = if caps.capabilities & sys::V4L2_CAP_DEVICE_CAPS != 0 {
            caps.device_caps
        } else {
            caps.capabilities
        };
        Ok(DeviceCapabilities {
            driver: c_string(&caps.driver),
            card: c_string(&caps.card),
            bus_info: c_string(&caps.bus_info),
            capabilities,
        })
    }

    fn enum_format(&mut self, queue: QueueType, index: u32) -> Result<Option<FourCc>> {
        let mut desc = sys::v4l2_fmtdesc {
            index,
            type_: queue.buf_type(),
            ..Default::default()
        };
        // SAFETY: v4l2_fmtdesc carries no pointers.
        match unsafe { self.video_ioctl("VIDIOC_ENUM_FMT", ioctl::enum_fmt, &mut desc) } {
            Ok(()) => Ok(Some(FourCc::from_code(desc.pixelformat))),
            Err(Error::Transport { code: libc::EINVAL, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_format(&mut self, queue: QueueType) -> Result<Format> {
        let mut raw = sys::v4l2_format {
            type_: queue.buf_type(),
            ..Default::default()
        };
        // SAFETY: v4l2_format carries no pointers for video buffer types.
        unsafe { self.video_ioctl("VIDIOC_G_FMT", ioctl::g_fmt, &mut raw)? };
        Ok(from_raw_format(queue, &raw))
    }

    fn set_format(&mut self, queue: QueueType, format: &Format) -> Result<Format> {
        self.format_ioctl("VIDIOC_S_FMT", ioctl::s_fmt, queue, format)
    }

    fn try_format(&mut self, queue: QueueType, format: &Format) -> Result<Format> {
        self.format_ioctl("VIDIOC_TRY_FMT", ioctl::try_fmt, queue, format)
    }

    fn get_selection(&mut self, queue: QueueType, target: SelectionTarget) -> Result<Rect> {
        let mut selection = sys::v4l2_selection {
            type_: selection_type(queue),
            target: target.to_raw(),
            ..Default::default()
        };
        // SAFETY: v4l2_selection carries no pointers.
        unsafe { self.video_ioctl("VIDIOC_G_SELECTION", ioctl::g_selection, &mut selection)? };
        Ok(Rect {
            left: selection.r.left,
            top: selection.r.top,
            width: selection.r.width,
            height: selection.r.height,
        })
    }

    fn set_selection(
        &mut self,
        queue: QueueType,
        target: SelectionTarget,
        rect: Rect,
    ) -> Result<Rect> {
        let mut selection = sys::v4l2_selection {
            type_: selection_type(queue),
            target: target.to_raw(),
            r: sys::v4l2_rect {
                left: rect.left,
                top: rect.top,
                width: rect.width,
                height: rect.height,
            },
            ..Default::default()
        };
        // SAFETY: v4l2_selection carries no pointers.
        unsafe { self.video_ioctl("VIDIOC_S_SELECTION", ioctl::s_selection, &mut selection)? };
        Ok(Rect {
            left: selection.r.left,
            top: selection.r.top,
            width: selection.r.width,
            height: selection.r.height,
        })
    }

    fn set_frame_interval(&mut self, queue: QueueType, interval: Fraction) -> Result<Fraction> {
        let mut parm = sys::v4l2_streamparm {
            type_: queue.buf_type(),
            ..Default::default()
        };
        parm.parm.output = sys::v4l2_outputparm {
            timeperframe: sys::v4l2_fract {
                numerator: interval.numerator,
                denominator: interval.denominator,
            },
            ..Default::default()
        };
        // SAFETY: v4l2_streamparm carries no pointers.
        unsafe { self.video_ioctl("VIDIOC_S_PARM", ioctl::s_parm, &mut parm)? };
        // SAFETY: output parameters were requested and are what the kernel fills.
        let applied = unsafe { parm.parm.output.timeperframe };
        Ok(Fraction::new(applied.numerator, applied.denominator))
    }

    fn buffer_capabilities(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
    ) -> Result<BufferCapabilities> {
        let mut create = sys::v4l2_create_buffers {
            count: 0,
            memory: memory.to_raw(),
            ..Default::default()
        };
        create.format.type_ = queue.buf_type();
        // SAFETY: v4l2_create_buffers carries no pointers; count 0 allocates nothing.
        unsafe { self.video_ioctl("VIDIOC_CREATE_BUFS", ioctl::create_bufs, &mut create)? };
        Ok(BufferCapabilities(create.capabilities))
    }

    fn request_buffers(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
        count: u32,
    ) -> Result<u32> {
        let mut request = sys::v4l2_requestbuffers {
            count,
            type_: queue.buf_type(),
            memory: memory.to_raw(),
            ..Default::default()
        };
        // SAFETY: v4l2_requestbuffers carries no pointers.
        unsafe { self.video_ioctl("VIDIOC_REQBUFS", ioctl::reqbufs, &mut request)? };
        Ok(request.count)
    }

    fn release_buffers(&mut self, queue: QueueType, memory: MemoryKind) -> Result<()> {
        self.request_buffers(queue, memory, 0).map(|_| ())
    }

    fn query_buffer(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
        index: u32,
    ) -> Result<BufferLayout> {
        let mut planes = zeroed_planes();
        let mut buffer = empty_buffer(queue, memory, &mut planes);
        buffer.index = index;
        // SAFETY: the planes pointer, when set, refers to VIDEO_MAX_PLANES
        // entries that outlive the call.
        unsafe { self.video_ioctl("VIDIOC_QUERYBUF", ioctl::querybuf, &mut buffer)? };

        let planes = if queue.is_multiplanar() {
            let count = (buffer.length as usize).min(MAX_PLANES);
            planes[..count]
                .iter()
                .map(|plane| PlaneInfo {
                    length: plane.length,
                    // SAFETY: mem_offset is the member filled for MMAP planes.
                    offset: unsafe { plane.m.mem_offset },
                })
                .collect()
        } else {
            vec![PlaneInfo {
                length: buffer.length,
                // SAFETY: offset is the member filled for MMAP buffers.
                offset: unsafe { buffer.m.offset },
            }]
        };
        Ok(BufferLayout {
            index: buffer.index,
            planes,
        })
    }

    fn map_plane(&mut self, plane: &PlaneInfo) -> Result<MmapRegion> {
        MmapRegion::map(self.video.as_fd(), plane.offset, plane.length)
    }

    fn alloc_request(&mut self) -> Result<MediaRequest> {
        MediaRequest::alloc(self.media.as_fd())
    }

    fn queue_request(&mut self, request: &MediaRequest) -> Result<()> {
        request.queue()
    }

    fn reinit_request(&mut self, request: &MediaRequest) -> Result<()> {
        request.reinit()
    }

    fn queue_buffer(&mut self, submission: &Submission<'_, MediaRequest>) -> Result<()> {
        let mut planes = zeroed_planes();
        let mut buffer = empty_buffer(submission.queue, submission.memory, &mut planes);
        buffer.index = submission.index;
        buffer.field = sys::V4L2_FIELD_NONE;
        buffer.timestamp = timestamp_to_timeval(submission.timestamp_ns);
        if submission.queue.is_multiplanar() {
            let count = submission.bytes_used.len().min(MAX_PLANES);
            for (plane, used) in planes.iter_mut().zip(&submission.bytes_used) {
                plane.bytesused = *used;
                plane.length = *used;
            }
            buffer.length = count as u32;
        } else {
            buffer.bytesused = submission.bytes_used.first().copied().unwrap_or(0);
        }
        if let Some(request) = submission.request {
            buffer.flags |= sys::V4L2_BUF_FLAG_REQUEST_FD;
            buffer.__bindgen_anon_1.request_fd = request.as_raw_fd();
        }
        trace!(queue = %submission.queue, index = submission.index, "VIDIOC_QBUF");
        // SAFETY: `planes` outlives the call.
        unsafe { self.video_ioctl("VIDIOC_QBUF", ioctl::qbuf, &mut buffer) }
    }

    fn dequeue_buffer(
        &mut self,
        queue: QueueType,
        memory: MemoryKind,
    ) -> Result<Option<CompletedBuffer>> {
        let mut planes = zeroed_planes();
        let mut buffer = empty_buffer(queue, memory, &mut planes);
        // SAFETY: `planes` outlives the call.
        match unsafe { self.video_ioctl("VIDIOC_DQBUF", ioctl::dqbuf, &mut buffer) } {
            Ok(()) => {}
            Err(Error::Transport { code: libc::EAGAIN, .. }) => return Ok(None),
            Err(e) => return Err(e),
        }

        let bytes_used = if queue.is_multiplanar() {
            let count = (buffer.length as usize).min(MAX_PLANES);
            planes[..count].iter().map(|p| p.bytesused).collect()
        } else {
            vec![buffer.bytesused]
        };
        Ok(Some(CompletedBuffer {
            index: buffer.index,
            flags: BufferFlags(buffer.flags),
            bytes_used,
            timestamp_ns: timeval_to_timestamp(&buffer.timestamp),
            sequence: buffer.sequence,
        }))
    }

    fn set_control(&mut self, control: Control) -> Result<()> {
        let mut raw = sys::v4l2_control {
            id: control.id,
            value: control.value,
        };
        // SAFETY: v4l2_control carries no pointers.
        unsafe { self.video_ioctl("VIDIOC_S_CTRL", ioctl::s_ctrl, &mut raw) }
    }

    fn set_ext_controls(
        &mut self,
        controls: &[Control],
        request: Option<&MediaRequest>,
    ) -> Result<()> {
        let mut raw: Vec<sys::v4l2_ext_control> = controls
            .iter()
            .map(|c| {
                let mut control = sys::v4l2_ext_control {
                    id: c.id,
                    ..Default::default()
                };
                control.__bindgen_anon_1.value = c.value;
                control
            })
            .collect();
        let mut ext = sys::v4l2_ext_controls {
            count: raw.len() as u32,
            request_fd: request.map_or(-1, |r| r.as_raw_fd()),
            controls: raw.as_mut_ptr(),
            ..Default::default()
        };
        ext.__bindgen_anon_1.which = match request {
            Some(_) => sys::V4L2_CTRL_WHICH_REQUEST_VAL,
            None => sys::V4L2_CTRL_WHICH_CUR_VAL,
        };
        // SAFETY: `raw` outlives the call.
        unsafe { self.video_ioctl("VIDIOC_S_EXT_CTRLS", ioctl::s_ext_ctrls, &mut ext) }
    }

    fn stream_on(&mut self, queue: QueueType) -> Result<()> {
        self.stream_ioctl("VIDIOC_STREAMON", ioctl::streamon, queue)
    }

    fn stream_off(&mut self, queue: QueueType) -> Result<()> {
        self.stream_ioctl("VIDIOC_STREAMOFF", ioctl::streamoff, queue)
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        let timeout = PollTimeout::from(timeout.as_millis().min(u16::MAX as u128) as u16);
        let mut fds = [PollFd::new(
            self.video.as_fd(),
            PollFlags::POLLIN | PollFlags::POLLRDNORM,
        )];
        loop {
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                    if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                        return Err(Error::from_errno("poll", libc::EIO));
                    }
                    return Ok(true);
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno_error("poll", errno)),
            }
        }
    }
}
