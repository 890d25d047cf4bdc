// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The encoder session state machine.
//!
//! ```text
//!            open / from_transport        configure           start
//!  Closed ─────────────────────────► Opened ─────► Configured ─────► Streaming
//!    ▲                                                  ▲               │
//!    │                 close (any state)                └──── stop ─────┘
//!    └──────────────────────────────────────────────────────────────────
//! ```
//!
//! While streaming, each [`EncoderSession::run_once`] submits one raw slot and one
//! coded slot, waits, and reaps exactly that pair. Pool depth is used for
//! rotation, not for pipelining.

use std::{fmt, time::Instant};

use tracing::{debug, error, info, trace, warn};

use crate::{
    Error, Result,
    buffer::BufferPool,
    config::{DeviceConfig, EncoderSetup, SessionOptions},
    controls::{Control, EncoderControl, setup_controls},
    format::{
        BufferShape, Direction, Format, FourCc, Fraction, MemoryKind, QueueType, Rect,
        SelectionTarget,
    },
    frame::{EncodedFrame, FrameKind, RawFrame},
    topology::{EntityFunction, MediaBus, discover},
    transport::{CompletedBuffer, DeviceCapabilities, Submission, Transport},
};

/// Raw frames are stamped with `frame_counter * TIMESTAMP_UNIT_NS` nanoseconds.
pub const TIMESTAMP_UNIT_NS: u64 = 1000;

/// The coded format produced by the session.
pub const CODED_FORMAT: FourCc = FourCc::H264;

// Upper bound on the coded-format enumeration during probe.
const MAX_ENUM_FORMATS: u32 = 256;

/// Lifecycle state of an [`EncoderSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opened,
    Configured,
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "Closed",
            SessionState::Opened => "Opened",
            SessionState::Configured => "Configured",
            SessionState::Streaming => "Streaming",
        };
        f.write_str(name)
    }
}

/// What [`EncoderSession::probe`] found out about the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub capabilities: DeviceCapabilities,
    /// Buffer shape used for every subsequent format and buffer call.
    pub shape: BufferShape,
    pub memory: MemoryKind,
    /// Formats enumerable on the coded queue.
    pub coded_formats: Vec<FourCc>,
}

impl ProbeInfo {
    pub fn queue(&self, direction: Direction) -> QueueType {
        QueueType::new(direction, self.shape)
    }
}

/// The pair submitted by the current iteration and how far reaping has got.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    frame: u64,
    input: u32,
    output: Option<u32>,
    input_reaped: bool,
}

/// One encoder instance's lifecycle, from an open device to teardown.
///
/// The session exclusively owns the transport and both buffer pools. It is not
/// internally synchronized; an embedding that shares it between threads must
/// guard the whole session with one lock.
///
/// # Examples
///
/// ```no_run
/// use v4l2_enc::{EncoderConfig, EncoderSession, EntityFunction, device::SysfsMediaBus};
///
/// # fn main() -> Result<(), v4l2_enc::Error> {
/// let config = EncoderConfig::default();
/// let mut bus = SysfsMediaBus::new();
/// let mut session = EncoderSession::open(
///     &mut bus,
///     EntityFunction::ENCODER,
///     &config.device,
///     config.session.clone(),
/// )?;
/// session.configure(&config.setup)?;
/// session.start()?;
/// let frame = session.run_once(|raw| {
///     if let Some(luma) = raw.plane_mut(0) {
///         luma.fill(0x80);
///     }
/// })?;
/// println!("{} bytes, keyframe: {}", frame.len(), frame.is_keyframe());
/// session.close()?;
/// # Ok(())
/// # }
/// ```
pub struct EncoderSession<T: Transport> {
    transport: Option<T>,
    state: SessionState,
    options: SessionOptions,
    probe: Option<ProbeInfo>,
    setup: Option<EncoderSetup>,
    input_format: Option<Format>,
    output_format: Option<Format>,
    input_pool: Option<BufferPool<T>>,
    output_pool: Option<BufferPool<T>>,
    in_flight: Option<InFlight>,
    frame_counter: u64,
    last_completed_output: Option<u32>,
    force_keyframe: bool,
    /// Raw slots whose request could not be reinitialised after completion.
    stale_requests: Vec<u32>,
}

impl<T: Transport> EncoderSession<T> {
    /// Discovers the device implementing `function` on `bus` and opens it.
    ///
    /// # Arguments
    ///
    /// * `bus` - The device-graph service to search
    /// * `function` - Entity function to look for, normally [`EntityFunction::ENCODER`]
    /// * `device` - Discovery constraints (driver filter)
    /// * `options` - Pool and wait tuning for the session
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `options` are unusable
    /// - [`Error::DeviceNotFound`] if no candidate root resolves
    /// - [`Error::OpenFailed`] if the resolved nodes cannot be opened
    pub fn open<B>(
        bus: &mut B,
        function: EntityFunction,
        device: &DeviceConfig,
        options: SessionOptions,
    ) -> Result<Self>
    where
        B: MediaBus<Transport = T> + ?Sized,
    {
        options.validate()?;
        let resolved = discover(bus, function, device.driver.as_deref())?;
        let transport = bus.open(&resolved)?;
        info!(
            control = %resolved.control_node_path.display(),
            video = %resolved.video_node_path.display(),
            "Opened encoder session"
        );
        Ok(Self::from_transport(transport, options))
    }

    /// Wraps an already open transport in a session in the `Opened` state.
    pub fn from_transport(transport: T, options: SessionOptions) -> Self {
        Self {
            transport: Some(transport),
            state: SessionState::Opened,
            options,
            probe: None,
            setup: None,
            input_format: None,
            output_format: None,
            input_pool: None,
            output_pool: None,
            in_flight: None,
            frame_counter: 0,
            last_completed_output: None,
            force_keyframe: false,
            stale_requests: Vec::new(),
        }
    }

    fn check_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn queues(&self, operation: &'static str) -> Result<(QueueType, QueueType)> {
        let probe = self
            .probe
            .as_ref()
            .ok_or_else(|| self.invalid_state(operation))?;
        Ok((probe.queue(Direction::Input), probe.queue(Direction::Output)))
    }

    /// Checks that the device can act as a request-capable H.264 encoder.
    ///
    /// Selects the multi-planar buffer shape when the device offers it. The
    /// state does not change.
    ///
    /// # Errors
    ///
    /// [`Error::CapabilityMissing`] unless the device is a memory-to-memory
    /// device, its raw queue supports memory-mapped buffers with requests, and
    /// H.264 is enumerable on its coded queue.
    pub fn probe(&mut self) -> Result<&ProbeInfo> {
        self.check_state("probe", &[SessionState::Opened])?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::InvalidState {
                operation: "probe",
                state: self.state,
            });
        };

        let capabilities = transport.query_capabilities()?;
        let shape = if capabilities.supports_m2m_mplane() {
            BufferShape::MultiPlanar
        } else if capabilities.supports_m2m() {
            BufferShape::SinglePlanar
        } else {
            return Err(Error::CapabilityMissing(format!(
                "'{}' is not a memory-to-memory device",
                capabilities.card
            )));
        };
        let input = QueueType::new(Direction::Input, shape);
        let output = QueueType::new(Direction::Output, shape);

        let memory = MemoryKind::Mmap;
        let buffer_caps = transport.buffer_capabilities(input, memory)?;
        if !buffer_caps.supports(memory) {
            return Err(Error::CapabilityMissing(
                "memory-mapped buffers on the raw queue".into(),
            ));
        }
        if !buffer_caps.supports_requests() {
            return Err(Error::CapabilityMissing("requests on the raw queue".into()));
        }

        let mut coded_formats = Vec::new();
        for index in 0..MAX_ENUM_FORMATS {
            match transport.enum_format(output, index)? {
                Some(format) => coded_formats.push(format),
                None => break,
            }
        }
        if !coded_formats.contains(&CODED_FORMAT) {
            return Err(Error::CapabilityMissing(format!(
                "{CODED_FORMAT} on the coded queue"
            )));
        }

        info!(
            driver = %capabilities.driver,
            card = %capabilities.card,
            ?shape,
            "Probed encoder"
        );
        Ok(&*self.probe.insert(ProbeInfo {
            capabilities,
            shape,
            memory,
            coded_formats,
        }))
    }

    /// Negotiates formats, allocates both pools and applies the encoder controls.
    ///
    /// Probes first if [`EncoderSession::probe`] has not run. When the device
    /// aligns the raw frame size, a crop rectangle restores the requested
    /// visible area.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is `Opened`; an earlier
    ///   configuration is left intact
    /// - [`Error::InvalidArgument`] if `setup` fails validation
    /// - Any probe or transport error. Pools allocated so far are released
    ///   before returning and the session stays `Opened`.
    pub fn configure(&mut self, setup: &EncoderSetup) -> Result<()> {
        self.check_state("configure", &[SessionState::Opened])?;
        setup.validate()?;
        if self.probe.is_none() {
            self.probe()?;
        }
        let (input_q, output_q) = self.queues("configure")?;
        let memory = MemoryKind::Mmap;
        let count = self.options.buffer_count;
        let coded_size = self.options.coded_buffer_size;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::InvalidState {
                operation: "configure",
                state: self.state,
            });
        };

        let coded_request =
            Format::new(setup.width, setup.height, CODED_FORMAT).with_plane(0, coded_size);
        let coded = transport.set_format(output_q, &coded_request)?;
        debug!(?coded, "Coded format set");

        let raw_request = Format::new(setup.width, setup.height, setup.pixel_format);
        transport.set_format(input_q, &raw_request)?;
        let raw = transport.get_format(input_q)?;
        if raw.pixel_format != setup.pixel_format {
            return Err(Error::CapabilityMissing(format!(
                "raw input format {} (device chose {})",
                setup.pixel_format, raw.pixel_format
            )));
        }
        if !raw.same_size(&raw_request) {
            let crop = transport.set_selection(
                input_q,
                SelectionTarget::Crop,
                Rect::from_size(setup.width, setup.height),
            )?;
            debug!(
                aligned_width = raw.width,
                aligned_height = raw.height,
                ?crop,
                "Device aligned raw frame size, cropping"
            );
        }

        let mut output_pool = BufferPool::allocate(transport, output_q, memory, &coded, count)?;
        let mut input_pool = match BufferPool::allocate(transport, input_q, memory, &raw, count) {
            Ok(pool) => pool,
            Err(e) => {
                output_pool.release_quietly(transport);
                return Err(e);
            }
        };

        if let Err(e) = apply_setup(transport, input_q, setup) {
            input_pool.release_quietly(transport);
            output_pool.release_quietly(transport);
            return Err(e);
        }

        info!(
            width = raw.width,
            height = raw.height,
            format = %raw.pixel_format,
            fps = setup.fps,
            slots = input_pool.len(),
            "Encoder configured"
        );
        self.input_format = Some(raw);
        self.output_format = Some(coded);
        self.input_pool = Some(input_pool);
        self.output_pool = Some(output_pool);
        self.setup = Some(setup.clone());
        self.frame_counter = 0;
        self.last_completed_output = None;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Turns on both queues.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless `Configured` (including when already
    /// streaming). If the coded queue fails to start, the raw queue is turned
    /// back off.
    pub fn start(&mut self) -> Result<()> {
        self.check_state("start", &[SessionState::Configured])?;
        let (input_q, output_q) = self.queues("start")?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state,
            });
        };

        transport.stream_on(input_q)?;
        if let Err(e) = transport.stream_on(output_q) {
            if let Err(off) = transport.stream_off(input_q) {
                warn!(queue = %input_q, "Stream off after failed start: {off}");
            }
            return Err(e);
        }

        self.state = SessionState::Streaming;
        info!("Streaming started");
        Ok(())
    }

    /// Encodes one frame.
    ///
    /// `fill` receives the next raw slot to write pixel content into. The slot is
    /// submitted with timestamp `frame_counter * TIMESTAMP_UNIT_NS` together with
    /// the next coded slot, and the call waits for both to complete.
    ///
    /// If an earlier call returned [`Error::Timeout`], its pair is still in
    /// flight: this call reaps that pair without submitting a new one, and `fill`
    /// is not invoked.
    ///
    /// # Returns
    ///
    /// The coded frame. A frame the device flagged as errored is returned with an
    /// empty payload and `errored` set; `frame_counter` still advances.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the device did not complete in time. Nothing is
    ///   torn down; call again to keep waiting.
    /// - [`Error::ProtocolDesync`] if a dequeued slot is not the one submitted.
    ///   `frame_counter` is left unchanged.
    /// - [`Error::Transport`] for any failing kernel call.
    pub fn run_once<F>(&mut self, fill: F) -> Result<EncodedFrame<'_>>
    where
        F: FnOnce(&mut RawFrame<'_>),
    {
        self.check_state("run_once", &[SessionState::Streaming])?;
        let started = Instant::now();

        match self.in_flight {
            None => self.submit_input(fill)?,
            Some(pending) => {
                debug!(frame = pending.frame, "Reaping outstanding frame");
            }
        }
        if self.in_flight.is_some_and(|pending| pending.output.is_none()) {
            self.submit_output()?;
        }

        let (submitted, completed) = self.reap()?;
        debug!(
            frame = submitted,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Encode run took"
        );

        let frame_number = completed.timestamp_ns / TIMESTAMP_UNIT_NS;
        if frame_number != submitted {
            debug!(
                submitted,
                recovered = frame_number,
                "Coded timestamp does not match the submitted frame"
            );
        }
        let kind = FrameKind::from_flags(completed.flags);
        let errored = completed.flags.is_error();
        self.frame_counter += 1;
        self.last_completed_output = Some(completed.index);

        let payload: &[u8] = if errored {
            warn!(
                frame = frame_number,
                slot = completed.index,
                "Device flagged coded frame as errored"
            );
            &[]
        } else {
            let used = completed.bytes_used.first().copied().unwrap_or(0) as usize;
            let data = self
                .output_pool
                .as_ref()
                .and_then(|pool| pool.buffer(completed.index))
                .and_then(|buffer| buffer.plane_data(0))
                .unwrap_or(&[]);
            debug!(
                frame = frame_number,
                slot = completed.index,
                bytes = used,
                ?kind,
                "Coded frame"
            );
            &data[..used.min(data.len())]
        };

        Ok(EncodedFrame {
            frame_number,
            slot: completed.index,
            sequence: completed.sequence,
            kind,
            errored,
            payload,
        })
    }

    fn submit_input<F>(&mut self, fill: F) -> Result<()>
    where
        F: FnOnce(&mut RawFrame<'_>),
    {
        let (input_q, _) = self.queues("run_once")?;
        let frame = self.frame_counter;
        let force_keyframe = self.force_keyframe;
        let state = self.state;
        let missing = || Error::InvalidState {
            operation: "run_once",
            state,
        };
        let transport = self.transport.as_mut().ok_or_else(missing)?;
        let pool = self.input_pool.as_mut().ok_or_else(missing)?;
        let memory = pool.memory();
        let slot = pool.next_slot().ok_or_else(missing)?;
        if let Some(position) = self.stale_requests.iter().position(|s| *s == slot) {
            if let Some(request) = pool.buffer(slot).and_then(|b| b.request()) {
                transport.reinit_request(request)?;
            }
            self.stale_requests.swap_remove(position);
            debug!(slot, "Reinitialised stale request");
        }
        let (buffer, format) = pool.slot_with_format(slot).ok_or_else(missing)?;

        let planes: Vec<&mut [u8]> = buffer
            .planes_mut()
            .iter_mut()
            .filter_map(|plane| plane.data_mut())
            .collect();
        fill(&mut RawFrame::new(planes, format, frame, slot));

        let bytes_used = buffer.plane_lengths();
        let request = buffer.request();
        let submission = Submission {
            queue: input_q,
            memory,
            index: slot,
            bytes_used: bytes_used.clone(),
            timestamp_ns: frame * TIMESTAMP_UNIT_NS,
            request,
        };

        let force: Control = EncoderControl::ForceKeyFrame.into();
        let staged = match (force_keyframe, request) {
            (true, Some(request)) => transport.set_ext_controls(&[force], Some(request)),
            (true, None) => transport.set_control(force),
            (false, _) => Ok(()),
        };
        let queued = staged
            .and_then(|()| transport.queue_buffer(&submission))
            .and_then(|()| match request {
                Some(request) => transport.queue_request(request),
                None => Ok(()),
            });
        if let Err(e) = queued {
            if let Some(request) = request
                && let Err(reinit) = transport.reinit_request(request)
            {
                warn!(slot, "Reinitialising request after failed submission: {reinit}");
            }
            return Err(e);
        }

        buffer.mark_queued(&bytes_used);
        debug!(frame, slot, keyframe = force_keyframe, "Queued raw frame");
        self.force_keyframe = false;
        self.in_flight = Some(InFlight {
            frame,
            input: slot,
            output: None,
            input_reaped: false,
        });
        Ok(())
    }

    fn submit_output(&mut self) -> Result<()> {
        let (_, output_q) = self.queues("run_once")?;
        let state = self.state;
        let missing = || Error::InvalidState {
            operation: "run_once",
            state,
        };
        let transport = self.transport.as_mut().ok_or_else(missing)?;
        let pool = self.output_pool.as_mut().ok_or_else(missing)?;
        let pending = self.in_flight.as_mut().ok_or_else(missing)?;
        let memory = pool.memory();
        let slot = pool.next_slot().ok_or_else(missing)?;
        let buffer = pool.buffer_mut(slot).ok_or_else(missing)?;

        let bytes_used = vec![0; buffer.planes().len()];
        transport.queue_buffer(&Submission {
            queue: output_q,
            memory,
            index: slot,
            bytes_used: bytes_used.clone(),
            timestamp_ns: 0,
            request: None,
        })?;
        buffer.mark_queued(&bytes_used);
        pending.output = Some(slot);
        debug!(frame = pending.frame, slot, "Queued coded buffer");
        Ok(())
    }

    /// Waits for and dequeues the in-flight pair, checking both slot indices.
    fn reap(&mut self) -> Result<(u64, CompletedBuffer)> {
        let (input_q, output_q) = self.queues("run_once")?;
        let timeout = self.options.poll_timeout();
        let retries = self.options.dequeue_retries;
        let state = self.state;
        let missing = || Error::InvalidState {
            operation: "run_once",
            state,
        };
        let transport = self.transport.as_mut().ok_or_else(missing)?;
        let input_pool = self.input_pool.as_mut().ok_or_else(missing)?;
        let output_pool = self.output_pool.as_mut().ok_or_else(missing)?;
        let pending = self.in_flight.as_mut().ok_or_else(missing)?;
        let expected_output = pending.output.ok_or_else(missing)?;

        if !transport.poll(timeout)? {
            trace!(frame = pending.frame, "Wait for completion timed out");
            return Err(Error::Timeout);
        }

        if !pending.input_reaped {
            let done =
                dequeue_with_retry(transport, input_q, input_pool.memory(), timeout, retries)?;
            if done.index != pending.input {
                return Err(Error::ProtocolDesync {
                    direction: Direction::Input,
                    expected: pending.input,
                    actual: done.index,
                });
            }
            pending.input_reaped = true;
            if let Some(buffer) = input_pool.buffer_mut(done.index) {
                buffer.mark_done(&done.bytes_used);
                // The coded half is still owed to the caller; the request is
                // retried before the slot is reused.
                if let Some(request) = buffer.request()
                    && let Err(e) = transport.reinit_request(request)
                {
                    warn!(slot = done.index, "Reinitialising completed request: {e}");
                    self.stale_requests.push(done.index);
                }
            }
            trace!(frame = pending.frame, slot = done.index, "Reaped raw frame");
        }

        let done = dequeue_with_retry(transport, output_q, output_pool.memory(), timeout, retries)?;
        if done.index != expected_output {
            return Err(Error::ProtocolDesync {
                direction: Direction::Output,
                expected: expected_output,
                actual: done.index,
            });
        }
        if let Some(buffer) = output_pool.buffer_mut(done.index) {
            buffer.mark_done(&done.bytes_used);
        }

        let submitted = pending.frame;
        self.in_flight = None;
        Ok((submitted, done))
    }

    /// Forces the next submitted frame to be coded as a keyframe.
    pub fn request_keyframe(&mut self) -> Result<()> {
        self.check_state(
            "request_keyframe",
            &[
                SessionState::Opened,
                SessionState::Configured,
                SessionState::Streaming,
            ],
        )?;
        self.force_keyframe = true;
        debug!(frame = self.frame_counter, "Keyframe requested");
        Ok(())
    }

    /// Turns off both queues, abandoning any in-flight pair.
    pub fn stop(&mut self) -> Result<()> {
        self.check_state("stop", &[SessionState::Streaming])?;
        let (input_q, output_q) = self.queues("stop")?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::InvalidState {
                operation: "stop",
                state: self.state,
            });
        };

        let input = transport.stream_off(input_q);
        let output = transport.stream_off(output_q);

        if let Some(pool) = self.input_pool.as_mut() {
            // Requests of abandoned raw slots complete on stream off.
            if let Some(pending) = self.in_flight.take()
                && !pending.input_reaped
                && let Some(request) = pool.buffer(pending.input).and_then(|b| b.request())
                && let Err(e) = transport.reinit_request(request)
            {
                warn!(slot = pending.input, "Reinitialising abandoned request: {e}");
            }
            pool.abandon_all();
        }
        if let Some(pool) = self.output_pool.as_mut() {
            pool.abandon_all();
        }
        self.in_flight = None;
        self.state = SessionState::Configured;
        info!(frames = self.frame_counter, "Streaming stopped");
        input.and(output)
    }

    /// Releases both pools and closes the device. Legal in every state.
    ///
    /// Slots that were never dequeued are released without waiting for them.
    /// Teardown continues past failures; the first one is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let mut first_error = None;
        if self.state == SessionState::Streaming
            && let Err(e) = self.stop()
        {
            warn!("Stopping stream during close: {e}");
            first_error.get_or_insert(e);
        }

        if let Some(transport) = self.transport.as_mut() {
            for pool in [self.input_pool.as_mut(), self.output_pool.as_mut()]
                .into_iter()
                .flatten()
            {
                if let Err(e) = pool.release(transport) {
                    warn!(queue = %pool.queue(), "Releasing buffer pool during close: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        self.input_pool = None;
        self.output_pool = None;
        self.in_flight = None;
        self.force_keyframe = false;
        self.stale_requests.clear();
        self.transport = None;
        self.state = SessionState::Closed;
        info!(frames = self.frame_counter, "Encoder session closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of frames completed since the session was configured.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// The raw format the device accepted.
    pub fn input_format(&self) -> Option<&Format> {
        self.input_format.as_ref()
    }

    pub fn output_format(&self) -> Option<&Format> {
        self.output_format.as_ref()
    }

    pub fn probe_info(&self) -> Option<&ProbeInfo> {
        self.probe.as_ref()
    }

    pub fn setup(&self) -> Option<&EncoderSetup> {
        self.setup.as_ref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn input_pool(&self) -> Option<&BufferPool<T>> {
        self.input_pool.as_ref()
    }

    pub fn output_pool(&self) -> Option<&BufferPool<T>> {
        self.output_pool.as_ref()
    }

    /// Output slot of the most recently completed coded frame.
    pub fn last_completed_output(&self) -> Option<u32> {
        self.last_completed_output
    }

    /// Raw and coded slots of a pair still waiting to be reaped.
    pub fn in_flight_slots(&self) -> Option<(u32, Option<u32>)> {
        self.in_flight.map(|pending| (pending.input, pending.output))
    }

    pub fn keyframe_pending(&self) -> bool {
        self.force_keyframe
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }
}

impl<T: Transport> Drop for EncoderSession<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed
            && let Err(e) = self.close()
        {
            error!("Failed to close encoder session: {e}");
        }
    }
}

fn apply_setup<T: Transport>(
    transport: &mut T,
    input_q: QueueType,
    setup: &EncoderSetup,
) -> Result<()> {
    for control in setup_controls(setup) {
        trace!(?control, "Setting control");
        transport.set_control(control.into())?;
    }
    let applied = transport.set_frame_interval(input_q, Fraction::new(1, setup.fps))?;
    debug!(interval = %applied, "Frame interval set");
    Ok(())
}

/// Dequeues from `queue`, waiting between "not ready" results up to `retries` times.
fn dequeue_with_retry<T: Transport>(
    transport: &mut T,
    queue: QueueType,
    memory: MemoryKind,
    timeout: std::time::Duration,
    retries: u32,
) -> Result<CompletedBuffer> {
    let mut attempts = 0;
    loop {
        if let Some(done) = transport.dequeue_buffer(queue, memory)? {
            return Ok(done);
        }
        if attempts >= retries {
            trace!(%queue, attempts, "Nothing to dequeue, giving up");
            return Err(Error::Timeout);
        }
        attempts += 1;
        trace!(%queue, attempts, "Nothing ready to dequeue yet");
        if !transport.poll(timeout)? {
            return Err(Error::Timeout);
        }
    }
}
