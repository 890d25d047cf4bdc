// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # v4l2-enc - stateful V4L2 hardware encoder control
//!
//! A synchronous control plane for memory-to-memory H.264 encoders exposed through
//! the Linux Video4Linux2 and media-controller interfaces.
//!
//! ## Overview
//!
//! An encoder device has two buffer queues: raw frames go in on one, the coded
//! bitstream comes out of the other. This crate finds such a device, negotiates
//! formats on both queues, allocates and maps their buffers, and drives the
//! device one frame at a time.
//!
//! ### Key Concepts
//!
//! - **Media root**: a `/dev/mediaN` node exposing a graph of entities, pads,
//!   links and interfaces ([`topology::MediaGraph`])
//! - **Resolution**: walking that graph from the encoder entity to the video node
//!   that streams to it ([`topology::resolve`], [`topology::discover`])
//! - **Buffer pool**: the fixed set of mapped slots of one queue ([`buffer::BufferPool`])
//! - **Request**: an atomic batch binding per-frame controls to one raw submission
//! - **Session**: the lifecycle state machine tying it together ([`EncoderSession`])
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   discover/resolve   ┌────────────────┐
//! │  MediaBus  │ ───────────────────► │ ResolvedDevice │
//! └─────┬──────┘                      └───────┬────────┘
//!       │ open                                │
//!       ▼                                     │
//! ┌────────────┐      owns      ┌─────────────▼──┐      owns     ┌────────────┐
//! │ Transport  │ ◄───────────── │ EncoderSession │ ────────────► │ BufferPool │ x2
//! └────────────┘                └────────┬───────┘               └────────────┘
//!                                        │ run_once
//!                              RawFrame ─┴─► EncodedFrame ──► BitstreamWriter
//! ```
//!
//! [`Transport`] and [`MediaBus`] are the seams to the kernel. The [`device`]
//! module implements them with ioctls, `mmap` and sysfs; tests substitute
//! in-memory devices.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//!
//! use v4l2_enc::{
//!     BitstreamWriter, EncoderConfig, EncoderSession, EntityFunction, device::SysfsMediaBus,
//! };
//!
//! # fn main() -> Result<(), v4l2_enc::Error> {
//! let config = EncoderConfig::from_file("encoder.json")?;
//! let mut session = EncoderSession::open(
//!     &mut SysfsMediaBus::new(),
//!     EntityFunction::ENCODER,
//!     &config.device,
//!     config.session.clone(),
//! )?;
//! session.configure(&config.setup)?;
//! session.start()?;
//!
//! let mut sink = BitstreamWriter::new(File::create("out.h264")?);
//! for _ in 0..100 {
//!     let frame = session.run_once(|raw| {
//!         for plane in raw.planes_mut() {
//!             plane.fill(0x80);
//!         }
//!     })?;
//!     sink.write_frame(&frame)?;
//! }
//! session.close()?;
//! sink.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Nothing here is internally synchronized. A session and everything it owns
//! belong to one thread at a time.

mod error;

pub mod bitstream;
pub mod buffer;
pub mod config;
pub mod controls;
pub mod device;
pub mod format;
pub mod frame;
pub mod session;
pub mod topology;
pub mod transport;

pub use bitstream::{BitstreamWriter, NalUnitType, nal_units};
pub use config::{DeviceConfig, EncoderConfig, EncoderSetup, SessionOptions};
pub use error::{Error, Result};
pub use format::{Direction, Format, FourCc, MemoryKind, QueueType};
pub use frame::{EncodedFrame, FrameKind, OwnedEncodedFrame, RawFrame};
pub use session::{EncoderSession, ProbeInfo, SessionState};
pub use topology::{EntityFunction, MediaBus, ResolvedDevice};
pub use transport::Transport;
