// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encoder configuration.
//!
//! [`EncoderConfig`] bundles everything needed to bring up an encoder: which media
//! device to accept, the stream parameters handed to
//! [`crate::EncoderSession::configure`], and the session tuning knobs. It loads from
//! JSON, with every field optional:
//!
//! ```json
//! {
//!   "device": { "driver": "hantro-vpu" },
//!   "setup": { "width": 1920, "height": 1080, "pixel_format": "NV12M", "fps": 30 },
//!   "session": { "buffer_count": 4, "poll_timeout_ms": 500 }
//! }
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, format::FourCc};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub device: DeviceConfig,
    pub setup: EncoderSetup,
    pub session: SessionOptions,
}

/// Constraints on which media device is accepted during discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Only accept media roots whose driver name equals this value.
    pub driver: Option<String>,
}

/// Stream parameters applied by [`crate::EncoderSession::configure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderSetup {
    pub width: u32,
    pub height: u32,
    /// Raw input pixel format.
    pub pixel_format: FourCc,
    /// Frames per second; the raw queue's frame interval becomes `1/fps`.
    pub fps: u32,
    /// Quantiser for intra frames.
    pub qp_i: u32,
    /// Quantiser for predicted frames.
    pub qp_p: u32,
    /// Closed GOP: keyframe cadence is set through the GOP size control
    /// rather than the H.264 I-frame period.
    pub gop_closure: bool,
    pub gop_size: u32,
}

impl Default for EncoderSetup {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            pixel_format: FourCc::NV12,
            fps: 25,
            qp_i: 24,
            qp_p: 26,
            gop_closure: false,
            gop_size: 3,
        }
    }
}

impl EncoderSetup {
    /// Checks that every parameter is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero width, height, frame rate,
    /// quantiser or GOP size.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidArgument(format!(
                "frame size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(Error::InvalidArgument("fps must be non-zero".into()));
        }
        if self.qp_i == 0 || self.qp_p == 0 {
            return Err(Error::InvalidArgument(format!(
                "quantisers must be non-zero (I={}, P={})",
                self.qp_i, self.qp_p
            )));
        }
        if self.gop_size == 0 {
            return Err(Error::InvalidArgument("gop_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Tuning knobs for the buffer pools and the per-frame wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Slots requested per queue.
    pub buffer_count: u32,
    /// Size budget for each coded output buffer, in bytes.
    pub coded_buffer_size: u32,
    /// Bound on each wait for the device.
    pub poll_timeout_ms: u64,
    /// How many "not ready" dequeue results are tolerated per queue before the
    /// iteration reports [`Error::Timeout`].
    pub dequeue_retries: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            buffer_count: 3,
            coded_buffer_size: 2 * 1024 * 1024,
            poll_timeout_ms: 300,
            dequeue_retries: 16,
        }
    }
}

impl SessionOptions {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(Error::InvalidArgument("buffer_count must be non-zero".into()));
        }
        if self.coded_buffer_size == 0 {
            return Err(Error::InvalidArgument(
                "coded_buffer_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl EncoderConfig {
    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed JSON or unknown fields, and
    /// [`Error::InvalidArgument`] if the values fail [`EncoderConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EncoderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(driver) = &self.device.driver
            && driver.is_empty()
        {
            return Err(Error::InvalidArgument(
                "device.driver must not be empty when set".into(),
            ));
        }
        self.setup.validate()?;
        self.session.validate()
    }
}
