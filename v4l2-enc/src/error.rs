// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for encoder operations.
//!
//! This module defines the error type returned by every fallible call in the
//! crate, mapping raw kernel return codes to idiomatic Rust error variants.

use std::{io, path::PathBuf};

use crate::{format::Direction, session::SessionState};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while discovering, configuring or driving an encoder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A null, zero-sized or otherwise unusable argument was supplied.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current lifecycle state.
    #[error("Operation '{operation}' is not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A single step of the topology walk did not find the record it needs.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No candidate media root exposes a device implementing the requested function.
    #[error("No matching encoder device found")]
    DeviceNotFound,

    /// A device node could not be opened.
    #[error("Failed to open {}: {source}", .path.display())]
    OpenFailed { path: PathBuf, source: io::Error },

    /// The device lacks a capability the encoder requires.
    #[error("Missing capability: {0}")]
    CapabilityMissing(String),

    /// A kernel transport call failed with the given errno.
    #[error("{operation} failed: {}", describe_errno(.code))]
    Transport { operation: &'static str, code: i32 },

    /// Nothing became ready before the wait timed out. The caller may retry.
    #[error("Timeout")]
    Timeout,

    /// A dequeued slot does not match the slot that was submitted on that queue.
    #[error("Protocol desync on {direction} queue: expected slot {expected}, dequeued {actual}")]
    ProtocolDesync {
        direction: Direction,
        expected: u32,
        actual: u32,
    },

    /// The device flagged the coded buffer for a frame as errored.
    #[error("Device reported an error encoding frame {frame}")]
    EncodeFrame { frame: u64 },

    /// The configuration could not be interpreted.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_errno(code: &i32) -> String {
    format!("{} (errno {code})", io::Error::from_raw_os_error(*code))
}

impl Error {
    /// Converts a kernel return code into an [`Error`].
    ///
    /// Both plain errno values and the negated form returned by kernel-style
    /// interfaces are accepted.
    ///
    /// # Arguments
    ///
    /// * `operation` - Name of the transport call that failed, kept for diagnostics
    /// * `code` - The errno (or negated errno) it returned
    ///
    /// # Returns
    ///
    /// - [`Error::Timeout`] for `ETIMEDOUT`
    /// - [`Error::Transport`] carrying the positive errno for anything else
    pub fn from_errno(operation: &'static str, code: i32) -> Error {
        let code = code.saturating_abs();
        match code {
            libc::ETIMEDOUT => Error::Timeout,
            code => Error::Transport { operation, code },
        }
    }

    /// Returns the errno carried by a transport failure.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Transport { code, .. } => Some(*code),
            Error::OpenFailed { source, .. } | Error::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true for errors after which a driving loop must give up.
    ///
    /// Device discovery and capability failures cannot be cured by retrying, and a
    /// protocol desync means the queue pairing can no longer be trusted.
    /// [`Error::Timeout`] and [`Error::EncodeFrame`] are per-iteration outcomes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound | Error::CapabilityMissing(_) | Error::ProtocolDesync { .. }
        )
    }
}
