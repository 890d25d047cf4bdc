// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # v4l2-enc-sys: Raw kernel UAPI for V4L2 memory-to-memory encoders
//!
//! This crate provides the Linux video (`linux/videodev2.h`) and media-controller
//! (`linux/media.h`) userspace ABI, generated with `bindgen` from the kernel
//! headers at build time.
//!
//! ## Overview
//!
//! `v4l2-enc-sys` exposes:
//! - `#[repr(C)]` structures with the kernel layouts (`v4l2_format`,
//!   `v4l2_buffer`, `media_v2_topology`, ...)
//! - Constants for buffer types, memory kinds, capability bits, buffer flags,
//!   control identifiers and media entity functions
//!
//! Function-like macros such as `v4l2_fourcc()` and the `VIDIOC_*` request codes
//! are not part of the generated output; the safe crate builds its ioctl
//! wrappers from the structure types here.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `v4l2-enc`
//! crate instead, which provides:
//! - RAII ownership of device handles, mapped planes and request handles
//! - Rust-idiomatic error handling with `Result`
//! - A typed encoder session state machine
//!
//! ## Build Process
//!
//! The headers come from the system include path (`linux-libc-dev` or the
//! distribution equivalent). Set `V4L2_ENC_SYS_INCLUDE_DIR` to generate against
//! another kernel header tree, e.g. when cross-compiling.

// Suppress expected warnings from bindgen-generated code.
// See https://github.com/rust-lang/rust-bindgen/issues/1651.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(rustdoc::broken_intra_doc_links)]
#![allow(rustdoc::invalid_html_tags)]
#![allow(deref_nullptr)]
#![allow(clippy::missing_safety_doc)]

// Include bindgen-generated bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
