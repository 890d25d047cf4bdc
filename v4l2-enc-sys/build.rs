// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for the `v4l2-enc-sys` FFI crate.
//!
//! Generates Rust layouts for the video (`linux/videodev2.h`) and media
//! controller (`linux/media.h`) userspace headers with `bindgen`. The headers
//! are taken from the system include path unless `V4L2_ENC_SYS_INCLUDE_DIR`
//! points at another kernel header tree.

use std::env;
use std::path::PathBuf;

const HEADER: &str = "wrapper.h";
const INCLUDE_DIR_VAR: &str = "V4L2_ENC_SYS_INCLUDE_DIR";

fn main() {
    println!("cargo:rerun-if-changed={HEADER}");
    println!("cargo:rerun-if-env-changed={INCLUDE_DIR_VAR}");

    let mut builder = bindgen::builder()
        .header(HEADER)
        .allowlist_type("v4l2_.*")
        .allowlist_type("media_device_info")
        .allowlist_type("media_v2_.*")
        .allowlist_var("V4L2_.*")
        .allowlist_var("VIDEO_MAX_PLANES")
        .allowlist_var("MEDIA_(ENT_F|PAD_FL|LNK_FL|INTF_T)_.*")
        .derive_default(true)
        .derive_debug(true)
        .prepend_enum_name(false)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()));

    if let Ok(include_dir) = env::var(INCLUDE_DIR_VAR) {
        builder = builder.clang_arg(format!("-I{include_dir}"));
    }

    let bindings = builder
        .generate()
        .expect("failed to generate V4L2 bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Could not write bindings");
}
