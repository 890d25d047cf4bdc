// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Loading and validating encoder configuration.

use std::time::Duration;

use v4l2_enc::{EncoderConfig, EncoderSetup, Error, FourCc, SessionOptions};

#[test]
fn empty_document_yields_defaults() {
    let config = EncoderConfig::from_json_str("{}").expect("defaults");
    assert_eq!(config, EncoderConfig::default());

    assert_eq!(config.device.driver, None);
    assert_eq!((config.setup.width, config.setup.height), (1280, 720));
    assert_eq!(config.setup.pixel_format, FourCc::NV12);
    assert_eq!(config.setup.fps, 25);
    assert_eq!((config.setup.qp_i, config.setup.qp_p), (24, 26));
    assert!(!config.setup.gop_closure);
    assert_eq!(config.setup.gop_size, 3);
    assert_eq!(config.session.buffer_count, 3);
    assert_eq!(config.session.coded_buffer_size, 2 * 1024 * 1024);
    assert_eq!(config.session.poll_timeout(), Duration::from_millis(300));
    assert_eq!(config.session.dequeue_retries, 16);
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let config = EncoderConfig::from_json_str(
        r#"{
            "device": { "driver": "hantro-vpu" },
            "setup": { "width": 1920, "height": 1080, "pixel_format": "NV12M", "gop_closure": true },
            "session": { "buffer_count": 4, "poll_timeout_ms": 500 }
        }"#,
    )
    .expect("valid config");

    assert_eq!(config.device.driver.as_deref(), Some("hantro-vpu"));
    assert_eq!(config.setup.pixel_format, FourCc::NV12M);
    assert!(config.setup.gop_closure);
    assert_eq!(config.setup.fps, 25);
    assert_eq!(config.session.buffer_count, 4);
    assert_eq!(config.session.poll_timeout(), Duration::from_millis(500));
    assert_eq!(config.session.dequeue_retries, 16);
}

#[test]
fn pixel_format_accepts_code_or_symbolic_name() {
    for (text, expected) in [
        ("NM12", FourCc::NV12M),
        ("NV12M", FourCc::NV12M),
        ("YU12", FourCc::YUV420),
        ("YUV420M", FourCc::YUV420M),
    ] {
        let json = format!(r#"{{ "setup": {{ "pixel_format": "{text}" }} }}"#);
        let config = EncoderConfig::from_json_str(&json).expect(text);
        assert_eq!(config.setup.pixel_format, expected, "{text}");
    }
}

#[test]
fn pixel_format_round_trips_as_text() {
    let setup = EncoderSetup {
        pixel_format: FourCc::YUV420M,
        ..Default::default()
    };
    let json = serde_json::to_string(&setup).expect("serialize");
    assert!(json.contains(r#""pixel_format":"YM12""#), "{json}");
}

#[test]
fn malformed_documents_are_json_errors() {
    for json in [
        r#"{ "setup": { "widht": 640 } }"#,
        r#"{ "setup": { "pixel_format": "NV1" } }"#,
        r#"{ "session": { "buffer_count": -1 } }"#,
        "not json",
    ] {
        let err = EncoderConfig::from_json_str(json).expect_err(json);
        assert!(matches!(err, Error::Json(_)), "{json}: {err}");
    }
}

#[test]
fn zero_values_fail_validation() {
    for json in [
        r#"{ "setup": { "width": 0 } }"#,
        r#"{ "setup": { "fps": 0 } }"#,
        r#"{ "setup": { "qp_p": 0 } }"#,
        r#"{ "setup": { "gop_size": 0 } }"#,
        r#"{ "session": { "buffer_count": 0 } }"#,
        r#"{ "session": { "coded_buffer_size": 0 } }"#,
        r#"{ "device": { "driver": "" } }"#,
    ] {
        let err = EncoderConfig::from_json_str(json).expect_err(json);
        assert!(matches!(err, Error::InvalidArgument(_)), "{json}: {err}");
    }
}

#[test]
fn options_validate_independently() {
    let options = SessionOptions {
        buffer_count: 0,
        ..Default::default()
    };
    assert!(matches!(options.validate(), Err(Error::InvalidArgument(_))));
    assert!(SessionOptions::default().validate().is_ok());
}

#[test]
fn config_loads_from_file() {
    let path = std::env::temp_dir().join(format!("v4l2_enc_config_{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "setup": { "fps": 50 } }"#).expect("write config");

    let loaded = EncoderConfig::from_file(&path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded.expect("load").setup.fps, 50);

    let err = EncoderConfig::from_file(&path).expect_err("file is gone");
    assert!(matches!(err, Error::Config(_)), "{err}");
}
