// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encodes a moving test pattern on the first hardware H.264 encoder found and
//! writes the elementary stream to a file.

mod pattern;

use std::{fs::File, io::BufWriter, path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{debug, error, info, warn};
use v4l2_enc::{
    BitstreamWriter, EncoderConfig, EncoderSession, Error, FourCc, Result,
    device::SysfsMediaBus, topology::EntityFunction,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file; command-line values override it.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Only accept media devices handled by this driver.
    #[arg(long)]
    driver: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Raw pixel format, as a code or name (NV12, NM12/NV12M, YU12/YUV420 or YM12/YUV420M).
    #[arg(long)]
    format: Option<FourCc>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long)]
    qp_i: Option<u32>,

    #[arg(long)]
    qp_p: Option<u32>,

    /// Use a closed GOP of `--gop-size` frames.
    #[arg(long)]
    gop_closure: bool,

    #[arg(long)]
    gop_size: Option<u32>,

    /// Buffer slots per queue.
    #[arg(long)]
    buffers: Option<u32>,

    /// Number of frames to encode.
    #[arg(long, short = 'n', default_value_t = 300)]
    frames: u64,

    /// Force a keyframe every N frames on top of the GOP cadence.
    #[arg(long)]
    keyframe_every: Option<u64>,

    /// Consecutive device timeouts tolerated before giving up.
    #[arg(long, default_value_t = 10)]
    max_timeouts: u32,

    /// Output file for the H.264 elementary stream.
    #[arg(long, short, default_value = "bitstream.bin")]
    output: PathBuf,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

fn load_config(args: &Args) -> Result<EncoderConfig> {
    let mut config = match &args.config {
        Some(path) => EncoderConfig::from_file(path)?,
        None => EncoderConfig::default(),
    };

    if let Some(driver) = &args.driver {
        config.device.driver = Some(driver.clone());
    }
    let setup = &mut config.setup;
    setup.width = args.width.unwrap_or(setup.width);
    setup.height = args.height.unwrap_or(setup.height);
    setup.pixel_format = args.format.unwrap_or(setup.pixel_format);
    setup.fps = args.fps.unwrap_or(setup.fps);
    setup.qp_i = args.qp_i.unwrap_or(setup.qp_i);
    setup.qp_p = args.qp_p.unwrap_or(setup.qp_p);
    setup.gop_closure |= args.gop_closure;
    setup.gop_size = args.gop_size.unwrap_or(setup.gop_size);
    config.session.buffer_count = args.buffers.unwrap_or(config.session.buffer_count);

    config.validate()?;
    if !pattern::SUPPORTED_FORMATS.contains(&config.setup.pixel_format) {
        return Err(Error::InvalidArgument(format!(
            "no test pattern for pixel format {}",
            config.setup.pixel_format
        )));
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    let mut bus = SysfsMediaBus::new();
    let mut session = EncoderSession::open(
        &mut bus,
        EntityFunction::ENCODER,
        &config.device,
        config.session.clone(),
    )?;
    session.configure(&config.setup)?;
    if let Some(format) = session.input_format() {
        info!(
            width = format.width,
            height = format.height,
            pixel_format = %format.pixel_format,
            planes = format.planes.len(),
            "Raw format negotiated"
        );
    }
    session.start()?;

    let mut writer = BitstreamWriter::new(BufWriter::new(File::create(&args.output)?));
    let mut step: u32 = 0;
    let mut timeouts = 0;

    while writer.frames() + writer.skipped() < args.frames {
        let submitted = session.frame_counter();
        if args
            .keyframe_every
            .is_some_and(|every| every > 0 && submitted > 0 && submitted % every == 0)
            && session.in_flight_slots().is_none()
        {
            session.request_keyframe()?;
        }

        let pattern_step = step;
        match session.run_once(move |frame| pattern::fill(frame, pattern_step)) {
            Ok(frame) => {
                timeouts = 0;
                step = step.wrapping_add(1);
                if let Some(err) = frame.error() {
                    warn!(%err, "Dropping errored frame");
                }
                debug!(
                    frame = frame.frame_number,
                    kind = ?frame.kind,
                    bytes = frame.len(),
                    "Encoded frame"
                );
                writer.write_frame(&frame)?;
            }
            Err(Error::Timeout) => {
                timeouts += 1;
                debug!(timeouts, "Encoder did not complete in time");
                if timeouts >= args.max_timeouts {
                    return Err(Error::Timeout);
                }
            }
            Err(err) => return Err(err),
        }
    }

    writer.flush()?;
    session.close()?;
    info!(
        frames = writer.frames(),
        skipped = writer.skipped(),
        bytes = writer.bytes(),
        output = %args.output.display(),
        "Encoding finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    setup_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, fatal = err.is_fatal(), "Encoding failed");
            ExitCode::FAILURE
        }
    }
}
