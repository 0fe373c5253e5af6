#![allow(clippy::len_without_is_empty)]
#![warn(clippy::unwrap_used)]

//! # Overview
//! derain_video removes rain streaks (or applies any other image-to-image restoration) from a
//! video, one frame at a time.
//!
//! # How it works
//! * `ffprobe` reads the resolution and frame rate of the input.
//! * One `ffmpeg` process decodes the input into raw rgb24 frames on its stdout.
//! * Each frame is converted into a `(1, 3, height, width)` tensor of values in `[0, 1]`
//!   and handed to a [`Restorer`].
//! * The restored tensor is clamped, converted back into rgb24 and written to the stdin of a
//!   second `ffmpeg` process, which encodes the output file.
//!
//! Frames are processed strictly in order, one at a time. Nothing is dropped or duplicated.
//!
//! ```no_run
//! use derain_video::{IdentityRestorer, Pipeline, PipelineCfg};
//!
//! let mut pipeline = Pipeline::new(PipelineCfg::default());
//! let report = pipeline.run("input.mp4", "output.mp4", &mut IdentityRestorer)?;
//! assert_eq!(report.truncated_tail_bytes, 0);
//! # Ok::<(), derain_video::PipelineError>(())
//! ```
//!
//! # Models
//! Any closure `FnMut(ArrayView4<f32>) -> Result<FrameTensor, RestoreError>` is a [`Restorer`].
//! With the `onnx` feature, `OnnxRestorer` runs an exported ONNX model through onnxruntime,
//! and the `cuda` feature lets it run on an nvidia gpu.
//!
//! # Prerequisites
//! Ffmpeg and Ffprobe must be installed and visible on the command line.

#[macro_use]
extern crate log;

mod config;
pub(crate) mod definitions;
mod error;
pub mod frame_codec;
mod media;
mod pipeline;
mod restore;

#[cfg(feature = "onnx")]
mod onnx;

pub use config::{DeviceCfg, PipelineCfg, RestorerCfg};
pub use definitions::{DEFAULT_INPUT_FILE, DEFAULT_OUTPUT_FILE, DEFAULT_OUTPUT_INDEX};
pub use error::{PipelineError, RestoreError};
pub use frame_codec::{tensor_shape, FrameTensor};
pub use media::{FfmpegBackend, FrameSink, FrameSource, MediaBackend, VideoDescriptor};
pub use pipeline::{Pipeline, PipelineReport, PipelineState};
pub use restore::{IdentityRestorer, Restorer};

#[cfg(feature = "onnx")]
pub use onnx::OnnxRestorer;

pub use ffmpeg_cmdline_utils::{
    ffmpeg_and_ffprobe_are_callable, DecoderCfg, EncoderCfg, FfmpegError, FfmpegRole, FrameRate, FrameRead,
};
