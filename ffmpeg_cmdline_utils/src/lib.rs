#![allow(clippy::let_and_return)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::unwrap_used)]

//! Drive the `ffmpeg` and `ffprobe` command line tools from rust.
//!
//! * [`VideoInfo`] probes a file for the resolution and frame rate of its first video stream.
//! * [`RawFrameDecoder`] runs ffmpeg to decode a video into a stream of raw rgb24 frames.
//! * [`RawFrameEncoder`] runs ffmpeg to encode a stream of raw rgb24 frames into a video.
//!
//! Frames cross the process boundary as headerless chunks of `width * height * 3` bytes;
//! frame boundaries are implied by the chunk size.
//!
//! Ffmpeg and Ffprobe must be installed and visible on the command line.

#[macro_use]
extern crate log;

mod ffmpeg_error_kind;
mod ffmpeg_ops;
mod ffmpeg_stats;
mod raw_decoder;
mod raw_encoder;

pub use ffmpeg_error_kind::FfmpegError;
pub use ffmpeg_ops::{
    ffmpeg_and_ffprobe_are_callable, get_video_stats, get_video_stats_with_timeout,
    FfmpegCommandName, FfmpegRole,
};
pub use ffmpeg_stats::{FrameRate, VideoInfo, VideoInfoError};
pub use raw_decoder::{rgb24_frame_size, DecoderCfg, FrameRead, RawFrameDecoder};
pub use raw_encoder::{EncoderCfg, RawFrameEncoder, DEFAULT_PIX_FMT, DEFAULT_VIDEO_CODEC};

pub(crate) use ffmpeg_ops::FFPROBE_TIMEOUT_SECS;
