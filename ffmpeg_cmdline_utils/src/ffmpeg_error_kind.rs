use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::*;

/// Various causes of failure for ffmpeg/ffprobe functions.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FfmpegError {
    /// Ffmpeg/Ffprobe command was not found. Make sure Ffmpeg is installed and can be found on the command line.
    #[error("ffmpeg/ffprobe file not found. Make sure ffmpeg/ffprobe are installed and visible on the command line")]
    FfmpegNotFound,

    /// Io error occurred while talking to an Ffmpeg/Ffprobe process
    #[error("Ffmpeg IO error: {0}")]
    Io(String),

    /// Ffprobe returned a nonzero exit code. Because ffmpeg sometimes prints long error strings
    /// to stderr, The resulting string contains only the tail of the error message.
    #[error("Internal Ffmpeg Failure: {0}")]
    FfmpegInternal(String),

    /// Failed to interpret Ffmpeg/Ffprobe output as a utf8-string.
    #[error("utf8 parsing/conversion failure")]
    Utf8Conversion,

    /// The input file does not exist (or cannot be seen by this process).
    #[error("input file not found: {0}")]
    FileNotFound(String),

    /// The container has no video stream at all. This usually happens with audio-only files.
    #[error("no video stream found")]
    NoVideoStream,

    /// When using Ffprobe to obtain the resolution of the video file before beginning the
    /// decoding process, either the X or Y dimension was missing or zero.
    #[error("video stream does not declare a usable resolution")]
    InvalidResolution,

    /// Ffprobe did not finish within its time budget and was killed.
    #[error("{0} timed out after {1} seconds")]
    Timeout(FfmpegCommandName, u64),

    /// A long-running ffmpeg process exited unsuccessfully, or wrote an error to its
    /// diagnostic channel. `diagnostics` holds the captured stderr text.
    #[error("{process} failed ({status}): {diagnostics}")]
    ProcessFailed {
        process: FfmpegRole,
        status: String,
        diagnostics: String,
    },

    /// A frame handed to the encoder did not have exactly `width * height * 3` bytes.
    #[error("frame has {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    /// Failed to obtain video information.
    #[error("Failed to get video properties: {0}")]
    Info(#[from] VideoInfoError),
}

impl FfmpegError {
    /// The text captured from the process' diagnostic channel, if this error carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { diagnostics, .. } => Some(diagnostics),
            Self::FfmpegInternal(text) => Some(text),
            _ => None,
        }
    }
}
