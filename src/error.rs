use ffmpeg_cmdline_utils::{FfmpegError, FfmpegRole};
use thiserror::Error;

/// Why restoring a video failed.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The input could not be inspected: it is missing, unreadable, has no video stream or
    /// does not declare its resolution.
    #[error("could not probe input video")]
    Probe(#[source] FfmpegError),

    /// The decoder or encoder process could not be started.
    #[error("failed to start the {process}")]
    ProcessSpawn {
        process: FfmpegRole,
        #[source]
        source: FfmpegError,
    },

    /// The decoder or encoder reported a failure while frames were flowing.
    #[error("the {process} failed while streaming frames")]
    Stream {
        process: FfmpegRole,
        #[source]
        source: FfmpegError,
    },

    /// A buffer or tensor did not have the shape fixed by the video descriptor.
    #[error("frame shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The restoration model failed on a frame.
    #[error("restoration failed on frame {frame}")]
    Restore {
        frame: u64,
        #[source]
        source: RestoreError,
    },
}

impl PipelineError {
    /// The text the external process wrote to its diagnostic channel, if this failure
    /// came from an external process that wrote any.
    pub fn diagnostics(&self) -> Option<&str> {
        let source = match self {
            Self::Probe(source) => source,
            Self::ProcessSpawn { source, .. } => source,
            Self::Stream { source, .. } => source,
            Self::ShapeMismatch { .. } | Self::Restore { .. } => return None,
        };

        source.diagnostics().filter(|text| !text.is_empty())
    }
}

/// Failures of a restoration model.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("device not supported by this build: {0}")]
    UnsupportedDevice(String),

    #[error("model produced no output at index {index} ({available} outputs available)")]
    MissingOutput { index: usize, available: usize },

    #[error("model output has shape {0:?}, which is not a (1, 3, H, W) frame")]
    OutputShape(Vec<usize>),

    #[error("inference failed: {0}")]
    Inference(String),
}
