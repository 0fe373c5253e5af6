//! The narrow interface between the pipeline and whatever decodes and encodes the video.

use std::path::Path;

use ffmpeg_cmdline_utils::{
    FfmpegError, FrameRate, FrameRead, RawFrameDecoder, RawFrameEncoder, VideoInfo,
};
use serde::{Deserialize, Serialize};

use crate::PipelineCfg;

/// Everything the pipeline needs to know about the input video. Fixed for one run: every frame
/// has exactly this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

impl VideoDescriptor {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A stream of decoded rgb24 frames.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<FrameRead<'_>, FfmpegError>;

    /// Called once the stream has ended. Reports whether the producer exited cleanly.
    fn finish(self) -> Result<(), FfmpegError>
    where
        Self: Sized;
}

/// A consumer of rgb24 frames, written in presentation order.
pub trait FrameSink {
    fn write_frame(&mut self, raw: &[u8]) -> Result<(), FfmpegError>;

    /// Flush everything written so far and report whether the consumer exited cleanly.
    fn finish(self) -> Result<(), FfmpegError>
    where
        Self: Sized;
}

/// Opens sources and sinks for video files.
pub trait MediaBackend {
    type Source: FrameSource;
    type Sink: FrameSink;

    /// Inspect `path` without decoding it.
    fn probe(&self, path: &Path) -> Result<VideoDescriptor, FfmpegError>;

    fn open_source(&self, path: &Path, descriptor: &VideoDescriptor) -> Result<Self::Source, FfmpegError>;

    fn open_sink(&self, path: &Path, descriptor: &VideoDescriptor) -> Result<Self::Sink, FfmpegError>;
}

impl FrameSource for RawFrameDecoder {
    fn read_frame(&mut self) -> Result<FrameRead<'_>, FfmpegError> {
        RawFrameDecoder::read_frame(self)
    }

    fn finish(self) -> Result<(), FfmpegError> {
        RawFrameDecoder::finish(self)
    }
}

impl FrameSink for RawFrameEncoder {
    fn write_frame(&mut self, raw: &[u8]) -> Result<(), FfmpegError> {
        RawFrameEncoder::write_frame(self, raw)
    }

    fn finish(self) -> Result<(), FfmpegError> {
        RawFrameEncoder::finish(self)
    }
}

/// Decodes with one ffmpeg process and encodes with another.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    cfg: PipelineCfg,
}

impl FfmpegBackend {
    pub fn new(cfg: PipelineCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &PipelineCfg {
        &self.cfg
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = RawFrameDecoder;
    type Sink = RawFrameEncoder;

    fn probe(&self, path: &Path) -> Result<VideoDescriptor, FfmpegError> {
        let info = VideoInfo::with_timeout(path, self.cfg.probe_timeout)?;
        let (width, height) = info.resolution();

        let frame_rate = info.frame_rate().unwrap_or_else(|| {
            warn!(target: "probe",
                "{} does not declare a frame rate, assuming {}",
                path.display(), self.cfg.fallback_frame_rate
            );
            self.cfg.fallback_frame_rate
        });

        info!(target: "probe",
            "{}: {}x{} @ {} fps, {} ({}), {} frames",
            path.display(),
            width,
            height,
            frame_rate,
            info.codec_name().unwrap_or("unknown codec"),
            info.pix_fmt().unwrap_or("unknown pix_fmt"),
            info.num_frames().map_or_else(|| "unknown".to_string(), |n| n.to_string()),
        );

        Ok(VideoDescriptor {
            width,
            height,
            frame_rate,
        })
    }

    fn open_source(&self, path: &Path, descriptor: &VideoDescriptor) -> Result<Self::Source, FfmpegError> {
        RawFrameDecoder::spawn(path, descriptor.resolution(), &self.cfg.decoder)
    }

    fn open_sink(&self, path: &Path, descriptor: &VideoDescriptor) -> Result<Self::Sink, FfmpegError> {
        RawFrameEncoder::spawn(
            path,
            descriptor.resolution(),
            descriptor.frame_rate,
            &self.cfg.encoder,
        )
    }
}
