use std::{
    ffi::OsStr,
    io::prelude::*,
    path::Path,
    process::{Child, ChildStdout},
};

use image::RgbImage;

use crate::ffmpeg_ops::*;
use crate::*;

// Attempt to prevent OOM on very implausible sizes
const MAX_FRAME_BYTES: usize = 5_368_709_120;

/// Options for the decoding ffmpeg process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderCfg {
    /// Number of decoding threads. `None` lets ffmpeg decide.
    pub threads: Option<u32>,

    /// Treat anything ffmpeg writes to stderr (at `-loglevel error`) as a failure,
    /// even if it exits with status zero.
    pub fail_on_diagnostics: bool,
}

impl Default for DecoderCfg {
    fn default() -> Self {
        Self {
            threads: None,
            fail_on_diagnostics: true,
        }
    }
}

/// The outcome of reading one frame from the decoder.
#[derive(Debug)]
pub enum FrameRead<'a> {
    /// A complete frame. The buffer is reused by the next call to `read_frame`.
    Frame(&'a RgbImage),

    /// ffmpeg closed its output exactly on a frame boundary.
    End,

    /// ffmpeg closed its output part way through a frame. The partial frame is discarded.
    Truncated { bytes: usize },
}

/// Number of bytes in one rgb24 frame, or `None` if the resolution is implausible.
pub fn rgb24_frame_size(width: u32, height: u32) -> Option<usize> {
    let size = usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(3)?;

    (size != 0 && size <= MAX_FRAME_BYTES).then_some(size)
}

/// An ffmpeg process decoding a video file into a stream of raw rgb24 frames.
///
/// The process is always reaped: either through [`RawFrameDecoder::finish`], which also reports
/// how it exited, or by killing it when the decoder is dropped.
#[derive(Debug)]
pub struct RawFrameDecoder {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: PipeDrain,
    frame: RgbImage,
    frames_read: u64,
    fail_on_diagnostics: bool,
    finished: bool,
}

impl RawFrameDecoder {
    /// Spawn ffmpeg to decode the first video stream of `src_path`. `resolution` must be the
    /// resolution reported by [`VideoInfo::resolution`] for the same file.
    pub fn spawn(
        src_path: impl AsRef<Path>,
        resolution: (u32, u32),
        cfg: &DecoderCfg,
    ) -> Result<Self, FfmpegError> {
        let (width, height) = resolution;
        let frame_size = rgb24_frame_size(width, height).ok_or(FfmpegError::InvalidResolution)?;

        let threads_string = cfg.threads.map(|threads| threads.to_string());

        #[rustfmt::skip]
        let mut args = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"), OsStr::new("error"),
            OsStr::new("-nostats"),
            OsStr::new("-nostdin"),
        ];

        if let Some(threads) = &threads_string {
            args.extend([OsStr::new("-threads"), OsStr::new(threads)]);
        }

        #[rustfmt::skip]
        args.extend([
            OsStr::new("-i"),       OsStr::new(src_path.as_ref()),
            OsStr::new("-map"),     OsStr::new("0:v:0"),
            OsStr::new("-an"),
            OsStr::new("-sn"),
            OsStr::new("-pix_fmt"), OsStr::new("rgb24"),
            OsStr::new("-c:v"),     OsStr::new("rawvideo"),
            OsStr::new("-f"),       OsStr::new("rawvideo"),
            OsStr::new("-"),
        ]);

        let pipes = PipeCfg {
            stdin: false,
            stdout: true,
            stderr: true,
        };
        let mut child = spawn_ffmpeg_command(FfmpegCommandName::Ffmpeg, &args, pipes)?;

        let stdout = child.stdout.take();
        let stderr = PipeDrain::spawn_tail(child.stderr.take(), "ffmpeg-decoder-stderr");

        debug!(target: "decoder",
            "decoding {} as {}x{} rgb24 ({} bytes per frame)",
            src_path.as_ref().display(), width, height, frame_size
        );

        Ok(Self {
            child,
            stdout,
            stderr,
            frame: RgbImage::new(width, height),
            frames_read: 0,
            fail_on_diagnostics: cfg.fail_on_diagnostics,
            finished: false,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    /// Size in bytes of one raw frame.
    pub fn frame_size(&self) -> usize {
        self.frame.len()
    }

    /// The number of complete frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Block until the next complete frame is available, or until ffmpeg closes its output.
    pub fn read_frame(&mut self) -> Result<FrameRead<'_>, FfmpegError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(FrameRead::End);
        };

        let raw_buf: &mut [u8] = &mut self.frame;
        let mut buf_head = 0;
        while buf_head < raw_buf.len() {
            match stdout.read(&mut raw_buf[buf_head..]) {
                Ok(0) => break,
                Ok(bytes_read) => buf_head += bytes_read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FfmpegError::Io(e.to_string())),
            }
        }

        if buf_head == raw_buf.len() {
            self.frames_read += 1;
            trace!(target: "decoder", "read frame {}", self.frames_read);
            return Ok(FrameRead::Frame(&self.frame));
        }

        //no more data can be read. Close our end so nothing more is expected.
        self.stdout = None;

        if buf_head == 0 {
            Ok(FrameRead::End)
        } else {
            Ok(FrameRead::Truncated { bytes: buf_head })
        }
    }

    /// Close the output stream, wait for ffmpeg to exit and check how it exited.
    ///
    /// Call this after `read_frame` has signalled the end of the stream. The returned error
    /// carries everything ffmpeg wrote to stderr.
    pub fn finish(mut self) -> Result<(), FfmpegError> {
        self.stdout = None;

        let status = self.child.wait().map_err(|e| FfmpegError::Io(e.to_string()))?;
        self.finished = true;
        let diagnostics = self.stderr.collect_text();

        debug!(target: "decoder", "ffmpeg decoder exited: {status}");

        check_exit(
            FfmpegRole::Decoder,
            status,
            diagnostics,
            self.fail_on_diagnostics,
        )
    }
}

// to prevent accumulation of zombie processes, reap the return code of
// ffmpeg subcommands (if nothing else has done so already) here
impl Drop for RawFrameDecoder {
    fn drop(&mut self) {
        if !self.finished {
            self.stdout = None;
            kill_and_reap(&mut self.child);
            let _stderr = self.stderr.collect();
        }
    }
}
