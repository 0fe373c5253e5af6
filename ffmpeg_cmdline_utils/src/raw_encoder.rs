use std::{
    ffi::OsStr,
    io::prelude::*,
    path::Path,
    process::{Child, ChildStdin},
};

use crate::ffmpeg_ops::*;
use crate::*;

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_PIX_FMT: &str = "yuv420p";

/// Options for the encoding ffmpeg process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderCfg {
    /// Value for `-c:v`
    pub codec: String,

    /// Pixel format of the encoded stream (not of the raw frames, which are always rgb24)
    pub pix_fmt: String,

    /// Constant rate factor, for codecs that support it.
    pub crf: Option<u8>,

    /// Replace the output file if it already exists.
    pub overwrite: bool,

    /// Passed to ffmpeg verbatim, just before the output path.
    pub extra_args: Vec<String>,

    /// Treat anything ffmpeg writes to stderr (at `-loglevel error`) as a failure,
    /// even if it exits with status zero.
    pub fail_on_diagnostics: bool,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            pix_fmt: DEFAULT_PIX_FMT.to_string(),
            crf: None,
            overwrite: true,
            extra_args: vec![],
            fail_on_diagnostics: true,
        }
    }
}

/// An ffmpeg process that reads raw rgb24 frames on stdin and encodes them into a video file.
///
/// Frames are encoded in the order they are written. The output is only complete once
/// [`RawFrameEncoder::finish`] has returned successfully; dropping the encoder kills ffmpeg.
#[derive(Debug)]
pub struct RawFrameEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: PipeDrain,
    frame_size: usize,
    frames_written: u64,
    fail_on_diagnostics: bool,
    finished: bool,
}

impl RawFrameEncoder {
    pub fn spawn(
        dst_path: impl AsRef<Path>,
        resolution: (u32, u32),
        frame_rate: FrameRate,
        cfg: &EncoderCfg,
    ) -> Result<Self, FfmpegError> {
        let (width, height) = resolution;
        let frame_size = rgb24_frame_size(width, height).ok_or(FfmpegError::InvalidResolution)?;

        let size_string = format!("{width}x{height}");
        let rate_string = frame_rate.to_string();
        let crf_string = cfg.crf.map(|crf| crf.to_string());

        #[rustfmt::skip]
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),  OsStr::new("error"),
            OsStr::new("-nostats"),
            OsStr::new(if cfg.overwrite { "-y" } else { "-n" }),
            OsStr::new("-f"),         OsStr::new("rawvideo"),
            OsStr::new("-pix_fmt"),   OsStr::new("rgb24"),
            OsStr::new("-s"),         OsStr::new(&size_string),
            OsStr::new("-framerate"), OsStr::new(&rate_string),
            OsStr::new("-i"),         OsStr::new("-"),
            OsStr::new("-an"),
            OsStr::new("-c:v"),       OsStr::new(&cfg.codec),
            OsStr::new("-pix_fmt"),   OsStr::new(&cfg.pix_fmt),
        ];

        if let Some(crf) = &crf_string {
            args.extend([OsStr::new("-crf"), OsStr::new(crf)]);
        }

        args.extend(cfg.extra_args.iter().map(OsStr::new));
        args.push(dst_path.as_ref().as_os_str());

        let pipes = PipeCfg {
            stdin: true,
            stdout: false,
            stderr: true,
        };
        let mut child = spawn_ffmpeg_command(FfmpegCommandName::Ffmpeg, &args, pipes)?;

        let stdin = child.stdin.take();
        let stderr = PipeDrain::spawn_tail(child.stderr.take(), "ffmpeg-encoder-stderr");

        debug!(target: "encoder",
            "encoding {}x{} @ {} fps into {} with {} ({})",
            width, height, frame_rate, dst_path.as_ref().display(), cfg.codec, cfg.pix_fmt
        );

        Ok(Self {
            child,
            stdin,
            stderr,
            frame_size,
            frames_written: 0,
            fail_on_diagnostics: cfg.fail_on_diagnostics,
            finished: false,
        })
    }

    /// Size in bytes of one raw frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Write one raw rgb24 frame. Blocks while ffmpeg is not keeping up.
    ///
    /// If ffmpeg has exited, this reaps it and returns its diagnostic output.
    pub fn write_frame(&mut self, raw: &[u8]) -> Result<(), FfmpegError> {
        if raw.len() != self.frame_size {
            return Err(FfmpegError::FrameSize {
                expected: self.frame_size,
                actual: raw.len(),
            });
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FfmpegError::Io("encoder input is already closed".to_string()));
        };

        match stdin.write_all(raw) {
            Ok(()) => {
                self.frames_written += 1;
                trace!(target: "encoder", "wrote frame {}", self.frames_written);
                Ok(())
            }

            // ffmpeg went away. Its exit status and stderr say why.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(self.reap_after_failure()),

            Err(e) => Err(FfmpegError::Io(e.to_string())),
        }
    }

    /// Close ffmpeg's input, wait for it to finish writing the file and check how it exited.
    pub fn finish(mut self) -> Result<(), FfmpegError> {
        //closing stdin signals end of stream to ffmpeg
        self.stdin = None;

        let status = self.child.wait().map_err(|e| FfmpegError::Io(e.to_string()))?;
        self.finished = true;
        let diagnostics = self.stderr.collect_text();

        debug!(target: "encoder",
            "ffmpeg encoder exited after {} frames: {status}", self.frames_written
        );

        check_exit(
            FfmpegRole::Encoder,
            status,
            diagnostics,
            self.fail_on_diagnostics,
        )
    }

    fn reap_after_failure(&mut self) -> FfmpegError {
        self.stdin = None;

        let status = match self.child.wait() {
            Ok(status) => status.to_string(),
            Err(e) => {
                kill_and_reap(&mut self.child);
                e.to_string()
            }
        };
        self.finished = true;

        FfmpegError::ProcessFailed {
            process: FfmpegRole::Encoder,
            status,
            diagnostics: self.stderr.collect_text(),
        }
    }
}

// to prevent accumulation of zombie processes, reap the return code of
// ffmpeg subcommands (if nothing else has done so already) here
impl Drop for RawFrameEncoder {
    fn drop(&mut self) {
        if !self.finished {
            self.stdin = None;
            kill_and_reap(&mut self.child);
            let _stderr = self.stderr.collect();
        }
    }
}
