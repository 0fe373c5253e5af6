use std::{
    ffi::OsStr,
    fmt,
    io::prelude::*,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread::JoinHandle,
    time::Duration,
};

#[cfg(target_family = "windows")]
use std::os::windows::process::CommandExt;

use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;
use FfmpegCommandName::*;
use FfmpegError::*;

use crate::*;

pub(crate) const FFPROBE_TIMEOUT_SECS: u64 = 60;

// ffmpeg sometimes writes very long messages. The actual cause is nearly always at the end.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

// A utf8 char is at most 4 bytes, so this many bytes always holds MAX_DIAGNOSTIC_CHARS chars.
const MAX_DIAGNOSTIC_BYTES: usize = MAX_DIAGNOSTIC_CHARS * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FfmpegCommandName {
    Ffprobe,
    Ffmpeg,
}

impl FfmpegCommandName {
    pub fn as_os_str(&self) -> &'static OsStr {
        match self {
            Self::Ffprobe => OsStr::new("ffprobe"),
            Self::Ffmpeg => OsStr::new("ffmpeg"),
        }
    }
}

impl fmt::Display for FfmpegCommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_os_str().to_string_lossy())
    }
}

/// Which end of a transcoding pipeline a long-running ffmpeg process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FfmpegRole {
    Decoder,
    Encoder,
}

impl fmt::Display for FfmpegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decoder => write!(f, "ffmpeg decoder"),
            Self::Encoder => write!(f, "ffmpeg encoder"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PipeCfg {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

fn piped_if(piped: bool) -> Stdio {
    if piped {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

pub(crate) fn spawn_ffmpeg_command(
    name: FfmpegCommandName,
    args: &[&OsStr],
    pipes: PipeCfg,
) -> Result<Child, FfmpegError> {
    let mut command = Command::new(name.as_os_str());
    command
        .args(args)
        .stdin(piped_if(pipes.stdin))
        .stdout(piped_if(pipes.stdout))
        .stderr(piped_if(pipes.stderr));

    // no console window per child process
    #[cfg(target_family = "windows")]
    command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);

    trace!(target: "ffmpeg", "spawning {} {:?}", name, args);

    command.spawn().map_err(|e| match e.kind() {
        // the binary itself is missing, not the input file
        std::io::ErrorKind::NotFound => FfmpegNotFound,
        _ => Io(e.to_string()),
    })
}

/// The bytes read from a pipe. When `truncated` is set, only the last part of the output is kept.
#[derive(Debug, Default)]
pub(crate) struct PipeTail {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// Read `pipe` to the end, keeping at most the last `max_bytes` bytes of what it produced.
pub(crate) fn read_tail<R: Read>(mut pipe: R, max_bytes: usize) -> PipeTail {
    let mut tail = PipeTail::default();
    let mut chunk = [0u8; 4096];

    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.bytes.extend_from_slice(&chunk[..n]);
                if tail.bytes.len() > max_bytes {
                    let excess = tail.bytes.len() - max_bytes;
                    tail.bytes.drain(..excess);
                    tail.truncated = true;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    tail
}

/// Reads a child's pipe to the end on a helper thread, so that the child can never
/// stall on a full pipe buffer while the caller is busy with its other pipes.
pub(crate) struct PipeDrain(Option<JoinHandle<PipeTail>>);

impl PipeDrain {
    /// Keep everything the child writes.
    pub fn spawn<R>(pipe: Option<R>, thread_name: &str) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::spawn_bounded(pipe, thread_name, usize::MAX)
    }

    /// Keep only the end of what the child writes, enough for [`PipeDrain::collect_text`].
    pub fn spawn_tail<R>(pipe: Option<R>, thread_name: &str) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::spawn_bounded(pipe, thread_name, MAX_DIAGNOSTIC_BYTES)
    }

    fn spawn_bounded<R>(pipe: Option<R>, thread_name: &str, max_bytes: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let handle = pipe.and_then(|pipe| {
            std::thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || read_tail(pipe, max_bytes))
                .ok()
        });

        Self(handle)
    }

    fn join(&mut self) -> PipeTail {
        self.0
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    /// Blocks until the pipe is closed by the child, and returns everything that was kept.
    pub fn collect(&mut self) -> Vec<u8> {
        self.join().bytes
    }

    pub fn collect_text(&mut self) -> String {
        let tail = self.join();
        diagnostic_text(&tail.bytes, tail.truncated)
    }
}

impl fmt::Debug for PipeDrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PipeDrain").field(&self.0.is_some()).finish()
    }
}

/// Turn raw stderr bytes into a printable message, keeping at most the last
/// MAX_DIAGNOSTIC_CHARS characters. `truncated` marks bytes that are already only a tail.
pub(crate) fn diagnostic_text(raw: &[u8], truncated: bool) -> String {
    // a cut tail may start part way through a utf8 char.
    let raw = if truncated {
        let start = raw.iter().take_while(|b| (0x80..0xc0).contains(*b)).count();
        &raw[start..]
    } else {
        raw
    };
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();

    let num_chars = text.chars().count();
    if num_chars <= MAX_DIAGNOSTIC_CHARS {
        if truncated {
            format!("...{text}")
        } else {
            text.to_string()
        }
    } else {
        let tail = text
            .chars()
            .skip(num_chars - MAX_DIAGNOSTIC_CHARS)
            .collect::<String>();
        format!("...{tail}")
    }
}

/// Decide whether a finished long-running process succeeded. At `-loglevel error` ffmpeg only
/// writes to stderr when something went wrong, so any text there can optionally count as a failure
/// even when the exit status is zero.
pub(crate) fn check_exit(
    role: FfmpegRole,
    status: ExitStatus,
    diagnostics: String,
    fail_on_diagnostics: bool,
) -> Result<(), FfmpegError> {
    if !status.success() || (fail_on_diagnostics && !diagnostics.is_empty()) {
        return Err(ProcessFailed {
            process: role,
            status: status.to_string(),
            diagnostics,
        });
    }

    if !diagnostics.is_empty() {
        warn!(target: "ffmpeg", "{role} reported: {diagnostics}");
    }

    Ok(())
}

/// Kill a child (if it is still running) and reap its exit status so it does not linger as a zombie.
pub(crate) fn kill_and_reap(child: &mut Child) {
    let _kill_error = child.kill();
    let _wait_error = child.wait();
}

struct FfmpegOutput {
    stdout: Vec<u8>,
}

fn run_ffmpeg_command(
    name: FfmpegCommandName,
    args: &[&OsStr],
    timeout: Duration,
) -> Result<FfmpegOutput, FfmpegError> {
    let pipes = PipeCfg {
        stdin: false,
        stdout: true,
        stderr: true,
    };
    let mut child = spawn_ffmpeg_command(name, args, pipes)?;

    let mut stdout = PipeDrain::spawn(child.stdout.take(), "ffprobe-stdout");
    let mut stderr = PipeDrain::spawn_tail(child.stderr.take(), "ffprobe-stderr");

    let status = match child.wait_timeout(timeout) {
        Err(e) => {
            kill_and_reap(&mut child);
            return Err(Io(e.to_string()));
        }
        Ok(None) => {
            kill_and_reap(&mut child);
            return Err(Timeout(name, timeout.as_secs()));
        }
        Ok(Some(status)) => status,
    };

    let stdout = stdout.collect();
    let stderr = stderr.collect_text();

    if status.success() {
        Ok(FfmpegOutput { stdout })
    } else {
        Err(FfmpegInternal(stderr))
    }
}

/// Run ffprobe against `src_path` and return its JSON description of all streams and the container.
pub fn get_video_stats<P: AsRef<Path>>(src_path: P) -> Result<String, FfmpegError> {
    get_video_stats_with_timeout(src_path, Duration::from_secs(FFPROBE_TIMEOUT_SECS))
}

pub fn get_video_stats_with_timeout<P: AsRef<Path>>(
    src_path: P,
    timeout: Duration,
) -> Result<String, FfmpegError> {
    #[rustfmt::skip]
    let args = &[
        OsStr::new("-v"),            OsStr::new("error"),
        OsStr::new("-show_format"),
        OsStr::new("-show_streams"),
        OsStr::new("-print_format"), OsStr::new("json"),
        OsStr::new(src_path.as_ref()),
    ];

    let stdout = run_ffmpeg_command(Ffprobe, args, timeout)?.stdout;

    String::from_utf8(stdout).map_err(|_| Utf8Conversion)
}

pub fn ffmpeg_and_ffprobe_are_callable() -> bool {
    let timeout = Duration::from_secs(FFPROBE_TIMEOUT_SECS);

    //check ffprobe is callable.
    if run_ffmpeg_command(Ffprobe, &[OsStr::new("-version")], timeout).is_err() {
        return false;
    }

    //now ffmpeg.
    if run_ffmpeg_command(Ffmpeg, &[OsStr::new("-version")], timeout).is_err() {
        return false;
    }

    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_short_diagnostics_are_kept_whole() {
        let text = diagnostic_text(b"  input.mp4: No such file or directory\n", false);
        assert_eq!(text, "input.mp4: No such file or directory");
    }

    #[test]
    fn test_long_diagnostics_keep_the_tail() {
        let mut raw = vec![b'x'; MAX_DIAGNOSTIC_CHARS * 2];
        raw.extend_from_slice(b"Conversion failed!");

        let text = diagnostic_text(&raw, false);
        assert!(text.starts_with("..."));
        assert!(text.ends_with("Conversion failed!"));
        assert_eq!(text.chars().count(), MAX_DIAGNOSTIC_CHARS + 3);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_rejected() {
        let text = diagnostic_text(&[0xff, b'o', b'k'], false);
        assert!(text.ends_with("ok"));
    }

    #[test]
    fn test_reading_a_long_pipe_keeps_a_bounded_tail() {
        let mut raw = vec![b'x'; 1_000_000];
        raw.extend_from_slice(b"Conversion failed!");

        let tail = read_tail(std::io::Cursor::new(raw), MAX_DIAGNOSTIC_BYTES);
        assert!(tail.truncated);
        assert_eq!(tail.bytes.len(), MAX_DIAGNOSTIC_BYTES);
        assert!(tail.bytes.ends_with(b"Conversion failed!"));

        let short = read_tail(std::io::Cursor::new(b"oops".to_vec()), MAX_DIAGNOSTIC_BYTES);
        assert!(!short.truncated);
        assert_eq!(short.bytes, b"oops");
    }

    #[test]
    fn test_drained_stderr_is_bounded_and_marked_as_cut() {
        let mut raw = "é".repeat(MAX_DIAGNOSTIC_BYTES).into_bytes();
        raw.extend_from_slice(b"Conversion failed!");

        let text = PipeDrain::spawn_tail(Some(std::io::Cursor::new(raw)), "test-stderr").collect_text();
        assert!(text.starts_with("..."));
        assert!(text.ends_with("Conversion failed!"));
        assert!(!text.contains(char::REPLACEMENT_CHARACTER));
        assert!(text.chars().count() <= MAX_DIAGNOSTIC_CHARS + 3);
    }
}
