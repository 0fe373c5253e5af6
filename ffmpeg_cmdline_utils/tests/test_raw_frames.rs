use std::path::{Path, PathBuf};
use std::process::Command;

use ffmpeg_cmdline_utils::*;

fn make_test_video(dir: &Path, width: u32, height: u32, num_frames: u32) -> PathBuf {
    let path = dir.join("testsrc.mkv");
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=size={width}x{height}:rate=30000/1001"))
        .args(["-frames:v", &num_frames.to_string(), "-c:v", "ffv1"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    path
}

fn lossless_encoder_cfg() -> EncoderCfg {
    EncoderCfg {
        codec: "ffv1".to_string(),
        pix_fmt: "bgr0".to_string(),
        ..EncoderCfg::default()
    }
}

#[test]
fn test_probe_decode_encode() {
    if !ffmpeg_and_ffprobe_are_callable() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let src = make_test_video(dir.path(), 48, 32, 3);

    let info = VideoInfo::new(&src).unwrap();
    assert_eq!(info.resolution(), (48, 32));
    let fps = info.frame_rate().unwrap().as_f64();
    assert!((fps - 29.97).abs() < 0.01, "{fps}");

    let mut decoder = RawFrameDecoder::spawn(&src, info.resolution(), &DecoderCfg::default()).unwrap();
    assert_eq!(decoder.frame_size(), 48 * 32 * 3);

    let mut frames = vec![];
    loop {
        match decoder.read_frame().unwrap() {
            FrameRead::Frame(frame) => frames.push(frame.clone()),
            FrameRead::End => break,
            FrameRead::Truncated { bytes } => panic!("unexpected partial frame of {bytes} bytes"),
        }
    }
    assert_eq!(decoder.frames_read(), 3);
    decoder.finish().unwrap();

    let dst = dir.path().join("copy.mkv");
    let frame_rate = info.frame_rate().unwrap_or_default();
    let mut encoder = RawFrameEncoder::spawn(&dst, info.resolution(), frame_rate, &lossless_encoder_cfg()).unwrap();
    for frame in &frames {
        encoder.write_frame(frame.as_raw()).unwrap();
    }
    assert_eq!(encoder.frames_written(), 3);
    encoder.finish().unwrap();

    // bgr0 holds rgb24 exactly, so the copy decodes to identical frames.
    let mut decoder = RawFrameDecoder::spawn(&dst, (48, 32), &DecoderCfg::default()).unwrap();
    for expected in &frames {
        match decoder.read_frame().unwrap() {
            FrameRead::Frame(frame) => assert_eq!(frame, expected),
            other => panic!("expected a frame, got {other:?}"),
        }
    }
    assert!(matches!(decoder.read_frame().unwrap(), FrameRead::End));
    decoder.finish().unwrap();
}

#[test]
fn test_encoder_rejects_wrong_frame_size() {
    if !ffmpeg_and_ffprobe_are_callable() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("out.mkv");
    let mut encoder = RawFrameEncoder::spawn(&dst, (16, 16), FrameRate::default(), &lossless_encoder_cfg()).unwrap();

    let err = encoder.write_frame(&[0; 16 * 16 * 3 - 1]).unwrap_err();
    assert!(matches!(
        err,
        FfmpegError::FrameSize {
            expected: 768,
            actual: 767
        }
    ));
}

#[test]
fn test_decoding_garbage_reports_diagnostics() {
    if !ffmpeg_and_ffprobe_are_callable() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("garbage.mp4");
    std::fs::write(&src, b"definitely not a video file").unwrap();

    assert!(VideoInfo::new(&src).is_err());

    let mut decoder = RawFrameDecoder::spawn(&src, (16, 16), &DecoderCfg::default()).unwrap();
    assert!(matches!(decoder.read_frame().unwrap(), FrameRead::End));

    match decoder.finish().unwrap_err() {
        FfmpegError::ProcessFailed {
            process,
            diagnostics,
            ..
        } => {
            assert_eq!(process, FfmpegRole::Decoder);
            assert!(!diagnostics.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_dropping_a_running_decoder_does_not_hang() {
    if !ffmpeg_and_ffprobe_are_callable() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let src = make_test_video(dir.path(), 64, 64, 50);

    let mut decoder = RawFrameDecoder::spawn(&src, (64, 64), &DecoderCfg::default()).unwrap();
    assert!(matches!(decoder.read_frame().unwrap(), FrameRead::Frame(_)));
    drop(decoder);
}
