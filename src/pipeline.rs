use std::{
    fmt,
    path::Path,
    time::{Duration, Instant},
};

use ffmpeg_cmdline_utils::{FfmpegError, FfmpegRole, FrameRead};
use serde::{Deserialize, Serialize};

use crate::definitions::PROGRESS_INTERVAL;
use crate::*;

/// Where a [`Pipeline`] is in processing its current video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Init,
    Probing,
    Streaming,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Probing => "probing",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub frames_written: u64,

    /// Size of the incomplete frame the decoder produced just before ending its output, or
    /// zero if the output ended on a frame boundary. Incomplete frames are never restored.
    pub truncated_tail_bytes: usize,

    pub descriptor: VideoDescriptor,
    pub elapsed: Duration,
}

/// Decodes a video, restores every frame in order and encodes the result.
///
/// ```no_run
/// use derain_video::{IdentityRestorer, Pipeline, PipelineCfg};
///
/// let mut pipeline = Pipeline::new(PipelineCfg::default());
/// let report = pipeline.run("input.mp4", "output.mp4", &mut IdentityRestorer)?;
/// println!("wrote {} frames", report.frames_written);
/// # Ok::<(), derain_video::PipelineError>(())
/// ```
#[derive(Debug)]
pub struct Pipeline<B = FfmpegBackend> {
    backend: B,
    state: PipelineState,
}

impl Pipeline<FfmpegBackend> {
    pub fn new(cfg: PipelineCfg) -> Self {
        Self::with_backend(FfmpegBackend::new(cfg))
    }
}

impl<B: MediaBackend> Pipeline<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            state: PipelineState::Init,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Restore every frame of `input` with `restorer` and write the result to `output`.
    ///
    /// Frames are written in the order they are decoded, and no frame is dropped or duplicated.
    /// On any failure both external processes are torn down and nothing is retried.
    pub fn run<R>(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        restorer: &mut R,
    ) -> Result<PipelineReport, PipelineError>
    where
        R: Restorer + ?Sized,
    {
        let start = Instant::now();
        self.transition(PipelineState::Init);
        self.transition(PipelineState::Probing);

        match self.run_inner(input.as_ref(), output.as_ref(), restorer) {
            Ok((frames_written, truncated_tail_bytes, descriptor)) => {
                self.transition(PipelineState::Done);
                Ok(PipelineReport {
                    frames_written,
                    truncated_tail_bytes,
                    descriptor,
                    elapsed: start.elapsed(),
                })
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    fn run_inner<R>(
        &mut self,
        input: &Path,
        output: &Path,
        restorer: &mut R,
    ) -> Result<(u64, usize, VideoDescriptor), PipelineError>
    where
        R: Restorer + ?Sized,
    {
        let descriptor = self.backend.probe(input).map_err(PipelineError::Probe)?;

        let mut source = self
            .backend
            .open_source(input, &descriptor)
            .map_err(|source| PipelineError::ProcessSpawn {
                process: FfmpegRole::Decoder,
                source,
            })?;
        let mut sink = self
            .backend
            .open_sink(output, &descriptor)
            .map_err(|source| PipelineError::ProcessSpawn {
                process: FfmpegRole::Encoder,
                source,
            })?;

        self.transition(PipelineState::Streaming);

        let expected_shape = tensor_shape(descriptor.width, descriptor.height);
        let mut raw_out = vec![0u8; expected_shape.iter().product()];
        let mut frames_written = 0;
        let mut truncated_tail_bytes = 0;

        loop {
            let frame = match source.read_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::End) => break,
                Ok(FrameRead::Truncated { bytes }) => {
                    warn!(target: "pipeline",
                        "decoder output ended part way through frame {}, dropping {} bytes",
                        frames_written, bytes
                    );
                    truncated_tail_bytes = bytes;
                    break;
                }
                Err(e) => return Err(stream_failure(FfmpegRole::Decoder, e)),
            };

            let tensor = frame_codec::decode_image(frame)?;
            let restored = restorer
                .restore(tensor.view())
                .map_err(|source| PipelineError::Restore {
                    frame: frames_written,
                    source,
                })?;

            if restored.shape() != expected_shape {
                return Err(PipelineError::ShapeMismatch {
                    expected: expected_shape.to_vec(),
                    actual: restored.shape().to_vec(),
                });
            }

            frame_codec::encode_into(restored.view(), &mut raw_out)?;
            sink.write_frame(&raw_out)
                .map_err(|e| stream_failure(FfmpegRole::Encoder, e))?;

            frames_written += 1;
            if frames_written % PROGRESS_INTERVAL == 0 {
                info!(target: "pipeline", "restored {frames_written} frames");
            }
        }

        self.transition(PipelineState::Draining);

        // The encoder may only finalize its output once the decoder has exited cleanly.
        // Returning early drops the sink, which kills the encoder.
        source
            .finish()
            .map_err(|e| stream_failure(FfmpegRole::Decoder, e))?;
        sink.finish()
            .map_err(|e| stream_failure(FfmpegRole::Encoder, e))?;

        info!(target: "pipeline", "wrote {frames_written} frames to {}", output.display());

        Ok((frames_written, truncated_tail_bytes, descriptor))
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(target: "pipeline", "{} -> {}", self.state, next);
        self.state = next;
    }
}

fn stream_failure(process: FfmpegRole, source: FfmpegError) -> PipelineError {
    PipelineError::Stream { process, source }
}

#[cfg(test)]
mod test {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        path::PathBuf,
        rc::Rc,
    };

    use image::RgbImage;
    use ndarray::{Array4, ArrayView4};

    use super::*;

    fn process_failed(process: FfmpegRole, diagnostics: &str) -> FfmpegError {
        FfmpegError::ProcessFailed {
            process,
            status: "exit status: 1".to_string(),
            diagnostics: diagnostics.to_string(),
        }
    }

    fn numbered_frame(width: u32, height: u32, n: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([n, x as u8, y as u8])
        })
    }

    /// Everything the mock sink saw, shared with the test body.
    #[derive(Default)]
    struct SinkLog {
        frames: Vec<Vec<u8>>,
        finished: bool,
    }

    struct MockBackend {
        descriptor: VideoDescriptor,
        probe_error: Option<FfmpegError>,
        num_frames: u8,
        tail_bytes: usize,
        decoder_exit: Result<(), FfmpegError>,
        read_fails_at: Option<usize>,
        encoder_fails_at: Option<usize>,
        spawns: Cell<u32>,
        sink_log: Rc<RefCell<SinkLog>>,
    }

    impl MockBackend {
        fn new(width: u32, height: u32, num_frames: u8) -> Self {
            Self {
                descriptor: VideoDescriptor {
                    width,
                    height,
                    frame_rate: FrameRate::default(),
                },
                probe_error: None,
                num_frames,
                tail_bytes: 0,
                decoder_exit: Ok(()),
                read_fails_at: None,
                encoder_fails_at: None,
                spawns: Cell::new(0),
                sink_log: Rc::default(),
            }
        }
    }

    struct MockSource {
        frames: VecDeque<RgbImage>,
        current: RgbImage,
        tail_bytes: usize,
        frames_read: usize,
        fails_at: Option<usize>,
        exit: Result<(), FfmpegError>,
    }

    impl FrameSource for MockSource {
        fn read_frame(&mut self) -> Result<FrameRead<'_>, FfmpegError> {
            if Some(self.frames_read) == self.fails_at {
                return Err(FfmpegError::Io("Broken pipe (os error 32)".to_string()));
            }

            if let Some(frame) = self.frames.pop_front() {
                self.current = frame;
                self.frames_read += 1;
                return Ok(FrameRead::Frame(&self.current));
            }

            match std::mem::take(&mut self.tail_bytes) {
                0 => Ok(FrameRead::End),
                bytes => Ok(FrameRead::Truncated { bytes }),
            }
        }

        fn finish(self) -> Result<(), FfmpegError> {
            self.exit
        }
    }

    struct MockSink {
        log: Rc<RefCell<SinkLog>>,
        fails_at: Option<usize>,
    }

    impl FrameSink for MockSink {
        fn write_frame(&mut self, raw: &[u8]) -> Result<(), FfmpegError> {
            let mut log = self.log.borrow_mut();
            if Some(log.frames.len()) == self.fails_at {
                return Err(process_failed(FfmpegRole::Encoder, "Broken pipe"));
            }
            log.frames.push(raw.to_vec());
            Ok(())
        }

        fn finish(self) -> Result<(), FfmpegError> {
            self.log.borrow_mut().finished = true;
            Ok(())
        }
    }

    impl MediaBackend for MockBackend {
        type Source = MockSource;
        type Sink = MockSink;

        fn probe(&self, _path: &Path) -> Result<VideoDescriptor, FfmpegError> {
            match &self.probe_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.descriptor),
            }
        }

        fn open_source(&self, _path: &Path, descriptor: &VideoDescriptor) -> Result<MockSource, FfmpegError> {
            self.spawns.set(self.spawns.get() + 1);
            let (w, h) = descriptor.resolution();
            Ok(MockSource {
                frames: (0..self.num_frames).map(|n| numbered_frame(w, h, n)).collect(),
                current: RgbImage::new(w, h),
                tail_bytes: self.tail_bytes,
                frames_read: 0,
                fails_at: self.read_fails_at,
                exit: self.decoder_exit.clone(),
            })
        }

        fn open_sink(&self, _path: &Path, _descriptor: &VideoDescriptor) -> Result<MockSink, FfmpegError> {
            self.spawns.set(self.spawns.get() + 1);
            Ok(MockSink {
                log: Rc::clone(&self.sink_log),
                fails_at: self.encoder_fails_at,
            })
        }
    }

    fn run(backend: MockBackend) -> (Pipeline<MockBackend>, Result<PipelineReport, PipelineError>) {
        let mut pipeline = Pipeline::with_backend(backend);
        let res = pipeline.run(PathBuf::from("in.mp4"), PathBuf::from("out.mp4"), &mut IdentityRestorer);
        (pipeline, res)
    }

    #[test]
    fn test_every_frame_is_written_in_order() {
        let (pipeline, res) = run(MockBackend::new(8, 6, 5));
        let report = res.unwrap();

        assert_eq!(report.frames_written, 5);
        assert_eq!(report.truncated_tail_bytes, 0);
        assert_eq!(report.descriptor.resolution(), (8, 6));
        assert_eq!(pipeline.state(), PipelineState::Done);

        let log = pipeline.backend().sink_log.borrow();
        assert!(log.finished);
        for (n, written) in log.frames.iter().enumerate() {
            assert_eq!(written, numbered_frame(8, 6, n as u8).as_raw());
        }
    }

    #[test]
    fn test_probe_failure_spawns_nothing() {
        let mut backend = MockBackend::new(8, 6, 5);
        backend.probe_error = Some(FfmpegError::FileNotFound("in.mp4".to_string()));

        let (pipeline, res) = run(backend);

        assert!(matches!(res, Err(PipelineError::Probe(FfmpegError::FileNotFound(_)))));
        assert_eq!(pipeline.backend().spawns.get(), 0);
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_decoder_failure_surfaces_diagnostics() {
        let mut backend = MockBackend::new(4, 4, 2);
        backend.decoder_exit = Err(process_failed(FfmpegRole::Decoder, "Invalid data found when processing input"));

        let (pipeline, res) = run(backend);
        let err = res.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stream {
                process: FfmpegRole::Decoder,
                ..
            }
        ));
        assert_eq!(err.diagnostics(), Some("Invalid data found when processing input"));

        // the encoder must not be allowed to finalize a partial output.
        let log = pipeline.backend().sink_log.borrow();
        assert_eq!(log.frames.len(), 2);
        assert!(!log.finished);
    }

    #[test]
    fn test_decoder_read_error_stops_writes() {
        let mut backend = MockBackend::new(4, 4, 5);
        backend.read_fails_at = Some(2);

        let (pipeline, res) = run(backend);

        match res.unwrap_err() {
            PipelineError::Stream {
                process: FfmpegRole::Decoder,
                source: FfmpegError::Io(msg),
            } => assert!(msg.contains("Broken pipe")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(pipeline.state(), PipelineState::Failed);

        let log = pipeline.backend().sink_log.borrow();
        assert_eq!(log.frames.len(), 2);
        assert!(!log.finished);
    }

    #[test]
    fn test_encoder_failure_stops_the_stream() {
        let mut backend = MockBackend::new(4, 4, 10);
        backend.encoder_fails_at = Some(3);

        let (pipeline, res) = run(backend);
        let err = res.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stream {
                process: FfmpegRole::Encoder,
                ..
            }
        ));
        assert_eq!(err.diagnostics(), Some("Broken pipe"));
        assert_eq!(pipeline.backend().sink_log.borrow().frames.len(), 3);
    }

    #[test]
    fn test_truncated_tail_is_dropped_and_counted() {
        let mut backend = MockBackend::new(4, 4, 3);
        backend.tail_bytes = 17;

        let (pipeline, res) = run(backend);
        let report = res.unwrap();

        assert_eq!(report.frames_written, 3);
        assert_eq!(report.truncated_tail_bytes, 17);
        assert_eq!(pipeline.backend().sink_log.borrow().frames.len(), 3);
    }

    #[test]
    fn test_empty_video() {
        let (pipeline, res) = run(MockBackend::new(4, 4, 0));

        assert_eq!(res.unwrap().frames_written, 0);
        assert!(pipeline.backend().sink_log.borrow().finished);
    }

    #[test]
    fn test_wrong_model_output_shape() {
        let mut pipeline = Pipeline::with_backend(MockBackend::new(4, 4, 3));
        let mut half_size = |_frame: ArrayView4<'_, f32>| Ok::<_, RestoreError>(Array4::<f32>::zeros((1, 3, 2, 2)));

        let err = pipeline.run("in.mp4", "out.mp4", &mut half_size).unwrap_err();

        match err {
            PipelineError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, vec![1, 3, 4, 4]);
                assert_eq!(actual, vec![1, 3, 2, 2]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(pipeline.backend().sink_log.borrow().frames.is_empty());
    }

    #[test]
    fn test_restore_failure_names_the_frame() {
        let mut pipeline = Pipeline::with_backend(MockBackend::new(4, 4, 3));
        let mut calls = 0;
        let mut flaky = |frame: ArrayView4<'_, f32>| {
            calls += 1;
            if calls == 2 {
                Err(RestoreError::Inference("out of memory".to_string()))
            } else {
                Ok(frame.to_owned())
            }
        };

        let err = pipeline.run("in.mp4", "out.mp4", &mut flaky).unwrap_err();

        assert!(matches!(err, PipelineError::Restore { frame: 1, .. }));
        assert_eq!(pipeline.backend().sink_log.borrow().frames.len(), 1);
    }

    #[test]
    fn test_restored_values_are_clamped() {
        let mut pipeline = Pipeline::with_backend(MockBackend::new(2, 2, 1));
        let mut overshoot = |frame: ArrayView4<'_, f32>| Ok::<_, RestoreError>(frame.mapv(|v| v * 10.0 - 5.0));

        pipeline.run("in.mp4", "out.mp4", &mut overshoot).unwrap();

        let log = pipeline.backend().sink_log.borrow();
        assert!(log.frames[0].iter().all(|&b| b == 0 || b == 255));
    }

    #[test]
    fn test_trait_object_restorer() {
        let mut pipeline = Pipeline::with_backend(MockBackend::new(2, 2, 2));
        let mut boxed: Box<dyn Restorer> = Box::new(IdentityRestorer);

        let report = pipeline.run("in.mp4", "out.mp4", boxed.as_mut()).unwrap();
        assert_eq!(report.frames_written, 2);
    }
}
