/// Number of colour channels in a raw frame and in a frame tensor.
pub const CHANNELS: usize = 3;

/// Frame tensors hold a batch of exactly one frame.
pub const BATCH: usize = 1;

/// The largest value an 8 bit sample can take. Tensors are normalized by dividing by this.
pub const SAMPLE_MAX: f32 = 255.0;

/// The input file that is restored when no other input is given.
pub const DEFAULT_INPUT_FILE: &str = "input.mp4";

/// The output file written when no other output is given.
pub const DEFAULT_OUTPUT_FILE: &str = "output.mp4";

/// Most restoration models return several tensors (e.g. one per refinement stage). The
/// final, fully restored frame is conventionally the first.
pub const DEFAULT_OUTPUT_INDEX: usize = 0;

/// How often (in frames) progress is reported at info level.
pub const PROGRESS_INTERVAL: u64 = 100;
