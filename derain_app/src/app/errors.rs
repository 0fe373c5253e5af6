use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("cannot load {0}: this build of derain was compiled without model support. Rebuild with `--features onnx`, or use --passthrough")]
    ModelSupportMissing(PathBuf),

    #[error("model file not found: {0}")]
    WeightsNotFound(PathBuf),

    #[error("input and output are the same file: {0}")]
    OutputIsInput(PathBuf),
}

pub fn print_error_and_quit(e: eyre::Report) -> ! {
    #[allow(clippy::print_stderr)]
    let () = eprintln!("{:?}", e);
    std::process::exit(1);
}
