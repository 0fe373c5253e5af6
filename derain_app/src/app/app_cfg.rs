use std::path::PathBuf;

use derain_video::{PipelineCfg, RestorerCfg};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportVerbosity {
    Quiet,
    Default,
    Verbose,
}

/// Which restoration is applied to each frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCfg {
    /// Frames are written back unchanged.
    Passthrough,

    Weights { path: PathBuf, restorer: RestorerCfg },
}

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub input: PathBuf,
    pub output: PathBuf,
    pub model: ModelCfg,
    pub pipeline: PipelineCfg,
    pub verbosity: ReportVerbosity,
}
