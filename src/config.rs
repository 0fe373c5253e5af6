use std::fmt;
use std::time::Duration;

use ffmpeg_cmdline_utils::{DecoderCfg, EncoderCfg, FrameRate};
use serde::{Deserialize, Serialize};

use crate::definitions::DEFAULT_OUTPUT_INDEX;

/// Where the restoration model runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCfg {
    #[default]
    Cpu,
    Cuda {
        device_id: u32,
    },
}

impl DeviceCfg {
    /// `None` selects the cpu, anything else selects that accelerator.
    pub fn from_gpu_id(gpu: Option<u32>) -> Self {
        match gpu {
            Some(device_id) => Self::Cuda { device_id },
            None => Self::Cpu,
        }
    }
}

impl fmt::Display for DeviceCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

/// How a restoration model is loaded and which of its outputs is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorerCfg {
    pub device: DeviceCfg,

    /// Index into the model's list of outputs of the tensor holding the restored frame.
    pub output_index: usize,
}

impl Default for RestorerCfg {
    fn default() -> Self {
        Self {
            device: DeviceCfg::default(),
            output_index: DEFAULT_OUTPUT_INDEX,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCfg {
    pub decoder: DecoderCfg,
    pub encoder: EncoderCfg,

    /// ffprobe is killed if it has not described the input by then.
    pub probe_timeout: Duration,

    /// Used by the encoder when the input does not declare a frame rate.
    pub fallback_frame_rate: FrameRate,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            decoder: DecoderCfg::default(),
            encoder: EncoderCfg::default(),
            probe_timeout: Duration::from_secs(60),
            fallback_frame_rate: FrameRate::default(),
        }
    }
}
