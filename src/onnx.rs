//! A [`Restorer`] backed by an exported ONNX model, run through onnxruntime.

use std::path::Path;

use ndarray::{ArrayView4, Ix4};
use ort::{inputs, session::Session, value::TensorRef};

use crate::*;

/// Runs one input through an ONNX model and keeps one of its outputs as the restored frame.
pub struct OnnxRestorer {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    output_index: usize,
}

impl std::fmt::Debug for OnnxRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRestorer")
            .field("input_name", &self.input_name)
            .field("output_names", &self.output_names)
            .field("output_index", &self.output_index)
            .finish()
    }
}

impl OnnxRestorer {
    /// Load the model stored at `path` onto the device named by `cfg`.
    pub fn load(path: impl AsRef<Path>, cfg: &RestorerCfg) -> Result<Self, RestoreError> {
        let path = path.as_ref();
        let mut builder = Session::builder()
            .map_err(|e| RestoreError::ModelLoad(format!("failed to create session builder: {e}")))?;

        builder = match cfg.device {
            DeviceCfg::Cpu => builder,

            #[cfg(feature = "cuda")]
            DeviceCfg::Cuda { device_id } => {
                use ort::ep::ExecutionProvider;
                use ort::execution_providers::CUDAExecutionProvider;

                let ep = CUDAExecutionProvider::default().with_device_id(device_id as i32);
                if !ep.is_available().unwrap_or(false) {
                    warn!("cuda execution provider is not available, onnxruntime may fall back to the cpu");
                }
                builder
                    .with_execution_providers([ep.build()])
                    .map_err(|_| RestoreError::UnsupportedDevice(cfg.device.to_string()))?
            }

            #[cfg(not(feature = "cuda"))]
            DeviceCfg::Cuda { .. } => {
                return Err(RestoreError::UnsupportedDevice(cfg.device.to_string()));
            }
        };

        let session = builder
            .commit_from_file(path)
            .map_err(|e| RestoreError::ModelLoad(format!("{}: {e}", path.display())))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| RestoreError::ModelLoad(format!("{}: model has no inputs", path.display())))?;
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();

        if cfg.output_index >= output_names.len() {
            return Err(RestoreError::MissingOutput {
                index: cfg.output_index,
                available: output_names.len(),
            });
        }

        info!(
            "loaded {} on {}: input {:?}, using output {:?} of {:?}",
            path.display(),
            cfg.device,
            input_name,
            output_names[cfg.output_index],
            output_names
        );

        Ok(Self {
            session,
            input_name,
            output_names,
            output_index: cfg.output_index,
        })
    }
}

impl Restorer for OnnxRestorer {
    fn restore(&mut self, frame: ArrayView4<'_, f32>) -> Result<FrameTensor, RestoreError> {
        let frame = frame.as_standard_layout();
        let input = TensorRef::from_array_view(frame.view())
            .map_err(|e| RestoreError::Inference(format!("failed to create input tensor: {e}")))?;

        let output_name = self
            .output_names
            .get(self.output_index)
            .ok_or(RestoreError::MissingOutput {
                index: self.output_index,
                available: self.output_names.len(),
            })?;

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input])
            .map_err(|e| RestoreError::Inference(e.to_string()))?;

        let restored = outputs[output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| RestoreError::Inference(format!("output {output_name:?} is not f32: {e}")))?;

        let shape = restored.shape().to_vec();
        let restored = restored
            .into_dimensionality::<Ix4>()
            .map_err(|_| RestoreError::OutputShape(shape.clone()))?;

        let (batch, channels, _, _) = restored.dim();
        if batch != definitions::BATCH || channels != definitions::CHANNELS {
            return Err(RestoreError::OutputShape(shape));
        }

        Ok(restored.to_owned())
    }
}
