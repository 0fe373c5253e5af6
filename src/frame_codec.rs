//! Conversions between raw rgb24 frames and the tensors a restoration model consumes.
//!
//! A raw frame is `height * width * 3` bytes with interleaved channels (`HWC`). A frame
//! tensor has shape `(1, 3, height, width)` (`NCHW`) and holds values normalized to `[0, 1]`.

use image::RgbImage;
use ndarray::{Array4, ArrayView3, ArrayView4, Axis};

use crate::definitions::{BATCH, CHANNELS, SAMPLE_MAX};
use crate::PipelineError;

/// A single frame laid out as `(1, 3, height, width)`.
pub type FrameTensor = Array4<f32>;

/// The shape of the tensor holding one `width` x `height` frame.
pub fn tensor_shape(width: u32, height: u32) -> [usize; 4] {
    [BATCH, CHANNELS, height as usize, width as usize]
}

/// Interpret `raw` as one rgb24 frame and convert it into a normalized frame tensor.
///
/// # errors
/// `raw` must hold exactly `width * height * 3` bytes.
pub fn decode(raw: &[u8], width: u32, height: u32) -> Result<FrameTensor, PipelineError> {
    let (w, h) = (width as usize, height as usize);
    let shape_mismatch = || PipelineError::ShapeMismatch {
        expected: vec![h * w * CHANNELS],
        actual: vec![raw.len()],
    };

    // from_shape accepts a slice that is longer than the view.
    if raw.len() != h * w * CHANNELS {
        return Err(shape_mismatch());
    }

    let hwc = ArrayView3::from_shape((h, w, CHANNELS), raw).map_err(|_| shape_mismatch())?;

    let tensor = Array4::from_shape_fn((BATCH, CHANNELS, h, w), |(_, c, y, x)| {
        f32::from(hwc[[y, x, c]]) / SAMPLE_MAX
    });

    Ok(tensor)
}

pub fn decode_image(frame: &RgbImage) -> Result<FrameTensor, PipelineError> {
    decode(frame.as_raw(), frame.width(), frame.height())
}

/// Convert a frame tensor back into rgb24 bytes. Values are clamped to `[0, 1]`, scaled to
/// `[0, 255]` and truncated.
pub fn encode(tensor: ArrayView4<'_, f32>) -> Result<Vec<u8>, PipelineError> {
    let (_, _, h, w) = tensor.dim();
    let mut raw = vec![0; h * w * CHANNELS];
    encode_into(tensor, &mut raw)?;
    Ok(raw)
}

/// As [`encode`], but writes into an existing buffer of exactly `height * width * 3` bytes.
pub fn encode_into(tensor: ArrayView4<'_, f32>, raw: &mut [u8]) -> Result<(), PipelineError> {
    let (batch, channels, h, w) = tensor.dim();
    if batch != BATCH || channels != CHANNELS {
        return Err(PipelineError::ShapeMismatch {
            expected: vec![BATCH, CHANNELS, h, w],
            actual: tensor.shape().to_vec(),
        });
    }

    if raw.len() != h * w * CHANNELS {
        return Err(PipelineError::ShapeMismatch {
            expected: vec![h * w * CHANNELS],
            actual: vec![raw.len()],
        });
    }

    // Iterating (H, W, C) in logical order produces interleaved pixels.
    let hwc = tensor.index_axis(Axis(0), 0).permuted_axes([1, 2, 0]);
    for (dst, &value) in raw.iter_mut().zip(hwc.iter()) {
        *dst = to_sample(value);
    }

    Ok(())
}

pub fn encode_image(tensor: ArrayView4<'_, f32>) -> Result<RgbImage, PipelineError> {
    let (_, _, h, w) = tensor.dim();
    let raw = encode(tensor)?;

    let width = u32::try_from(w).ok();
    let height = u32::try_from(h).ok();
    width
        .zip(height)
        .and_then(|(width, height)| RgbImage::from_raw(width, height, raw))
        .ok_or_else(|| PipelineError::ShapeMismatch {
            expected: vec![BATCH, CHANNELS, h, w],
            actual: tensor.shape().to_vec(),
        })
}

fn to_sample(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }

    (value.clamp(0.0, 1.0) * SAMPLE_MAX) as u8
}
