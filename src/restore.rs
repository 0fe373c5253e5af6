use ndarray::ArrayView4;

use crate::{FrameTensor, RestoreError};

/// An image restoration model, seen as a function from one frame to one restored frame.
///
/// The input has shape `(1, 3, H, W)` with values in `[0, 1]`. The output must have the same
/// shape, but its values may fall outside `[0, 1]`; they are clamped when the frame is converted
/// back into bytes.
///
/// Implementations are only ever used for inference. The pipeline drops both the input and the
/// returned tensor before it reads the next frame.
pub trait Restorer {
    fn restore(&mut self, frame: ArrayView4<'_, f32>) -> Result<FrameTensor, RestoreError>;
}

impl<F> Restorer for F
where
    F: FnMut(ArrayView4<'_, f32>) -> Result<FrameTensor, RestoreError>,
{
    fn restore(&mut self, frame: ArrayView4<'_, f32>) -> Result<FrameTensor, RestoreError> {
        self(frame)
    }
}

/// Returns every frame unchanged. Useful to check the decode/encode path on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRestorer;

impl Restorer for IdentityRestorer {
    fn restore(&mut self, frame: ArrayView4<'_, f32>) -> Result<FrameTensor, RestoreError> {
        Ok(frame.to_owned())
    }
}

#[cfg(test)]
mod test {
    use ndarray::Array4;

    use super::*;

    #[test]
    fn test_identity_returns_input() {
        let frame = Array4::from_shape_fn((1, 3, 2, 2), |(_, c, y, x)| (c + y + x) as f32 / 10.0);

        let restored = IdentityRestorer.restore(frame.view()).unwrap();
        assert_eq!(restored, frame);
    }

    #[test]
    fn test_closures_are_restorers() {
        let mut calls = 0;
        let mut invert = |frame: ArrayView4<'_, f32>| {
            calls += 1;
            Ok::<_, RestoreError>(frame.mapv(|v| 1.0 - v))
        };

        let frame = Array4::<f32>::zeros((1, 3, 1, 1));
        let restored = invert.restore(frame.view()).unwrap();

        assert!(restored.iter().all(|v| *v == 1.0));
        drop(invert);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_restorers_are_object_safe() {
        let mut boxed: Box<dyn Restorer> = Box::new(IdentityRestorer);
        let restorer: &mut dyn Restorer = boxed.as_mut();

        let frame = Array4::<f32>::ones((1, 3, 2, 1));
        assert_eq!(restorer.restore(frame.view()).unwrap(), frame);
    }
}
