use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;
use ort::{session::Session, value::Value};

/// A trained binary classifier over one feature vector.
pub trait Classifier {
    /// Probability of the positive class, in [0, 1].
    fn predict(&mut self, features: &[f32]) -> Result<f32>;
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn predict(&mut self, features: &[f32]) -> Result<f32> {
        (**self).predict(features)
    }
}

/// ONNX export of the dense feature classifier: `[1, k]` f32 in, a single
/// sigmoid probability out.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    pub fn from_file(path: &Path) -> Result<Self> {
        let session =
            anthropo_vision::model::session_from_file(path).context("load classifier model")?;
        Ok(Self { session })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&mut self, features: &[f32]) -> Result<f32> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())?;
        let outputs = self.session.run(ort::inputs![Value::from_array(input)?])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let p = data
            .first()
            .copied()
            .context("classifier returned an empty tensor")?;
        Ok(p.clamp(0.0, 1.0))
    }
}
