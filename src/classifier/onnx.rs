use std::path::Path;

use ndarray::Array4;
use ort::{session::Session, value::Tensor};
use parking_lot::Mutex;

use crate::{
    classifier::Classifier,
    error::{ForensicsError, Result},
};

/// ONNX export of a single-sigmoid binary classifier taking NHWC float input.
pub struct OnnxClassifier {
    // Inference needs `&mut Session`; the lock only serialises runs.
    session: Mutex<Session>,
    name: String,
}

impl OnnxClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| ForensicsError::ClassifierUnavailable(e.to_string()))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".into());

        Ok(Self {
            session: Mutex::new(session),
            name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn score(&self, tensor: &Array4<f32>) -> Result<f32> {
        let (batch, height, width, channels) = tensor.dim();
        let data = tensor.iter().copied().collect::<Vec<f32>>();

        let input = Tensor::from_array(([batch, height, width, channels], data))
            .map_err(|e| ForensicsError::Inference(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| ForensicsError::Inference(e.to_string()))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ForensicsError::Inference(e.to_string()))?;

        scores
            .first()
            .copied()
            .ok_or_else(|| ForensicsError::Inference("model produced an empty output".into()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
