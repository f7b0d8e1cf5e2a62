//! Binary REAL/FAKE classification over an opaque scoring model.
//!
//! Any model that maps a `[1, H, W, 3]` tensor to a single probability of the
//! image being REAL can sit behind [`Classifier`]. When no model is loaded the
//! adapter answers with a fixed demo verdict that is tagged as such.

#[cfg(feature = "onnx")]
pub mod onnx;

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use log::{info, warn};
use ndarray::Array4;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{ForensicsError, Result};

pub const DEMO_CONFIDENCE: f64 = 0.88;

pub trait Classifier: Send + Sync {
    /// Probability in `[0, 1]` that the image is REAL.
    fn score(&self, tensor: &Array4<f32>) -> Result<f32>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Real,
    Fake,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Real => write!(f, "REAL"),
            Label::Fake => write!(f, "FAKE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    Model,
    /// No usable model; the verdict is a placeholder.
    Demo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: Label,
    /// Probability of the winning class.
    pub confidence: f64,
    pub mode: InferenceMode,
    pub raw_score: Option<f64>,
}

impl ClassificationResult {
    /// `raw > 0.5` is REAL; `0.5` itself goes to FAKE.
    pub fn from_probability(raw: f64) -> Self {
        let (label, confidence) = if raw > 0.5 {
            (Label::Real, raw)
        } else {
            (Label::Fake, 1.0 - raw)
        };

        Self {
            label,
            confidence,
            mode: InferenceMode::Model,
            raw_score: Some(raw),
        }
    }

    pub fn demo() -> Self {
        Self {
            label: Label::Fake,
            confidence: DEMO_CONFIDENCE,
            mode: InferenceMode::Demo,
            raw_score: None,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.mode == InferenceMode::Demo
    }
}

#[derive(Clone)]
pub enum ModelHandle {
    Loaded(Arc<dyn Classifier>),
    Unavailable { reason: String },
}

impl ModelHandle {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ModelHandle::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelHandle::Loaded(_))
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHandle::Loaded(model) => f.debug_tuple("Loaded").field(&model.name()).finish(),
            ModelHandle::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Loads a model artifact. Never fails; problems come back as `Unavailable`.
pub fn load_model<P: AsRef<Path>>(path: P) -> ModelHandle {
    let path = path.as_ref();

    match try_load_model(path) {
        Ok(model) => {
            info!("loaded classifier {} from {}", model.name(), path.display());
            ModelHandle::Loaded(model)
        }
        Err(e) => {
            warn!("classifier unavailable, running in demo mode: {}", e);
            ModelHandle::unavailable(e.to_string())
        }
    }
}

fn try_load_model(path: &Path) -> Result<Arc<dyn Classifier>> {
    if !path.is_file() {
        return Err(ForensicsError::ClassifierUnavailable(format!(
            "no model artifact at {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        #[cfg(feature = "onnx")]
        Some("onnx") => Ok(Arc::new(onnx::OnnxClassifier::load(path)?)),
        Some(other) => Err(ForensicsError::ClassifierUnavailable(format!(
            "no backend for .{} model artifacts",
            other
        ))),
        None => Err(ForensicsError::ClassifierUnavailable(format!(
            "cannot infer model format of {}",
            path.display()
        ))),
    }
}

static MODEL_CACHE: LazyLock<RwLock<HashMap<PathBuf, ModelHandle>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Process-wide memoised [`load_model`]. Each path is loaded at most once and
/// the cached handle is never replaced.
pub fn shared_model<P: AsRef<Path>>(path: P) -> ModelHandle {
    let path = cache_key(path.as_ref());

    if let Some(handle) = MODEL_CACHE.read().get(&path) {
        return handle.clone();
    }

    let mut cache = MODEL_CACHE.write();
    cache
        .entry(path)
        .or_insert_with_key(|path| load_model(path))
        .clone()
}

/// Canonical form of `path`, or of its parent for a file that does not exist
/// yet; the raw path when neither resolves.
fn cache_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    parent
        .canonicalize()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|_| path.to_path_buf())
}

pub struct ClassifierAdapter {
    model: ModelHandle,
}

impl ClassifierAdapter {
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        Self::new(ModelHandle::Loaded(classifier))
    }

    pub fn demo() -> Self {
        Self::new(ModelHandle::unavailable("no model configured"))
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn classify(&self, tensor: &Array4<f32>) -> ClassificationResult {
        match self.try_classify(tensor) {
            Ok(result) => result,
            Err(e) => {
                warn!("classification degraded to demo result: {}", e);
                ClassificationResult::demo()
            }
        }
    }

    pub fn try_classify(&self, tensor: &Array4<f32>) -> Result<ClassificationResult> {
        let model = match &self.model {
            ModelHandle::Loaded(model) => model,
            ModelHandle::Unavailable { reason } => {
                return Err(ForensicsError::ClassifierUnavailable(reason.clone()));
            }
        };

        let raw = model.score(tensor)? as f64;
        if !(0.0..=1.0).contains(&raw) {
            return Err(ForensicsError::Inference(format!(
                "{} returned {} outside [0, 1]",
                model.name(),
                raw
            )));
        }

        Ok(ClassificationResult::from_probability(raw))
    }
}

#[cfg(test)]
pub(crate) mod test_models {
    use super::*;

    pub struct FixedScore(pub f32);

    impl Classifier for FixedScore {
        fn score(&self, _tensor: &Array4<f32>) -> Result<f32> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed-score"
        }
    }

    pub struct Broken;

    impl Classifier for Broken {
        fn score(&self, _tensor: &Array4<f32>) -> Result<f32> {
            Err(ForensicsError::Inference("backend crashed".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_models::*;
    use super::*;

    fn tensor() -> Array4<f32> {
        Array4::zeros((1, 4, 4, 3))
    }

    #[test]
    fn test_probability_mapping() {
        let real = ClassificationResult::from_probability(0.93);
        assert_eq!(real.label, Label::Real);
        assert!((real.confidence - 0.93).abs() < 1e-12);

        let fake = ClassificationResult::from_probability(0.2);
        assert_eq!(fake.label, Label::Fake);
        assert!((fake.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_half_goes_to_fake() {
        let result = ClassificationResult::from_probability(0.5);
        assert_eq!(result.label, Label::Fake);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_confidence_is_for_winning_class() {
        for step in 0..=1000 {
            let raw = step as f64 / 1000.0;
            if raw == 0.5 {
                continue;
            }
            let result = ClassificationResult::from_probability(raw);
            assert!(result.confidence > 0.5 && result.confidence <= 1.0, "raw {}", raw);
        }
    }

    #[test]
    fn test_demo_result_is_tagged() {
        let result = ClassifierAdapter::demo().classify(&tensor());

        assert_eq!(result.label, Label::Fake);
        assert_eq!(result.confidence, 0.88);
        assert!(result.is_demo());
        assert!(result.raw_score.is_none());
    }

    #[test]
    fn test_loaded_model_is_used() {
        let adapter = ClassifierAdapter::with_classifier(Arc::new(FixedScore(0.75)));
        let result = adapter.classify(&tensor());

        assert_eq!(result.label, Label::Real);
        assert_eq!(result.mode, InferenceMode::Model);
        assert_eq!(result.raw_score, Some(0.75));
    }

    #[test]
    fn test_failing_or_invalid_model_degrades_to_demo() {
        for model in [
            Arc::new(Broken) as Arc<dyn Classifier>,
            Arc::new(FixedScore(f32::NAN)) as Arc<dyn Classifier>,
            Arc::new(FixedScore(1.5)) as Arc<dyn Classifier>,
        ] {
            let adapter = ClassifierAdapter::with_classifier(model);
            assert!(adapter.try_classify(&tensor()).is_err());
            assert!(adapter.classify(&tensor()).is_demo());
        }
    }

    #[test]
    fn test_missing_model_path_is_unavailable() {
        let handle = load_model("/nonexistent/model.onnx");
        assert!(!handle.is_loaded());
    }

    #[test]
    fn test_unknown_artifact_format_is_unavailable() {
        let file = tempfile::Builder::new().suffix(".h5").tempfile().unwrap();
        let handle = load_model(file.path());

        match handle {
            ModelHandle::Unavailable { reason } => assert!(reason.contains(".h5")),
            ModelHandle::Loaded(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_shared_model_is_memoised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");

        let first = shared_model(&path);
        std::fs::write(&path, b"not a model").unwrap();
        let second = shared_model(&path);

        match (first, second) {
            (
                ModelHandle::Unavailable { reason: a },
                ModelHandle::Unavailable { reason: b },
            ) => assert_eq!(a, b),
            _ => panic!("expected cached unavailable handle"),
        }
    }

    #[test]
    fn test_shared_model_keys_by_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let direct = dir.path().join("weights.h5");
        let indirect = dir.path().join("sub").join("..").join("weights.h5");
        std::fs::write(&direct, b"not a model").unwrap();

        shared_model(&direct);
        shared_model(&indirect);

        let root = dir.path().canonicalize().unwrap();
        let cached = MODEL_CACHE
            .read()
            .keys()
            .filter(|key| key.starts_with(&root))
            .count();
        assert_eq!(cached, 1);
    }
}
