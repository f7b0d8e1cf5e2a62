use std::{env, fs, path::{Path, PathBuf}, str::FromStr, sync::Arc};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::ela::{DEFAULT_ELA_QUALITY, ElaAnalyzer},
    classifier::{Classifier, ClassifierAdapter, ModelHandle, shared_model},
    error::{ForensicsError, Result},
    image_utils::{DecodedImage, ImageDecoder, Normalization, TargetSize},
    metadata::exif::ExifExtractor,
    report::{
        ForensicReport, ReportAssembler,
        narrative::{NarrativeConfig, NarrativeGenerator, OpenAiNarrator},
    },
};

pub mod error;
pub mod image_utils;
pub mod analysis;
pub mod classifier;
pub mod metadata;
pub mod report;

pub use analysis::ela::ElaResult;
pub use classifier::{ClassificationResult, Label};
pub use metadata::exif::MetadataSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ela_quality: u8,
    pub target_size: TargetSize,
    pub normalization: Normalization,
    pub parallel: bool,
    pub model_path: Option<PathBuf>,
    pub narrative: NarrativeConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ela_quality: DEFAULT_ELA_QUALITY,
            target_size: TargetSize::default(),
            normalization: Normalization::default(),
            parallel: true,
            model_path: None,
            narrative: NarrativeConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(quality) = env_var::<u8>("FORENSICS_ELA_QUALITY")? {
            config.ela_quality = quality;
        }
        if let Ok(path) = env::var("FORENSICS_MODEL_PATH") {
            config.model_path = Some(PathBuf::from(path));
        }
        if let Ok(model) = env::var("FORENSICS_NARRATIVE_MODEL") {
            config.narrative.model = model;
        }
        if let Some(timeout) = env_var::<u64>("FORENSICS_NARRATIVE_TIMEOUT_SECS")? {
            config.narrative.timeout_secs = timeout;
        }
        config.narrative.api_key = env::var("OPENAI_API_KEY").ok();

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.ela_quality) {
            return Err(ForensicsError::InvalidParameter(format!(
                "ela_quality must be within 1-100, got {}",
                self.ela_quality
            )));
        }
        if self.target_size.width == 0 || self.target_size.height == 0 {
            return Err(ForensicsError::InvalidParameter(
                "target_size must be non-zero".into(),
            ));
        }
        if let Some(std) = self.normalization.std.iter().find(|s| s.is_nan() || **s <= 0.0) {
            return Err(ForensicsError::InvalidParameter(format!(
                "normalization std must be positive, got {}",
                std
            )));
        }
        if self.narrative.timeout_secs == 0 {
            return Err(ForensicsError::InvalidParameter(
                "narrative timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ForensicsError::InvalidParameter(format!("{} has invalid value {:?}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

/// End-to-end pipeline: decode, classify, ELA, metadata, assemble.
pub struct ForensicsAnalyzer {
    config: AnalysisConfig,
    decoder: ImageDecoder,
    classifier: ClassifierAdapter,
    narrator: Option<Box<dyn NarrativeGenerator>>,
}

impl ForensicsAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        let decoder = ImageDecoder::new()
            .with_target_size(config.target_size)
            .with_normalization(config.normalization);

        let model = match &config.model_path {
            Some(path) => shared_model(path),
            None => ModelHandle::unavailable("no model path configured"),
        };

        Ok(Self {
            config,
            decoder,
            classifier: ClassifierAdapter::new(model),
            narrator: None,
        })
    }

    /// Pipeline wired from the environment, with the OpenAI narrator attached.
    pub fn from_env() -> Result<Self> {
        let config = AnalysisConfig::from_env()?;
        let narrator = OpenAiNarrator::new(config.narrative.clone());
        Ok(Self::new(config)?.with_narrator(Box::new(narrator)))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = ClassifierAdapter::with_classifier(classifier);
        self
    }

    pub fn with_narrator(mut self, narrator: Box<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelHandle {
        self.classifier.model()
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        self.decoder.decode(bytes)
    }

    /// Only a decode failure is returned as an error; every other stage
    /// degrades to its fallback inside the report.
    pub fn analyze(&self, bytes: &[u8]) -> Result<ForensicReport> {
        let decoded = self.decode(bytes)?;
        debug!(
            "analyzing {:?} image {}x{}",
            decoded.format, decoded.source_width, decoded.source_height
        );

        let classification = self.classifier.classify(&decoded.tensor);

        let ela = ElaAnalyzer::new(self.config.ela_quality)
            .with_parallel(self.config.parallel)
            .analyze(bytes);

        let metadata = ExifExtractor::new().extract(bytes);

        Ok(ReportAssembler::assemble(classification, ela, metadata))
    }

    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<ForensicReport> {
        let path = path.as_ref();
        info!("analyzing {}", path.display());
        let bytes = fs::read(path)?;
        self.analyze(&bytes)
    }

    /// [`analyze`](Self::analyze) followed by the narrative step, if a
    /// narrator is attached.
    pub fn analyze_with_narrative(&self, bytes: &[u8]) -> Result<ForensicReport> {
        let report = self.analyze(bytes)?;

        Ok(match &self.narrator {
            Some(narrator) => report.narrate(narrator.as_ref()),
            None => report,
        })
    }
}
