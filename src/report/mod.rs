pub mod narrative;
pub mod visualization;

use std::{collections::BTreeMap, path::Path};

use log::info;
use serde::Serialize;

use crate::{
    analysis::ela::{ElaResult, ElaStatus},
    classifier::{ClassificationResult, InferenceMode, Label},
    error::Result,
    metadata::exif::{MetadataStatus, MetadataSummary},
    report::narrative::{Narrative, NarrativeGenerator, NarrativeRequest, narrate},
};

/// Heuristic cut-off between "noisy" and "clean" ELA scores. Commentary only;
/// it never feeds back into the classifier verdict.
pub const ELA_NOISE_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElaAnnotation {
    HighNoise,
    LowNoise,
    /// ELA fell back to the empty map.
    Uninformative,
}

impl ElaAnnotation {
    pub fn from_result(ela: &ElaResult) -> Self {
        if !ela.is_informative() {
            ElaAnnotation::Uninformative
        } else if ela.score > ELA_NOISE_THRESHOLD {
            ElaAnnotation::HighNoise
        } else {
            ElaAnnotation::LowNoise
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ElaAnnotation::HighNoise => {
                "High noise levels detected, indicating potential resaving or manipulation."
            }
            ElaAnnotation::LowNoise => {
                "Low noise levels detected, consistent with original/high-quality compression."
            }
            ElaAnnotation::Uninformative => {
                "Error level analysis could not be computed; the score carries no information."
            }
        }
    }
}

/// Finished analysis of one image. Built once by [`ReportAssembler`]; the
/// only later change is attaching a narrative, which consumes the report.
#[derive(Debug, Clone)]
pub struct ForensicReport {
    classification: ClassificationResult,
    ela: ElaResult,
    ela_annotation: ElaAnnotation,
    metadata: MetadataSummary,
    narrative: Option<Narrative>,
}

impl ForensicReport {
    pub fn classification(&self) -> &ClassificationResult {
        &self.classification
    }

    pub fn ela(&self) -> &ElaResult {
        &self.ela
    }

    pub fn ela_score(&self) -> f64 {
        self.ela.score
    }

    pub fn ela_annotation(&self) -> ElaAnnotation {
        self.ela_annotation
    }

    pub fn metadata(&self) -> &MetadataSummary {
        &self.metadata
    }

    pub fn narrative(&self) -> Option<&Narrative> {
        self.narrative.as_ref()
    }

    /// Names of the signals that hold a fallback value instead of a measurement.
    pub fn uninformative_signals(&self) -> Vec<&'static str> {
        let mut signals = Vec::new();
        if self.classification.mode == InferenceMode::Demo {
            signals.push("classifier");
        }
        if self.ela_annotation == ElaAnnotation::Uninformative {
            signals.push("ela");
        }
        if !self.metadata.is_informative() {
            signals.push("metadata");
        }
        signals
    }

    pub fn narrative_request(&self) -> NarrativeRequest {
        NarrativeRequest {
            label: self.classification.label,
            confidence: self.classification.confidence,
            mode: self.classification.mode,
            metadata: self.metadata.fields.clone(),
            metadata_status: self.metadata.status,
            ela_score: self.ela.score,
            ela_annotation: self.ela_annotation,
        }
    }

    pub fn with_narrative(self, narrative: Narrative) -> Self {
        Self {
            narrative: Some(narrative),
            ..self
        }
    }

    pub fn narrate(self, generator: &dyn NarrativeGenerator) -> Self {
        let narrative = narrate(generator, &self.narrative_request());
        self.with_narrative(narrative)
    }

    pub fn save_ela_map<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.ela.save(path)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(JsonReport::from(self).to_json()?)
    }
}

pub struct ReportAssembler;

impl ReportAssembler {
    pub fn assemble(
        classification: ClassificationResult,
        ela: ElaResult,
        metadata: MetadataSummary,
    ) -> ForensicReport {
        let ela_annotation = ElaAnnotation::from_result(&ela);

        info!(
            "verdict {} ({:.2}%{}), ELA {:.2} {:?}, metadata {:?}",
            classification.label,
            classification.confidence * 100.0,
            if classification.mode == InferenceMode::Demo { ", demo" } else { "" },
            ela.score,
            ela_annotation,
            metadata.status
        );

        ForensicReport {
            classification,
            ela,
            ela_annotation,
            metadata,
            narrative: None,
        }
    }
}

#[derive(Serialize)]
pub struct JsonReport {
    pub label: Label,
    pub confidence: f64,
    pub inference_mode: InferenceMode,
    pub raw_score: Option<f64>,
    pub ela_analysis: ElaReportSection,
    pub metadata: MetadataReportSection,
    pub narrative: Option<Narrative>,
    pub uninformative_signals: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct ElaReportSection {
    pub score: f64,
    pub max_difference: u8,
    pub annotation: ElaAnnotation,
    pub note: &'static str,
    pub status: ElaStatus,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
pub struct MetadataReportSection {
    pub status: MetadataStatus,
    pub fields: BTreeMap<String, String>,
    pub suspicious_indicators: Vec<String>,
}

impl From<&ForensicReport> for JsonReport {
    fn from(report: &ForensicReport) -> Self {
        let (width, height) = report.ela.map.dimensions();

        Self {
            label: report.classification.label,
            confidence: report.classification.confidence,
            inference_mode: report.classification.mode,
            raw_score: report.classification.raw_score,
            ela_analysis: ElaReportSection {
                score: report.ela.score,
                max_difference: report.ela.max_difference,
                annotation: report.ela_annotation,
                note: report.ela_annotation.describe(),
                status: report.ela.status.clone(),
                width,
                height,
            },
            metadata: MetadataReportSection {
                status: report.metadata.status,
                fields: report.metadata.fields.clone(),
                suspicious_indicators: report.metadata.suspicious_indicators.clone(),
            },
            narrative: report.narrative.clone(),
            uninformative_signals: report.uninformative_signals(),
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ela::ElaAnalyzer;
    use crate::image_utils::test_images::*;

    fn computed_ela(score_hint: u8) -> ElaResult {
        let original = flat(2, 2, 100);
        let mut recompressed = original.clone();
        if score_hint > 0 {
            recompressed.put_pixel(0, 0, image::Rgb([100 + score_hint, 100, 100]));
        }
        ElaAnalyzer::default().compare(&original, &recompressed).unwrap()
    }

    #[test]
    fn test_annotation_threshold() {
        let clean = computed_ela(0);
        assert_eq!(ElaAnnotation::from_result(&clean), ElaAnnotation::LowNoise);

        // one channel at 255 out of twelve: mean 21.25
        let noisy = computed_ela(3);
        assert_eq!(ElaAnnotation::from_result(&noisy), ElaAnnotation::HighNoise);

        let failed = ElaResult::fallback("boom");
        assert_eq!(ElaAnnotation::from_result(&failed), ElaAnnotation::Uninformative);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut ela = computed_ela(0);
        ela.score = ELA_NOISE_THRESHOLD;
        assert_eq!(ElaAnnotation::from_result(&ela), ElaAnnotation::LowNoise);
    }

    #[test]
    fn test_degraded_inputs_still_assemble() {
        let report = ReportAssembler::assemble(
            ClassificationResult::demo(),
            ElaResult::fallback("decode failed"),
            MetadataSummary::failed("Failed to extract EXIF: truncated"),
        );

        assert_eq!(report.uninformative_signals(), vec!["classifier", "ela", "metadata"]);
        assert_eq!(report.ela_score(), 0.0);
        assert!(report.narrative().is_none());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"inference_mode\": \"demo\""));
        assert!(json.contains("\"state\": \"fallback\""));
        assert!(json.contains("Failed to extract EXIF: truncated"));
    }

    #[test]
    fn test_narrative_request_mirrors_report() {
        let report = ReportAssembler::assemble(
            ClassificationResult::from_probability(0.1),
            computed_ela(0),
            MetadataSummary::empty(),
        );
        let request = report.narrative_request();

        assert_eq!(request.label, Label::Fake);
        assert!((request.confidence - 0.9).abs() < 1e-12);
        assert_eq!(request.ela_annotation, ElaAnnotation::LowNoise);
        assert_eq!(request.metadata_line(), "Info: No EXIF metadata found.");
        assert_eq!(report.uninformative_signals(), vec!["metadata"]);
    }

    #[test]
    fn test_missing_metadata_is_uninformative() {
        let report = ReportAssembler::assemble(
            ClassificationResult::from_probability(0.9),
            ElaResult::fallback("x"),
            MetadataSummary::empty(),
        );

        assert!(!report.metadata().is_informative());
        assert_eq!(report.uninformative_signals(), vec!["ela", "metadata"]);
    }

    #[test]
    fn test_with_narrative_leaves_verdict_untouched() {
        let report = ReportAssembler::assemble(
            ClassificationResult::from_probability(0.8),
            computed_ela(0),
            MetadataSummary::empty(),
        );
        let before = report.classification().clone();

        let narrated =
            report.with_narrative(Narrative::Placeholder("generation error: timeout".into()));

        assert_eq!(narrated.classification(), &before);
        assert_eq!(narrated.narrative().unwrap().text(), "generation error: timeout");
    }
}
