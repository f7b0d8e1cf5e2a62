//! Natural-language explanation of a finished report.
//!
//! The generator itself is an external service; this module only builds its
//! input, performs the call and maps every failure to a placeholder text so
//! the already computed verdict is never lost.

use std::{collections::BTreeMap, time::Duration};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{InferenceMode, Label},
    error::{ForensicsError, Result},
    metadata::exif::{MetadataStatus, NO_METADATA_MESSAGE},
    report::ElaAnnotation,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a Digital Forensics Expert AI. Your task is to analyze technical image analysis data \
and provide a professional, neutral, and factual summary report.\n\
Do NOT invent facts. Do NOT say you looked at the image pixels (you only see metadata).\n\
If the confidence is low (below 70%), express uncertainty.\n\
Structure your response:\n\
1. **Analysis Conclusion**: One sentence summary.\n\
2. **Key Findings**: Bullet points on Model Prediction, EXIF consistency, and ELA indications.\n\
3. **Verdict**: Final assessment based on provided data.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.3,
            max_tokens: 300,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

/// Everything the explanation generator gets to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeRequest {
    pub label: Label,
    pub confidence: f64,
    pub mode: InferenceMode,
    pub metadata: BTreeMap<String, String>,
    pub metadata_status: MetadataStatus,
    pub ela_score: f64,
    pub ela_annotation: ElaAnnotation,
}

impl NarrativeRequest {
    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    pub fn metadata_line(&self) -> String {
        let joined = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(", ");

        if joined.is_empty() {
            NO_METADATA_MESSAGE.to_string()
        } else {
            joined
        }
    }

    pub fn ela_line(&self) -> String {
        format!(
            "Average Noise Level: {:.2} (Scale 0-255). Note: {}",
            self.ela_score,
            self.ela_annotation.describe()
        )
    }

    pub fn user_prompt(&self) -> String {
        let demo_note = match self.mode {
            InferenceMode::Demo => " [demo placeholder, no trained model was loaded]",
            InferenceMode::Model => "",
        };

        format!(
            "Analyze the following data for an image suspected of being Deepfake/AI-generated:\n\n\
             **Model Prediction**: {} (Confidence: {:.2}%){}\n\
             **EXIF Metadata**: {}\n\
             **Error Level Analysis (ELA)**: {}\n\n\
             Provide a short forensic report explaining these results to a non-expert user.",
            self.label,
            self.confidence * 100.0,
            demo_note,
            self.metadata_line(),
            self.ela_line()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Narrative {
    Generated(String),
    /// Stands in for a narrative that could not be produced.
    Placeholder(String),
}

impl Narrative {
    pub fn text(&self) -> &str {
        match self {
            Narrative::Generated(text) | Narrative::Placeholder(text) => text,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Narrative::Generated(_))
    }
}

pub trait NarrativeGenerator: Send + Sync {
    fn generate(&self, request: &NarrativeRequest) -> Result<String>;
}

/// Runs the generator and folds any failure into a placeholder.
pub fn narrate(generator: &dyn NarrativeGenerator, request: &NarrativeRequest) -> Narrative {
    match generator.generate(request) {
        Ok(text) => Narrative::Generated(text),
        Err(ForensicsError::CredentialMissing(what)) => {
            warn!("narrative skipped, credential missing: {}", what);
            Narrative::Placeholder(format!(
                "credential missing: {} is not set, cannot generate an AI-assisted explanation",
                what
            ))
        }
        Err(e) => {
            warn!("narrative generation failed: {}", e);
            Narrative::Placeholder(format!("generation error: {}", e))
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions client for the OpenAI API.
pub struct OpenAiNarrator {
    config: NarrativeConfig,
}

impl OpenAiNarrator {
    pub fn new(config: NarrativeConfig) -> Self {
        Self { config }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

impl NarrativeGenerator for OpenAiNarrator {
    fn generate(&self, request: &NarrativeRequest) -> Result<String> {
        let api_key = self
            .api_key()
            .ok_or_else(|| ForensicsError::CredentialMissing("OPENAI_API_KEY".into()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let user_prompt = request.user_prompt();
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!("requesting narrative from {}", self.config.endpoint);

        let response = client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()?
            .error_for_status()?
            .json::<ChatResponse>()?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ForensicsError::Narrative("response contained no text".into()))
    }
}
