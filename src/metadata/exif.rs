use std::{collections::BTreeMap, fs, io::Cursor, path::Path};

use exif::{Exif, Field, In, Tag, Value};
use log::{debug, warn};
use serde::Serialize;

use crate::error::{ForensicsError, Result};

pub const INFO_KEY: &str = "Info";
pub const ERROR_KEY: &str = "Error";
pub const NO_METADATA_MESSAGE: &str = "No EXIF metadata found.";

/// Which EXIF fields are kept for the forensic summary.
#[derive(Debug, Clone, Copy)]
pub struct FieldPolicy {
    pub allowed: &'static [Tag],
    /// Case-sensitive substrings; catches vendor variants of the allowed tags.
    pub name_patterns: &'static [&'static str],
}

pub const FORENSIC_FIELDS: FieldPolicy = FieldPolicy {
    allowed: &[
        Tag::Model,
        Tag::Make,
        Tag::Software,
        Tag::DateTime,
        Tag::DateTimeOriginal,
        Tag::ExposureTime,
        Tag::FNumber,
        Tag::PhotographicSensitivity,
    ],
    name_patterns: &["Date", "Software", "Model"],
};

impl FieldPolicy {
    pub fn retains(&self, tag: Tag, name: &str) -> bool {
        self.allowed.contains(&tag) || self.name_patterns.iter().any(|p| name.contains(p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataStatus {
    Extracted,
    /// Parsed fine, nothing relevant present.
    Empty,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataSummary {
    pub fields: BTreeMap<String, String>,
    pub status: MetadataStatus,
    pub suspicious_indicators: Vec<String>,
}

impl MetadataSummary {
    pub fn empty() -> Self {
        Self {
            fields: BTreeMap::from([(INFO_KEY.to_string(), NO_METADATA_MESSAGE.to_string())]),
            status: MetadataStatus::Empty,
            suspicious_indicators: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::from([(ERROR_KEY.to_string(), message.into())]),
            status: MetadataStatus::Failed,
            suspicious_indicators: Vec::new(),
        }
    }

    pub fn is_informative(&self) -> bool {
        self.status == MetadataStatus::Extracted
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

pub struct ExifExtractor {
    policy: FieldPolicy,
}

impl ExifExtractor {
    pub fn new() -> Self {
        Self {
            policy: FORENSIC_FIELDS,
        }
    }

    pub fn with_policy(policy: FieldPolicy) -> Self {
        Self { policy }
    }

    /// Never fails; parse errors come back as a single `Error` entry.
    pub fn extract(&self, bytes: &[u8]) -> MetadataSummary {
        match self.try_extract(bytes) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("metadata extraction failed: {}", e);
                MetadataSummary::failed(format!("Failed to extract EXIF: {}", e))
            }
        }
    }

    pub fn extract_file<P: AsRef<Path>>(&self, path: P) -> MetadataSummary {
        match fs::read(&path) {
            Ok(bytes) => self.extract(&bytes),
            Err(e) => MetadataSummary::failed(format!("Failed to extract EXIF: {}", e)),
        }
    }

    pub fn try_extract(&self, bytes: &[u8]) -> Result<MetadataSummary> {
        let mut reader = Cursor::new(bytes);

        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => Ok(self.summarize(&exif)),
            Err(exif::Error::NotFound(container)) => {
                debug!("no EXIF block in {} container", container);
                Ok(MetadataSummary::empty())
            }
            Err(e) => Err(ForensicsError::MetadataError(e.to_string())),
        }
    }

    fn summarize(&self, exif: &Exif) -> MetadataSummary {
        let mut fields = BTreeMap::new();

        for field in exif.fields() {
            let name = field.tag.to_string();
            if !self.policy.retains(field.tag, &name) {
                continue;
            }

            let key = if field.ifd_num == In::THUMBNAIL {
                format!("Thumbnail {}", name)
            } else {
                name
            };
            fields.entry(key).or_insert_with(|| render_value(field, exif));
        }

        if fields.is_empty() {
            return MetadataSummary::empty();
        }

        let suspicious_indicators = find_indicators(&fields);

        MetadataSummary {
            fields,
            status: MetadataStatus::Extracted,
            suspicious_indicators,
        }
    }
}

impl Default for ExifExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn render_value(field: &Field, exif: &Exif) -> String {
    match &field.value {
        Value::Ascii(parts) => parts
            .iter()
            .map(|p| String::from_utf8_lossy(p).trim_matches(char::from(0)).trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => field.display_value().with_unit(exif).to_string(),
    }
}

fn find_indicators(fields: &BTreeMap<String, String>) -> Vec<String> {
    let mut indicators = Vec::new();

    if let Some(software) = fields.get("Software") {
        let lower = software.to_lowercase();
        if ["photoshop", "gimp", "paint"].iter().any(|s| lower.contains(s)) {
            indicators.push(format!("Edited with: {}", software));
        }
    }

    let original = fields.get("DateTimeOriginal");
    if original.is_none() && fields.contains_key("DateTime") {
        indicators.push("Original datetime missing (may be stripped)".into());
    }

    if let (Some(original), Some(digitized)) = (original, fields.get("DateTimeDigitized")) {
        if original != digitized {
            indicators.push("Inconsistent date time values".into());
        }
    }

    indicators
}

#[cfg(test)]
pub(crate) mod test_exif {
    /// Minimal little-endian TIFF block holding ASCII tags plus one SHORT.
    pub fn tiff_block(ascii: &[(u16, &str)], short: Option<(u16, u16)>) -> Vec<u8> {
        let mut entries = ascii
            .iter()
            .map(|(tag, text)| (*tag, Some(*text), 0u16))
            .collect::<Vec<_>>();
        if let Some((tag, value)) = short {
            entries.push((tag, None, value));
        }
        entries.sort_by_key(|e| e.0);

        let ifd_len = 2 + 12 * entries.len() + 4;
        let mut data_offset = 8 + ifd_len;
        let mut ifd = Vec::new();
        let mut data = Vec::new();

        ifd.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, text, value) in entries {
            ifd.extend_from_slice(&tag.to_le_bytes());
            match text {
                Some(text) => {
                    let mut bytes = text.as_bytes().to_vec();
                    bytes.push(0);
                    ifd.extend_from_slice(&2u16.to_le_bytes());
                    ifd.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    if bytes.len() <= 4 {
                        bytes.resize(4, 0);
                        ifd.extend_from_slice(&bytes);
                    } else {
                        ifd.extend_from_slice(&(data_offset as u32).to_le_bytes());
                        data_offset += bytes.len();
                        data.extend_from_slice(&bytes);
                    }
                }
                None => {
                    ifd.extend_from_slice(&3u16.to_le_bytes());
                    ifd.extend_from_slice(&1u32.to_le_bytes());
                    ifd.extend_from_slice(&value.to_le_bytes());
                    ifd.extend_from_slice(&[0, 0]);
                }
            }
        }
        ifd.extend_from_slice(&0u32.to_le_bytes());

        let mut tiff = b"II".to_vec();
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&ifd);
        tiff.extend_from_slice(&data);
        tiff
    }

    /// Inserts an `Exif` APP1 segment right after the JPEG SOI marker.
    pub fn with_app1(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
        let length = (2 + 6 + tiff.len()) as u16;
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    pub const MAKE: u16 = 0x010F;
    pub const MODEL: u16 = 0x0110;
    pub const ORIENTATION: u16 = 0x0112;
    pub const SOFTWARE: u16 = 0x0131;
    pub const DATE_TIME: u16 = 0x0132;
}
