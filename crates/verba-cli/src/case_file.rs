//! Case files: testimony plus evidence, in YAML or JSON.
//!
//! ```yaml
//! testimony: I paid ₹5000 to Sharma Electronics for a fridge that never came.
//! case_type: consumer
//! language: en
//! evidence:
//!   - path: invoice.txt
//!   - name: bank-statement.pdf
//!     mime_type: application/pdf
//!     fields:
//!       amount: "5000"
//!       date: 02/03/2024
//! ```
//!
//! Evidence paths are resolved against the case file's directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use verba_core::{
    DetectedFields, EvidenceItem, ExtractedEvidence, FieldExtractor, Language, Testimony,
    TestimonyMode,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseFile {
    pub testimony: String,
    #[serde(default)]
    pub mode: TestimonyMode,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub case_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceEntry>,
}

/// A document on disk, or one described inline by its extracted fields.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceEntry {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Inline document text; hashed in place of file bytes.
    #[serde(default)]
    pub content: Option<String>,
    /// Overrides whatever the extractor finds.
    #[serde(default)]
    pub fields: Option<DetectedFields>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl CaseFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read case file {}", path.display()))?;
        let case: CaseFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .with_context(|| format!("invalid case file {}", path.display()))?,
            _ => serde_yaml::from_str(&raw)
                .with_context(|| format!("invalid case file {}", path.display()))?,
        };
        Ok(case)
    }

    pub fn language(&self) -> Option<Language> {
        self.language.as_deref().map(Language::from_code)
    }

    pub fn testimony(&self) -> Result<Testimony> {
        let mut testimony = Testimony::new(self.mode, self.testimony.as_str())?;
        if let Some(transcript) = &self.transcript {
            testimony = testimony.with_transcript(transcript.as_str());
        }
        if let Some(case_type) = &self.case_type {
            testimony = testimony.with_case_type(case_type.as_str());
        }
        if let Some(language) = self.language() {
            testimony = testimony.with_language(language);
        }
        Ok(testimony)
    }

    /// Build evidence items, reading referenced files relative to `base`.
    pub async fn evidence_items(
        &self,
        base: &Path,
        extractor: &dyn FieldExtractor,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Vec<EvidenceItem>> {
        let mut items = Vec::with_capacity(self.evidence.len());
        for (index, entry) in self.evidence.iter().enumerate() {
            let item = entry
                .to_item(base, extractor, uploaded_at)
                .await
                .with_context(|| format!("evidence entry {}", index + 1))?;
            items.push(item);
        }
        Ok(items)
    }
}

impl EvidenceEntry {
    async fn to_item(
        &self,
        base: &Path,
        extractor: &dyn FieldExtractor,
        uploaded_at: DateTime<Utc>,
    ) -> Result<EvidenceItem> {
        let item = match (&self.path, &self.name) {
            (Some(path), _) => {
                let path = base.join(path);
                verba_runtime::evidence::load_file(&path, extractor, uploaded_at).await?
            }
            (None, Some(name)) => {
                let mime = self.mime_type.clone().unwrap_or_else(|| {
                    verba_runtime::evidence::mime_for(Path::new(name)).to_string()
                });
                let bytes = match (&self.content, &self.fields) {
                    (Some(content), _) => content.clone().into_bytes(),
                    (None, Some(fields)) => serde_json::to_vec(fields)?,
                    (None, None) => bail!("inline evidence '{}' needs content or fields", name),
                };
                let item =
                    EvidenceItem::from_upload(name.as_str(), mime.as_str(), &bytes, uploaded_at);
                match extractor.extract(name, &mime, &bytes) {
                    Some(extracted) if self.content.is_some() => item.with_extracted(extracted),
                    _ => item,
                }
            }
            (None, None) => bail!("evidence needs either a path or a name"),
        };

        Ok(match &self.fields {
            Some(fields) => {
                let summary = self
                    .summary
                    .clone()
                    .or_else(|| item.extracted.as_ref().map(|e| e.summary.clone()))
                    .unwrap_or_default();
                item.with_extracted(ExtractedEvidence {
                    fields: fields.clone(),
                    summary,
                })
            }
            None => item,
        })
    }
}
