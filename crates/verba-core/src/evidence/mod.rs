//! Evidence records, strength scoring, and sealing.
//!
//! Documents are collected in an [`EvidenceDraft`] while the Evidence stage
//! is active. Sealing produces an immutable [`SealedEvidence`] carrying the
//! evidence root.

mod extractor;

pub use extractor::{FieldExtractor, PlainTextExtractor};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::hashing::{self, ContentDigest, Digest, DigestKind, HashPrimitive, Sha256Primitive};

lazy_static! {
    /// Leading decimal number, after thousands separators are removed.
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+))").unwrap();
}

/// Maximum number of files that earn the per-file bonus.
pub const FILE_BONUS_CAP: usize = 3;

/// Upper bound of the strength scale.
pub const MAX_STRENGTH: u8 = 10;

/// Structured fields detected in a document by the extraction collaborator.
///
/// Absent fields mean "not detected".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parties: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl DetectedFields {
    /// Strength points contributed by these fields.
    pub fn points(&self) -> u32 {
        let mut points = 0;
        if present(&self.invoice_number) {
            points += 2;
        }
        if present(&self.amount) {
            points += 2;
        }
        if present(&self.date) {
            points += 1;
        }
        if !self.parties.is_empty() {
            points += 1;
        }
        if !self.keywords.is_empty() {
            points += 1;
        }
        points
    }

    /// The amount field as a number, with thousands separators removed.
    ///
    /// Only the leading numeric part is read, so `"4,500.00 INR"` yields 4500.
    pub fn numeric_amount(&self) -> Option<f64> {
        let raw = self.amount.as_deref()?.replace(',', "");
        LEADING_NUMBER
            .captures(&raw)
            .and_then(|c| c[1].parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.is_empty())
}

/// Output of the extraction collaborator for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEvidence {
    #[serde(default)]
    pub fields: DetectedFields,

    /// Short per-file summary. Raw full text is never carried.
    #[serde(default)]
    pub summary: String,
}

/// One uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub digest: Digest,
    #[serde(default = "default_digest_kind")]
    pub digest_kind: DigestKind,
    pub uploaded_at: DateTime<Utc>,
    pub evidence_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedEvidence>,
}

fn default_digest_kind() -> DigestKind {
    DigestKind::Sha256
}

impl EvidenceItem {
    /// Hash uploaded bytes and build the record.
    pub fn from_upload(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self::from_upload_with(filename, mime_type, bytes, uploaded_at, &Sha256Primitive)
    }

    /// Like [`EvidenceItem::from_upload`] with an explicit hashing backend.
    pub fn from_upload_with(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
        uploaded_at: DateTime<Utc>,
        primitive: &dyn HashPrimitive,
    ) -> Self {
        let filename = filename.into();
        let ContentDigest { digest, kind } = hashing::digest_content(&filename, bytes, primitive);
        Self::from_digest(filename, mime_type, bytes.len() as u64, digest, uploaded_at)
            .with_digest_kind(kind)
    }

    /// Build a record for a document whose digest is already known.
    pub fn from_digest(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        digest: Digest,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size,
            mime_type: mime_type.into(),
            evidence_id: evidence_id(&digest),
            digest,
            digest_kind: DigestKind::Sha256,
            uploaded_at,
            extracted: None,
        }
    }

    fn with_digest_kind(mut self, kind: DigestKind) -> Self {
        self.digest_kind = kind;
        self
    }

    /// Attach extracted fields.
    pub fn with_extracted(mut self, extracted: ExtractedEvidence) -> Self {
        self.extracted = Some(extracted);
        self
    }

    pub fn fields(&self) -> Option<&DetectedFields> {
        self.extracted.as_ref().map(|e| &e.fields)
    }

    /// Reference string used by structured intents: `<id>:<first 16 digest chars>`.
    pub fn reference(&self) -> String {
        let prefix: String = self.digest.as_str().chars().take(16).collect();
        format!("{}:{}", self.evidence_id, prefix)
    }
}

/// Stable identifier derived from the first 16 hex digits of the digest.
pub fn evidence_id(digest: &Digest) -> String {
    let head: String = digest.hex().chars().take(16).collect();
    format!("evd_{}", head)
}

/// Evidence strength on a 0–10 scale.
///
/// `min(len, 3)` for the files themselves, plus per-file points for detected
/// fields. This is the only strength formula; adjudication calls it too.
pub fn strength(items: &[EvidenceItem]) -> u8 {
    if items.is_empty() {
        return 0;
    }
    let file_bonus = items.len().min(FILE_BONUS_CAP) as u32;
    let field_points: u32 = items
        .iter()
        .filter_map(EvidenceItem::fields)
        .map(DetectedFields::points)
        .sum();
    (file_bonus + field_points).min(u32::from(MAX_STRENGTH)) as u8
}

/// Mutable evidence set while the Evidence stage is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDraft {
    items: Vec<EvidenceItem>,
}

impl EvidenceDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Returns `false` when a document with the same digest
    /// is already present.
    pub fn add(&mut self, item: EvidenceItem) -> bool {
        if self.items.iter().any(|i| i.digest == item.digest) {
            tracing::debug!(evidence_id = %item.evidence_id, "Duplicate evidence ignored");
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove a document by evidence id.
    pub fn remove(&mut self, evidence_id: &str) -> Option<EvidenceItem> {
        let index = self.items.iter().position(|i| i.evidence_id == evidence_id)?;
        Some(self.items.remove(index))
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Live strength preview for the current draft.
    pub fn strength(&self) -> u8 {
        strength(&self.items)
    }

    /// Freeze the draft.
    pub fn seal(self, sealed_at: DateTime<Utc>) -> SealedEvidence {
        SealedEvidence::new(self.items, sealed_at)
    }
}

/// An immutable evidence set with its root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEvidence {
    items: Vec<EvidenceItem>,
    sealed_at: DateTime<Utc>,
    root: Digest,
}

impl SealedEvidence {
    pub fn new(items: Vec<EvidenceItem>, sealed_at: DateTime<Utc>) -> Self {
        let root = hashing::aggregate_root(items.iter().map(|i| &i.digest));
        Self {
            items,
            sealed_at,
            root,
        }
    }

    /// A sealed set with no documents.
    pub fn empty(sealed_at: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), sealed_at)
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    pub fn root(&self) -> &Digest {
        &self.root
    }

    pub fn strength(&self) -> u8 {
        strength(&self.items)
    }

    pub fn references(&self) -> Vec<String> {
        self.items.iter().map(EvidenceItem::reference).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::ZERO_DIGEST;

    fn item(name: &str, fields: Option<DetectedFields>) -> EvidenceItem {
        let item = EvidenceItem::from_upload(name, "application/pdf", name.as_bytes(), Utc::now());
        match fields {
            Some(fields) => item.with_extracted(ExtractedEvidence {
                fields,
                summary: String::new(),
            }),
            None => item,
        }
    }

    fn invoice_fields() -> DetectedFields {
        DetectedFields {
            invoice_number: Some("INV-204".to_string()),
            amount: Some("4500".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_items_is_zero() {
        assert_eq!(strength(&[]), 0);
    }

    #[test]
    fn test_file_bonus_caps_at_three() {
        let items: Vec<_> = (0..5).map(|i| item(&format!("f{}", i), None)).collect();
        assert_eq!(strength(&items[..1]), 1);
        assert_eq!(strength(&items[..3]), 3);
        assert_eq!(strength(&items), 3);
    }

    #[test]
    fn test_invoice_and_amount_score_five() {
        assert_eq!(strength(&[item("a.pdf", Some(invoice_fields()))]), 5);
    }

    #[test]
    fn test_all_fields_clamped_to_ten() {
        let fields = DetectedFields {
            invoice_number: Some("INV-1".to_string()),
            date: Some("12/01/2024".to_string()),
            amount: Some("100".to_string()),
            currency: Some("INR".to_string()),
            parties: vec!["Anil".to_string()],
            keywords: vec!["PAID".to_string()],
        };
        assert_eq!(fields.points(), 7);
        let items = vec![item("a", Some(fields.clone())), item("b", Some(fields))];
        assert_eq!(strength(&items), MAX_STRENGTH);
    }

    #[test]
    fn test_empty_strings_do_not_count() {
        let fields = DetectedFields {
            invoice_number: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(fields.points(), 0);
    }

    #[test]
    fn test_numeric_amount() {
        let mut fields = DetectedFields::default();
        assert_eq!(fields.numeric_amount(), None);
        fields.amount = Some("4,500.50".to_string());
        assert_eq!(fields.numeric_amount(), Some(4500.5));
        fields.amount = Some("5000 INR".to_string());
        assert_eq!(fields.numeric_amount(), Some(5000.0));
        fields.amount = Some("n/a".to_string());
        assert_eq!(fields.numeric_amount(), None);
    }

    #[test]
    fn test_evidence_id_from_digest_prefix() {
        let i = item("a.pdf", None);
        assert_eq!(i.evidence_id, format!("evd_{}", &i.digest.hex()[..16]));
        assert_eq!(
            i.reference(),
            format!("{}:{}", i.evidence_id, &i.digest.as_str()[..16])
        );
    }

    #[test]
    fn test_draft_add_remove() {
        let mut draft = EvidenceDraft::new();
        let a = item("a.pdf", None);
        let id = a.evidence_id.clone();
        assert!(draft.add(a.clone()));
        assert!(!draft.add(a));
        assert_eq!(draft.len(), 1);
        assert!(draft.remove(&id).is_some());
        assert!(draft.remove(&id).is_none());
        assert!(draft.is_empty());
    }

    #[test]
    fn test_sealed_root() {
        let now = Utc::now();
        assert_eq!(SealedEvidence::empty(now).root().as_str(), ZERO_DIGEST);

        let a = item("a.pdf", None);
        let b = item("b.pdf", None);
        let forward = SealedEvidence::new(vec![a.clone(), b.clone()], now);
        let backward = SealedEvidence::new(vec![b, a], now);
        assert_eq!(forward.root(), backward.root());
        assert!(!forward.root().is_zero());
    }
}
