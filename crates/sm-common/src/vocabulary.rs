//! Closed value sets that define the encoded feature columns.
//!
//! A [`Vocabulary`] is loaded once at engine start and never mutated. Its
//! [`version`](Vocabulary::version) combines a human label with a content
//! fingerprint, so recommendation sets computed under a different vocabulary
//! can be recognised as stale.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum VocabularyKind {
    Subjects,
    StudyLevels,
    LearningStyles,
    StudyPreferences,
    Availability,
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("vocabulary list {0} must not be empty")]
    EmptyList(VocabularyKind),
    #[error("vocabulary list {0} contains a blank entry")]
    BlankEntry(VocabularyKind),
    #[error("vocabulary list {kind} contains {value:?} more than once")]
    DuplicateEntry {
        kind: VocabularyKind,
        value: String,
    },
    #[error("failed to read vocabulary file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse vocabulary: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serialized form of a vocabulary (JSON config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySpec {
    #[serde(default = "default_label")]
    pub label: String,
    pub subjects: Vec<String>,
    pub study_levels: Vec<String>,
    pub learning_styles: Vec<String>,
    pub study_preferences: Vec<String>,
    #[serde(default)]
    pub availability: Vec<String>,
}

fn default_label() -> String {
    "custom".into()
}

impl Default for VocabularySpec {
    fn default() -> Self {
        let owned = |values: &[&str]| values.iter().map(|v| v.to_string()).collect();
        Self {
            label: "builtin".into(),
            subjects: owned(&[
                "Biology",
                "Chemistry",
                "Computer Science",
                "Data Science",
                "Economics",
                "English",
                "History",
                "Machine Learning",
                "Mathematics",
                "Physics",
                "Statistics",
                "Web Development",
            ]),
            study_levels: owned(&["Beginner", "Intermediate", "Advanced"]),
            learning_styles: owned(&["Visual", "Auditory", "Problem-Solving", "Text-based"]),
            study_preferences: owned(&["Solo", "Group"]),
            availability: owned(&["Morning", "Afternoon", "Evening", "Night"]),
        }
    }
}

#[derive(Debug, Clone)]
struct ValueSet {
    entries: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ValueSet {
    fn build(
        kind: VocabularyKind,
        entries: Vec<String>,
        allow_empty: bool,
    ) -> Result<Self, VocabularyError> {
        if entries.is_empty() && !allow_empty {
            return Err(VocabularyError::EmptyList(kind));
        }

        let mut cleaned = Vec::with_capacity(entries.len());
        let mut positions = HashMap::with_capacity(entries.len());
        for entry in entries {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                return Err(VocabularyError::BlankEntry(kind));
            }
            if positions.insert(lookup_key(trimmed), cleaned.len()).is_some() {
                return Err(VocabularyError::DuplicateEntry {
                    kind,
                    value: trimmed.to_string(),
                });
            }
            cleaned.push(trimmed.to_string());
        }

        Ok(Self {
            entries: cleaned,
            positions,
        })
    }
}

fn lookup_key(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    label: String,
    version: String,
    subjects: ValueSet,
    study_levels: ValueSet,
    learning_styles: ValueSet,
    study_preferences: ValueSet,
    availability: ValueSet,
}

impl Vocabulary {
    pub fn new(spec: VocabularySpec) -> Result<Self, VocabularyError> {
        let label = match spec.label.trim() {
            "" => default_label(),
            other => other.to_string(),
        };

        let mut vocabulary = Self {
            subjects: ValueSet::build(VocabularyKind::Subjects, spec.subjects, false)?,
            study_levels: ValueSet::build(VocabularyKind::StudyLevels, spec.study_levels, false)?,
            learning_styles: ValueSet::build(
                VocabularyKind::LearningStyles,
                spec.learning_styles,
                false,
            )?,
            study_preferences: ValueSet::build(
                VocabularyKind::StudyPreferences,
                spec.study_preferences,
                false,
            )?,
            availability: ValueSet::build(VocabularyKind::Availability, spec.availability, true)?,
            version: String::new(),
            label,
        };
        vocabulary.version = format!("{}-{}", vocabulary.label, vocabulary.fingerprint());
        Ok(vocabulary)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, VocabularyError> {
        let spec: VocabularySpec = serde_json::from_str(raw)?;
        Self::new(spec)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `<label>-<16 hex chars>`; changes whenever any list or its order changes.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn values(&self, kind: VocabularyKind) -> &[String] {
        &self.set(kind).entries
    }

    pub fn len(&self, kind: VocabularyKind) -> usize {
        self.set(kind).entries.len()
    }

    /// Position of `value` within `kind`, matched case-insensitively after trimming.
    pub fn position(&self, kind: VocabularyKind, value: &str) -> Option<usize> {
        self.set(kind).positions.get(&lookup_key(value)).copied()
    }

    pub fn subjects(&self) -> &[String] {
        self.values(VocabularyKind::Subjects)
    }

    fn set(&self, kind: VocabularyKind) -> &ValueSet {
        match kind {
            VocabularyKind::Subjects => &self.subjects,
            VocabularyKind::StudyLevels => &self.study_levels,
            VocabularyKind::LearningStyles => &self.learning_styles,
            VocabularyKind::StudyPreferences => &self.study_preferences,
            VocabularyKind::Availability => &self.availability,
        }
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for kind in VocabularyKind::iter() {
            hasher.update(kind.as_ref().as_bytes());
            hasher.update([0x1e]);
            for entry in self.values(kind) {
                hasher.update(entry.as_bytes());
                hasher.update([0x1f]);
            }
        }
        let bytes = hasher.finalize();
        let mut hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        hex.truncate(16);
        hex
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        match Self::new(VocabularySpec::default()) {
            Ok(vocabulary) => vocabulary,
            Err(err) => unreachable!("builtin vocabulary is invalid: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> VocabularySpec {
        VocabularySpec {
            label: "test".into(),
            subjects: vec!["A".into(), "B".into(), "C".into()],
            study_levels: vec!["Beginner".into()],
            learning_styles: vec!["Visual".into()],
            study_preferences: vec!["Solo".into(), "Group".into()],
            availability: vec![],
        }
    }

    #[test]
    fn builtin_vocabulary_is_valid() {
        let vocabulary = Vocabulary::default();
        assert_eq!(vocabulary.len(VocabularyKind::StudyLevels), 3);
        assert_eq!(vocabulary.len(VocabularyKind::StudyPreferences), 2);
        assert!(vocabulary.version().starts_with("builtin-"));
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let vocabulary = Vocabulary::new(spec()).unwrap();
        assert_eq!(
            vocabulary.position(VocabularyKind::StudyPreferences, "  group "),
            Some(1)
        );
        assert_eq!(vocabulary.position(VocabularyKind::Subjects, "d"), None);
    }

    #[test]
    fn rejects_duplicates_after_normalization() {
        let mut raw = spec();
        raw.subjects = vec!["Math".into(), " math".into()];
        let err = Vocabulary::new(raw).unwrap_err();
        assert!(matches!(
            err,
            VocabularyError::DuplicateEntry {
                kind: VocabularyKind::Subjects,
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_categorical_lists_but_allows_empty_availability() {
        let mut raw = spec();
        raw.learning_styles.clear();
        assert!(matches!(
            Vocabulary::new(raw),
            Err(VocabularyError::EmptyList(VocabularyKind::LearningStyles))
        ));

        assert!(Vocabulary::new(spec()).is_ok());
    }

    #[test]
    fn version_tracks_content_and_order() {
        let first = Vocabulary::new(spec()).unwrap();
        let same = Vocabulary::new(spec()).unwrap();
        assert_eq!(first.version(), same.version());

        let mut reordered = spec();
        reordered.subjects.reverse();
        let reordered = Vocabulary::new(reordered).unwrap();
        assert_ne!(first.version(), reordered.version());
        assert_eq!(first.version().len(), "test-".len() + 16);
    }

    #[test]
    fn parses_json_with_default_label() {
        let raw = r#"{
            "subjects": ["Algebra", "Rust"],
            "study_levels": ["Beginner", "Advanced"],
            "learning_styles": ["Visual"],
            "study_preferences": ["Solo", "Group"]
        }"#;
        let vocabulary = Vocabulary::from_json_str(raw).unwrap();
        assert_eq!(vocabulary.label(), "custom");
        assert_eq!(vocabulary.subjects(), ["Algebra", "Rust"]);
        assert!(vocabulary.values(VocabularyKind::Availability).is_empty());
    }
}
