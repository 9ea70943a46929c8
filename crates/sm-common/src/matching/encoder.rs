use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;
use tracing::debug;

use super::layout::{CategoricalEncoding, ColumnLayout, FeatureGroup};
use crate::vocabulary::{Vocabulary, VocabularyKind};
use crate::{Profile, ProfileId};

/// Profile attribute that is checked against the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProfileField {
    StudyLevel,
    LearningStyle,
    StudyPreference,
    PreferredSubjects,
    Strengths,
    Weaknesses,
    Availability,
}

impl ProfileField {
    fn vocabulary_kind(self) -> VocabularyKind {
        match self {
            ProfileField::StudyLevel => VocabularyKind::StudyLevels,
            ProfileField::LearningStyle => VocabularyKind::LearningStyles,
            ProfileField::StudyPreference => VocabularyKind::StudyPreferences,
            ProfileField::PreferredSubjects | ProfileField::Strengths | ProfileField::Weaknesses => {
                VocabularyKind::Subjects
            }
            ProfileField::Availability => VocabularyKind::Availability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("profile {profile_id}: {field} value {value:?} is not in the vocabulary")]
    UnknownCategory {
        profile_id: ProfileId,
        field: ProfileField,
        value: String,
    },
    #[error("profile {0} appears more than once in the batch")]
    DuplicateProfile(ProfileId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedVector {
    pub profile_id: ProfileId,
    pub values: Vec<f64>,
}

/// Encoded vectors of one batch, in input order, plus the layout they share.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    vectors: Vec<EncodedVector>,
    layout: ColumnLayout,
    index: HashMap<ProfileId, usize>,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn vectors(&self) -> &[EncodedVector] {
        &self.vectors
    }

    pub fn get(&self, profile_id: ProfileId) -> Option<&EncodedVector> {
        self.index.get(&profile_id).map(|&idx| &self.vectors[idx])
    }

    pub fn ids(&self) -> impl Iterator<Item = ProfileId> + '_ {
        self.vectors.iter().map(|v| v.profile_id)
    }

    pub fn into_vectors(self) -> Vec<EncodedVector> {
        self.vectors
    }
}

/// Min-max scaling fitted on the ages of the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeScale {
    min: u32,
    max: u32,
}

impl AgeScale {
    pub fn fit(profiles: &[Profile]) -> Option<Self> {
        let min = profiles.iter().map(|p| p.age).min()?;
        let max = profiles.iter().map(|p| p.age).max()?;
        Some(Self { min, max })
    }

    /// Maps `age` into `[0, 1]`; a batch with a single distinct age maps to 0.
    pub fn apply(&self, age: u32) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        let clamped = age.clamp(self.min, self.max);
        f64::from(clamped - self.min) / f64::from(self.max - self.min)
    }
}

pub struct FeatureEncoder<'a> {
    vocabulary: &'a Vocabulary,
    layout: ColumnLayout,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(vocabulary: &'a Vocabulary, encoding: CategoricalEncoding) -> Self {
        Self {
            vocabulary,
            layout: ColumnLayout::for_vocabulary(vocabulary, encoding),
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Encodes the whole batch or nothing: the first invalid profile aborts.
    pub fn encode(&self, profiles: &[Profile]) -> Result<EncodedBatch, EncodeError> {
        let mut index = HashMap::with_capacity(profiles.len());
        for (idx, profile) in profiles.iter().enumerate() {
            if index.insert(profile.id, idx).is_some() {
                return Err(EncodeError::DuplicateProfile(profile.id));
            }
        }

        let vectors = match AgeScale::fit(profiles) {
            Some(scale) => profiles
                .iter()
                .map(|profile| self.encode_one(profile, scale))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        debug!(
            profiles = vectors.len(),
            columns = self.layout.width(),
            "encoded profile batch"
        );

        Ok(EncodedBatch {
            vectors,
            layout: self.layout.clone(),
            index,
        })
    }

    pub fn encode_one(&self, profile: &Profile, scale: AgeScale) -> Result<EncodedVector, EncodeError> {
        let mut values = vec![0.0; self.layout.width()];
        values[self.layout.age_column()] = scale.apply(profile.age);

        for (field, value) in [
            (ProfileField::LearningStyle, &profile.learning_style),
            (ProfileField::StudyPreference, &profile.study_preference),
            (ProfileField::StudyLevel, &profile.study_level),
        ] {
            let position = self.lookup(profile.id, field, value)?;
            if let Some(column) = self
                .layout
                .categorical_column(field.vocabulary_kind(), position)
            {
                values[column] = 1.0;
            }
        }

        for (field, group, subjects) in [
            (
                ProfileField::PreferredSubjects,
                FeatureGroup::Preferred,
                &profile.preferred_subjects,
            ),
            (ProfileField::Strengths, FeatureGroup::Strength, &profile.strengths),
            (ProfileField::Weaknesses, FeatureGroup::Weakness, &profile.weaknesses),
        ] {
            for subject in subjects {
                let position = self.lookup(profile.id, field, subject)?;
                if let Some(column) = self.layout.subject_column(group, position) {
                    values[column] = 1.0;
                }
            }
        }

        // A vocabulary without time slots leaves availability unchecked.
        if !self.vocabulary.values(VocabularyKind::Availability).is_empty() {
            for slot in &profile.availability {
                self.lookup(profile.id, ProfileField::Availability, slot)?;
            }
        }

        Ok(EncodedVector {
            profile_id: profile.id,
            values,
        })
    }

    fn lookup(
        &self,
        profile_id: ProfileId,
        field: ProfileField,
        value: &str,
    ) -> Result<usize, EncodeError> {
        self.vocabulary
            .position(field.vocabulary_kind(), value)
            .ok_or_else(|| EncodeError::UnknownCategory {
                profile_id,
                field,
                value: value.to_string(),
            })
    }
}

pub fn encode(
    profiles: &[Profile],
    vocabulary: &Vocabulary,
    encoding: CategoricalEncoding,
) -> Result<EncodedBatch, EncodeError> {
    FeatureEncoder::new(vocabulary, encoding).encode(profiles)
}
