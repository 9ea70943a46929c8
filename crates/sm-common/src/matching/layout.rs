use std::ops::Range;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::vocabulary::{Vocabulary, VocabularyKind};

/// Semantic column groups compared independently by the similarity stage.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureGroup {
    Preferred,
    Strength,
    Weakness,
    Demographic,
}

/// How categorical attributes are one-hot encoded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CategoricalEncoding {
    /// One column per vocabulary value.
    #[default]
    Full,
    /// The first vocabulary value is the implicit baseline (all zeros).
    DropFirst,
}

/// Fixed column order shared by every vector of a batch:
/// `age | learning_style_* | study_preference_* | study_level_* | preferred_* | strength_* | weak_*`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    columns: Vec<String>,
    encoding: CategoricalEncoding,
    age: usize,
    learning_style: Range<usize>,
    study_preference: Range<usize>,
    study_level: Range<usize>,
    demographic: Range<usize>,
    preferred: Range<usize>,
    strength: Range<usize>,
    weakness: Range<usize>,
}

impl ColumnLayout {
    pub fn for_vocabulary(vocabulary: &Vocabulary, encoding: CategoricalEncoding) -> Self {
        let mut columns = vec!["age".to_string()];
        let age = 0;

        let mut push_block = |prefix: &str, values: &[String], skip: usize| {
            let start = columns.len();
            columns.extend(
                values
                    .iter()
                    .skip(skip)
                    .map(|value| format!("{prefix}_{value}")),
            );
            start..columns.len()
        };

        let skip = match encoding {
            CategoricalEncoding::Full => 0,
            CategoricalEncoding::DropFirst => 1,
        };
        let learning_style = push_block(
            "learning_style",
            vocabulary.values(VocabularyKind::LearningStyles),
            skip,
        );
        let study_preference = push_block(
            "study_preference",
            vocabulary.values(VocabularyKind::StudyPreferences),
            skip,
        );
        let study_level = push_block(
            "study_level",
            vocabulary.values(VocabularyKind::StudyLevels),
            skip,
        );
        let preferred = push_block("preferred", vocabulary.subjects(), 0);
        let strength = push_block("strength", vocabulary.subjects(), 0);
        let weakness = push_block("weak", vocabulary.subjects(), 0);
        let demographic = age..study_level.end;

        Self {
            columns,
            encoding,
            age,
            learning_style,
            study_preference,
            study_level,
            demographic,
            preferred,
            strength,
            weakness,
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn encoding(&self) -> CategoricalEncoding {
        self.encoding
    }

    pub fn age_column(&self) -> usize {
        self.age
    }

    pub fn group(&self, group: FeatureGroup) -> Range<usize> {
        match group {
            FeatureGroup::Preferred => self.preferred.clone(),
            FeatureGroup::Strength => self.strength.clone(),
            FeatureGroup::Weakness => self.weakness.clone(),
            FeatureGroup::Demographic => self.demographic.clone(),
        }
    }

    pub fn group_by_name(&self, name: &str) -> Option<Range<usize>> {
        name.parse::<FeatureGroup>().ok().map(|group| self.group(group))
    }

    pub fn slice<'a>(&self, values: &'a [f64], group: FeatureGroup) -> &'a [f64] {
        &values[self.group(group)]
    }

    /// Column holding `position` of a categorical vocabulary list, or `None`
    /// for the implicit baseline under [`CategoricalEncoding::DropFirst`].
    pub(crate) fn categorical_column(&self, kind: VocabularyKind, position: usize) -> Option<usize> {
        let block = match kind {
            VocabularyKind::LearningStyles => &self.learning_style,
            VocabularyKind::StudyPreferences => &self.study_preference,
            VocabularyKind::StudyLevels => &self.study_level,
            VocabularyKind::Subjects | VocabularyKind::Availability => return None,
        };
        let offset = match self.encoding {
            CategoricalEncoding::Full => position,
            CategoricalEncoding::DropFirst => position.checked_sub(1)?,
        };
        let column = block.start + offset;
        (column < block.end).then_some(column)
    }

    pub(crate) fn subject_column(&self, group: FeatureGroup, position: usize) -> Option<usize> {
        let block = match group {
            FeatureGroup::Preferred => &self.preferred,
            FeatureGroup::Strength => &self.strength,
            FeatureGroup::Weakness => &self.weakness,
            FeatureGroup::Demographic => return None,
        };
        let column = block.start + position;
        (column < block.end).then_some(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularySpec;

    fn vocabulary() -> Vocabulary {
        Vocabulary::new(VocabularySpec {
            label: "layout".into(),
            subjects: vec!["A".into(), "B".into(), "C".into()],
            study_levels: vec!["Beginner".into(), "Advanced".into()],
            learning_styles: vec!["Visual".into(), "Auditory".into()],
            study_preferences: vec!["Solo".into(), "Group".into()],
            availability: vec![],
        })
        .unwrap()
    }

    #[test]
    fn full_layout_orders_blocks() {
        let layout = ColumnLayout::for_vocabulary(&vocabulary(), CategoricalEncoding::Full);

        assert_eq!(layout.width(), 1 + 2 + 2 + 2 + 3 * 3);
        assert_eq!(layout.columns()[0], "age");
        assert_eq!(layout.columns()[1], "learning_style_Visual");
        assert_eq!(layout.columns()[7], "preferred_A");
        assert_eq!(layout.columns()[layout.width() - 1], "weak_C");
        assert_eq!(layout.group(FeatureGroup::Demographic), 0..7);
        assert_eq!(layout.group(FeatureGroup::Preferred), 7..10);
        assert_eq!(layout.group(FeatureGroup::Strength), 10..13);
        assert_eq!(layout.group(FeatureGroup::Weakness), 13..16);
    }

    #[test]
    fn drop_first_removes_baseline_columns() {
        let layout = ColumnLayout::for_vocabulary(&vocabulary(), CategoricalEncoding::DropFirst);

        assert_eq!(layout.width(), 1 + 1 + 1 + 1 + 9);
        assert_eq!(layout.columns()[1], "learning_style_Auditory");
        assert_eq!(layout.categorical_column(VocabularyKind::LearningStyles, 0), None);
        assert_eq!(
            layout.categorical_column(VocabularyKind::LearningStyles, 1),
            Some(1)
        );
    }

    #[test]
    fn groups_resolve_by_name() {
        let layout = ColumnLayout::for_vocabulary(&vocabulary(), CategoricalEncoding::Full);

        assert_eq!(
            layout.group_by_name("strength"),
            Some(layout.group(FeatureGroup::Strength))
        );
        assert_eq!(layout.group_by_name("availability"), None);
    }
}
