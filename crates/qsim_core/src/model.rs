use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Identifier of the document a question came from, e.g. `Paper 2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceLabel(String);

impl SourceLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Label for the document at zero-based arrival position `index`.
    pub fn paper(index: usize) -> Self {
        Self(format!("Paper {}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub source: SourceLabel,
}

impl Question {
    pub fn new(text: impl Into<String>, source: SourceLabel) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// A parsed document: its label and paragraph texts in document order.
#[derive(Debug, Clone)]
pub struct Paper {
    pub label: SourceLabel,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMatch {
    pub question: String,
    pub source: SourceLabel,
    /// Cosine similarity to the group's reference question.
    pub score: f32,
}

impl GroupMatch {
    pub fn new(question: &Question, score: f32) -> Self {
        Self {
            question: question.text.clone(),
            source: question.source.clone(),
            score,
        }
    }

    /// `score` as a whole percentage, e.g. `87`.
    pub fn percent(&self) -> u32 {
        (self.score.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

/// Display key of a group: reference text plus its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionGroup {
    /// The question that opened the group.
    pub reference: Question,
    /// Every other member, in group construction order.
    pub matches: Vec<GroupMatch>,
}

impl QuestionGroup {
    pub fn key(&self) -> GroupKey {
        GroupKey(format!(
            "{} ({})",
            self.reference.text, self.reference.source
        ))
    }

    pub fn member_count(&self) -> usize {
        self.matches.len() + 1
    }

    /// Reference first, then matches.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.reference.text.as_str())
            .chain(self.matches.iter().map(|m| m.question.as_str()))
    }
}

/// Ordered group mapping. Serialises as `{ key: [{question, source, score}, ...] }`
/// in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionGroups {
    groups: Vec<QuestionGroup>,
}

impl QuestionGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, group: QuestionGroup) {
        self.groups.push(group);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QuestionGroup> {
        self.groups.iter()
    }

    pub fn get(&self, key: &str) -> Option<&QuestionGroup> {
        self.groups.iter().find(|g| g.key().as_str() == key)
    }

    /// The group a question text ended up in, if any.
    pub fn group_of(&self, text: &str) -> Option<&QuestionGroup> {
        self.groups.iter().find(|g| g.texts().any(|t| t == text))
    }
}

impl<'a> IntoIterator for &'a QuestionGroups {
    type Item = &'a QuestionGroup;
    type IntoIter = std::slice::Iter<'a, QuestionGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

impl FromIterator<QuestionGroup> for QuestionGroups {
    fn from_iter<I: IntoIterator<Item = QuestionGroup>>(iter: I) -> Self {
        Self {
            groups: iter.into_iter().collect(),
        }
    }
}

impl Serialize for QuestionGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(group.key().as_str(), &group.matches)?;
        }
        map.end()
    }
}
