use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Question, SourceLabel};

/// Endings that mark a paragraph as a question or a fill-in prompt.
/// Matched as plain suffixes, so "This" ends with "is".
pub static QUESTION_ENDINGS: &[&str] = &[
    "?", ":", ":-", "is", "was", "are", "were", "because", "from", "among", "has", "have", "had",
    "that", "which", "to", "_______", "as", "means", "mean", "meant", "will", "would", "can",
    "could", "shall", "should", "may", "might",
];

pub static INTERROGATIVE_WORDS: &[&str] = &[
    "what", "who", "why", "how", "where", "when", "which", "whom", "do", "does", "did", "has",
    "have", "had", "is", "was", "are", "were", "am", "will", "would", "can", "could", "shall",
    "should", "may", "might",
];

pub static QUESTION_KEYWORDS: &[&str] = &[
    "explain",
    "define",
    "describe",
    "justify",
    "discuss",
    "state the",
    "analyze",
    "compare",
    "elaborate",
    "_______",
    "of the passage",
    "by the passage",
    "from the passage",
    "in the passage",
    "is the passage",
    "write",
    "find",
    "evaluate",
];

/// How paragraph text is compared against the word lists. Applies to every
/// rule at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    #[default]
    Insensitive,
    Sensitive,
}

impl std::str::FromStr for CaseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insensitive" => Ok(CaseMode::Insensitive),
            "sensitive" => Ok(CaseMode::Sensitive),
            other => Err(format!(
                "unknown case mode '{other}' (expected insensitive or sensitive)"
            )),
        }
    }
}

/// The heuristic that accepted a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Suffix,
    Interrogative,
    Keyword,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::Suffix => "suffix",
            Rule::Interrogative => "interrogative",
            Rule::Keyword => "keyword",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionClassifier {
    case_mode: CaseMode,
}

impl QuestionClassifier {
    pub fn new(case_mode: CaseMode) -> Self {
        Self { case_mode }
    }

    pub fn case_mode(&self) -> CaseMode {
        self.case_mode
    }

    /// First rule that accepts `paragraph`, checked in suffix, interrogative,
    /// keyword order. `None` for rejected or blank paragraphs.
    pub fn matched_rule(&self, paragraph: &str) -> Option<Rule> {
        let text = paragraph.trim();
        if text.is_empty() {
            return None;
        }

        let folded;
        let text = match self.case_mode {
            CaseMode::Insensitive => {
                folded = text.to_lowercase();
                folded.as_str()
            }
            CaseMode::Sensitive => text,
        };

        if QUESTION_ENDINGS.iter().any(|end| text.ends_with(end)) {
            return Some(Rule::Suffix);
        }

        let first_word = text.split_whitespace().next();
        if let Some(word) = first_word {
            if INTERROGATIVE_WORDS.contains(&word) && !text.ends_with('!') && !text.ends_with('.') {
                return Some(Rule::Interrogative);
            }
        }

        if QUESTION_KEYWORDS.iter().any(|kw| text.contains(kw)) && !text.ends_with('!') {
            return Some(Rule::Keyword);
        }

        None
    }

    pub fn is_question(&self, paragraph: &str) -> bool {
        self.matched_rule(paragraph).is_some()
    }

    /// Extract the questions of one document, in paragraph order. A text seen
    /// earlier in the same document is skipped.
    pub fn classify(&self, paragraphs: &[String], source: &SourceLabel) -> Vec<Question> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut questions = Vec::new();

        for paragraph in paragraphs {
            let text = paragraph.trim();
            if text.is_empty() || seen.contains(text) {
                continue;
            }
            if let Some(rule) = self.matched_rule(text) {
                debug!(source = %source, rule = rule.as_str(), text, "accepted paragraph");
                seen.insert(text);
                questions.push(Question::new(text, source.clone()));
            }
        }

        debug!(
            source = %source,
            paragraphs = paragraphs.len(),
            questions = questions.len(),
            "classified document"
        );
        questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paras(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn texts(questions: &[Question]) -> Vec<&str> {
        questions.iter().map(|q| q.text.as_str()).collect()
    }

    #[test]
    fn gravity_scenario() {
        let c = QuestionClassifier::default();
        assert_eq!(c.matched_rule("What is gravity?"), Some(Rule::Suffix));
        assert_eq!(c.matched_rule("Explain gravity."), Some(Rule::Keyword));
        assert_eq!(c.matched_rule("The sky is blue."), None);

        let out = c.classify(
            &paras(&["What is gravity?", "Explain gravity.", "The sky is blue."]),
            &SourceLabel::paper(0),
        );
        assert_eq!(texts(&out), vec!["What is gravity?", "Explain gravity."]);
        assert!(out.iter().all(|q| q.source.as_str() == "Paper 1"));
    }

    #[test]
    fn suffix_rule_is_a_plain_suffix_match() {
        let c = QuestionClassifier::default();
        assert_eq!(c.matched_rule("Name the parts of a cell:-"), Some(Rule::Suffix));
        assert_eq!(c.matched_rule("The capital of France is"), Some(Rule::Suffix));
        assert_eq!(c.matched_rule("Fill in the blank _______"), Some(Rule::Suffix));
        // "this" ends with "is"
        assert_eq!(c.matched_rule("Look at this"), Some(Rule::Suffix));
    }

    #[test]
    fn interrogative_rule_rejects_statement_endings() {
        let c = QuestionClassifier::default();
        assert_eq!(c.matched_rule("How plants make food"), Some(Rule::Interrogative));
        assert_eq!(c.matched_rule("Do it now!"), None);
        assert_eq!(c.matched_rule("Who cares."), None);
        // Token must match exactly, punctuation included.
        assert_eq!(c.matched_rule("Why, then, the delay"), None);
    }

    #[test]
    fn keyword_rule_rejects_exclamations_only() {
        let c = QuestionClassifier::default();
        assert_eq!(c.matched_rule("Compare mitosis and meiosis."), Some(Rule::Keyword));
        assert_eq!(
            c.matched_rule("Give the main idea of the passage in two lines"),
            Some(Rule::Keyword)
        );
        assert_eq!(c.matched_rule("Describe yourself!"), None);
    }

    #[test]
    fn case_mode_applies_to_every_rule() {
        let sensitive = QuestionClassifier::new(CaseMode::Sensitive);
        let insensitive = QuestionClassifier::new(CaseMode::Insensitive);

        assert_eq!(sensitive.matched_rule("What plants need"), None);
        assert_eq!(insensitive.matched_rule("What plants need"), Some(Rule::Interrogative));

        assert_eq!(sensitive.matched_rule("EXPLAIN osmosis."), None);
        assert_eq!(insensitive.matched_rule("EXPLAIN osmosis."), Some(Rule::Keyword));

        assert_eq!(sensitive.matched_rule("THE ANSWER IS"), None);
        assert_eq!(insensitive.matched_rule("THE ANSWER IS"), Some(Rule::Suffix));
    }

    #[test]
    fn blank_paragraphs_are_skipped() {
        let c = QuestionClassifier::default();
        assert_eq!(c.matched_rule(""), None);
        assert_eq!(c.matched_rule("   \t "), None);
        assert!(c.classify(&paras(&["", "  "]), &SourceLabel::paper(0)).is_empty());
    }

    #[test]
    fn repeated_text_within_a_document_is_kept_once() {
        let c = QuestionClassifier::default();
        let out = c.classify(
            &paras(&["Define force.", "  Define force.  ", "What is work?", "Define force."]),
            &SourceLabel::paper(0),
        );
        assert_eq!(texts(&out), vec!["Define force.", "What is work?"]);
    }

    #[test]
    fn a_paragraph_matching_all_rules_yields_one_question() {
        let c = QuestionClassifier::default();
        let out = c.classify(&paras(&["What does the passage explain?"]), &SourceLabel::paper(1));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn classification_is_idempotent() {
        let c = QuestionClassifier::default();
        let input = paras(&["Why?", "Not one.", "Find x", "Evaluate the integral."]);
        let label = SourceLabel::paper(0);
        assert_eq!(c.classify(&input, &label), c.classify(&input, &label));
    }
}
