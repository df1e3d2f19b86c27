use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::classify::QuestionClassifier;
use crate::cluster::cluster_questions;
use crate::config::AnalysisConfig;
use crate::document::read_paragraphs;
use crate::embed::EmbeddingProvider;
use crate::error::{InputError, Result};
use crate::model::{Paper, Question, QuestionGroups, SourceLabel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperSummary {
    pub label: SourceLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub paragraphs: usize,
    pub questions: usize,
}

/// Result of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub papers: Vec<PaperSummary>,
    pub question_count: usize,
    pub unique_question_count: usize,
    pub groups: QuestionGroups,
}

pub struct Analyzer<E> {
    config: AnalysisConfig,
    classifier: QuestionClassifier,
    embedder: E,
}

impl<E: EmbeddingProvider> Analyzer<E> {
    pub fn new(config: AnalysisConfig, embedder: E) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: QuestionClassifier::new(config.case_mode),
            config,
            embedder,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn classifier(&self) -> &QuestionClassifier {
        &self.classifier
    }

    /// Validate the upload, label the accepted files `Paper 1..N` in the
    /// order given, and analyse them.
    pub fn analyze_files(&self, paths: &[PathBuf]) -> Result<Analysis> {
        if paths.is_empty() {
            return Err(InputError::NoDocuments.into());
        }
        if paths.len() < 2 {
            return Err(InputError::TooFewDocuments { found: paths.len() }.into());
        }

        let accepted: Vec<&Path> = paths
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| {
                let ok = self.config.accepts(p);
                if !ok {
                    warn!(path = %p.display(), "ignoring file with unrecognised extension");
                }
                ok
            })
            .collect();
        if accepted.is_empty() {
            return Err(InputError::NoValidDocuments {
                accepted: self.config.extensions.join(", "),
            }
            .into());
        }

        let mut papers = Vec::with_capacity(accepted.len());
        for (i, path) in accepted.iter().enumerate() {
            papers.push(Paper {
                label: SourceLabel::paper(i),
                paragraphs: read_paragraphs(path)?,
            });
        }

        let mut analysis = self.analyze_papers(&papers)?;
        for (summary, path) in analysis.papers.iter_mut().zip(accepted) {
            summary.path = Some(path.to_path_buf());
        }
        Ok(analysis)
    }

    /// Classify every paper, then cluster the questions of all papers.
    pub fn analyze_papers(&self, papers: &[Paper]) -> Result<Analysis> {
        let mut questions: Vec<Question> = Vec::new();
        let mut summaries = Vec::with_capacity(papers.len());

        for paper in papers {
            let found = self.classifier.classify(&paper.paragraphs, &paper.label);
            summaries.push(PaperSummary {
                label: paper.label.clone(),
                path: None,
                paragraphs: paper.paragraphs.len(),
                questions: found.len(),
            });
            questions.extend(found);
        }

        let unique_question_count = crate::cluster::dedup_questions(&questions).len();
        let groups = cluster_questions(
            &questions,
            &self.embedder,
            &self.config.cluster_options(),
        )?;

        info!(
            papers = papers.len(),
            questions = questions.len(),
            unique = unique_question_count,
            groups = groups.len(),
            "analysis complete"
        );

        Ok(Analysis {
            papers: summaries,
            question_count: questions.len(),
            unique_question_count,
            groups,
        })
    }
}
