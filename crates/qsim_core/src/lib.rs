pub mod classify;
pub mod cluster;
pub mod config;
pub mod document;
pub mod embed;
pub mod error;
pub mod minilm_embed;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod similarity;

pub use classify::{CaseMode, QuestionClassifier, Rule};
pub use cluster::{cluster_questions, dedup_questions, group_indices, ClusterOptions, MergeStrategy};
pub use config::{
    AnalysisConfig, DEFAULT_EMBEDDING_DIM, DEFAULT_EXTENSION, DEFAULT_MODEL_ID, DEFAULT_THRESHOLD,
};
pub use document::{collect_documents, read_paragraphs, DocumentKind};
pub use embed::{CachedEmbeddingProvider, EmbeddingProvider, HashEmbeddingProvider};
pub use error::{InputError, QsimError, Result};
pub use minilm_embed::MiniLmEmbeddingProvider;
pub use model::{GroupKey, GroupMatch, Paper, Question, QuestionGroup, QuestionGroups, SourceLabel};
pub use pipeline::{Analysis, Analyzer, PaperSummary};
pub use report::{write_groups_json, write_report, ReportFormat, ReportOptions, REPORT_TITLE};
pub use similarity::{cosine_similarity, SimilarityMatrix};
