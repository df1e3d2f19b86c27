use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;
use crate::model::QuestionGroups;
use crate::pipeline::Analysis;

pub const REPORT_TITLE: &str = "Similar Questions Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
        })
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("Unknown output format: {other}")),
        }
    }
}

pub struct ReportOptions {
    pub format: ReportFormat,
    /// JSON only: wrap the groups with per-paper counts.
    pub with_summary: bool,
    pub generated_at: DateTime<Utc>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            with_summary: false,
            generated_at: Utc::now(),
        }
    }
}

pub fn write_report<W: Write>(out: &mut W, analysis: &Analysis, options: &ReportOptions) -> Result<()> {
    match options.format {
        ReportFormat::Text => write_text(out, analysis, options.generated_at),
        ReportFormat::Json if options.with_summary => {
            serde_json::to_writer_pretty(&mut *out, analysis)?;
            writeln!(out)?;
            Ok(())
        }
        ReportFormat::Json => write_groups_json(out, &analysis.groups),
    }
}

/// The bare `{ reference: [matches] }` mapping.
pub fn write_groups_json<W: Write>(out: &mut W, groups: &QuestionGroups) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, groups)?;
    writeln!(out)?;
    Ok(())
}

fn write_text<W: Write>(out: &mut W, analysis: &Analysis, generated_at: DateTime<Utc>) -> Result<()> {
    writeln!(out, "{REPORT_TITLE}")?;
    writeln!(out, "{}", "=".repeat(REPORT_TITLE.len()))?;
    writeln!(
        out,
        "Generated: {}",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    for paper in &analysis.papers {
        match &paper.path {
            Some(path) => writeln!(
                out,
                "{}: {} ({} questions)",
                paper.label,
                path.display(),
                paper.questions
            )?,
            None => writeln!(out, "{}: {} questions", paper.label, paper.questions)?,
        }
    }
    writeln!(out)?;

    if analysis.groups.is_empty() {
        writeln!(out, "No similar questions found.")?;
        return Ok(());
    }

    for group in &analysis.groups {
        writeln!(
            out,
            "Reference Question - {} ({})",
            group.reference.text, group.reference.source
        )?;
        writeln!(out, "Similar Questions:")?;
        for (i, m) in group.matches.iter().enumerate() {
            writeln!(
                out,
                "{}. {} ({}) (Question Matches {}%)",
                i + 1,
                m.question,
                m.source,
                m.percent()
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}
