//! Paragraph extraction from exam papers.
//!
//! `.docx` files are ZIP archives; paragraphs come from the WordprocessingML
//! body in `word/document.xml`. Plain-text papers carry one paragraph per line.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{QsimError, Result};

const DOCUMENT_XML: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Docx,
    PlainText,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Read the paragraphs of a paper in document order.
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| QsimError::document(path, "unsupported document type"))?;

    let paragraphs = match kind {
        DocumentKind::Docx => {
            let bytes = fs::read(path).map_err(|e| QsimError::document(path, e))?;
            read_docx_paragraphs(&bytes)
                .map_err(|e| QsimError::document(path, format!("{e:#}")))?
        }
        DocumentKind::PlainText => {
            let text = fs::read_to_string(path).map_err(|e| QsimError::document(path, e))?;
            read_plain_paragraphs(&text)
        }
    };

    debug!(path = %path.display(), paragraphs = paragraphs.len(), "read document");
    Ok(paragraphs)
}

pub fn read_plain_paragraphs(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// One string per `<w:p>`, built from its `<w:t>` runs. Tabs and breaks
/// become `\t` and `\n`. Empty paragraphs are kept.
pub fn read_docx_paragraphs(bytes: &[u8]) -> anyhow::Result<Vec<String>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("open docx container")?;
    let mut entry = archive
        .by_name(DOCUMENT_XML)
        .with_context(|| format!("missing {DOCUMENT_XML}"))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .with_context(|| format!("read {DOCUMENT_XML}"))?;

    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut paragraphs = Vec::new();
    // Text boxes nest paragraphs inside paragraphs.
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    // `w:tab` inside paragraph properties is a tab stop, not content.
    let mut in_props = false;
    let mut rest = xml;

    while let Some(lt) = rest.find('<') {
        if in_text {
            if let Some(current) = open.last_mut() {
                current.push_str(&decode_entities(&rest[..lt]));
            }
        }

        let Some(len) = rest[lt..].find('>') else {
            bail!("unterminated tag in {DOCUMENT_XML}");
        };
        let tag = &rest[lt + 1..lt + len];
        rest = &rest[lt + len + 1..];

        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");

        match name {
            "w:p" if self_closing => paragraphs.push(String::new()),
            "w:p" if closing => {
                if let Some(done) = open.pop() {
                    paragraphs.push(done);
                }
            }
            "w:p" => open.push(String::new()),
            "w:t" => in_text = !closing && !self_closing,
            "w:pPr" => in_props = !closing && !self_closing,
            "w:tab" | "w:br" | "w:cr" if !closing && !in_props => {
                if let Some(current) = open.last_mut() {
                    current.push(if name == "w:tab" { '\t' } else { '\n' });
                }
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[1..semi];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "apos" => Some('\''),
                "quot" => Some('"'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expand directories (recursively, sorted by path) and keep files in the
/// order given.
pub fn collect_documents(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!(%err, "skipping unreadable directory entry");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect();
            out.append(&mut found);
        } else {
            out.push(path.clone());
        }
    }
    out
}
