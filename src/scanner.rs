//! Reference extraction from raw document text.
//!
//! The scanner never uses the host application's object model. It reads the
//! document as text, stops at the footer block, and pulls path literals out
//! of the lines with one of two passes:
//!
//! - **Field-targeted** (default): `<field> "<literal>"` lines and
//!   `<field> {` blocks whose direct `value "<literal>"` line holds the
//!   path, for the configured reference field keywords.
//! - **Quoted literal**: every double-quoted literal. Over-collects; useful
//!   as a robustness fallback.
//!
//! Each literal is resolved against the document's directory. Literals that
//! do not name an existing regular file (or a sequence template with at
//! least one existing member) are dropped without error.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::config::GatherConfig;
use crate::error::{GatherError, Result};
use crate::types::{DocumentFormat, Reference, ScanStrategy, SequencePattern};

fn quoted_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid literal pattern"))
}

/// Contents of every double-quoted literal on `line`, escapes left as written.
pub(crate) fn quoted_literals(line: &str) -> impl Iterator<Item = &str> {
    quoted_literal()
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

fn field_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([A-Za-z_][A-Za-z0-9_]*)\s+"((?:[^"\\]|\\.)*)""#)
            .expect("valid field pattern")
    })
}

fn block_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\{\s*$").expect("valid block pattern")
    })
}

fn value_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*value\s+"((?:[^"\\]|\\.)*)""#).expect("valid value pattern")
    })
}

/// Everything one document references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Existing non-document files.
    pub external_refs: BTreeSet<PathBuf>,
    /// Existing documents.
    pub sub_documents: BTreeSet<PathBuf>,
    /// Sequence templates with at least one existing member.
    pub sequences: BTreeSet<PathBuf>,
    /// Every retained literal with its resolution, in document order.
    pub references: Vec<Reference>,
}

impl ScanResult {
    /// Total number of distinct files found.
    pub fn file_count(&self) -> usize {
        self.external_refs.len() + self.sub_documents.len()
    }
}

/// Extracts file references from one document.
#[derive(Debug, Clone)]
pub struct ReferenceScanner {
    format: DocumentFormat,
    sequence: SequencePattern,
}

impl ReferenceScanner {
    /// Create a scanner for the given syntax.
    pub fn new(format: DocumentFormat, sequence: SequencePattern) -> Self {
        Self { format, sequence }
    }

    /// Create a scanner from a configuration bundle.
    pub fn from_config(config: &GatherConfig) -> Self {
        Self::new(config.format.clone(), config.sequence.clone())
    }

    /// The document syntax in use.
    pub fn format(&self) -> &DocumentFormat {
        &self.format
    }

    /// Scan a document on disk.
    ///
    /// Fails only if `document` is not an existing regular document file or
    /// cannot be read.
    pub fn scan(&self, document: &Path) -> Result<ScanResult> {
        self.format
            .check_document(document)
            .map_err(|reason| GatherError::precondition(document, reason))?;

        let bytes = std::fs::read(document).map_err(|e| GatherError::io(document, e))?;
        let text = String::from_utf8_lossy(&bytes);

        let document = crate::types::absolutize(document).map_err(|e| GatherError::io(document, e))?;
        let dir = document.parent().unwrap_or_else(|| Path::new("/"));

        let result = self.scan_text(&text, dir);
        tracing::debug!(
            document = %document.display(),
            strategy = %self.format.strategy,
            external = result.external_refs.len(),
            sub_documents = result.sub_documents.len(),
            sequences = result.sequences.len(),
            "scanned document"
        );
        Ok(result)
    }

    /// Scan document text as if it lived in `document_dir`.
    pub fn scan_text(&self, text: &str, document_dir: &Path) -> ScanResult {
        let mut result = ScanResult::default();

        for raw in self.candidates(text) {
            let Some(resolved) = self.format.resolve_literal(&raw, document_dir) else {
                continue;
            };

            // An existing file is a plain reference even if its name holds a token.
            if resolved.is_file() {
                self.classify(resolved.clone(), &mut result);
                result.references.push(Reference::new(raw, resolved));
            } else if let Some(matcher) = self.sequence.matcher(&resolved) {
                let members = match matcher.expand() {
                    Ok(members) => members,
                    Err(e) => {
                        tracing::debug!(
                            template = %resolved.display(),
                            error = %e,
                            "sequence directory unreadable"
                        );
                        continue;
                    }
                };
                if members.is_empty() {
                    continue;
                }
                for member in members {
                    self.classify(member, &mut result);
                }
                result.sequences.insert(resolved.clone());
                result.references.push(Reference::new(raw, resolved));
            }
        }

        result
    }

    fn classify(&self, path: PathBuf, result: &mut ScanResult) {
        if self.format.is_document(&path) {
            result.sub_documents.insert(path);
        } else {
            result.external_refs.insert(path);
        }
    }

    /// Raw literals in document order, up to the footer block.
    pub fn candidates(&self, text: &str) -> Vec<String> {
        let lines = text.lines().take_while(|line| !self.format.is_footer(line));
        match self.format.strategy {
            ScanStrategy::QuotedLiteral => lines
                .flat_map(|line| quoted_literals(line))
                .map(str::to_string)
                .collect(),
            ScanStrategy::FieldTargeted => self.field_candidates(lines),
        }
    }

    fn field_candidates<'t>(&self, lines: impl Iterator<Item = &'t str>) -> Vec<String> {
        let mut out = Vec::new();
        // Depth inside a reference field block; 0 when outside.
        let mut depth = 0usize;

        for line in lines {
            if depth > 0 {
                if depth == 1 {
                    if let Some(caps) = value_line().captures(line) {
                        out.push(caps[1].to_string());
                        continue;
                    }
                }
                let trimmed = line.trim();
                if trimmed.starts_with('}') {
                    depth -= 1;
                }
                if trimmed.ends_with('{') {
                    depth += 1;
                }
                continue;
            }

            if let Some(caps) = field_line().captures(line) {
                if self.is_reference_field(&caps[1]) {
                    out.push(caps[2].to_string());
                }
            } else if let Some(caps) = block_open().captures(line) {
                if self.is_reference_field(&caps[1]) {
                    depth = 1;
                }
            }
        }

        out
    }

    fn is_reference_field(&self, keyword: &str) -> bool {
        self.format.reference_fields.iter().any(|f| f == keyword)
    }
}
