//! Document format description and path resolution helpers.
//!
//! A document is a line-oriented text project file. References inside it are
//! quoted path literals which may be absolute, relative to the document's
//! directory, or prefixed with the document-relative placeholder.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which extraction pass the scanner runs over document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Only literals in reference fields and their nested `value` lines.
    FieldTargeted,
    /// Every double-quoted literal on every line.
    QuotedLiteral,
}

impl Default for ScanStrategy {
    fn default() -> Self {
        Self::FieldTargeted
    }
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldTargeted => write!(f, "field_targeted"),
            Self::QuotedLiteral => write!(f, "quoted_literal"),
        }
    }
}

/// Syntax of the scene-description format as far as reference handling
/// is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentFormat {
    /// Extension (without the dot) that marks a file as a document.
    pub extension: String,
    /// Placeholder standing for the document's own directory.
    pub placeholder: String,
    /// Line prefix that starts the non-reference footer block.
    pub footer_marker: String,
    /// Field keywords whose literal (or nested `value` literal) is a path.
    pub reference_fields: Vec<String>,
    /// Extraction pass used by the scanner.
    pub strategy: ScanStrategy,
}

impl Default for DocumentFormat {
    fn default() -> Self {
        Self {
            extension: crate::DEFAULT_DOCUMENT_EXTENSION.to_string(),
            placeholder: crate::DEFAULT_PLACEHOLDER.to_string(),
            footer_marker: "#preferences".to_string(),
            reference_fields: vec!["filename".to_string(), "shader_filename".to_string()],
            strategy: ScanStrategy::FieldTargeted,
        }
    }
}

impl DocumentFormat {
    /// True if `path` carries the document extension.
    pub fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy() == self.extension.as_str())
            .unwrap_or(false)
    }

    /// True if `line` begins the footer block (case-insensitive, leading
    /// whitespace ignored).
    pub fn is_footer(&self, line: &str) -> bool {
        line.trim_start()
            .to_lowercase()
            .starts_with(&self.footer_marker.to_lowercase())
    }

    /// Check that `path` is an existing regular file with the document
    /// extension.
    pub fn check_document(&self, path: &Path) -> Result<(), String> {
        if !path.exists() {
            return Err("document does not exist".to_string());
        }
        if !path.is_file() {
            return Err("document is not a regular file".to_string());
        }
        if !self.is_document(path) {
            return Err(format!("expected a .{} document", self.extension));
        }
        Ok(())
    }

    /// Resolve a literal as written in a document living in `document_dir`
    /// to a normalized absolute path.
    ///
    /// Returns `None` for literals that cannot be paths (empty, or the bare
    /// placeholder pointing at the directory itself).
    pub fn resolve_literal(&self, raw: &str, document_dir: &Path) -> Option<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let joined = if let Some(rest) = raw.strip_prefix(self.placeholder.as_str()) {
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                return None;
            }
            document_dir.join(rest)
        } else {
            let candidate = Path::new(raw);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                document_dir.join(candidate)
            }
        };

        Some(normalize_path(&joined))
    }

    /// Render `target` relative to `document_dir`, prefixed with the
    /// placeholder.
    pub fn placeholder_path(&self, document_dir: &Path, target: &Path) -> String {
        let rel = relative_path(document_dir, target);
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.is_empty() {
            self.placeholder.clone()
        } else {
            format!("{}/{}", self.placeholder, rel)
        }
    }
}

/// A path literal extracted from a document, paired with its resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// The literal exactly as written between the quotes.
    pub raw: String,
    /// Normalized absolute path the literal resolves to.
    pub resolved: PathBuf,
}

impl Reference {
    /// Create a new reference.
    pub fn new(raw: impl Into<String>, resolved: PathBuf) -> Self {
        Self {
            raw: raw.into(),
            resolved,
        }
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
                    _ => false,
                };
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path from directory `from` to `to`, both absolute and normalized.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to_parts: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for part in &to_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Absolute form of `path` (joined onto the current directory when
/// relative), normalized.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_path(path))
    } else {
        Ok(normalize_path(&std::env::current_dir()?.join(path)))
    }
}
