//! Sequence and tile patterns.
//!
//! A template such as `base_<UDIM>.png` or `smoke.####.vdb` stands for every
//! file in the same directory whose name differs only in the index token.
//! Tokens are only recognised in the file name, never in directory parts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Strict UDIM tile numbers: four digits, 1001 through 9999.
const STRICT_UDIM: &str = r"(100[1-9]|10[1-9][0-9]|1[1-9][0-9]{2}|[2-9][0-9]{3})";

/// Configuration of the index tokens recognised in file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequencePattern {
    /// Token standing for a UDIM tile number.
    pub udim_token: String,
    /// Only accept four-digit tiles in 1001..=9999.
    pub strict_udim_format: bool,
    /// Character whose runs stand for a frame number.
    pub frame_char: char,
    /// Require the frame number to have exactly as many digits as the run.
    pub match_hash_length: bool,
}

impl Default for SequencePattern {
    fn default() -> Self {
        Self {
            udim_token: "<UDIM>".to_string(),
            strict_udim_format: true,
            frame_char: '#',
            match_hash_length: false,
        }
    }
}

impl SequencePattern {
    /// True if the file name of `path` contains an index token.
    pub fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                (!self.udim_token.is_empty() && name.contains(self.udim_token.as_str()))
                    || name.contains(self.frame_char)
            })
            .unwrap_or(false)
    }

    /// Build a matcher for `template`, or `None` if it has no token.
    pub fn matcher(&self, template: &Path) -> Option<SequenceMatcher> {
        if !self.is_template(template) {
            return None;
        }
        let dir = template.parent()?.to_path_buf();
        let name = template.file_name()?.to_string_lossy().into_owned();

        let regex = Regex::new(&format!("^{}$", self.name_pattern(&name))).ok()?;
        Some(SequenceMatcher {
            template: template.to_path_buf(),
            dir,
            regex,
        })
    }

    fn name_pattern(&self, name: &str) -> String {
        let mut pattern = String::new();
        let mut rest = name;

        while !rest.is_empty() {
            if let Some(after) = rest
                .strip_prefix(self.udim_token.as_str())
                .filter(|_| !self.udim_token.is_empty())
            {
                if self.strict_udim_format {
                    pattern.push_str(STRICT_UDIM);
                } else {
                    pattern.push_str(r"([0-9]+)");
                }
                rest = after;
                continue;
            }

            let run = rest.chars().take_while(|c| *c == self.frame_char).count();
            if run > 0 {
                if self.match_hash_length {
                    pattern.push_str(&format!("([0-9]{{{}}})", run));
                } else {
                    pattern.push_str(r"([0-9]+)");
                }
                rest = &rest[run * self.frame_char.len_utf8()..];
                continue;
            }

            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                pattern.push_str(&regex_lite::escape(&c.to_string()));
            }
            rest = chars.as_str();
        }

        pattern
    }
}

/// Matches concrete files against one template.
#[derive(Debug, Clone)]
pub struct SequenceMatcher {
    template: PathBuf,
    dir: PathBuf,
    regex: Regex,
}

impl SequenceMatcher {
    /// The template this matcher was built from.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// True if `path` is a member of the sequence (same directory, name
    /// matches the template).
    pub fn matches(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path
                .file_name()
                .map(|n| self.regex.is_match(&n.to_string_lossy()))
                .unwrap_or(false)
    }

    /// List the existing regular files belonging to this sequence, sorted.
    ///
    /// A missing directory yields an empty list.
    pub fn expand(&self) -> std::io::Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut members = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && self.matches(&path) {
                members.push(path);
            }
        }
        members.sort();
        Ok(members)
    }
}

/// Files that share one template and are remapped as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceGroup {
    /// Absolute template path (with the index token).
    pub template: PathBuf,
    /// Absolute paths of the concrete member files.
    pub members: BTreeSet<PathBuf>,
}

impl SequenceGroup {
    /// Collect the members of `template` out of `files`.
    ///
    /// Returns `None` when the template has no token or no member is present.
    pub fn detect<'a>(
        pattern: &SequencePattern,
        template: &Path,
        files: impl IntoIterator<Item = &'a PathBuf>,
    ) -> Option<Self> {
        let matcher = pattern.matcher(template)?;
        let members: BTreeSet<PathBuf> = files
            .into_iter()
            .filter(|f| matcher.matches(f))
            .cloned()
            .collect();

        if members.is_empty() {
            return None;
        }
        Some(Self {
            template: template.to_path_buf(),
            members,
        })
    }
}
