//! In-place document rewriting.
//!
//! Replacement is literal text substitution, line by line, in a single pass
//! over the original key set: at each position the longest matching key
//! wins and replaced text is never rescanned. Two kinds of keys exist:
//!
//! - absolute source paths, matched only where bounded by non-path
//!   characters so `/a.png` never matches inside `/d/a.png`
//! - quoted literals (relative or placeholder-prefixed) whose resolution
//!   against the document's original directory is a mapped source
//!
//! The document is replaced through a temporary sibling file; the original
//! is untouched unless the full new text was written and synced.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::GatherConfig;
use crate::error::{GatherError, Result};
use crate::scanner::quoted_literals;
use crate::types::{absolutize, DocumentFormat, RemapTable};

/// Where one source path is repointed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteTarget {
    /// New absolute location.
    pub path: PathBuf,
    /// Always written as an absolute path, even in relative mode.
    pub pinned: bool,
}

/// Source-to-target mapping consumed by [`DocumentRewriter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteMap {
    targets: BTreeMap<PathBuf, RewriteTarget>,
    origins: BTreeMap<PathBuf, PathBuf>,
}

impl RewriteMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry and sequence template of `table` relocated to its
    /// destination, with each destination's origin recorded.
    pub fn from_table(table: &RemapTable) -> Self {
        let mut map = Self::new();
        for (source, destination) in table.iter() {
            map.relocate(source, destination);
            map.set_origin(destination, source);
        }
        for mapping in table.sequences() {
            map.relocate(&mapping.group.template, &mapping.destination_template);
        }
        map
    }

    /// Point `source` at a relocatable `destination`.
    pub fn relocate(&mut self, source: &Path, destination: &Path) {
        self.targets.insert(
            source.to_path_buf(),
            RewriteTarget {
                path: destination.to_path_buf(),
                pinned: false,
            },
        );
    }

    /// Point `source` at `target`, always written absolute.
    pub fn pin(&mut self, source: &Path, target: &Path) {
        self.targets.insert(
            source.to_path_buf(),
            RewriteTarget {
                path: target.to_path_buf(),
                pinned: true,
            },
        );
    }

    /// Record that `document` is a copy of `original`, so its relative
    /// literals resolve against the original's directory.
    pub fn set_origin(&mut self, document: &Path, original: &Path) {
        self.origins
            .insert(document.to_path_buf(), original.to_path_buf());
    }

    /// Target for `source`.
    pub fn get(&self, source: &Path) -> Option<&RewriteTarget> {
        self.targets.get(source)
    }

    /// Original location `document` was copied from.
    pub fn origin_of(&self, document: &Path) -> Option<&Path> {
        self.origins.get(document).map(PathBuf::as_path)
    }

    /// Number of mapped sources.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Result of rewriting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteSummary {
    /// Document path.
    pub document: PathBuf,
    /// Number of replacements made.
    pub replacements: usize,
    /// False when nothing matched and the file was left alone.
    pub written: bool,
}

struct Needle {
    text: String,
    replacement: String,
    bounded: bool,
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '/' | '\\' | '.' | '_' | '-' | '$' | '<' | '>' | '#' | '~')
}

/// Rewrites references inside documents.
#[derive(Debug, Clone)]
pub struct DocumentRewriter {
    format: DocumentFormat,
}

impl DocumentRewriter {
    /// Create a rewriter for the given syntax.
    pub fn new(format: DocumentFormat) -> Self {
        Self { format }
    }

    /// Create a rewriter from a configuration bundle.
    pub fn from_config(config: &GatherConfig) -> Self {
        Self::new(config.format.clone())
    }

    /// Rewrite `document` in place.
    ///
    /// With `relative` set, relocatable targets are written as the
    /// placeholder plus the path from the document's own directory.
    pub fn rewrite(&self, document: &Path, map: &RewriteMap, relative: bool) -> Result<RewriteSummary> {
        self.format
            .check_document(document)
            .map_err(|reason| GatherError::precondition(document, reason))?;
        let document = absolutize(document).map_err(|e| GatherError::io(document, e))?;

        let bytes = fs::read(&document).map_err(|e| GatherError::io(&document, e))?;
        let text = String::from_utf8(bytes).map_err(|_| GatherError::InvalidEncoding {
            path: document.clone(),
        })?;

        let (rewritten, replacements) = self.rewrite_text(&text, &document, map, relative);
        if replacements == 0 {
            return Ok(RewriteSummary {
                document,
                replacements,
                written: false,
            });
        }

        write_atomic(&document, &rewritten)?;
        tracing::debug!(
            document = %document.display(),
            replacements,
            relative,
            "rewrote document"
        );
        Ok(RewriteSummary {
            document,
            replacements,
            written: true,
        })
    }

    /// Rewrite document text as if it lived at `document`.
    ///
    /// Returns the new text and the number of replacements. Line endings
    /// and every unmatched byte are preserved.
    pub fn rewrite_text(
        &self,
        text: &str,
        document: &Path,
        map: &RewriteMap,
        relative: bool,
    ) -> (String, usize) {
        let doc_dir = document.parent().unwrap_or_else(|| Path::new("/"));
        let origin_dir = map
            .origin_of(document)
            .and_then(Path::parent)
            .unwrap_or(doc_dir);

        let render = |target: &RewriteTarget| -> String {
            if relative && !target.pinned {
                self.format.placeholder_path(doc_dir, &target.path)
            } else {
                target.path.to_string_lossy().into_owned()
            }
        };

        let absolute: Vec<Needle> = map
            .targets
            .iter()
            .filter_map(|(source, target)| {
                let text = source.to_string_lossy().into_owned();
                let replacement = render(target);
                (text != replacement).then_some(Needle {
                    text,
                    replacement,
                    bounded: true,
                })
            })
            .collect();

        let mut out = String::with_capacity(text.len());
        let mut total = 0;

        for line in text.split_inclusive('\n') {
            let quoted: Vec<Needle> = quoted_literals(line)
                .filter_map(|raw| {
                    let resolved = self.format.resolve_literal(raw, origin_dir)?;
                    let target = map.get(&resolved)?;
                    // Already pointing at the target from where the document lives now.
                    if self.format.resolve_literal(raw, doc_dir).as_deref() == Some(target.path.as_path()) {
                        return None;
                    }
                    let replacement = render(target);
                    (raw != replacement).then(|| Needle {
                        text: format!("\"{}\"", raw),
                        replacement: format!("\"{}\"", replacement),
                        bounded: false,
                    })
                })
                .collect();
            let mut needles: Vec<&Needle> = absolute
                .iter()
                .filter(|n| line.contains(n.text.as_str()))
                .collect();

            needles.extend(quoted.iter());

            if needles.is_empty() {
                out.push_str(line);
                continue;
            }
            needles.sort_by(|a, b| b.text.len().cmp(&a.text.len()));
            total += replace_line(line, &needles, &mut out);
        }

        (out, total)
    }
}

/// Single left-to-right pass; the longest needle matching at a position wins.
fn replace_line(line: &str, needles: &[&Needle], out: &mut String) -> usize {
    let mut count = 0;
    let mut i = 0;
    let mut prev: Option<char> = None;

    while i < line.len() {
        let rest = &line[i..];
        let hit = needles.iter().find(|n| {
            if !rest.starts_with(n.text.as_str()) {
                return false;
            }
            if !n.bounded {
                return true;
            }
            let before_ok = prev.map_or(true, |c| !is_path_char(c));
            let after_ok = rest[n.text.len()..]
                .chars()
                .next()
                .map_or(true, |c| !is_path_char(c));
            before_ok && after_ok
        });

        match hit {
            Some(needle) => {
                out.push_str(&needle.replacement);
                i += needle.text.len();
                prev = needle.text.chars().next_back();
                count += 1;
            }
            None => {
                let Some(c) = rest.chars().next() else { break };
                out.push(c);
                i += c.len_utf8();
                prev = Some(c);
            }
        }
    }

    count
}

/// Replace `path` with `contents` via a synced temporary sibling.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| GatherError::io(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| GatherError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| GatherError::io(tmp.path(), e))?;

    let permissions = fs::metadata(path)
        .map_err(|e| GatherError::io(path, e))?
        .permissions();
    fs::set_permissions(tmp.path(), permissions).map_err(|e| GatherError::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| GatherError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rewriter() -> DocumentRewriter {
        DocumentRewriter::new(DocumentFormat::default())
    }

    fn map(pairs: &[(&str, &str)]) -> RewriteMap {
        let mut map = RewriteMap::new();
        for (s, d) in pairs {
            map.relocate(Path::new(s), Path::new(d));
        }
        map
    }

    #[test]
    fn test_absolute_replacement_respects_boundaries() {
        let m = map(&[("/a.png", "/d/png/a.png")]);
        let text = "filename \"/a.png\"\nfilename \"/x/a.png\"\nfilename \"/a.png.bak\"\n";
        let (out, n) = rewriter().rewrite_text(text, Path::new("/d/project/s.project"), &m, false);
        assert_eq!(n, 1);
        assert_eq!(
            out,
            "filename \"/d/png/a.png\"\nfilename \"/x/a.png\"\nfilename \"/a.png.bak\"\n"
        );
    }

    #[test]
    fn test_prefix_keys_single_pass() {
        let m = map(&[("/s/a", "/s/a/b"), ("/s/a/b", "/z")]);
        let (out, n) =
            rewriter().rewrite_text("\"/s/a\" \"/s/a/b\"", Path::new("/d/x.project"), &m, false);
        assert_eq!(n, 2);
        assert_eq!(out, "\"/s/a/b\" \"/z\"");
    }

    #[test]
    fn test_relative_output_uses_placeholder() {
        let m = map(&[("/src/tex/a.png", "/dst/png/a.png")]);
        let (out, _) = rewriter().rewrite_text(
            "filename \"/src/tex/a.png\"\r\n",
            Path::new("/dst/project/s.project"),
            &m,
            true,
        );
        assert_eq!(out, "filename \"$PDIR/../png/a.png\"\r\n");
    }

    #[test]
    fn test_relative_literal_resolved_against_origin() {
        let mut m = map(&[("/src/tex/a.png", "/dst/png/a.png")]);
        m.set_origin(Path::new("/dst/project/s.project"), Path::new("/src/s.project"));
        let text = "filename \"tex/a.png\"\nfilename \"$PDIR/tex/a.png\"\n";
        let (out, n) =
            rewriter().rewrite_text(text, Path::new("/dst/project/s.project"), &m, true);
        assert_eq!(n, 2);
        assert_eq!(
            out,
            "filename \"$PDIR/../png/a.png\"\nfilename \"$PDIR/../png/a.png\"\n"
        );
    }

    #[test]
    fn test_pinned_target_stays_absolute() {
        let mut m = RewriteMap::new();
        m.pin(Path::new("/lib/a.png"), Path::new("/lib/a.png"));
        m.set_origin(Path::new("/dst/project/s.project"), Path::new("/lib/s.project"));
        let (out, n) = rewriter().rewrite_text(
            "filename \"a.png\"\nfilename \"/lib/a.png\"\n",
            Path::new("/dst/project/s.project"),
            &m,
            true,
        );
        assert_eq!(n, 1);
        assert_eq!(out, "filename \"/lib/a.png\"\nfilename \"/lib/a.png\"\n");
    }

    #[test]
    fn test_from_table_records_origins_and_templates() {
        use crate::gather::RemapPlanner;
        use crate::types::SequencePattern;
        use std::collections::BTreeSet;

        let files: BTreeSet<PathBuf> = ["/src/s.project", "/src/t_1001.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let sequences: BTreeSet<PathBuf> = [PathBuf::from("/src/t_<UDIM>.png")].into();
        let table = RemapPlanner::new(Default::default(), SequencePattern::default())
            .plan(&files, &sequences, Path::new("/dst"))
            .unwrap();
        let map = RewriteMap::from_table(&table);

        assert_eq!(map.len(), 3);
        assert_eq!(
            map.origin_of(Path::new("/dst/project/s.project")),
            Some(Path::new("/src/s.project"))
        );
        assert_eq!(
            map.get(Path::new("/src/t_<UDIM>.png")).unwrap().path,
            PathBuf::from("/dst/png/t_<UDIM>.png")
        );
    }

    #[test]
    fn test_rewrite_file_no_match_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("s.project");
        fs::write(&doc, "name \"x\"\n").unwrap();
        let summary = rewriter().rewrite(&doc, &map(&[("/q.png", "/r.png")]), false).unwrap();
        assert!(!summary.written);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "name \"x\"\n");
    }

    #[test]
    fn test_rewrite_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("s.project");
        fs::write(&doc, "filename \"/q/a.png\"\n").unwrap();
        let summary = rewriter()
            .rewrite(&doc, &map(&[("/q/a.png", "/r/a.png")]), false)
            .unwrap();
        assert!(summary.written);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "filename \"/r/a.png\"\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("s.project");
        fs::write(&doc, b"filename \"/q/a.png\" \xff\n").unwrap();
        let err = rewriter()
            .rewrite(&doc, &map(&[("/q/a.png", "/r/a.png")]), false)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidEncoding);
        assert_eq!(fs::read(&doc).unwrap(), b"filename \"/q/a.png\" \xff\n");
    }

    proptest! {
        #[test]
        fn prop_rewrite_is_idempotent(
            names in proptest::collection::btree_set("[a-z]{1,6}", 1..6),
            relative in any::<bool>(),
        ) {
            let mut m = RewriteMap::new();
            let mut text = String::new();
            for name in &names {
                let source = format!("/src/tex/{}.png", name);
                m.relocate(Path::new(&source), Path::new(&format!("/dst/png/{}.png", name)));
                text.push_str(&format!("filename \"{}\"\n", source));
            }
            m.set_origin(Path::new("/dst/project/s.project"), Path::new("/src/s.project"));
            let doc = Path::new("/dst/project/s.project");

            let (once, n) = rewriter().rewrite_text(&text, doc, &m, relative);
            prop_assert_eq!(n, names.len());
            let (twice, again) = rewriter().rewrite_text(&once, doc, &m, relative);
            prop_assert_eq!(again, 0);
            prop_assert_eq!(once, twice);
        }
    }
}
