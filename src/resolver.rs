//! Transitive dependency resolution over sub-documents.
//!
//! Depth-first walk from a root document. Every document is scanned at most
//! once; back-references and diamonds are absorbed by the visited set.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatherError, Result};
use crate::scanner::ReferenceScanner;
use crate::types::absolutize;

/// Flat reachability sets for one root document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    /// The root document (absolute).
    pub root: PathBuf,
    /// Every reachable document except the root.
    pub sub_documents: BTreeSet<PathBuf>,
    /// Every non-document file reachable from the root or a sub-document.
    pub external_refs: BTreeSet<PathBuf>,
    /// Sequence templates found anywhere in the graph.
    pub sequences: BTreeSet<PathBuf>,
}

impl DependencySet {
    /// All files a gather must carry: root, sub-documents and externals.
    pub fn all_files(&self) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();
        files.insert(self.root.clone());
        files.extend(self.sub_documents.iter().cloned());
        files.extend(self.external_refs.iter().cloned());
        files
    }
}

/// Walks the sub-document graph of a root document.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    scanner: ReferenceScanner,
}

impl DependencyResolver {
    /// Create a resolver around a scanner.
    pub fn new(scanner: ReferenceScanner) -> Self {
        Self { scanner }
    }

    /// The scanner used for each document.
    pub fn scanner(&self) -> &ReferenceScanner {
        &self.scanner
    }

    /// Resolve everything reachable from `root`.
    ///
    /// The root must be an existing document; sub-documents that cannot be
    /// read are skipped with a warning.
    pub fn resolve_transitive(&self, root: &Path) -> Result<DependencySet> {
        let root = absolutize(root).map_err(|e| GatherError::io(root, e))?;
        let root_scan = self.scanner.scan(&root)?;

        let mut set = DependencySet {
            root: root.clone(),
            ..DependencySet::default()
        };
        let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
        visited.insert(root.clone());

        set.external_refs.extend(root_scan.external_refs);
        set.sequences.extend(root_scan.sequences);

        // Depth-first: pop the most recently discovered document first.
        let mut stack: Vec<PathBuf> = root_scan.sub_documents.into_iter().rev().collect();

        while let Some(document) = stack.pop() {
            if !visited.insert(document.clone()) {
                continue;
            }

            let scan = match self.scanner.scan(&document) {
                Ok(scan) => scan,
                Err(e) => {
                    tracing::warn!(
                        document = %document.display(),
                        error = %e,
                        "skipping unreadable sub-document"
                    );
                    continue;
                }
            };

            set.sub_documents.insert(document);
            set.external_refs.extend(scan.external_refs);
            set.sequences.extend(scan.sequences);

            for child in scan.sub_documents.into_iter().rev() {
                if !visited.contains(&child) {
                    stack.push(child);
                }
            }
        }

        tracing::debug!(
            root = %root.display(),
            sub_documents = set.sub_documents.len(),
            external_refs = set.external_refs.len(),
            "resolved dependencies"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatherConfig;
    use std::fs;

    fn resolver() -> DependencyResolver {
        DependencyResolver::new(ReferenceScanner::from_config(&GatherConfig::default()))
    }

    #[test]
    fn test_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.project");
        let b = dir.path().join("b.project");
        fs::write(&a, "filename \"b.project\"\n").unwrap();
        fs::write(&b, "filename \"a.project\"\nfilename \"b.project\"\n").unwrap();

        let set = resolver().resolve_transitive(&a).unwrap();
        assert_eq!(set.sub_documents.into_iter().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_diamond_collects_all_externals_once() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("root.project"), "filename \"l.project\"\nfilename \"r.project\"\n").unwrap();
        fs::write(p.join("l.project"), "filename \"shared.project\"\nfilename \"l.abc\"\n").unwrap();
        fs::write(p.join("r.project"), "filename \"shared.project\"\n").unwrap();
        fs::write(p.join("shared.project"), "filename \"s.png\"\n").unwrap();
        fs::write(p.join("l.abc"), "").unwrap();
        fs::write(p.join("s.png"), "").unwrap();

        let set = resolver().resolve_transitive(&p.join("root.project")).unwrap();
        assert_eq!(set.sub_documents.len(), 3);
        assert_eq!(set.external_refs.len(), 2);
        assert_eq!(set.all_files().len(), 6);
    }

    #[test]
    fn test_missing_root_is_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver()
            .resolve_transitive(&dir.path().join("nope.project"))
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Precondition);
    }
}
