//! Directory-backed librarian.
//!
//! Each named repository is a root directory. Names are checked against a
//! regex with a `token` capture; assets with token `t` are published under
//! `<repo root>/<t>/<name>`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;

use super::{Librarian, LibrarianError, StoreRequest};
use crate::gather::copy::copy_file;
use crate::types::{absolutize, normalize_path};

/// Default naming rule: `<token>_<descriptor>[_<more>...]`, lowercase.
pub const DEFAULT_NAMING_RULE: &str =
    r"^(?P<token>[a-z][a-z0-9]*)_[a-z][a-z0-9]*(?:_[a-z0-9]+)*$";

fn default_naming_rule() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DEFAULT_NAMING_RULE).expect("valid naming rule"))
}

/// Librarian over plain directories.
#[derive(Debug)]
pub struct LocalLibrarian {
    repos: BTreeMap<String, PathBuf>,
    default_repo: String,
    scratch_root: PathBuf,
    naming: Regex,
}

impl LocalLibrarian {
    /// Create a librarian with one default repository.
    pub fn new(
        default_repo: impl Into<String>,
        root: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        let default_repo = default_repo.into();
        let mut repos = BTreeMap::new();
        repos.insert(default_repo.clone(), normalize_path(&root.into()));
        Self {
            repos,
            default_repo,
            scratch_root: scratch_root.into(),
            naming: default_naming_rule().clone(),
        }
    }

    /// Add another repository.
    pub fn with_repo(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.repos.insert(name.into(), normalize_path(&root.into()));
        self
    }

    /// Replace the naming rule. The pattern must have a `token` group.
    pub fn with_naming_rule(mut self, pattern: &str) -> Result<Self, LibrarianError> {
        let naming = Regex::new(pattern)
            .map_err(|e| LibrarianError::Store(format!("invalid naming rule: {}", e)))?;
        if !naming.capture_names().any(|n| n == Some("token")) {
            return Err(LibrarianError::Store(
                "naming rule has no 'token' group".to_string(),
            ));
        }
        self.naming = naming;
        Ok(self)
    }

    /// Root directory of `repo` (or the default).
    pub fn repo_root(&self, repo: Option<&str>) -> Result<&Path, LibrarianError> {
        let name = repo.unwrap_or(&self.default_repo);
        self.repos
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| LibrarianError::UnknownRepo(name.to_string()))
    }
}

impl Librarian for LocalLibrarian {
    fn validate_name(&self, name: &str, repo: Option<&str>) -> Result<(), LibrarianError> {
        self.repo_root(repo)?;
        if name.is_empty() {
            return Err(LibrarianError::Naming {
                name: name.to_string(),
                reason: "name is empty".to_string(),
            });
        }
        if !self.naming.is_match(name) {
            return Err(LibrarianError::Naming {
                name: name.to_string(),
                reason: format!("does not match naming rule {}", self.naming.as_str()),
            });
        }
        Ok(())
    }

    fn extract_token(&self, name: &str, repo: Option<&str>) -> Result<String, LibrarianError> {
        self.validate_name(name, repo)?;
        self.naming
            .captures(name)
            .and_then(|caps| caps.name("token"))
            .map(|m| m.as_str().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| LibrarianError::Naming {
                name: name.to_string(),
                reason: "no token in name".to_string(),
            })
    }

    fn default_repo(&self) -> String {
        self.default_repo.clone()
    }

    fn gather_scratch_location(&self) -> Result<PathBuf, LibrarianError> {
        fs::create_dir_all(&self.scratch_root)
            .map_err(|e| LibrarianError::io(&self.scratch_root, e))?;
        Ok(self.scratch_root.clone())
    }

    fn publish_location(&self, token: &str, repo: Option<&str>) -> Result<PathBuf, LibrarianError> {
        Ok(self.repo_root(repo)?.join(token))
    }

    fn path_is_in_repo(&self, path: &Path, repos: Option<&[String]>, check_all: bool) -> bool {
        let path = absolutize(path).unwrap_or_else(|_| normalize_path(path));
        let inside = |root: &PathBuf| path.starts_with(root);

        if check_all {
            return self.repos.values().any(inside);
        }
        match repos {
            Some(names) => names
                .iter()
                .filter_map(|n| self.repos.get(n))
                .any(inside),
            None => self.repos.get(&self.default_repo).map_or(false, inside),
        }
    }

    fn store(&self, request: &StoreRequest) -> Result<(), LibrarianError> {
        if !request.source.is_dir() {
            return Err(LibrarianError::Store(format!(
                "source {} is not a directory",
                request.source.display()
            )));
        }
        let target = request.dest_parent.join(&request.name);
        if target.exists() && !request.merge {
            return Err(LibrarianError::Store(format!(
                "asset already exists at {}",
                target.display()
            )));
        }

        let files = copy_tree(&request.source, &target, request.verify)?;
        tracing::info!(
            name = %request.name,
            target = %target.display(),
            files,
            merge = request.merge,
            verified = request.verify,
            "stored asset"
        );
        Ok(())
    }
}

/// Copy every file under `source` into `target`, returning the file count.
fn copy_tree(source: &Path, target: &Path, verify: bool) -> Result<usize, LibrarianError> {
    fs::create_dir_all(target).map_err(|e| LibrarianError::io(target, e))?;

    let mut entries = fs::read_dir(source)
        .map_err(|e| LibrarianError::io(source, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| LibrarianError::io(source, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut count = 0;
    for entry in entries {
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            count += copy_tree(&from, &to, verify)?;
        } else {
            copy_file(&from, &to, verify).map_err(|failure| {
                LibrarianError::Store(format!(
                    "copy of {} failed: {}",
                    failure.source.display(),
                    failure.reason
                ))
            })?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn librarian(root: &Path) -> LocalLibrarian {
        LocalLibrarian::new("main", root.join("main"), root.join("scratch"))
            .with_repo("archive", root.join("archive"))
    }

    #[test]
    fn test_naming_rule_and_token() {
        let lib = librarian(Path::new("/lib"));
        assert!(lib.validate_name("char_hero", None).is_ok());
        assert_eq!(lib.extract_token("prop_chair_v2", None).unwrap(), "prop");

        let err = lib.validate_name("Hero", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidName);
        assert!(matches!(
            lib.validate_name("char_hero", Some("nope")),
            Err(LibrarianError::UnknownRepo(_))
        ));
    }

    #[test]
    fn test_custom_rule_requires_token_group() {
        let lib = librarian(Path::new("/lib"));
        assert!(lib.with_naming_rule("^[a-z]+$").is_err());

        let lib = librarian(Path::new("/lib"))
            .with_naming_rule(r"^(?P<token>[A-Z]{3})\d+$")
            .unwrap();
        assert_eq!(lib.extract_token("ABC12", None).unwrap(), "ABC");
    }

    #[test]
    fn test_path_is_in_repo_selection() {
        let lib = librarian(Path::new("/lib"));
        let inside_archive = Path::new("/lib/archive/prop/a.png");

        assert!(lib.path_is_in_repo(inside_archive, None, true));
        assert!(!lib.path_is_in_repo(inside_archive, None, false));
        assert!(lib.path_is_in_repo(inside_archive, Some(&["archive".to_string()]), false));
        assert!(!lib.path_is_in_repo(Path::new("/lib/mainline/a.png"), None, true));
        assert!(!lib.path_is_in_repo(Path::new("/lib/main/../x.png"), None, false));
    }

    #[test]
    fn test_store_merges_and_refuses_without_merge() {
        let dir = tempfile::tempdir().unwrap();
        let lib = librarian(dir.path());
        let payload = dir.path().join("payload");
        fs::create_dir_all(payload.join("png")).unwrap();
        fs::write(payload.join("png/a.png"), b"new").unwrap();

        let dest_parent = lib.publish_location("char", None).unwrap();
        let existing = dest_parent.join("char_hero");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("keep.txt"), b"old").unwrap();

        let mut request = StoreRequest {
            name: "char_hero".into(),
            dest_parent,
            source: payload,
            merge: false,
            verify: true,
        };
        assert!(lib.store(&request).is_err());

        request.merge = true;
        lib.store(&request).unwrap();
        assert_eq!(fs::read(existing.join("png/a.png")).unwrap(), b"new");
        assert!(existing.join("keep.txt").exists());
    }
}
