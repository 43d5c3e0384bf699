//! Integration tests for publishing host units.
//!
//! These tests validate the publish lifecycle end to end:
//! 1. Successful publish into a local library
//! 2. Rejection before any disk side effect
//! 3. Scratch retention on store failure
//! 4. Batch name validation
//! 5. Publish as reference

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use scene_gather::types::absolutize;
use scene_gather::{
    DependencyResolver, ErrorCode, GatherConfig, GatherError, Librarian, LibrarianError,
    LocalLibrarian, ProjectFileHost, PublishOrchestrator, PublishState, ReferenceScanner,
    ScratchPolicy, StoreRequest,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A self-contained unit under `units/<name>/`.
fn build_unit(root: &Path, name: &str) -> PathBuf {
    let home = root.join("units").join(name);
    write(&home.join("tex/albedo.png"), "albedo");
    write(&home.join("lib/geo.abc"), "geo");
    write(&home.join("lib/inner.project"), "filename \"geo.abc\"\n");
    let unit = home.join(format!("{}.project", name));
    write(
        &unit,
        "filename \"tex/albedo.png\"\nContextReference \"inner\" {\n    filename \"lib/inner.project\"\n}\n",
    );
    unit
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    librarian: RecordingLibrarian,
    host: ProjectFileHost,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = absolutize(dir.path()).unwrap();
        let librarian = RecordingLibrarian::new(LocalLibrarian::new(
            "main",
            root.join("library"),
            root.join("scratch"),
        ));
        Self {
            _dir: dir,
            root,
            librarian,
            host: ProjectFileHost::from_config(&GatherConfig::default()),
        }
    }

    fn scratch_entries(&self) -> usize {
        fs::read_dir(self.root.join("scratch"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Librarian that records every store request it forwards.
struct RecordingLibrarian {
    inner: LocalLibrarian,
    stored: Mutex<Vec<StoreRequest>>,
}

impl RecordingLibrarian {
    fn new(inner: LocalLibrarian) -> Self {
        Self {
            inner,
            stored: Mutex::new(Vec::new()),
        }
    }

    fn stored(&self) -> Vec<StoreRequest> {
        self.stored.lock().clone()
    }
}

impl Librarian for RecordingLibrarian {
    fn validate_name(&self, name: &str, repo: Option<&str>) -> Result<(), LibrarianError> {
        self.inner.validate_name(name, repo)
    }
    fn extract_token(&self, name: &str, repo: Option<&str>) -> Result<String, LibrarianError> {
        self.inner.extract_token(name, repo)
    }
    fn default_repo(&self) -> String {
        self.inner.default_repo()
    }
    fn gather_scratch_location(&self) -> Result<PathBuf, LibrarianError> {
        self.inner.gather_scratch_location()
    }
    fn publish_location(&self, token: &str, repo: Option<&str>) -> Result<PathBuf, LibrarianError> {
        self.inner.publish_location(token, repo)
    }
    fn path_is_in_repo(&self, path: &Path, repos: Option<&[String]>, check_all: bool) -> bool {
        self.inner.path_is_in_repo(path, repos, check_all)
    }
    fn store(&self, request: &StoreRequest) -> Result<(), LibrarianError> {
        self.inner.store(request)?;
        self.stored.lock().push(request.clone());
        Ok(())
    }
}

/// Librarian whose store always fails.
struct BrokenStore(LocalLibrarian);

impl Librarian for BrokenStore {
    fn validate_name(&self, name: &str, repo: Option<&str>) -> Result<(), LibrarianError> {
        self.0.validate_name(name, repo)
    }
    fn extract_token(&self, name: &str, repo: Option<&str>) -> Result<String, LibrarianError> {
        self.0.extract_token(name, repo)
    }
    fn default_repo(&self) -> String {
        self.0.default_repo()
    }
    fn gather_scratch_location(&self) -> Result<PathBuf, LibrarianError> {
        self.0.gather_scratch_location()
    }
    fn publish_location(&self, token: &str, repo: Option<&str>) -> Result<PathBuf, LibrarianError> {
        self.0.publish_location(token, repo)
    }
    fn path_is_in_repo(&self, path: &Path, repos: Option<&[String]>, check_all: bool) -> bool {
        self.0.path_is_in_repo(path, repos, check_all)
    }
    fn store(&self, _request: &StoreRequest) -> Result<(), LibrarianError> {
        Err(LibrarianError::Store("disk quota exceeded".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Publish
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_publish_stores_self_contained_asset() {
    let fx = Fixture::new();
    let unit = build_unit(&fx.root, "char_hero");

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let receipt = orchestrator.publish(&unit, None).unwrap();

    assert_eq!(orchestrator.state(), PublishState::Stored);
    assert_eq!(receipt.token, "char");
    assert_eq!(receipt.repo, "main");
    assert_eq!(receipt.stored_location, fx.root.join("library/char/char_hero"));
    assert_eq!(
        receipt.document,
        receipt.stored_location.join("project/char_hero.project")
    );
    assert!(receipt.document.exists());
    assert_eq!(fx.librarian.stored().len(), 1);
    assert!(fx.librarian.stored()[0].merge);

    // Scratch removed on success.
    assert!(receipt.scratch.is_none());
    assert_eq!(fx.scratch_entries(), 0);

    // The stored copy only reaches into the store.
    let resolver =
        DependencyResolver::new(ReferenceScanner::from_config(&GatherConfig::default()));
    let deps = resolver.resolve_transitive(&receipt.document).unwrap();
    assert_eq!(deps.all_files().len(), 4);
    assert!(deps
        .all_files()
        .iter()
        .all(|p| p.starts_with(&receipt.stored_location)));
}

#[test]
fn test_invalid_name_rejected_before_disk() {
    let fx = Fixture::new();
    let unit = build_unit(&fx.root, "Hero");

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let err = orchestrator.publish(&unit, None).unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidName);
    assert_eq!(orchestrator.state(), PublishState::Rejected);
    assert!(!fx.root.join("scratch").exists());
    assert!(!fx.root.join("library").exists());
}

#[test]
fn test_non_atomic_unit_rejected() {
    let fx = Fixture::new();
    write(&fx.root.join("units/shared.project"), "");
    let unit = fx.root.join("units/char_hero/char_hero.project");
    write(&unit, "filename \"../shared.project\"\n");

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let err = orchestrator.publish(&unit, None).unwrap_err();

    assert!(matches!(err, GatherError::NotAtomic { ref name } if name == "char_hero"));
    assert_eq!(orchestrator.state(), PublishState::Rejected);
    assert!(!fx.root.join("scratch").exists());
}

#[test]
fn test_store_failure_retains_scratch() {
    let fx = Fixture::new();
    let unit = build_unit(&fx.root, "char_hero");
    let broken = BrokenStore(LocalLibrarian::new(
        "main",
        fx.root.join("library"),
        fx.root.join("scratch"),
    ));

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &broken, &fx.host).unwrap();
    let err = orchestrator.publish(&unit, None).unwrap_err();

    assert_eq!(err.code(), ErrorCode::Store);
    assert!(err.to_string().contains("disk quota exceeded"));
    assert_eq!(orchestrator.state(), PublishState::Failed);
    assert_eq!(fx.scratch_entries(), 1);
}

#[test]
fn test_retain_policy_keeps_scratch() {
    let fx = Fixture::new();
    let unit = build_unit(&fx.root, "prop_chair");
    let config = GatherConfig {
        scratch_policy: ScratchPolicy::Retain,
        ..GatherConfig::default()
    };

    let mut orchestrator = PublishOrchestrator::new(config, &fx.librarian, &fx.host).unwrap();
    let receipt = orchestrator.publish(&unit, None).unwrap();

    let scratch = receipt.scratch.expect("scratch retained");
    assert!(scratch.join("prop_chair/project/prop_chair.project").exists());
}

#[test]
fn test_gather_unit_creates_named_directory() {
    let fx = Fixture::new();
    let unit = build_unit(&fx.root, "char_hero");
    let dest = fx.root.join("gathered");
    fs::create_dir(&dest).unwrap();

    let orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let gathered = orchestrator.gather_unit(&unit, &dest).unwrap();

    assert_eq!(gathered.directory, dest.join("char_hero"));
    assert!(gathered.directory.join("png/albedo.png").exists());
    assert!(gathered.directory.join("project/inner.project").exists());
    assert_eq!(gathered.manifest.stats.copied, 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// Batches
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_batch_reports_every_invalid_name() {
    let fx = Fixture::new();
    let units = vec![
        build_unit(&fx.root, "char_hero"),
        build_unit(&fx.root, "BadOne"),
        build_unit(&fx.root, "worse"),
    ];

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let report = orchestrator.validate_names(&units, None);
    assert_eq!(report.len(), 2);
    assert!(report.reason("BadOne").is_some());
    assert!(report.reason("worse").is_some());

    let err = orchestrator.publish_batch(&units, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidName);
    assert!(fx.librarian.stored().is_empty());
    assert!(!fx.root.join("library").exists());
}

#[test]
fn test_batch_publishes_each_unit() {
    let fx = Fixture::new();
    let units = vec![
        build_unit(&fx.root, "char_hero"),
        build_unit(&fx.root, "prop_chair"),
    ];

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let outcomes = orchestrator.publish_batch(&units, None).unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert_eq!(outcomes[1].name, "prop_chair");
    assert!(fx.root.join("library/prop/prop_chair").is_dir());
}

#[test]
fn test_publish_as_reference_replaces_unit() {
    let fx = Fixture::new();
    let unit = build_unit(&fx.root, "char_hero");

    let mut orchestrator =
        PublishOrchestrator::new(GatherConfig::default(), &fx.librarian, &fx.host).unwrap();
    let receipt = orchestrator.publish_as_reference(&unit, None).unwrap();

    let text = fs::read_to_string(&unit).unwrap();
    assert!(text.contains(&format!("filename \"{}\"", receipt.document.display())));

    // The stub now resolves to the stored document.
    let scan = ReferenceScanner::from_config(&GatherConfig::default())
        .scan(&unit)
        .unwrap();
    assert!(scan.sub_documents.contains(&receipt.document));
}
