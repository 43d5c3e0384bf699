//! Publish orchestration.
//!
//! ```text
//! Idle → NameValidated → Gathered → Stored
//!   ↓          ↓             ↓
//! Rejected  Rejected       Failed
//! ```
//!
//! Naming and atomicity are checked before anything touches disk. A failed
//! gather or store leaves the scratch directory in place for inspection;
//! a successful store removes it unless the scratch policy says retain.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{GatherConfig, ScratchPolicy};
use crate::error::{GatherError, Result};
use crate::gather::{GatherOptions, GatherPipeline};
use crate::host::HostScene;
use crate::librarian::{Librarian, LibrarianError, StoreRequest};
use crate::manifest::GatherManifest;

/// Prefix of per-publish scratch directories.
const SCRATCH_PREFIX: &str = "gather_";

/// Where a publish currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    /// Nothing attempted yet.
    Idle,
    /// Name accepted by the naming policy.
    NameValidated,
    /// Unit gathered into scratch.
    Gathered,
    /// Payload handed to the store.
    Stored,
    /// Name or atomicity check failed; nothing written.
    Rejected,
    /// Gather or store failed; scratch retained.
    Failed,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::NameValidated => "name_validated",
            Self::Gathered => "gathered",
            Self::Stored => "stored",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Every invalid name of a batch with its reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameReport {
    failures: BTreeMap<String, String>,
}

impl NameReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejected name.
    pub fn insert(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.failures.insert(name.into(), reason.into());
    }

    /// Number of rejected names.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True if every name passed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Reason `name` was rejected.
    pub fn reason(&self, name: &str) -> Option<&str> {
        self.failures.get(name).map(String::as_str)
    }

    /// `(name, reason)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failures.iter().map(|(n, r)| (n.as_str(), r.as_str()))
    }

    /// One-line rendering: `name (reason); name (reason)`.
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(name, reason)| format!("{} ({})", name, reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Result of gathering one host unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitGather {
    /// `<dest>/<unit name>`.
    pub directory: PathBuf,
    /// What the gather did.
    pub manifest: GatherManifest,
}

/// Proof of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Published asset name.
    pub name: String,
    /// Repository published to.
    pub repo: String,
    /// Token extracted from the name.
    pub token: String,
    /// Asset directory in the store.
    pub stored_location: PathBuf,
    /// Root document inside the store.
    pub document: PathBuf,
    /// Scratch directory used; absent once deleted.
    pub scratch: Option<PathBuf>,
    /// Gather record.
    pub manifest: GatherManifest,
    /// When the store completed.
    pub published_at: DateTime<Utc>,
}

/// Outcome of one unit in a batch publish.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Unit name.
    pub name: String,
    /// Receipt or error.
    pub result: Result<PublishReceipt>,
}

/// Sequences naming, atomicity, gather and store for host units.
pub struct PublishOrchestrator<'a, H: HostScene> {
    config: GatherConfig,
    pipeline: GatherPipeline,
    librarian: &'a dyn Librarian,
    host: &'a H,
    state: PublishState,
}

impl<'a, H: HostScene> PublishOrchestrator<'a, H> {
    /// Create an orchestrator around its collaborators.
    pub fn new(config: GatherConfig, librarian: &'a dyn Librarian, host: &'a H) -> Result<Self> {
        let pipeline = GatherPipeline::new(&config)?;
        Ok(Self {
            config,
            pipeline,
            librarian,
            host,
            state: PublishState::Idle,
        })
    }

    /// State reached by the most recent publish.
    pub fn state(&self) -> PublishState {
        self.state
    }

    fn transition(&mut self, next: PublishState) {
        tracing::debug!(from = %self.state, to = %next, "publish state");
        self.state = next;
    }

    /// Validate every unit's name, collecting all failures.
    pub fn validate_names(&self, units: &[H::Unit], repo: Option<&str>) -> NameReport {
        let mut report = NameReport::new();
        for unit in units {
            let name = self.host.unit_name(unit);
            if let Err(e) = self.librarian.validate_name(&name, repo) {
                report.insert(name, naming_reason(&e));
            }
        }
        report
    }

    /// Gather one unit into `dest/<unit name>/`.
    pub fn gather_unit(&self, unit: &H::Unit, dest: &Path) -> Result<UnitGather> {
        let name = self.host.unit_name(unit);
        if !self.host.is_atomic(unit)? {
            return Err(GatherError::NotAtomic { name });
        }

        let export_dir = tempfile::Builder::new()
            .prefix("export_")
            .tempdir()
            .map_err(|e| GatherError::io(std::env::temp_dir(), e))?;
        let exported = self.host.export_unit(unit, export_dir.path())?;

        let directory = dest.join(&name);
        fs::create_dir_all(&directory).map_err(|e| GatherError::io(&directory, e))?;
        let options = GatherOptions::from_config(&self.config);
        let manifest = self
            .pipeline
            .gather_project(&exported, &directory, &options, None)?;

        let export_path = export_dir.path().to_path_buf();
        export_dir
            .close()
            .map_err(|e| GatherError::io(export_path, e))?;

        Ok(UnitGather {
            directory,
            manifest,
        })
    }

    /// Publish one unit to `repo` (or the default repository).
    pub fn publish(&mut self, unit: &H::Unit, repo: Option<&str>) -> Result<PublishReceipt> {
        self.state = PublishState::Idle;
        let name = self.host.unit_name(unit);
        let repo_name = repo.map(str::to_string).unwrap_or_else(|| self.librarian.default_repo());

        if let Err(e) = self.librarian.validate_name(&name, repo) {
            self.transition(PublishState::Rejected);
            if !matches!(e, LibrarianError::Naming { .. }) {
                return Err(GatherError::Store(e));
            }
            let mut report = NameReport::new();
            report.insert(name, naming_reason(&e));
            return Err(GatherError::InvalidNames(report));
        }
        self.transition(PublishState::NameValidated);

        match self.host.is_atomic(unit) {
            Ok(true) => {}
            Ok(false) => {
                self.transition(PublishState::Rejected);
                return Err(GatherError::NotAtomic { name });
            }
            Err(e) => {
                self.transition(PublishState::Rejected);
                return Err(e.into());
            }
        }

        let scratch = match self.make_scratch() {
            Ok(scratch) => scratch,
            Err(e) => {
                self.transition(PublishState::Failed);
                return Err(e);
            }
        };
        tracing::info!(name = %name, repo = %repo_name, scratch = %scratch.display(), "publishing");

        let result = self.gather_and_store(unit, &name, repo, &scratch);
        let (gathered, token, stored_location) = match result {
            Ok(done) => done,
            Err(e) => {
                self.transition(PublishState::Failed);
                tracing::warn!(
                    name = %name,
                    scratch = %scratch.display(),
                    error = %e,
                    "publish failed, scratch retained"
                );
                return Err(e);
            }
        };

        let scratch = match self.config.scratch_policy {
            ScratchPolicy::Retain => Some(scratch),
            ScratchPolicy::DeleteOnSuccess => match fs::remove_dir_all(&scratch) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(scratch = %scratch.display(), error = %e, "scratch cleanup failed");
                    Some(scratch)
                }
            },
        };

        let document = gathered
            .manifest
            .root_destination
            .strip_prefix(&gathered.directory)
            .map(|rel| stored_location.join(rel))
            .unwrap_or_else(|_| stored_location.clone());

        tracing::info!(name = %name, stored = %stored_location.display(), "published");
        Ok(PublishReceipt {
            name,
            repo: repo_name,
            token,
            stored_location,
            document,
            scratch,
            manifest: gathered.manifest,
            published_at: Utc::now(),
        })
    }

    fn make_scratch(&self) -> Result<PathBuf> {
        let parent = self.librarian.gather_scratch_location()?;
        let scratch = parent.join(format!("{}{}", SCRATCH_PREFIX, Uuid::new_v4().simple()));
        fs::create_dir_all(&scratch).map_err(|e| GatherError::io(&scratch, e))?;
        Ok(scratch)
    }

    fn gather_and_store(
        &mut self,
        unit: &H::Unit,
        name: &str,
        repo: Option<&str>,
        scratch: &Path,
    ) -> Result<(UnitGather, String, PathBuf)> {
        let gathered = self.gather_unit(unit, scratch)?;
        self.transition(PublishState::Gathered);

        let token = self.librarian.extract_token(name, repo)?;
        let dest_parent = self.librarian.publish_location(&token, repo)?;
        self.librarian.store(&StoreRequest {
            name: name.to_string(),
            dest_parent: dest_parent.clone(),
            source: gathered.directory.clone(),
            merge: true,
            verify: self.config.verified_copy,
        })?;
        self.transition(PublishState::Stored);

        Ok((gathered, token, dest_parent.join(name)))
    }

    /// Publish, then replace the live unit with a reference to the stored
    /// root document.
    pub fn publish_as_reference(&mut self, unit: &H::Unit, repo: Option<&str>) -> Result<PublishReceipt> {
        let receipt = self.publish(unit, repo)?;
        self.host.replace_with_reference(unit, &receipt.document)?;
        Ok(receipt)
    }

    /// Publish every unit, refusing the whole batch if any name is invalid.
    ///
    /// Past the name check, one unit's failure does not stop the others.
    pub fn publish_batch(&mut self, units: &[H::Unit], repo: Option<&str>) -> Result<Vec<BatchOutcome>> {
        let report = self.validate_names(units, repo);
        if !report.is_empty() {
            tracing::warn!(invalid = report.len(), "batch rejected");
            return Err(GatherError::InvalidNames(report));
        }

        let mut outcomes = Vec::with_capacity(units.len());
        for unit in units {
            let name = self.host.unit_name(unit);
            let result = self.publish(unit, repo);
            outcomes.push(BatchOutcome { name, result });
        }
        Ok(outcomes)
    }
}

fn naming_reason(e: &LibrarianError) -> String {
    match e {
        LibrarianError::Naming { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
