//! Gather manifest: a serializable record of what one gather did.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gather::{CopiedFile, GatherOptions, Gatherer};
use crate::GATHER_SCHEMA_VERSION;

/// Counts summarizing a gather.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherStats {
    /// Files in the remap plan.
    pub planned: usize,
    /// Files copied.
    pub copied: usize,
    /// Files left at their canonical location.
    pub culled: usize,
    /// Documents whose references were rewritten.
    pub rewritten: usize,
    /// Sequence groups in the plan.
    pub sequence_groups: usize,
}

/// The complete gather manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherManifest {
    /// Fingerprint of the remap table.
    pub plan_id: String,
    /// Schema version.
    pub version: String,
    /// Root document that was gathered.
    pub root_source: PathBuf,
    /// Where the root document now lives.
    pub root_destination: PathBuf,
    /// Destination root directory.
    pub destination: PathBuf,
    /// Every copy performed.
    pub copied: Vec<CopiedFile>,
    /// Sources left in place because the store already holds them.
    pub culled: Vec<PathBuf>,
    /// Gathered documents that were rewritten.
    pub rewritten: Vec<PathBuf>,
    /// Whether references were written relative to each document.
    pub relative: bool,
    /// Whether copies were checksum-verified.
    pub verified: bool,
    /// Summary statistics.
    pub stats: GatherStats,
    /// When the gather finished.
    pub gathered_at: DateTime<Utc>,
}

impl GatherManifest {
    /// Assemble the manifest for a completed gather.
    pub(crate) fn build(
        gatherer: &Gatherer,
        root: &Path,
        destination: &Path,
        copied: Vec<CopiedFile>,
        rewritten: Vec<PathBuf>,
        options: &GatherOptions,
    ) -> Self {
        let table = gatherer.table();
        let root_destination = if gatherer.culled().contains(root) {
            root.to_path_buf()
        } else {
            table.get(root).unwrap_or(root).to_path_buf()
        };
        let culled: Vec<PathBuf> = gatherer.culled().iter().cloned().collect();

        let stats = GatherStats {
            planned: table.len(),
            copied: copied.len(),
            culled: culled.len(),
            rewritten: rewritten.len(),
            sequence_groups: table.sequences().len(),
        };

        Self {
            plan_id: table.fingerprint(),
            version: GATHER_SCHEMA_VERSION.to_string(),
            root_source: root.to_path_buf(),
            root_destination,
            destination: destination.to_path_buf(),
            copied,
            culled,
            rewritten,
            relative: options.relative,
            verified: options.verify,
            stats,
            gathered_at: Utc::now(),
        }
    }

    /// Destination of `source`, if it was copied.
    pub fn destination_of(&self, source: &Path) -> Option<&Path> {
        self.copied
            .iter()
            .find(|c| c.source == source)
            .map(|c| c.destination.as_path())
    }
}
