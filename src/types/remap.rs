//! Remap table: where every gathered source lands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use xxhash_rust::xxh64::Xxh64;

use super::sequence::SequenceGroup;

/// A sequence group together with the template it is renamed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMapping {
    /// The source group.
    pub group: SequenceGroup,
    /// Destination template; members land beside it differing only in the
    /// index token.
    pub destination_template: PathBuf,
}

/// Mapping from original absolute path to destination absolute path.
///
/// Built once per gather by the planner and never mutated afterwards.
/// Keys are unique and no two keys share a destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapTable {
    entries: BTreeMap<PathBuf, PathBuf>,
    sequences: Vec<SequenceMapping>,
}

impl RemapTable {
    /// Assemble a table. Callers guarantee destinations are distinct.
    pub(crate) fn from_parts(
        entries: BTreeMap<PathBuf, PathBuf>,
        sequences: Vec<SequenceMapping>,
    ) -> Self {
        Self { entries, sequences }
    }

    /// Destination of `source`.
    pub fn get(&self, source: &Path) -> Option<&Path> {
        self.entries.get(source).map(PathBuf::as_path)
    }

    /// True if `source` is remapped.
    pub fn contains(&self, source: &Path) -> bool {
        self.entries.contains_key(source)
    }

    /// Iterate `(source, destination)` in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.entries
            .iter()
            .map(|(s, d)| (s.as_path(), d.as_path()))
    }

    /// Number of remapped files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is remapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence groups and their destination templates.
    pub fn sequences(&self) -> &[SequenceMapping] {
        &self.sequences
    }

    /// Source whose destination is `destination`.
    pub fn source_of(&self, destination: &Path) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(_, d)| d.as_path() == destination)
            .map(|(s, _)| s.as_path())
    }

    /// Deterministic fingerprint of the mapping: xxh64 over the sorted
    /// pairs, then the sequence templates, each path length-prefixed.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Xxh64::new(0);
        for (source, destination) in &self.entries {
            feed(&mut hasher, source);
            feed(&mut hasher, destination);
        }
        hasher.update(&(self.sequences.len() as u64).to_le_bytes());
        for mapping in &self.sequences {
            feed(&mut hasher, &mapping.group.template);
            feed(&mut hasher, &mapping.destination_template);
        }
        format!("{:016x}", hasher.digest())
    }
}

fn feed(hasher: &mut Xxh64, path: &Path) {
    let bytes = path.as_os_str().as_encoded_bytes();
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
