//! Remap planning: decide where every gathered file lands.
//!
//! Files go to `<dest_root>/<subdir>/<file name>`, the subdirectory chosen by
//! extension. Sequence groups are placed first so that all members of one
//! template share a directory and keep names that differ only in the index
//! token. Any two sources landing on the same destination abort the plan.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::{DestinationLayout, GatherConfig};
use crate::error::{GatherError, Result};
use crate::types::{absolutize, RemapTable, SequenceGroup, SequenceMapping, SequencePattern};

/// Computes a [`RemapTable`] for a file set and destination root.
#[derive(Debug, Clone)]
pub struct RemapPlanner {
    layout: DestinationLayout,
    sequence: SequencePattern,
}

impl RemapPlanner {
    /// Create a planner.
    pub fn new(layout: DestinationLayout, sequence: SequencePattern) -> Self {
        Self { layout, sequence }
    }

    /// Create a planner from a configuration bundle.
    pub fn from_config(config: &GatherConfig) -> Self {
        Self::new(config.layout.clone(), config.sequence.clone())
    }

    /// Plan destinations for `files` under `dest_root`.
    ///
    /// `sequences` are the templates discovered while scanning; each one
    /// with members in `files` becomes a [`SequenceGroup`].
    pub fn plan(
        &self,
        files: &BTreeSet<PathBuf>,
        sequences: &BTreeSet<PathBuf>,
        dest_root: &Path,
    ) -> Result<RemapTable> {
        let dest_root = absolutize(dest_root).map_err(|e| GatherError::io(dest_root, e))?;

        let mut entries: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        let mut claimed: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        let mut mappings: Vec<SequenceMapping> = Vec::new();
        let mut template_claims: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        let mut grouped: BTreeSet<PathBuf> = BTreeSet::new();

        for template in sequences {
            let ungrouped = files.iter().filter(|f| !grouped.contains(*f));
            let Some(group) = SequenceGroup::detect(&self.sequence, template, ungrouped) else {
                continue;
            };

            let dir = dest_root.join(self.layout.subdir_for(template));
            let destination_template = match template.file_name() {
                Some(name) => dir.join(name),
                None => continue,
            };
            claim(&mut template_claims, template, &destination_template)?;

            for member in &group.members {
                let Some(name) = member.file_name() else { continue };
                let destination = dir.join(name);
                claim(&mut claimed, member, &destination)?;
                entries.insert(member.clone(), destination);
                grouped.insert(member.clone());
            }

            mappings.push(SequenceMapping {
                group,
                destination_template,
            });
        }

        for file in files {
            if grouped.contains(file) {
                continue;
            }
            let Some(name) = file.file_name() else {
                return Err(GatherError::precondition(file, "path has no file name"));
            };
            let destination = dest_root.join(self.layout.subdir_for(file)).join(name);
            claim(&mut claimed, file, &destination)?;
            entries.insert(file.clone(), destination);
        }

        let table = RemapTable::from_parts(entries, mappings);
        tracing::debug!(
            files = table.len(),
            sequence_groups = table.sequences().len(),
            dest_root = %dest_root.display(),
            plan_id = %table.fingerprint(),
            "planned remap"
        );
        Ok(table)
    }
}

/// Record that `source` owns `destination`, failing if another source
/// already does.
fn claim(
    claimed: &mut BTreeMap<PathBuf, PathBuf>,
    source: &Path,
    destination: &Path,
) -> Result<()> {
    match claimed.get(destination) {
        Some(owner) if owner.as_path() != source => {
            let (first, second) = if owner.as_path() < source {
                (owner.clone(), source.to_path_buf())
            } else {
                (source.to_path_buf(), owner.clone())
            };
            Err(GatherError::Collision {
                first,
                second,
                destination: destination.to_path_buf(),
            })
        }
        _ => {
            claimed.insert(destination.to_path_buf(), source.to_path_buf());
            Ok(())
        }
    }
}
