//! Host scene collaborator.
//!
//! The publish flow needs four things from whatever owns the live scene:
//! a unit's name, whether it is atomic, a document export of it, and a way
//! to swap it for a reference once published. [`ProjectFileHost`] provides
//! them for plain document files with no application running.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::GatherConfig;
use crate::resolver::DependencyResolver;
use crate::rewriter::{write_atomic, DocumentRewriter, RewriteMap};
use crate::scanner::ReferenceScanner;
use crate::types::absolutize;

/// Object kind written by [`ProjectFileHost::replace_with_reference`].
pub const REFERENCE_KIND: &str = "ContextReference";

/// Error type for host operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The unit could not be inspected.
    #[error("Cannot inspect unit '{unit}': {reason}")]
    Inspect {
        /// Unit name.
        unit: String,
        /// What went wrong.
        reason: String,
    },

    /// The unit could not be exported to a document.
    #[error("Export of unit '{unit}' failed: {reason}")]
    Export {
        /// Unit name.
        unit: String,
        /// What went wrong.
        reason: String,
    },

    /// The unit could not be replaced by a reference.
    #[error("Replacing unit '{unit}' with a reference failed: {reason}")]
    Replace {
        /// Unit name.
        unit: String,
        /// What went wrong.
        reason: String,
    },
}

/// Capabilities the publish flow needs from the scene host.
pub trait HostScene {
    /// A publishable unit of the scene.
    type Unit;

    /// Asset name of `unit`.
    fn unit_name(&self, unit: &Self::Unit) -> String;

    /// True if `unit` has no live links into other units.
    fn is_atomic(&self, unit: &Self::Unit) -> Result<bool, HostError>;

    /// Write `unit` as a self-contained document inside `dir` and return
    /// its path.
    fn export_unit(&self, unit: &Self::Unit, dir: &Path) -> Result<PathBuf, HostError>;

    /// Replace the live `unit` with a reference to `document`.
    fn replace_with_reference(&self, unit: &Self::Unit, document: &Path) -> Result<(), HostError>;
}

/// Host over document files on disk. A unit is a document path.
#[derive(Debug, Clone)]
pub struct ProjectFileHost {
    scanner: ReferenceScanner,
    resolver: DependencyResolver,
    rewriter: DocumentRewriter,
}

impl ProjectFileHost {
    /// Create a host using the configured document syntax.
    pub fn from_config(config: &GatherConfig) -> Self {
        let scanner = ReferenceScanner::from_config(config);
        Self {
            resolver: DependencyResolver::new(scanner.clone()),
            scanner,
            rewriter: DocumentRewriter::from_config(config),
        }
    }
}

impl HostScene for ProjectFileHost {
    type Unit = PathBuf;

    fn unit_name(&self, unit: &PathBuf) -> String {
        unit.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Atomic when every transitive sub-document lives under the unit's
    /// own directory.
    fn is_atomic(&self, unit: &PathBuf) -> Result<bool, HostError> {
        let inspect = |reason: String| HostError::Inspect {
            unit: self.unit_name(unit),
            reason,
        };
        let deps = self
            .resolver
            .resolve_transitive(unit)
            .map_err(|e| inspect(e.to_string()))?;
        let Some(home) = deps.root.parent() else {
            return Err(inspect("unit has no parent directory".to_string()));
        };

        let outside: Vec<&PathBuf> = deps
            .sub_documents
            .iter()
            .filter(|doc| !doc.starts_with(home))
            .collect();
        for doc in &outside {
            tracing::debug!(
                unit = %deps.root.display(),
                document = %doc.display(),
                "sub-document outside unit"
            );
        }
        Ok(outside.is_empty())
    }

    /// Copy the unit document into `dir` with every resolvable reference
    /// rewritten to its absolute path.
    fn export_unit(&self, unit: &PathBuf, dir: &Path) -> Result<PathBuf, HostError> {
        let export = |reason: String| HostError::Export {
            unit: self.unit_name(unit),
            reason,
        };
        let source = absolutize(unit).map_err(|e| export(e.to_string()))?;
        let scan = self.scanner.scan(&source).map_err(|e| export(e.to_string()))?;
        let Some(file_name) = source.file_name() else {
            return Err(export("unit has no file name".to_string()));
        };

        fs::create_dir_all(dir).map_err(|e| export(e.to_string()))?;
        let exported = absolutize(&dir.join(file_name)).map_err(|e| export(e.to_string()))?;
        fs::copy(&source, &exported).map_err(|e| export(e.to_string()))?;

        let mut map = RewriteMap::new();
        for reference in &scan.references {
            map.pin(&reference.resolved, &reference.resolved);
        }
        map.set_origin(&exported, &source);
        self.rewriter
            .rewrite(&exported, &map, false)
            .map_err(|e| export(e.to_string()))?;

        tracing::debug!(
            unit = %source.display(),
            exported = %exported.display(),
            references = scan.references.len(),
            "exported unit"
        );
        Ok(exported)
    }

    fn replace_with_reference(&self, unit: &PathBuf, document: &Path) -> Result<(), HostError> {
        let name = self.unit_name(unit);
        let stub = format!(
            "{} \"{}\" {{\n    filename \"{}\"\n}}\n",
            REFERENCE_KIND,
            name,
            document.display()
        );
        write_atomic(unit, &stub).map_err(|e| HostError::Replace {
            unit: name.clone(),
            reason: e.to_string(),
        })?;
        tracing::info!(unit = %unit.display(), document = %document.display(), "replaced unit with reference");
        Ok(())
    }
}
