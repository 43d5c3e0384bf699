//! Gather pipeline: resolve, plan, cull, copy, rewrite.
//!
//! The remap plan is computed and collision-checked before the first copy.
//! Documents are rewritten only after every pending copy succeeded, so a
//! partial failure never leaves a gathered document pointing at files that
//! were not copied.

pub mod copy;
pub mod plan;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::GatherConfig;
use crate::error::{GatherError, Result};
use crate::librarian::Librarian;
use crate::manifest::GatherManifest;
use crate::resolver::DependencyResolver;
use crate::rewriter::{DocumentRewriter, RewriteMap};
use crate::scanner::ReferenceScanner;
use crate::types::{absolutize, DocumentFormat, RemapTable};

pub use copy::{file_digest, CopiedFile, CopyReport};
pub use plan::RemapPlanner;

/// Copy state over one immutable [`RemapTable`].
///
/// Culling only moves a source out of the pending set; the table itself is
/// never altered.
#[derive(Debug, Clone)]
pub struct Gatherer {
    table: RemapTable,
    pending: BTreeSet<PathBuf>,
    culled: BTreeSet<PathBuf>,
}

impl Gatherer {
    /// Start with every table entry pending.
    pub fn new(table: RemapTable) -> Self {
        let pending = table.iter().map(|(s, _)| s.to_path_buf()).collect();
        Self {
            table,
            pending,
            culled: BTreeSet::new(),
        }
    }

    /// The plan.
    pub fn table(&self) -> &RemapTable {
        &self.table
    }

    /// Sources still to be copied.
    pub fn pending(&self) -> &BTreeSet<PathBuf> {
        &self.pending
    }

    /// Sources removed from the copy set.
    pub fn culled(&self) -> &BTreeSet<PathBuf> {
        &self.culled
    }

    /// Remove one exact source from the copy set. Returns false if it was
    /// not pending.
    pub fn cull(&mut self, source: &Path) -> bool {
        if !self.pending.remove(source) {
            return false;
        }
        self.culled.insert(source.to_path_buf());

        for mapping in self.table.sequences() {
            let members = &mapping.group.members;
            if members.contains(source) && !members.iter().all(|m| self.culled.contains(m)) {
                tracing::warn!(
                    template = %mapping.group.template.display(),
                    culled = %source.display(),
                    "sequence group partially culled"
                );
            }
        }
        true
    }

    /// Cull every pending source the librarian already holds.
    ///
    /// `repos` of `None` checks every repository. Returns the number culled.
    pub fn cull_published(&mut self, librarian: &dyn Librarian, repos: Option<&[String]>) -> usize {
        let published: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|source| librarian.path_is_in_repo(source, repos, repos.is_none()))
            .cloned()
            .collect();
        for source in &published {
            self.cull(source);
        }
        published.len()
    }

    /// Copy every pending source to its destination.
    pub fn copy(&self, verify: bool) -> CopyReport {
        let pairs = self
            .pending
            .iter()
            .filter_map(|source| self.table.get(source).map(|dest| (source.as_path(), dest)));
        copy::copy_all(pairs, verify)
    }

    /// Rewrite targets: pending files point at their destination, culled
    /// files at their existing canonical location.
    ///
    /// A sequence template is pinned to its canonical location only when
    /// every member was culled.
    pub fn rewrite_map(&self) -> RewriteMap {
        let mut map = RewriteMap::new();
        for (source, destination) in self.table.iter() {
            if self.culled.contains(source) {
                map.pin(source, source);
            } else {
                map.relocate(source, destination);
            }
            map.set_origin(destination, source);
        }
        for mapping in self.table.sequences() {
            let template = &mapping.group.template;
            if mapping.group.members.iter().all(|m| self.culled.contains(m)) {
                map.pin(template, template);
            } else {
                map.relocate(template, &mapping.destination_template);
            }
        }
        map
    }
}

/// Store-filtering for a gather.
#[derive(Clone, Copy)]
pub struct CullSpec<'a> {
    /// Librarian consulted for already-published files.
    pub librarian: &'a dyn Librarian,
    /// Repositories to check; `None` checks all of them.
    pub repos: Option<&'a [String]>,
}

/// Per-call gather options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherOptions {
    /// Rewrite references relative to each gathered document.
    pub relative: bool,
    /// Verify every copy by checksum.
    pub verify: bool,
}

impl GatherOptions {
    /// Options taken from the configuration defaults.
    pub fn from_config(config: &GatherConfig) -> Self {
        Self {
            relative: config.relative_paths,
            verify: config.verified_copy,
        }
    }
}

/// Resolves, plans, copies and rewrites one root document.
#[derive(Debug, Clone)]
pub struct GatherPipeline {
    format: DocumentFormat,
    resolver: DependencyResolver,
    planner: RemapPlanner,
    rewriter: DocumentRewriter,
}

impl GatherPipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: &GatherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            format: config.format.clone(),
            resolver: DependencyResolver::new(ReferenceScanner::from_config(config)),
            planner: RemapPlanner::from_config(config),
            rewriter: DocumentRewriter::from_config(config),
        })
    }

    /// The dependency resolver.
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// The document rewriter.
    pub fn rewriter(&self) -> &DocumentRewriter {
        &self.rewriter
    }

    /// Gather `project` and everything it reaches into `dest`.
    ///
    /// `dest` must be an existing directory. When `cull` is given, files
    /// already in the librarian are not copied and gathered documents keep
    /// pointing at their canonical location.
    pub fn gather_project(
        &self,
        project: &Path,
        dest: &Path,
        options: &GatherOptions,
        cull: Option<CullSpec<'_>>,
    ) -> Result<GatherManifest> {
        if !dest.is_dir() {
            return Err(GatherError::precondition(dest, "destination is not an existing directory"));
        }
        let dest = absolutize(dest).map_err(|e| GatherError::io(dest, e))?;

        let deps = self.resolver.resolve_transitive(project)?;
        let table = self
            .planner
            .plan(&deps.all_files(), &deps.sequences, &dest)?;
        let mut gatherer = Gatherer::new(table);

        if let Some(spec) = cull {
            let culled = gatherer.cull_published(spec.librarian, spec.repos);
            tracing::info!(culled, "culled published files");
        }

        tracing::info!(
            root = %deps.root.display(),
            dest = %dest.display(),
            files = gatherer.pending().len(),
            "gathering project"
        );
        let report = gatherer.copy(options.verify);
        if !report.is_complete() {
            return Err(report.failures.into_error());
        }

        let map = gatherer.rewrite_map();
        let mut rewritten = Vec::new();
        for copied in &report.copied {
            if !self.format.is_document(&copied.destination) {
                continue;
            }
            let summary = self
                .rewriter
                .rewrite(&copied.destination, &map, options.relative)?;
            if summary.written {
                rewritten.push(summary.document);
            }
        }

        let manifest = GatherManifest::build(&gatherer, &deps.root, &dest, report.copied, rewritten, options);
        tracing::info!(
            plan_id = %manifest.plan_id,
            copied = manifest.copied.len(),
            culled = manifest.culled.len(),
            "gather complete"
        );
        Ok(manifest)
    }
}

/// Gather with default options taken from `config`.
pub fn gather_project(
    config: &GatherConfig,
    project: &Path,
    dest: &Path,
    librarian: Option<&dyn Librarian>,
) -> Result<GatherManifest> {
    let pipeline = GatherPipeline::new(config)?;
    let cull = librarian.map(|librarian| CullSpec {
        librarian,
        repos: None,
    });
    pipeline.gather_project(project, dest, &GatherOptions::from_config(config), cull)
}
