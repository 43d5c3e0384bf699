//! # scene-gather
//!
//! Resolve, relocate and republish everything a scene document depends on.
//!
//! Given a root project document, the crate answers one question:
//!
//! > Which files does this document need, and where should they live so a
//! > copy of the project is self-contained?
//!
//! ## Pipeline
//!
//! ```text
//! ReferenceScanner → DependencyResolver → RemapPlanner → Gatherer::copy
//!                                                             ↓
//!                        PublishOrchestrator ← DocumentRewriter
//!                               ↓
//!                     Librarian (naming + store)
//! ```
//!
//! ## Guarantees
//!
//! - Scanning never fails on references to missing files; they are dropped
//! - Each document is walked at most once, so cyclic graphs terminate
//! - The remap plan is collision-checked before the first byte is copied
//! - Documents are rewritten only after every copy succeeded, through a
//!   temporary sibling file

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod config;
pub mod error;
pub mod scanner;
pub mod resolver;
pub mod gather;
pub mod rewriter;
pub mod librarian;
pub mod host;
pub mod publish;
pub mod manifest;

/// Default document extension (without the dot).
pub const DEFAULT_DOCUMENT_EXTENSION: &str = "project";

/// Default document-relative placeholder.
pub const DEFAULT_PLACEHOLDER: &str = "$PDIR";

/// Schema version stamped on gather manifests.
pub const GATHER_SCHEMA_VERSION: &str = "1.0.0";

// Re-exports
pub use types::{
    DocumentFormat, Reference, ScanStrategy, SequencePattern, SequenceGroup, SequenceMatcher,
    RemapTable, SequenceMapping,
};
pub use config::{GatherConfig, DestinationLayout, ScratchPolicy};
pub use error::{GatherError, ErrorCode, CopyFailure, CopyFailures, Result};
pub use scanner::{ReferenceScanner, ScanResult};
pub use resolver::{DependencyResolver, DependencySet};
pub use gather::{
    gather_project, CopiedFile, CopyReport, CullSpec, GatherOptions, GatherPipeline, Gatherer,
    RemapPlanner,
};
pub use rewriter::{DocumentRewriter, RewriteMap, RewriteSummary, RewriteTarget};
pub use librarian::{Librarian, LibrarianError, LocalLibrarian, StoreRequest};
pub use host::{HostError, HostScene, ProjectFileHost};
pub use publish::{
    BatchOutcome, NameReport, PublishOrchestrator, PublishReceipt, PublishState, UnitGather,
};
pub use manifest::{GatherManifest, GatherStats};
