//! Core types for reference resolution and gathering.

pub mod document;
pub mod sequence;
pub mod remap;

pub use document::{
    DocumentFormat, Reference, ScanStrategy,
    normalize_path, relative_path, absolutize,
};
pub use sequence::{SequencePattern, SequenceMatcher, SequenceGroup};
pub use remap::{RemapTable, SequenceMapping};
