//! Naming policy and canonical store collaborator.
//!
//! The pipeline only needs a narrow slice of the asset library: check a
//! name, find where things go, test whether a path is already published,
//! and hand over a gathered payload.

pub mod local;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Error type for librarian operations.
#[derive(Debug, thiserror::Error)]
pub enum LibrarianError {
    /// Name rejected by the naming policy.
    #[error("Invalid name '{name}': {reason}")]
    Naming {
        /// Rejected name.
        name: String,
        /// Why.
        reason: String,
    },

    /// Repository not known to the librarian.
    #[error("Unknown repository '{0}'")]
    UnknownRepo(String),

    /// The store refused or failed the operation.
    #[error("Store failed: {0}")]
    Store(String),

    /// Filesystem error inside the store.
    #[error("Store I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl LibrarianError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Naming { .. } => ErrorCode::InvalidName,
            Self::UnknownRepo(_) | Self::Store(_) => ErrorCode::Store,
            Self::Io { .. } => ErrorCode::Store,
        }
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Payload handed to [`Librarian::store`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Validated asset name.
    pub name: String,
    /// Directory the asset is stored under.
    pub dest_parent: PathBuf,
    /// Gathered directory to store.
    pub source: PathBuf,
    /// Overwrite matching files in an existing asset, keep the rest.
    pub merge: bool,
    /// Verify every stored file by checksum.
    pub verify: bool,
}

/// Naming policy plus canonical store.
///
/// `repo` arguments of `None` mean the default repository.
pub trait Librarian: Send + Sync {
    /// Reject names the policy does not allow.
    fn validate_name(&self, name: &str, repo: Option<&str>) -> Result<(), LibrarianError>;

    /// Token used to find the publish location for a valid name.
    fn extract_token(&self, name: &str, repo: Option<&str>) -> Result<String, LibrarianError>;

    /// Name of the default repository.
    fn default_repo(&self) -> String;

    /// Parent directory for publish scratch gathers.
    fn gather_scratch_location(&self) -> Result<PathBuf, LibrarianError>;

    /// Directory assets with `token` are published under.
    fn publish_location(&self, token: &str, repo: Option<&str>) -> Result<PathBuf, LibrarianError>;

    /// True if `path` lives inside one of `repos`, or inside any repository
    /// when `check_all` is set.
    fn path_is_in_repo(&self, path: &Path, repos: Option<&[String]>, check_all: bool) -> bool;

    /// Store a gathered payload.
    fn store(&self, request: &StoreRequest) -> Result<(), LibrarianError>;
}

pub use local::LocalLibrarian;
