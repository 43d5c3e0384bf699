//! Error taxonomy for gather and publish operations.
//!
//! Every failure surfaced to callers carries a stable [`ErrorCode`]. Messages
//! are rendered from fixed templates over paths and names, never from
//! internal state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::host::HostError;
use crate::librarian::LibrarianError;
use crate::publish::NameReport;

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Bad path, wrong extension or missing root.
    Precondition,
    /// Unit has live links into other units.
    NotAtomic,
    /// Document is not valid UTF-8 and cannot be rewritten safely.
    InvalidEncoding,
    /// One or more names rejected by the naming policy.
    InvalidName,
    /// Two sources map to one destination.
    DestinationCollision,
    /// Copied bytes did not match the source after a retry.
    CopyIntegrity,
    /// One or more copies failed.
    CopyFailed,
    /// Filesystem error outside of copying.
    Io,
    /// Store collaborator failure.
    Store,
    /// Host collaborator failure.
    Host,
    /// Invalid configuration.
    Config,
}

impl ErrorCode {
    /// Numeric code.
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Precondition => 101,
            Self::NotAtomic => 102,
            Self::InvalidEncoding => 103,
            Self::InvalidName => 201,
            Self::DestinationCollision => 301,
            Self::CopyIntegrity => 302,
            Self::CopyFailed => 303,
            Self::Io => 304,
            Self::Store => 401,
            Self::Host => 402,
            Self::Config => 501,
        }
    }

}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Precondition => "precondition",
            Self::NotAtomic => "not_atomic",
            Self::InvalidEncoding => "invalid_encoding",
            Self::InvalidName => "invalid_name",
            Self::DestinationCollision => "destination_collision",
            Self::CopyIntegrity => "copy_integrity",
            Self::CopyFailed => "copy_failed",
            Self::Io => "io",
            Self::Store => "store",
            Self::Host => "host",
            Self::Config => "config",
        };
        write!(f, "E{}:{}", self.as_u16(), name)
    }
}

/// A single file that could not be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFailure {
    /// Source path.
    pub source: PathBuf,
    /// Planned destination path.
    pub destination: PathBuf,
    /// What went wrong.
    pub reason: String,
    /// True if the copy completed but verification failed twice.
    pub integrity: bool,
}

/// Every failed copy of one gather.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFailures(pub Vec<CopyFailure>);

impl CopyFailures {
    /// Failed copies in attempt order.
    pub fn iter(&self) -> impl Iterator<Item = &CopyFailure> {
        self.0.iter()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Error for a gather that could not copy everything.
    ///
    /// Only verification failures yield [`GatherError::CopyIntegrity`];
    /// any other failure makes the whole set a [`GatherError::CopyFailed`].
    pub fn into_error(self) -> GatherError {
        let integrity_only = !self.0.is_empty() && self.0.iter().all(|f| f.integrity);
        if !integrity_only {
            return GatherError::CopyFailed(self);
        }
        let file = self.0[0].source.clone();
        let destination = self.0[0].destination.clone();
        GatherError::CopyIntegrity {
            file,
            destination,
            failures: self,
        }
    }
}

impl fmt::Display for CopyFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} file(s) failed to copy", self.0.len())?;
        if let Some(first) = self.0.first() {
            write!(f, ", first: {} ({})", first.source.display(), first.reason)?;
        }
        Ok(())
    }
}

/// Error type for gather and publish operations.
#[derive(Debug, thiserror::Error)]
pub enum GatherError {
    /// Input path violates a precondition.
    #[error("Precondition failed for {path}: {reason}")]
    Precondition {
        /// Offending path.
        path: PathBuf,
        /// Which precondition.
        reason: String,
    },

    /// The unit reaches into other live units.
    #[error("Unit '{name}' is not atomic")]
    NotAtomic {
        /// Unit name.
        name: String,
    },

    /// A document could not be decoded as text for rewriting.
    #[error("Document {path} is not valid UTF-8 and was left untouched")]
    InvalidEncoding {
        /// Document path.
        path: PathBuf,
    },

    /// Names rejected by the naming policy, reported together.
    #[error("{} invalid asset name(s): {}", .0.len(), .0.summary())]
    InvalidNames(NameReport),

    /// Two distinct sources would land on the same destination.
    #[error("Destination collision: {first} and {second} both map to {destination}")]
    Collision {
        /// First source (in sorted order).
        first: PathBuf,
        /// Second source.
        second: PathBuf,
        /// Shared destination.
        destination: PathBuf,
    },

    /// Copies could not be verified after one retry.
    #[error("Copy of {file} to {destination} failed verification twice ({} file(s) affected)", .failures.len())]
    CopyIntegrity {
        /// First source that failed.
        file: PathBuf,
        /// Its destination.
        destination: PathBuf,
        /// Every file that failed verification.
        failures: CopyFailures,
    },

    /// Some copies failed; the others completed.
    #[error("{0}")]
    CopyFailed(CopyFailures),

    /// Filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Store collaborator error, surfaced unchanged.
    #[error(transparent)]
    Store(#[from] LibrarianError),

    /// Host collaborator error.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatherError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Precondition { .. } => ErrorCode::Precondition,
            Self::NotAtomic { .. } => ErrorCode::NotAtomic,
            Self::InvalidEncoding { .. } => ErrorCode::InvalidEncoding,
            Self::InvalidNames(_) => ErrorCode::InvalidName,
            Self::Collision { .. } => ErrorCode::DestinationCollision,
            Self::CopyIntegrity { .. } => ErrorCode::CopyIntegrity,
            Self::CopyFailed(_) => ErrorCode::CopyFailed,
            Self::Io { .. } => ErrorCode::Io,
            Self::Store(e) => e.code(),
            Self::Host(_) => ErrorCode::Host,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Build a precondition error.
    pub fn precondition(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Precondition {
            path: path.into(),
            reason: reason.into(),
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

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, GatherError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::Precondition.as_u16(), 101);
        assert_eq!(ErrorCode::DestinationCollision.as_u16(), 301);
        assert_eq!(ErrorCode::Store.to_string(), "E401:store");
    }

    #[test]
    fn test_collision_message() {
        let err = GatherError::Collision {
            first: PathBuf::from("/a/x.png"),
            second: PathBuf::from("/b/x.png"),
            destination: PathBuf::from("/d/png/x.png"),
        };
        assert_eq!(err.code(), ErrorCode::DestinationCollision);
        assert_eq!(
            err.to_string(),
            "Destination collision: /a/x.png and /b/x.png both map to /d/png/x.png"
        );
    }

    fn failure(source: &str, integrity: bool) -> CopyFailure {
        CopyFailure {
            source: PathBuf::from(source),
            destination: PathBuf::from("/d").join(source.trim_start_matches('/')),
            reason: "mismatch".to_string(),
            integrity,
        }
    }

    #[test]
    fn test_integrity_failures_surface_as_copy_integrity() {
        let err = CopyFailures(vec![failure("/a/x.png", true), failure("/a/y.png", true)]).into_error();
        assert_eq!(err.code(), ErrorCode::CopyIntegrity);
        assert!(matches!(
            &err,
            GatherError::CopyIntegrity { file, failures, .. }
                if file == Path::new("/a/x.png") && failures.len() == 2
        ));
        assert_eq!(
            err.to_string(),
            "Copy of /a/x.png to /d/a/x.png failed verification twice (2 file(s) affected)"
        );
    }

    #[test]
    fn test_mixed_failures_surface_as_copy_failed() {
        let err = CopyFailures(vec![failure("/a/x.png", true), failure("/a/y.png", false)]).into_error();
        assert_eq!(err.code(), ErrorCode::CopyFailed);
    }

    #[test]
    fn test_copy_failed_message_names_first_failure() {
        let err = GatherError::CopyFailed(CopyFailures(vec![CopyFailure {
            source: PathBuf::from("/a/x.png"),
            destination: PathBuf::from("/d/x.png"),
            reason: "denied".to_string(),
            integrity: false,
        }]));
        assert_eq!(
            err.to_string(),
            "1 file(s) failed to copy, first: /a/x.png (denied)"
        );
    }
}
