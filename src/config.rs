//! Gather configuration.
//!
//! One explicit bundle passed into every component. Loadable from JSON,
//! with environment overrides:
//!
//! - `SCENE_GATHER_CONFIG`: path to a JSON configuration file
//! - `SCENE_GATHER_VERIFIED_COPY`: `true`/`false`, overrides `verified_copy`

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GatherError, Result};
use crate::types::{DocumentFormat, SequencePattern};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "SCENE_GATHER_CONFIG";

/// Environment variable overriding `verified_copy`.
pub const VERIFIED_COPY_ENV: &str = "SCENE_GATHER_VERIFIED_COPY";

/// Subdirectory used for files without an extension.
const NO_EXTENSION_SUBDIR: &str = "misc";

/// What happens to a publish scratch directory once the store succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScratchPolicy {
    /// Remove the scratch directory after a successful store.
    DeleteOnSuccess,
    /// Keep it.
    Retain,
}

impl Default for ScratchPolicy {
    fn default() -> Self {
        Self::DeleteOnSuccess
    }
}

/// Maps file extensions to destination subdirectories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationLayout {
    /// Lowercase extension (no dot) to subdirectory name.
    pub subdirs: BTreeMap<String, String>,
}

impl DestinationLayout {
    /// Subdirectory a file with `path`'s extension is gathered into.
    pub fn subdir_for(&self, path: &Path) -> String {
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_lowercase();
                self.subdirs.get(&ext).cloned().unwrap_or(ext)
            }
            None => NO_EXTENSION_SUBDIR.to_string(),
        }
    }
}

/// Complete configuration for scanning, gathering and publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatherConfig {
    /// Document syntax.
    pub format: DocumentFormat,
    /// Sequence/tile tokens.
    pub sequence: SequencePattern,
    /// Destination subdirectory layout.
    pub layout: DestinationLayout,
    /// Verify every copy by checksum.
    pub verified_copy: bool,
    /// Rewrite references relative to each document.
    pub relative_paths: bool,
    /// Scratch cleanup after publishing.
    pub scratch_policy: ScratchPolicy,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            format: DocumentFormat::default(),
            sequence: SequencePattern::default(),
            layout: DestinationLayout::default(),
            verified_copy: false,
            relative_paths: true,
            scratch_policy: ScratchPolicy::default(),
        }
    }
}

impl GatherConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatherError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| GatherError::io(path, e))?;
        Self::from_json_str(&json).map_err(|e| match e {
            GatherError::Config(msg) => {
                GatherError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Defaults, or the file named by `SCENE_GATHER_CONFIG`, with the
    /// `SCENE_GATHER_VERIFIED_COPY` override applied.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => {
                tracing::debug!(path = %path, "loading configuration file");
                Self::from_file(Path::new(&path))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `SCENE_GATHER_VERIFIED_COPY` override, if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(VERIFIED_COPY_ENV) {
            self.verified_copy = parse_bool(&value).ok_or_else(|| {
                GatherError::Config(format!("{} must be true or false, got '{}'", VERIFIED_COPY_ENV, value))
            })?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let format = &self.format;
        if format.extension.is_empty() {
            return Err(GatherError::Config("format.extension must not be empty".into()));
        }
        if format.extension.starts_with('.') {
            return Err(GatherError::Config(
                "format.extension must not start with a dot".into(),
            ));
        }
        if format.placeholder.is_empty() {
            return Err(GatherError::Config("format.placeholder must not be empty".into()));
        }
        if format.footer_marker.trim().is_empty() {
            return Err(GatherError::Config("format.footer_marker must not be empty".into()));
        }
        if self.sequence.udim_token.is_empty() {
            return Err(GatherError::Config("sequence.udim_token must not be empty".into()));
        }
        for (ext, subdir) in &self.layout.subdirs {
            if subdir.is_empty() || subdir.contains(['/', '\\']) || subdir == ".." || subdir == "." {
                return Err(GatherError::Config(format!(
                    "layout.subdirs.{} must be a single directory name, got '{}'",
                    ext, subdir
                )));
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
