use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Error types for accumulator output
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Variable already exists: {0}")]
    DuplicateVariable(String),

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Malformed output file {path}: {reason}")]
    Format { path: String, reason: String },
}

/// What happens when a name being inserted already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Overwrite the existing entry
    #[default]
    Replace,
    /// Keep the existing entry and log a warning
    Skip,
    /// Fail with [`WriteError::DuplicateVariable`]
    Error,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(DuplicatePolicy::Replace),
            "skip" => Ok(DuplicatePolicy::Skip),
            "error" => Ok(DuplicatePolicy::Error),
            other => Err(format!(
                "Invalid duplicate policy: {} (expected replace, skip or error)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Replaced,
    Skipped,
}

/// Outcome of inserting `name` under `policy`
pub(crate) fn resolve_duplicate(
    name: &str,
    exists: bool,
    policy: DuplicatePolicy,
) -> Result<InsertOutcome, WriteError> {
    match (exists, policy) {
        (false, _) => Ok(InsertOutcome::Added),
        (true, DuplicatePolicy::Replace) => {
            log::info!("Replacing existing entry {}", name);
            Ok(InsertOutcome::Replaced)
        }
        (true, DuplicatePolicy::Skip) => {
            log::warn!("Entry {} already present, keeping the existing one", name);
            Ok(InsertOutcome::Skipped)
        }
        (true, DuplicatePolicy::Error) => Err(WriteError::DuplicateVariable(name.to_string())),
    }
}

/// A named-entry store backed by one output file
pub trait Accumulator {
    /// File the store is saved to
    fn path(&self) -> &Path;

    /// Entry names in insertion order
    fn names(&self) -> Vec<String>;

    /// Rewrite the backing file with every entry
    fn save(&self) -> Result<(), WriteError>;

    fn len(&self) -> usize {
        self.names().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }
}

/// Temporary sibling used so a save replaces the target in one rename
pub(crate) fn staging_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
