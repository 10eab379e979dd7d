/// File discovery shared by the index and composite pipelines
use super::ReaderError;
use std::fs;
use std::path::{Path, PathBuf};

/// Open NetCDF file and validate it exists
pub fn open_netcdf_file(path: &Path) -> Result<netcdf::File, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::FileNotFound(path.to_string_lossy().to_string()));
    }
    Ok(netcdf::open(path)?)
}

/// Sorted file names in `dir` for which `accept` returns true
fn matching_files(dir: &Path, accept: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, ReaderError> {
    if !dir.is_dir() {
        return Err(ReaderError::FileNotFound(dir.to_string_lossy().to_string()));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let accepted = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, &accept);
        if accepted && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `name` is `<prefix><model>` followed by `_` or `.` and ends in `.nc`
fn is_model_file(name: &str, prefix: &str, model: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(model))
    else {
        return false;
    };
    (rest.starts_with('_') || rest.starts_with('.')) && name.ends_with(".nc")
}

/// Realization files `ts_Amon_<model>_*.nc` of one model, sorted by name
pub fn realization_files(model_dir: &Path, model: &str) -> Result<Vec<PathBuf>, ReaderError> {
    let files = matching_files(model_dir, |name| is_model_file(name, "ts_Amon_", model))?;
    if files.is_empty() {
        return Err(ReaderError::NoRealizations {
            model: model.to_string(),
            dir: model_dir.display().to_string(),
        });
    }
    log::debug!("Found {} realization files for {}", files.len(), model);
    Ok(files)
}

/// First `sftlf_fx_<model>_*.nc` file of one model
pub fn land_mask_file(model_dir: &Path, model: &str) -> Result<PathBuf, ReaderError> {
    let missing = || ReaderError::MissingLandMask {
        model: model.to_string(),
        dir: model_dir.display().to_string(),
    };
    if !model_dir.is_dir() {
        return Err(missing());
    }
    matching_files(model_dir, |name| is_model_file(name, "sftlf_fx_", model))?
        .into_iter()
        .next()
        .ok_or_else(missing)
}
