use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::CliError;

pub(crate) const SCRIPT_EXTENSION: &str = "ds";

pub(crate) fn read_source(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::SourceRead {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn read_globals(path: &Path) -> Result<serde_json::Value, CliError> {
    let raw = read_source(path)?;
    serde_json::from_str(&raw).map_err(CliError::GlobalsJson)
}

pub(crate) fn resolve_scripts_dir(scripts_dir: &str) -> Result<PathBuf, CliError> {
    let path = PathBuf::from(scripts_dir);
    if !path.exists() {
        return Err(CliError::SourceNotFound { path });
    }
    if !path.is_dir() {
        return Err(CliError::SourceNotDir { path });
    }
    Ok(path)
}

/// `.ds` files under `scripts_dir` as (relative path, full path), sorted.
/// With a filter only relative paths matching it are kept.
pub(crate) fn collect_scripts(
    scripts_dir: &Path,
    filter: Option<&Regex>,
) -> Result<Vec<(String, PathBuf)>, CliError> {
    let mut scripts = Vec::new();

    for entry in WalkDir::new(scripts_dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SCRIPT_EXTENSION) {
            continue;
        }
        let relative = path
            .strip_prefix(scripts_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        if filter.is_some_and(|filter| !filter.is_match(&relative)) {
            continue;
        }
        scripts.push((relative, path.to_path_buf()));
    }

    if scripts.is_empty() {
        return Err(CliError::SourceEmpty {
            path: scripts_dir.to_path_buf(),
        });
    }
    scripts.sort();
    Ok(scripts)
}
