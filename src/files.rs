use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::parser::RawDocument;

const GPX_EXTENSION: &str = "gpx";

pub fn is_gpx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(GPX_EXTENSION))
}

/// Expand the given paths into `.gpx` files. Directories are scanned one
/// level deep; other file types are skipped with a warning.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to read input path {}", path.display()))?;

        if meta.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("Failed to list directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_gpx(p))
                .collect();
            found.sort();
            info!("Found {} GPX files in {}", found.len(), path.display());
            files.extend(found);
        } else if is_gpx(path) {
            files.push(path.clone());
        } else {
            warn!("Skipping {}: only .gpx files are accepted", path.display());
        }
    }
    Ok(files)
}

pub fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len())
}

pub fn read_document(path: &Path) -> Result<RawDocument> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(RawDocument::from_bytes(&bytes, &display_name(path)))
}

/// The name a file was "uploaded" under: its final path component.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Pick an output filename not yet used in this run: `name.gpx`, then
/// `name (2).gpx`, `name (3).gpx`, ...
pub fn claim_filename(filename: &str, taken: &mut HashSet<String>) -> String {
    let stem = filename.strip_suffix(".gpx").unwrap_or(filename);
    let mut candidate = filename.to_string();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{stem} ({n}).gpx");
        n += 1;
    }
    candidate
}

/// True when `filename` is already present in `out_dir`, e.g. from an
/// earlier run.
pub fn output_exists(out_dir: &Path, filename: &str) -> bool {
    out_dir.join(filename).is_file()
}

pub fn write_output(out_dir: &Path, filename: &str, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    let path = out_dir.join(filename);
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
    Ok(())
}
