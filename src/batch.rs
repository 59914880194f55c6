use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::files;
use crate::parser::error::RepairError;
use crate::parser::{self, RepairOptions, Repaired, Warning};

const CHUNK_SIZE: usize = 64;
pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;

pub struct BatchConfig {
    pub out_dir: PathBuf,
    /// Per-document budget, checked before the document is read.
    pub max_bytes: usize,
    pub dry_run: bool,
    pub options: RepairOptions,
}

/// Outcome for one input file, as printed and written to the run report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    /// A file from an earlier run was replaced.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub overwritten: bool,
    pub waypoints: usize,
    pub routes: usize,
    pub tracks: usize,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn repaired(source: &Path, repaired: &Repaired, output: Option<String>) -> Self {
        FileReport {
            source: source.display().to_string(),
            status: "repaired",
            name: Some(repaired.name.clone()),
            output,
            mode: Some(repaired.mode.as_str()),
            overwritten: false,
            waypoints: repaired.waypoints,
            routes: repaired.routes,
            tracks: repaired.tracks,
            warnings: repaired.warnings.clone(),
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(source: &Path, err: &RepairError) -> Self {
        FileReport {
            source: source.display().to_string(),
            status: "failed",
            name: None,
            output: None,
            mode: None,
            overwritten: false,
            waypoints: 0,
            routes: 0,
            tracks: 0,
            warnings: Vec::new(),
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub repaired: usize,
    pub salvaged: usize,
    pub failed: usize,
}

/// Repair every file in parallel. Each document is isolated: its failure,
/// including a panic, only marks that document as failed.
pub fn run(paths: &[PathBuf], config: &BatchConfig) -> Result<(Vec<FileReport>, BatchStats)> {
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut reports = Vec::with_capacity(paths.len());
    let mut stats = BatchStats {
        total: paths.len(),
        ..Default::default()
    };
    let mut taken = HashSet::new();

    for chunk in paths.chunks(CHUNK_SIZE) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|path| (path, repair_isolated(path, config)))
            .collect();

        // Outputs are written from this thread so name collisions resolve
        // in input order.
        for (path, result) in results {
            let report = match result {
                Ok(repaired) => {
                    for w in &repaired.warnings {
                        warn!("{}: {}", path.display(), w);
                    }
                    let filename = files::claim_filename(&repaired.filename, &mut taken);
                    let overwritten =
                        !config.dry_run && files::output_exists(&config.out_dir, &filename);
                    if overwritten {
                        warn!(
                            "{}: replacing existing {}",
                            path.display(),
                            config.out_dir.join(&filename).display()
                        );
                    }
                    if !config.dry_run {
                        files::write_output(&config.out_dir, &filename, &repaired.document)?;
                    }
                    stats.repaired += 1;
                    if repaired.warnings.contains(&Warning::SalvageMode) {
                        stats.salvaged += 1;
                    }
                    let mut report = FileReport::repaired(path, &repaired, Some(filename));
                    report.overwritten = overwritten;
                    report
                }
                Err(err) => {
                    warn!(file = err.filename(), "{}", err);
                    stats.failed += 1;
                    FileReport::failed(path, &err)
                }
            };
            reports.push(report);
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        "Processed {} files ({} repaired, {} salvaged, {} failed)",
        stats.total, stats.repaired, stats.salvaged, stats.failed
    );
    Ok((reports, stats))
}

/// Repair one file without writing it, behind the same budget and panic
/// isolation as a batch run.
pub fn inspect(path: &Path, config: &BatchConfig) -> (FileReport, Option<Repaired>) {
    match repair_isolated(path, config) {
        Ok(repaired) => {
            let report = FileReport::repaired(path, &repaired, Some(repaired.filename.clone()));
            (report, Some(repaired))
        }
        Err(err) => (FileReport::failed(path, &err), None),
    }
}

/// Read, budget-check and repair one file, converting any panic into a
/// per-document failure.
pub fn repair_isolated(path: &Path, config: &BatchConfig) -> Result<Repaired, RepairError> {
    let filename = files::display_name(path);
    match panic::catch_unwind(AssertUnwindSafe(|| repair_file(path, &filename, config))) {
        Ok(result) => result,
        Err(payload) => Err(RepairError::Unexpected {
            filename,
            reason: panic_message(&*payload),
        }),
    }
}

fn repair_file(path: &Path, filename: &str, config: &BatchConfig) -> Result<Repaired, RepairError> {
    let unexpected = |e: anyhow::Error| RepairError::Unexpected {
        filename: filename.to_string(),
        reason: format!("{e:#}"),
    };

    let size = files::file_size(path).map_err(unexpected)? as usize;
    if size > config.max_bytes {
        return Err(RepairError::TooLarge {
            filename: filename.to_string(),
            size,
            limit: config.max_bytes,
        });
    }

    let doc = files::read_document(path).map_err(unexpected)?;
    parser::process(&doc, &config.options)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
