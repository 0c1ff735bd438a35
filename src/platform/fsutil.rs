//! Small filesystem utilities for download destinations and result artifacts.

use serde::Serialize;

use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{BenchError, BenchResult};

const ARCHIVE_EXTENSION: &str = "zip";
const EXTRACTED_SUFFIX: &str = "_extracted";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub archives: usize,
    pub failed: usize,
    pub extracted_bytes: u64,
}

/// Wipes `path` (if present) and creates it again, empty.
pub fn recreate_dir(path: &Path) -> BenchResult<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Every regular file under `root`, sorted by path.
pub fn list_files(root: &Path) -> BenchResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            BenchError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
        })?;
        if entry.file_type().is_file() {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Sum of file sizes under `root`; unreadable entries count as zero.
pub fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Extracts every `*.zip` under `root` into a sibling `<stem>_extracted/` directory.
///
/// A broken archive is logged and skipped; only a failure to walk `root` is an error.
pub fn extract_archives(root: &Path) -> BenchResult<ExtractionSummary> {
    let mut summary = ExtractionSummary::default();
    if !root.exists() {
        return Ok(summary);
    }
    let archives: Vec<PathBuf> = list_files(root)?
        .into_iter()
        .filter(|p| is_archive(p))
        .collect();
    tracing::info!("extracting {} archive(s) under {}", archives.len(), root.display());

    for archive in archives {
        summary.archives += 1;
        let out_dir = extraction_dir(&archive);
        match extract_zip(&archive, &out_dir) {
            Ok(bytes) => {
                summary.extracted_bytes = summary.extracted_bytes.saturating_add(bytes);
                tracing::debug!("extracted {} ({bytes} bytes)", archive.display());
            }
            Err(err) => {
                summary.failed += 1;
                tracing::warn!("failed to extract {}: {err}", archive.display());
            }
        }
    }

    tracing::info!(
        "extraction complete: {} archive(s), {:.2} MB uncompressed",
        summary.archives,
        summary.extracted_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(summary)
}

fn extraction_dir(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    archive.with_file_name(format!("{stem}{EXTRACTED_SUFFIX}"))
}

fn extract_zip(zip_path: &Path, out_dir: &Path) -> BenchResult<u64> {
    std::fs::create_dir_all(out_dir)?;

    let file = File::open(zip_path)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| BenchError::Zip(format!("invalid zip {}: {e}", zip_path.display())))?;
    let mut total = 0u64;
    for i in 0..zip.len() {
        let mut f = zip.by_index(i)?;
        if f.is_dir() {
            continue;
        }
        let Some(rel) = f.enclosed_name() else {
            tracing::warn!("skipping unsafe entry {:?} in {}", f.name(), zip_path.display());
            continue;
        };
        let out_path = out_dir.join(rel);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes)?;
        total = total.saturating_add(bytes.len() as u64);
        std::fs::write(out_path, bytes)?;
    }
    Ok(total)
}

pub fn write_json(path: &Path, value: &impl Serialize) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

pub fn write_text(path: &Path, value: &str) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, value)?;
    Ok(())
}
