//! Matching downloaded files back to manifest entries.
//!
//! Rules are tried in a fixed order across every candidate file; the first rule that any
//! candidate satisfies decides the match. Within a rule, plain files are scanned before
//! archives and then in path order, so the outcome never depends on directory iteration order.

use std::path::{Path, PathBuf};

use crate::{is_archive, list_files};
use crate::{FileMatchRecord, ManifestEntry, MatchScoring, MatchType, NOT_FOUND};

#[derive(Debug, Clone, Copy, Default)]
pub struct FileReconciler {
    scoring: MatchScoring,
}

struct Candidate {
    path: PathBuf,
    basename_lower: String,
}

impl FileReconciler {
    pub fn new(scoring: MatchScoring) -> Self {
        Self { scoring }
    }

    /// One record per manifest entry, in manifest order. Never fails.
    pub fn reconcile(&self, dest: &Path, manifest: &[ManifestEntry]) -> Vec<FileMatchRecord> {
        let candidates = collect_candidates(dest);
        tracing::debug!(
            "found {} candidate file(s) under {}",
            candidates.len(),
            dest.display()
        );

        let records: Vec<FileMatchRecord> = manifest
            .iter()
            .map(|entry| self.match_entry(dest, entry, &candidates))
            .collect();

        let matched = records.iter().filter(|r| r.is_matched()).count();
        let verified = records.iter().filter(|r| r.guid_verified).count();
        tracing::info!(
            "matched {matched}/{} files, GUID verified: {verified}/{}",
            manifest.len(),
            manifest.len()
        );
        records
    }

    fn match_entry(
        &self,
        dest: &Path,
        entry: &ManifestEntry,
        candidates: &[Candidate],
    ) -> FileMatchRecord {
        let guid = entry.guid();
        let guid_lower = guid.to_lowercase();
        let filename_lower = entry.file_name.to_lowercase();

        let rules: [(MatchType, u32, &dyn Fn(&Candidate) -> bool); 3] = [
            (MatchType::ExactGuidMatch, self.scoring.exact_guid, &|c: &Candidate| {
                !guid_lower.is_empty() && c.basename_lower == guid_lower
            }),
            (MatchType::GuidInFilename, self.scoring.guid_in_filename, &|c: &Candidate| {
                !guid_lower.is_empty() && c.basename_lower.contains(guid_lower.as_str())
            }),
            (MatchType::ExactFilenameMatch, self.scoring.exact_filename, &|c: &Candidate| {
                !filename_lower.is_empty() && c.basename_lower == filename_lower
            }),
        ];

        let hit = rules.iter().find_map(|(kind, score, rule)| {
            candidates.iter().find(|c| rule(*c)).map(|c| (*kind, *score, c))
        });

        match hit {
            Some((kind, score, candidate)) if score >= self.scoring.min_accept => {
                let record = matched_record(dest, entry, kind, score, &candidate.path);
                tracing::debug!(
                    "matched {} -> {} ({}, score={score})",
                    entry.object_id,
                    record.actual_path,
                    kind.as_str()
                );
                record
            }
            Some((_, score, _)) => {
                tracing::warn!(
                    "no match for {} (object_id: {}, guid: {guid}): best score {score} below threshold {}",
                    entry.file_name,
                    entry.object_id,
                    self.scoring.min_accept
                );
                unmatched_record(entry, score)
            }
            None => {
                tracing::warn!(
                    "no match for {} (object_id: {}, guid: {guid})",
                    entry.file_name,
                    entry.object_id
                );
                unmatched_record(entry, 0)
            }
        }
    }
}

fn collect_candidates(dest: &Path) -> Vec<Candidate> {
    if !dest.is_dir() {
        tracing::warn!("download directory does not exist: {}", dest.display());
        return Vec::new();
    }
    let files = match list_files(dest) {
        Ok(files) => files,
        Err(err) => {
            tracing::warn!("cannot walk download directory {}: {err}", dest.display());
            return Vec::new();
        }
    };
    if files.is_empty() {
        tracing::warn!("download directory is empty: {}", dest.display());
    }

    let mut candidates: Vec<Candidate> = files
        .into_iter()
        .map(|path| Candidate {
            basename_lower: path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            path,
        })
        .collect();
    candidates.sort_by(|a, b| {
        is_archive(&a.path)
            .cmp(&is_archive(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });
    candidates
}

fn matched_record(
    dest: &Path,
    entry: &ManifestEntry,
    kind: MatchType,
    score: u32,
    path: &Path,
) -> FileMatchRecord {
    let guid = entry.guid();
    let (actual_size, size_match_percent, guid_verified) = match std::fs::metadata(path) {
        Ok(meta) => {
            let actual = meta.len();
            let verified =
                !guid.is_empty() && path.to_string_lossy().to_lowercase().contains(&guid.to_lowercase());
            (actual, size_match_percent(actual, entry.file_size), verified)
        }
        Err(err) => {
            tracing::debug!("cannot stat {}: {err}", path.display());
            (0, 0.0, false)
        }
    };
    FileMatchRecord {
        object_id: entry.object_id.clone(),
        guid: guid.to_string(),
        expected_filename: entry.file_name.clone(),
        actual_path: path
            .strip_prefix(dest)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned(),
        expected_size: entry.file_size,
        actual_size,
        size_match_percent,
        match_score: score,
        match_type: kind,
        guid_verified,
    }
}

fn unmatched_record(entry: &ManifestEntry, score: u32) -> FileMatchRecord {
    FileMatchRecord {
        object_id: entry.object_id.clone(),
        guid: entry.guid().to_string(),
        expected_filename: entry.file_name.clone(),
        actual_path: NOT_FOUND.to_string(),
        expected_size: entry.file_size,
        actual_size: 0,
        size_match_percent: 0.0,
        match_score: score,
        match_type: MatchType::FailedMatch,
        guid_verified: false,
    }
}

/// `min/max * 100`, or 0 when either side is 0.
pub fn size_match_percent(actual: u64, expected: u64) -> f64 {
    if actual == 0 || expected == 0 {
        return 0.0;
    }
    actual.min(expected) as f64 / actual.max(expected) as f64 * 100.0
}
