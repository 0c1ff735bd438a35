//! Download manifest parsing.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{BenchError, BenchResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// `"namespace/guid"` or a bare GUID.
    pub object_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
}

impl ManifestEntry {
    /// The suffix after the last `/` of the object id.
    pub fn guid(&self) -> &str {
        self.object_id
            .rsplit('/')
            .next()
            .unwrap_or(self.object_id.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> BenchResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            BenchError::Manifest(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        let entries: Vec<ManifestEntry> = serde_json::from_slice(&bytes).map_err(|e| {
            BenchError::Manifest(format!("cannot parse manifest {}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.file_size).sum()
    }

    pub fn inspect(&self) -> ManifestInspection {
        let mut seen = BTreeSet::new();
        let mut duplicate_guids = BTreeSet::new();
        let mut missing_guid = 0usize;
        for entry in &self.entries {
            let guid = entry.guid();
            if guid.is_empty() {
                missing_guid += 1;
                continue;
            }
            if !seen.insert(guid.to_ascii_lowercase()) {
                duplicate_guids.insert(guid.to_string());
            }
        }
        ManifestInspection {
            path: self.path.to_string_lossy().into_owned(),
            entries: self.entries.len(),
            total_bytes: self.total_bytes(),
            total_mb: self.total_bytes() as f64 / (1024.0 * 1024.0),
            missing_guid,
            duplicate_guids: duplicate_guids.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestInspection {
    pub path: String,
    pub entries: usize,
    pub total_bytes: u64,
    pub total_mb: f64,
    pub missing_guid: usize,
    pub duplicate_guids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testutil::ScratchDir;

    fn entry(object_id: &str, file_name: &str, file_size: u64) -> ManifestEntry {
        ManifestEntry {
            object_id: object_id.to_string(),
            file_name: file_name.to_string(),
            file_size,
        }
    }

    #[test]
    fn guid_is_suffix_after_last_slash() {
        assert_eq!(entry("dg.MD1R/abc123", "", 0).guid(), "abc123");
        assert_eq!(entry("a/b/c", "", 0).guid(), "c");
        assert_eq!(entry("bare-guid", "", 0).guid(), "bare-guid");
        assert_eq!(entry("ns/", "", 0).guid(), "");
    }

    #[test]
    fn load_ignores_unknown_keys_and_defaults_missing_fields() {
        let scratch = ScratchDir::new("manifest");
        let path = scratch.join("manifest.json");
        std::fs::write(
            &path,
            br#"[{"object_id":"ns/g1","file_name":"a.dcm","file_size":10,"md5sum":"x"},{"object_id":"g2"}]"#,
        )
        .expect("write manifest");
        let manifest = Manifest::load(&path).expect("load");
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries()[1].file_name, "");
        assert_eq!(manifest.total_bytes(), 10);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let scratch = ScratchDir::new("manifest-bad");
        let path = scratch.join("bad.json");
        std::fs::write(&path, b"{not json").expect("write manifest");
        let err = Manifest::load(&path).expect_err("malformed");
        assert!(matches!(err, BenchError::Manifest(_)));
    }

    #[test]
    fn inspect_reports_duplicates_and_missing_guids() {
        let manifest = Manifest {
            path: PathBuf::from("m.json"),
            entries: vec![
                entry("ns/AAA", "a", 1),
                entry("other/aaa", "b", 2),
                entry("ns/", "c", 3),
            ],
        };
        let report = manifest.inspect();
        assert_eq!(report.entries, 3);
        assert_eq!(report.total_bytes, 6);
        assert_eq!(report.missing_guid, 1);
        assert_eq!(report.duplicate_guids, vec!["aaa".to_string()]);
    }
}
