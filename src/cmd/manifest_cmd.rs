//! Manifest commands (`dlbench manifest ...`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::{
    BenchError, BenchResult, Config, FileMatchRecord, FileReconciler, Manifest, dir_size,
    extract_archives,
};

#[derive(Debug, Subcommand)]
pub enum ManifestCommand {
    /// Entry count, declared size and GUID sanity of a manifest.
    Inspect {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
    /// Match an existing download directory against a manifest without running any tool.
    Check {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        /// Extract `*.zip` archives under DIR before matching.
        #[arg(long)]
        extract: bool,
        /// Include one record per manifest entry in the output.
        #[arg(long)]
        details: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestCheck {
    pub manifest: String,
    pub directory: String,
    pub directory_mb: f64,
    pub total_files: usize,
    pub matched: usize,
    pub guid_verified: usize,
    pub success_rate: f64,
    pub unmatched: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<FileMatchRecord>,
}

pub fn manifest_command(
    config: &Config,
    command: &ManifestCommand,
) -> BenchResult<serde_json::Value> {
    match command {
        ManifestCommand::Inspect { manifest } => {
            let manifest = Manifest::load(manifest)?;
            Ok(serde_json::to_value(manifest.inspect())?)
        }
        ManifestCommand::Check {
            manifest,
            dir,
            extract,
            details,
        } => {
            let manifest = Manifest::load(manifest)?;
            if !dir.is_dir() {
                return Err(BenchError::InvalidArgument(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
            if *extract {
                extract_archives(dir)?;
            }
            let records = FileReconciler::new(config.matching).reconcile(dir, manifest.entries());
            let matched = records.iter().filter(|r| r.is_matched()).count();
            let out = ManifestCheck {
                manifest: manifest.path().to_string_lossy().into_owned(),
                directory: dir.to_string_lossy().into_owned(),
                directory_mb: dir_size(dir) as f64 / (1024.0 * 1024.0),
                total_files: records.len(),
                matched,
                guid_verified: records.iter().filter(|r| r.guid_verified).count(),
                success_rate: if records.is_empty() {
                    0.0
                } else {
                    matched as f64 / records.len() as f64 * 100.0
                },
                unmatched: records
                    .iter()
                    .filter(|r| !r.is_matched())
                    .map(|r| r.object_id.clone())
                    .collect(),
                records: if *details { records } else { Vec::new() },
            };
            Ok(serde_json::to_value(out)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testutil::ScratchDir;

    fn fixture() -> (ScratchDir, PathBuf, PathBuf) {
        let root = ScratchDir::new("manifest-cmd");
        let dir = root.join("downloads");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let manifest = root.join("manifest.json");
        std::fs::write(
            &manifest,
            br#"[{"object_id":"ns/abc123","file_name":"a.dcm","file_size":3},{"object_id":"ns/zzz","file_name":"z.dcm","file_size":3}]"#,
        )
        .expect("write manifest");
        std::fs::write(dir.join("abc123"), b"abc").expect("write file");
        (root, manifest, dir)
    }

    #[test]
    fn check_reports_matched_and_unmatched() {
        let (_root, manifest, dir) = fixture();
        let value = manifest_command(
            &Config::default(),
            &ManifestCommand::Check {
                manifest,
                dir,
                extract: false,
                details: false,
            },
        )
        .expect("check");
        assert_eq!(value["total_files"], 2);
        assert_eq!(value["matched"], 1);
        assert_eq!(value["success_rate"], 50.0);
        assert_eq!(value["unmatched"][0], "ns/zzz");
        assert!(value.get("records").is_none());
    }

    #[test]
    fn inspect_summarizes_manifest() {
        let (_root, manifest, _) = fixture();
        let value = manifest_command(&Config::default(), &ManifestCommand::Inspect { manifest })
            .expect("inspect");
        assert_eq!(value["entries"], 2);
        assert_eq!(value["total_bytes"], 6);
    }

    #[test]
    fn check_rejects_missing_directory() {
        let (_root, manifest, dir) = fixture();
        let err = manifest_command(
            &Config::default(),
            &ManifestCommand::Check {
                manifest,
                dir: dir.join("absent"),
                extract: false,
                details: true,
            },
        )
        .expect_err("missing dir");
        assert!(matches!(err, BenchError::InvalidArgument(_)));
    }
}
