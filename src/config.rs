//! `dlbench.toml` config loading, tool definitions and matching tunables.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BenchError, BenchResult};

pub const DEFAULT_CONFIG_FILE: &str = "dlbench.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Where reports, results JSON, the status file and the run log land.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Parent of the per-tool download destinations.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    #[serde(default = "default_num_runs")]
    pub num_runs: u32,

    #[serde(default = "default_true")]
    pub enable_profiling: bool,

    #[serde(default = "default_true")]
    pub enable_monitoring: bool,

    #[serde(default = "default_monitoring_interval_ms")]
    pub monitoring_interval_ms: u64,

    #[serde(default = "default_true")]
    pub auto_extract_archives: bool,

    #[serde(default)]
    pub open_report: bool,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Kill the tool after this many seconds; unset means wait forever.
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,

    #[serde(default = "default_configure_timeout_secs")]
    pub configure_timeout_secs: u64,

    /// Keys of the tools to benchmark, in execution order.
    #[serde(default = "default_selected_tools")]
    pub tools: Vec<String>,

    #[serde(default = "ToolSpec::presets", rename = "tool")]
    pub tool_specs: Vec<ToolSpec>,

    #[serde(default)]
    pub matching: MatchScoring,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("download_performance_results")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_num_runs() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_monitoring_interval_ms() -> u64 {
    1000
}

fn default_endpoint() -> String {
    "https://data.midrc.org".to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_configure_timeout_secs() -> u64 {
    30
}

fn default_selected_tools() -> Vec<String> {
    vec!["cdis".to_string(), "async".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            download_dir: default_download_dir(),
            num_runs: default_num_runs(),
            enable_profiling: true,
            enable_monitoring: true,
            monitoring_interval_ms: default_monitoring_interval_ms(),
            auto_extract_archives: true,
            open_report: false,
            endpoint: default_endpoint(),
            credentials_path: default_credentials_path(),
            transfer_timeout_secs: None,
            configure_timeout_secs: default_configure_timeout_secs(),
            tools: default_selected_tools(),
            tool_specs: ToolSpec::presets(),
            matching: MatchScoring::default(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn status_path(&self) -> PathBuf {
        self.results_dir.join("test_status.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.results_dir.join("test_run.log")
    }

    /// Destination owned by `tool` for the duration of one trial.
    pub fn tool_download_dir(&self, tool: &ToolSpec) -> PathBuf {
        self.download_dir.join(&tool.key)
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms.max(1))
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_secs.map(Duration::from_secs)
    }

    pub fn configure_timeout(&self) -> Duration {
        Duration::from_secs(self.configure_timeout_secs)
    }

    pub fn tool_spec(&self, key: &str) -> Option<&ToolSpec> {
        self.tool_specs.iter().find(|t| t.key == key)
    }

    /// Resolves `tools` against the known definitions, preserving selection order.
    pub fn selected_tools(&self) -> BenchResult<Vec<ToolSpec>> {
        if self.tools.is_empty() {
            return Err(BenchError::Config("no tools selected".to_string()));
        }
        self.tools
            .iter()
            .map(|key| {
                self.tool_spec(key).cloned().ok_or_else(|| {
                    let known: Vec<&str> = self.tool_specs.iter().map(|t| t.key.as_str()).collect();
                    BenchError::Config(format!(
                        "unknown tool {key:?} (known: {})",
                        known.join(", ")
                    ))
                })
            })
            .collect()
    }

    pub fn set_workers(&mut self, key: &str, workers: u32) -> BenchResult<()> {
        let Some(spec) = self.tool_specs.iter_mut().find(|t| t.key == key) else {
            return Err(BenchError::InvalidArgument(format!(
                "cannot set workers for unknown tool {key:?}"
            )));
        };
        spec.workers = workers;
        Ok(())
    }
}

/// How to invoke one download tool.
///
/// `args` and `configure` are templates; see [`ToolContext`] for the placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub key: String,
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional one-off configuration command (program first) run during setup.
    #[serde(default)]
    pub configure: Option<Vec<String>>,
    pub workers: u32,
    /// Output arrives as archives that must be extracted before reconciliation.
    #[serde(default)]
    pub compressed_output: bool,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolSpec {
    pub fn presets() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                key: "cdis".to_string(),
                name: "CDIS Data Client".to_string(),
                program: "gen3-client".to_string(),
                args: to_strings(&[
                    "download-multiple",
                    "--manifest",
                    "{manifest}",
                    "--numparallel",
                    "{workers}",
                    "--download-path",
                    "{download_dir}",
                    "--no-prompt",
                    "--profile",
                    "midrc",
                ]),
                configure: Some(to_strings(&[
                    "gen3-client",
                    "configure",
                    "--profile=midrc",
                    "--cred={credentials}",
                    "--apiendpoint={endpoint}",
                ])),
                workers: 4,
                compressed_output: true,
                working_dir: None,
                env: BTreeMap::new(),
            },
            ToolSpec {
                key: "async".to_string(),
                name: "Gen3 SDK Async".to_string(),
                program: "python".to_string(),
                args: to_strings(&[
                    "-m",
                    "gen3.cli",
                    "--auth",
                    "{credentials}",
                    "--endpoint",
                    "{endpoint}",
                    "download-multiple-async",
                    "--manifest",
                    "{manifest}",
                    "--download-path",
                    "{download_dir}",
                    "--max-concurrent-requests",
                    "{workers}",
                    "--filename-format",
                    "guid",
                    "--no-prompt",
                ]),
                configure: None,
                workers: 100,
                compressed_output: false,
                working_dir: None,
                env: BTreeMap::new(),
            },
        ]
    }

    pub fn command_args(&self, ctx: &ToolContext<'_>) -> Vec<String> {
        self.args.iter().map(|a| ctx.expand(a, self.workers)).collect()
    }

    pub fn configure_command(&self, ctx: &ToolContext<'_>) -> Option<Vec<String>> {
        self.configure
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| c.iter().map(|a| ctx.expand(a, self.workers)).collect())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Values substituted into tool argument templates.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub manifest: &'a Path,
    pub download_dir: &'a Path,
    pub credentials: &'a Path,
    pub endpoint: &'a str,
}

impl ToolContext<'_> {
    fn expand(&self, template: &str, workers: u32) -> String {
        template
            .replace("{manifest}", &absolute(self.manifest))
            .replace("{download_dir}", &absolute(self.download_dir))
            .replace("{credentials}", &absolute(self.credentials))
            .replace("{endpoint}", self.endpoint)
            .replace("{workers}", &workers.to_string())
    }
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Reconciler scores. A rule only counts as a match when its score reaches `min_accept`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchScoring {
    pub exact_guid: u32,
    pub guid_in_filename: u32,
    pub exact_filename: u32,
    pub min_accept: u32,
}

impl Default for MatchScoring {
    fn default() -> Self {
        Self {
            exact_guid: 100,
            guid_in_filename: 80,
            exact_filename: 60,
            min_accept: 50,
        }
    }
}
