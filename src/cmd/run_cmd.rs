//! Benchmark session command (`dlbench run ...`).

use clap::Args;

use std::path::PathBuf;

use crate::{BenchError, BenchResult, Config};

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Manifest JSON listing the objects to download.
    #[arg(long, default_value = "test_data/sample_manifest.json")]
    pub manifest: PathBuf,

    /// Trials per tool.
    #[arg(long)]
    pub num_runs: Option<u32>,

    /// Comma-separated tool keys, in execution order (e.g. `cdis,async`).
    #[arg(long, value_delimiter = ',')]
    pub tools: Vec<String>,

    /// Worker override for one tool, `KEY=N`. Repeatable.
    #[arg(long = "workers", value_name = "KEY=N", value_parser = parse_worker_override)]
    pub workers: Vec<(String, u32)>,

    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub credentials: Option<PathBuf>,

    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    #[arg(long)]
    pub disable_profiling: bool,

    #[arg(long)]
    pub disable_monitoring: bool,

    /// Resource sampling period in milliseconds.
    #[arg(long)]
    pub monitoring_interval_ms: Option<u64>,

    /// Kill a tool that runs longer than this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Open the HTML report when the session finishes.
    #[arg(long)]
    pub open: bool,
}

impl RunArgs {
    /// Layers command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut Config) -> BenchResult<()> {
        if let Some(n) = self.num_runs {
            if n == 0 {
                return Err(BenchError::InvalidArgument(
                    "--num-runs must be at least 1".to_string(),
                ));
            }
            config.num_runs = n;
        }
        if !self.tools.is_empty() {
            config.tools = self
                .tools
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        for (key, workers) in &self.workers {
            config.set_workers(key, *workers)?;
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(path) = &self.credentials {
            config.credentials_path = path.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = dir.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if self.disable_profiling {
            config.enable_profiling = false;
        }
        if self.disable_monitoring {
            config.enable_monitoring = false;
        }
        if let Some(ms) = self.monitoring_interval_ms {
            config.monitoring_interval_ms = ms;
        }
        if let Some(secs) = self.timeout_secs {
            config.transfer_timeout_secs = Some(secs);
        }
        if self.open {
            config.open_report = true;
        }
        Ok(())
    }
}

fn parse_worker_override(raw: &str) -> Result<(String, u32), String> {
    let (key, n) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=N, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing tool key in {raw:?}"));
    }
    let n: u32 = n
        .trim()
        .parse()
        .map_err(|e| format!("invalid worker count in {raw:?}: {e}"))?;
    if n == 0 {
        return Err("worker count must be at least 1".to_string());
    }
    Ok((key.to_string(), n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["dlbench"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).expect("parse args").run
    }

    #[test]
    fn overrides_replace_file_values() {
        let args = parse(&[
            "--num-runs",
            "3",
            "--tools",
            "async, cdis",
            "--workers",
            "cdis=8",
            "--disable-profiling",
            "--timeout-secs",
            "600",
        ]);
        let mut config = Config::default();
        args.apply(&mut config).expect("apply");
        assert_eq!(config.num_runs, 3);
        assert_eq!(config.tools, vec!["async", "cdis"]);
        assert_eq!(config.tool_spec("cdis").map(|t| t.workers), Some(8));
        assert!(!config.enable_profiling);
        assert!(config.enable_monitoring);
        assert_eq!(config.transfer_timeout_secs, Some(600));
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let args = parse(&[]);
        assert_eq!(args.manifest, PathBuf::from("test_data/sample_manifest.json"));
        let mut config = Config::default();
        args.apply(&mut config).expect("apply");
        assert_eq!(config.tools, Config::default().tools);
        assert_eq!(config.num_runs, 2);
    }

    #[test]
    fn worker_override_validation() {
        assert_eq!(parse_worker_override("async=50"), Ok(("async".to_string(), 50)));
        assert!(parse_worker_override("async").is_err());
        assert!(parse_worker_override("=4").is_err());
        assert!(parse_worker_override("cdis=0").is_err());
        assert!(parse_worker_override("cdis=x").is_err());
    }

    #[test]
    fn unknown_worker_key_and_zero_runs_are_rejected() {
        let mut config = Config::default();
        assert!(parse(&["--workers", "nope=2"]).apply(&mut config).is_err());
        assert!(parse(&["--num-runs", "0"]).apply(&mut config).is_err());
    }
}
