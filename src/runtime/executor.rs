//! One benchmark trial: setup, monitored transfer, verification.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::runtime::profiler::{Profiler, analyze};
use crate::runtime::sampler::{ResourceSampler, SamplerHandle};
use crate::runtime::subprocess::{ProcessOptions, ProcessOutcome, run_captured, truncate_chars};
use crate::runtime::timeline::{Phase, PhaseTimeline};
use crate::{
    BenchResult, Config, FileMatchRecord, FileReconciler, Manifest, RunMetrics,
    ToolContext, ToolSpec, extract_archives, recreate_dir,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const OUTPUT_PREVIEW_CHARS: usize = 500;
const PROFILE_DUMP_FRAMES: usize = 20;

pub struct RunExecutor<'a> {
    config: &'a Config,
    profiler: Profiler,
    reconciler: FileReconciler,
}

impl<'a> RunExecutor<'a> {
    /// `profiler` only sees spans if its layer is installed in the active subscriber.
    pub fn new(config: &'a Config, profiler: Profiler) -> Self {
        Self {
            config,
            profiler,
            reconciler: FileReconciler::new(config.matching),
        }
    }

    /// Runs one trial. Never fails: every error ends up in the returned record.
    pub fn run(&self, tool: &ToolSpec, run_number: u32, manifest_path: &Path) -> RunMetrics {
        let mut timeline = PhaseTimeline::start();
        tracing::info!(
            "starting {} run {run_number} ({} workers)",
            tool.name,
            tool.workers
        );

        let manifest = match Manifest::load(manifest_path) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::error!("{} run {run_number} aborted: {err}", tool.name);
                return RunMetrics::failed(
                    &tool.name,
                    run_number,
                    tool.workers,
                    0,
                    timeline.timings(),
                    err.to_string(),
                );
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_trial(tool, run_number, &manifest, &mut timeline)
        }));
        let error = match result {
            Ok(Ok(metrics)) => return metrics,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        if self.profiler.is_enabled() {
            self.profiler.disable();
        }
        tracing::error!("{} run {run_number} failed: {error}", tool.name);
        RunMetrics::failed(
            &tool.name,
            run_number,
            tool.workers,
            manifest.len(),
            timeline.timings(),
            error,
        )
    }

    fn run_trial(
        &self,
        tool: &ToolSpec,
        run_number: u32,
        manifest: &Manifest,
        timeline: &mut PhaseTimeline,
    ) -> BenchResult<RunMetrics> {
        timeline.begin(Phase::Setup);
        let dest = self.config.tool_download_dir(tool);
        recreate_dir(&dest)?;
        let ctx = ToolContext {
            manifest: manifest.path(),
            download_dir: &dest,
            credentials: &self.config.credentials_path,
            endpoint: &self.config.endpoint,
        };
        self.configure(tool, &ctx);
        let args = tool.command_args(&ctx);
        tracing::info!("executing: {} {}", tool.program, args.join(" "));

        let sampler = self
            .config
            .enable_monitoring
            .then(|| ResourceSampler::start(self.config.monitoring_interval()));
        if self.config.enable_profiling {
            self.profiler.enable();
        }
        // Transfer time is the tool's own wall clock; sampler and profiler upkeep stay outside it.
        timeline.begin(Phase::Transfer);
        let launched = run_captured(
            &tool.program,
            &args,
            ProcessOptions {
                working_dir: tool.working_dir.as_deref(),
                env: Some(&tool.env),
                timeout: self.config.transfer_timeout(),
            },
        );
        timeline.begin(Phase::Verification);
        let resources = sampler.map(SamplerHandle::stop).unwrap_or_default();
        let profile = self
            .config
            .enable_profiling
            .then(|| self.profiler.disable());
        let outcome = launched?;
        tracing::debug!(
            "{} run {run_number} process wall clock {:?}",
            tool.name,
            outcome.elapsed
        );

        let mut error_details = Vec::new();
        self.inspect_outcome(tool, run_number, &outcome, &mut error_details);

        if tool.compressed_output && self.config.auto_extract_archives {
            extract_archives(&dest)?;
        }
        let file_details = self.reconciler.reconcile(&dest, manifest.entries());
        timeline.finish();

        let timings = timeline.timings();
        let total_files = manifest.len();
        let successful_downloads = file_details.iter().filter(|d| d.is_matched()).count();
        let total_size_mb = matched_bytes(&dest, &file_details) as f64 / BYTES_PER_MB;
        let (throughput_mbps, files_per_second) = if timings.transfer_secs > 0.0 {
            (
                total_size_mb / timings.transfer_secs,
                successful_downloads as f64 / timings.transfer_secs,
            )
        } else {
            (0.0, 0.0)
        };
        let success_rate = if total_files == 0 {
            0.0
        } else {
            successful_downloads as f64 / total_files as f64 * 100.0
        };

        let (profiling_stats, profiling_analysis) = match profile {
            Some(report) if !report.is_empty() => {
                let analysis = analyze(&report, &tool.name, run_number);
                tracing::info!("{analysis}");
                (Some(report.render(PROFILE_DUMP_FRAMES)), Some(analysis))
            }
            _ => (None, None),
        };

        tracing::debug!("{} run {run_number} phases: {:?}", tool.name, timeline.entries());
        tracing::info!(
            "{} run {run_number}: {successful_downloads}/{total_files} files, {success_rate:.1}% success, {throughput_mbps:.2} MB/s, {:.1}s",
            tool.name,
            timings.transfer_secs
        );

        Ok(RunMetrics {
            tool_name: tool.name.clone(),
            run_number,
            workers: tool.workers,
            total_files,
            successful_downloads,
            success_rate,
            timings,
            total_size_mb,
            throughput_mbps,
            files_per_second,
            resources,
            return_code: outcome.return_code,
            error_details,
            file_details,
            profiling_stats,
            profiling_analysis,
        })
    }

    /// Optional credential/profile step. Failure is logged and the trial continues.
    fn configure(&self, tool: &ToolSpec, ctx: &ToolContext<'_>) {
        let Some(command) = tool.configure_command(ctx) else {
            return;
        };
        let Some((program, args)) = command.split_first() else {
            return;
        };
        tracing::info!("configuring {}", tool.name);
        let opts = ProcessOptions {
            working_dir: tool.working_dir.as_deref(),
            env: Some(&tool.env),
            timeout: Some(self.config.configure_timeout()),
        };
        match run_captured(program, args, opts) {
            Ok(out) if out.success() => tracing::info!("{} configured", tool.name),
            Ok(out) => tracing::warn!(
                "{} configuration returned code {}: {}",
                tool.name,
                out.return_code,
                truncate_chars(out.stderr.trim(), OUTPUT_PREVIEW_CHARS)
            ),
            Err(err) => tracing::warn!("{} configuration failed: {err}", tool.name),
        }
    }

    fn inspect_outcome(
        &self,
        tool: &ToolSpec,
        run_number: u32,
        outcome: &ProcessOutcome,
        error_details: &mut Vec<String>,
    ) {
        if outcome.timed_out {
            let msg = format!(
                "transfer exceeded {}s and was killed",
                self.config.transfer_timeout_secs.unwrap_or_default()
            );
            tracing::warn!("{} run {run_number}: {msg}", tool.name);
            error_details.push(msg);
        }
        if outcome.return_code != 0 || !outcome.stderr.trim().is_empty() {
            tracing::warn!(
                "{} run {run_number} had issues: return_code={}, stderr='{}'",
                tool.name,
                outcome.return_code,
                truncate_chars(outcome.stderr.trim(), OUTPUT_PREVIEW_CHARS)
            );
        }
        if outcome.stdout.contains("Failed") {
            tracing::warn!(
                "{} run {run_number} stdout indicates failures: '{}'",
                tool.name,
                truncate_chars(outcome.stdout.trim(), OUTPUT_PREVIEW_CHARS)
            );
        }
    }
}

/// Bytes of matched files; a record without a recorded size is re-read from disk.
fn matched_bytes(dest: &Path, records: &[FileMatchRecord]) -> u64 {
    records
        .iter()
        .filter(|r| r.is_matched())
        .map(|r| {
            if r.actual_size > 0 {
                return r.actual_size;
            }
            let path: PathBuf = dest.join(&r.actual_path);
            std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
        })
        .sum()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return format!("trial panicked: {s}");
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return format!("trial panicked: {s}");
    }
    "trial panicked".to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::MatchType;
    use crate::platform::testutil::ScratchDir;
    use std::collections::BTreeMap;
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt as _;

    fn workspace(name: &str) -> ScratchDir {
        ScratchDir::new(&format!("exec-{name}"))
    }

    fn config_in(root: &Path) -> Config {
        Config {
            results_dir: root.join("results"),
            download_dir: root.join("downloads"),
            monitoring_interval_ms: 20,
            ..Config::default()
        }
    }

    fn fake_tool(script: &str) -> ToolSpec {
        ToolSpec {
            key: "fake".to_string(),
            name: "Fake Tool".to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "fake".to_string(), "{download_dir}".to_string()],
            configure: None,
            workers: 2,
            compressed_output: false,
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    fn write_manifest(root: &Path) -> PathBuf {
        let path = root.join("manifest.json");
        std::fs::write(
            &path,
            br#"[{"object_id":"ns/abc123","file_name":"result.txt","file_size":10}]"#,
        )
        .expect("write manifest");
        path
    }

    #[test]
    fn downloaded_guid_file_counts_as_success() {
        let root = workspace("ok");
        let config = config_in(&root);
        let manifest = write_manifest(&root);
        let tool = fake_tool("printf 0123456789 > \"$1/abc123\"; sleep 0.1");
        let metrics = RunExecutor::new(&config, Profiler::new()).run(&tool, 1, &manifest);

        assert_eq!(metrics.return_code, 0);
        assert_eq!(metrics.total_files, 1);
        assert_eq!(metrics.successful_downloads, 1);
        assert_eq!(metrics.success_rate, 100.0);
        assert_eq!(metrics.file_details[0].match_type, MatchType::ExactGuidMatch);
        assert!(metrics.total_size_mb > 0.0);
        assert!(metrics.throughput_mbps > 0.0);
        assert!(metrics.timings.transfer_secs > 0.0);
        assert!(metrics.error_details.is_empty());
    }

    #[test]
    fn non_zero_exit_still_produces_complete_record() {
        let root = workspace("exit");
        let config = config_in(&root);
        let manifest = write_manifest(&root);
        let tool = fake_tool("echo Failed to fetch >&1; echo boom >&2; exit 7");
        let metrics = RunExecutor::new(&config, Profiler::new()).run(&tool, 2, &manifest);

        assert_eq!(metrics.return_code, 7);
        assert_eq!(metrics.run_number, 2);
        assert_eq!(metrics.file_details.len(), 1);
        assert_eq!(metrics.file_details[0].actual_path, crate::NOT_FOUND);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.throughput_mbps, 0.0);
        assert!(metrics.total_size_mb.is_finite());
    }

    #[test]
    fn unreadable_manifest_fails_before_launch() {
        let root = workspace("manifest");
        let config = config_in(&root);
        let marker = root.join("launched");
        let tool = fake_tool(&format!("touch {}", marker.display()));
        let metrics =
            RunExecutor::new(&config, Profiler::new()).run(&tool, 1, &root.join("missing.json"));

        assert_eq!(metrics.return_code, -1);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.error_details.len(), 1);
        assert!(!marker.exists());
        assert!(!config.tool_download_dir(&tool).exists());
    }

    #[test]
    fn missing_program_becomes_failed_record() {
        let root = workspace("launch");
        let config = config_in(&root);
        let manifest = write_manifest(&root);
        let mut tool = fake_tool("");
        tool.program = "dlbench-no-such-binary".to_string();
        let metrics = RunExecutor::new(&config, Profiler::new()).run(&tool, 1, &manifest);

        assert_eq!(metrics.return_code, -1);
        assert_eq!(metrics.total_files, 1);
        assert!(metrics.error_details[0].contains("dlbench-no-such-binary"));
    }

    #[test]
    fn destination_is_wiped_between_trials() {
        let root = workspace("wipe");
        let config = config_in(&root);
        let manifest = write_manifest(&root);
        let executor = RunExecutor::new(&config, Profiler::new());

        let first = executor.run(&fake_tool("printf 0123456789 > \"$1/abc123\""), 1, &manifest);
        assert_eq!(first.successful_downloads, 1);
        let second = executor.run(&fake_tool("true"), 2, &manifest);
        assert_eq!(second.successful_downloads, 0);
    }

    #[test]
    fn timeout_is_recorded_in_error_details() {
        let root = workspace("timeout");
        let config = Config {
            transfer_timeout_secs: Some(1),
            enable_monitoring: false,
            ..config_in(&root)
        };
        let manifest = write_manifest(&root);
        let metrics =
            RunExecutor::new(&config, Profiler::new()).run(&fake_tool("sleep 10; true"), 1, &manifest);
        assert_eq!(metrics.return_code, -1);
        assert!(metrics.error_details.iter().any(|e| e.contains("killed")));
        assert_eq!(metrics.file_details.len(), 1);
        assert!(metrics.timings.total_secs < 5.0, "{:?}", metrics.timings);
    }

    #[test]
    fn transfer_time_covers_only_the_tool_process() {
        let root = workspace("transfer");
        let config = config_in(&root);
        let manifest = write_manifest(&root);
        let metrics =
            RunExecutor::new(&config, Profiler::new()).run(&fake_tool("sleep 0.3"), 1, &manifest);
        let t = metrics.timings;
        assert!(t.transfer_secs >= 0.3, "{t:?}");
        assert!(t.transfer_secs < 1.5, "{t:?}");
        assert!(t.setup_secs + t.transfer_secs + t.verification_secs <= t.total_secs + 1e-3);
    }

    #[test]
    fn profiling_brackets_the_tool_process() {
        let root = workspace("profile");
        let config = Config {
            transfer_timeout_secs: Some(30),
            ..config_in(&root)
        };
        let manifest = write_manifest(&root);
        let profiler = Profiler::new();
        let subscriber = Registry::default().with(profiler.layer());
        let tool = fake_tool("sleep 0.2");
        let metrics = tracing::subscriber::with_default(subscriber, || {
            RunExecutor::new(&config, profiler.clone()).run(&tool, 1, &manifest)
        });

        assert!(!profiler.is_enabled());
        let analysis = metrics.profiling_analysis.expect("profiling analysis");
        assert!(analysis.contains("Fake Tool Profiling (Run 1)"));
        assert!(analysis.contains("subprocess.wait"));
        assert!(analysis.contains("calls/second"));
        let stats = metrics.profiling_stats.expect("profiling stats");
        assert!(stats.contains("subprocess.spawn"));
        assert!(stats.contains("sampler.stop"));
    }

    #[test]
    fn disabled_profiling_leaves_no_analysis() {
        let root = workspace("no-profile");
        let config = Config {
            enable_profiling: false,
            ..config_in(&root)
        };
        let manifest = write_manifest(&root);
        let profiler = Profiler::new();
        let subscriber = Registry::default().with(profiler.layer());
        let tool = fake_tool("true");
        let metrics = tracing::subscriber::with_default(subscriber, || {
            RunExecutor::new(&config, profiler.clone()).run(&tool, 1, &manifest)
        });
        assert!(metrics.profiling_stats.is_none());
        assert!(metrics.profiling_analysis.is_none());
    }
}
