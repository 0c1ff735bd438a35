//! A full benchmark session: every selected tool, `num_runs` trials each, then the report.

use serde::Serialize;

use std::path::Path;

use crate::runtime::executor::RunExecutor;
use crate::runtime::profiler::Profiler;
use crate::{
    BenchError, BenchResult, Config, Manifest, ReportArtifacts, ReportComposer, ResultsDocument,
    SessionState, StatusFile, open_in_viewer,
};

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub document: ResultsDocument,
    pub artifacts: ReportArtifacts,
}

pub struct BenchSession<'a> {
    config: &'a Config,
    profiler: Profiler,
    status: StatusFile,
}

impl<'a> BenchSession<'a> {
    pub fn new(config: &'a Config, profiler: Profiler) -> Self {
        Self {
            config,
            profiler,
            status: StatusFile::new(config.status_path()),
        }
    }

    /// Runs trials sequentially. Individual trial failures never abort the session;
    /// only an invalid selection or a failure to write the report does.
    pub fn run(&self, manifest_path: &Path) -> BenchResult<SessionOutcome> {
        let tools = self.config.selected_tools()?;
        if self.config.num_runs == 0 {
            return Err(BenchError::InvalidArgument(
                "num_runs must be at least 1".to_string(),
            ));
        }
        self.status.update(SessionState::Starting, None, 0.0);
        self.log_settings(manifest_path, &tools);

        let executor = RunExecutor::new(self.config, self.profiler.clone());
        let total = tools.len() * self.config.num_runs as usize;
        let mut metrics = Vec::with_capacity(total);
        for tool in &tools {
            tracing::info!("testing {} with {} runs", tool.name, self.config.num_runs);
            for run in 1..=self.config.num_runs {
                let progress = (metrics.len() + 1) as f64 / total as f64 * 100.0;
                tracing::info!("run {run}/{} for {}", self.config.num_runs, tool.name);
                self.status
                    .update(SessionState::Running, Some(&tool.name), progress);
                let m = executor.run(tool, run, manifest_path);
                tracing::info!(
                    "run {run} completed: {:.1}% success, {:.2} MB/s, {:.1}s",
                    m.success_rate,
                    m.throughput_mbps,
                    m.timings.transfer_secs
                );
                metrics.push(m);
            }
        }

        self.status.update(SessionState::Reporting, None, 95.0);
        let entries = match Manifest::load(manifest_path) {
            Ok(manifest) => manifest.entries().to_vec(),
            Err(err) => {
                tracing::warn!("manifest table omitted from report: {err}");
                Vec::new()
            }
        };
        let document = ResultsDocument::new(self.config, manifest_path, entries, metrics);
        let artifacts = match ReportComposer::new(self.config).write(&document) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                self.status.update(SessionState::Failed, None, 95.0);
                return Err(err);
            }
        };
        if self.config.open_report {
            open_in_viewer(&artifacts.html_report);
        }
        self.status.update(SessionState::Completed, None, 100.0);
        tracing::info!(
            "downloaded files are in {}",
            self.config.download_dir.display()
        );
        Ok(SessionOutcome {
            document,
            artifacts,
        })
    }

    fn log_settings(&self, manifest_path: &Path, tools: &[crate::ToolSpec]) {
        let c = self.config;
        tracing::info!("manifest: {}", manifest_path.display());
        tracing::info!(
            "tools: {}",
            tools
                .iter()
                .map(|t| format!("{} ({} workers)", t.name, t.workers))
                .collect::<Vec<_>>()
                .join(", ")
        );
        tracing::info!("runs per tool: {}", c.num_runs);
        tracing::info!(
            "profiling: {}, monitoring: {} (every {}ms)",
            if c.enable_profiling { "enabled" } else { "disabled" },
            if c.enable_monitoring { "enabled" } else { "disabled" },
            c.monitoring_interval_ms
        );
        tracing::info!("endpoint: {}", c.endpoint);
        tracing::info!("credentials: {}", c.credentials_path.display());
        tracing::info!("download directory: {}", c.download_dir.display());
        tracing::info!("results directory: {}", c.results_dir.display());
    }
}
