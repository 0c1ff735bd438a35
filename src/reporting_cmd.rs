//! CLI report commands (`dlbench report ...`).

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::{AggregateStats, BenchResult, ResultsDocument, render_html, write_text};

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Re-render the HTML report from a saved `results_*.json`.
    Render {
        #[arg(value_name = "RESULTS_JSON")]
        results: PathBuf,
        /// Output path (defaults to the results path with an `.html` extension).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Recompute per-tool statistics from a saved `results_*.json`.
    Summary {
        #[arg(value_name = "RESULTS_JSON")]
        results: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedReport {
    pub results: String,
    pub html_report: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub session_id: String,
    pub timestamp: String,
    pub trials: usize,
    pub winner: Option<String>,
    pub tools: Vec<AggregateStats>,
}

pub fn report_command(command: &ReportCommand) -> BenchResult<serde_json::Value> {
    match command {
        ReportCommand::Render { results, out } => {
            let doc = ResultsDocument::load(results)?;
            let out = out.clone().unwrap_or_else(|| results.with_extension("html"));
            write_text(&out, &render_html(&doc))?;
            Ok(serde_json::to_value(RenderedReport {
                results: results.to_string_lossy().into_owned(),
                html_report: out.to_string_lossy().into_owned(),
            })?)
        }
        ReportCommand::Summary { results } => {
            let doc = ResultsDocument::load(results)?;
            Ok(serde_json::to_value(summarize(&doc))?)
        }
    }
}

pub fn summarize(doc: &ResultsDocument) -> ReportSummary {
    ReportSummary {
        session_id: doc.session_id.to_string(),
        timestamp: doc.timestamp.clone(),
        trials: doc.metrics.len(),
        winner: doc.winner().map(|(tool, _)| tool.to_string()),
        tools: doc
            .tools()
            .into_iter()
            .filter_map(|t| doc.aggregates.get(t).cloned())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, RunMetrics, PhaseTimings, ReportComposer};
    use crate::platform::testutil::ScratchDir;
    use std::path::Path;

    fn saved_results() -> (ScratchDir, PathBuf) {
        let root = ScratchDir::new("report-cmd");
        let config = Config {
            results_dir: root.to_path_buf(),
            ..Config::default()
        };
        let mut ok = RunMetrics::failed("Alpha", 1, 2, 1, PhaseTimings::default(), String::new());
        ok.success_rate = 100.0;
        ok.successful_downloads = 1;
        ok.throughput_mbps = 4.0;
        ok.error_details.clear();
        let failed = RunMetrics::failed("Beta", 1, 2, 1, PhaseTimings::default(), "boom".to_string());
        let doc = ResultsDocument::new(&config, Path::new("m.json"), Vec::new(), vec![ok, failed]);
        let results = ReportComposer::new(&config)
            .write(&doc)
            .expect("write")
            .results_json;
        (root, results)
    }

    #[test]
    fn summary_recomputes_aggregates() {
        let (_root, results) = saved_results();
        let value = report_command(&ReportCommand::Summary { results }).expect("summary");
        assert_eq!(value["trials"], 2);
        assert_eq!(value["winner"], "Alpha");
        assert_eq!(value["tools"][0]["tool_name"], "Alpha");
        assert_eq!(value["tools"][1]["successful_runs"], 0);
    }

    #[test]
    fn render_writes_html_next_to_results() {
        let (_root, results) = saved_results();
        let value = report_command(&ReportCommand::Render {
            results: results.clone(),
            out: None,
        })
        .expect("render");
        let html = results.with_extension("html");
        let expected = html.to_string_lossy().into_owned();
        assert_eq!(value["html_report"], expected.as_str());
        let body = std::fs::read_to_string(html).expect("read html");
        assert!(body.contains("Alpha"));
    }
}
