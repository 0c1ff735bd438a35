//! Session artifacts: the JSON results document and the self-contained HTML report.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use uuid::Uuid;

use crate::{
    AggregateStats, BenchError, BenchResult, Config, ManifestEntry, RunMetrics, aggregate_by_tool,
    write_json, write_text,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// `value`, or `default` when it is NaN or infinite.
pub fn safe_value(value: f64, default: f64) -> f64 {
    if value.is_finite() { value } else { default }
}

/// Everything needed to re-render a report without re-running the benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub session_id: Uuid,
    pub timestamp: String,
    pub manifest_path: String,
    #[serde(default)]
    pub manifest: Vec<ManifestEntry>,
    pub config: Config,
    pub metrics: Vec<RunMetrics>,
    pub aggregates: BTreeMap<String, AggregateStats>,
}

impl ResultsDocument {
    pub fn new(
        config: &Config,
        manifest_path: &Path,
        manifest: Vec<ManifestEntry>,
        metrics: Vec<RunMetrics>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            manifest_path: manifest_path.to_string_lossy().into_owned(),
            manifest,
            config: config.clone(),
            aggregates: aggregate_by_tool(&metrics),
            metrics,
        }
    }

    pub fn load(path: &Path) -> BenchResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            BenchError::Report(format!("cannot read results {}: {e}", path.display()))
        })?;
        let mut doc: Self = serde_json::from_slice(&bytes)?;
        // Saved aggregates are derived data; never trust them over the raw trials.
        doc.aggregates = aggregate_by_tool(&doc.metrics);
        Ok(doc)
    }

    /// Tool names in first-appearance order.
    pub fn tools(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for m in &self.metrics {
            if !out.contains(&m.tool_name.as_str()) {
                out.push(m.tool_name.as_str());
            }
        }
        out
    }

    /// Tool with the highest positive mean throughput.
    pub fn winner(&self) -> Option<(&str, f64)> {
        self.aggregates
            .iter()
            .map(|(tool, agg)| (tool.as_str(), safe_value(agg.avg_throughput, 0.0)))
            .filter(|(_, t)| *t > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportArtifacts {
    pub results_json: PathBuf,
    pub html_report: PathBuf,
}

pub struct ReportComposer<'a> {
    config: &'a Config,
}

impl<'a> ReportComposer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Writes `results_<ts>.json` and `download_performance_report_<ts>.html`.
    pub fn write(&self, doc: &ResultsDocument) -> BenchResult<ReportArtifacts> {
        let stamp = file_stamp(OffsetDateTime::now_utc());
        let artifacts = ReportArtifacts {
            results_json: self.config.results_dir.join(format!("results_{stamp}.json")),
            html_report: self
                .config
                .results_dir
                .join(format!("download_performance_report_{stamp}.html")),
        };
        write_json(&artifacts.results_json, doc)?;
        write_text(&artifacts.html_report, &render_html(doc))?;
        tracing::info!("results saved to {}", artifacts.results_json.display());
        tracing::info!("HTML report saved to {}", artifacts.html_report.display());
        Ok(artifacts)
    }
}

fn file_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Opens `path` with the platform viewer. Failures are logged only.
pub fn open_in_viewer(path: &Path) {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    };
    match cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => tracing::info!("opened report {}", path.display()),
        Err(err) => tracing::warn!("could not open report {}: {err}", path.display()),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn card_class(rate: f64) -> &'static str {
    if rate >= 80.0 {
        "success-high"
    } else if rate >= 50.0 {
        "success-medium"
    } else {
        "success-low"
    }
}

fn table_class(rate: f64) -> &'static str {
    if rate >= 90.0 {
        "success-high"
    } else if rate >= 70.0 {
        "success-medium"
    } else {
        "success-low"
    }
}

fn trial_status(rate: f64) -> &'static str {
    if rate > 80.0 {
        "Success"
    } else if rate > 50.0 {
        "Issues"
    } else {
        "Failed"
    }
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        safe_value(part / whole * 100.0, 0.0)
    } else {
        0.0
    }
}

struct Bar<'a> {
    label: &'a str,
    value: f64,
}

/// Horizontal bar chart as inline SVG.
fn bar_chart_svg(bars: &[Bar<'_>], unit: &str) -> String {
    let width = 640;
    let bar_h = 22;
    let gap = 10;
    let label_w = 180;
    let max = bars
        .iter()
        .map(|b| safe_value(b.value, 0.0))
        .fold(0.0, f64::max);
    let height = (bars.len() as i32) * (bar_h + gap) + 30;
    let mut out = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="chart" width="{width}" height="{height}" role="img">"#
    );
    if bars.is_empty() {
        out.push_str(r##"<text x="10" y="20" fill="#6b7280" font-size="13">no data</text>"##);
    }
    for (i, bar) in bars.iter().enumerate() {
        let value = safe_value(bar.value, 0.0);
        let y = 10 + (i as i32) * (bar_h + gap);
        let w = if max > 0.0 {
            ((value / max) * f64::from(width - label_w - 90)).round() as i32
        } else {
            0
        };
        out.push_str(&format!(
            r##"<text x="0" y="{ty}" fill="#374151" font-size="12">{label}</text><rect x="{label_w}" y="{y}" width="{w}" height="{bar_h}" rx="3" fill="#4f46e5"/><text x="{vx}" y="{ty}" fill="#111827" font-size="12">{value:.2} {unit}</text>"##,
            ty = y + 15,
            label = escape_html(bar.label),
            vx = label_w + w + 6,
            unit = escape_html(unit),
        ));
    }
    out.push_str("</svg>");
    out
}

fn chart_data_json(doc: &ResultsDocument, tools: &[&str]) -> String {
    let pick = |f: fn(&AggregateStats) -> f64| -> Vec<f64> {
        tools
            .iter()
            .map(|t| doc.aggregates.get(*t).map(f).map_or(0.0, |v| safe_value(v, 0.0)))
            .collect()
    };
    let data = serde_json::json!({
        "labels": tools,
        "throughput": pick(|a| a.avg_throughput),
        "throughput_std": pick(|a| a.std_throughput),
        "success_rate": pick(|a| a.overall_success_rate),
        "download_time": pick(|a| a.avg_download_time),
    });
    // Keep the payload from terminating its <script> element.
    data.to_string().replace("</", "<\\/")
}

const STYLE: &str = "body{font-family:-apple-system,Segoe UI,Roboto,sans-serif;background:#f3f4f6;color:#111827;margin:0;padding:24px}\
.container{max-width:1200px;margin:0 auto}\
.header{background:#4f46e5;color:#fff;padding:24px;border-radius:8px}\
.subtitle{opacity:.85;font-size:14px}\
.summary-cards,.comparison-grid,.profiling-grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(240px,1fr));gap:16px;margin:20px 0}\
.card,.comparison-card,.profiling-method-card,.chart-container{background:#fff;border-radius:8px;padding:16px;box-shadow:0 1px 3px rgba(0,0,0,.1)}\
.metric,.metric-row{display:flex;justify-content:space-between;padding:4px 0}\
.winner{background:#ecfdf5;border:1px solid #10b981;border-radius:8px;padding:16px;margin:20px 0}\
.winner-badge{background:#10b981;color:#fff;border-radius:4px;padding:2px 8px}\
.success-high{color:#047857}.success-medium{color:#b45309}.success-low{color:#b91c1c}\
table{border-collapse:collapse;width:100%;background:#fff;margin-bottom:24px}\
th,td{padding:6px 8px;border-bottom:1px solid #e5e7eb;text-align:left;font-size:13px}\
pre.profiling-output{background:#111827;color:#e5e7eb;padding:12px;border-radius:6px;overflow-x:auto;font-size:12px}";

/// Renders the full HTML report. Every number passes through [`safe_value`].
pub fn render_html(doc: &ResultsDocument) -> String {
    let tools = doc.tools();
    let mut html = String::with_capacity(16 * 1024);
    html.push_str(&format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Download Performance Test Results</title><style>{STYLE}</style></head><body><div class=\"container\">"
    ));
    html.push_str(&format!(
        "<div class=\"header\"><h1>Download Performance Test Results</h1><div class=\"subtitle\">Testing Methods: {}</div><div class=\"subtitle\">Generated on {}</div><div class=\"subtitle\">Manifest: {}</div><div class=\"subtitle\">Session: {}</div></div>",
        escape_html(&tools.join(", ")),
        escape_html(&doc.timestamp),
        escape_html(&doc.manifest_path),
        doc.session_id
    ));

    push_summary_cards(&mut html, doc, &tools);
    match doc.winner() {
        Some((tool, throughput)) => html.push_str(&format!(
            "<div class=\"winner\"><h2>Performance Winner</h2><p><strong>Best Performing Method:</strong> <span class=\"winner-badge\">{}</span> with {:.2} MB/s average throughput</p></div>",
            escape_html(tool),
            throughput
        )),
        None => html.push_str(
            "<div class=\"winner\"><h2>Performance Winner</h2><p>No method completed a successful download.</p></div>",
        ),
    }
    push_charts(&mut html, doc, &tools);
    push_profiling(&mut html, doc);
    push_comparison(&mut html, doc, &tools);
    push_aggregate_table(&mut html, doc);
    push_trial_table(&mut html, doc);
    push_manifest_table(&mut html, doc);
    html.push_str("</div></body></html>");
    html
}

fn push_summary_cards(html: &mut String, doc: &ResultsDocument, tools: &[&str]) {
    html.push_str("<div class=\"summary-cards\">");
    for tool in tools {
        let agg = doc.aggregates.get(*tool).cloned().unwrap_or_default();
        let success = safe_value(agg.overall_success_rate, 0.0);
        html.push_str(&format!(
            "<div class=\"card\"><h3>{}</h3><div class=\"metric\"><span class=\"label\">Avg Throughput:</span><span class=\"value\">{:.2} MB/s</span></div><div class=\"metric\"><span class=\"label\">Success Rate:</span><span class=\"value {}\">{:.1}%</span></div><div class=\"metric\"><span class=\"label\">Runs:</span><span class=\"value\">{}</span></div><div class=\"metric\"><span class=\"label\">Avg Time:</span><span class=\"value\">{:.1}s</span></div></div>",
            escape_html(tool),
            safe_value(agg.avg_throughput, 0.0),
            card_class(success),
            success,
            agg.total_runs,
            safe_value(agg.avg_download_time, 0.0),
        ));
    }
    html.push_str("</div>");
}

fn bars<'a>(
    doc: &ResultsDocument,
    tools: &[&'a str],
    f: fn(&AggregateStats) -> f64,
) -> Vec<Bar<'a>> {
    tools
        .iter()
        .map(|t| Bar {
            label: t,
            value: doc.aggregates.get(*t).map_or(0.0, f),
        })
        .collect()
}

fn push_charts(html: &mut String, doc: &ResultsDocument, tools: &[&str]) {
    html.push_str("<div class=\"charts-section\"><h2>Performance Charts</h2>");
    for (title, unit, values) in [
        ("Throughput Comparison (MB/s)", "MB/s", bars(doc, tools, |a| a.avg_throughput)),
        ("Success Rate Comparison (%)", "%", bars(doc, tools, |a| a.overall_success_rate)),
        ("Download Time Comparison (seconds)", "s", bars(doc, tools, |a| a.avg_download_time)),
    ] {
        html.push_str(&format!(
            "<div class=\"chart-container\"><h3>{title}</h3>{}</div>",
            bar_chart_svg(&values, unit)
        ));
    }
    html.push_str(&format!(
        "<script type=\"application/json\" id=\"chart-data\">{}</script></div>",
        chart_data_json(doc, tools)
    ));
}

fn push_profiling(html: &mut String, doc: &ResultsDocument) {
    let profiled: Vec<&RunMetrics> = doc
        .metrics
        .iter()
        .filter(|m| m.profiling_analysis.as_deref().is_some_and(|a| !a.is_empty()))
        .collect();
    if profiled.is_empty() {
        return;
    }
    html.push_str("<div class=\"profiling-section\"><h2>Detailed Performance Profiling &amp; Optimization Insights</h2>");
    for m in profiled {
        let t = &m.timings;
        let total = safe_value(t.total_secs, 0.0);
        let peak_mem = m.resources.usage.map_or("n/a".to_string(), |u| {
            format!(
                "{:.1} MB ({:.1}%)",
                safe_value(u.peak_memory_mb, 0.0),
                safe_value(u.peak_memory_percent, 0.0)
            )
        });
        let peak_cpu = m.peak_cpu_percent().map_or("n/a".to_string(), |v| format!("{:.1}%", safe_value(v, 0.0)));
        html.push_str(&format!(
            "<div class=\"profiling-method-card\"><h3>{} - Run {} Profiling Analysis</h3><div class=\"profiling-grid\"><div class=\"profiling-summary\"><div class=\"metric-row\"><span class=\"label\">Total Runtime:</span><span class=\"value\">{total:.2}s</span></div><div class=\"metric-row\"><span class=\"label\">Throughput:</span><span class=\"value\">{:.2} MB/s</span></div><div class=\"metric-row\"><span class=\"label\">Success Rate:</span><span class=\"value\">{:.1}%</span></div><div class=\"metric-row\"><span class=\"label\">Peak Memory:</span><span class=\"value\">{peak_mem}</span></div><div class=\"metric-row\"><span class=\"label\">Peak CPU:</span><span class=\"value\">{peak_cpu}</span></div></div>",
            escape_html(&m.tool_name),
            m.run_number,
            safe_value(m.throughput_mbps, 0.0),
            safe_value(m.success_rate, 0.0),
        ));
        html.push_str("<div class=\"profiling-breakdown\">");
        for (label, secs) in [
            ("Setup Time", t.setup_secs),
            ("Download Time", t.transfer_secs),
            ("Verification Time", t.verification_secs),
        ] {
            let secs = safe_value(secs, 0.0);
            html.push_str(&format!(
                "<div class=\"metric-row\"><span class=\"label\">{label}:</span><span class=\"value\">{secs:.2}s ({:.1}%)</span></div>",
                percent_of(secs, total)
            ));
        }
        html.push_str(&format!(
            "</div></div><div class=\"profiling-details\"><pre class=\"profiling-output\">{}</pre></div></div>",
            escape_html(m.profiling_analysis.as_deref().unwrap_or_default())
        ));
    }
    html.push_str("</div>");
}

fn push_comparison(html: &mut String, doc: &ResultsDocument, tools: &[&str]) {
    if tools.len() < 2 {
        return;
    }
    let stat = |tool: &str, f: fn(&AggregateStats) -> f64| {
        doc.aggregates.get(tool).map_or(0.0, |a| safe_value(f(a), 0.0))
    };
    let best_by = |f: fn(&AggregateStats) -> f64| {
        tools
            .iter()
            .copied()
            .max_by(|a, b| stat(*a, f).total_cmp(&stat(*b, f)))
    };
    let download_time: fn(&AggregateStats) -> f64 = |a| a.avg_download_time;
    let best_throughput = best_by(|a| a.avg_throughput);
    let best_success = best_by(|a| a.overall_success_rate);
    let fastest = tools
        .iter()
        .copied()
        .filter(|t| stat(*t, download_time) > 0.0)
        .min_by(|a, b| stat(*a, download_time).total_cmp(&stat(*b, download_time)));

    let cards = [
        (
            "Best Throughput",
            best_throughput,
            best_throughput.map(|t| format!("{:.2} MB/s", stat(t, |a| a.avg_throughput))),
        ),
        (
            "Best Success Rate",
            best_success,
            best_success.map(|t| format!("{:.1}%", stat(t, |a| a.overall_success_rate))),
        ),
        (
            "Fastest",
            fastest,
            fastest.map(|t| format!("{:.1}s", stat(t, download_time))),
        ),
    ];
    html.push_str("<div class=\"comparison-analysis\"><h2>Performance Comparison</h2><div class=\"comparison-grid\">");
    for (title, tool, value) in cards {
        html.push_str(&format!(
            "<div class=\"comparison-card\"><h4>{title}</h4><div class=\"winner-method\">{}</div><div class=\"winner-value\">{}</div></div>",
            escape_html(tool.unwrap_or("None")),
            value.unwrap_or_else(|| "n/a".to_string())
        ));
    }
    html.push_str("</div></div>");
}

fn push_aggregate_table(html: &mut String, doc: &ResultsDocument) {
    html.push_str("<div class=\"tables-section\"><h2>Aggregated Performance Summary</h2><table><thead><tr><th>Method</th><th>Workers</th><th>Runs</th><th>Overall Success</th><th>Avg Throughput</th><th>Std Dev</th><th>Min-Max Throughput</th><th>Avg Download Time</th><th>Avg Peak Memory</th><th>Total Files</th></tr></thead><tbody>");
    for (tool, agg) in doc.aggregates.iter().filter(|(_, a)| a.total_runs > 0) {
        let success = safe_value(agg.overall_success_rate, 0.0);
        html.push_str(&format!(
            "<tr><td><strong>{}</strong></td><td>{}</td><td>{}</td><td class=\"{}\">{success:.1}%</td><td>{:.2} MB/s</td><td>±{:.2}</td><td>{:.2} - {:.2} MB/s</td><td>{:.1}s</td><td>{:.1} MB</td><td>{}/{}</td></tr>",
            escape_html(tool),
            agg.workers,
            agg.total_runs,
            table_class(success),
            safe_value(agg.avg_throughput, 0.0),
            safe_value(agg.std_throughput, 0.0),
            safe_value(agg.min_throughput, 0.0),
            safe_value(agg.max_throughput, 0.0),
            safe_value(agg.avg_download_time, 0.0),
            safe_value(agg.avg_peak_memory, 0.0),
            agg.total_files_successful,
            agg.total_files_attempted,
        ));
    }
    html.push_str("</tbody></table>");
}

fn push_trial_table(html: &mut String, doc: &ResultsDocument) {
    html.push_str("<h2>Detailed Performance Data</h2><table><thead><tr><th>Method</th><th>Run</th><th>Success Rate</th><th>Throughput (MB/s)</th><th>Download Time (s)</th><th>Files</th><th>Total Size (MB)</th><th>Peak Memory (MB)</th><th>Peak CPU (%)</th><th>Exit</th><th>Status</th></tr></thead><tbody>");
    for m in &doc.metrics {
        let rate = safe_value(m.success_rate, 0.0);
        let class = table_class(rate);
        html.push_str(&format!(
            "<tr><td><strong>{}</strong></td><td>{}</td><td class=\"{class}\">{rate:.1}%</td><td>{:.2}</td><td>{:.1}</td><td>{}/{}</td><td>{:.1}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{class}\" title=\"{}\">{}</td></tr>",
            escape_html(&m.tool_name),
            m.run_number,
            safe_value(m.throughput_mbps, 0.0),
            safe_value(m.timings.transfer_secs, 0.0),
            m.successful_downloads,
            m.total_files,
            safe_value(m.total_size_mb, 0.0),
            m.peak_memory_mb().map_or("n/a".to_string(), |v| format!("{:.1}", safe_value(v, 0.0))),
            m.peak_cpu_percent().map_or("n/a".to_string(), |v| format!("{:.1}", safe_value(v, 0.0))),
            m.return_code,
            escape_html(&m.error_details.join("; ")),
            trial_status(rate),
        ));
    }
    html.push_str("</tbody></table>");
}

fn push_manifest_table(html: &mut String, doc: &ResultsDocument) {
    html.push_str("<h2>File Details from Manifest</h2><div class=\"file-details\"><table><thead><tr><th>GUID</th><th>Object ID</th><th>File Name</th><th>File Size (bytes)</th><th>Size (MB)</th></tr></thead><tbody>");
    for entry in &doc.manifest {
        let name = if entry.file_name.is_empty() { "N/A" } else { entry.file_name.as_str() };
        html.push_str(&format!(
            "<tr><td><code>{}</code></td><td><code>{}</code></td><td>{}</td><td>{}</td><td class=\"mb\">{:.2}</td></tr>",
            escape_html(entry.guid()),
            escape_html(&entry.object_id),
            escape_html(name),
            entry.file_size,
            safe_value(entry.file_size as f64 / BYTES_PER_MB, 0.0),
        ));
    }
    html.push_str("</tbody></table></div></div>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testutil::ScratchDir;
    use crate::{PhaseTimings, ResourceSummary, ResourceUsage};

    fn metrics(tool: &str, run: u32, success_rate: f64, throughput: f64) -> RunMetrics {
        RunMetrics {
            tool_name: tool.to_string(),
            run_number: run,
            workers: 4,
            total_files: 2,
            successful_downloads: (success_rate / 50.0) as usize,
            success_rate,
            timings: PhaseTimings {
                setup_secs: 1.0,
                transfer_secs: 4.0,
                verification_secs: 1.0,
                total_secs: 6.0,
            },
            total_size_mb: throughput * 4.0,
            throughput_mbps: throughput,
            files_per_second: 0.5,
            resources: ResourceSummary::default(),
            return_code: 0,
            error_details: Vec::new(),
            file_details: Vec::new(),
            profiling_stats: None,
            profiling_analysis: Some("Tool <Profiling>".to_string()),
        }
    }

    fn manifest() -> Vec<ManifestEntry> {
        vec![ManifestEntry {
            object_id: "ns/abc123".to_string(),
            file_name: "a<b>.dcm".to_string(),
            file_size: 2 * 1024 * 1024,
        }]
    }

    #[test]
    fn safe_value_replaces_non_finite() {
        assert_eq!(safe_value(f64::NAN, 0.0), 0.0);
        assert_eq!(safe_value(f64::INFINITY, 1.0), 1.0);
        assert_eq!(safe_value(2.5, 0.0), 2.5);
    }

    #[test]
    fn all_failed_report_renders_without_nan() {
        let mut failed = RunMetrics::failed("Broken", 1, 4, 1, PhaseTimings::default(), "x".to_string());
        failed.throughput_mbps = f64::NAN;
        failed.total_size_mb = f64::INFINITY;
        let doc = ResultsDocument::new(&Config::default(), Path::new("m.json"), manifest(), vec![failed]);
        let html = render_html(&doc);
        assert!(!html.contains("NaN"));
        assert!(!html.contains("Infinity"));
        assert!(!html.contains(">inf"));
        assert!(html.contains("No method completed"));
        assert!(html.contains("Broken"));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn report_names_winner_and_escapes_text() {
        let doc = ResultsDocument::new(
            &Config::default(),
            Path::new("m.json"),
            manifest(),
            vec![
                metrics("Fast", 1, 100.0, 20.0),
                metrics("Slow", 1, 50.0, 5.0),
                metrics("Fast", 2, 100.0, 10.0),
            ],
        );
        assert_eq!(doc.tools(), vec!["Fast", "Slow"]);
        assert_eq!(doc.winner(), Some(("Fast", 15.0)));

        let html = render_html(&doc);
        assert!(html.contains("<span class=\"winner-badge\">Fast</span> with 15.00 MB/s"));
        assert!(html.contains("a&lt;b&gt;.dcm"));
        assert!(html.contains("Tool &lt;Profiling&gt;"));
        assert!(html.contains("Best Success Rate"));
        assert!(html.contains("(66.7%)"));
        assert!(html.contains("id=\"chart-data\""));
        assert!(html.contains("\"labels\":[\"Fast\",\"Slow\"]"));
    }

    #[test]
    fn write_persists_both_artifacts_and_reloads() {
        let root = ScratchDir::new("report");
        let config = Config {
            results_dir: root.to_path_buf(),
            ..Config::default()
        };
        let doc = ResultsDocument::new(&config, Path::new("m.json"), manifest(), vec![metrics("A", 1, 100.0, 3.0)]);
        let artifacts = ReportComposer::new(&config).write(&doc).expect("write report");
        assert!(artifacts.html_report.exists());
        let name = artifacts.results_json.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("results_") && name.ends_with(".json"));

        let reloaded = ResultsDocument::load(&artifacts.results_json).expect("reload");
        assert_eq!(reloaded.session_id, doc.session_id);
        assert_eq!(reloaded.aggregates, doc.aggregates);
        assert_eq!(reloaded.manifest.len(), 1);
    }

    #[test]
    fn profiling_card_shows_peak_memory_share() {
        let mut sampled = metrics("Sampled", 1, 100.0, 2.0);
        sampled.resources = ResourceSummary {
            sample_count: 3,
            duration_secs: 3.0,
            usage: Some(ResourceUsage {
                peak_memory_mb: 512.0,
                avg_memory_mb: 400.0,
                peak_cpu_percent: 75.0,
                avg_cpu_percent: 40.0,
                peak_memory_percent: 12.5,
            }),
        };
        let doc = ResultsDocument::new(&Config::default(), Path::new("m.json"), manifest(), vec![sampled]);
        let html = render_html(&doc);
        assert!(html.contains("512.0 MB (12.5%)"));
        assert!(html.contains("75.0%"));
    }

    #[test]
    fn chart_svg_scales_to_largest_bar() {
        let svg = bar_chart_svg(
            &[Bar { label: "a", value: 10.0 }, Bar { label: "b", value: f64::NAN }],
            "MB/s",
        );
        assert!(svg.contains("width=\"370\""));
        assert!(svg.contains("width=\"0\""));
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn file_stamp_is_sortable() {
        let at = OffsetDateTime::from_unix_timestamp(0).expect("epoch");
        assert_eq!(file_stamp(at), "19700101_000000");
    }
}
