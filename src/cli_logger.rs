use anyhow::Result;
use dlbench::{SessionOutcome, safe_value};
use serde::Serialize;
use serde_json::Value;

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_serialized<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
            return Ok(());
        }

        let rendered = render_value(&serde_json::to_value(value)?, 0);
        println!("{rendered}");
        Ok(())
    }

    /// Per-tool results of a finished session.
    pub fn print_session_summary(&self, outcome: &SessionOutcome) -> Result<()> {
        if self.json {
            let out = serde_json::json!({
                "session_id": outcome.document.session_id,
                "aggregates": outcome.document.aggregates,
                "artifacts": outcome.artifacts,
            });
            println!("{out}");
            return Ok(());
        }

        let doc = &outcome.document;
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {}\n",
            self.style("dlbench", "36;1"),
            self.style("results", "37;1"),
            doc.session_id
        ));
        for tool in doc.tools() {
            let Some(agg) = doc.aggregates.get(tool) else {
                continue;
            };
            let success = safe_value(agg.overall_success_rate, 0.0);
            let success_code = if success >= 80.0 {
                "32;1"
            } else if success >= 50.0 {
                "33;1"
            } else {
                "31;1"
            };
            out.push_str(&format!("{}\n", self.style(tool, "37;1")));
            out.push_str(&format!(
                "  {} {}/{} successful\n",
                self.style("runs", "90"),
                agg.successful_runs,
                agg.total_runs
            ));
            out.push_str(&format!(
                "  {} {}\n",
                self.style("success", "90"),
                self.style(&format!("{success:.1}%"), success_code)
            ));
            out.push_str(&format!(
                "  {} {:.2} ± {:.2} MB/s\n",
                self.style("throughput", "90"),
                safe_value(agg.avg_throughput, 0.0),
                safe_value(agg.std_throughput, 0.0)
            ));
            out.push_str(&format!(
                "  {} {:.2} - {:.2} MB/s\n",
                self.style("range", "90"),
                safe_value(agg.min_throughput, 0.0),
                safe_value(agg.max_throughput, 0.0)
            ));
            out.push_str(&format!(
                "  {} {:.1}s\n",
                self.style("time", "90"),
                safe_value(agg.avg_download_time, 0.0)
            ));
            out.push_str(&format!(
                "  {} {}/{}\n",
                self.style("files", "90"),
                agg.total_files_successful,
                agg.total_files_attempted
            ));
        }
        if let Some((tool, throughput)) = doc.winner() {
            out.push_str(&format!(
                "{} {tool} ({throughput:.2} MB/s)\n",
                self.style("winner", "32;1")
            ));
        }
        out.push_str(&format!(
            "{} {}\n",
            self.style("results", "90"),
            outcome.artifacts.results_json.display()
        ));
        out.push_str(&format!(
            "{} {}\n",
            self.style("report", "90"),
            outcome.artifacts.html_report.display()
        ));

        println!("{}", out.trim_end());
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "code": "error",
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}

fn render_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Array(items) => render_array(items, indent),
        Value::Object(map) => render_object(map, indent),
    }
}

fn render_array(items: &[Value], indent: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for item in items {
        match item {
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!("{pad}-\n{}\n", render_value(item, indent + 2)));
            }
            _ => out.push_str(&format!("{pad}- {}\n", render_value(item, indent + 2))),
        }
    }
    out.trim_end().to_string()
}

fn render_object(map: &serde_json::Map<String, Value>, indent: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for (key, value) in map {
        match value {
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!(
                    "{pad}{key}:\n{}\n",
                    render_value(value, indent + 2)
                ));
            }
            _ => out.push_str(&format!(
                "{pad}{key}: {}\n",
                render_value(value, indent + 2)
            )),
        }
    }
    out.trim_end().to_string()
}
