//! Cross-trial statistics per tool.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use crate::RunMetrics;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub tool_name: String,
    pub workers: u32,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub overall_success_rate: f64,
    pub avg_throughput: f64,
    pub std_throughput: f64,
    pub min_throughput: f64,
    pub max_throughput: f64,
    pub avg_download_time: f64,
    pub std_download_time: f64,
    pub avg_peak_memory: f64,
    pub avg_peak_cpu: f64,
    pub total_files_attempted: usize,
    pub total_files_successful: usize,
}

/// Summarizes every trial of one tool. Always recomputed from the full list.
pub fn aggregate(tool_name: &str, runs: &[RunMetrics]) -> AggregateStats {
    let mut stats = AggregateStats {
        tool_name: tool_name.to_string(),
        workers: runs.iter().map(|m| m.workers).max().unwrap_or(0),
        total_runs: runs.len(),
        total_files_attempted: runs.iter().map(|m| m.total_files).sum(),
        total_files_successful: runs.iter().map(|m| m.successful_downloads).sum(),
        ..AggregateStats::default()
    };

    let successful: Vec<&RunMetrics> = runs.iter().filter(|m| m.success_rate > 0.0).collect();
    stats.successful_runs = successful.len();
    if successful.is_empty() {
        return stats;
    }

    let throughputs = positive(successful.iter().map(|m| m.throughput_mbps));
    let transfer_times = positive(successful.iter().map(|m| m.timings.transfer_secs));
    let memory = positive(successful.iter().filter_map(|m| m.peak_memory_mb()));
    let cpu = positive(successful.iter().filter_map(|m| m.peak_cpu_percent()));
    let success_rates = finite(runs.iter().map(|m| m.success_rate));

    stats.overall_success_rate = mean(&success_rates);
    stats.avg_throughput = mean(&throughputs);
    stats.std_throughput = sample_stdev(&throughputs);
    stats.min_throughput = throughputs.first().copied().unwrap_or(0.0);
    stats.max_throughput = throughputs.last().copied().unwrap_or(0.0);
    stats.avg_download_time = mean(&transfer_times);
    stats.std_download_time = sample_stdev(&transfer_times);
    stats.avg_peak_memory = mean(&memory);
    stats.avg_peak_cpu = mean(&cpu);
    stats
}

/// Groups `runs` by tool name and aggregates each group.
pub fn aggregate_by_tool(runs: &[RunMetrics]) -> BTreeMap<String, AggregateStats> {
    let mut grouped: BTreeMap<&str, Vec<RunMetrics>> = BTreeMap::new();
    for run in runs {
        grouped.entry(run.tool_name.as_str()).or_default().push(run.clone());
    }
    grouped
        .into_iter()
        .map(|(tool, runs)| (tool.to_string(), aggregate(tool, &runs)))
        .collect()
}

/// Finite values, sorted ascending so summation order never depends on input order.
fn finite(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    out.sort_by(f64::total_cmp);
    out
}

fn positive(values: impl Iterator<Item = f64>) -> Vec<f64> {
    finite(values.filter(|v| *v > 0.0))
}

fn mean(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.iter().sum::<f64>() / sorted.len() as f64
}

fn sample_stdev(sorted: &[f64]) -> f64 {
    if sorted.len() < 2 {
        return 0.0;
    }
    let m = mean(sorted);
    let var = sorted.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (sorted.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PhaseTimings, ResourceSummary, ResourceUsage};

    fn run(tool: &str, success_rate: f64, throughput: f64, transfer: f64, peak_mem: Option<f64>) -> RunMetrics {
        RunMetrics {
            tool_name: tool.to_string(),
            run_number: 1,
            workers: 4,
            total_files: 10,
            successful_downloads: (success_rate / 10.0) as usize,
            success_rate,
            timings: PhaseTimings {
                transfer_secs: transfer,
                ..PhaseTimings::default()
            },
            total_size_mb: throughput * transfer,
            throughput_mbps: throughput,
            files_per_second: 0.0,
            resources: ResourceSummary {
                sample_count: usize::from(peak_mem.is_some()),
                duration_secs: 1.0,
                usage: peak_mem.map(|m| ResourceUsage {
                    peak_memory_mb: m,
                    avg_memory_mb: m,
                    peak_cpu_percent: 50.0,
                    avg_cpu_percent: 25.0,
                    peak_memory_percent: 12.5,
                }),
            },
            return_code: 0,
            error_details: Vec::new(),
            file_details: Vec::new(),
            profiling_stats: None,
            profiling_analysis: None,
        }
    }

    fn assert_all_finite(s: &AggregateStats) {
        for v in [
            s.overall_success_rate,
            s.avg_throughput,
            s.std_throughput,
            s.min_throughput,
            s.max_throughput,
            s.avg_download_time,
            s.std_download_time,
            s.avg_peak_memory,
            s.avg_peak_cpu,
        ] {
            assert!(v.is_finite(), "non-finite value in {s:?}");
        }
    }

    #[test]
    fn empty_input_is_all_zero() {
        let s = aggregate("Tool", &[]);
        assert_eq!(s.total_runs, 0);
        assert_eq!(s.successful_runs, 0);
        assert_eq!(s.avg_throughput, 0.0);
        assert_all_finite(&s);
    }

    #[test]
    fn all_failed_keeps_only_file_totals() {
        let runs = vec![run("T", 0.0, 0.0, 0.0, None), run("T", 0.0, 5.0, 2.0, Some(10.0))];
        let s = aggregate("T", &runs);
        assert_eq!(s.total_runs, 2);
        assert_eq!(s.successful_runs, 0);
        assert_eq!(s.total_files_attempted, 20);
        assert_eq!(s.overall_success_rate, 0.0);
        assert_eq!(s.avg_throughput, 0.0);
        assert_eq!(s.avg_peak_memory, 0.0);
        assert_all_finite(&s);
    }

    #[test]
    fn failed_trial_is_excluded_from_throughput() {
        let runs = vec![run("T", 80.0, 12.0, 4.0, Some(100.0)), run("T", 0.0, 0.0, 0.0, None)];
        let s = aggregate("T", &runs);
        assert_eq!(s.successful_runs, 1);
        assert_eq!(s.avg_throughput, 12.0);
        assert_eq!(s.std_throughput, 0.0);
        assert_eq!(s.min_throughput, 12.0);
        assert_eq!(s.max_throughput, 12.0);
        assert_eq!(s.avg_download_time, 4.0);
        assert_eq!(s.overall_success_rate, 40.0);
        assert_eq!(s.total_files_attempted, 20);
        assert_eq!(s.total_files_successful, 8);
        assert_eq!(s.avg_peak_memory, 100.0);
    }

    #[test]
    fn sample_stdev_uses_n_minus_one() {
        let runs = vec![run("T", 100.0, 2.0, 1.0, None), run("T", 100.0, 4.0, 3.0, None)];
        let s = aggregate("T", &runs);
        assert_eq!(s.avg_throughput, 3.0);
        assert!((s.std_throughput - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.avg_peak_memory, 0.0);
    }

    #[test]
    fn permutations_give_identical_stats() {
        let mut runs = vec![
            run("T", 100.0, 0.1, 3.3, Some(1.1)),
            run("T", 90.0, 0.2, 7.7, Some(2.2)),
            run("T", 70.0, 0.3, 1.9, None),
            run("T", 0.0, 9.9, 0.0, Some(5.0)),
        ];
        let first = aggregate("T", &runs);
        runs.reverse();
        assert_eq!(aggregate("T", &runs), first);
        runs.swap(0, 2);
        assert_eq!(aggregate("T", &runs), first);
        assert_eq!(aggregate("T", &runs), aggregate("T", &runs));
    }

    #[test]
    fn non_finite_inputs_never_leak() {
        let runs = vec![
            run("T", 50.0, f64::INFINITY, f64::NAN, Some(f64::NAN)),
            run("T", 50.0, 1.0, 1.0, None),
        ];
        let s = aggregate("T", &runs);
        assert_all_finite(&s);
        assert_eq!(s.avg_throughput, 1.0);
    }

    #[test]
    fn by_tool_groups_on_name() {
        let runs = vec![
            run("A", 100.0, 1.0, 1.0, None),
            run("B", 100.0, 2.0, 1.0, None),
            run("A", 100.0, 3.0, 1.0, None),
        ];
        let grouped = aggregate_by_tool(&runs);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["A"].total_runs, 2);
        assert_eq!(grouped["A"].avg_throughput, 2.0);
        assert_eq!(grouped["B"].tool_name, "B");
    }
}
