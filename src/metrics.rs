//! Per-trial measurement records.

use serde::{Deserialize, Serialize};

/// Path sentinel recorded for a manifest entry with no matching file.
pub const NOT_FOUND: &str = "NOT_FOUND";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactGuidMatch,
    GuidInFilename,
    ExactFilenameMatch,
    FailedMatch,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactGuidMatch => "exact_guid_match",
            Self::GuidInFilename => "guid_in_filename",
            Self::ExactFilenameMatch => "exact_filename_match",
            Self::FailedMatch => "failed_match",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMatchRecord {
    pub object_id: String,
    pub guid: String,
    pub expected_filename: String,
    /// Relative to the download destination, or [`NOT_FOUND`].
    pub actual_path: String,
    pub expected_size: u64,
    pub actual_size: u64,
    pub size_match_percent: f64,
    pub match_score: u32,
    pub match_type: MatchType,
    pub guid_verified: bool,
}

impl FileMatchRecord {
    pub fn is_matched(&self) -> bool {
        self.match_type != MatchType::FailedMatch
    }
}

/// Wall-clock seconds spent in each trial phase.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseTimings {
    pub setup_secs: f64,
    pub transfer_secs: f64,
    pub verification_secs: f64,
    pub total_secs: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub peak_memory_mb: f64,
    pub avg_memory_mb: f64,
    pub peak_cpu_percent: f64,
    pub avg_cpu_percent: f64,
    /// Share of total host memory in use at the peak.
    #[serde(default)]
    pub peak_memory_percent: f64,
}

/// What the sampler saw during a trial. `usage` is `None` when nothing was sampled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceSummary {
    pub sample_count: usize,
    pub duration_secs: f64,
    pub usage: Option<ResourceUsage>,
}

impl ResourceSummary {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    pub tool_name: String,
    pub run_number: u32,
    pub workers: u32,
    pub total_files: usize,
    pub successful_downloads: usize,
    pub success_rate: f64,
    pub timings: PhaseTimings,
    pub total_size_mb: f64,
    pub throughput_mbps: f64,
    pub files_per_second: f64,
    pub resources: ResourceSummary,
    pub return_code: i32,
    #[serde(default)]
    pub error_details: Vec<String>,
    #[serde(default)]
    pub file_details: Vec<FileMatchRecord>,
    #[serde(default)]
    pub profiling_stats: Option<String>,
    #[serde(default)]
    pub profiling_analysis: Option<String>,
}

impl RunMetrics {
    /// Zero-metrics record for a trial that could not produce measurements.
    pub fn failed(
        tool_name: &str,
        run_number: u32,
        workers: u32,
        total_files: usize,
        timings: PhaseTimings,
        error: String,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            run_number,
            workers,
            total_files,
            successful_downloads: 0,
            success_rate: 0.0,
            timings: PhaseTimings {
                transfer_secs: 0.0,
                verification_secs: 0.0,
                ..timings
            },
            total_size_mb: 0.0,
            throughput_mbps: 0.0,
            files_per_second: 0.0,
            resources: ResourceSummary::default(),
            return_code: -1,
            error_details: vec![error],
            file_details: Vec::new(),
            profiling_stats: None,
            profiling_analysis: None,
        }
    }

    pub fn peak_memory_mb(&self) -> Option<f64> {
        self.resources.usage.map(|u| u.peak_memory_mb)
    }

    pub fn peak_cpu_percent(&self) -> Option<f64> {
        self.resources.usage.map(|u| u.peak_cpu_percent)
    }
}
