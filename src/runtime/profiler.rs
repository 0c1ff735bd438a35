//! Span-based call profiler.
//!
//! A [`ProfileLayer`] installed in the subscriber records, while the shared [`Profiler`] is
//! enabled, how often each span is entered and how long it stays entered. Self time excludes
//! time spent in nested spans on the same thread, cumulative time includes it.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tracing::span;
use tracing::subscriber::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const BOTTLENECK_KEYWORDS: &[&str] = &[
    "subprocess", "spawn", "wait", "sleep", "poll", "read_output", "sampler", "thread",
];
const MAX_BOTTLENECKS: usize = 10;
const MAX_TIME_CONSUMERS: usize = 5;
const TIME_CONSUMER_THRESHOLD_SECS: f64 = 0.1;
/// Share of total self time the matching spans must hold before an insight is reported.
const INSIGHT_MIN_SHARE: f64 = 0.10;
const INSIGHTS: &[(&[&str], &str)] = &[
    (
        &["subprocess.spawn", "subprocess.wait"],
        "High subprocess overhead detected - consider optimizing external calls",
    ),
    (
        &["sleep"],
        "Sleep/wait operations found - potential for async optimization",
    ),
    (
        &["read_output", "select"],
        "I/O blocking detected - async operations could improve performance",
    ),
    (
        &["sampler"],
        "System monitoring overhead - consider reducing monitoring frequency",
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// `file:line(name)` of the span callsite.
    pub frame: String,
    pub calls: u64,
    pub total_secs: f64,
    pub cumulative_secs: f64,
}

impl FrameStats {
    fn per_call(value: f64, calls: u64) -> f64 {
        if calls == 0 { 0.0 } else { value / calls as f64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub frames: Vec<FrameStats>,
    pub total_calls: u64,
    pub total_secs: f64,
}

impl ProfileReport {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn by_cumulative(&self) -> Vec<&FrameStats> {
        let mut out: Vec<&FrameStats> = self.frames.iter().collect();
        out.sort_by(|a, b| {
            b.cumulative_secs
                .total_cmp(&a.cumulative_secs)
                .then_with(|| a.frame.cmp(&b.frame))
        });
        out
    }

    /// Fraction of total self time spent in spans whose name contains any of `needles`.
    pub fn self_time_share(&self, needles: &[&str]) -> f64 {
        if self.total_secs <= 0.0 {
            return 0.0;
        }
        let matched: f64 = self
            .frames
            .iter()
            .filter(|f| {
                let name = span_name(&f.frame);
                needles.iter().any(|n| name.contains(n))
            })
            .map(|f| f.total_secs)
            .sum();
        matched / self.total_secs
    }

    pub fn by_total(&self) -> Vec<&FrameStats> {
        let mut out: Vec<&FrameStats> = self.frames.iter().collect();
        out.sort_by(|a, b| {
            b.total_secs
                .total_cmp(&a.total_secs)
                .then_with(|| a.frame.cmp(&b.frame))
        });
        out
    }

    /// Tabular dump of the `limit` frames with the highest cumulative time.
    pub fn render(&self, limit: usize) -> String {
        let mut out = format!(
            "{} function calls in {:.3} seconds\n\n   Ordered by: cumulative time\n\n",
            self.total_calls, self.total_secs
        );
        out.push_str("   ncalls  tottime  percall  cumtime  percall filename:lineno(function)\n");
        for f in self.by_cumulative().into_iter().take(limit) {
            out.push_str(&render_row(f));
            out.push('\n');
        }
        out
    }
}

/// `name` out of a `file:line(name)` frame key.
fn span_name(frame: &str) -> &str {
    frame
        .rsplit_once('(')
        .map_or(frame, |(_, rest)| rest.trim_end_matches(')'))
}

fn render_row(f: &FrameStats) -> String {
    format!(
        "{:>9} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {}",
        f.calls,
        f.total_secs,
        FrameStats::per_call(f.total_secs, f.calls),
        f.cumulative_secs,
        FrameStats::per_call(f.cumulative_secs, f.calls),
        f.frame
    )
}

#[derive(Debug, Default)]
struct FrameAccum {
    calls: u64,
    total: Duration,
    cumulative: Duration,
}

#[derive(Debug)]
struct OpenFrame {
    key: String,
    started: Instant,
    children: Duration,
}

#[derive(Debug, Default)]
struct ProfileState {
    frames: BTreeMap<String, FrameAccum>,
    stacks: HashMap<ThreadId, Vec<OpenFrame>>,
}

/// Shared on/off switch plus the accumulated statistics.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    state: Arc<Mutex<ProfileState>>,
    enabled: Arc<AtomicBool>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self) -> ProfileLayer {
        ProfileLayer {
            profiler: self.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Discards previous statistics and starts recording.
    pub fn enable(&self) {
        {
            let mut state = self.lock();
            state.frames.clear();
            state.stacks.clear();
        }
        self.enabled.store(true, Ordering::Release);
    }

    /// Stops recording and returns what was collected since [`Profiler::enable`].
    pub fn disable(&self) -> ProfileReport {
        self.enabled.store(false, Ordering::Release);
        let mut state = self.lock();
        state.stacks.clear();
        let frames: Vec<FrameStats> = std::mem::take(&mut state.frames)
            .into_iter()
            .map(|(frame, acc)| FrameStats {
                frame,
                calls: acc.calls,
                total_secs: acc.total.as_secs_f64(),
                cumulative_secs: acc.cumulative.as_secs_f64(),
            })
            .collect();
        ProfileReport {
            total_calls: frames.iter().map(|f| f.calls).sum(),
            total_secs: frames.iter().map(|f| f.total_secs).sum(),
            frames,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProfileState> {
        // A panic while holding the lock only loses timing data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ProfileLayer {
    profiler: Profiler,
}

impl<S> Layer<S> for ProfileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !self.profiler.is_enabled() {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };
        let meta = span.metadata();
        let key = format!(
            "{}:{}({})",
            meta.file().unwrap_or("<unknown>"),
            meta.line().unwrap_or(0),
            meta.name()
        );
        let mut state = self.profiler.lock();
        state
            .stacks
            .entry(std::thread::current().id())
            .or_default()
            .push(OpenFrame {
                key,
                started: Instant::now(),
                children: Duration::ZERO,
            });
    }

    fn on_exit(&self, _id: &span::Id, _ctx: Context<'_, S>) {
        let now = Instant::now();
        let mut state = self.profiler.lock();
        let thread = std::thread::current().id();
        let Some(stack) = state.stacks.get_mut(&thread) else {
            return;
        };
        let Some(frame) = stack.pop() else {
            return;
        };
        let elapsed = now.saturating_duration_since(frame.started);
        if let Some(parent) = stack.last_mut() {
            parent.children += elapsed;
        }
        let acc = state.frames.entry(frame.key).or_default();
        acc.calls += 1;
        acc.cumulative += elapsed;
        acc.total += elapsed.saturating_sub(frame.children);
    }
}

/// Human-readable bottleneck summary for one trial. Empty input yields an empty string.
pub fn analyze(report: &ProfileReport, tool_name: &str, run_number: u32) -> String {
    if report.is_empty() {
        return String::new();
    }
    let mut out = format!(
        "\n{tool_name} Profiling (Run {run_number})\nTotal Function Calls: {} in {:.3} seconds\n\nTop Performance Bottlenecks (Cumulative Time):",
        group_thousands(report.total_calls),
        report.total_secs
    );
    for f in report
        .by_cumulative()
        .into_iter()
        .filter(|f| {
            let frame = f.frame.to_lowercase();
            BOTTLENECK_KEYWORDS.iter().any(|k| frame.contains(k))
        })
        .take(MAX_BOTTLENECKS)
    {
        out.push_str("\n  ");
        out.push_str(render_row(f).split_whitespace().collect::<Vec<_>>().join(" ").as_str());
    }

    out.push_str("\n\nTop Time Consumers (Total Time):");
    for f in report
        .by_total()
        .into_iter()
        .filter(|f| f.total_secs > TIME_CONSUMER_THRESHOLD_SECS)
        .take(MAX_TIME_CONSUMERS)
    {
        out.push_str("\n  ");
        out.push_str(render_row(f).split_whitespace().collect::<Vec<_>>().join(" ").as_str());
    }

    out.push_str("\n\nPerformance Insights:");
    for (needles, text) in INSIGHTS {
        if report.self_time_share(needles) >= INSIGHT_MIN_SHARE {
            out.push_str("\n  • ");
            out.push_str(text);
        }
    }
    if report.total_secs > 0.0 {
        let calls_per_second = (report.total_calls as f64 / report.total_secs).round();
        out.push_str(&format!(
            "\n  • Function calls efficiency: {} calls/second",
            group_thousands(calls_per_second as u64)
        ));
    }
    out
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
