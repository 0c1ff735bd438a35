//! Wall-clock phase timeline for a single trial.

use std::time::{Duration, Instant};

use crate::PhaseTimings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Transfer,
    Verification,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub index: usize,
    pub phase: Phase,
    pub offset_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub struct PhaseTimeline {
    started: Instant,
    current: Option<(Phase, Instant)>,
    entries: Vec<(Phase, Duration, Duration)>,
}

impl PhaseTimeline {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            current: None,
            entries: Vec::new(),
        }
    }

    /// Closes the running phase (if any) and opens `phase`.
    pub fn begin(&mut self, phase: Phase) {
        self.finish();
        self.current = Some((phase, Instant::now()));
    }

    pub fn finish(&mut self) {
        if let Some((phase, at)) = self.current.take() {
            let offset = at.saturating_duration_since(self.started);
            self.entries.push((phase, offset, at.elapsed()));
        }
    }

    pub fn elapsed(&self, phase: Phase) -> Duration {
        let closed: Duration = self
            .entries
            .iter()
            .filter(|(p, _, _)| *p == phase)
            .map(|(_, _, d)| *d)
            .sum();
        match self.current {
            Some((p, at)) if p == phase => closed + at.elapsed(),
            _ => closed,
        }
    }

    /// Snapshot of per-phase durations; the running phase counts up to now.
    pub fn timings(&self) -> PhaseTimings {
        PhaseTimings {
            setup_secs: self.elapsed(Phase::Setup).as_secs_f64(),
            transfer_secs: self.elapsed(Phase::Transfer).as_secs_f64(),
            verification_secs: self.elapsed(Phase::Verification).as_secs_f64(),
            total_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, (phase, offset, duration))| TimelineEntry {
                index,
                phase: *phase,
                offset_ms: offset.as_millis() as u64,
                duration_ms: duration.as_millis() as u64,
            })
            .collect()
    }
}
