//! Background host resource sampling for the duration of one trial.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use sysinfo::System;
use time::OffsetDateTime;

use crate::{ResourceSummary, ResourceUsage};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
/// Upper bound on how long `stop` waits for the sampling thread to hand back its readings.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// One point-in-time observation of host memory and CPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerReading {
    pub timestamp: OffsetDateTime,
    pub cpu_percent: f64,
    pub memory_used_mb: f64,
    pub memory_percent: f64,
}

/// Source of readings. `None` means the host can no longer be read and sampling stops.
pub trait ResourceProbe: Send + 'static {
    fn read(&mut self) -> Option<SamplerReading>;
}

/// System-wide memory and CPU via `sysinfo`.
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime it so the first reading is meaningful.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn read(&mut self) -> Option<SamplerReading> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }
        let used = self.system.used_memory();
        Some(SamplerReading {
            timestamp: OffsetDateTime::now_utc(),
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            memory_used_mb: used as f64 / BYTES_PER_MB,
            memory_percent: used as f64 / total as f64 * 100.0,
        })
    }
}

pub struct ResourceSampler;

impl ResourceSampler {
    pub fn start(interval: Duration) -> SamplerHandle {
        Self::start_with(interval, SystemProbe::new())
    }

    /// Spawns the sampling thread. The first reading is taken one `interval` after start.
    pub fn start_with<P: ResourceProbe>(interval: Duration, mut probe: P) -> SamplerHandle {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (readings_tx, readings_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut readings = Vec::new();
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                match probe.read() {
                    Some(reading) => readings.push(reading),
                    None => {
                        tracing::warn!("resource probe failed; sampling stopped early");
                        break;
                    }
                }
            }
            // The handle may have given up waiting.
            let _ = readings_tx.send(readings);
        });
        SamplerHandle {
            interval,
            grace: STOP_GRACE,
            stop_tx: Some(stop_tx),
            readings_rx: Some(readings_rx),
        }
    }
}

/// Owns the sampling thread. Dropping it stops sampling like `stop` does.
pub struct SamplerHandle {
    interval: Duration,
    grace: Duration,
    stop_tx: Option<Sender<()>>,
    readings_rx: Option<Receiver<Vec<SamplerReading>>>,
}

impl SamplerHandle {
    /// Signals the sampling thread and summarizes what it saw. Waits at most the stop grace
    /// period; a thread that has not answered by then is abandoned and the summary is empty.
    pub fn stop(mut self) -> ResourceSummary {
        let _span = tracing::info_span!("sampler.stop").entered();
        let readings = self.collect();
        if let (Some(first), Some(last)) = (readings.first(), readings.last()) {
            tracing::debug!(
                "{} resource readings between {} and {}",
                readings.len(),
                first.timestamp,
                last.timestamp
            );
        }
        summarize(&readings, self.interval)
    }

    fn collect(&mut self) -> Vec<SamplerReading> {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited after a probe failure.
            let _ = tx.send(());
        }
        let Some(rx) = self.readings_rx.take() else {
            return Vec::new();
        };
        match rx.recv_timeout(self.grace) {
            Ok(readings) => readings,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "resource sampler did not stop within {:?}; readings dropped",
                    self.grace
                );
                Vec::new()
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("resource sampler thread panicked; no readings kept");
                Vec::new()
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.collect();
    }
}

pub fn summarize(readings: &[SamplerReading], interval: Duration) -> ResourceSummary {
    let sample_count = readings.len();
    let duration_secs = sample_count as f64 * interval.as_secs_f64();
    if sample_count == 0 {
        return ResourceSummary {
            sample_count,
            duration_secs,
            usage: None,
        };
    }
    let n = sample_count as f64;
    let peak_memory_mb = readings.iter().map(|r| r.memory_used_mb).fold(0.0, f64::max);
    let peak_cpu_percent = readings.iter().map(|r| r.cpu_percent).fold(0.0, f64::max);
    let avg_memory_mb = readings.iter().map(|r| r.memory_used_mb).sum::<f64>() / n;
    let avg_cpu_percent = readings.iter().map(|r| r.cpu_percent).sum::<f64>() / n;
    let peak_memory_percent = readings.iter().map(|r| r.memory_percent).fold(0.0, f64::max);
    ResourceSummary {
        sample_count,
        duration_secs,
        usage: Some(ResourceUsage {
            peak_memory_mb,
            avg_memory_mb,
            peak_cpu_percent,
            avg_cpu_percent,
            peak_memory_percent,
        }),
    }
}
