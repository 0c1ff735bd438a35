//! dlbench core library: download tool benchmarking, file reconciliation and reporting.

mod aggregate;
mod config;
mod manifest;
mod metrics;
mod reconcile;
mod reporting;
mod reporting_cmd;
mod session;
mod status;

pub mod cmd;
pub mod platform;
pub mod runtime;

pub use aggregate::*;
pub use config::*;
pub use manifest::*;
pub use metrics::*;
pub use platform::error::*;
pub use platform::fsutil::*;
pub use reconcile::*;
pub use reporting::*;
pub use reporting_cmd::*;
pub use runtime::executor::RunExecutor;
pub use runtime::profiler::{ProfileLayer, ProfileReport, Profiler};
pub use session::*;
pub use status::*;
