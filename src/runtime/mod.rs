//! Trial execution: subprocess control, resource sampling, profiling and phase timing.

pub mod executor;
pub mod profiler;
pub mod sampler;
pub mod subprocess;
pub mod timeline;
