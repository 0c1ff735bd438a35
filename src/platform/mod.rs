//! Host-facing plumbing: errors and filesystem helpers.

pub mod error;
pub mod fsutil;
#[cfg(test)]
pub(crate) mod testutil;
