//! Integration test crate for burnin.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on multiple burnin crates to verify they work together.

#[cfg(test)]
mod decode;

#[cfg(test)]
mod gpu;

#[cfg(test)]
mod pipeline;
