//! Shared workloads for benches, determinism tests and ad-hoc profiling.
//!
//! Criterion benches and the interpreter tests drive the same graphs so a
//! scheduling regression shows up in both places.

pub mod kernels;
pub mod scenarios;
