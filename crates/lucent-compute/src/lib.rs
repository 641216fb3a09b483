//! # Lucent Compute
//!
//! Compute backend abstraction for the Lucent toolkit. This crate provides a
//! [`ComputeBackend`](backend::ComputeBackend) trait that isolates the
//! parameter-sweep code from how grid cells are scheduled onto hardware.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, CellFn, ComputeBackend, ComputeError, DeviceInfo};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
