//! Replica management.
//!
//! # Data Flow
//! ```text
//! GET  /system/function/{name}       → controller.rs status()  → inspect + task count
//! POST /system/scale-function/{name} → controller.rs set_replicas() → inspect → update
//! ```
//!
//! # Design Decisions
//! - Min/max come from service labels; label names are configuration
//! - A bad label value never fails a read; the default is used
//! - No retries here: a version conflict goes back to the caller

pub mod controller;

pub use controller::{FunctionStatus, ReplicaController, ReplicaError, ReplicaSpec, ServiceStore};
