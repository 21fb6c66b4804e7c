//! # vigil-core
//!
//! Core types, errors, and utilities for the Vigil alert console.
//!
//! This crate provides:
//! - [`VigilError`] - Error types shared across the Vigil crates
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - The alert domain model: severity levels, inbound alerts,
//!   and dedup signatures
//!
//! ## Example
//!
//! ```no_run
//! use vigil_core::{logging, types::Severity};
//!
//! fn main() -> vigil_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     tracing::info!(level = %Severity::High, "alert feed starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use error::{ActionFailure, Result, VigilError};
pub use logging::{LogGuard, init_logging};
pub use types::{Alert, Severity, Signature};
