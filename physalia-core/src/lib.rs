//! Shared primitives for the physalia coalescent-tree toolkit.
//!
//! `physalia-core` provides the foundation the analysis crates build on:
//!
//! - **Error types** — [`PhysaliaError`] and [`Result`] for structured error handling
//! - **Traits** — small shared abstractions like [`Summarizable`]

pub mod error;
pub mod traits;

pub use error::{PhysaliaError, Result};
pub use traits::*;
