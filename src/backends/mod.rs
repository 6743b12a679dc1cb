//! Driver implementations
//!
//! This module contains concrete implementations of the [`Driver`](crate::core::Driver)
//! trait.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryDriver;
