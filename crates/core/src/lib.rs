//! Strata Core - Shared types for the Strata query core.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - `Error`: Error type and taxonomy (`ErrorKind`) for all operations
//! - `Value`: Scalar cell values and their Arrow conversions
//! - `memory`: Caller-supplied allocators and RAII reservations
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::memory::{Allocator, LimitedAllocator, Reservation};
//! use strata_core::Value;
//!
//! let allocator: Arc<dyn Allocator> = Arc::new(LimitedAllocator::new(1024));
//! let mut reservation = Reservation::new(allocator.clone());
//! reservation.try_grow(512).unwrap();
//! assert!(reservation.try_grow(1024).is_err());
//!
//! assert_eq!(Value::from("abc").as_str(), Some("abc"));
//! ```

mod error;
pub mod memory;
mod value;

pub use error::{BoxError, Error, ErrorKind, Result};
pub use memory::{Allocator, DefaultAllocator, LimitedAllocator, Reservation};
pub use value::Value;
