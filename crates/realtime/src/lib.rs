//! # Realtime Core
//!
//! Core modules shared by the fleet tracking crates: the domain error type and
//! the provider traits through which external services are reached.

mod error;
mod provider;

pub use crate::error::*;
pub use crate::provider::*;
