//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` holds validated endpoint metadata, enabled grants, client
//! authentication preferences, and quirks. `strategy` defines [`ProviderStrategy`], the
//! hook that decorates token requests and maps provider errors into the engine taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
