//! feedloom domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `dates`: Publish-date canonicalization
//! - `usecases`: Update orchestration, subscription management, reports

pub mod dates;
pub mod model;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
