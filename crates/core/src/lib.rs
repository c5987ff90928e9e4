//! Core types for nanosense
//!
//! I/O-free domain pieces shared by the storage layer and the CLI: the
//! loosely-typed payload model, snapshot fingerprinting, row quality flags,
//! capture roles and timestamp handling.

pub mod capture_role;
pub mod constants;
pub mod env_config;
mod error;
pub mod quality;
pub mod snapshot;
pub mod timestamp;
pub mod value;

pub use capture_role::CaptureRole;
pub use error::*;
pub use quality::QualityFlag;
pub use snapshot::{Canonical, CanonicalMap};
pub use value::ConfigValue;
