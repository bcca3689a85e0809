//! Tiered routing decision engine
//!
//! Routes each generation request to the `small`, `medium` or `api` tier
//! using static rules, heuristic overrides, a task classifier and
//! context-window safety, and records how the tier was chosen.

pub mod classifier;
pub mod confidence;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod policy;

pub use classifier::*;
pub use confidence::*;
pub use config::*;
pub use decision::*;
pub use engine::*;
pub use error::*;
pub use policy::*;
