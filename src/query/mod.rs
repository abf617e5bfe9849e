pub mod engine;
pub mod resolver;

pub use engine::{ProximityEngine, SearchOutcome, SearchRequest};
pub use resolver::{LocationQuery, LocationResolver, Provenance, Resolution, ResolvedLocation};
