//! Federated search across academic providers.
//!
//! `types` holds the normalized data model shared by every connector, while
//! `engine` runs the parallel fan-out and merge. Deduplication and scoring are
//! pure functions over result lists so they can be exercised in isolation.

pub mod dedup;
mod engine;
pub mod normalize;
pub mod scoring;
mod types;

pub use engine::{aggregate, FederatedSearch, ProviderOutcome};
pub use types::*;
