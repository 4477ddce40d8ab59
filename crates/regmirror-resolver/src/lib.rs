mod resolve;
mod select;
mod types;
mod walk;

pub use resolve::SpecResolver;
pub use select::{select_dist_tag, select_highest_compatible};
pub use types::{ExternalRef, Resolution, ResolvedSeeds, SkipReason, SkipRecord, WalkOutcome};
pub use walk::GraphWalker;
