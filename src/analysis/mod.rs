//! Reachability, entry points and per-declaration decisions

mod decision;
mod entry_points;
mod reachability;
mod reasons;

pub use decision::{DecisionEngine, DecisionError, TransformDecision};
pub use entry_points::{EntryPointDetector, EntrypointError, EntrypointSpec, MethodRef, ResolvedEntrypoint};
pub use reachability::{ReachabilityEngine, ReachabilityOptions, ReachabilityStats};
pub(crate) use reachability::DispatchIndex;
pub use reasons::{InclusionReason, ReasonSet, Status};

use serde::{Deserialize, Serialize};

/// Unit of retention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// A retained type keeps all of its members
    Class,
    #[default]
    Member,
}

/// Where reachability starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seeding {
    /// Entry points only; every reachable body is live
    #[default]
    Static,
    /// Executed declarations from a coverage report; only executed code is live
    Coverage,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Granularity::Class => "class",
            Granularity::Member => "member",
        })
    }
}

impl std::fmt::Display for Seeding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Seeding::Static => "static",
            Seeding::Coverage => "coverage",
        })
    }
}
