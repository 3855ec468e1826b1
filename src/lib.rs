//! testprune - reduce a Java codebase to what one test needs
//!
//! Given an entry test method, the library keeps every declaration the test
//! can reach, stubs the bodies that only have to exist for the rest to
//! compile, and deletes everything else.
//!
//! # Architecture
//!
//! The reduction pipeline consists of:
//! 1. **File Discovery** - Find all .java files under the source roots
//! 2. **Parsing** - Parse source files using tree-sitter
//! 3. **Source Context** - Index declarations and resolve references into a graph
//! 4. **Reachability** - Collect typed inclusion reasons from the entry point,
//!    optionally seeded from a JaCoCo coverage report
//! 5. **Decisions** - Derive keep/stub/remove per declaration
//! 6. **Emission** - Rewrite each compilation unit and write it out

pub mod analysis;
pub mod cache;
pub mod config;
pub mod coverage;
pub mod discovery;
pub mod graph;
pub mod parser;
pub mod reducer;
pub mod refactor;
pub mod report;

pub use analysis::{
    DecisionEngine, EntryPointDetector, EntrypointSpec, Granularity, InclusionReason, MethodRef,
    ReachabilityEngine, Seeding, TransformDecision,
};
pub use cache::RunCache;
pub use config::Config;
pub use coverage::{parse_coverage_file, parse_coverage_files, CoverageMatcher, CoverageParser, CoverageReport};
pub use discovery::FileFinder;
pub use graph::{Declaration, DeclarationId, DeclarationKind, GraphBuilder, ParallelGraphBuilder, SourceContext};
pub use reducer::{ReduceError, Reducer, ReducerKind, ReducerOptions, Reduction};
pub use refactor::{EmittedUnit, Emitter, OutputLayout};
pub use report::{ReportFormat, Reporter};
