// Reducer - drives entrypoint resolution, seeding, reachability,
// decisions and emission for one source context

mod verify;

pub use verify::{
    CompileOutcome, CompileRequest, Compiler, JUnitRunner, JavacCompiler, TestOutcome, TestRequest,
    TestRunner,
};

use crate::analysis::{
    DecisionEngine, DecisionError, EntryPointDetector, EntrypointError, EntrypointSpec, Granularity,
    InclusionReason, ReachabilityEngine, ReachabilityOptions, ResolvedEntrypoint, Seeding, TransformDecision,
};
use crate::cache::RunCache;
use crate::config::Config;
use crate::coverage::{CoverageMatcher, CoverageReport};
use crate::graph::{DeclarationId, Diagnostic, SourceContext};
use crate::refactor::{EmitError, EmittedUnit, Emitter, OutputLayout};
use miette::Diagnostic as MietteDiagnostic;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, MietteDiagnostic)]
pub enum ReduceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Entrypoint(#[from] EntrypointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Emit(#[from] EmitError),

    #[error("coverage seeding needs a coverage report")]
    #[diagnostic(
        code(testprune::reduce::missing_coverage),
        help("pass --coverage <jacoco.xml> or set `coverage_report` in the config")
    )]
    MissingCoverage,

    #[error("entrypoint {id} would be {decision}")]
    #[diagnostic(code(testprune::reduce::entrypoint_dropped))]
    EntrypointDropped {
        id: DeclarationId,
        decision: TransformDecision,
    },
}

/// The four supported reduction modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReducerKind {
    ClassStatic,
    MemberStatic,
    ClassCoverage,
    MemberCoverage,
}

impl ReducerKind {
    pub fn new(granularity: Granularity, seeding: Seeding) -> Self {
        match (granularity, seeding) {
            (Granularity::Class, Seeding::Static) => ReducerKind::ClassStatic,
            (Granularity::Member, Seeding::Static) => ReducerKind::MemberStatic,
            (Granularity::Class, Seeding::Coverage) => ReducerKind::ClassCoverage,
            (Granularity::Member, Seeding::Coverage) => ReducerKind::MemberCoverage,
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            ReducerKind::ClassStatic | ReducerKind::ClassCoverage => Granularity::Class,
            ReducerKind::MemberStatic | ReducerKind::MemberCoverage => Granularity::Member,
        }
    }

    pub fn seeding(&self) -> Seeding {
        match self {
            ReducerKind::ClassStatic | ReducerKind::MemberStatic => Seeding::Static,
            ReducerKind::ClassCoverage | ReducerKind::MemberCoverage => Seeding::Coverage,
        }
    }
}

impl std::fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.granularity(), self.seeding())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducerOptions {
    pub granularity: Granularity,
    pub seeding: Seeding,
    pub parallelism: usize,
    pub assertions_enabled: bool,
}

impl Default for ReducerOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::Member,
            seeding: Seeding::Static,
            parallelism: 1,
            assertions_enabled: false,
        }
    }
}

impl ReducerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            granularity: config.reduction.granularity,
            seeding: config.reduction.seeding,
            parallelism: config.reduction.parallelism.max(1),
            assertions_enabled: config.assertions_enabled,
        }
    }

    pub fn kind(&self) -> ReducerKind {
        ReducerKind::new(self.granularity, self.seeding)
    }

    fn reachability(&self) -> ReachabilityOptions {
        ReachabilityOptions {
            granularity: self.granularity,
            seeding: self.seeding,
            assertions_enabled: self.assertions_enabled,
            parallelism: self.parallelism.max(1),
        }
    }
}

/// Counters of one reduction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReductionStats {
    pub declarations: usize,
    pub seeds: usize,
    pub coverage_seeds: usize,
    pub coverage_unmatched: usize,
    pub retained: usize,
    pub live: usize,
    pub rounds: usize,
    pub kept: usize,
    pub stubbed: usize,
    pub removed: usize,
    pub units: usize,
    pub empty_units: usize,
    pub elapsed_ms: u128,
}

/// Everything one `reduce` call produced
#[derive(Debug, Clone, Serialize)]
pub struct Reduction {
    pub kind: ReducerKind,
    pub entry_methods: Vec<DeclarationId>,
    pub source_root: Option<PathBuf>,
    pub decisions: BTreeMap<DeclarationId, TransformDecision>,
    /// Final reason sets of every retained declaration
    pub reasons: BTreeMap<DeclarationId, BTreeSet<InclusionReason>>,
    #[serde(skip)]
    pub units: Vec<EmittedUnit>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ReductionStats,
}

impl Reduction {
    pub fn decision(&self, id: &DeclarationId) -> Option<TransformDecision> {
        self.decisions.get(id).copied()
    }

    /// Ids with the given decision, in id order
    pub fn with_decision(&self, decision: TransformDecision) -> impl Iterator<Item = &DeclarationId> {
        self.decisions
            .iter()
            .filter(move |(_, d)| **d == decision)
            .map(|(id, _)| id)
    }

    pub fn unit(&self, path: &std::path::Path) -> Option<&EmittedUnit> {
        self.units.iter().find(|u| u.source_path == path)
    }

    /// Write every non-empty unit under the layout
    pub fn write(&self, layout: &OutputLayout) -> Result<Vec<PathBuf>, ReduceError> {
        let mut written = Vec::new();
        for unit in &self.units {
            if let Some(path) = unit.write(layout)? {
                debug!("Wrote {}", path.display());
                written.push(path);
            }
        }
        info!("Wrote {} reduced units", written.len());
        Ok(written)
    }
}

/// Owns the run cache for reductions over one source context
pub struct Reducer<'a> {
    context: &'a SourceContext,
    options: ReducerOptions,
    source_roots: Vec<PathBuf>,
    cache: RunCache,
}

impl<'a> Reducer<'a> {
    pub fn new(context: &'a SourceContext, options: ReducerOptions) -> Self {
        Self {
            context,
            options,
            source_roots: Vec::new(),
            cache: RunCache::new(),
        }
    }

    /// Source roots the entrypoint's root is picked from
    pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }

    pub fn options(&self) -> &ReducerOptions {
        &self.options
    }

    pub fn kind(&self) -> ReducerKind {
        self.options.kind()
    }

    pub fn cache(&self) -> &RunCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn reduce(
        &self,
        entrypoint: &EntrypointSpec,
        coverage: Option<&CoverageReport>,
    ) -> Result<Reduction, ReduceError> {
        let start = Instant::now();
        if !self.cache.is_empty() {
            debug!("Clearing cache left by a previous reduction");
            self.cache.clear();
        }
        info!("Reducing for {} ({})", entrypoint_label(entrypoint), self.kind());

        let detector = EntryPointDetector::new(self.context);
        let resolved = detector.resolve(entrypoint, &self.source_roots)?;
        let mut stats = ReductionStats {
            declarations: self.context.declaration_ids().len(),
            ..ReductionStats::default()
        };

        let mut seeds = detector.seeds(&resolved);
        if self.options.seeding == Seeding::Coverage {
            let report = coverage.ok_or(ReduceError::MissingCoverage)?;
            let matched = CoverageMatcher::new(self.context).seeds(report);
            stats.coverage_seeds = matched.seeds.len();
            stats.coverage_unmatched = matched.unmatched;
            for diagnostic in matched.diagnostics {
                self.cache.record_diagnostic(diagnostic);
            }
            seeds.extend(matched.seeds);
        } else if coverage.is_some() {
            warn!("Ignoring coverage report under static seeding");
        }

        let engine = ReachabilityEngine::new(self.context, &self.cache, self.options.reachability());
        let reach = engine.run(&seeds);
        stats.seeds = reach.seeds;
        stats.retained = reach.retained;
        stats.live = reach.live;
        stats.rounds = reach.rounds;

        let decisions = DecisionEngine::new(self.context, &self.cache)
            .decide_all(&self.context.declaration_ids(), self.options.parallelism)?;
        self.check_entrypoint(&resolved, &decisions)?;

        for decision in decisions.values() {
            match decision {
                TransformDecision::NoOp => stats.kept += 1,
                TransformDecision::Stub => stats.stubbed += 1,
                TransformDecision::Remove => stats.removed += 1,
            }
        }

        let emitter = Emitter::new(self.context);
        let units = self
            .context
            .units()
            .iter()
            .map(|unit| {
                emitter.emit_unit(unit, |id| {
                    decisions.get(id).copied().unwrap_or(TransformDecision::NoOp)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        stats.units = units.len();
        stats.empty_units = units.iter().filter(|u| u.empty).count();

        let mut diagnostics: Vec<Diagnostic> = self.context.diagnostics().cloned().collect();
        diagnostics.extend(self.cache.diagnostics());
        diagnostics.sort();
        diagnostics.dedup();

        stats.elapsed_ms = start.elapsed().as_millis();
        info!(
            "Reduction done: {} kept, {} stubbed, {} removed, {} empty units",
            stats.kept, stats.stubbed, stats.removed, stats.empty_units
        );

        Ok(Reduction {
            kind: self.kind(),
            entry_methods: resolved.methods,
            source_root: resolved.source_root,
            decisions,
            reasons: self.cache.snapshot(),
            units,
            diagnostics,
            stats,
        })
    }

    fn check_entrypoint(
        &self,
        resolved: &ResolvedEntrypoint,
        decisions: &BTreeMap<DeclarationId, TransformDecision>,
    ) -> Result<(), ReduceError> {
        for id in resolved.methods.iter().chain(&resolved.classes) {
            let decision = decisions.get(id).copied().unwrap_or(TransformDecision::Remove);
            if decision != TransformDecision::NoOp {
                return Err(ReduceError::EntrypointDropped {
                    id: id.clone(),
                    decision,
                });
            }
        }
        Ok(())
    }
}

fn entrypoint_label(spec: &EntrypointSpec) -> String {
    match spec {
        EntrypointSpec::Method(m) => m.to_string(),
        EntrypointSpec::Tests(ms) => format!("{} triggering tests", ms.len()),
    }
}
