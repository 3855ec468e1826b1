//! Maps coverage records back onto source declarations.

use super::descriptor::{is_exact_param, params_match, MethodDescriptor};
use super::{ClassRecord, CoverageReport, MethodRecord};
use crate::analysis::InclusionReason;
use crate::graph::{
    Declaration, DeclarationId, DeclarationKind, Diagnostic, DiagnosticKind, SourceContext, TypeNesting,
    TypeTarget,
};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, trace};

/// How a method record landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(DeclarationId),
    /// Compiler-generated code with no source counterpart
    Synthetic,
    /// The class is not in the source tree
    MissingClass,
    /// No source declaration has the record's name and shape
    NoCandidate,
    /// Several equally plausible declarations and no line to separate them
    Ambiguous(Vec<DeclarationId>),
}

impl MatchOutcome {
    pub fn matched(self) -> Option<DeclarationId> {
        match self {
            MatchOutcome::Matched(id) => Some(id),
            _ => None,
        }
    }
}

/// Declarations an executed coverage report makes live
#[derive(Debug, Clone, Default)]
pub struct CoverageSeeds {
    pub seeds: Vec<(DeclarationId, InclusionReason)>,
    pub diagnostics: Vec<Diagnostic>,
    pub unmatched: usize,
}

fn synthetic_name() -> Option<&'static Regex> {
    static SYNTHETIC: OnceLock<Option<Regex>> = OnceLock::new();
    SYNTHETIC
        .get_or_init(|| Regex::new(r"^(?:lambda\$.*|access\$\d+|\$values|\$deserializeLambda\$|\$jacocoInit)$").ok())
        .as_ref()
}

/// Class names javac or the runtime invent (`Foo$$Lambda$1`)
fn synthetic_class() -> Option<&'static Regex> {
    static SYNTHETIC: OnceLock<Option<Regex>> = OnceLock::new();
    SYNTHETIC
        .get_or_init(|| Regex::new(r"\$\$|\$Lambda\$|\$\$Lambda").ok())
        .as_ref()
}

pub struct CoverageMatcher<'a> {
    context: &'a SourceContext,
}

impl<'a> CoverageMatcher<'a> {
    pub fn new(context: &'a SourceContext) -> Self {
        Self { context }
    }

    /// Source type for a class record's binary name. Anonymous and local
    /// classes carry javac's numbering, so `Outer$3` is the third
    /// anonymous class created inside `Outer`.
    pub fn match_class(&self, class: &ClassRecord) -> Option<&'a Declaration> {
        let binary = class.binary_name();
        if synthetic_class().map(|re| re.is_match(&binary)).unwrap_or(false) {
            return None;
        }
        self.context
            .get(&DeclarationId::for_type(&binary))
            .filter(|d| d.kind.is_type())
    }

    pub fn match_method(&self, class: &ClassRecord, method: &MethodRecord) -> Option<DeclarationId> {
        self.match_method_detailed(class, method).matched()
    }

    /// Like [`match_method`](Self::match_method), but only `declarations`
    /// may be returned. Types and members outside the slice count as absent.
    pub fn match_among(
        &self,
        declarations: &[&Declaration],
        class: &ClassRecord,
        method: &MethodRecord,
    ) -> Option<DeclarationId> {
        self.match_record(Some(declarations), class, method).matched()
    }

    pub fn match_method_detailed(&self, class: &ClassRecord, method: &MethodRecord) -> MatchOutcome {
        self.match_record(None, class, method)
    }

    fn match_record(
        &self,
        scope: Option<&[&Declaration]>,
        class: &ClassRecord,
        method: &MethodRecord,
    ) -> MatchOutcome {
        let in_scope = |decl: &Declaration| scope.map(|s| s.iter().any(|d| d.id == decl.id)).unwrap_or(true);
        if synthetic_name().map(|re| re.is_match(&method.name)).unwrap_or(false) {
            return MatchOutcome::Synthetic;
        }
        let Some(owner) = self.match_class(class).filter(|o| in_scope(*o)) else {
            return MatchOutcome::MissingClass;
        };
        let Ok(descriptor) = MethodDescriptor::parse(&method.descriptor) else {
            debug!("Skipping {}.{}: bad descriptor {}", class.name, method.name, method.descriptor);
            return MatchOutcome::NoCandidate;
        };

        if method.is_class_initializer() {
            let first_static = self
                .context
                .members(&owner.id)
                .find(|m| m.kind == DeclarationKind::Initializer && m.is_static && in_scope(*m));
            return MatchOutcome::Matched(first_static.unwrap_or(owner).id.clone());
        }

        if method.is_constructor() {
            let ctors: Vec<&Declaration> = self
                .context
                .constructors(&owner.id)
                .into_iter()
                .filter(|c| in_scope(*c))
                .collect();
            return self.match_constructor(owner, ctors, &descriptor, method);
        }

        let same_name: Vec<&Declaration> = self
            .context
            .members(&owner.id)
            .filter(|m| m.kind == DeclarationKind::Method && m.name == method.name && in_scope(*m))
            .collect();
        let candidates: Vec<&Declaration> = same_name
            .iter()
            .copied()
            .filter(|m| self.shape_matches(m, &descriptor, 0))
            .collect();

        if candidates.is_empty() {
            let enum_helper = owner.kind == DeclarationKind::Enum
                && matches!(method.name.as_str(), "values" | "valueOf");
            let bridge = !same_name.is_empty();
            return if enum_helper || bridge {
                MatchOutcome::Synthetic
            } else {
                MatchOutcome::NoCandidate
            };
        }
        self.pick(candidates, method)
    }

    fn match_constructor(
        &self,
        owner: &'a Declaration,
        ctors: Vec<&'a Declaration>,
        descriptor: &MethodDescriptor,
        method: &MethodRecord,
    ) -> MatchOutcome {
        if owner.is_anonymous() || ctors.is_empty() {
            return MatchOutcome::Matched(owner.id.clone());
        }

        // javac prepends the outer instance of inner classes and the
        // name/ordinal pair of enum constants
        let leading = if owner.kind == DeclarationKind::Enum {
            2
        } else if owner.is_inner_class() || self.captures_outer_instance(owner) {
            1
        } else {
            0
        };
        let candidates: Vec<&Declaration> = ctors
            .into_iter()
            .filter(|c| self.shape_matches(c, descriptor, leading))
            .collect();
        if candidates.is_empty() {
            return MatchOutcome::NoCandidate;
        }
        self.pick(candidates, method)
    }

    /// Local classes declared in instance code receive the outer instance
    fn captures_outer_instance(&self, owner: &Declaration) -> bool {
        owner.nesting == Some(TypeNesting::Local)
            && owner
                .parent
                .as_ref()
                .and_then(|p| self.context.get(p))
                .map(|p| !p.is_static)
                .unwrap_or(false)
    }

    /// Compare erased source parameters with the descriptor after dropping
    /// `leading` synthetic parameters. Local classes may also receive
    /// captured variables after the declared ones.
    fn shape_matches(&self, decl: &Declaration, descriptor: &MethodDescriptor, leading: usize) -> bool {
        let Some(params) = self.qualified_params(decl) else {
            return false;
        };
        if descriptor.params.len() < leading {
            return false;
        }
        let type_vars = self.context.type_variables_in_scope(&decl.id);
        let jvm = &descriptor.params[leading..];
        let local = self
            .context
            .owner_type(&decl.id)
            .map(|o| o.nesting == Some(TypeNesting::Local))
            .unwrap_or(false);
        if local && decl.kind == DeclarationKind::Constructor && jvm.len() > params.len() {
            return params_match(&params, &jvm[..params.len()], &type_vars);
        }
        params_match(&params, jvm, &type_vars)
    }

    /// Erased parameter types, qualified through the declaring unit's
    /// imports and package where they resolve. Names that only resolve by
    /// guessing through a wildcard import keep their written spelling.
    fn qualified_params(&self, decl: &Declaration) -> Option<Vec<String>> {
        let signature = decl.signature.as_ref()?;
        let params = signature
            .erased_params()
            .into_iter()
            .map(|param| {
                let element = param.trim_end_matches("[]").trim_end();
                let dims = param[element.len()..].to_string();
                let resolution = self.context.resolve_type_name(element, &decl.id);
                match resolution.target {
                    TypeTarget::Source(id) => format!("{}{}", id, dims),
                    TypeTarget::External(name) if !resolution.inferred && name.contains('.') => {
                        format!("{}{}", name, dims)
                    }
                    _ => param,
                }
            })
            .collect();
        Some(params)
    }

    /// Whether every parameter of `decl` names its descriptor type outright
    fn is_exact(&self, decl: &Declaration) -> bool {
        let type_vars = self.context.type_variables_in_scope(&decl.id);
        self.qualified_params(decl)
            .map(|params| params.iter().all(|p| is_exact_param(p, &type_vars)))
            .unwrap_or(false)
    }

    /// Among descriptor-compatible candidates: the single one, else those
    /// whose parameters all name their type outright, then the one whose
    /// range holds the record's line
    fn pick(&self, candidates: Vec<&Declaration>, method: &MethodRecord) -> MatchOutcome {
        if let [only] = candidates.as_slice() {
            return MatchOutcome::Matched(only.id.clone());
        }
        let exact: Vec<&Declaration> = candidates.iter().copied().filter(|c| self.is_exact(c)).collect();
        let candidates = if exact.is_empty() { candidates } else { exact };
        if let [only] = candidates.as_slice() {
            return MatchOutcome::Matched(only.id.clone());
        }
        if let Some(line) = method.line {
            let containing: Vec<&&Declaration> = candidates
                .iter()
                .filter(|c| c.location.covers_line(line as usize))
                .collect();
            if let [only] = containing.as_slice() {
                return MatchOutcome::Matched(only.id.clone());
            }
        }
        MatchOutcome::Ambiguous(candidates.iter().map(|c| c.id.clone()).collect())
    }

    /// Every executed method record, matched; unmatched and ambiguous
    /// records become diagnostics
    pub fn seeds(&self, report: &CoverageReport) -> CoverageSeeds {
        let mut result = CoverageSeeds::default();
        for (class, method) in report.executed_methods() {
            match self.match_method_detailed(class, method) {
                MatchOutcome::Matched(id) => {
                    trace!("{}.{}{} -> {}", class.name, method.name, method.descriptor, id);
                    result.seeds.push((id, InclusionReason::CoverageExecuted));
                }
                MatchOutcome::Synthetic => {}
                MatchOutcome::MissingClass => {
                    result.unmatched += 1;
                    trace!("No source class for {}", class.name);
                }
                MatchOutcome::NoCandidate => {
                    result.unmatched += 1;
                    result.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::UnmatchedCoverage,
                        None,
                        format!("no declaration for {}.{}{}", class.binary_name(), method.name, method.descriptor),
                    ));
                }
                MatchOutcome::Ambiguous(candidates) => {
                    result.unmatched += 1;
                    let names: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
                    result.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::AmbiguousCoverage,
                        None,
                        format!(
                            "{}.{}{} matches {}",
                            class.binary_name(),
                            method.name,
                            method.descriptor,
                            names.join(", ")
                        ),
                    ));
                }
            }
        }
        result.seeds.sort();
        result.seeds.dedup();
        debug!(
            "Coverage seeding: {} declarations, {} unmatched records",
            result.seeds.len(),
            result.unmatched
        );
        result
    }
}
