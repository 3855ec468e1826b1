//! Per-declaration verdicts derived from the final reason sets.

use super::reasons::InclusionReason;
use super::DispatchIndex;
use crate::cache::{CacheError, RunCache};
use crate::graph::{Declaration, DeclarationId, DeclarationKind, SourceContext};
use miette::Diagnostic;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

/// What the emitter does with a declaration, ordered by how much of it
/// survives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformDecision {
    Remove,
    Stub,
    NoOp,
}

impl TransformDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformDecision::Remove => "REMOVE",
            TransformDecision::Stub => "STUB",
            TransformDecision::NoOp => "NO_OP",
        }
    }
}

impl std::fmt::Display for TransformDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum DecisionError {
    #[error("no declaration `{0}` in the source context")]
    #[diagnostic(code(testprune::decision::unknown_declaration))]
    UnknownDeclaration(DeclarationId),

    #[error("cannot decide `{id}`: {kind} outside a type")]
    #[diagnostic(code(testprune::decision::unsupported_kind))]
    UnsupportedKind { id: DeclarationId, kind: &'static str },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),
}

pub struct DecisionEngine<'a> {
    context: &'a SourceContext,
    cache: &'a RunCache,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(context: &'a SourceContext, cache: &'a RunCache) -> Self {
        Self { context, cache }
    }

    /// Memoized decision for one declaration
    pub fn decide(&self, id: &DeclarationId) -> Result<TransformDecision, DecisionError> {
        if let Some(decision) = self.cache.memo_get(id) {
            return Ok(decision);
        }
        let decision = self.evaluate(id, true)?;
        Ok(self.cache.memo_insert(id, decision)?)
    }

    /// Same as [`decide`](Self::decide) without touching the memo
    pub fn decide_no_cache(&self, id: &DeclarationId) -> Result<TransformDecision, DecisionError> {
        self.evaluate(id, false)
    }

    /// Decide every id, on a rayon pool when `parallelism > 1`
    pub fn decide_all(
        &self,
        ids: &[DeclarationId],
        parallelism: usize,
    ) -> Result<BTreeMap<DeclarationId, TransformDecision>, DecisionError> {
        let decide = |id: &DeclarationId| self.decide(id).map(|d| (id.clone(), d));
        if parallelism > 1 {
            match ThreadPoolBuilder::new().num_threads(parallelism).build() {
                Ok(pool) => {
                    return pool.install(|| ids.par_iter().map(decide).collect());
                }
                Err(e) => warn!("Falling back to sequential decisions: {}", e),
            }
        }
        ids.iter().map(decide).collect()
    }

    /// True exactly when nothing keeps the declaration
    pub fn is_unused_for_removal(&self, id: &DeclarationId) -> bool {
        if !self.cache.reasons(id).is_empty() {
            return false;
        }
        !self
            .context
            .get(id)
            .map(|decl| self.structurally_required(decl))
            .unwrap_or(false)
    }

    fn evaluate(&self, id: &DeclarationId, memo: bool) -> Result<TransformDecision, DecisionError> {
        let decl = self
            .context
            .get(id)
            .ok_or_else(|| DecisionError::UnknownDeclaration(id.clone()))?;

        if decl.kind == DeclarationKind::Import {
            return self.decide_import(decl, memo);
        }

        let own = self.local_decision(decl, memo)?;
        if decl.kind != DeclarationKind::Method {
            return Ok(own);
        }
        if own == TransformDecision::Remove && !self.dispatch_possible(decl, memo)? {
            return Ok(own);
        }

        // an override is kept at least as fully as any retained base
        let mut decision = own;
        for base in self.context.overridden_bases(id) {
            if !self.cache.is_retained(base) {
                continue;
            }
            if let Some(base_decl) = self.context.get(base) {
                decision = decision.max(self.local_decision(base_decl, memo)?);
            }
        }
        if decision != own {
            debug!("{} raised from {} to {} by its bases", id, own, decision);
        }
        Ok(decision)
    }

    /// A removed method can still be reached by a virtual call when its
    /// owner survives and it or one of its subtypes is instantiated
    fn dispatch_possible(&self, decl: &Declaration, memo: bool) -> Result<bool, DecisionError> {
        let Some(owner) = self.context.owner_type(&decl.id) else {
            return Ok(false);
        };
        let owner_decision = if memo {
            self.decide(&owner.id)?
        } else {
            self.decide_no_cache(&owner.id)?
        };
        if owner_decision == TransformDecision::Remove {
            return Ok(false);
        }
        Ok(DispatchIndex::new(self.context, self.cache).reaches(&owner.id))
    }

    /// Decision from the declaration's own reasons and its owner
    fn local_decision(&self, decl: &Declaration, memo: bool) -> Result<TransformDecision, DecisionError> {
        let reasons = self.cache.reasons(&decl.id);
        if decl.kind.is_type() {
            return Ok(presence(&reasons));
        }

        let owner = self
            .context
            .owner_type(&decl.id)
            .ok_or_else(|| DecisionError::UnsupportedKind {
                id: decl.id.clone(),
                kind: decl.kind.display_name(),
            })?;
        let owner_decision = if memo {
            self.decide(&owner.id)?
        } else {
            self.decide_no_cache(&owner.id)?
        };
        if owner_decision == TransformDecision::Remove {
            return Ok(TransformDecision::Remove);
        }
        let element = owner.kind == DeclarationKind::Annotation && decl.kind == DeclarationKind::Method;
        if decl.kind == DeclarationKind::EnumCase || element {
            return Ok(owner_decision);
        }

        if reasons.is_empty() {
            return Ok(if self.structurally_required(decl) {
                TransformDecision::Stub
            } else {
                TransformDecision::Remove
            });
        }
        if reasons.iter().any(InclusionReason::is_live) {
            Ok(TransformDecision::NoOp)
        } else {
            Ok(TransformDecision::Stub)
        }
    }

    /// A concrete retained class has to keep implementing retained
    /// abstract methods of its source supertypes
    fn structurally_required(&self, decl: &Declaration) -> bool {
        if decl.kind != DeclarationKind::Method || decl.is_abstract {
            return false;
        }
        let Some(owner) = self.context.owner_type(&decl.id) else {
            return false;
        };
        if owner.kind != DeclarationKind::Class || owner.is_abstract || !self.cache.is_retained(&owner.id) {
            return false;
        }
        self.context.overridden_bases(&decl.id).iter().any(|base| {
            self.cache.is_retained(base)
                && self.context.get(base).map(|b| b.is_abstract).unwrap_or(false)
        })
    }

    fn decide_import(&self, decl: &Declaration, memo: bool) -> Result<TransformDecision, DecisionError> {
        let reasons = self.cache.reasons(&decl.id);
        if reasons.is_empty() {
            return Ok(TransformDecision::Remove);
        }
        let decide = |id: &DeclarationId| {
            if memo {
                self.decide(id)
            } else {
                self.decide_no_cache(id)
            }
        };

        // single static imports need the member itself
        if let Some(info) = decl.import.as_ref().filter(|i| i.is_static && !i.on_demand) {
            if let (Some(owner), Some(name)) = (
                self.context.get_type_by_qualified_name(info.qualifier()),
                info.simple_name(),
            ) {
                let members: Vec<DeclarationId> = self
                    .context
                    .members(&owner.id)
                    .filter(|m| m.name == name)
                    .map(|m| m.id.clone())
                    .chain(self.context.nested_types(&owner.id).filter(|t| t.name == name).map(|t| t.id.clone()))
                    .collect();
                if !members.is_empty() {
                    for member in &members {
                        if decide(member)? != TransformDecision::Remove {
                            return Ok(TransformDecision::NoOp);
                        }
                    }
                    return Ok(TransformDecision::Remove);
                }
            }
        }

        let targets = self.context.import_source_targets(&decl.id);
        if targets.is_empty() {
            return Ok(TransformDecision::NoOp);
        }
        for target in &targets {
            if decide(target)? != TransformDecision::Remove {
                return Ok(TransformDecision::NoOp);
            }
        }
        Ok(TransformDecision::Remove)
    }
}

fn presence(reasons: &BTreeSet<InclusionReason>) -> TransformDecision {
    if reasons.is_empty() {
        TransformDecision::Remove
    } else {
        TransformDecision::NoOp
    }
}
