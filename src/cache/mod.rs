//! Run-level cache shared by reachability and decision evaluation
//!
//! Holds one analysis worth of reason sets, memoized decisions and soft
//! diagnostics. Every operation is an idempotent append, so workers on a
//! rayon pool can share a single instance without coordination.

use crate::analysis::{InclusionReason, ReasonSet, Status, TransformDecision};
use crate::graph::{Diagnostic, DeclarationId};
use dashmap::{DashMap, DashSet};
use miette::Diagnostic as MietteDiagnostic;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Cache errors
#[derive(Error, Debug, MietteDiagnostic, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Conflicting decisions memoized for {id}: {existing} vs {attempted}")]
    #[diagnostic(
        code(testprune::cache::memo_conflict),
        help("decisions must be a pure function of the final reason sets")
    )]
    MemoConflict {
        id: DeclarationId,
        existing: TransformDecision,
        attempted: TransformDecision,
    },
}

#[derive(Debug, Default)]
pub struct RunCache {
    reasons: DashMap<DeclarationId, ReasonSet>,
    decisions: DashMap<DeclarationId, TransformDecision>,
    diagnostics: DashSet<Diagnostic>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reason; returns the new status when the declaration's
    /// status rose
    pub fn add_reason(&self, id: &DeclarationId, reason: InclusionReason) -> Option<Status> {
        self.reasons.entry(id.clone()).or_default().insert(reason)
    }

    /// Reasons recorded for a declaration, in canonical order
    pub fn reasons(&self, id: &DeclarationId) -> BTreeSet<InclusionReason> {
        self.reasons
            .get(id)
            .map(|set| set.reasons().clone())
            .unwrap_or_default()
    }

    pub fn status(&self, id: &DeclarationId) -> Status {
        self.reasons
            .get(id)
            .map(|set| set.status())
            .unwrap_or_default()
    }

    pub fn is_retained(&self, id: &DeclarationId) -> bool {
        self.status(id).retained
    }

    /// Every declaration holding at least one reason, sorted
    pub fn retained_ids(&self) -> Vec<DeclarationId> {
        let mut ids: Vec<DeclarationId> = self
            .reasons
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn retained_count(&self) -> usize {
        self.reasons.iter().filter(|e| !e.value().is_empty()).count()
    }

    pub fn memo_get(&self, id: &DeclarationId) -> Option<TransformDecision> {
        self.decisions.get(id).map(|d| *d)
    }

    /// Record a decision. The first write wins; a different later write
    /// is reported as a conflict.
    pub fn memo_insert(
        &self,
        id: &DeclarationId,
        decision: TransformDecision,
    ) -> Result<TransformDecision, CacheError> {
        let existing = *self.decisions.entry(id.clone()).or_insert(decision);
        if existing != decision {
            return Err(CacheError::MemoConflict {
                id: id.clone(),
                existing,
                attempted: decision,
            });
        }
        Ok(existing)
    }

    pub fn memo_len(&self) -> usize {
        self.decisions.len()
    }

    pub fn record_diagnostic(&self, diagnostic: Diagnostic) {
        self.diagnostics.insert(diagnostic);
    }

    /// Diagnostics in canonical order
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut all: Vec<Diagnostic> = self.diagnostics.iter().map(|d| d.clone()).collect();
        all.sort();
        all
    }

    /// Reason sets of every retained declaration
    pub fn snapshot(&self) -> BTreeMap<DeclarationId, BTreeSet<InclusionReason>> {
        self.reasons
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), entry.value().reasons().clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.reasons.clear();
        self.decisions.clear();
        self.diagnostics.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty() && self.decisions.is_empty() && self.diagnostics.is_empty()
    }
}
