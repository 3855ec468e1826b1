//! Turns per-declaration decisions into rewritten compilation units.

use super::editor::{EditError, SourceEditor};
use crate::analysis::TransformDecision;
use crate::graph::{
    is_object_method, ByteRange, CompilationUnit, Declaration, DeclarationId, DeclarationKind,
    SourceContext, SuperRelation, TypeNesting,
};
use crate::parser::JavaParser;
use miette::Diagnostic;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Body every stubbed method and constructor ends in
pub const STUB_THROW: &str = "throw new java.lang.AssertionError(\"unreachable\");";

#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    #[error("cannot rewrite {path}")]
    #[diagnostic(code(testprune::emit::edit))]
    Edit {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("rewritten {path} has {errors} syntax error node(s)")]
    #[diagnostic(
        code(testprune::emit::invalid_output),
        help("the original unit parsed cleanly; this is a bug in the emitter")
    )]
    InvalidOutput { path: PathBuf, errors: usize },

    #[error("{path} is not under any source root of the output layout")]
    #[diagnostic(code(testprune::emit::unmapped))]
    Unmapped { path: PathBuf },

    #[error("failed to write {path}")]
    #[diagnostic(code(testprune::emit::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Maps each source root onto the directory its rewritten units go to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputLayout {
    mappings: Vec<(PathBuf, PathBuf)>,
}

impl OutputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self::new().with_root(source_root, output_root)
    }

    pub fn with_root(mut self, source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        self.mappings.push((source_root.into(), output_root.into()));
        self
    }

    pub fn mappings(&self) -> &[(PathBuf, PathBuf)] {
        &self.mappings
    }

    /// Output path of a unit, resolved against the deepest matching
    /// source root
    pub fn map(&self, path: &Path) -> Option<PathBuf> {
        self.mappings
            .iter()
            .filter_map(|(src, out)| path.strip_prefix(src).ok().map(|rel| (src, out.join(rel))))
            .max_by_key(|(src, _)| src.components().count())
            .map(|(_, mapped)| mapped)
    }
}

/// One rewritten compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedUnit {
    pub source_path: PathBuf,
    pub contents: String,
    /// Every top-level type was removed; the unit is not written
    pub empty: bool,
    pub removed: usize,
    pub stubbed: usize,
}

impl EmittedUnit {
    pub fn is_unchanged(&self, original: &str) -> bool {
        !self.empty && self.contents == original
    }

    /// Write the unit under the layout. Empty units are skipped and any
    /// stale copy at the output path is left alone.
    pub fn write(&self, layout: &OutputLayout) -> Result<Option<PathBuf>, EmitError> {
        if self.empty {
            return Ok(None);
        }
        let target = layout.map(&self.source_path).ok_or_else(|| EmitError::Unmapped {
            path: self.source_path.clone(),
        })?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EmitError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&target, &self.contents).map_err(|source| EmitError::Io {
            path: target.clone(),
            source,
        })?;
        Ok(Some(target))
    }
}

/// Source-level default for a stubbed field initializer
pub fn default_value(field_type: &str) -> &'static str {
    match field_type.trim() {
        "byte" | "short" | "int" => "0",
        "long" => "0L",
        "float" => "0.0f",
        "double" => "0.0",
        "char" => "'\\u0000'",
        "boolean" => "false",
        _ => "null",
    }
}

pub struct Emitter<'a> {
    context: &'a SourceContext,
    parser: JavaParser,
    verify: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(context: &'a SourceContext) -> Self {
        Self {
            context,
            parser: JavaParser::new(),
            verify: true,
        }
    }

    /// Skip the re-parse of rewritten units
    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn emit_unit<F>(&self, unit: &CompilationUnit, decide: F) -> Result<EmittedUnit, EmitError>
    where
        F: Fn(&DeclarationId) -> TransformDecision,
    {
        let mut emitted = EmittedUnit {
            source_path: unit.path.clone(),
            contents: String::new(),
            empty: false,
            removed: 0,
            stubbed: 0,
        };

        if !unit.types.is_empty() && unit.types.iter().all(|t| decide(t) == TransformDecision::Remove) {
            emitted.empty = true;
            emitted.removed = unit.declarations.len();
            debug!("{}: every type removed", unit.path.display());
            return Ok(emitted);
        }

        let source: &str = &unit.source;
        let mut editor = SourceEditor::new(source);
        let mut groups: BTreeMap<ByteRange, Vec<&Declaration>> = BTreeMap::new();

        for id in &unit.declarations {
            let Some(decl) = self.context.get(id) else {
                continue;
            };
            let decision = decide(id);
            match decision {
                TransformDecision::Remove => emitted.removed += 1,
                TransformDecision::Stub => emitted.stubbed += 1,
                TransformDecision::NoOp => {}
            }

            if let Some(group) = decl.extent.field_group {
                groups.entry(group.span).or_default().push(decl);
                continue;
            }

            match decision {
                TransformDecision::Remove => self.remove(&mut editor, decl),
                TransformDecision::Stub => self.stub(&mut editor, decl, source),
                TransformDecision::NoOp => {}
            }

            if decision != TransformDecision::Remove {
                if decl.kind.is_type() {
                    self.strip_removed_interfaces(&mut editor, decl, source, &decide);
                } else if decl.kind == DeclarationKind::Method {
                    self.strip_unsatisfiable_override(&mut editor, decl, source, &decide);
                }
            }
        }

        for (span, mut members) in groups {
            members.sort_by_key(|d| d.extent.field_group.map(|g| g.index));
            self.rewrite_field_group(&mut editor, span, &members, source, &decide);
        }

        emitted.contents = editor.apply().map_err(|source| EmitError::Edit {
            path: unit.path.clone(),
            source,
        })?;

        if self.verify && unit.syntax_errors == 0 {
            let errors = self
                .parser
                .count_syntax_errors(&emitted.contents)
                .unwrap_or(usize::MAX);
            if errors > 0 {
                warn!("{}: rewritten source does not parse", unit.path.display());
                return Err(EmitError::InvalidOutput {
                    path: unit.path.clone(),
                    errors,
                });
            }
        }

        Ok(emitted)
    }

    fn remove(&self, editor: &mut SourceEditor, decl: &Declaration) {
        // anonymous classes are expressions; their fate follows the enclosing code
        if decl.nesting == Some(TypeNesting::Anonymous) || decl.extent.full.is_empty() {
            return;
        }
        editor.remove_lines_of(&decl.id, decl.extent.full);
    }

    fn stub(&self, editor: &mut SourceEditor, decl: &Declaration, source: &str) {
        match decl.kind {
            DeclarationKind::Method => {
                if let Some(body) = decl.extent.body {
                    editor.replace(&decl.id, body, format!("{{ {} }}", STUB_THROW));
                }
            }
            DeclarationKind::Constructor => {
                let Some(body) = decl.extent.body else {
                    return;
                };
                let replacement = match decl.extent.ctor_invocation {
                    Some(call) => {
                        let text = source[call.start..call.end].trim();
                        let terminator = if text.ends_with(';') { "" } else { ";" };
                        format!("{{ {}{} {} }}", text, terminator, STUB_THROW)
                    }
                    None => format!("{{ {} }}", STUB_THROW),
                };
                editor.replace(&decl.id, body, replacement);
            }
            DeclarationKind::Initializer => {
                if let Some(body) = decl.extent.body {
                    editor.replace(&decl.id, body, "{}");
                }
            }
            DeclarationKind::Field => {
                if let (Some(init), Some(ty)) = (decl.extent.initializer, decl.field_type.as_deref()) {
                    editor.replace(&decl.id, init, default_value(ty));
                }
            }
            _ => {}
        }
    }

    /// Multi-declarator fields share one statement: rewrite its declarator
    /// list in one edit, or drop the statement when nothing survives
    fn rewrite_field_group<F>(
        &self,
        editor: &mut SourceEditor,
        span: ByteRange,
        members: &[&Declaration],
        source: &str,
        decide: &F,
    ) where
        F: Fn(&DeclarationId) -> TransformDecision,
    {
        let (Some(first), Some(last)) = (members.first(), members.last()) else {
            return;
        };
        let decisions: Vec<TransformDecision> = members.iter().map(|d| decide(&d.id)).collect();

        if decisions.iter().all(|d| *d == TransformDecision::Remove) {
            editor.remove_lines_of(&first.id, span);
            return;
        }
        if decisions.iter().all(|d| *d != TransformDecision::Remove) {
            for (decl, decision) in members.iter().zip(&decisions) {
                if *decision == TransformDecision::Stub {
                    self.stub(editor, decl, source);
                }
            }
            return;
        }

        let kept: Vec<String> = members
            .iter()
            .zip(&decisions)
            .filter(|(_, d)| **d != TransformDecision::Remove)
            .map(|(decl, d)| declarator_text(decl, *d, source))
            .collect();
        let list = ByteRange::new(first.extent.full.start, last.extent.full.end);
        editor.replace(&first.id, list, kept.join(", "));
    }

    /// Drop removed source interfaces from `implements`/`extends`, and the
    /// keyword with them when the list empties
    fn strip_removed_interfaces<F>(&self, editor: &mut SourceEditor, decl: &Declaration, source: &str, decide: &F)
    where
        F: Fn(&DeclarationId) -> TransformDecision,
    {
        let Some(clause) = decl.extent.interface_clause else {
            return;
        };
        let links = self.context.supertypes(&decl.id);
        let mut kept = Vec::new();
        let mut dropped = 0;
        for (entry, link) in decl.super_types.iter().zip(links) {
            if entry.relation != SuperRelation::Interface {
                continue;
            }
            let removed = link
                .target
                .source()
                .map(|t| decide(t) == TransformDecision::Remove)
                .unwrap_or(false);
            if removed {
                dropped += 1;
            } else {
                kept.push(source[entry.span.start..entry.span.end].to_string());
            }
        }
        if dropped == 0 {
            return;
        }

        if kept.is_empty() {
            let mut start = clause.start;
            while start > 0 && source.as_bytes()[start - 1].is_ascii_whitespace() {
                start -= 1;
            }
            editor.remove(&decl.id, ByteRange::new(start, clause.end));
        } else {
            let clause_text = &source[clause.start..clause.end];
            let keyword = clause_text
                .split(|c: char| c.is_whitespace())
                .next()
                .unwrap_or("implements");
            editor.replace(&decl.id, clause, format!("{} {}", keyword, kept.join(", ")));
        }
    }

    /// `@Override` cannot stay on a method whose every overridden source
    /// method was removed, unless an opaque supertype may still declare it
    fn strip_unsatisfiable_override<F>(&self, editor: &mut SourceEditor, decl: &Declaration, source: &str, decide: &F)
    where
        F: Fn(&DeclarationId) -> TransformDecision,
    {
        let Some(annotation) = decl.annotations.iter().find(|a| a.simple_name() == "Override") else {
            return;
        };
        if is_object_method(decl) {
            return;
        }
        let Some(owner) = self.context.owner_type(&decl.id) else {
            return;
        };
        if owner.is_anonymous() || self.context.has_external_ancestor(&owner.id) {
            return;
        }
        let satisfied = self
            .context
            .overridden_bases(&decl.id)
            .iter()
            .any(|base| decide(base) != TransformDecision::Remove);
        if satisfied {
            return;
        }

        let bytes = source.as_bytes();
        let mut end = annotation.span.end;
        while end < bytes.len() && bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        editor.remove(&decl.id, ByteRange::new(annotation.span.start, end));
    }
}

/// Source text of one kept declarator, with a stubbed initializer
/// replaced by the type's default
fn declarator_text(decl: &Declaration, decision: TransformDecision, source: &str) -> String {
    let full = decl.extent.full;
    let text = &source[full.start..full.end];
    match (decision, decl.extent.initializer, decl.field_type.as_deref()) {
        (TransformDecision::Stub, Some(init), Some(ty)) if full.encloses(&init) => format!(
            "{}{}{}",
            &source[full.start..init.start],
            default_value(ty),
            &source[init.end..full.end]
        ),
        _ => text.to_string(),
    }
}
