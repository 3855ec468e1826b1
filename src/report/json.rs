use crate::analysis::{InclusionReason, TransformDecision};
use crate::graph::{Diagnostic, SourceContext};
use crate::reducer::{Reduction, ReductionStats};
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use std::path::PathBuf;

/// JSON reporter for programmatic output
pub struct JsonReporter {
    output_path: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, reduction: &Reduction, context: &SourceContext) -> Result<()> {
        let json = self.render(reduction, context)?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write report {}", path.display()))?;
            println!("Report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }

    pub fn render(&self, reduction: &Reduction, context: &SourceContext) -> Result<String> {
        let report = JsonReport::from_reduction(reduction, context);
        serde_json::to_string_pretty(&report).into_diagnostic()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    kind: String,
    entry_methods: Vec<String>,
    source_root: Option<String>,
    stats: &'a ReductionStats,
    declarations: Vec<JsonDeclaration<'a>>,
    units: Vec<JsonUnit>,
    diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
struct JsonDeclaration<'a> {
    id: &'a str,
    kind: &'static str,
    decision: TransformDecision,
    file: Option<String>,
    line: Option<usize>,
    reasons: Vec<&'a InclusionReason>,
}

#[derive(Serialize)]
struct JsonUnit {
    path: String,
    empty: bool,
    removed: usize,
    stubbed: usize,
}

impl<'a> JsonReport<'a> {
    fn from_reduction(reduction: &'a Reduction, context: &SourceContext) -> Self {
        let declarations = reduction
            .decisions
            .iter()
            .map(|(id, decision)| {
                let decl = context.get(id);
                JsonDeclaration {
                    id: id.as_str(),
                    kind: decl.map(|d| d.kind.display_name()).unwrap_or("unknown"),
                    decision: *decision,
                    file: decl.map(|d| d.location.file.to_string_lossy().to_string()),
                    line: decl.map(|d| d.location.line),
                    reasons: reduction
                        .reasons
                        .get(id)
                        .map(|r| r.iter().collect())
                        .unwrap_or_default(),
                }
            })
            .collect();

        let units = reduction
            .units
            .iter()
            .map(|u| JsonUnit {
                path: u.source_path.to_string_lossy().to_string(),
                empty: u.empty,
                removed: u.removed,
                stubbed: u.stubbed,
            })
            .collect();

        Self {
            version: "1.0",
            kind: reduction.kind.to_string(),
            entry_methods: reduction.entry_methods.iter().map(|m| m.to_string()).collect(),
            source_root: reduction
                .source_root
                .as_ref()
                .map(|r| r.to_string_lossy().to_string()),
            stats: &reduction.stats,
            declarations,
            units,
            diagnostics: &reduction.diagnostics,
        }
    }
}
