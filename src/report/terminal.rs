use crate::analysis::TransformDecision;
use crate::graph::{DeclarationKind, SourceContext};
use crate::reducer::Reduction;
use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Terminal reporter with colored output
pub struct TerminalReporter {
    /// List every removed or stubbed declaration, not just per-file counts
    show_declarations: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            show_declarations: true,
        }
    }

    pub fn with_declarations(mut self, show: bool) -> Self {
        self.show_declarations = show;
        self
    }

    pub fn report(&self, reduction: &Reduction, context: &SourceContext) -> Result<()> {
        print!("{}", self.render(reduction, context));
        Ok(())
    }

    pub fn render(&self, reduction: &Reduction, context: &SourceContext) -> String {
        let mut out = String::new();
        let _ = writeln!(out);
        let entries: Vec<String> = reduction.entry_methods.iter().map(|m| m.to_string()).collect();
        let _ = writeln!(
            out,
            "{} {} {}",
            "Reduced".bold(),
            entries.join(", ").cyan().bold(),
            format!("({})", reduction.kind).dimmed()
        );
        let _ = writeln!(out);

        // Group edited declarations by file
        let mut by_file: BTreeMap<PathBuf, Vec<(TransformDecision, String, usize)>> = BTreeMap::new();
        for (id, decision) in &reduction.decisions {
            if *decision == TransformDecision::NoOp {
                continue;
            }
            let Some(decl) = context.get(id) else {
                continue;
            };
            // members of removed types are implied by the type
            if *decision == TransformDecision::Remove && !decl.kind.is_type() {
                let owner_removed = context
                    .owner_type(id)
                    .map(|o| reduction.decision(&o.id) == Some(TransformDecision::Remove))
                    .unwrap_or(false);
                if owner_removed {
                    continue;
                }
            }
            let label = match decl.kind {
                DeclarationKind::Import => format!("import {}", decl.name),
                kind => format!("{} {}", kind.display_name(), id),
            };
            by_file
                .entry(decl.location.file.clone())
                .or_default()
                .push((*decision, label, decl.location.line));
        }

        if self.show_declarations {
            for (file, items) in &by_file {
                let _ = writeln!(out, "{}", file.display().to_string().cyan().bold());
                let mut items = items.clone();
                items.sort_by_key(|(_, _, line)| *line);
                for (decision, label, line) in items {
                    let badge = match decision {
                        TransformDecision::Remove => "remove".red().bold(),
                        TransformDecision::Stub => "stub".yellow().bold(),
                        TransformDecision::NoOp => "keep".green(),
                    };
                    let _ = writeln!(out, "  {} {} {}", format!("{:>5}", line).dimmed(), badge, label);
                }
                let _ = writeln!(out);
            }
        }

        if !reduction.diagnostics.is_empty() {
            let _ = writeln!(
                out,
                "{}",
                format!("{} diagnostics:", reduction.diagnostics.len()).yellow()
            );
            for diagnostic in reduction.diagnostics.iter().take(20) {
                let _ = writeln!(out, "  {} {}", "→".dimmed(), diagnostic);
            }
            if reduction.diagnostics.len() > 20 {
                let _ = writeln!(out, "  {}", format!("... {} more", reduction.diagnostics.len() - 20).dimmed());
            }
            let _ = writeln!(out);
        }

        self.write_summary(&mut out, reduction);
        out
    }

    fn write_summary(&self, out: &mut String, reduction: &Reduction) {
        let stats = &reduction.stats;
        let _ = writeln!(out, "{}", "─".repeat(60).dimmed());
        let _ = writeln!(
            out,
            "Summary: {}, {}, {}",
            format!("{} kept", stats.kept).green(),
            format!("{} stubbed", stats.stubbed).yellow(),
            format!("{} removed", stats.removed).red()
        );
        let _ = writeln!(
            out,
            "Units: {} rewritten, {} emptied",
            stats.units - stats.empty_units,
            stats.empty_units
        );
        if stats.coverage_seeds > 0 || stats.coverage_unmatched > 0 {
            let _ = writeln!(
                out,
                "Coverage: {} seeds, {} unmatched records",
                stats.coverage_seeds, stats.coverage_unmatched
            );
        }
        let _ = writeln!(
            out,
            "{}",
            format!(
                "{} of {} declarations retained ({} live) in {} rounds, {} ms",
                stats.retained, stats.declarations, stats.live, stats.rounds, stats.elapsed_ms
            )
            .dimmed()
        );
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}
