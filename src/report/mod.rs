mod json;
mod terminal;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

use crate::graph::SourceContext;
use crate::reducer::Reduction;
use miette::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format for reduction reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
}

impl ReportFormat {
    /// Parse the config spelling; unknown names fall back to terminal
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "terminal" | "text" => Some(ReportFormat::Terminal),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// Reporter for outputting reduction results
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self { format, output_path }
    }

    /// Report the reduction
    pub fn report(&self, reduction: &Reduction, context: &SourceContext) -> Result<()> {
        match self.format {
            ReportFormat::Terminal => TerminalReporter::new().report(reduction, context),
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(reduction, context),
        }
    }
}
