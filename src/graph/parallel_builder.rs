// Parallel graph builder using rayon

use super::builder::ParsedUnit;
use super::{ClasspathResolver, GraphBuilder, SourceContext};
use crate::discovery::SourceFile;
use crate::parser::{JavaParser, Parser as SourceParser};
use indicatif::ProgressBar;
use miette::Result;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Parallel graph builder for faster processing
#[derive(Default)]
pub struct ParallelGraphBuilder {
    classpath: ClasspathResolver,
    progress: Option<ProgressBar>,
}

impl ParallelGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classpath(mut self, classpath: ClasspathResolver) -> Self {
        self.classpath = classpath;
        self
    }

    /// Tick a progress bar once per parsed file
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build the source context from files using parallel parsing.
    ///
    /// Files that cannot be read or parsed are skipped with a debug log;
    /// the result is identical to sequential building over the same files.
    pub fn build_from_files(self, files: &[SourceFile]) -> Result<SourceContext> {
        info!("Parsing {} files in parallel...", files.len());

        let progress = self.progress.clone();
        let results: Vec<Result<ParsedUnit>> = files
            .par_iter()
            .map(|file| {
                let parsed = Self::parse_file(file);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                parsed
            })
            .collect();

        let mut builder = GraphBuilder::new().with_classpath(self.classpath);
        for result in results {
            match result {
                Ok(parsed) => builder.add_parsed(parsed),
                Err(e) => debug!("Parse error (continuing): {}", e),
            }
        }
        if let Some(pb) = &self.progress {
            pb.finish_with_message("Parsing complete");
        }

        info!("Resolving references...");
        Ok(builder.build())
    }

    fn parse_file(file: &SourceFile) -> Result<ParsedUnit> {
        let contents = file.read_contents()?;
        let result = JavaParser::new().parse(&file.path, &contents)?;
        Ok(ParsedUnit {
            path: file.path.clone(),
            source: Arc::from(contents.as_str()),
            result,
        })
    }
}
