use crate::config::Config;
use ignore::WalkBuilder;
use miette::{IntoDiagnostic, Result, WrapErr};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A discovered `.java` file and the source root it was found under
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path to the file, under its source root
    pub path: PathBuf,

    pub root: PathBuf,
}

impl SourceFile {
    pub fn new(path: PathBuf, root: PathBuf) -> Self {
        Self { path, root }
    }

    /// Path relative to the source root
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }

    /// Load and return owned contents
    pub fn read_contents(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {}", self.path.display()))
    }
}

pub fn is_java_source(path: &Path) -> bool {
    path.extension().map(|e| e == "java").unwrap_or(false)
}

/// File finder for discovering Java sources under the configured roots
pub struct FileFinder<'a> {
    config: &'a Config,
}

impl<'a> FileFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Find every `.java` file under the configured source roots, relative
    /// roots taken from `base`. Results are sorted by path.
    pub fn find_files(&self, base: &Path) -> Result<Vec<SourceFile>> {
        let roots: Vec<PathBuf> = if self.config.source_roots.is_empty() {
            vec![base.to_path_buf()]
        } else {
            self.config
                .source_roots
                .iter()
                .map(|r| base.join(r))
                .collect()
        };

        let mut files: Vec<SourceFile> = roots
            .par_iter()
            .flat_map(|root| self.scan_directory(root))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);

        debug!("Found {} Java files in {} roots", files.len(), roots.len());
        Ok(files)
    }

    /// Scan a single source root
    fn scan_directory(&self, root: &Path) -> Vec<SourceFile> {
        if !root.exists() {
            trace!("Directory does not exist: {}", root.display());
            return Vec::new();
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)           // Skip hidden files
            .git_ignore(true)       // Respect .gitignore
            .git_global(true)       // Respect global gitignore
            .git_exclude(true)      // Respect .git/info/exclude
            .ignore(true)           // Respect .ignore files
            .parents(true)          // Check parent directories for ignore files
            .follow_links(false)    // Don't follow symlinks
            .build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let path = entry.path();
                if !is_java_source(path) {
                    return None;
                }

                if self.config.should_exclude(path) {
                    trace!("Excluding: {}", path.display());
                    return None;
                }

                trace!("Found: {}", path.display());
                Some(SourceFile::new(path.to_path_buf(), root.to_path_buf()))
            })
            .collect()
    }
}
