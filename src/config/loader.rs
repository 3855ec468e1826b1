use crate::analysis::{Granularity, Seeding};
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a reduction run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Java source roots to reduce
    pub source_roots: Vec<PathBuf>,

    /// Compiled class directories and archives the sources depend on
    pub classpath: Vec<PathBuf>,

    /// Patterns to exclude from discovery
    pub exclude: Vec<String>,

    /// Entry test method (`pkg.Class#method` or `pkg.Class::method`)
    pub entrypoint: Option<String>,

    /// Tests that trigger the behaviour being preserved; used when no
    /// single entrypoint is given
    pub triggering_tests: Vec<String>,

    /// Whether `assert` statements execute in the reduced program
    pub assertions_enabled: bool,

    pub reduction: ReductionConfig,

    /// JaCoCo XML report, required for coverage seeding
    pub coverage_report: Option<PathBuf>,

    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub granularity: Granularity,
    pub seeding: Seeding,
    /// Worker threads for reachability and decisions; 1 runs inline
    pub parallelism: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the reduced sources are written under
    pub root: Option<PathBuf>,

    /// Report format: terminal, json
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_roots: vec![],
            classpath: vec![],
            exclude: vec![
                "**/build/**".to_string(),
                "**/target/**".to_string(),
                "**/.gradle/**".to_string(),
                "**/.idea/**".to_string(),
            ],
            entrypoint: None,
            triggering_tests: vec![],
            assertions_enabled: false,
            reduction: ReductionConfig::default(),
            coverage_report: None,
            output: OutputConfig::default(),
        }
    }
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Member,
            seeding: Seeding::Static,
            parallelism: 1,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: None,
            format: "terminal".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".testprune.yml",
            ".testprune.yaml",
            ".testprune.toml",
            "testprune.yml",
            "testprune.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // No config file found, use defaults
        Ok(Self::default())
    }

    /// Check if a pattern matches for exclusion
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude.iter().any(|pattern| glob_match(pattern, &path_str))
    }
}

/// Simple glob matching for patterns like "*Test.java" or "**/build/**"
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.starts_with('*') && !pattern.contains('/') {
        return text.ends_with(&pattern[1..]);
    }

    if pattern.ends_with('*') && !pattern.contains('/') {
        return text.starts_with(&pattern[..pattern.len() - 1]);
    }

    if pattern.contains("**") {
        // "**/build/**" matches a whole directory name anywhere in the path
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            let dir_name = pattern
                .trim_start_matches("**/")
                .trim_end_matches("/**")
                .trim_matches('/');
            let dir_pattern = format!("/{}/", dir_name);
            return text.contains(&dir_pattern) || text.starts_with(&dir_pattern[1..]);
        }

        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() && suffix.is_empty() {
                return true;
            }

            if prefix.is_empty() {
                return text.ends_with(suffix) || text.contains(&format!("/{}", suffix));
            }

            if suffix.is_empty() {
                return text.starts_with(prefix) || text.contains(&format!("{}/", prefix));
            }

            return (text.starts_with(prefix) || text.contains(&format!("/{}/", prefix)))
                && (text.ends_with(suffix) || text.contains(&format!("/{}", suffix)));
        }
    }

    text == pattern
}
