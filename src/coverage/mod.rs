// Coverage module - execution records used to seed coverage-driven reduction
//
// Reports are read into a read-only package -> class -> method tree, plus
// covered line sets per source file. The matcher maps records back onto
// source declarations.

mod descriptor;
mod jacoco;
mod matcher;

pub use descriptor::{
    is_exact_param, param_matches, params_match, BaseType, DescriptorError, JvmType, MethodDescriptor,
};
pub use jacoco::JacocoParser;
pub use matcher::{CoverageMatcher, CoverageSeeds, MatchOutcome};

use miette::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One executed-or-not method of a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub name: String,
    /// JVM descriptor, `(I)V`
    pub descriptor: String,
    /// First line of the method, when the class was compiled with line info
    pub line: Option<u32>,
    pub executed: bool,
}

impl MethodRecord {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    /// Internal name, `com/example/Outer$1`
    pub name: String,
    pub source_file: Option<String>,
    pub methods: Vec<MethodRecord>,
}

impl ClassRecord {
    /// Dotted binary name, `com.example.Outer$1`
    pub fn binary_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn is_executed(&self) -> bool {
        self.methods.iter().any(|m| m.executed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Dotted package name
    pub name: String,
    pub classes: Vec<ClassRecord>,
}

/// Covered and missed lines of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineCoverage {
    pub covered: BTreeSet<u32>,
    pub missed: BTreeSet<u32>,
}

impl LineCoverage {
    /// `None` for lines without instructions (comments, blanks)
    pub fn is_line_covered(&self, line: u32) -> Option<bool> {
        if self.covered.contains(&line) {
            Some(true)
        } else if self.missed.contains(&line) {
            Some(false)
        } else {
            None
        }
    }
}

/// A parsed coverage report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub name: String,
    pub packages: Vec<PackageRecord>,
    /// Keyed by package path plus file name, `com/example/Foo.java`
    pub source_files: BTreeMap<PathBuf, LineCoverage>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassRecord> {
        self.packages.iter().flat_map(|p| p.classes.iter())
    }

    pub fn find_class(&self, binary_name: &str) -> Option<&ClassRecord> {
        let internal = binary_name.replace('.', "/");
        self.classes().find(|c| c.name == internal)
    }

    /// Every executed method with its class
    pub fn executed_methods(&self) -> impl Iterator<Item = (&ClassRecord, &MethodRecord)> {
        self.classes()
            .flat_map(|c| c.methods.iter().filter(|m| m.executed).map(move |m| (c, m)))
    }

    /// Check if a line in a file was covered, matching by file name when the
    /// path is not known as given
    pub fn is_line_covered(&self, file: &Path, line: u32) -> Option<bool> {
        if let Some(lines) = self.source_files.get(file) {
            return lines.is_line_covered(line);
        }
        let file_name = file.file_name()?;
        self.source_files
            .iter()
            .filter(|(path, _)| file.ends_with(path) || path.file_name() == Some(file_name))
            .find_map(|(_, lines)| lines.is_line_covered(line))
    }

    /// Merge another run: anything executed in either run is executed
    pub fn merge(&mut self, other: CoverageReport) {
        for package in other.packages {
            let Some(existing) = self.packages.iter_mut().find(|p| p.name == package.name) else {
                self.packages.push(package);
                continue;
            };
            for class in package.classes {
                let Some(target) = existing.classes.iter_mut().find(|c| c.name == class.name) else {
                    existing.classes.push(class);
                    continue;
                };
                for method in class.methods {
                    match target
                        .methods
                        .iter_mut()
                        .find(|m| m.name == method.name && m.descriptor == method.descriptor)
                    {
                        Some(m) => m.executed |= method.executed,
                        None => target.methods.push(method),
                    }
                }
            }
        }

        for (path, lines) in other.source_files {
            let entry = self.source_files.entry(path).or_default();
            entry.covered.extend(lines.covered);
            let covered = entry.covered.clone();
            entry.missed.extend(lines.missed);
            entry.missed.retain(|l| !covered.contains(l));
        }
    }

    pub fn stats(&self) -> CoverageStats {
        let total_lines = self
            .source_files
            .values()
            .map(|f| f.covered.len() + f.missed.len())
            .sum();
        let covered_lines = self.source_files.values().map(|f| f.covered.len()).sum();
        CoverageStats {
            total_files: self.source_files.len(),
            total_classes: self.classes().count(),
            covered_classes: self.classes().filter(|c| c.is_executed()).count(),
            total_methods: self.classes().map(|c| c.methods.len()).sum(),
            covered_methods: self.executed_methods().count(),
            total_lines,
            covered_lines,
        }
    }
}

/// Summary statistics for coverage data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageStats {
    pub total_files: usize,
    pub total_classes: usize,
    pub covered_classes: usize,
    pub total_methods: usize,
    pub covered_methods: usize,
    pub total_lines: usize,
    pub covered_lines: usize,
}

impl CoverageStats {
    pub fn method_coverage_percent(&self) -> f64 {
        if self.total_methods == 0 {
            return 0.0;
        }
        (self.covered_methods as f64 / self.total_methods as f64) * 100.0
    }

    pub fn line_coverage_percent(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        (self.covered_lines as f64 / self.total_lines as f64) * 100.0
    }
}

/// Trait for coverage file parsers
pub trait CoverageParser {
    /// Parse coverage data from a file
    fn parse(&self, path: &Path) -> Result<CoverageReport>;

    /// Check if this parser can handle the given file
    fn can_parse(&self, path: &Path) -> bool;
}

/// Parse a coverage report file
pub fn parse_coverage_file(path: &Path) -> Result<CoverageReport> {
    let jacoco = JacocoParser::new();
    if jacoco.can_parse(path) {
        return jacoco.parse(path);
    }
    miette::bail!("Unknown coverage file format: {}", path.display())
}

/// Parse multiple coverage files and merge results
pub fn parse_coverage_files(paths: &[PathBuf]) -> Result<CoverageReport> {
    let mut merged = CoverageReport::new();
    for path in paths {
        merged.merge(parse_coverage_file(path)?);
    }
    Ok(merged)
}
