//! Process-backed verification of a reduced tree: compile it with javac and
//! run the entry test with the JUnit console launcher. Outcomes are
//! reported, never fed back into the reduction.

use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileRequest {
    pub source_roots: Vec<PathBuf>,
    pub classpath: Vec<PathBuf>,
    /// Where class files go
    pub output_dir: PathBuf,
    pub flags: Vec<String>,
    /// `--release` value, e.g. `8` or `17`
    pub release: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub files: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRequest {
    pub classpath: Vec<PathBuf>,
    /// `pkg.Class#method`
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait Compiler {
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome>;
}

pub trait TestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestOutcome>;
}

/// `javac` on the PATH or at an explicit location
#[derive(Debug, Clone)]
pub struct JavacCompiler {
    javac: PathBuf,
}

impl JavacCompiler {
    pub fn new() -> Self {
        Self {
            javac: PathBuf::from("javac"),
        }
    }

    pub fn with_executable(javac: impl Into<PathBuf>) -> Self {
        Self { javac: javac.into() }
    }

    /// Arguments for one invocation, source files last
    pub fn arguments(&self, request: &CompileRequest, files: &[PathBuf]) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = vec!["-d".into(), request.output_dir.clone().into_os_string()];
        if !request.classpath.is_empty() {
            args.push("-cp".into());
            args.push(join_classpath(&request.classpath)?);
        }
        if let Some(release) = &request.release {
            args.push("--release".into());
            args.push(release.into());
        }
        args.extend(request.flags.iter().map(OsString::from));
        args.extend(files.iter().map(|f| f.clone().into_os_string()));
        Ok(args)
    }
}

impl Default for JavacCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler for JavacCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome> {
        let files = java_files(&request.source_roots);
        std::fs::create_dir_all(&request.output_dir)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to create {}", request.output_dir.display()))?;
        let args = self.arguments(request, &files)?;

        info!("Compiling {} files with {}", files.len(), self.javac.display());
        let output = Command::new(&self.javac)
            .args(&args)
            .output()
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to run {}", self.javac.display()))?;
        let (success, exit_code, stdout, stderr) = capture(output);
        debug!("javac exited with {:?}", exit_code);
        Ok(CompileOutcome {
            success,
            exit_code,
            stdout,
            stderr,
            files: files.len(),
        })
    }
}

/// JUnit Platform console launcher run through `java -jar`
#[derive(Debug, Clone)]
pub struct JUnitRunner {
    java: PathBuf,
    launcher: PathBuf,
}

impl JUnitRunner {
    pub fn new(launcher: impl Into<PathBuf>) -> Self {
        Self {
            java: PathBuf::from("java"),
            launcher: launcher.into(),
        }
    }

    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    pub fn arguments(&self, request: &TestRequest) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = vec![
            "-ea".into(),
            "-jar".into(),
            self.launcher.clone().into_os_string(),
            "execute".into(),
        ];
        if !request.classpath.is_empty() {
            args.push("--class-path".into());
            args.push(join_classpath(&request.classpath)?);
        }
        args.push("--select-method".into());
        args.push(request.entry.replace("::", "#").into());
        args.push("--details=summary".into());
        Ok(args)
    }
}

impl TestRunner for JUnitRunner {
    fn run(&self, request: &TestRequest) -> Result<TestOutcome> {
        let args = self.arguments(request)?;
        info!("Running {}", request.entry);
        let output = Command::new(&self.java)
            .args(&args)
            .output()
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to run {}", self.java.display()))?;
        let (passed, exit_code, stdout, stderr) = capture(output);
        Ok(TestOutcome {
            passed,
            exit_code,
            stdout,
            stderr,
        })
    }
}

fn capture(output: Output) -> (bool, Option<i32>, String, String) {
    (
        output.status.success(),
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

fn join_classpath(entries: &[PathBuf]) -> Result<OsString> {
    std::env::join_paths(entries)
        .into_diagnostic()
        .wrap_err("Classpath entry contains the path separator")
}

/// Every `.java` file under the roots, sorted
pub fn java_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = roots
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_java(p))
        .collect();
    files.sort();
    files
}

fn is_java(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "java")
}
