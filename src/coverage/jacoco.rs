// JaCoCo XML coverage parser
//
// XML format: https://www.jacoco.org/jacoco/trunk/doc/
// report > package > (class > method > counter)* , (sourcefile > line)*

use super::{ClassRecord, CoverageParser, CoverageReport, LineCoverage, MethodRecord, PackageRecord};
use miette::{IntoDiagnostic, Result, WrapErr};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parser for JaCoCo XML coverage reports
pub struct JacocoParser;

/// Counters seen inside the method being read
#[derive(Default)]
struct PendingMethod {
    record: Option<MethodRecord>,
    method_counter: Option<bool>,
    instruction_counter: Option<bool>,
}

impl PendingMethod {
    fn start(record: MethodRecord) -> Self {
        Self {
            record: Some(record),
            ..Self::default()
        }
    }

    /// A method ran when its METHOD counter says so, falling back to
    /// INSTRUCTION when there is no METHOD counter
    fn finish(self) -> Option<MethodRecord> {
        let mut record = self.record?;
        record.executed = self
            .method_counter
            .or(self.instruction_counter)
            .unwrap_or(false);
        Some(record)
    }
}

impl JacocoParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the JaCoCo XML report
    pub fn parse_xml(&self, content: &str) -> Result<CoverageReport> {
        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut report = CoverageReport::new();
        let mut package: Option<PackageRecord> = None;
        let mut class: Option<ClassRecord> = None;
        let mut method = PendingMethod::default();
        let mut source_file: Option<(PathBuf, LineCoverage)> = None;

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"report" => report.name = attr(e, b"name").unwrap_or_default(),
                    b"package" => package = Some(start_package(e)),
                    b"class" => class = Some(start_class(e)),
                    b"method" => method = PendingMethod::start(start_method(e)),
                    b"sourcefile" => source_file = start_source_file(e, package.as_ref()),
                    _ => {}
                },
                Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                    b"class" => {
                        if let Some(p) = package.as_mut() {
                            p.classes.push(start_class(e));
                        }
                    }
                    b"method" => {
                        if let (Some(c), Some(m)) = (class.as_mut(), PendingMethod::start(start_method(e)).finish()) {
                            c.methods.push(m);
                        }
                    }
                    b"counter" if method.record.is_some() => {
                        let covered = attr(e, b"covered")
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(0);
                        match attr(e, b"type").as_deref() {
                            Some("METHOD") => method.method_counter = Some(covered > 0),
                            Some("INSTRUCTION") => method.instruction_counter = Some(covered > 0),
                            _ => {}
                        }
                    }
                    b"line" => {
                        if let Some((_, lines)) = source_file.as_mut() {
                            let number = attr(e, b"nr").and_then(|v| v.parse::<u32>().ok());
                            let covered = attr(e, b"ci")
                                .and_then(|v| v.parse::<u64>().ok())
                                .unwrap_or(0);
                            let missed = attr(e, b"mi")
                                .and_then(|v| v.parse::<u64>().ok())
                                .unwrap_or(0);
                            match number {
                                Some(nr) if covered > 0 => {
                                    lines.covered.insert(nr);
                                    lines.missed.remove(&nr);
                                }
                                Some(nr) if missed > 0 && !lines.covered.contains(&nr) => {
                                    lines.missed.insert(nr);
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"method" => {
                        if let (Some(c), Some(m)) = (class.as_mut(), std::mem::take(&mut method).finish()) {
                            c.methods.push(m);
                        }
                    }
                    b"class" => {
                        if let (Some(p), Some(c)) = (package.as_mut(), class.take()) {
                            p.classes.push(c);
                        }
                    }
                    b"sourcefile" => {
                        if let Some((path, lines)) = source_file.take() {
                            report.source_files.insert(path, lines);
                        }
                    }
                    b"package" => {
                        if let Some(p) = package.take() {
                            report.packages.push(p);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(miette::miette!(
                        "Error parsing JaCoCo XML at byte {}: {}",
                        reader.buffer_position(),
                        e
                    ));
                }
                _ => {}
            }
            buf.clear();
        }

        debug!(
            "JaCoCo report `{}`: {} packages, {} source files",
            report.name,
            report.packages.len(),
            report.source_files.len()
        );
        Ok(report)
    }
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn start_package(e: &BytesStart) -> PackageRecord {
    PackageRecord {
        name: attr(e, b"name").unwrap_or_default().replace('/', "."),
        classes: Vec::new(),
    }
}

fn start_class(e: &BytesStart) -> ClassRecord {
    ClassRecord {
        name: attr(e, b"name").unwrap_or_default(),
        source_file: attr(e, b"sourcefilename"),
        methods: Vec::new(),
    }
}

fn start_method(e: &BytesStart) -> MethodRecord {
    MethodRecord {
        name: attr(e, b"name").unwrap_or_default(),
        descriptor: attr(e, b"desc").unwrap_or_default(),
        line: attr(e, b"line").and_then(|v| v.parse().ok()),
        executed: false,
    }
}

fn start_source_file(e: &BytesStart, package: Option<&PackageRecord>) -> Option<(PathBuf, LineCoverage)> {
    let name = attr(e, b"name")?;
    let package_path = package.map(|p| p.name.replace('.', "/")).unwrap_or_default();
    Some((PathBuf::from(package_path).join(name), LineCoverage::default()))
}

impl Default for JacocoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageParser for JacocoParser {
    fn parse(&self, path: &Path) -> Result<CoverageReport> {
        let content = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read coverage report {}", path.display()))?;
        self.parse_xml(&content)
    }

    fn can_parse(&self, path: &Path) -> bool {
        if !path.extension().map_or(false, |e| e == "xml") {
            return false;
        }

        // JaCoCo reports have a <report> root element or a JACOCO doctype
        if let Ok(content) = std::fs::read_to_string(path) {
            return content.contains("<report ")
                || content.contains("<!DOCTYPE report")
                || content.contains("JACOCO");
        }

        false
    }
}
