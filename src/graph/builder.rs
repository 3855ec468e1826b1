use super::{
    ClasspathResolver, CompilationUnit, DeclarationKind, Diagnostic, DiagnosticKind, Graph,
    SourceContext, UnresolvedReference,
};
use crate::discovery::SourceFile;
use crate::parser::{JavaParser, ParseResult, Parser as SourceParser};
use miette::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for constructing the source context
pub struct GraphBuilder {
    /// Java parser
    java_parser: JavaParser,

    /// Parsed files waiting to be indexed
    parsed: Vec<ParsedUnit>,

    classpath: ClasspathResolver,
}

pub(super) struct ParsedUnit {
    pub(super) path: PathBuf,
    pub(super) source: Arc<str>,
    pub(super) result: ParseResult,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            java_parser: JavaParser::new(),
            parsed: Vec::new(),
            classpath: ClasspathResolver::new(),
        }
    }

    pub fn with_classpath(mut self, classpath: ClasspathResolver) -> Self {
        self.classpath = classpath;
        self
    }

    /// Read and parse a discovered source file
    pub fn process_file(&mut self, file: &SourceFile) -> Result<()> {
        let contents = file.read_contents()?;
        self.add_source(&file.path, &contents)
    }

    /// Parse in-memory source as if it lived at `path`
    pub fn add_source(&mut self, path: &Path, contents: &str) -> Result<()> {
        debug!("Parsing Java file: {}", path.display());
        let result = self.java_parser.parse(path, contents)?;
        self.add_parsed(ParsedUnit {
            path: path.to_path_buf(),
            source: Arc::from(contents),
            result,
        });
        Ok(())
    }

    pub(super) fn add_parsed(&mut self, unit: ParsedUnit) {
        self.parsed.push(unit);
    }

    /// Index every parsed unit and resolve all references.
    ///
    /// Units are indexed in path order so ids, diagnostics and edge order
    /// do not depend on the order files were added in.
    pub fn build(self) -> SourceContext {
        let mut parsed = self.parsed;
        parsed.sort_by(|a, b| a.path.cmp(&b.path));

        let mut graph = Graph::new();
        let mut units = Vec::with_capacity(parsed.len());
        let mut references: Vec<UnresolvedReference> = Vec::new();
        let mut diagnostics = Vec::new();

        for ParsedUnit { path, source, result } in parsed {
            let mut unit = CompilationUnit {
                path: path.clone(),
                source,
                package: result.package,
                imports: Vec::new(),
                types: Vec::new(),
                declarations: Vec::new(),
                syntax_errors: result.syntax_errors,
            };

            if result.syntax_errors > 0 {
                diagnostics.push(Diagnostic {
                    file: Some(path.clone()),
                    line: 0,
                    kind: DiagnosticKind::SyntaxError,
                    message: format!("{} syntax error node(s)", result.syntax_errors),
                });
            }

            for decl in result.declarations {
                let kind = decl.kind;
                let top_level = decl.parent.is_none();
                let location = decl.location.clone();
                let display = decl.id.to_string();
                match graph.add_declaration(decl) {
                    Some(id) => {
                        if kind == DeclarationKind::Import {
                            unit.imports.push(id.clone());
                        } else if kind.is_type() && top_level {
                            unit.types.push(id.clone());
                        }
                        unit.declarations.push(id);
                    }
                    None => diagnostics.push(Diagnostic::new(
                        DiagnosticKind::DuplicateDeclaration,
                        Some(&location),
                        format!("duplicate declaration {}", display),
                    )),
                }
            }

            references.extend(result.references);
            units.push(unit);
        }

        info!(
            "Indexed {} declarations from {} files",
            graph.declaration_count(),
            units.len()
        );

        let mut context = SourceContext::new(graph, units, self.classpath);
        context.diagnostics.extend(diagnostics);
        context.link_hierarchy();
        context.link_overrides();

        debug!("Resolving {} references", references.len());
        context.resolve_references(references);

        info!(
            "Resolved {} edges ({} conservative), {} diagnostics",
            context.graph.reference_count(),
            context.graph.conservative_count(),
            context.diagnostics.len()
        );
        context
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
