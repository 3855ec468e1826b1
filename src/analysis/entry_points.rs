use super::reasons::InclusionReason;
use crate::config::Config;
use crate::graph::{Declaration, DeclarationId, DeclarationKind, SourceContext};
use miette::Diagnostic;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Annotations a JUnit runner invokes around every test
const LIFECYCLE_ANNOTATIONS: &[&str] = &[
    "Before",
    "BeforeEach",
    "BeforeAll",
    "BeforeClass",
    "After",
    "AfterEach",
    "AfterAll",
    "AfterClass",
];

/// JUnit 3 fixture methods
const LIFECYCLE_METHODS: &[&str] = &["setUp", "tearDown"];

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EntrypointError {
    #[error("malformed entrypoint `{0}`")]
    #[diagnostic(
        code(testprune::entrypoint::malformed),
        help("write entrypoints as `pkg.Class#method` or `pkg.Class::method`")
    )]
    Malformed(String),

    #[error("entrypoint class `{0}` is not in the source tree")]
    #[diagnostic(code(testprune::entrypoint::unknown_class))]
    UnknownClass(String),

    #[error("no method `{method}` in entrypoint class `{class_name}`")]
    #[diagnostic(code(testprune::entrypoint::unknown_method))]
    UnknownMethod { class_name: String, method: String },

    #[error("no entrypoint configured")]
    #[diagnostic(
        code(testprune::entrypoint::missing),
        help("pass --entrypoint or --test, or set `entrypoint` in the config file")
    )]
    Missing,
}

/// A test method named by its class and method name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    pub class_name: String,
    pub method: String,
}

impl MethodRef {
    pub fn new(class_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method: method.into(),
        }
    }
}

impl FromStr for MethodRef {
    type Err = EntrypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (class_name, method) = trimmed
            .split_once("::")
            .or_else(|| trimmed.split_once('#'))
            .ok_or_else(|| EntrypointError::Malformed(s.to_string()))?;
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .split(['.', '$'])
                    .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_'))
        };
        if !valid(class_name) || !valid(method) || method.contains('.') {
            return Err(EntrypointError::Malformed(s.to_string()));
        }
        Ok(Self::new(class_name, method))
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.class_name, self.method)
    }
}

/// What the reduced program has to keep running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrypointSpec {
    Method(MethodRef),
    /// Every triggering test
    Tests(Vec<MethodRef>),
}

impl EntrypointSpec {
    pub fn parse(s: &str) -> Result<Self, EntrypointError> {
        s.parse().map(EntrypointSpec::Method)
    }

    pub fn tests<'s>(specs: impl IntoIterator<Item = &'s str>) -> Result<Self, EntrypointError> {
        let mut methods = specs
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<MethodRef>, _>>()?;
        if methods.is_empty() {
            return Err(EntrypointError::Missing);
        }
        methods.sort();
        methods.dedup();
        Ok(EntrypointSpec::Tests(methods))
    }

    /// The configured entrypoint, or the triggering tests when none is set
    pub fn from_config(config: &Config) -> Result<Self, EntrypointError> {
        match &config.entrypoint {
            Some(entry) => Self::parse(entry),
            None => Self::tests(config.triggering_tests.iter().map(String::as_str)),
        }
    }

    pub fn methods(&self) -> &[MethodRef] {
        match self {
            EntrypointSpec::Method(m) => std::slice::from_ref(m),
            EntrypointSpec::Tests(ms) => ms,
        }
    }
}

/// An entrypoint placed in the source tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEntrypoint {
    pub methods: Vec<DeclarationId>,
    pub classes: Vec<DeclarationId>,
    /// Source root holding the first entry class
    pub source_root: Option<PathBuf>,
}

/// Resolves entrypoint specs and derives the seeds reachability starts from
pub struct EntryPointDetector<'a> {
    context: &'a SourceContext,
}

impl<'a> EntryPointDetector<'a> {
    pub fn new(context: &'a SourceContext) -> Self {
        Self { context }
    }

    pub fn resolve(&self, spec: &EntrypointSpec, roots: &[PathBuf]) -> Result<ResolvedEntrypoint, EntrypointError> {
        let mut resolved = ResolvedEntrypoint::default();
        for method_ref in spec.methods() {
            let class = self
                .context
                .get_type_by_qualified_name(&method_ref.class_name)
                .ok_or_else(|| EntrypointError::UnknownClass(method_ref.class_name.clone()))?;
            let methods = self.find_methods(class, &method_ref.method);
            if methods.is_empty() {
                return Err(EntrypointError::UnknownMethod {
                    class_name: method_ref.class_name.clone(),
                    method: method_ref.method.clone(),
                });
            }
            debug!("Entrypoint {} -> {:?}", method_ref, methods);
            if resolved.source_root.is_none() {
                resolved.source_root = source_root_of(&class.location.file, roots);
            }
            resolved.methods.extend(methods);
            resolved.classes.push(class.id.clone());
        }
        resolved.methods.sort();
        resolved.methods.dedup();
        resolved.classes.sort();
        resolved.classes.dedup();
        info!(
            "Resolved {} entry methods in {} classes",
            resolved.methods.len(),
            resolved.classes.len()
        );
        Ok(resolved)
    }

    /// Methods named `name` in the class, or inherited from its source
    /// superclasses; a no-arg overload wins when there is one
    fn find_methods(&self, class: &Declaration, name: &str) -> Vec<DeclarationId> {
        let chain = std::iter::once(class.id.clone()).chain(self.context.ancestors(&class.id));
        for type_id in chain {
            let named: Vec<&Declaration> = self
                .context
                .members(&type_id)
                .filter(|m| m.kind == DeclarationKind::Method && m.name == name)
                .collect();
            if named.is_empty() {
                continue;
            }
            if let Some(no_arg) = named.iter().find(|m| m.arity() == 0) {
                return vec![no_arg.id.clone()];
            }
            return named.iter().map(|m| m.id.clone()).collect();
        }
        Vec::new()
    }

    /// Seeds for static reachability: the entry methods, the entry classes
    /// with their ancestry, and everything the test runner calls
    /// reflectively around a test
    pub fn seeds(&self, resolved: &ResolvedEntrypoint) -> Vec<(DeclarationId, InclusionReason)> {
        let mut seeds: Vec<(DeclarationId, InclusionReason)> = resolved
            .methods
            .iter()
            .map(|m| (m.clone(), InclusionReason::EntrypointMethod))
            .collect();

        for class in &resolved.classes {
            let chain: Vec<DeclarationId> = std::iter::once(class.clone())
                .chain(self.context.ancestors(class))
                .collect();
            for type_id in &chain {
                seeds.push((type_id.clone(), InclusionReason::EntrypointClass));
            }

            let runner_chain = std::iter::once(class.clone()).chain(
                chain
                    .iter()
                    .skip(1)
                    .filter(|t| self.context.get(t).map(|d| d.kind == DeclarationKind::Class).unwrap_or(false))
                    .cloned(),
            );
            for type_id in runner_chain {
                self.runner_seeds(&type_id, &mut seeds);
            }
        }

        seeds.sort();
        seeds.dedup();
        seeds
    }

    fn runner_seeds(&self, type_id: &DeclarationId, seeds: &mut Vec<(DeclarationId, InclusionReason)>) {
        let ctors = self.context.constructors(type_id);
        if ctors.is_empty() {
            seeds.push((type_id.clone(), InclusionReason::EntrypointMethod));
        } else if let Some(no_arg) = ctors.iter().find(|c| c.arity() == 0) {
            seeds.push((no_arg.id.clone(), InclusionReason::EntrypointMethod));
        }

        for member in self.context.members(type_id) {
            let lifecycle = member.kind == DeclarationKind::Method
                && member.arity() == 0
                && (LIFECYCLE_ANNOTATIONS.iter().any(|a| member.has_annotation(a))
                    || LIFECYCLE_METHODS.contains(&member.name.as_str()));
            let instance_init = member.kind == DeclarationKind::Initializer && !member.is_static;
            if lifecycle || instance_init {
                seeds.push((member.id.clone(), InclusionReason::EntrypointMethod));
            }
        }
    }
}

fn source_root_of(file: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .filter(|root| file.starts_with(root))
        .max_by_key(|root| root.components().count())
        .cloned()
}
