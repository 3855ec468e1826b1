use super::{
    ClasspathResolver, Declaration, DeclarationId, DeclarationKind, Graph, Location, SuperRelation,
    TypeNesting, Visibility,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One parsed `.java` file
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub path: PathBuf,
    pub source: Arc<str>,
    pub package: Option<String>,
    /// Import declarations in source order
    pub imports: Vec<DeclarationId>,
    /// Top-level types in source order
    pub types: Vec<DeclarationId>,
    /// Every declaration of the unit in source order
    pub declarations: Vec<DeclarationId>,
    pub syntax_errors: usize,
}

/// Where a type name points
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTarget {
    Source(DeclarationId),
    /// Outside the source tree: JDK, classpath, unplaced names behind a
    /// non-source wildcard import
    External(String),
    TypeVar(String),
    Unresolved(String),
}

impl TypeTarget {
    pub fn source(&self) -> Option<&DeclarationId> {
        match self {
            TypeTarget::Source(id) => Some(id),
            _ => None,
        }
    }

    /// Anything not known to be in the source tree
    pub fn is_opaque(&self) -> bool {
        matches!(self, TypeTarget::External(_) | TypeTarget::Unresolved(_))
    }
}

/// A resolved `extends`/`implements` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperLink {
    pub name: String,
    pub target: TypeTarget,
    pub relation: SuperRelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    SyntaxError,
    DuplicateDeclaration,
    UnresolvedType,
    UnresolvedMember,
    AmbiguousMember,
    UnmatchedCoverage,
    AmbiguousCoverage,
}

/// A soft failure recorded during analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Option<&Location>, message: impl Into<String>) -> Self {
        Self {
            file: location.map(|l| l.file.clone()),
            line: location.map(|l| l.line).unwrap_or(0),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}: {}", file.display(), self.line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

const OBJECT_METHODS: &[(&str, usize)] = &[
    ("equals", 1),
    ("hashCode", 0),
    ("toString", 0),
    ("clone", 0),
    ("finalize", 0),
];

/// Whether a method has the signature of an overridable `java.lang.Object` method
pub fn is_object_method(decl: &Declaration) -> bool {
    decl.kind == DeclarationKind::Method
        && OBJECT_METHODS
            .iter()
            .any(|(name, arity)| decl.name == *name && decl.arity() == *arity)
}

/// Indexed, resolved view over every parsed compilation unit.
///
/// Immutable once built; analysis state lives in the run cache.
#[derive(Debug)]
pub struct SourceContext {
    pub(super) graph: Graph,
    pub(super) units: Vec<CompilationUnit>,
    pub(super) unit_index: HashMap<PathBuf, usize>,
    pub(super) packages: HashSet<String>,
    pub(super) supertypes: HashMap<DeclarationId, Vec<SuperLink>>,
    pub(super) subtypes: HashMap<DeclarationId, Vec<DeclarationId>>,
    pub(super) overrides: HashMap<DeclarationId, Vec<DeclarationId>>,
    pub(super) overridden_by: HashMap<DeclarationId, Vec<DeclarationId>>,
    pub(super) external_overrides: HashSet<DeclarationId>,
    pub(super) classpath: ClasspathResolver,
    pub(super) diagnostics: BTreeSet<Diagnostic>,
}

impl SourceContext {
    pub(super) fn new(graph: Graph, units: Vec<CompilationUnit>, classpath: ClasspathResolver) -> Self {
        let unit_index = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.path.clone(), i))
            .collect();
        let packages = units.iter().filter_map(|u| u.package.clone()).collect();
        Self {
            graph,
            units,
            unit_index,
            packages,
            supertypes: HashMap::new(),
            subtypes: HashMap::new(),
            overrides: HashMap::new(),
            overridden_by: HashMap::new(),
            external_overrides: HashSet::new(),
            classpath,
            diagnostics: BTreeSet::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn unit(&self, path: &Path) -> Option<&CompilationUnit> {
        self.unit_index.get(path).map(|&i| &self.units[i])
    }

    pub fn unit_of(&self, id: &DeclarationId) -> Option<&CompilationUnit> {
        self.get(id).and_then(|d| self.unit(&d.location.file))
    }

    pub fn get(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.graph.get_declaration(id)
    }

    pub fn contains(&self, id: &DeclarationId) -> bool {
        self.graph.contains(id)
    }

    /// Every declaration, ordered by unit path then source position
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.units
            .iter()
            .flat_map(|u| u.declarations.iter())
            .filter_map(|id| self.graph.get_declaration(id))
    }

    pub fn declaration_ids(&self) -> Vec<DeclarationId> {
        self.declarations().map(|d| d.id.clone()).collect()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn classpath(&self) -> &ClasspathResolver {
        &self.classpath
    }

    pub fn is_source_package(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    /// Look a type up by canonical (`a.Outer.Inner`) or binary (`a.Outer$Inner`) name
    pub fn get_type_by_qualified_name(&self, name: &str) -> Option<&Declaration> {
        self.graph
            .find_by_fqn(name)
            .or_else(|| self.graph.get_declaration(&DeclarationId::for_type(name)))
            .filter(|d| d.kind.is_type())
    }

    // ------------------------------------------------------------------
    // Containment
    // ------------------------------------------------------------------

    /// The declaration itself when it is a type, otherwise the nearest
    /// enclosing type
    pub fn enclosing_type(&self, id: &DeclarationId) -> Option<&Declaration> {
        let decl = self.get(id)?;
        if decl.kind.is_type() {
            return Some(decl);
        }
        self.owner_type(id)
    }

    /// Nearest type strictly enclosing the declaration
    pub fn owner_type(&self, id: &DeclarationId) -> Option<&Declaration> {
        let mut current = self.get(id)?.parent.as_ref();
        while let Some(parent) = current {
            let decl = self.get(parent)?;
            if decl.kind.is_type() {
                return Some(decl);
            }
            current = decl.parent.as_ref();
        }
        None
    }

    /// Parent chain from the declaration outwards, the declaration included
    pub fn lexical_chain(&self, id: &DeclarationId) -> Vec<&Declaration> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(decl) = current {
            chain.push(decl);
            current = decl.parent.as_ref().and_then(|p| self.get(p));
        }
        chain
    }

    pub fn children(&self, id: &DeclarationId) -> impl Iterator<Item = &Declaration> {
        self.graph
            .get_children(id)
            .iter()
            .filter_map(|c| self.graph.get_declaration(c))
    }

    /// Members declared directly in a type
    pub fn members(&self, type_id: &DeclarationId) -> impl Iterator<Item = &Declaration> {
        self.children(type_id).filter(|d| d.kind.is_member())
    }

    /// Nested, local and anonymous types lexically inside a declaration
    pub fn nested_types(&self, id: &DeclarationId) -> impl Iterator<Item = &Declaration> {
        self.children(id).filter(|d| d.kind.is_type())
    }

    pub fn constructors(&self, type_id: &DeclarationId) -> Vec<&Declaration> {
        self.members(type_id)
            .filter(|d| d.kind == DeclarationKind::Constructor)
            .collect()
    }

    /// Binary name of the top-level type enclosing a declaration
    pub fn top_level_type(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.lexical_chain(id)
            .into_iter()
            .rev()
            .find(|d| d.kind.is_type())
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    pub fn supertypes(&self, type_id: &DeclarationId) -> &[SuperLink] {
        self.supertypes
            .get(type_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn superclass(&self, type_id: &DeclarationId) -> Option<&TypeTarget> {
        self.supertypes(type_id)
            .iter()
            .find(|l| l.relation == SuperRelation::Superclass)
            .map(|l| &l.target)
    }

    /// Source superclass, if the direct superclass is in the source tree
    pub fn source_superclass(&self, type_id: &DeclarationId) -> Option<&Declaration> {
        self.superclass(type_id)
            .and_then(TypeTarget::source)
            .and_then(|id| self.get(id))
    }

    pub fn subtypes(&self, type_id: &DeclarationId) -> &[DeclarationId] {
        self.subtypes
            .get(type_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Transitive source supertypes in breadth-first order
    pub fn ancestors(&self, type_id: &DeclarationId) -> Vec<DeclarationId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<&DeclarationId> = VecDeque::new();
        queue.push_back(type_id);
        while let Some(current) = queue.pop_front() {
            for link in self.supertypes(current) {
                if let TypeTarget::Source(id) = &link.target {
                    if id != type_id && seen.insert(id.clone()) {
                        order.push(id.clone());
                        queue.push_back(id);
                    }
                }
            }
        }
        order
    }

    /// Whether the type or any source ancestor extends something opaque
    pub fn has_external_ancestor(&self, type_id: &DeclarationId) -> bool {
        std::iter::once(type_id.clone())
            .chain(self.ancestors(type_id))
            .any(|t| self.supertypes(&t).iter().any(|l| l.target.is_opaque()))
    }

    pub fn is_subtype_of(&self, sub: &DeclarationId, sup: &DeclarationId) -> bool {
        sub == sup || self.ancestors(sub).contains(sup)
    }

    /// Source methods this method overrides, across all source ancestors
    pub fn overridden_bases(&self, method: &DeclarationId) -> &[DeclarationId] {
        self.overrides
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Source methods overriding this one
    pub fn overriders(&self, method: &DeclarationId) -> &[DeclarationId] {
        self.overridden_by
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Overrides something outside the source tree
    pub fn is_external_override(&self, method: &DeclarationId) -> bool {
        self.external_overrides.contains(method)
    }

    /// The single abstract method of a source functional interface
    pub fn single_abstract_method(&self, type_id: &DeclarationId) -> Option<DeclarationId> {
        let decl = self.get(type_id)?;
        if decl.kind != DeclarationKind::Interface {
            return None;
        }
        let mut abstract_methods = self
            .members(type_id)
            .filter(|m| m.kind == DeclarationKind::Method && m.is_abstract && !is_object_method(m));
        let first = abstract_methods.next()?;
        if abstract_methods.next().is_some() {
            return None;
        }
        Some(first.id.clone())
    }

    /// Source types an import makes visible, empty when it only names
    /// things outside the source tree
    pub fn import_source_targets(&self, import_id: &DeclarationId) -> Vec<DeclarationId> {
        let Some(info) = self.get(import_id).and_then(|d| d.import.as_ref()) else {
            return Vec::new();
        };
        let type_name = match (info.is_static, info.on_demand) {
            (false, false) | (true, true) => info.target.as_str(),
            (true, false) => info.qualifier(),
            (false, true) => {
                if let Some(owner) = self.graph.find_by_fqn(&info.target) {
                    return vec![owner.id.clone()];
                }
                return self
                    .units
                    .iter()
                    .filter(|u| u.package.as_deref() == Some(info.target.as_str()))
                    .flat_map(|u| u.types.iter().cloned())
                    .collect();
            }
        };
        self.graph
            .find_by_fqn(type_name)
            .map(|d| vec![d.id.clone()])
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Linking, run once by the builder
    // ------------------------------------------------------------------

    pub(super) fn link_hierarchy(&mut self) {
        let type_ids: Vec<DeclarationId> = self
            .declarations()
            .filter(|d| d.kind.is_type())
            .map(|d| d.id.clone())
            .collect();

        // the second pass sees member types inherited through the first
        for _ in 0..2 {
            let mut links = HashMap::new();
            for id in &type_ids {
                let Some(decl) = self.get(id) else { continue };
                let scope = decl.parent.clone().unwrap_or_else(|| id.clone());
                let resolved: Vec<SuperLink> = decl
                    .super_types
                    .iter()
                    .map(|st| {
                        let target = self.resolve_type_name(&st.name, &scope).target;
                        let relation = match &target {
                            TypeTarget::Source(t)
                                if self.get(t).map(|d| d.kind) == Some(DeclarationKind::Interface) =>
                            {
                                SuperRelation::Interface
                            }
                            _ => st.relation,
                        };
                        SuperLink {
                            name: st.name.clone(),
                            target,
                            relation,
                        }
                    })
                    .collect();
                links.insert(id.clone(), resolved);
            }
            self.supertypes = links;
        }

        let mut subtypes: HashMap<DeclarationId, Vec<DeclarationId>> = HashMap::new();
        for id in &type_ids {
            for link in self.supertypes(id) {
                if let TypeTarget::Source(sup) = &link.target {
                    subtypes.entry(sup.clone()).or_default().push(id.clone());
                }
            }
        }
        self.subtypes = subtypes;

        for id in &type_ids {
            for link in self.supertypes(id).to_vec() {
                if let TypeTarget::Unresolved(name) = &link.target {
                    let location = self.get(id).map(|d| d.location.clone());
                    self.diagnostics.insert(Diagnostic::new(
                        DiagnosticKind::UnresolvedType,
                        location.as_ref(),
                        format!("cannot resolve supertype {} of {}", name, id),
                    ));
                }
            }
        }
    }

    pub(super) fn link_overrides(&mut self) {
        let methods: Vec<DeclarationId> = self
            .declarations()
            .filter(|d| d.kind == DeclarationKind::Method && !d.is_static)
            .filter(|d| d.visibility != Visibility::Private)
            .map(|d| d.id.clone())
            .collect();

        let mut overrides: HashMap<DeclarationId, Vec<DeclarationId>> = HashMap::new();
        let mut overridden_by: HashMap<DeclarationId, Vec<DeclarationId>> = HashMap::new();
        let mut external = HashSet::new();

        for method_id in &methods {
            let Some(method) = self.get(method_id) else { continue };
            let Some(owner) = self.owner_type(method_id) else { continue };

            let mut bases = Vec::new();
            for ancestor in self.ancestors(&owner.id) {
                for base in self.members(&ancestor) {
                    if self.is_override_of(method, base) {
                        bases.push(base.id.clone());
                    }
                }
            }

            let opaque_super = owner.is_anonymous() || self.has_external_ancestor(&owner.id);
            let is_external = is_object_method(method)
                || (bases.is_empty() && (method.has_annotation("Override") || opaque_super));
            if is_external {
                external.insert(method_id.clone());
            }

            for base in &bases {
                overridden_by
                    .entry(base.clone())
                    .or_default()
                    .push(method_id.clone());
            }
            if !bases.is_empty() {
                overrides.insert(method_id.clone(), bases);
            }
        }

        debug!(
            "Linked {} overriding methods, {} external overrides",
            overrides.len(),
            external.len()
        );
        self.overrides = overrides;
        self.overridden_by = overridden_by;
        self.external_overrides = external;
    }

    fn is_override_of(&self, method: &Declaration, base: &Declaration) -> bool {
        if base.kind != DeclarationKind::Method
            || base.name != method.name
            || base.is_static
            || base.visibility == Visibility::Private
            || base.arity() != method.arity()
        {
            return false;
        }
        if base.visibility == Visibility::PackagePrivate {
            let same_package = self.unit_of(&base.id).and_then(|u| u.package.as_ref())
                == self.unit_of(&method.id).and_then(|u| u.package.as_ref());
            if !same_package {
                return false;
            }
        }
        let (Some(derived_sig), Some(base_sig)) = (&method.signature, &base.signature) else {
            return false;
        };
        let type_vars = self.type_variables_in_scope(&base.id);
        derived_sig
            .erased_params()
            .iter()
            .zip(base_sig.erased_params().iter())
            .all(|(d, b)| {
                simple_type(d) == simple_type(b)
                    || (type_vars.iter().any(|tv| tv == b.trim_end_matches("[]"))
                        && !is_primitive(d))
            })
    }

    /// Type variables declared on a declaration and everything enclosing it
    pub fn type_variables_in_scope(&self, id: &DeclarationId) -> Vec<String> {
        self.lexical_chain(id)
            .into_iter()
            .flat_map(|d| {
                d.type_params
                    .iter()
                    .chain(d.signature.iter().flat_map(|s| s.type_params.iter()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Declarations in the given nesting position directly inside `id`
    pub fn types_with_nesting(&self, id: &DeclarationId, nesting: TypeNesting) -> Vec<&Declaration> {
        self.children(id)
            .filter(|d| d.kind.is_type() && d.nesting == Some(nesting))
            .collect()
    }
}

/// Last segment of a dotted type name, array suffix kept
pub fn simple_type(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

pub fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "byte" | "short" | "int" | "long" | "float" | "double" | "char" | "boolean" | "void"
    )
}
