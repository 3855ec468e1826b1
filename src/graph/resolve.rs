//! Name, type and member resolution over a built [`SourceContext`].
//!
//! Resolution never fails hard: anything that cannot be placed becomes a
//! [`Diagnostic`] plus conservative edges to every plausible source
//! candidate, so later stages over-retain rather than break compilation.

use super::context::{is_primitive, simple_type, Diagnostic, DiagnosticKind, SourceContext, TypeTarget};
use super::{
    ArgType, Declaration, DeclarationId, DeclarationKind, Delegation, MemberSite, MemberSiteKind,
    Receiver, RefTarget, Reference, ReferenceKind, TypeNesting, UnresolvedReference, Visibility,
};
use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, trace};

/// Where a member use lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberTarget {
    Source(DeclarationId),
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, miette::Diagnostic)]
pub enum ResolutionError {
    #[error("cannot resolve type `{0}`")]
    #[diagnostic(code(testprune::resolve::unknown_type))]
    UnknownType(String),

    #[error("no member `{name}` in `{owner}`")]
    #[diagnostic(code(testprune::resolve::no_such_member))]
    NoSuchMember { owner: String, name: String },

    #[error("ambiguous reference to `{name}` ({} candidates)", .candidates.len())]
    #[diagnostic(code(testprune::resolve::ambiguous))]
    Ambiguous {
        name: String,
        candidates: Vec<DeclarationId>,
    },
}

/// Result of resolving a type name in some scope
#[derive(Debug, Clone)]
pub struct TypeResolution {
    pub target: TypeTarget,
    /// Imports that made the name visible
    pub imports: Vec<DeclarationId>,
    /// Placed only because a non-source wildcard import could supply it
    pub inferred: bool,
}

impl TypeResolution {
    fn of(target: TypeTarget) -> Self {
        Self {
            target,
            imports: Vec::new(),
            inferred: false,
        }
    }

    fn via(target: TypeTarget, import: &DeclarationId) -> Self {
        Self {
            target,
            imports: vec![import.clone()],
            inferred: false,
        }
    }
}

/// A graph edge produced by resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    to: DeclarationId,
    kind: ReferenceKind,
    conservative: bool,
}

impl Edge {
    fn new(to: &DeclarationId, kind: ReferenceKind) -> Self {
        Self {
            to: to.clone(),
            kind,
            conservative: false,
        }
    }

    fn conservative(to: &DeclarationId, kind: ReferenceKind) -> Self {
        Self {
            to: to.clone(),
            kind,
            conservative: true,
        }
    }
}

/// Static type of a receiver expression
#[derive(Debug, Clone)]
enum ReceiverType {
    Known { target: TypeTarget, static_only: bool },
    Array,
    /// Could come from something outside the source tree
    Opaque,
    Unknown(String),
}

#[derive(Debug, Default)]
struct FieldLookup {
    field: Option<DeclarationId>,
    imports: Vec<DeclarationId>,
    opaque: bool,
}

const JAVA_LANG: &[&str] = &[
    "Object", "String", "Class", "Enum", "Record", "Void", "Boolean", "Byte", "Character", "Short",
    "Integer", "Long", "Float", "Double", "Number", "Math", "StrictMath", "System", "Runtime",
    "Thread", "ThreadLocal", "Runnable", "Iterable", "Comparable", "CharSequence", "Cloneable",
    "AutoCloseable", "Appendable", "Readable", "StringBuilder", "StringBuffer", "Process",
    "ProcessBuilder", "ClassLoader", "StackTraceElement", "Package", "Module", "Throwable",
    "Exception", "Error", "RuntimeException", "IllegalArgumentException", "IllegalStateException",
    "UnsupportedOperationException", "NullPointerException", "IndexOutOfBoundsException",
    "ArrayIndexOutOfBoundsException", "StringIndexOutOfBoundsException", "ClassCastException",
    "ArithmeticException", "NumberFormatException", "NegativeArraySizeException",
    "ArrayStoreException", "CloneNotSupportedException", "InterruptedException",
    "SecurityException", "ReflectiveOperationException", "ClassNotFoundException",
    "NoSuchMethodException", "NoSuchFieldException", "IllegalAccessException",
    "InstantiationException", "AssertionError", "OutOfMemoryError", "StackOverflowError",
    "ExceptionInInitializerError", "LinkageError", "NoClassDefFoundError", "VirtualMachineError",
    "InternalError", "Override", "Deprecated", "SuppressWarnings", "FunctionalInterface",
    "SafeVarargs",
];

const OBJECT_METHOD_NAMES: &[&str] = &[
    "getClass", "hashCode", "equals", "toString", "clone", "finalize", "notify", "notifyAll",
    "wait",
];

fn boxed(primitive: &str) -> Option<&'static str> {
    Some(match primitive {
        "int" => "Integer",
        "long" => "Long",
        "short" => "Short",
        "byte" => "Byte",
        "char" => "Character",
        "boolean" => "Boolean",
        "float" => "Float",
        "double" => "Double",
        _ => return None,
    })
}

fn unboxed(reference: &str) -> Option<&'static str> {
    Some(match reference {
        "Integer" => "int",
        "Long" => "long",
        "Short" => "short",
        "Byte" => "byte",
        "Character" => "char",
        "Boolean" => "boolean",
        "Float" => "float",
        "Double" => "double",
        _ => return None,
    })
}

fn widens_to(from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }
    let targets: &[&str] = match from {
        "byte" => &["short", "int", "long", "float", "double"],
        "short" | "char" => &["int", "long", "float", "double"],
        "int" => &["long", "float", "double"],
        "long" => &["float", "double"],
        "float" => &["double"],
        _ => &[],
    };
    targets.contains(&to)
}

/// Supertypes of well-known `java.lang` classes, by simple name
fn known_supertypes(simple: &str) -> Option<&'static [&'static str]> {
    Some(match simple {
        "String" => &["Object", "CharSequence", "Comparable", "Serializable"],
        "Integer" | "Long" | "Short" | "Byte" | "Float" | "Double" => {
            &["Object", "Number", "Comparable", "Serializable"]
        }
        "Character" | "Boolean" => &["Object", "Comparable", "Serializable"],
        "StringBuilder" | "StringBuffer" => &["Object", "CharSequence", "Appendable", "Serializable"],
        "Class" => &["Object", "Serializable"],
        "Object" => &[],
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Strict,
    Loose,
    Varargs,
}

impl SourceContext {
    // ------------------------------------------------------------------
    // Reference resolution, run once by the builder
    // ------------------------------------------------------------------

    pub(super) fn resolve_references(&mut self, references: Vec<UnresolvedReference>) {
        let resolved: Vec<(Vec<Edge>, Option<Diagnostic>)> = references
            .par_iter()
            .map(|r| self.resolve_reference(r))
            .collect();

        for (reference, (edges, diagnostic)) in references.iter().zip(resolved) {
            for edge in edges {
                if edge.to == reference.from {
                    continue;
                }
                let resolved = Reference::new(edge.kind, reference.location.clone(), reference.name.clone())
                    .with_context(reference.context)
                    .with_conservative(edge.conservative);
                self.graph.add_reference(&reference.from, &edge.to, resolved);
            }
            if let Some(diagnostic) = diagnostic {
                debug!("{}", diagnostic);
                self.diagnostics.insert(diagnostic);
            }
        }
    }

    fn resolve_reference(&self, r: &UnresolvedReference) -> (Vec<Edge>, Option<Diagnostic>) {
        match &r.target {
            RefTarget::Declared(id) => (vec![Edge::new(id, r.kind)], None),
            RefTarget::Type(name) => {
                let resolution = self.resolve_type_name(name, &r.from);
                let mut edges = import_edges(&resolution.imports);
                let mut diagnostic = None;
                match &resolution.target {
                    TypeTarget::Source(id) => edges.push(Edge::new(id, r.kind)),
                    TypeTarget::Unresolved(n) => {
                        diagnostic = Some(Diagnostic::new(
                            DiagnosticKind::UnresolvedType,
                            Some(&r.location),
                            format!("cannot resolve type {} in {}", n, r.from),
                        ));
                    }
                    _ => {}
                }
                (edges, diagnostic)
            }
            RefTarget::Name(name) => self.resolve_expression_name(r, name),
            RefTarget::Member(site) => {
                let mut credits = Vec::new();
                match self.resolve_member_inner(&r.from, site, &mut credits) {
                    Ok(MemberTarget::Source(id)) => {
                        credits.push(Edge::new(&id, r.kind));
                        (credits, None)
                    }
                    Ok(MemberTarget::External(name)) => {
                        trace!("{} -> external {}", r.from, name);
                        (credits, None)
                    }
                    Err(err) => {
                        let (kind, candidates) = match &err {
                            ResolutionError::Ambiguous { candidates, .. } => {
                                (DiagnosticKind::AmbiguousMember, candidates.clone())
                            }
                            _ => (DiagnosticKind::UnresolvedMember, self.same_named_candidates(site)),
                        };
                        credits.extend(candidates.iter().map(|c| Edge::conservative(c, r.kind)));
                        let diagnostic = Diagnostic::new(
                            kind,
                            Some(&r.location),
                            format!("{} in {}", err, r.from),
                        );
                        (credits, Some(diagnostic))
                    }
                }
            }
        }
    }

    /// Bare identifier in an expression: a field in scope, a statically
    /// imported field, or a type
    fn resolve_expression_name(&self, r: &UnresolvedReference, name: &str) -> (Vec<Edge>, Option<Diagnostic>) {
        let lookup = self.find_field_in_scope(&r.from, name);
        let mut edges = import_edges(&lookup.imports);
        if let Some(field) = &lookup.field {
            edges.push(Edge::new(field, r.kind));
            return (edges, None);
        }
        if lookup.opaque {
            return (edges, None);
        }

        let as_type = self.resolve_type_name(name, &r.from);
        match &as_type.target {
            TypeTarget::Source(id) => {
                edges.extend(import_edges(&as_type.imports));
                edges.push(Edge::new(id, ReferenceKind::Type));
                return (edges, None);
            }
            TypeTarget::External(_) if !as_type.inferred => {
                edges.extend(import_edges(&as_type.imports));
                return (edges, None);
            }
            _ => {}
        }

        // switch labels name enum constants of a type we do not track
        let candidates: Vec<DeclarationId> = self
            .graph
            .find_by_name(name)
            .into_iter()
            .filter(|d| matches!(d.kind, DeclarationKind::Field | DeclarationKind::EnumCase))
            .map(|d| d.id.clone())
            .collect();
        if candidates.is_empty() {
            edges.extend(import_edges(&as_type.imports));
            if as_type.inferred {
                return (edges, None);
            }
        }
        edges.extend(candidates.iter().map(|c| Edge::conservative(c, r.kind)));
        let diagnostic = Diagnostic::new(
            DiagnosticKind::UnresolvedMember,
            Some(&r.location),
            format!("cannot resolve name {} in {}", name, r.from),
        );
        (edges, Some(diagnostic))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Resolve a written type name as seen from `from`.
    ///
    /// Order: type variables, member types along the enclosing chain and
    /// their supertypes, local classes, same unit, single imports, same
    /// package, on-demand imports, `java.lang`, classpath.
    pub fn resolve_type_name(&self, name: &str, from: &DeclarationId) -> TypeResolution {
        let element = name.trim_end_matches("[]");
        if is_primitive(element) {
            return TypeResolution::of(TypeTarget::External(element.to_string()));
        }
        if element.contains('.') {
            return self.resolve_qualified_type(element, from);
        }

        if self.type_variables_in_scope(from).iter().any(|tv| tv == element) {
            return TypeResolution::of(TypeTarget::TypeVar(element.to_string()));
        }

        for scope in self.lexical_chain(from) {
            if let Some(found) = self
                .children(&scope.id)
                .find(|c| c.kind.is_type() && c.name == element && !c.is_anonymous())
            {
                return TypeResolution::of(TypeTarget::Source(found.id.clone()));
            }
            if scope.kind.is_type() {
                if scope.name == element && !scope.is_anonymous() {
                    return TypeResolution::of(TypeTarget::Source(scope.id.clone()));
                }
                if let Some(inherited) = self.inherited_member_type(&scope.id, element) {
                    return TypeResolution::of(TypeTarget::Source(inherited));
                }
            }
        }

        let Some(unit) = self.unit_of(from) else {
            return TypeResolution::of(TypeTarget::Unresolved(element.to_string()));
        };

        if let Some(top) = unit
            .types
            .iter()
            .filter_map(|t| self.get(t))
            .find(|t| t.name == element)
        {
            return TypeResolution::of(TypeTarget::Source(top.id.clone()));
        }

        let imports: Vec<&Declaration> = unit.imports.iter().filter_map(|i| self.get(i)).collect();

        for import in &imports {
            let Some(info) = &import.import else { continue };
            if info.is_static || info.on_demand || info.simple_name() != Some(element) {
                continue;
            }
            let target = match self.graph.find_by_fqn(&info.target) {
                Some(decl) => TypeTarget::Source(decl.id.clone()),
                None => TypeTarget::External(info.target.clone()),
            };
            return TypeResolution::via(target, &import.id);
        }

        let package_qualified = match &unit.package {
            Some(pkg) => format!("{}.{}", pkg, element),
            None => element.to_string(),
        };
        if let Some(decl) = self.graph.find_by_fqn(&package_qualified) {
            return TypeResolution::of(TypeTarget::Source(decl.id.clone()));
        }
        if let Some(binary) = self.classpath.lookup(&package_qualified) {
            return TypeResolution::of(TypeTarget::External(binary));
        }

        for import in &imports {
            let Some(info) = &import.import else { continue };
            if !info.on_demand {
                continue;
            }
            let candidate = format!("{}.{}", info.target, element);
            if let Some(decl) = self.graph.find_by_fqn(&candidate) {
                return TypeResolution::via(TypeTarget::Source(decl.id.clone()), &import.id);
            }
            if let Some(binary) = self.classpath.lookup(&candidate) {
                return TypeResolution::via(TypeTarget::External(binary), &import.id);
            }
        }

        if JAVA_LANG.contains(&element) {
            return TypeResolution::of(TypeTarget::External(format!("java.lang.{}", element)));
        }
        if let Some(binary) = self.classpath.lookup(element) {
            return TypeResolution::of(TypeTarget::External(binary));
        }

        let opaque_imports: Vec<DeclarationId> = imports
            .iter()
            .filter(|i| {
                i.import
                    .as_ref()
                    .map(|info| {
                        info.on_demand
                            && !info.is_static
                            && !self.is_source_package(&info.target)
                            && self.graph.find_by_fqn(&info.target).is_none()
                    })
                    .unwrap_or(false)
            })
            .map(|i| i.id.clone())
            .collect();
        if !opaque_imports.is_empty() {
            return TypeResolution {
                target: TypeTarget::External(element.to_string()),
                imports: opaque_imports,
                inferred: true,
            };
        }

        TypeResolution::of(TypeTarget::Unresolved(element.to_string()))
    }

    fn resolve_qualified_type(&self, name: &str, from: &DeclarationId) -> TypeResolution {
        let Some((first, rest)) = name.split_once('.') else {
            return self.resolve_type_name(name, from);
        };

        if first.starts_with(|c: char| c.is_uppercase()) {
            let head = self.resolve_type_name(first, from);
            match &head.target {
                TypeTarget::Source(id) => {
                    let mut current = id.clone();
                    for segment in rest.split('.') {
                        let next = self
                            .children(&current)
                            .find(|c| c.kind.is_type() && c.name == segment)
                            .map(|c| c.id.clone())
                            .or_else(|| self.inherited_member_type(&current, segment));
                        match next {
                            Some(next) => current = next,
                            None => {
                                return TypeResolution {
                                    target: TypeTarget::Unresolved(name.to_string()),
                                    imports: head.imports,
                                    inferred: false,
                                }
                            }
                        }
                    }
                    return TypeResolution {
                        target: TypeTarget::Source(current),
                        imports: head.imports,
                        inferred: false,
                    };
                }
                TypeTarget::External(q) if !head.inferred => {
                    return TypeResolution {
                        target: TypeTarget::External(format!("{}.{}", q, rest)),
                        imports: head.imports,
                        inferred: false,
                    };
                }
                _ => {}
            }
        }

        if let Some(decl) = self.graph.find_by_fqn(name) {
            return TypeResolution::of(TypeTarget::Source(decl.id.clone()));
        }
        if let Some(binary) = self.classpath.lookup(name) {
            return TypeResolution::of(TypeTarget::External(binary));
        }
        if first.starts_with(|c: char| c.is_lowercase()) {
            return TypeResolution::of(TypeTarget::External(name.to_string()));
        }
        TypeResolution::of(TypeTarget::Unresolved(name.to_string()))
    }

    fn inherited_member_type(&self, type_id: &DeclarationId, name: &str) -> Option<DeclarationId> {
        self.ancestors(type_id).into_iter().find_map(|ancestor| {
            self.children(&ancestor)
                .find(|c| c.kind.is_type() && c.name == name && c.nesting == Some(TypeNesting::Member))
                .map(|c| c.id.clone())
        })
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    /// Resolve a member use site appearing in `from`
    pub fn resolve_member(&self, from: &DeclarationId, site: &MemberSite) -> Result<MemberTarget, ResolutionError> {
        let mut credits = Vec::new();
        self.resolve_member_inner(from, site, &mut credits)
    }

    fn resolve_member_inner(
        &self,
        from: &DeclarationId,
        site: &MemberSite,
        credits: &mut Vec<Edge>,
    ) -> Result<MemberTarget, ResolutionError> {
        match &site.kind {
            MemberSiteKind::Constructor { type_name } => {
                let resolution = self.resolve_type_name(type_name, from);
                credits.extend(import_edges(&resolution.imports));
                self.constructor_of(resolution.target, site)
            }
            MemberSiteKind::Delegation(delegation) => {
                let enclosing = self
                    .enclosing_type(from)
                    .ok_or_else(|| ResolutionError::UnknownType(from.to_string()))?;
                let target = match delegation {
                    Delegation::This => TypeTarget::Source(enclosing.id.clone()),
                    Delegation::Super => self
                        .superclass(&enclosing.id)
                        .cloned()
                        .unwrap_or_else(|| TypeTarget::External("java.lang.Object".into())),
                };
                self.constructor_of(target, site)
            }
            MemberSiteKind::Method => self.resolve_method(from, site, credits),
            MemberSiteKind::Field => self.resolve_field(from, site, credits),
            MemberSiteKind::MethodRef => self.resolve_method_ref(from, site, credits),
        }
    }

    fn constructor_of(&self, target: TypeTarget, site: &MemberSite) -> Result<MemberTarget, ResolutionError> {
        match target {
            TypeTarget::Source(type_id) => {
                let ctors = self.constructors(&type_id);
                if ctors.is_empty() {
                    // implicit default constructor
                    return Ok(MemberTarget::Source(type_id));
                }
                self.select_overload(ctors, &site.arguments, &type_id.to_string(), "<init>")
                    .map(MemberTarget::Source)
            }
            TypeTarget::External(name) => Ok(MemberTarget::External(name)),
            TypeTarget::TypeVar(name) => Ok(MemberTarget::External(name)),
            TypeTarget::Unresolved(name) => Err(ResolutionError::UnknownType(name)),
        }
    }

    fn resolve_method(
        &self,
        from: &DeclarationId,
        site: &MemberSite,
        credits: &mut Vec<Edge>,
    ) -> Result<MemberTarget, ResolutionError> {
        if site.receiver == Receiver::Implicit {
            return self.resolve_unqualified_method(from, site, credits);
        }

        match self.type_of_receiver(from, &site.receiver, credits) {
            ReceiverType::Known {
                target: TypeTarget::Source(type_id),
                static_only,
            } => {
                let mut candidates = self.methods_named(&type_id, &site.name);
                if static_only && candidates.iter().any(|c| c.is_static) {
                    candidates.retain(|c| c.is_static);
                }
                if candidates.is_empty() {
                    if self.has_external_ancestor(&type_id)
                        || OBJECT_METHOD_NAMES.contains(&site.name.as_str())
                    {
                        return Ok(MemberTarget::External(site.name.clone()));
                    }
                    return Err(ResolutionError::NoSuchMember {
                        owner: type_id.to_string(),
                        name: site.name.clone(),
                    });
                }
                self.select_overload(candidates, &site.arguments, type_id.as_str(), &site.name)
                    .map(MemberTarget::Source)
            }
            ReceiverType::Known {
                target: TypeTarget::External(owner),
                ..
            } => Ok(MemberTarget::External(format!("{}.{}", owner, site.name))),
            ReceiverType::Array | ReceiverType::Opaque => {
                Ok(MemberTarget::External(site.name.clone()))
            }
            ReceiverType::Known { target, .. } => self.untyped_fallback(site, &describe_target(&target)),
            ReceiverType::Unknown(what) => self.untyped_fallback(site, &what),
        }
    }

    fn resolve_unqualified_method(
        &self,
        from: &DeclarationId,
        site: &MemberSite,
        credits: &mut Vec<Edge>,
    ) -> Result<MemberTarget, ResolutionError> {
        let mut opaque = false;
        for scope in self.lexical_chain(from) {
            if !scope.kind.is_type() {
                continue;
            }
            let candidates = self.methods_named(&scope.id, &site.name);
            if !candidates.is_empty() {
                return self
                    .select_overload(candidates, &site.arguments, scope.id.as_str(), &site.name)
                    .map(MemberTarget::Source);
            }
            opaque |= scope.is_anonymous() || self.has_external_ancestor(&scope.id);
        }

        let mut opaque_imports = Vec::new();
        for import in self.static_imports(from) {
            let Some(info) = &import.import else { continue };
            let owner_name = if info.on_demand {
                info.target.as_str()
            } else if info.simple_name() == Some(site.name.as_str()) {
                info.qualifier()
            } else {
                continue;
            };
            match self.graph.find_by_fqn(owner_name) {
                Some(owner) => {
                    let candidates: Vec<&Declaration> = self
                        .methods_named(&owner.id, &site.name)
                        .into_iter()
                        .filter(|m| m.is_static)
                        .collect();
                    if !candidates.is_empty() {
                        credits.push(Edge::new(&import.id, ReferenceKind::Import));
                        return self
                            .select_overload(candidates, &site.arguments, owner_name, &site.name)
                            .map(MemberTarget::Source);
                    }
                }
                None if !info.on_demand => {
                    credits.push(Edge::new(&import.id, ReferenceKind::Import));
                    return Ok(MemberTarget::External(format!("{}.{}", owner_name, site.name)));
                }
                None => opaque_imports.push(import.id.clone()),
            }
        }

        if opaque || !opaque_imports.is_empty() {
            credits.extend(import_edges(&opaque_imports));
            return Ok(MemberTarget::External(site.name.clone()));
        }
        if OBJECT_METHOD_NAMES.contains(&site.name.as_str()) {
            return Ok(MemberTarget::External(site.name.clone()));
        }
        Err(ResolutionError::NoSuchMember {
            owner: self
                .enclosing_type(from)
                .map(|t| t.id.to_string())
                .unwrap_or_default(),
            name: site.name.clone(),
        })
    }

    fn resolve_field(
        &self,
        from: &DeclarationId,
        site: &MemberSite,
        credits: &mut Vec<Edge>,
    ) -> Result<MemberTarget, ResolutionError> {
        if site.receiver == Receiver::Implicit {
            let lookup = self.find_field_in_scope(from, &site.name);
            credits.extend(import_edges(&lookup.imports));
            return match lookup.field {
                Some(field) => Ok(MemberTarget::Source(field)),
                None if lookup.opaque => Ok(MemberTarget::External(site.name.clone())),
                None => Err(ResolutionError::NoSuchMember {
                    owner: from.to_string(),
                    name: site.name.clone(),
                }),
            };
        }

        match self.type_of_receiver(from, &site.receiver, credits) {
            ReceiverType::Known {
                target: TypeTarget::Source(type_id),
                ..
            } => {
                if let Some(field) = self.find_member_field(&type_id, &site.name) {
                    return Ok(MemberTarget::Source(field));
                }
                if let Some(nested) = self
                    .children(&type_id)
                    .find(|c| c.kind.is_type() && c.name == site.name)
                {
                    return Ok(MemberTarget::Source(nested.id.clone()));
                }
                if self.has_external_ancestor(&type_id) {
                    return Ok(MemberTarget::External(site.name.clone()));
                }
                Err(ResolutionError::NoSuchMember {
                    owner: type_id.to_string(),
                    name: site.name.clone(),
                })
            }
            ReceiverType::Known {
                target: TypeTarget::External(owner),
                ..
            } => Ok(MemberTarget::External(format!("{}.{}", owner, site.name))),
            ReceiverType::Array | ReceiverType::Opaque => {
                Ok(MemberTarget::External(site.name.clone()))
            }
            ReceiverType::Known { target, .. } => self.untyped_fallback(site, &describe_target(&target)),
            ReceiverType::Unknown(what) => self.untyped_fallback(site, &what),
        }
    }

    fn resolve_method_ref(
        &self,
        from: &DeclarationId,
        site: &MemberSite,
        credits: &mut Vec<Edge>,
    ) -> Result<MemberTarget, ResolutionError> {
        match self.type_of_receiver(from, &site.receiver, credits) {
            ReceiverType::Known {
                target: TypeTarget::Source(type_id),
                ..
            } => {
                let candidates: Vec<DeclarationId> = if site.name == "<init>" {
                    let ctors = self.constructors(&type_id);
                    if ctors.is_empty() {
                        return Ok(MemberTarget::Source(type_id));
                    }
                    ctors.into_iter().map(|c| c.id.clone()).collect()
                } else {
                    self.methods_named(&type_id, &site.name)
                        .into_iter()
                        .map(|m| m.id.clone())
                        .collect()
                };
                match candidates.len() {
                    0 if self.has_external_ancestor(&type_id) => {
                        Ok(MemberTarget::External(site.name.clone()))
                    }
                    0 => Err(ResolutionError::NoSuchMember {
                        owner: type_id.to_string(),
                        name: site.name.clone(),
                    }),
                    1 => Ok(MemberTarget::Source(candidates[0].clone())),
                    _ => Err(ResolutionError::Ambiguous {
                        name: site.name.clone(),
                        candidates,
                    }),
                }
            }
            ReceiverType::Known {
                target: TypeTarget::External(owner),
                ..
            } => Ok(MemberTarget::External(format!("{}::{}", owner, site.name))),
            ReceiverType::Array | ReceiverType::Opaque => {
                Ok(MemberTarget::External(site.name.clone()))
            }
            ReceiverType::Known { target, .. } => self.untyped_fallback(site, &describe_target(&target)),
            ReceiverType::Unknown(what) => self.untyped_fallback(site, &what),
        }
    }

    /// No usable receiver type: any same-named source member could be meant
    fn untyped_fallback(&self, site: &MemberSite, receiver: &str) -> Result<MemberTarget, ResolutionError> {
        if self.same_named_candidates(site).is_empty() {
            Ok(MemberTarget::External(site.name.clone()))
        } else {
            Err(ResolutionError::UnknownType(receiver.to_string()))
        }
    }

    fn same_named_candidates(&self, site: &MemberSite) -> Vec<DeclarationId> {
        let arity = site.arguments.len();
        self.graph
            .find_by_name(&site.name)
            .into_iter()
            .filter(|d| match &site.kind {
                MemberSiteKind::Method => d.kind == DeclarationKind::Method && arity_matches(d, arity),
                MemberSiteKind::MethodRef => d.kind == DeclarationKind::Method,
                MemberSiteKind::Field => {
                    matches!(d.kind, DeclarationKind::Field | DeclarationKind::EnumCase)
                }
                _ => false,
            })
            .map(|d| d.id.clone())
            .collect()
    }

    /// Methods named `name` visible in a type: its own, then inherited ones
    /// not hidden by an equal erased signature
    pub fn methods_named(&self, type_id: &DeclarationId, name: &str) -> Vec<&Declaration> {
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut found = Vec::new();
        for (depth, owner) in std::iter::once(type_id.clone())
            .chain(self.ancestors(type_id))
            .enumerate()
        {
            for member in self.members(&owner) {
                if member.kind != DeclarationKind::Method || member.name != name {
                    continue;
                }
                if depth > 0 && member.visibility == Visibility::Private {
                    continue;
                }
                let erased = member
                    .signature
                    .as_ref()
                    .map(|s| s.erased_params().iter().map(|p| simple_type(p).to_string()).collect())
                    .unwrap_or_default();
                if seen.insert(erased) {
                    found.push(member);
                }
            }
        }
        found
    }

    /// A field or enum constant of a type or its source ancestors
    pub fn find_member_field(&self, type_id: &DeclarationId, name: &str) -> Option<DeclarationId> {
        std::iter::once(type_id.clone())
            .chain(self.ancestors(type_id))
            .find_map(|owner| {
                self.members(&owner)
                    .find(|m| {
                        matches!(m.kind, DeclarationKind::Field | DeclarationKind::EnumCase)
                            && m.name == name
                    })
                    .map(|m| m.id.clone())
            })
    }

    fn find_field_in_scope(&self, from: &DeclarationId, name: &str) -> FieldLookup {
        let mut lookup = FieldLookup::default();
        for scope in self.lexical_chain(from) {
            if !scope.kind.is_type() {
                continue;
            }
            if let Some(field) = self.find_member_field(&scope.id, name) {
                lookup.field = Some(field);
                return lookup;
            }
            lookup.opaque |= scope.is_anonymous() || self.has_external_ancestor(&scope.id);
        }

        for import in self.static_imports(from) {
            let Some(info) = &import.import else { continue };
            let owner_name = if info.on_demand {
                info.target.as_str()
            } else if info.simple_name() == Some(name) {
                info.qualifier()
            } else {
                continue;
            };
            match self.graph.find_by_fqn(owner_name) {
                Some(owner) => {
                    if let Some(field) = self.find_member_field(&owner.id, name) {
                        lookup.field = Some(field);
                        lookup.imports = vec![import.id.clone()];
                        return lookup;
                    }
                }
                None => {
                    lookup.opaque = true;
                    lookup.imports.push(import.id.clone());
                    if !info.on_demand {
                        lookup.imports = vec![import.id.clone()];
                        return lookup;
                    }
                }
            }
        }
        lookup
    }

    fn static_imports(&self, from: &DeclarationId) -> Vec<&Declaration> {
        self.unit_of(from)
            .map(|unit| {
                unit.imports
                    .iter()
                    .filter_map(|i| self.get(i))
                    .filter(|i| i.import.as_ref().map(|info| info.is_static).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Receivers
    // ------------------------------------------------------------------

    fn type_of_receiver(&self, from: &DeclarationId, receiver: &Receiver, credits: &mut Vec<Edge>) -> ReceiverType {
        match receiver {
            Receiver::Implicit | Receiver::This => match self.enclosing_type(from) {
                Some(t) => ReceiverType::Known {
                    target: TypeTarget::Source(t.id.clone()),
                    static_only: false,
                },
                None => ReceiverType::Unknown("this".into()),
            },
            Receiver::Super => {
                let target = self
                    .enclosing_type(from)
                    .and_then(|t| self.superclass(&t.id).cloned())
                    .unwrap_or_else(|| TypeTarget::External("java.lang.Object".into()));
                ReceiverType::Known {
                    target,
                    static_only: false,
                }
            }
            Receiver::QualifiedThis(name) => {
                let resolution = self.resolve_type_name(name, from);
                credits.extend(import_edges(&resolution.imports));
                ReceiverType::Known {
                    target: resolution.target,
                    static_only: false,
                }
            }
            Receiver::Name(name) => {
                let lookup = self.find_field_in_scope(from, name);
                credits.extend(import_edges(&lookup.imports));
                if let Some(field) = lookup.field {
                    credits.push(Edge::new(&field, ReferenceKind::Read));
                    return self.type_of_field(&field);
                }
                if lookup.opaque && name.starts_with(|c: char| c.is_lowercase()) {
                    return ReceiverType::Opaque;
                }
                self.type_receiver(name, from, credits)
                    .unwrap_or_else(|| ReceiverType::Unknown(name.clone()))
            }
            Receiver::Field(inner, name) => {
                if let Some(dotted) = receiver.dotted_name() {
                    if name.starts_with(|c: char| c.is_uppercase()) {
                        if let Some(as_type) = self.type_receiver(&dotted, from, credits) {
                            return as_type;
                        }
                    }
                }
                match self.type_of_receiver(from, inner, credits) {
                    ReceiverType::Known {
                        target: TypeTarget::Source(owner),
                        static_only,
                    } => {
                        if let Some(field) = self.find_member_field(&owner, name) {
                            credits.push(Edge::new(&field, ReferenceKind::Read));
                            return self.type_of_field(&field);
                        }
                        if static_only {
                            if let Some(nested) = self
                                .children(&owner)
                                .find(|c| c.kind.is_type() && &c.name == name)
                            {
                                credits.push(Edge::new(&nested.id, ReferenceKind::Type));
                                return ReceiverType::Known {
                                    target: TypeTarget::Source(nested.id.clone()),
                                    static_only: true,
                                };
                            }
                        }
                        if self.has_external_ancestor(&owner) {
                            ReceiverType::Opaque
                        } else {
                            ReceiverType::Unknown(format!("{}.{}", owner, name))
                        }
                    }
                    ReceiverType::Array if name == "length" => ReceiverType::Known {
                        target: TypeTarget::External("int".into()),
                        static_only: false,
                    },
                    ReceiverType::Unknown(what) => ReceiverType::Unknown(format!("{}.{}", what, name)),
                    _ => ReceiverType::Opaque,
                }
            }
            Receiver::Typed(name) => {
                if name.ends_with("[]") {
                    return ReceiverType::Array;
                }
                let resolution = self.resolve_type_name(name, from);
                match resolution.target {
                    TypeTarget::Unresolved(n) | TypeTarget::TypeVar(n) => ReceiverType::Unknown(n),
                    target => ReceiverType::Known {
                        target,
                        static_only: false,
                    },
                }
            }
            Receiver::Call(site) => {
                let mut ignored = Vec::new();
                match self.resolve_member_inner(from, site, &mut ignored) {
                    Ok(MemberTarget::Source(method)) => self.type_of_result(&method),
                    Ok(MemberTarget::External(_)) => ReceiverType::Opaque,
                    Err(_) => ReceiverType::Unknown(format!("{}()", site.name)),
                }
            }
            Receiver::Unknown => ReceiverType::Unknown("expression".into()),
        }
    }

    /// A receiver written as a type name: only static members are reachable
    fn type_receiver(&self, name: &str, from: &DeclarationId, credits: &mut Vec<Edge>) -> Option<ReceiverType> {
        let resolution = self.resolve_type_name(name, from);
        match &resolution.target {
            TypeTarget::Source(id) => {
                credits.extend(import_edges(&resolution.imports));
                credits.push(Edge::new(id, ReferenceKind::Type));
            }
            TypeTarget::External(_) if !resolution.inferred || name.starts_with(|c: char| c.is_uppercase()) => {
                credits.extend(import_edges(&resolution.imports));
            }
            _ => return None,
        }
        Some(ReceiverType::Known {
            target: resolution.target,
            static_only: true,
        })
    }

    fn type_of_field(&self, field: &DeclarationId) -> ReceiverType {
        let Some(type_name) = self.get(field).and_then(|f| f.field_type.as_ref()) else {
            return ReceiverType::Unknown(field.to_string());
        };
        self.type_in_scope(type_name, field)
    }

    fn type_of_result(&self, method: &DeclarationId) -> ReceiverType {
        let Some(return_type) = self
            .get(method)
            .and_then(|m| m.signature.as_ref())
            .and_then(|s| s.return_type.as_ref())
        else {
            // constructors and implicit constructors produce their type
            return match self.enclosing_type(method) {
                Some(t) => ReceiverType::Known {
                    target: TypeTarget::Source(t.id.clone()),
                    static_only: false,
                },
                None => ReceiverType::Unknown(method.to_string()),
            };
        };
        self.type_in_scope(return_type, method)
    }

    fn type_in_scope(&self, type_name: &str, scope: &DeclarationId) -> ReceiverType {
        if type_name.ends_with("[]") {
            return ReceiverType::Array;
        }
        match self.resolve_type_name(type_name, scope).target {
            TypeTarget::Unresolved(n) | TypeTarget::TypeVar(n) => ReceiverType::Unknown(n),
            target => ReceiverType::Known {
                target,
                static_only: false,
            },
        }
    }

    // ------------------------------------------------------------------
    // Overloads
    // ------------------------------------------------------------------

    fn select_overload(
        &self,
        candidates: Vec<&Declaration>,
        args: &[ArgType],
        owner: &str,
        name: &str,
    ) -> Result<DeclarationId, ResolutionError> {
        let by_arity: Vec<&Declaration> = candidates
            .into_iter()
            .filter(|c| arity_matches(c, args.len()))
            .collect();
        match by_arity.len() {
            0 => {
                return Err(ResolutionError::NoSuchMember {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            1 => return Ok(by_arity[0].id.clone()),
            _ => {}
        }

        for phase in [Phase::Strict, Phase::Loose, Phase::Varargs] {
            let applicable: Vec<&Declaration> = by_arity
                .iter()
                .copied()
                .filter(|c| self.is_applicable(c, args, phase))
                .collect();
            match applicable.len() {
                0 => continue,
                1 => return Ok(applicable[0].id.clone()),
                _ => {
                    return self.most_specific(&applicable).ok_or_else(|| {
                        ResolutionError::Ambiguous {
                            name: name.to_string(),
                            candidates: applicable.iter().map(|c| c.id.clone()).collect(),
                        }
                    })
                }
            }
        }

        Err(ResolutionError::Ambiguous {
            name: name.to_string(),
            candidates: by_arity.iter().map(|c| c.id.clone()).collect(),
        })
    }

    fn is_applicable(&self, candidate: &Declaration, args: &[ArgType], phase: Phase) -> bool {
        let Some(signature) = &candidate.signature else {
            return args.is_empty();
        };
        let params = signature.erased_params();
        match phase {
            Phase::Strict | Phase::Loose => {
                params.len() == args.len()
                    && args
                        .iter()
                        .zip(&params)
                        .all(|(a, p)| self.accepts(a, p, phase == Phase::Loose, candidate))
            }
            Phase::Varargs => {
                if !signature.is_varargs() {
                    return false;
                }
                let fixed = params.len() - 1;
                let element = params[fixed].trim_end_matches("[]").to_string();
                args.iter().enumerate().all(|(i, a)| {
                    let p = if i < fixed { &params[i] } else { &element };
                    self.accepts(a, p, true, candidate)
                })
            }
        }
    }

    fn accepts(&self, arg: &ArgType, param: &str, loose: bool, candidate: &Declaration) -> bool {
        match arg {
            ArgType::Unknown => true,
            ArgType::Null => !is_primitive(param),
            ArgType::Known(t) => self.assignable(t, param, loose, candidate),
        }
    }

    fn assignable(&self, from: &str, to: &str, loose: bool, candidate: &Declaration) -> bool {
        let (from_s, to_s) = (simple_type(from), simple_type(to));
        if from_s == to_s {
            return true;
        }
        let to_element = to_s.trim_end_matches("[]");
        if self
            .type_variables_in_scope(&candidate.id)
            .iter()
            .any(|tv| tv == to_element)
        {
            return !is_primitive(from_s) || loose;
        }

        match (is_primitive(from_s), is_primitive(to_s)) {
            (true, true) => return widens_to(from_s, to_s),
            (true, false) => {
                return loose
                    && boxed(from_s)
                        .map(|b| b == to_s || known_supertypes(b).map(|s| s.contains(&to_s)).unwrap_or(false))
                        .unwrap_or(false)
            }
            (false, true) => {
                return loose && unboxed(from_s).map(|u| widens_to(u, to_s)).unwrap_or(false)
            }
            (false, false) => {}
        }

        if to_s == "Object" {
            return true;
        }
        match (from_s.ends_with("[]"), to_s.ends_with("[]")) {
            (true, true) => {
                let (fe, te) = (&from_s[..from_s.len() - 2], &to_s[..to_s.len() - 2]);
                return if is_primitive(fe) || is_primitive(te) {
                    fe == te
                } else {
                    self.assignable(fe, te, false, candidate)
                };
            }
            (true, false) => return matches!(to_s, "Cloneable" | "Serializable"),
            (false, true) => return false,
            (false, false) => {}
        }

        if let Some(supers) = known_supertypes(from_s) {
            return supers.contains(&to_s);
        }

        let source_types: Vec<&Declaration> = self
            .graph
            .find_by_name(from_s)
            .into_iter()
            .filter(|d| d.kind.is_type())
            .collect();
        if source_types.is_empty() {
            // an external argument type could implement anything
            return true;
        }
        let target_is_source = self
            .graph
            .find_by_name(to_s)
            .iter()
            .any(|d| d.kind.is_type());
        source_types.iter().any(|t| {
            let ancestors = self.ancestors(&t.id);
            ancestors
                .iter()
                .filter_map(|a| self.get(a))
                .any(|a| a.name == to_s)
                || (!target_is_source && self.has_external_ancestor(&t.id))
        })
    }

    fn most_specific(&self, applicable: &[&Declaration]) -> Option<DeclarationId> {
        let more_specific = |a: &Declaration, b: &Declaration| -> bool {
            let (Some(sa), Some(sb)) = (&a.signature, &b.signature) else {
                return false;
            };
            let (pa, pb) = (sa.erased_params(), sb.erased_params());
            pa.len() == pb.len()
                && pa
                    .iter()
                    .zip(&pb)
                    .all(|(x, y)| self.assignable(x, y, false, b))
        };

        let maximal: Vec<&Declaration> = applicable
            .iter()
            .copied()
            .filter(|m| {
                applicable
                    .iter()
                    .all(|o| o.id == m.id || (more_specific(m, o) && !more_specific(o, m)))
            })
            .collect();
        match maximal.as_slice() {
            [only] => Some(only.id.clone()),
            _ => None,
        }
    }
}

fn arity_matches(decl: &Declaration, arity: usize) -> bool {
    match &decl.signature {
        Some(sig) if sig.is_varargs() => arity + 1 >= sig.arity(),
        Some(sig) => sig.arity() == arity,
        None => arity == 0,
    }
}

fn import_edges(imports: &[DeclarationId]) -> Vec<Edge> {
    imports
        .iter()
        .map(|i| Edge::new(i, ReferenceKind::Import))
        .collect()
}

fn describe_target(target: &TypeTarget) -> String {
    match target {
        TypeTarget::Source(id) => id.to_string(),
        TypeTarget::External(n) | TypeTarget::TypeVar(n) | TypeTarget::Unresolved(n) => n.clone(),
    }
}
