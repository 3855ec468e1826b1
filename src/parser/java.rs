use super::common::{
    children_of_kind, descendants, erase_type, first_child_of_kind, leading_comment_start,
    named_children, node_location, node_range, node_text, ParseResult, Parser,
};
use crate::graph::{
    AnnotationUse, ArgType, ByteRange, Declaration, DeclarationId, DeclarationKind, Delegation,
    FieldGroup, ImportInfo, MemberSite, Param, Receiver, RefContext, RefTarget, ReferenceKind,
    Signature, SuperRelation, SuperTypeRef, TypeNesting, UnresolvedReference, Visibility,
};
use miette::{IntoDiagnostic, Result};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Node, Parser as TsParser};
use tracing::debug;

/// Java source code parser using tree-sitter
pub struct JavaParser;

impl JavaParser {
    pub fn new() -> Self {
        Self
    }
}

impl JavaParser {
    /// Number of ERROR and MISSING nodes tree-sitter produces for `contents`
    pub fn count_syntax_errors(&self, contents: &str) -> Result<usize> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_java::language())
            .into_diagnostic()?;
        let tree = parser
            .parse(contents, None)
            .ok_or_else(|| miette::miette!("Failed to parse Java source"))?;
        let root = tree.root_node();
        if !root.has_error() {
            return Ok(0);
        }
        Ok(descendants(root)
            .filter(|n| n.is_error() || n.is_missing())
            .count())
    }
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for JavaParser {
    fn parse(&self, path: &Path, contents: &str) -> Result<ParseResult> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_java::language())
            .into_diagnostic()?;

        let tree = parser
            .parse(contents, None)
            .ok_or_else(|| miette::miette!("Failed to parse Java file: {}", path.display()))?;

        let root = tree.root_node();
        let mut walker = UnitWalker::new(path, contents);
        walker.walk_program(root);

        let mut result = walker.finish();
        if root.has_error() {
            result.syntax_errors = descendants(root)
                .filter(|n| n.is_error() || n.is_missing())
                .count();
        }

        debug!(
            "Parsed {}: {} declarations, {} references",
            path.display(),
            result.declarations.len(),
            result.references.len()
        );

        Ok(result)
    }
}

/// Per-class naming state: javac numbers anonymous and local classes
/// within their innermost enclosing class
struct TypeFrame {
    id: DeclarationId,
    canonical: Option<String>,
    kind: DeclarationKind,
    anonymous: usize,
    local_names: HashMap<String, usize>,
    static_inits: usize,
    instance_inits: usize,
}

struct LocalVar {
    name: String,
    type_name: Option<String>,
    scope: ByteRange,
    declared_at: usize,
}

/// Keywords and annotations of a `modifiers` node
#[derive(Default)]
struct Modifiers<'t> {
    keywords: Vec<String>,
    annotations: Vec<(AnnotationUse, Node<'t>)>,
}

impl Modifiers<'_> {
    fn has(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }
}

struct UnitWalker<'a> {
    path: &'a Path,
    source: &'a str,
    package: Option<String>,
    frames: Vec<TypeFrame>,
    locals: Vec<LocalVar>,
    declarations: Vec<Declaration>,
    references: Vec<UnresolvedReference>,
}

impl<'a> UnitWalker<'a> {
    fn new(path: &'a Path, source: &'a str) -> Self {
        Self {
            path,
            source,
            package: None,
            frames: Vec::new(),
            locals: Vec::new(),
            declarations: Vec::new(),
            references: Vec::new(),
        }
    }

    fn finish(self) -> ParseResult {
        ParseResult {
            declarations: self.declarations,
            references: self.references,
            package: self.package,
            syntax_errors: 0,
        }
    }

    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.source)
    }

    fn walk_program(&mut self, root: Node) {
        for child in named_children(root) {
            match child.kind() {
                "package_declaration" => {
                    self.package = named_children(child)
                        .into_iter()
                        .find(|n| n.kind() == "scoped_identifier" || n.kind() == "identifier")
                        .map(|n| self.text(n).to_string());
                }
                "import_declaration" => self.declare_import(child),
                "class_declaration"
                | "interface_declaration"
                | "enum_declaration"
                | "annotation_type_declaration"
                | "record_declaration" => {
                    self.declare_type(child, TypeNesting::TopLevel, None);
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declare_import(&mut self, node: Node) {
        let Some(name_node) = named_children(node)
            .into_iter()
            .find(|n| n.kind() == "scoped_identifier" || n.kind() == "identifier")
        else {
            return;
        };

        let mut cursor = node.walk();
        let is_static = node.children(&mut cursor).any(|c| c.kind() == "static");
        let on_demand = first_child_of_kind(node, "asterisk").is_some();
        let target = self.text(name_node).to_string();

        let display = format!(
            "{}{}{}",
            if is_static { "static " } else { "" },
            target,
            if on_demand { ".*" } else { "" }
        );

        let id = DeclarationId::for_import(self.path, &display);
        let mut decl = Declaration::new(
            id,
            display,
            DeclarationKind::Import,
            node_location(self.path, node),
        );
        decl.extent.full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        decl.import = Some(ImportInfo {
            target,
            is_static,
            on_demand,
        });
        self.declarations.push(decl);
    }

    fn declare_type(
        &mut self,
        node: Node,
        nesting: TypeNesting,
        parent: Option<DeclarationId>,
    ) -> DeclarationId {
        let kind = match node.kind() {
            "interface_declaration" => DeclarationKind::Interface,
            "enum_declaration" => DeclarationKind::Enum,
            "annotation_type_declaration" => DeclarationKind::Annotation,
            _ => DeclarationKind::Class,
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();

        let outer_kind = self.frames.last().map(|f| f.kind);
        let (binary, canonical) = match (nesting, self.frames.last_mut()) {
            (TypeNesting::Member, Some(outer)) => (
                format!("{}${}", outer.id, name),
                outer.canonical.as_ref().map(|c| format!("{}.{}", c, name)),
            ),
            (TypeNesting::Local, Some(outer)) => {
                let ordinal = outer.local_names.entry(name.clone()).or_insert(0);
                *ordinal += 1;
                (format!("{}${}{}", outer.id, ordinal, name), None)
            }
            _ => {
                let fqn = match &self.package {
                    Some(pkg) => format!("{}.{}", pkg, name),
                    None => name.clone(),
                };
                (fqn.clone(), Some(fqn))
            }
        };

        let id = DeclarationId::for_type(&binary);
        let mods = self.read_modifiers(node);
        let mut decl = Declaration::new(
            id.clone(),
            name,
            kind,
            node_location(self.path, node),
        );
        decl.fully_qualified_name = canonical.clone();
        decl.nesting = Some(nesting);
        decl.parent = parent;
        decl.extent.full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        self.apply_modifiers(&mut decl, &mods);
        // nested interfaces, enums, records and members of interfaces are implicitly static
        if nesting == TypeNesting::Member
            && (kind != DeclarationKind::Class
                || node.kind() == "record_declaration"
                || matches!(
                    outer_kind,
                    Some(DeclarationKind::Interface) | Some(DeclarationKind::Annotation)
                ))
        {
            decl.is_static = true;
        }
        if kind == DeclarationKind::Interface || kind == DeclarationKind::Annotation {
            decl.is_abstract = true;
        }
        if let Some(type_params) = first_child_of_kind(node, "type_parameters") {
            decl.type_params = self.type_parameter_names(type_params);
        }

        let mut clause_types: Vec<(Node, SuperRelation)> = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "superclass" => {
                    if let Some(ty) = named_children(child).into_iter().next() {
                        clause_types.push((ty, SuperRelation::Superclass));
                    }
                }
                "super_interfaces" | "extends_interfaces" => {
                    decl.extent.interface_clause = Some(node_range(child));
                    if let Some(list) = first_child_of_kind(child, "type_list") {
                        for ty in named_children(list) {
                            clause_types.push((ty, SuperRelation::Interface));
                        }
                    }
                }
                _ => {}
            }
        }
        for (ty, relation) in &clause_types {
            decl.super_types.push(SuperTypeRef {
                name: erase_type(self.text(*ty)),
                relation: *relation,
                span: node_range(*ty),
            });
        }

        self.declarations.push(decl);

        self.emit_annotation_refs(&mods, &id);
        if let Some(type_params) = first_child_of_kind(node, "type_parameters") {
            self.walk_type(type_params, &id, ReferenceKind::Type, RefContext::signature());
        }
        for (ty, _) in clause_types {
            self.walk_type(ty, &id, ReferenceKind::Inheritance, RefContext::signature());
        }

        self.frames.push(TypeFrame {
            id: id.clone(),
            canonical,
            kind,
            anonymous: 0,
            local_names: HashMap::new(),
            static_inits: 0,
            instance_inits: 0,
        });

        if node.kind() == "record_declaration" {
            if let Some(params) = node.child_by_field_name("parameters") {
                self.declare_record_components(params, &id);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_type_body(body, &id, kind);
        }

        self.frames.pop();
        id
    }

    fn walk_type_body(&mut self, body: Node, owner: &DeclarationId, owner_kind: DeclarationKind) {
        for child in named_children(body) {
            match child.kind() {
                "class_declaration"
                | "interface_declaration"
                | "enum_declaration"
                | "annotation_type_declaration"
                | "record_declaration" => {
                    self.declare_type(child, TypeNesting::Member, Some(owner.clone()));
                }
                "method_declaration" | "annotation_type_element_declaration" => {
                    self.declare_method(child, owner, owner_kind);
                }
                "constructor_declaration" | "compact_constructor_declaration" => {
                    self.declare_constructor(child, owner);
                }
                "field_declaration" | "constant_declaration" => {
                    self.declare_fields(child, owner, owner_kind);
                }
                "static_initializer" => self.declare_initializer(child, owner, true),
                "block" => self.declare_initializer(child, owner, false),
                "enum_constant" => self.declare_enum_constant(child, owner),
                "enum_body_declarations" => self.walk_type_body(child, owner, owner_kind),
                _ => {}
            }
        }
    }

    fn declare_method(&mut self, node: Node, owner: &DeclarationId, owner_kind: DeclarationKind) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.formal_parameters(p))
            .unwrap_or_default();
        let type_params = first_child_of_kind(node, "type_parameters")
            .map(|tp| self.type_parameter_names(tp))
            .unwrap_or_default();
        let return_type = node
            .child_by_field_name("type")
            .map(|t| erase_type(self.text(t)));

        let erased: Vec<String> = params.iter().map(|(p, _)| p.erased()).collect();
        let id = DeclarationId::for_method(owner, &name, &erased);
        let body = node.child_by_field_name("body");
        let mods = self.read_modifiers(node);

        let mut decl = Declaration::new(
            id.clone(),
            name,
            DeclarationKind::Method,
            node_location(self.path, node),
        );
        decl.parent = Some(owner.clone());
        decl.extent.full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        decl.extent.body = body.map(node_range);
        self.apply_modifiers(&mut decl, &mods);
        let in_interface = matches!(
            owner_kind,
            DeclarationKind::Interface | DeclarationKind::Annotation
        );
        if in_interface {
            if !mods.has("private") {
                decl.visibility = Visibility::Public;
            }
            if body.is_none() && !mods.has("static") {
                decl.is_abstract = true;
            }
        }
        decl.signature = Some(Signature {
            params: params.iter().map(|(p, _)| p.clone()).collect(),
            return_type,
            type_params,
        });
        self.declarations.push(decl);

        self.emit_annotation_refs(&mods, &id);
        self.emit_signature_refs(node, &params, &id);
        if let Some(value) = node.child_by_field_name("value") {
            // annotation element default
            let ctx = RefContext {
                in_annotation: true,
                ..RefContext::signature()
            };
            self.walk_code(value, &id, ctx);
        }
        if let Some(body) = body {
            self.walk_code(body, &id, RefContext::body());
        }
    }

    fn declare_constructor(&mut self, node: Node, owner: &DeclarationId) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.formal_parameters(p))
            .unwrap_or_default();
        let erased: Vec<String> = params.iter().map(|(p, _)| p.erased()).collect();
        let id = DeclarationId::for_constructor(owner, &erased);
        let body = node.child_by_field_name("body");
        let mods = self.read_modifiers(node);

        let mut decl = Declaration::new(
            id.clone(),
            name,
            DeclarationKind::Constructor,
            node_location(self.path, node),
        );
        decl.parent = Some(owner.clone());
        decl.extent.full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        decl.extent.body = body.map(node_range);
        decl.extent.ctor_invocation = body
            .and_then(|b| first_child_of_kind(b, "explicit_constructor_invocation"))
            .map(node_range);
        self.apply_modifiers(&mut decl, &mods);
        decl.signature = Some(Signature {
            params: params.iter().map(|(p, _)| p.clone()).collect(),
            return_type: None,
            type_params: Vec::new(),
        });
        self.declarations.push(decl);

        self.emit_annotation_refs(&mods, &id);
        self.emit_signature_refs(node, &params, &id);
        if let Some(body) = body {
            self.walk_code(body, &id, RefContext::body());
        }
    }

    fn declare_fields(&mut self, node: Node, owner: &DeclarationId, owner_kind: DeclarationKind) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let base_type = erase_type(self.text(type_node));
        let declarators = children_of_kind(node, "variable_declarator");
        let mods = self.read_modifiers(node);
        let full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        let in_interface = matches!(
            owner_kind,
            DeclarationKind::Interface | DeclarationKind::Annotation
        );

        for (index, declarator) in declarators.iter().enumerate() {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(name_node).to_string();
            let dims = declarator
                .child_by_field_name("dimensions")
                .map(|d| self.text(d).matches('[').count())
                .unwrap_or(0);
            let id = DeclarationId::for_field(owner, &name);
            let value = declarator.child_by_field_name("value");

            let grouped = declarators.len() > 1;
            let location = if grouped {
                node_location(self.path, *declarator)
            } else {
                node_location(self.path, node)
            };
            let mut decl = Declaration::new(id.clone(), name, DeclarationKind::Field, location);
            decl.parent = Some(owner.clone());
            decl.field_type = Some(format!("{}{}", base_type, "[]".repeat(dims)));
            decl.extent.full = if grouped { node_range(*declarator) } else { full };
            decl.extent.initializer = value.map(node_range);
            if grouped {
                decl.extent.field_group = Some(FieldGroup {
                    span: full,
                    index,
                    len: declarators.len(),
                });
            }
            self.apply_modifiers(&mut decl, &mods);
            if in_interface {
                decl.is_static = true;
                decl.visibility = Visibility::Public;
            }
            self.declarations.push(decl);

            self.emit_annotation_refs(&mods, &id);
            self.walk_type(type_node, &id, ReferenceKind::Type, RefContext::signature());
            if let Some(value) = value {
                self.walk_code(value, &id, RefContext::body());
            }
        }
    }

    fn declare_record_components(&mut self, params: Node, owner: &DeclarationId) {
        for (param, type_node) in self.formal_parameters(params) {
            let id = DeclarationId::for_field(owner, &param.name);
            let mut decl = Declaration::new(
                id.clone(),
                param.name.clone(),
                DeclarationKind::Field,
                node_location(self.path, params),
            );
            decl.parent = Some(owner.clone());
            decl.field_type = Some(param.erased());
            decl.visibility = Visibility::Private;
            decl.modifiers = vec!["private".into(), "final".into()];
            // components live in the record header and are never edited alone
            decl.extent.full = ByteRange::new(params.start_byte(), params.start_byte());
            self.declarations.push(decl);
            if let Some(ty) = type_node {
                self.walk_type(ty, &id, ReferenceKind::Type, RefContext::signature());
            }
        }
    }

    fn declare_initializer(&mut self, node: Node, owner: &DeclarationId, is_static: bool) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let ordinal = if is_static {
            frame.static_inits += 1;
            frame.static_inits - 1
        } else {
            frame.instance_inits += 1;
            frame.instance_inits - 1
        };

        let block = if is_static {
            first_child_of_kind(node, "block")
        } else {
            Some(node)
        };

        let id = DeclarationId::for_initializer(owner, is_static, ordinal);
        let name = if is_static { "<clinit>" } else { "<init>" };
        let mut decl = Declaration::new(
            id.clone(),
            name.to_string(),
            DeclarationKind::Initializer,
            node_location(self.path, node),
        );
        decl.parent = Some(owner.clone());
        decl.is_static = is_static;
        decl.extent.full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        decl.extent.body = block.map(node_range);
        if is_static {
            decl.modifiers.push("static".into());
        }
        self.declarations.push(decl);

        if let Some(block) = block {
            self.walk_code(block, &id, RefContext::body());
        }
    }

    fn declare_enum_constant(&mut self, node: Node, owner: &DeclarationId) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let id = DeclarationId::for_field(owner, &name);
        let mods = self.read_modifiers(node);

        let mut decl = Declaration::new(
            id.clone(),
            name,
            DeclarationKind::EnumCase,
            node_location(self.path, node),
        );
        decl.parent = Some(owner.clone());
        decl.is_static = true;
        decl.visibility = Visibility::Public;
        decl.field_type = self.frames.last().map(|f| simple_type_name(&f.id));
        decl.extent.full = ByteRange::new(leading_comment_start(node, self.source), node.end_byte());
        self.apply_modifiers(&mut decl, &mods);
        self.declarations.push(decl);
        self.emit_annotation_refs(&mods, &id);

        let arguments = node.child_by_field_name("arguments");
        let args = arguments.map(|a| self.arg_types(a)).unwrap_or_default();
        if let Some(arguments) = arguments {
            self.walk_code(arguments, &id, RefContext::body());
        }

        match node.child_by_field_name("body") {
            Some(body) => {
                let anon = self.declare_anonymous(body, None, &id, args);
                self.add_ref(
                    &id,
                    anon.to_string(),
                    RefTarget::Declared(anon),
                    ReferenceKind::Instantiation,
                    node,
                    RefContext::body(),
                );
            }
            None => {
                self.add_ref(
                    &id,
                    "<init>".to_string(),
                    RefTarget::Member(MemberSite::delegation(Delegation::This, args)),
                    ReferenceKind::Instantiation,
                    node,
                    RefContext::body(),
                );
            }
        }
    }

    /// Declare an anonymous class body; `super_type` is `None` for enum
    /// constant bodies, whose superclass is the enclosing enum
    fn declare_anonymous(
        &mut self,
        body: Node,
        super_type: Option<Node>,
        parent: &DeclarationId,
        args: Vec<ArgType>,
    ) -> DeclarationId {
        let (outer_id, ordinal) = match self.frames.last_mut() {
            Some(frame) => {
                frame.anonymous += 1;
                (frame.id.clone(), frame.anonymous)
            }
            None => (DeclarationId::new("<unit>"), 0),
        };
        let id = DeclarationId::for_type(&format!("{}${}", outer_id, ordinal));

        let mut decl = Declaration::new(
            id.clone(),
            ordinal.to_string(),
            DeclarationKind::Class,
            node_location(self.path, body),
        );
        decl.parent = Some(parent.clone());
        decl.nesting = Some(TypeNesting::Anonymous);
        decl.extent.full = node_range(body);
        let super_name = match super_type {
            Some(ty) => erase_type(self.text(ty)),
            None => simple_type_name(&outer_id),
        };
        decl.super_types.push(SuperTypeRef {
            name: super_name.clone(),
            relation: SuperRelation::Superclass,
            span: super_type.map(node_range).unwrap_or_default(),
        });
        self.declarations.push(decl);

        match super_type {
            Some(ty) => self.walk_type(ty, &id, ReferenceKind::Inheritance, RefContext::signature()),
            None => self.add_ref(
                &id,
                super_name.clone(),
                RefTarget::Declared(outer_id.clone()),
                ReferenceKind::Inheritance,
                body,
                RefContext::signature(),
            ),
        }
        // the implicit constructor passes its arguments to the supertype
        self.add_ref(
            &id,
            "super".to_string(),
            RefTarget::Member(MemberSite::delegation(Delegation::Super, args)),
            ReferenceKind::Delegation,
            body,
            RefContext::signature(),
        );

        self.frames.push(TypeFrame {
            id: id.clone(),
            canonical: None,
            kind: DeclarationKind::Class,
            anonymous: 0,
            local_names: HashMap::new(),
            static_inits: 0,
            instance_inits: 0,
        });
        self.walk_type_body(body, &id, DeclarationKind::Class);
        self.frames.pop();
        id
    }

    // ------------------------------------------------------------------
    // Modifiers, parameters and signatures
    // ------------------------------------------------------------------

    fn read_modifiers<'t>(&self, node: Node<'t>) -> Modifiers<'t> {
        let mut mods = Modifiers::default();
        let Some(modifiers) = first_child_of_kind(node, "modifiers") else {
            return mods;
        };
        let mut cursor = modifiers.walk();
        for child in modifiers.children(&mut cursor) {
            match child.kind() {
                "marker_annotation" | "annotation" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    mods.annotations.push((
                        AnnotationUse {
                            name,
                            span: node_range(child),
                        },
                        child,
                    ));
                }
                "line_comment" | "block_comment" => {}
                _ => mods.keywords.push(self.text(child).to_string()),
            }
        }
        mods
    }

    fn apply_modifiers(&self, decl: &mut Declaration, mods: &Modifiers) {
        let keywords: Vec<&str> = mods.keywords.iter().map(String::as_str).collect();
        decl.visibility = Visibility::from_java_modifiers(&keywords);
        decl.is_static = decl.is_static || mods.has("static");
        decl.is_abstract = decl.is_abstract || mods.has("abstract");
        decl.modifiers.extend(mods.keywords.iter().cloned());
        decl.annotations
            .extend(mods.annotations.iter().map(|(a, _)| a.clone()));
    }

    fn emit_annotation_refs(&mut self, mods: &Modifiers, from: &DeclarationId) {
        for (annotation, node) in &mods.annotations {
            self.annotation_ref(*node, annotation.name.clone(), from);
        }
    }

    fn annotation_ref(&mut self, node: Node, name: String, from: &DeclarationId) {
        self.add_ref(
            from,
            name.clone(),
            RefTarget::Type(name),
            ReferenceKind::Annotation,
            node,
            RefContext::signature(),
        );
        if let Some(arguments) = node.child_by_field_name("arguments") {
            let ctx = RefContext {
                in_annotation: true,
                ..RefContext::signature()
            };
            self.walk_code(arguments, from, ctx);
        }
    }

    fn type_parameter_names(&self, node: Node) -> Vec<String> {
        children_of_kind(node, "type_parameter")
            .into_iter()
            .filter_map(|tp| {
                named_children(tp)
                    .into_iter()
                    .find(|n| n.kind() == "type_identifier" || n.kind() == "identifier")
                    .map(|n| self.text(n).to_string())
            })
            .collect()
    }

    /// Parameters with their type nodes
    fn formal_parameters<'t>(&self, node: Node<'t>) -> Vec<(Param, Option<Node<'t>>)> {
        let mut params = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "formal_parameter" => {
                    let type_node = child.child_by_field_name("type");
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let dims = child
                        .child_by_field_name("dimensions")
                        .map(|d| self.text(d).matches('[').count())
                        .unwrap_or(0);
                    let base = type_node.map(|t| erase_type(self.text(t))).unwrap_or_default();
                    params.push((
                        Param {
                            name,
                            type_name: format!("{}{}", base, "[]".repeat(dims)),
                            varargs: false,
                        },
                        type_node,
                    ));
                }
                "spread_parameter" => {
                    let mut name = String::new();
                    let mut type_node = None;
                    for part in named_children(child) {
                        match part.kind() {
                            "modifiers" => {}
                            "variable_declarator" => {
                                name = part
                                    .child_by_field_name("name")
                                    .map(|n| self.text(n).to_string())
                                    .unwrap_or_default();
                            }
                            _ if type_node.is_none() => type_node = Some(part),
                            _ => {}
                        }
                    }
                    let base = type_node.map(|t| erase_type(self.text(t))).unwrap_or_default();
                    params.push((
                        Param {
                            name,
                            type_name: base,
                            varargs: true,
                        },
                        type_node,
                    ));
                }
                _ => {}
            }
        }
        params
    }

    /// Return type, parameter types, throws clause; parameters become locals
    fn emit_signature_refs(
        &mut self,
        node: Node,
        params: &[(Param, Option<Node>)],
        from: &DeclarationId,
    ) {
        if let Some(ty) = node.child_by_field_name("type") {
            self.walk_type(ty, from, ReferenceKind::Type, RefContext::signature());
        }
        if let Some(type_params) = first_child_of_kind(node, "type_parameters") {
            self.walk_type(type_params, from, ReferenceKind::Type, RefContext::signature());
        }
        for (param, type_node) in params {
            if let Some(ty) = type_node {
                self.walk_type(*ty, from, ReferenceKind::Type, RefContext::signature());
            }
            self.locals.push(LocalVar {
                name: param.name.clone(),
                type_name: Some(param.erased()),
                scope: node_range(node),
                declared_at: node.start_byte(),
            });
        }
        if let Some(parameters) = node.child_by_field_name("parameters") {
            // parameter annotations
            for param in named_children(parameters) {
                let mods = self.read_modifiers(param);
                self.emit_annotation_refs(&mods, from);
            }
        }
        if let Some(throws) = first_child_of_kind(node, "throws") {
            self.walk_type(throws, from, ReferenceKind::Type, RefContext::signature());
        }
    }

    // ------------------------------------------------------------------
    // Types in reference position
    // ------------------------------------------------------------------

    fn walk_type(&mut self, node: Node, from: &DeclarationId, kind: ReferenceKind, ctx: RefContext) {
        match node.kind() {
            "type_identifier" | "scoped_type_identifier" => {
                let name = erase_type(self.text(node));
                self.add_ref(from, name.clone(), RefTarget::Type(name), kind, node, ctx);
                // annotations inside a scoped type (`Outer.@A Inner`)
                for child in named_children(node) {
                    if child.kind() == "marker_annotation" || child.kind() == "annotation" {
                        self.walk_type(child, from, kind, ctx);
                    }
                }
            }
            "generic_type" => {
                for child in named_children(node) {
                    match child.kind() {
                        "type_arguments" => {
                            self.walk_type(child, from, ReferenceKind::Type, ctx)
                        }
                        _ => self.walk_type(child, from, kind, ctx),
                    }
                }
            }
            "marker_annotation" | "annotation" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                self.annotation_ref(node, name, from);
            }
            "integral_type" | "floating_point_type" | "boolean_type" | "void_type"
            | "identifier" | "line_comment" | "block_comment" => {}
            _ => {
                for child in named_children(node) {
                    self.walk_type(child, from, kind, ctx);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Code: bodies, initializers, annotation values
    // ------------------------------------------------------------------

    fn walk_code(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        match node.kind() {
            "line_comment" | "block_comment" => {}
            "identifier" => self.name_ref(node, from, ctx, ReferenceKind::Read),
            "method_invocation" => self.method_call(node, from, ctx),
            "object_creation_expression" => self.instantiation(node, from, ctx),
            "explicit_constructor_invocation" => self.delegation(node, from, ctx),
            "field_access" => self.field_access(node, from, ctx, ReferenceKind::Read),
            "assignment_expression" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.write_target(left, from, ctx);
                }
                if let Some(right) = node.child_by_field_name("right") {
                    self.walk_code(right, from, ctx);
                }
            }
            "update_expression" => {
                for child in named_children(node) {
                    self.write_target(child, from, ctx);
                }
            }
            "local_variable_declaration" => self.local_declaration(node, from, ctx),
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => {
                self.declare_type(node, TypeNesting::Local, Some(from.clone()));
            }
            "lambda_expression" => self.lambda(node, from, ctx),
            "method_reference" => self.method_reference(node, from, ctx),
            "cast_expression" => {
                for child in named_children(node) {
                    if Some(child) == node.child_by_field_name("value") {
                        self.walk_code(child, from, ctx);
                    } else {
                        self.walk_type(child, from, ReferenceKind::Cast, ctx);
                    }
                }
            }
            "instanceof_expression" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.walk_code(left, from, ctx);
                }
                let right = node.child_by_field_name("right");
                if let Some(right) = right {
                    self.walk_type(right, from, ReferenceKind::Cast, ctx);
                }
                if let Some(name) = node.child_by_field_name("name") {
                    let scope = node.parent().map(node_range).unwrap_or(node_range(node));
                    self.locals.push(LocalVar {
                        name: self.text(name).to_string(),
                        type_name: right.map(|r| erase_type(self.text(r))),
                        scope,
                        declared_at: node.start_byte(),
                    });
                }
            }
            "class_literal" => {
                for child in named_children(node) {
                    self.walk_type(child, from, ReferenceKind::Reflection, ctx);
                }
            }
            "assert_statement" => {
                let ctx = RefContext {
                    in_assertion: true,
                    ..ctx
                };
                for child in named_children(node) {
                    self.walk_code(child, from, ctx);
                }
            }
            "enhanced_for_statement" => {
                let type_node = node.child_by_field_name("type");
                if let Some(ty) = type_node {
                    self.walk_type(ty, from, ReferenceKind::Type, ctx);
                }
                if let Some(name) = node.child_by_field_name("name") {
                    self.locals.push(LocalVar {
                        name: self.text(name).to_string(),
                        type_name: type_node
                            .map(|t| erase_type(self.text(t)))
                            .filter(|t| t != "var"),
                        scope: node_range(node),
                        declared_at: node.start_byte(),
                    });
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.walk_code(value, from, ctx);
                }
                if let Some(body) = node.child_by_field_name("body") {
                    self.walk_code(body, from, ctx);
                }
            }
            "catch_clause" => {
                for child in named_children(node) {
                    if child.kind() == "catch_formal_parameter" {
                        self.catch_parameter(child, node, from, ctx);
                    } else {
                        self.walk_code(child, from, ctx);
                    }
                }
            }
            "resource" => {
                let type_node = node.child_by_field_name("type");
                match (type_node, node.child_by_field_name("name")) {
                    (Some(ty), Some(name)) => {
                        self.walk_type(ty, from, ReferenceKind::Type, ctx);
                        let scope = node
                            .parent()
                            .and_then(|spec| spec.parent())
                            .map(node_range)
                            .unwrap_or(node_range(node));
                        self.locals.push(LocalVar {
                            name: self.text(name).to_string(),
                            type_name: Some(erase_type(self.text(ty))).filter(|t| t != "var"),
                            scope,
                            declared_at: node.start_byte(),
                        });
                        if let Some(value) = node.child_by_field_name("value") {
                            self.walk_code(value, from, ctx);
                        }
                    }
                    _ => {
                        for child in named_children(node) {
                            self.walk_code(child, from, ctx);
                        }
                    }
                }
            }
            "labeled_statement" => {
                for child in named_children(node).into_iter().skip(1) {
                    self.walk_code(child, from, ctx);
                }
            }
            "break_statement" | "continue_statement" => {}
            "element_value_pair" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.walk_code(value, from, ctx);
                }
            }
            "marker_annotation" | "annotation" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                self.annotation_ref(node, name, from);
            }
            "type_identifier" | "scoped_type_identifier" | "generic_type" | "array_type"
            | "type_arguments" => {
                self.walk_type(node, from, ReferenceKind::Type, ctx);
            }
            "this" | "super" | "scoped_identifier" => {}
            _ => {
                for child in named_children(node) {
                    self.walk_code(child, from, ctx);
                }
            }
        }
    }

    fn write_target(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        match node.kind() {
            "identifier" => self.name_ref(node, from, ctx, ReferenceKind::Write),
            "field_access" => self.field_access(node, from, ctx, ReferenceKind::Write),
            _ => self.walk_code(node, from, ctx),
        }
    }

    fn name_ref(&mut self, node: Node, from: &DeclarationId, ctx: RefContext, kind: ReferenceKind) {
        let name = self.text(node);
        if self.local(name, node.start_byte()).is_some() {
            return;
        }
        self.add_ref(
            from,
            name.to_string(),
            RefTarget::Name(name.to_string()),
            kind,
            node,
            ctx,
        );
    }

    fn method_call(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        let site = self.call_site(node);
        self.add_ref(
            from,
            site.name.clone(),
            RefTarget::Member(site),
            ReferenceKind::Call,
            node,
            ctx,
        );
        if let Some(object) = node.child_by_field_name("object") {
            if !self.is_name_chain(object) {
                self.walk_code(object, from, ctx);
            }
        }
        if let Some(type_args) = node.child_by_field_name("type_arguments") {
            self.walk_type(type_args, from, ReferenceKind::Type, ctx);
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.walk_code(arguments, from, ctx);
        }
    }

    fn field_access(&mut self, node: Node, from: &DeclarationId, ctx: RefContext, kind: ReferenceKind) {
        let (Some(object), Some(field)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("field"),
        ) else {
            return;
        };

        if field.kind() == "this" {
            // Outer.this
            let name = erase_type(self.text(object));
            self.add_ref(from, name.clone(), RefTarget::Type(name), ReferenceKind::Type, node, ctx);
            return;
        }

        let site = MemberSite::field(self.text(field), self.receiver_of(object));
        self.add_ref(
            from,
            site.name.clone(),
            RefTarget::Member(site),
            kind,
            node,
            ctx,
        );
        if !self.is_name_chain(object) {
            self.walk_code(object, from, ctx);
        }
    }

    fn instantiation(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let type_name = erase_type(self.text(type_node));
        let arguments = node.child_by_field_name("arguments");
        let args = arguments.map(|a| self.arg_types(a)).unwrap_or_default();
        let body = first_child_of_kind(node, "class_body");

        for child in named_children(node) {
            if child == type_node || Some(child) == body {
                continue;
            }
            if child.kind() == "type_arguments" {
                self.walk_type(child, from, ReferenceKind::Type, ctx);
            } else {
                self.walk_code(child, from, ctx);
            }
        }

        match body {
            Some(body) => {
                let anon = self.declare_anonymous(body, Some(type_node), from, args);
                self.add_ref(
                    from,
                    anon.to_string(),
                    RefTarget::Declared(anon),
                    ReferenceKind::Instantiation,
                    node,
                    ctx,
                );
            }
            None => {
                self.walk_type(type_node, from, ReferenceKind::Type, ctx);
                self.add_ref(
                    from,
                    type_name.clone(),
                    RefTarget::Member(MemberSite::constructor(type_name, args)),
                    ReferenceKind::Instantiation,
                    node,
                    ctx,
                );
            }
        }
    }

    fn delegation(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        let delegation = match node.child_by_field_name("constructor").map(|c| c.kind()) {
            Some("this") => Delegation::This,
            _ => Delegation::Super,
        };
        let arguments = node.child_by_field_name("arguments");
        let args = arguments.map(|a| self.arg_types(a)).unwrap_or_default();
        self.add_ref(
            from,
            if delegation == Delegation::This { "this" } else { "super" }.to_string(),
            RefTarget::Member(MemberSite::delegation(delegation, args)),
            ReferenceKind::Delegation,
            node,
            ctx,
        );

        let ctx = RefContext {
            in_ctor_invocation: true,
            ..ctx
        };
        if let Some(object) = node.child_by_field_name("object") {
            self.walk_code(object, from, ctx);
        }
        if let Some(arguments) = arguments {
            self.walk_code(arguments, from, ctx);
        }
    }

    fn local_declaration(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        let mods = self.read_modifiers(node);
        self.emit_annotation_refs(&mods, from);
        let type_node = node.child_by_field_name("type");
        if let Some(ty) = type_node {
            self.walk_type(ty, from, ReferenceKind::Type, ctx);
        }
        let base = type_node
            .map(|t| erase_type(self.text(t)))
            .filter(|t| t != "var");
        let scope = node.parent().map(node_range).unwrap_or(node_range(node));

        for declarator in children_of_kind(node, "variable_declarator") {
            if let Some(value) = declarator.child_by_field_name("value") {
                self.walk_code(value, from, ctx);
            }
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            let dims = declarator
                .child_by_field_name("dimensions")
                .map(|d| self.text(d).matches('[').count())
                .unwrap_or(0);
            self.locals.push(LocalVar {
                name: self.text(name).to_string(),
                type_name: base.as_ref().map(|b| format!("{}{}", b, "[]".repeat(dims))),
                scope,
                declared_at: declarator.start_byte(),
            });
        }
    }

    fn catch_parameter(&mut self, param: Node, clause: Node, from: &DeclarationId, ctx: RefContext) {
        let mut first_type = None;
        for child in named_children(param) {
            match child.kind() {
                "catch_type" => {
                    first_type = named_children(child)
                        .first()
                        .map(|t| erase_type(self.text(*t)));
                    self.walk_type(child, from, ReferenceKind::Type, ctx);
                }
                "modifiers" => {
                    let mods = self.read_modifiers(param);
                    self.emit_annotation_refs(&mods, from);
                }
                _ => {}
            }
        }
        if let Some(name) = param.child_by_field_name("name") {
            self.locals.push(LocalVar {
                name: self.text(name).to_string(),
                type_name: first_type,
                scope: node_range(clause),
                declared_at: param.start_byte(),
            });
        }
    }

    fn lambda(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        if let Some(params) = node.child_by_field_name("parameters") {
            let scope = node_range(node);
            match params.kind() {
                "identifier" => self.locals.push(LocalVar {
                    name: self.text(params).to_string(),
                    type_name: None,
                    scope,
                    declared_at: node.start_byte(),
                }),
                "formal_parameters" => {
                    for (param, type_node) in self.formal_parameters(params) {
                        if let Some(ty) = type_node {
                            self.walk_type(ty, from, ReferenceKind::Type, ctx);
                        }
                        let type_name = Some(param.erased()).filter(|t| t != "var");
                        self.locals.push(LocalVar {
                            name: param.name,
                            type_name,
                            scope,
                            declared_at: node.start_byte(),
                        });
                    }
                }
                _ => {
                    for ident in named_children(params) {
                        if ident.kind() == "identifier" {
                            self.locals.push(LocalVar {
                                name: self.text(ident).to_string(),
                                type_name: None,
                                scope,
                                declared_at: node.start_byte(),
                            });
                        }
                    }
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_code(body, from, ctx);
        }
    }

    fn method_reference(&mut self, node: Node, from: &DeclarationId, ctx: RefContext) {
        let children = named_children(node);
        let Some(target) = children.first().copied() else {
            return;
        };
        let name = children
            .iter()
            .skip(1)
            .rev()
            .find(|c| c.kind() == "identifier")
            .map(|c| self.text(*c).to_string())
            .unwrap_or_else(|| "<init>".to_string());

        let receiver = match target.kind() {
            "type_identifier" | "scoped_type_identifier" | "generic_type" | "array_type" => {
                self.walk_type(target, from, ReferenceKind::Type, ctx);
                Receiver::Name(erase_type(self.text(target)))
            }
            _ => {
                if !self.is_name_chain(target) {
                    self.walk_code(target, from, ctx);
                }
                self.receiver_of(target)
            }
        };

        let site = MemberSite {
            name: name.clone(),
            kind: crate::graph::MemberSiteKind::MethodRef,
            receiver,
            arguments: Vec::new(),
        };
        self.add_ref(from, name, RefTarget::Member(site), ReferenceKind::Reflection, node, ctx);
    }

    // ------------------------------------------------------------------
    // Receivers and argument hints
    // ------------------------------------------------------------------

    fn call_site(&self, node: Node) -> MemberSite {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let receiver = match node.child_by_field_name("object") {
            Some(object) => self.receiver_of(object),
            None => Receiver::Implicit,
        };
        let arguments = node
            .child_by_field_name("arguments")
            .map(|a| self.arg_types(a))
            .unwrap_or_default();
        MemberSite::method(name, receiver, arguments)
    }

    fn receiver_of(&self, node: Node) -> Receiver {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                match self.local(name, node.start_byte()) {
                    Some(local) => local
                        .type_name
                        .clone()
                        .map(Receiver::Typed)
                        .unwrap_or(Receiver::Unknown),
                    None => Receiver::Name(name.to_string()),
                }
            }
            "this" => Receiver::This,
            "super" => Receiver::Super,
            "field_access" => {
                let object = node.child_by_field_name("object");
                let field = node.child_by_field_name("field");
                match (object, field) {
                    (Some(object), Some(field)) if field.kind() == "this" => {
                        Receiver::QualifiedThis(erase_type(self.text(object)))
                    }
                    (Some(object), Some(field)) if object.kind() == "super" => {
                        Receiver::Field(Box::new(Receiver::Super), self.text(field).to_string())
                    }
                    (Some(object), Some(field)) => Receiver::Field(
                        Box::new(self.receiver_of(object)),
                        self.text(field).to_string(),
                    ),
                    _ => Receiver::Unknown,
                }
            }
            "method_invocation" => Receiver::Call(Box::new(self.call_site(node))),
            "object_creation_expression" if first_child_of_kind(node, "class_body").is_none() => node
                .child_by_field_name("type")
                .map(|t| Receiver::Typed(erase_type(self.text(t))))
                .unwrap_or(Receiver::Unknown),
            "cast_expression" => node
                .child_by_field_name("type")
                .map(|t| Receiver::Typed(erase_type(self.text(t))))
                .unwrap_or(Receiver::Unknown),
            "parenthesized_expression" => named_children(node)
                .first()
                .map(|inner| self.receiver_of(*inner))
                .unwrap_or(Receiver::Unknown),
            "string_literal" | "text_block" => Receiver::Typed("String".into()),
            "class_literal" => Receiver::Typed("Class".into()),
            "array_access" => match node.child_by_field_name("array").map(|a| self.receiver_of(a)) {
                Some(Receiver::Typed(t)) if t.ends_with("[]") => {
                    Receiver::Typed(t[..t.len() - 2].to_string())
                }
                _ => Receiver::Unknown,
            },
            _ => Receiver::Unknown,
        }
    }

    fn arg_types(&self, arguments: Node) -> Vec<ArgType> {
        named_children(arguments)
            .into_iter()
            .filter(|n| n.kind() != "line_comment" && n.kind() != "block_comment")
            .map(|n| self.arg_type(n))
            .collect()
    }

    fn arg_type(&self, node: Node) -> ArgType {
        let known = |t: &str| ArgType::Known(t.to_string());
        match node.kind() {
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal" => {
                if self.text(node).ends_with(['l', 'L']) {
                    known("long")
                } else {
                    known("int")
                }
            }
            "decimal_floating_point_literal" | "hex_floating_point_literal" => {
                if self.text(node).ends_with(['f', 'F']) {
                    known("float")
                } else {
                    known("double")
                }
            }
            "true" | "false" => known("boolean"),
            "character_literal" => known("char"),
            "string_literal" | "text_block" => known("String"),
            "class_literal" => known("Class"),
            "null_literal" => ArgType::Null,
            "object_creation_expression" | "cast_expression" => node
                .child_by_field_name("type")
                .map(|t| ArgType::Known(erase_type(self.text(t))))
                .unwrap_or(ArgType::Unknown),
            "identifier" => self
                .local(self.text(node), node.start_byte())
                .and_then(|l| l.type_name.clone())
                .map(ArgType::Known)
                .unwrap_or(ArgType::Unknown),
            "parenthesized_expression" => named_children(node)
                .first()
                .map(|inner| self.arg_type(*inner))
                .unwrap_or(ArgType::Unknown),
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                match op {
                    "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => known("boolean"),
                    "+" => {
                        let is_string = |side: Option<Node>| {
                            side.map(|s| self.arg_type(s) == known("String"))
                                .unwrap_or(false)
                        };
                        if is_string(node.child_by_field_name("left"))
                            || is_string(node.child_by_field_name("right"))
                        {
                            known("String")
                        } else {
                            ArgType::Unknown
                        }
                    }
                    _ => ArgType::Unknown,
                }
            }
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                match (op, node.child_by_field_name("operand")) {
                    ("!", _) => known("boolean"),
                    ("-" | "+", Some(operand)) => self.arg_type(operand),
                    _ => ArgType::Unknown,
                }
            }
            "this" => match self.frames.last() {
                Some(frame) if frame.canonical.is_some() => known(&simple_type_name(&frame.id)),
                _ => ArgType::Unknown,
            },
            _ => ArgType::Unknown,
        }
    }

    /// `a`, `a.b`, `a.b.C`: plain names the resolver credits itself
    fn is_name_chain(&self, node: Node) -> bool {
        match node.kind() {
            "identifier" => true,
            "field_access" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("field"),
            ) {
                (Some(object), Some(field)) if field.kind() == "identifier" => {
                    self.is_name_chain(object)
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn local(&self, name: &str, at: usize) -> Option<&LocalVar> {
        self.locals
            .iter()
            .filter(|l| l.name == name && l.scope.contains(at) && l.declared_at <= at)
            .max_by_key(|l| l.scope.start)
    }

    fn add_ref(
        &mut self,
        from: &DeclarationId,
        name: String,
        target: RefTarget,
        kind: ReferenceKind,
        node: Node,
        context: RefContext,
    ) {
        self.references.push(UnresolvedReference {
            from: from.clone(),
            name,
            target,
            kind,
            location: node_location(self.path, node),
            context,
        });
    }
}

/// Last segment of a binary type name (`a.Outer$Inner` -> `Inner`)
fn simple_type_name(id: &DeclarationId) -> String {
    let key = id.as_str();
    key.rsplit(['.', '$']).next().unwrap_or(key).to_string()
}
