use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Structural identity of a declaration.
///
/// Types use their binary name (`pkg.Outer$Inner`, `pkg.Outer$1`), members
/// append `#name(erased,params)`, imports are keyed by compilation unit. The
/// key never depends on byte offsets, so it is stable across runs and
/// across parallel evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationId(String);

impl DeclarationId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_type(binary_name: &str) -> Self {
        Self(binary_name.to_string())
    }

    pub fn for_method(owner: &DeclarationId, name: &str, params: &[String]) -> Self {
        Self(format!("{}#{}({})", owner.0, name, params.join(",")))
    }

    pub fn for_constructor(owner: &DeclarationId, params: &[String]) -> Self {
        Self::for_method(owner, "<init>", params)
    }

    pub fn for_field(owner: &DeclarationId, name: &str) -> Self {
        Self(format!("{}#{}", owner.0, name))
    }

    pub fn for_initializer(owner: &DeclarationId, is_static: bool, ordinal: usize) -> Self {
        let marker = if is_static { "<clinit>" } else { "<init-block>" };
        Self(format!("{}#{}#{}", owner.0, marker, ordinal))
    }

    pub fn for_import(unit: &Path, target: &str) -> Self {
        Self(format!("import:{}:{}", unit.display(), target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owning type key for member ids (`pkg.A#m()` -> `pkg.A`)
    pub fn owner_key(&self) -> Option<&str> {
        if self.0.starts_with("import:") {
            return None;
        }
        self.0.split_once('#').map(|(owner, _)| owner)
    }
}

impl std::fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeclarationKind {
    // Types
    Class,
    Interface,
    Enum,
    Annotation,

    // Members
    EnumCase,
    Method,
    Constructor,
    Field,
    Initializer,

    Import,
}

impl DeclarationKind {
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            DeclarationKind::Class
                | DeclarationKind::Interface
                | DeclarationKind::Enum
                | DeclarationKind::Annotation
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, DeclarationKind::Method | DeclarationKind::Constructor)
    }

    pub fn is_member(&self) -> bool {
        matches!(
            self,
            DeclarationKind::Method
                | DeclarationKind::Constructor
                | DeclarationKind::Field
                | DeclarationKind::EnumCase
                | DeclarationKind::Initializer
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DeclarationKind::Class => "class",
            DeclarationKind::Interface => "interface",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Annotation => "annotation",
            DeclarationKind::EnumCase => "enum constant",
            DeclarationKind::Method => "method",
            DeclarationKind::Constructor => "constructor",
            DeclarationKind::Field => "field",
            DeclarationKind::Initializer => "initializer",
            DeclarationKind::Import => "import",
        }
    }
}

/// Visibility modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
    Protected,
    #[default]
    PackagePrivate,
}

impl Visibility {
    pub fn from_java_modifiers(modifiers: &[&str]) -> Self {
        if modifiers.contains(&"private") {
            Visibility::Private
        } else if modifiers.contains(&"protected") {
            Visibility::Protected
        } else if modifiers.contains(&"public") {
            Visibility::Public
        } else {
            Visibility::PackagePrivate
        }
    }
}

/// How a type is nested in its compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeNesting {
    TopLevel,
    Member,
    Local,
    Anonymous,
}

/// Half-open byte range into a compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn encloses(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Location in source code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path
    pub file: PathBuf,
    /// Line number (1-indexed)
    pub line: usize,
    /// Last line of the declaration (1-indexed)
    pub end_line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Location {
    pub fn new(file: PathBuf, line: usize, column: usize, start_byte: usize, end_byte: usize) -> Self {
        Self {
            file,
            line,
            end_line: line,
            column,
            start_byte,
            end_byte,
        }
    }

    pub fn with_end_line(mut self, end_line: usize) -> Self {
        self.end_line = end_line;
        self
    }

    pub fn span(&self) -> ByteRange {
        ByteRange::new(self.start_byte, self.end_byte)
    }

    pub fn covers_line(&self, line: usize) -> bool {
        self.line <= line && line <= self.end_line
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// An annotation written on a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationUse {
    /// Annotation type name as written, without `@` or arguments
    pub name: String,
    pub span: ByteRange,
}

impl AnnotationUse {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuperRelation {
    Superclass,
    Interface,
}

/// One entry of an `extends`/`implements` clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperTypeRef {
    /// Type name with type arguments stripped
    pub name: String,
    pub relation: SuperRelation,
    pub span: ByteRange,
}

/// A formal parameter of a method or constructor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// Declared type with type arguments stripped (`List`, `int[]`)
    pub type_name: String,
    pub varargs: bool,
}

impl Param {
    /// Parameter type as it appears after erasure (varargs become arrays)
    pub fn erased(&self) -> String {
        if self.varargs {
            format!("{}[]", self.type_name)
        } else {
            self.type_name.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
    /// `None` for constructors
    pub return_type: Option<String>,
    /// Method-level type parameters
    pub type_params: Vec<String>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_varargs(&self) -> bool {
        self.params.last().map(|p| p.varargs).unwrap_or(false)
    }

    pub fn erased_params(&self) -> Vec<String> {
        self.params.iter().map(Param::erased).collect()
    }
}

/// Position of a field declarator inside a multi-declarator field declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// The whole `field_declaration` statement
    pub span: ByteRange,
    pub index: usize,
    pub len: usize,
}

/// Byte extents the emitter edits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Extent {
    /// The declaration including leading comments and Javadoc
    pub full: ByteRange,
    /// Method/constructor/initializer block, including braces
    pub body: Option<ByteRange>,
    /// Field or constant initializer expression
    pub initializer: Option<ByteRange>,
    /// Explicit `this(..)`/`super(..)` statement of a constructor
    pub ctor_invocation: Option<ByteRange>,
    /// `extends`/`implements` clause listing interfaces
    pub interface_clause: Option<ByteRange>,
    pub field_group: Option<FieldGroup>,
}

/// Detail recorded for imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Imported name without the trailing `.*`
    pub target: String,
    pub is_static: bool,
    pub on_demand: bool,
}

impl ImportInfo {
    /// Last segment of a single import (`java.util.List` -> `List`)
    pub fn simple_name(&self) -> Option<&str> {
        if self.on_demand {
            None
        } else {
            self.target.rsplit('.').next()
        }
    }

    /// Qualifier of a single import (`java.util.List` -> `java.util`)
    pub fn qualifier(&self) -> &str {
        if self.on_demand {
            &self.target
        } else {
            self.target.rsplit_once('.').map(|(q, _)| q).unwrap_or("")
        }
    }
}

/// A declaration in the source code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,

    /// Simple name; anonymous classes use their ordinal (`1`)
    pub name: String,

    /// Canonical dotted name for named types (`pkg.Outer.Inner`)
    pub fully_qualified_name: Option<String>,

    pub kind: DeclarationKind,
    pub visibility: Visibility,
    pub location: Location,

    /// Lexically enclosing declaration (a type, or a member for local and
    /// anonymous classes)
    pub parent: Option<DeclarationId>,

    pub is_static: bool,
    pub is_abstract: bool,
    pub annotations: Vec<AnnotationUse>,
    pub super_types: Vec<SuperTypeRef>,
    pub modifiers: Vec<String>,

    /// Type parameters declared on a type
    pub type_params: Vec<String>,
    pub nesting: Option<TypeNesting>,
    pub signature: Option<Signature>,
    /// Declared type of fields and enum constants
    pub field_type: Option<String>,
    pub import: Option<ImportInfo>,
    pub extent: Extent,
}

impl Declaration {
    pub fn new(id: DeclarationId, name: String, kind: DeclarationKind, location: Location) -> Self {
        let full = location.span();
        Self {
            id,
            name,
            fully_qualified_name: None,
            kind,
            visibility: Visibility::default(),
            location,
            parent: None,
            is_static: false,
            is_abstract: false,
            annotations: Vec::new(),
            super_types: Vec::new(),
            modifiers: Vec::new(),
            type_params: Vec::new(),
            nesting: None,
            signature: None,
            field_type: None,
            import: None,
            extent: Extent {
                full,
                ..Extent::default()
            },
        }
    }

    pub fn has_annotation(&self, simple_name: &str) -> bool {
        self.annotations.iter().any(|a| a.simple_name() == simple_name)
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn is_anonymous(&self) -> bool {
        self.nesting == Some(TypeNesting::Anonymous)
    }

    /// Member classes without `static` capture an outer instance
    pub fn is_inner_class(&self) -> bool {
        self.kind == DeclarationKind::Class
            && self.nesting == Some(TypeNesting::Member)
            && !self.is_static
    }

    /// Whether there is a body or initializer a stub could replace
    pub fn has_body(&self) -> bool {
        self.extent.body.is_some()
    }

    pub fn superclass(&self) -> Option<&SuperTypeRef> {
        self.super_types
            .iter()
            .find(|s| s.relation == SuperRelation::Superclass)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &SuperTypeRef> {
        self.super_types
            .iter()
            .filter(|s| s.relation == SuperRelation::Interface)
    }

    pub fn arity(&self) -> usize {
        self.signature.as_ref().map(Signature::arity).unwrap_or(0)
    }

    /// Get a display string for this declaration
    pub fn display(&self) -> String {
        format!(
            "{} {} ({})",
            self.kind.display_name(),
            self.name,
            self.location
        )
    }
}
