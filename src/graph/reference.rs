use super::{DeclarationId, Location};
use serde::{Deserialize, Serialize};

/// Kind of reference between declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Calling a method
    Call,

    /// Reading a field
    Read,

    /// Writing to a field
    Write,

    /// Type reference (declared type, generic argument, throws clause)
    Type,

    /// extends/implements
    Inheritance,

    /// Use of a name made visible by an import
    Import,

    /// `new T(..)`, enum constant arguments, anonymous class creation
    Instantiation,

    /// Annotation usage
    Annotation,

    /// Cast or instanceof target
    Cast,

    /// Explicit `this(..)`/`super(..)` constructor invocation
    Delegation,

    /// Class literal or method reference
    Reflection,
}

impl ReferenceKind {
    pub fn is_read(&self) -> bool {
        matches!(self, ReferenceKind::Read | ReferenceKind::Call)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, ReferenceKind::Write)
    }

    /// References that only need the target type to exist
    pub fn is_type_use(&self) -> bool {
        matches!(
            self,
            ReferenceKind::Type
                | ReferenceKind::Inheritance
                | ReferenceKind::Annotation
                | ReferenceKind::Cast
        )
    }
}

/// Syntactic position of a reference inside its declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RefContext {
    /// Inside a method/constructor/initializer body or field initializer
    pub in_body: bool,
    /// Inside an `assert` statement
    pub in_assertion: bool,
    /// Inside the arguments of an explicit constructor invocation
    pub in_ctor_invocation: bool,
    /// Inside annotation arguments
    pub in_annotation: bool,
}

impl RefContext {
    pub fn signature() -> Self {
        Self::default()
    }

    pub fn body() -> Self {
        Self {
            in_body: true,
            ..Self::default()
        }
    }
}

/// A resolved reference from one declaration to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,

    /// Location where the reference occurs
    pub location: Location,

    /// The name/identifier used in the reference
    pub name: String,

    pub context: RefContext,

    /// Edge added because resolution could not pick a single target
    pub conservative: bool,
}

impl Reference {
    pub fn new(kind: ReferenceKind, location: Location, name: String) -> Self {
        Self {
            kind,
            location,
            name,
            context: RefContext::default(),
            conservative: false,
        }
    }

    pub fn with_context(mut self, context: RefContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_conservative(mut self, conservative: bool) -> Self {
        self.conservative = conservative;
        self
    }
}

/// Receiver expression of a member access, as far as syntax tells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Receiver {
    /// Unqualified: `foo()`
    Implicit,
    This,
    Super,
    /// `Outer.this`
    QualifiedThis(String),
    /// Bare name that is not a local variable: a field or a type
    Name(String),
    /// Expression with a syntactically known static type
    Typed(String),
    /// `recv.name`
    Field(Box<Receiver>, String),
    /// Result of another call
    Call(Box<MemberSite>),
    Unknown,
}

impl Receiver {
    /// Dotted text when the receiver is a chain of plain names (`a.b.C`)
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Receiver::Name(name) => Some(name.clone()),
            Receiver::Field(inner, name) => inner.dotted_name().map(|q| format!("{}.{}", q, name)),
            _ => None,
        }
    }
}

/// Static type hint for a call argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgType {
    Known(String),
    Null,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delegation {
    This,
    Super,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberSiteKind {
    Method,
    Field,
    /// `new T(..)`; `type_name` is the instantiated type as written
    Constructor { type_name: String },
    /// `this(..)`/`super(..)`, or the implicit super call of an anonymous class
    Delegation(Delegation),
    /// `T::name` or `T::new`
    MethodRef,
}

/// A member use site: the argument of `SourceContext::resolve_member`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSite {
    pub name: String,
    pub kind: MemberSiteKind,
    pub receiver: Receiver,
    pub arguments: Vec<ArgType>,
}

impl MemberSite {
    pub fn method(name: impl Into<String>, receiver: Receiver, arguments: Vec<ArgType>) -> Self {
        Self {
            name: name.into(),
            kind: MemberSiteKind::Method,
            receiver,
            arguments,
        }
    }

    pub fn field(name: impl Into<String>, receiver: Receiver) -> Self {
        Self {
            name: name.into(),
            kind: MemberSiteKind::Field,
            receiver,
            arguments: Vec::new(),
        }
    }

    pub fn constructor(type_name: impl Into<String>, arguments: Vec<ArgType>) -> Self {
        Self {
            name: "<init>".into(),
            kind: MemberSiteKind::Constructor {
                type_name: type_name.into(),
            },
            receiver: Receiver::Implicit,
            arguments,
        }
    }

    pub fn delegation(delegation: Delegation, arguments: Vec<ArgType>) -> Self {
        Self {
            name: "<init>".into(),
            kind: MemberSiteKind::Delegation(delegation),
            receiver: Receiver::Implicit,
            arguments,
        }
    }
}

/// What an unresolved reference points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefTarget {
    /// A type name as written
    Type(String),
    /// A bare expression name: local already excluded, field or type
    Name(String),
    Member(MemberSite),
    /// A declaration the parser created itself (anonymous classes)
    Declared(DeclarationId),
}

/// A reference that hasn't been resolved to a specific declaration yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedReference {
    /// Declaration the reference occurs in
    pub from: DeclarationId,

    /// The name being referenced
    pub name: String,

    pub target: RefTarget,

    pub kind: ReferenceKind,

    pub location: Location,

    pub context: RefContext,
}
