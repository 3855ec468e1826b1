//! JVM method descriptors (`(I[Ljava/lang/String;)V`) and how their
//! parameters line up with erased source parameter types.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("malformed method descriptor `{descriptor}` at offset {offset}")]
#[diagnostic(code(testprune::coverage::descriptor))]
pub struct DescriptorError {
    pub descriptor: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseType {
    /// Source spelling of a primitive (`int`, `boolean`, ...)
    Primitive(&'static str),
    /// Internal name (`java/util/List`, `a/Outer$Inner`)
    Class(String),
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmType {
    pub base: BaseType,
    pub dims: usize,
}

impl JvmType {
    pub fn is_reference(&self) -> bool {
        self.dims > 0 || matches!(self.base, BaseType::Class(_))
    }

    /// Simple name of the element type: the last segment of a class's
    /// internal name, nested classes included (`a/Outer$Inner` -> `Inner`)
    pub fn simple_name(&self) -> &str {
        match &self.base {
            BaseType::Primitive(p) => *p,
            BaseType::Class(name) => name.rsplit(['/', '$']).next().unwrap_or(name),
            BaseType::Void => "void",
        }
    }

    /// Source-like rendering (`String[]`, `int`)
    pub fn display(&self) -> String {
        format!("{}{}", self.simple_name(), "[]".repeat(self.dims))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<JvmType>,
    pub return_type: JvmType,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let error = |offset| DescriptorError {
            descriptor: descriptor.to_string(),
            offset,
        };
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(error(0));
        }

        let mut pos = 1;
        let mut params = Vec::new();
        while pos < bytes.len() && bytes[pos] != b')' {
            let (ty, next) = parse_type(descriptor, pos).ok_or_else(|| error(pos))?;
            if ty.base == BaseType::Void {
                return Err(error(pos));
            }
            params.push(ty);
            pos = next;
        }
        if pos >= bytes.len() {
            return Err(error(pos));
        }
        let (return_type, end) = parse_type(descriptor, pos + 1).ok_or_else(|| error(pos + 1))?;
        if end != bytes.len() {
            return Err(error(end));
        }
        Ok(Self { params, return_type })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// One field type starting at `pos`; returns it and the offset after it
fn parse_type(descriptor: &str, mut pos: usize) -> Option<(JvmType, usize)> {
    let bytes = descriptor.as_bytes();
    let mut dims = 0;
    while bytes.get(pos) == Some(&b'[') {
        dims += 1;
        pos += 1;
    }
    let base = match *bytes.get(pos)? {
        b'B' => BaseType::Primitive("byte"),
        b'C' => BaseType::Primitive("char"),
        b'D' => BaseType::Primitive("double"),
        b'F' => BaseType::Primitive("float"),
        b'I' => BaseType::Primitive("int"),
        b'J' => BaseType::Primitive("long"),
        b'S' => BaseType::Primitive("short"),
        b'Z' => BaseType::Primitive("boolean"),
        b'V' if dims == 0 => BaseType::Void,
        b'L' => {
            let end = pos + descriptor[pos..].find(';')?;
            if end == pos + 1 {
                return None;
            }
            let name = descriptor[pos + 1..end].to_string();
            return Some((JvmType { base: BaseType::Class(name), dims }, end + 1));
        }
        _ => return None,
    };
    Some((JvmType { base, dims }, pos + 1))
}

/// Whether an erased source parameter type (`List`, `int[]`,
/// `java.util.Map`, `Outer.Inner`) can be the given descriptor type.
/// Qualified names must name the descriptor's class; a simple name only
/// has to agree with its last segment. Type variables match any reference
/// type of the same array depth.
pub fn param_matches(source: &str, jvm: &JvmType, type_vars: &[String]) -> bool {
    let (base, dims) = split_dims(source);

    if type_vars.iter().any(|v| v == base) {
        return jvm.dims == dims && matches!(jvm.base, BaseType::Class(_));
    }
    if jvm.dims != dims {
        return false;
    }
    match &jvm.base {
        BaseType::Primitive(p) => *p == base,
        BaseType::Class(internal) if base.contains(['.', '$']) => qualified_matches(base, internal),
        BaseType::Class(_) => jvm.simple_name() == base,
        BaseType::Void => false,
    }
}

fn split_dims(source: &str) -> (&str, usize) {
    let mut base = source.trim();
    let mut dims = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped.trim_end();
        dims += 1;
    }
    (base, dims)
}

/// `java.util.Date` and `a.Outer$Inner` must spell the whole internal
/// name. A name headed by a type (`Outer.Inner`) only fixes the nesting
/// path, so it matches any package.
fn qualified_matches(base: &str, internal: &str) -> bool {
    let written = base.replace('$', ".");
    let dotted = internal.replace(['/', '$'], ".");
    if dotted == written {
        return true;
    }
    written.starts_with(|c: char| c.is_uppercase()) && dotted.ends_with(&format!(".{}", written))
}

/// Whether a source parameter type pins down one descriptor type:
/// primitives and qualified names do, simple names and type variables
/// only narrow it
pub fn is_exact_param(source: &str, type_vars: &[String]) -> bool {
    let (base, _) = split_dims(source);
    if type_vars.iter().any(|v| v == base) {
        return false;
    }
    PRIMITIVES.contains(&base) || (base.contains(['.', '$']) && !base.starts_with(|c: char| c.is_uppercase()))
}

const PRIMITIVES: [&str; 8] = ["boolean", "byte", "char", "short", "int", "long", "float", "double"];

/// Whether a list of erased source parameter types fits the descriptor
/// parameters exactly
pub fn params_match(source: &[String], jvm: &[JvmType], type_vars: &[String]) -> bool {
    source.len() == jvm.len()
        && source
            .iter()
            .zip(jvm)
            .all(|(s, j)| param_matches(s, j, type_vars))
}
