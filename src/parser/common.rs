use crate::graph::{ByteRange, Declaration, Location, UnresolvedReference};
use miette::Result;
use std::path::Path;

/// Result of parsing a source file
#[derive(Debug, Default)]
pub struct ParseResult {
    /// Declarations in source order
    pub declarations: Vec<Declaration>,

    /// References to resolve once every file is indexed
    pub references: Vec<UnresolvedReference>,

    pub package: Option<String>,

    /// Number of `ERROR`/missing nodes tree-sitter reported
    pub syntax_errors: usize,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Trait for language-specific parsers
pub trait Parser {
    /// Parse a source file and extract declarations and references
    fn parse(&self, path: &Path, contents: &str) -> Result<ParseResult>;
}

/// Location of a node
pub fn node_location(file: &Path, node: tree_sitter::Node) -> Location {
    let start = node.start_position();
    Location::new(
        file.to_path_buf(),
        start.row + 1,
        start.column + 1,
        node.start_byte(),
        node.end_byte(),
    )
    .with_end_line(node.end_position().row + 1)
}

pub fn node_range(node: tree_sitter::Node) -> ByteRange {
    ByteRange::new(node.start_byte(), node.end_byte())
}

/// Extract text from a node
pub fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// Find all children of a specific kind
pub fn children_of_kind<'a>(
    node: tree_sitter::Node<'a>,
    kind: &str,
) -> Vec<tree_sitter::Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.kind() == kind)
        .collect()
}

pub fn first_child_of_kind<'a>(
    node: tree_sitter::Node<'a>,
    kind: &str,
) -> Option<tree_sitter::Node<'a>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|child| child.kind() == kind);
    found
}

pub fn named_children<'a>(node: tree_sitter::Node<'a>) -> Vec<tree_sitter::Node<'a>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Strip type arguments, annotations and whitespace from a written type.
///
/// `Map<String, List<Foo>>` -> `Map`, `@NonNull Foo[]` -> `Foo[]`,
/// `java.util.List<X>` -> `java.util.List`.
pub fn erase_type(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            '@' if depth == 0 => {
                // skip annotation name and optional argument list
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '.' || n == '_' || n == '$' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek() == Some(&'(') {
                    let mut parens = 0usize;
                    for n in chars.by_ref() {
                        if n == '(' {
                            parens += 1;
                        } else if n == ')' {
                            parens -= 1;
                            if parens == 0 {
                                break;
                            }
                        }
                    }
                }
            }
            c if c.is_whitespace() => {}
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.replace("...", "[]")
}

/// Leading comments that belong to a declaration (Javadoc, line comments)
pub fn leading_comment_start(node: tree_sitter::Node, source: &str) -> usize {
    let mut start = node.start_byte();
    let mut current = node;
    while let Some(prev) = current.prev_sibling() {
        if prev.kind() != "line_comment" && prev.kind() != "block_comment" {
            break;
        }
        // only blank space may sit between the comment and what follows it
        if !source[prev.end_byte()..start].trim().is_empty() {
            break;
        }
        start = prev.start_byte();
        current = prev;
    }
    start
}

/// Iterator over all descendant nodes
pub fn descendants(node: tree_sitter::Node) -> impl Iterator<Item = tree_sitter::Node> {
    DescendantIterator::new(node)
}

struct DescendantIterator<'a> {
    cursor: tree_sitter::TreeCursor<'a>,
    done: bool,
}

impl<'a> DescendantIterator<'a> {
    fn new(node: tree_sitter::Node<'a>) -> Self {
        Self {
            cursor: node.walk(),
            done: false,
        }
    }
}

impl<'a> Iterator for DescendantIterator<'a> {
    type Item = tree_sitter::Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let node = self.cursor.node();

        if self.cursor.goto_first_child() {
            return Some(node);
        }

        loop {
            if self.cursor.goto_next_sibling() {
                return Some(node);
            }

            if !self.cursor.goto_parent() {
                self.done = true;
                return Some(node);
            }
        }
    }
}
