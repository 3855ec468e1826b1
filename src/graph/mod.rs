mod builder;
mod classpath;
mod context;
mod declaration;
mod parallel_builder;
pub mod reference;
mod resolve;

pub use builder::GraphBuilder;
pub use classpath::ClasspathResolver;
pub use context::{
    is_object_method, CompilationUnit, Diagnostic, DiagnosticKind, SourceContext, SuperLink, TypeTarget,
};
pub use declaration::{
    AnnotationUse, ByteRange, Declaration, DeclarationId, DeclarationKind, Extent, FieldGroup,
    ImportInfo, Location, Param, Signature, SuperRelation, SuperTypeRef, TypeNesting, Visibility,
};
pub use parallel_builder::ParallelGraphBuilder;
pub use reference::{
    ArgType, Delegation, MemberSite, MemberSiteKind, Receiver, RefContext, RefTarget, Reference,
    ReferenceKind, UnresolvedReference,
};
pub use resolve::{MemberTarget, ResolutionError};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// The reference graph containing all declarations and their relationships
#[derive(Debug)]
pub struct Graph {
    /// The underlying directed graph
    /// Nodes are DeclarationIds, edges are References
    inner: DiGraph<DeclarationId, Reference>,

    /// Map from DeclarationId to node index
    node_map: HashMap<DeclarationId, NodeIndex>,

    /// Map from DeclarationId to Declaration details
    declarations: HashMap<DeclarationId, Declaration>,

    /// Map from simple name to possible declarations (for resolution)
    name_index: HashMap<String, Vec<DeclarationId>>,

    /// Map from canonical type name to declaration
    fqn_index: HashMap<String, DeclarationId>,

    /// Map from parent to children, in source order
    children_index: HashMap<DeclarationId, Vec<DeclarationId>>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: DiGraph::new(),
            node_map: HashMap::new(),
            declarations: HashMap::new(),
            name_index: HashMap::new(),
            fqn_index: HashMap::new(),
            children_index: HashMap::new(),
        }
    }

    /// Add a declaration to the graph. A repeated id keeps the first
    /// declaration and returns `None`.
    pub fn add_declaration(&mut self, decl: Declaration) -> Option<DeclarationId> {
        let id = decl.id.clone();
        if self.node_map.contains_key(&id) {
            return None;
        }

        let node_idx = self.inner.add_node(id.clone());
        self.node_map.insert(id.clone(), node_idx);

        self.name_index
            .entry(decl.name.clone())
            .or_default()
            .push(id.clone());

        if let Some(fqn) = &decl.fully_qualified_name {
            self.fqn_index.insert(fqn.clone(), id.clone());
        }

        if let Some(parent_id) = &decl.parent {
            self.children_index
                .entry(parent_id.clone())
                .or_default()
                .push(id.clone());
        }

        self.declarations.insert(id.clone(), decl);

        Some(id)
    }

    /// Add a reference between two declarations
    pub fn add_reference(&mut self, from: &DeclarationId, to: &DeclarationId, reference: Reference) {
        if let (Some(&from_idx), Some(&to_idx)) = (self.node_map.get(from), self.node_map.get(to)) {
            self.inner.add_edge(from_idx, to_idx, reference);
        }
    }

    /// Get a declaration by ID
    pub fn get_declaration(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.declarations.get(id)
    }

    pub fn contains(&self, id: &DeclarationId) -> bool {
        self.declarations.contains_key(id)
    }

    /// Get all declarations (unordered)
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    /// Find declarations by simple name
    pub fn find_by_name(&self, name: &str) -> Vec<&Declaration> {
        self.name_index
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.declarations.get(id)).collect())
            .unwrap_or_default()
    }

    /// Find a type by canonical name (`pkg.Outer.Inner`)
    pub fn find_by_fqn(&self, fqn: &str) -> Option<&Declaration> {
        self.fqn_index
            .get(fqn)
            .and_then(|id| self.declarations.get(id))
    }

    /// Get all declarations that reference the given declaration
    pub fn get_references_to(&self, id: &DeclarationId) -> Vec<(&Declaration, &Reference)> {
        let Some(&node_idx) = self.node_map.get(id) else {
            return Vec::new();
        };

        self.inner
            .edges_directed(node_idx, petgraph::Direction::Incoming)
            .filter_map(|edge| {
                let source_id = self.inner.node_weight(edge.source())?;
                let decl = self.declarations.get(source_id)?;
                Some((decl, edge.weight()))
            })
            .collect()
    }

    /// Get all declarations that this declaration references
    pub fn get_references_from(&self, id: &DeclarationId) -> Vec<(&Declaration, &Reference)> {
        let Some(&node_idx) = self.node_map.get(id) else {
            return Vec::new();
        };

        self.inner
            .edges_directed(node_idx, petgraph::Direction::Outgoing)
            .filter_map(|edge| {
                let target_id = self.inner.node_weight(edge.target())?;
                let decl = self.declarations.get(target_id)?;
                Some((decl, edge.weight()))
            })
            .collect()
    }

    /// Check if a declaration is referenced by anything
    pub fn is_referenced(&self, id: &DeclarationId) -> bool {
        let Some(&node_idx) = self.node_map.get(id) else {
            return false;
        };

        self.inner
            .edges_directed(node_idx, petgraph::Direction::Incoming)
            .next()
            .is_some()
    }

    /// Children of a declaration (members of a class, local classes of a
    /// method) in source order
    pub fn get_children(&self, id: &DeclarationId) -> &[DeclarationId] {
        self.children_index
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Get the number of declarations
    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    /// Get the number of references
    pub fn reference_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Count conservative edges added for unresolved references
    pub fn conservative_count(&self) -> usize {
        self.inner
            .edge_references()
            .filter(|edge| edge.weight().conservative)
            .count()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
