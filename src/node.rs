//! Mutable tree of values with parent back-references.
//!
//! Nodes live in one arena owned by the [`NodeTree`]; edges are ids, so a
//! subtree can be detached and re-attached without copying. Every node has
//! at most one parent, and the operations here keep the back-references
//! consistent: replacing a child detaches the old one, attaching a node
//! that already has a parent is a programming error and panics, as does
//! an attachment that would make a node its own ancestor.
//!
//! Trees are single-owner values; concurrent mutation is the caller's
//! problem to serialize, the tree takes no locks.

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::document::{Element, ValueKind};
use crate::error::Result;
use crate::num::Number;
use crate::options::{ParseOptions, WriteOptions};
use crate::writer::TokenWriter;

/// Index of a node in its tree's arena. Ids are only meaningful for the
/// tree that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Leaf value. JSON `null` is a scalar, so every tree position holds a
/// node and member lookups stay total.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(SmolStr),
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Number(Number::from(v))
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::Number(Number::from(v))
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Number(Number::from(v))
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Number(Number::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        // Non-finite floats have no token form; they degrade to null the
        // same way from_f64 reports them as unrepresentable.
        match Number::from_f64(v) {
            Some(n) => Scalar::Number(n),
            None => Scalar::Null,
        }
    }
}

impl From<Number> for Scalar {
    fn from(v: Number) -> Self {
        Scalar::Number(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(SmolStr::from(v))
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(SmolStr::from(v))
    }
}

impl From<SmolStr> for Scalar {
    fn from(v: SmolStr) -> Self {
        Scalar::String(v)
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Scalar(Scalar),
    Array(Vec<NodeId>),
    Object(IndexMap<SmolStr, NodeId>),
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<NodeId>,
    data: NodeData,
}

/// How a node hangs off its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEntry<'t> {
    Member(&'t str),
    Index(usize),
}

pub(crate) enum NodeContents<'t> {
    Scalar(&'t Scalar),
    Array(&'t [NodeId]),
    Object(&'t IndexMap<SmolStr, NodeId>),
}

#[derive(Debug, Clone)]
pub struct NodeTree {
    slots: Vec<Slot>,
    root: NodeId,
}

impl NodeTree {
    /// Tree with an empty object at the root.
    pub fn new() -> Self {
        Self::with_root(NodeData::Object(IndexMap::new()))
    }

    /// Tree with an empty array at the root.
    pub fn new_array() -> Self {
        Self::with_root(NodeData::Array(Vec::new()))
    }

    /// Tree holding a single scalar.
    pub fn new_scalar(value: impl Into<Scalar>) -> Self {
        Self::with_root(NodeData::Scalar(value.into()))
    }

    fn with_root(data: NodeData) -> Self {
        Self {
            slots: vec![Slot { parent: None, data }],
            root: NodeId(0),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_options(text, ParseOptions::default())
    }

    pub fn parse_with_options(text: &str, options: ParseOptions) -> Result<Self> {
        let doc = crate::document::Document::parse_with_options(text, options)?;
        Self::from_element(doc.root())
    }

    /// Materialize a document subtree into a freshly allocated tree.
    pub fn from_element(element: Element<'_>) -> Result<Self> {
        let mut tree = Self::new_scalar(Scalar::Null);
        let root = tree.build_from(element)?;
        tree.root = root;
        Ok(tree)
    }

    fn build_from(&mut self, element: Element<'_>) -> Result<NodeId> {
        match element.kind() {
            ValueKind::Null => Ok(self.alloc_scalar(Scalar::Null)),
            ValueKind::Bool => Ok(self.alloc_scalar(Scalar::Bool(element.as_bool()?))),
            ValueKind::Number => Ok(self.alloc_scalar(Scalar::Number(element.as_number()?))),
            ValueKind::String => {
                let text = element.as_str()?;
                Ok(self.alloc_scalar(Scalar::String(SmolStr::from(text.as_ref()))))
            }
            ValueKind::Array => {
                let array = self.alloc_array();
                for child in element.elements()? {
                    let id = self.build_from(child)?;
                    self.attach_to_array(array, None, id);
                }
                Ok(array)
            }
            ValueKind::Object => {
                let object = self.alloc_object();
                for (name, value) in element.members()? {
                    let id = self.build_from(value)?;
                    // Duplicate source keys resolve last-wins; the replaced
                    // node is left detached in the arena.
                    self.attach_to_object(object, SmolStr::from(name.as_ref()), id);
                }
                Ok(object)
            }
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root,
        }
    }

    pub fn root_mut(&mut self) -> NodeMut<'_> {
        let id = self.root;
        NodeMut { tree: self, id }
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        self.check_id(id);
        NodeRef { tree: self, id }
    }

    pub fn node_mut(&mut self, id: NodeId) -> NodeMut<'_> {
        self.check_id(id);
        NodeMut { tree: self, id }
    }

    /// Allocate a detached scalar node.
    pub fn alloc_scalar(&mut self, value: impl Into<Scalar>) -> NodeId {
        self.alloc(NodeData::Scalar(value.into()))
    }

    /// Allocate a detached empty array node.
    pub fn alloc_array(&mut self) -> NodeId {
        self.alloc(NodeData::Array(Vec::new()))
    }

    /// Allocate a detached empty object node.
    pub fn alloc_object(&mut self) -> NodeId {
        self.alloc(NodeData::Object(IndexMap::new()))
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot { parent: None, data });
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    /// Remove `id` from its parent container, leaving it detached in the
    /// arena. Returns false for the root and for already-detached nodes.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.slot(id).parent else {
            return false;
        };
        match &mut self.slot_mut(parent).data {
            NodeData::Array(children) => children.retain(|&c| c != id),
            NodeData::Object(members) => {
                members.retain(|_, &mut c| c != id);
            }
            NodeData::Scalar(_) => {}
        }
        self.slot_mut(id).parent = None;
        true
    }

    /// Replace the root. The new root must be detached; the old root is
    /// left floating in the arena.
    pub fn set_root(&mut self, id: NodeId) {
        self.check_id(id);
        if self.slot(id).parent.is_some() {
            panic!("new root still has a parent; detach it first");
        }
        self.root = id;
    }

    /// Where `child` hangs off its parent, if attached.
    pub fn find_entry_for(&self, child: NodeId) -> Option<NodeEntry<'_>> {
        let parent = self.slot(child).parent?;
        match &self.slot(parent).data {
            NodeData::Array(children) => children
                .iter()
                .position(|&c| c == child)
                .map(NodeEntry::Index),
            NodeData::Object(members) => members
                .iter()
                .find(|(_, &id)| id == child)
                .map(|(key, _)| NodeEntry::Member(key.as_str())),
            NodeData::Scalar(_) => None,
        }
    }

    /// Debug path from the root, `$.shelf.books[3].title` style. Walks
    /// parent links, so a detached node's path is rooted at itself.
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(entry) = self.find_entry_for(current) {
            match entry {
                NodeEntry::Member(key) => segments.push(format!(".{key}")),
                NodeEntry::Index(index) => segments.push(format!("[{index}]")),
            }
            // find_entry_for returned Some, so the parent link exists.
            if let Some(parent) = self.slot(current).parent {
                current = parent;
            } else {
                break;
            }
        }
        let mut path = String::from("$");
        for segment in segments.iter().rev() {
            path.push_str(segment);
        }
        path
    }

    /// Serialize the whole tree.
    pub fn write_to(&self, writer: &mut TokenWriter) -> Result<()> {
        self.write_node(self.root, writer)
    }

    pub(crate) fn write_node(&self, id: NodeId, writer: &mut TokenWriter) -> Result<()> {
        match &self.slot(id).data {
            NodeData::Scalar(Scalar::Null) => writer.write_null(),
            NodeData::Scalar(Scalar::Bool(b)) => writer.write_bool(*b),
            NodeData::Scalar(Scalar::Number(n)) => writer.write_number(n),
            NodeData::Scalar(Scalar::String(s)) => writer.write_string(s),
            NodeData::Array(children) => {
                writer.write_start_array()?;
                for &child in children {
                    self.write_node(child, writer)?;
                }
                writer.write_end_array();
            }
            NodeData::Object(members) => {
                writer.write_start_object()?;
                for (key, &child) in members {
                    writer.write_property_name(key);
                    self.write_node(child, writer)?;
                }
                writer.write_end_object();
            }
        }
        Ok(())
    }

    pub fn to_text(&self) -> Result<String> {
        self.to_text_with_options(WriteOptions::default())
    }

    pub fn to_text_with_options(&self, options: WriteOptions) -> Result<String> {
        let mut writer = TokenWriter::new(options);
        self.write_to(&mut writer)?;
        crate::text::into_string(writer.into_output())
    }

    /// Structural view of one node, used by the resumable writer to walk
    /// children by index.
    pub(crate) fn contents(&self, id: NodeId) -> NodeContents<'_> {
        match &self.slot(id).data {
            NodeData::Scalar(s) => NodeContents::Scalar(s),
            NodeData::Array(children) => NodeContents::Array(children),
            NodeData::Object(members) => NodeContents::Object(members),
        }
    }

    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.0 as usize]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.0 as usize]
    }

    fn check_id(&self, id: NodeId) {
        if id.0 as usize >= self.slots.len() {
            panic!("node id from a different tree");
        }
    }

    fn guard_attach(&self, container: NodeId, child: NodeId) {
        self.check_id(child);
        if self.slot(child).parent.is_some() {
            panic!("node is already attached; detach it before re-attaching");
        }
        if child == self.root {
            panic!("the root cannot be attached to another node; use set_root to swap it out first");
        }
        // Walking up from the container catches self-attachment and any
        // attachment under the child's own subtree.
        let mut current = container;
        loop {
            if current == child {
                panic!("attachment would create a cycle");
            }
            match self.slot(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    pub(crate) fn attach_to_object(
        &mut self,
        object: NodeId,
        key: SmolStr,
        child: NodeId,
    ) -> Option<NodeId> {
        self.guard_attach(object, child);
        let replaced = match &mut self.slot_mut(object).data {
            NodeData::Object(members) => members.insert(key, child),
            _ => panic!("node is not an object"),
        };
        self.slot_mut(child).parent = Some(object);
        if let Some(old) = replaced {
            self.slot_mut(old).parent = None;
        }
        replaced
    }

    pub(crate) fn attach_to_array(&mut self, array: NodeId, index: Option<usize>, child: NodeId) {
        self.guard_attach(array, child);
        match &mut self.slot_mut(array).data {
            NodeData::Array(children) => match index {
                Some(i) if i <= children.len() => children.insert(i, child),
                Some(_) => panic!("array insert past the end"),
                None => children.push(child),
            },
            _ => panic!("node is not an array"),
        }
        self.slot_mut(child).parent = Some(array);
    }

    fn children_slice(&self, id: NodeId) -> &[NodeId] {
        match &self.slot(id).data {
            NodeData::Array(children) => children,
            _ => &[],
        }
    }

    fn object_map(&self, id: NodeId) -> Option<&IndexMap<SmolStr, NodeId>> {
        match &self.slot(id).data {
            NodeData::Object(members) => Some(members),
            _ => None,
        }
    }

    fn structural_eq(&self, a: NodeId, other: &NodeTree, b: NodeId) -> bool {
        match (&self.slot(a).data, &other.slot(b).data) {
            (NodeData::Scalar(x), NodeData::Scalar(y)) => x == y,
            (NodeData::Array(xs), NodeData::Array(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(&x, &y)| self.structural_eq(x, other, y))
            }
            (NodeData::Object(xs), NodeData::Object(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().all(|(key, &x)| {
                        ys.get(key)
                            .is_some_and(|&y| self.structural_eq(x, other, y))
                    })
            }
            _ => false,
        }
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural equality from the roots; member order is ignored, array
/// order is not.
impl PartialEq for NodeTree {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(self.root, other, other.root)
    }
}

/// Shared view of one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t NodeTree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> ValueKind {
        match &self.tree.slot(self.id).data {
            NodeData::Scalar(Scalar::Null) => ValueKind::Null,
            NodeData::Scalar(Scalar::Bool(_)) => ValueKind::Bool,
            NodeData::Scalar(Scalar::Number(_)) => ValueKind::Number,
            NodeData::Scalar(Scalar::String(_)) => ValueKind::String,
            NodeData::Array(_) => ValueKind::Array,
            NodeData::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self.tree.slot(self.id).data,
            NodeData::Scalar(Scalar::Null)
        )
    }

    pub fn scalar(&self) -> Option<&'t Scalar> {
        match &self.tree.slot(self.id).data {
            NodeData::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.scalar() {
            Some(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self.scalar() {
            Some(Scalar::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.as_i64())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_number().and_then(|n| n.as_u64())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.as_f64())
    }

    pub fn as_str(&self) -> Option<&'t str> {
        match self.scalar() {
            Some(Scalar::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Element count for arrays, member count for objects, 0 otherwise.
    pub fn len(&self) -> usize {
        match &self.tree.slot(self.id).data {
            NodeData::Array(children) => children.len(),
            NodeData::Object(members) => members.len(),
            NodeData::Scalar(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<NodeRef<'t>> {
        let id = *self.tree.object_map(self.id)?.get(key)?;
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }

    pub fn at(&self, index: usize) -> Option<NodeRef<'t>> {
        let id = *self.tree.children_slice(self.id).get(index)?;
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }

    pub fn elements(self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        tree.children_slice(self.id)
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    pub fn members(self) -> impl Iterator<Item = (&'t str, NodeRef<'t>)> + 't {
        let tree = self.tree;
        tree.object_map(self.id)
            .into_iter()
            .flat_map(move |map| {
                map.iter()
                    .map(move |(key, &id)| (key.as_str(), NodeRef { tree, id }))
            })
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        let id = self.tree.parent(self.id)?;
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }

    pub fn path(&self) -> String {
        self.tree.path(self.id)
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Exclusive handle to one node; mutators panic when applied to the
/// wrong node kind, mirroring the attach rules on the tree.
pub struct NodeMut<'t> {
    tree: &'t mut NodeTree,
    id: NodeId,
}

impl<'t> NodeMut<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn as_ref(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self.tree,
            id: self.id,
        }
    }

    /// Upsert a scalar member. An existing key keeps its position in the
    /// member order and its previous value node is detached. Returns the
    /// id of the new value node.
    pub fn set(&mut self, key: &str, value: impl Into<Scalar>) -> NodeId {
        let child = self.tree.alloc_scalar(value);
        self.tree
            .attach_to_object(self.id, SmolStr::from(key), child);
        child
    }

    /// Upsert an already-allocated (and detached) node as a member.
    pub fn insert_node(&mut self, key: &str, child: NodeId) -> Option<NodeId> {
        self.tree
            .attach_to_object(self.id, SmolStr::from(key), child)
    }

    /// Remove a member; true when the key existed. The removed subtree
    /// stays in the arena, detached.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(&child) = self.tree.object_map(self.id).and_then(|m| m.get(key)) else {
            return false;
        };
        self.tree.detach(child)
    }

    /// Append a scalar element; returns its id.
    pub fn push(&mut self, value: impl Into<Scalar>) -> NodeId {
        let child = self.tree.alloc_scalar(value);
        self.tree.attach_to_array(self.id, None, child);
        child
    }

    /// Append an already-allocated detached node.
    pub fn push_node(&mut self, child: NodeId) {
        self.tree.attach_to_array(self.id, None, child);
    }

    /// Insert a scalar element at `index`; returns its id.
    pub fn insert(&mut self, index: usize, value: impl Into<Scalar>) -> NodeId {
        let child = self.tree.alloc_scalar(value);
        self.tree.attach_to_array(self.id, Some(index), child);
        child
    }

    pub fn insert_node_at(&mut self, index: usize, child: NodeId) {
        self.tree.attach_to_array(self.id, Some(index), child);
    }

    /// Replace the element at `index` with a scalar; the old element is
    /// detached. Returns the new id.
    pub fn set_at(&mut self, index: usize, value: impl Into<Scalar>) -> NodeId {
        let old = match self.tree.children_slice(self.id).get(index) {
            Some(&id) => id,
            None => panic!("array index out of bounds"),
        };
        self.tree.detach(old);
        let child = self.tree.alloc_scalar(value);
        self.tree.attach_to_array(self.id, Some(index), child);
        child
    }

    /// Remove the element at `index`; true when it existed.
    pub fn remove_at(&mut self, index: usize) -> bool {
        match self.tree.children_slice(self.id).get(index) {
            Some(&child) => self.tree.detach(child),
            None => false,
        }
    }

    /// Descend into a member for further mutation.
    pub fn member_mut(&mut self, key: &str) -> Option<NodeMut<'_>> {
        let id = *self.tree.object_map(self.id)?.get(key)?;
        Some(NodeMut {
            tree: self.tree,
            id,
        })
    }

    /// Descend into an array element for further mutation.
    pub fn at_mut(&mut self, index: usize) -> Option<NodeMut<'_>> {
        let id = *self.tree.children_slice(self.id).get(index)?;
        Some(NodeMut {
            tree: self.tree,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_set_creates_parent_link() {
        let mut tree = NodeTree::new();
        let child = tree.root_mut().set("a", 1i64);
        assert_eq!(tree.parent(child), Some(tree.root_id()));
        assert_eq!(tree.root().get("a").expect("member").as_i64(), Some(1));
    }

    #[rstest::rstest]
    fn test_replacing_a_member_detaches_the_old_child() {
        let mut tree = NodeTree::new();
        let first = tree.root_mut().set("a", 1i64);
        let second = tree.root_mut().set("a", 2i64);
        assert_eq!(tree.parent(first), None);
        assert_eq!(tree.parent(second), Some(tree.root_id()));
        assert_eq!(tree.root().len(), 1);
    }

    #[rstest::rstest]
    fn test_upsert_keeps_member_position() {
        let mut tree = NodeTree::new();
        tree.root_mut().set("a", 1i64);
        tree.root_mut().set("b", 2i64);
        tree.root_mut().set("a", 3i64);
        let keys: Vec<&str> = tree.root().members().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[rstest::rstest]
    fn test_detach_and_reattach_moves_a_subtree() {
        let mut tree = NodeTree::new();
        let array = tree.alloc_array();
        tree.root_mut().insert_node("items", array);
        tree.node_mut(array).push(1i64);
        tree.node_mut(array).push(2i64);

        assert!(tree.detach(array));
        assert_eq!(tree.parent(array), None);
        assert_eq!(tree.root().len(), 0);

        tree.root_mut().insert_node("moved", array);
        assert_eq!(tree.root().get("moved").expect("member").len(), 2);
        assert_eq!(tree.path(tree.node(array).at(1).expect("el").id()), "$.moved[1]");
    }

    #[rstest::rstest]
    #[should_panic(expected = "already attached")]
    fn test_double_attach_panics() {
        let mut tree = NodeTree::new();
        let child = tree.root_mut().set("a", 1i64);
        tree.root_mut().insert_node("b", child);
    }

    #[rstest::rstest]
    #[should_panic(expected = "cycle")]
    fn test_attaching_an_ancestor_panics() {
        let mut tree = NodeTree::new();
        let outer = tree.alloc_object();
        tree.root_mut().insert_node("outer", outer);
        let inner = tree.alloc_object();
        tree.node_mut(outer).insert_node("inner", inner);
        tree.detach(outer);
        // outer is now detached but inner still sits below it.
        tree.node_mut(inner).insert_node("loop", outer);
    }

    #[rstest::rstest]
    #[should_panic(expected = "not an object")]
    fn test_member_write_on_array_panics() {
        let mut tree = NodeTree::new_array();
        tree.root_mut().set("a", 1i64);
    }

    #[rstest::rstest]
    fn test_array_editing() {
        let mut tree = NodeTree::new_array();
        tree.root_mut().push(1i64);
        tree.root_mut().push(3i64);
        tree.root_mut().insert(1, 2i64);
        tree.root_mut().set_at(2, 30i64);
        assert!(tree.root_mut().remove_at(0));
        assert!(!tree.root_mut().remove_at(5));
        let values: Vec<i64> = tree
            .root()
            .elements()
            .filter_map(|n| n.as_i64())
            .collect();
        assert_eq!(values, [2, 30]);
    }

    #[rstest::rstest]
    fn test_path_rendering() {
        let mut tree = NodeTree::new();
        let shelf = tree.alloc_object();
        tree.root_mut().insert_node("shelf", shelf);
        let books = tree.alloc_array();
        tree.node_mut(shelf).insert_node("books", books);
        let book = tree.alloc_object();
        tree.node_mut(books).push_node(book);
        let title = tree.node_mut(book).set("title", "Dune");
        assert_eq!(tree.path(title), "$.shelf.books[0].title");
        assert_eq!(tree.path(tree.root_id()), "$");
    }

    #[rstest::rstest]
    fn test_find_entry_for() {
        let mut tree = NodeTree::new();
        let list = tree.alloc_array();
        tree.root_mut().insert_node("list", list);
        let item = tree.node_mut(list).push(7i64);
        assert_eq!(tree.find_entry_for(list), Some(NodeEntry::Member("list")));
        assert_eq!(tree.find_entry_for(item), Some(NodeEntry::Index(0)));
        assert_eq!(tree.find_entry_for(tree.root_id()), None);
    }

    #[rstest::rstest]
    fn test_parse_and_serialize_round_trip() {
        let text = r#"{"name":"ada","tags":["x","y"],"age":36,"extra":null}"#;
        let tree = NodeTree::parse(text).expect("parse");
        assert_eq!(tree.root().get("name").expect("member").as_str(), Some("ada"));
        assert_eq!(tree.root().get("tags").expect("member").len(), 2);
        assert!(tree.root().get("extra").expect("member").is_null());
        assert_eq!(tree.to_text().expect("text"), text);
    }

    #[rstest::rstest]
    fn test_structural_equality_ignores_member_order() {
        let a = NodeTree::parse(r#"{"x":1,"y":[true,null]}"#).expect("parse");
        let b = NodeTree::parse(r#"{"y":[true,null],"x":1}"#).expect("parse");
        let c = NodeTree::parse(r#"{"x":1,"y":[null,true]}"#).expect("parse");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[rstest::rstest]
    fn test_write_depth_guard() {
        let mut tree = NodeTree::new_array();
        let mut current = tree.root_id();
        for _ in 0..3 {
            let next = tree.alloc_array();
            tree.node_mut(current).push_node(next);
            current = next;
        }
        let shallow = WriteOptions::default().with_max_depth(3);
        assert!(tree.to_text_with_options(shallow).is_err());
        let deep = WriteOptions::default().with_max_depth(4);
        assert!(tree.to_text_with_options(deep).is_ok());
    }

    #[rstest::rstest]
    fn test_nonfinite_floats_degrade_to_null() {
        assert_eq!(Scalar::from(f64::NAN), Scalar::Null);
        assert_eq!(Scalar::from(2.5f64), Scalar::Number(Number::Float(2.5)));
    }
}
