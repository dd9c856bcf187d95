//! Mutable XML node tree.
//!
//! A [`Node`] is a cheap, reference-counted handle. Text follows the
//! "text and tail" model: an element's `text` is the character data before
//! its first child, and each child's `tail` is the character data that
//! follows it inside the parent. Parents own their children; children keep a
//! weak link back to the parent.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::attributes::{Attributes, normalize_keyword};
use crate::content::{Atom, Content, Value};
use crate::error::MeldError;
use crate::flatten::flatten;
use crate::qname::{local_name, split_clark};
use crate::renderer::{Renderer, WeakRenderer};
use crate::MELD_ID;

/// Namespace declarations carried by an element: `(prefix, uri)`, where a
/// `None` prefix is the default namespace.
pub type NamespaceDecls = Vec<(Option<String>, String)>;

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Element with its name in Clark notation.
    Element(String),
    /// Comment; its content is the node text.
    Comment,
    /// Processing instruction; its content is the node text.
    ProcessingInstruction(String),
}

pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) nsmap: NamespaceDecls,
    pub(crate) attributes: Attributes,
    pub(crate) text: Option<String>,
    pub(crate) tail: Option<String>,
    pub(crate) children: Vec<Node>,
    pub(crate) renderer: Option<WeakRenderer>,
    pub(crate) authorized: Option<Rc<BTreeSet<String>>>,
}

pub(crate) struct NodeInner {
    pub(crate) data: RefCell<NodeData>,
    parent: RefCell<Weak<NodeInner>>,
}

/// Handle to a node in a tree.
///
/// Cloning the handle does not copy the node; use [`Node::deep_clone`] for
/// that. Two handles compare equal when they point at the same node.
#[derive(Clone)]
pub struct Node(pub(crate) Rc<NodeInner>);

impl Node {
    fn from_data(data: NodeData) -> Self {
        Self(Rc::new(NodeInner {
            data: RefCell::new(data),
            parent: RefCell::new(Weak::new()),
        }))
    }

    pub(crate) fn with_kind(
        kind: NodeKind,
        nsmap: NamespaceDecls,
        attributes: Attributes,
        renderer: Option<WeakRenderer>,
    ) -> Self {
        Self::from_data(NodeData {
            kind,
            nsmap,
            attributes,
            text: None,
            tail: None,
            children: Vec::new(),
            renderer,
            authorized: None,
        })
    }

    /// Detached element without renderer or namespace declarations.
    pub fn element(name: impl Into<String>) -> Self {
        Self::with_kind(
            NodeKind::Element(name.into()),
            Vec::new(),
            Attributes::new(),
            None,
        )
    }

    pub(crate) fn set_authorized(&self, authorized: Rc<BTreeSet<String>>) {
        self.0.data.borrow_mut().authorized = Some(authorized);
    }

    pub(crate) fn set_renderer(&self, renderer: Option<WeakRenderer>) {
        self.0.data.borrow_mut().renderer = renderer;
    }

    pub(crate) fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.0.data.borrow().kind.clone()
    }

    /// Whether this node is an element.
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self.0.data.borrow().kind, NodeKind::Element(_))
    }

    /// Element name in Clark notation; `None` for comments and PIs.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        match &self.0.data.borrow().kind {
            NodeKind::Element(name) => Some(name.clone()),
            _ => None,
        }
    }

    /// Element name without its namespace.
    #[must_use]
    pub fn local_name(&self) -> Option<String> {
        self.name().map(|name| local_name(&name).to_owned())
    }

    /// Namespace URI of the element name.
    #[must_use]
    pub fn namespace(&self) -> Option<String> {
        self.name()
            .and_then(|name| split_clark(&name).map(|(uri, _)| uri.to_owned()))
    }

    /// Namespace declarations made on this element.
    #[must_use]
    pub fn namespace_declarations(&self) -> NamespaceDecls {
        self.0.data.borrow().nsmap.clone()
    }

    pub(crate) fn add_namespace_declaration(&self, prefix: Option<String>, uri: String) {
        let mut data = self.0.data.borrow_mut();
        if !data.nsmap.iter().any(|(p, _)| *p == prefix) {
            data.nsmap.push((prefix, uri));
        }
    }

    /// Character data before the first child.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.0.data.borrow().text.clone()
    }

    /// Replace the text.
    pub fn set_text(&self, text: Option<&str>) {
        self.0.data.borrow_mut().text = text.map(ToOwned::to_owned);
    }

    /// Drop the text.
    pub fn clear_text(&self) {
        self.0.data.borrow_mut().text = None;
    }

    /// Character data following this node inside its parent.
    #[must_use]
    pub fn tail(&self) -> Option<String> {
        self.0.data.borrow().tail.clone()
    }

    /// Replace the tail.
    pub fn set_tail(&self, tail: Option<&str>) {
        self.0.data.borrow_mut().tail = tail.map(ToOwned::to_owned);
    }

    /// Drop the tail.
    pub fn clear_tail(&self) {
        self.0.data.borrow_mut().tail = None;
    }

    fn push_text(&self, text: &str) {
        self.0
            .data
            .borrow_mut()
            .text
            .get_or_insert_with(String::new)
            .push_str(text);
    }

    fn push_tail(&self, text: &str) {
        self.0
            .data
            .borrow_mut()
            .tail
            .get_or_insert_with(String::new)
            .push_str(text);
    }

    /// Append text after the last child, or to the text when there is none.
    pub(crate) fn append_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.last_child() {
            Some(last) => last.push_tail(text),
            None => self.push_text(text),
        }
    }

    /// Attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.data.borrow().attributes.get(key).map(ToOwned::to_owned)
    }

    /// Set an attribute without validation.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.data.borrow_mut().attributes.insert(key, value);
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attribute(&self, key: &str) -> Option<String> {
        self.0.data.borrow_mut().attributes.remove(key)
    }

    /// Copy of the attribute mapping.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.0.data.borrow().attributes.clone()
    }

    /// Parent element, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Topmost ancestor, or the node itself.
    #[must_use]
    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub(crate) fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Copy of the child list.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        self.0.data.borrow().children.clone()
    }

    /// Child at `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.data.borrow().children.get(index).cloned()
    }

    fn last_child(&self) -> Option<Node> {
        self.0.data.borrow().children.last().cloned()
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.borrow().children.len()
    }

    /// Whether the node has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.data.borrow().children.is_empty()
    }

    /// Position of `child` among the children.
    #[must_use]
    pub fn index_of(&self, child: &Node) -> Option<usize> {
        self.0
            .data
            .borrow()
            .children
            .iter()
            .position(|c| c.ptr_eq(child))
    }

    /// Append `child`, moving it out of its current parent.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::TreeState`] if `child` is this node or one of its
    /// ancestors.
    pub fn append(&self, child: &Node) -> Result<(), MeldError> {
        let len = self.len();
        self.insert(len, child)
    }

    /// Insert `child` at `index`, moving it out of its current parent.
    ///
    /// An index past the end appends.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::TreeState`] if `child` is this node or one of its
    /// ancestors.
    pub fn insert(&self, index: usize, child: &Node) -> Result<(), MeldError> {
        if child.contains(self) {
            return Err(MeldError::TreeState(
                "cannot insert a node into itself or its descendants".to_owned(),
            ));
        }
        child.detach();
        self.attach_at(index, child);
        Ok(())
    }

    /// Insert a detached node known not to be an ancestor.
    pub(crate) fn attach_at(&self, index: usize, child: &Node) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        let mut data = self.0.data.borrow_mut();
        let index = index.min(data.children.len());
        data.children.insert(index, child.clone());
    }

    /// Remove `child` from this node. The child keeps its tail.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::TreeState`] if `child` is not a child of this
    /// node.
    pub fn remove(&self, child: &Node) -> Result<(), MeldError> {
        if self.index_of(child).is_none() {
            return Err(MeldError::TreeState("node is not a child".to_owned()));
        }
        child.detach();
        Ok(())
    }

    /// Detach from the parent, keeping the tail.
    ///
    /// A node without its own renderer adopts the one resolved through its
    /// former root, so it stays bound after leaving the tree.
    pub fn detach(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        let renderer = self.renderer_ref();
        parent
            .0
            .data
            .borrow_mut()
            .children
            .retain(|c| !c.ptr_eq(self));
        *self.0.parent.borrow_mut() = Weak::new();
        let mut data = self.0.data.borrow_mut();
        if data.renderer.is_none() {
            data.renderer = renderer;
        }
    }

    /// Detach every child and drop the text.
    pub(crate) fn clear(&self) {
        for child in self.children() {
            child.detach();
        }
        self.clear_text();
    }

    /// All descendants in document order, excluding the node itself.
    #[must_use]
    pub fn descendants(&self) -> Descendants {
        let mut stack = self.children();
        stack.reverse();
        Descendants { stack }
    }

    /// Independent copy of the subtree.
    ///
    /// The copy is detached, keeps the tail, and is bound to the renderer
    /// resolved for the original.
    #[must_use]
    pub fn deep_clone(&self) -> Node {
        let copy = self.clone_subtree();
        copy.0.data.borrow_mut().renderer = self.renderer_ref();
        copy
    }

    fn clone_subtree(&self) -> Node {
        let data = self.0.data.borrow();
        let copy = Self::from_data(NodeData {
            kind: data.kind.clone(),
            nsmap: data.nsmap.clone(),
            attributes: data.attributes.clone(),
            text: data.text.clone(),
            tail: data.tail.clone(),
            children: Vec::with_capacity(data.children.len()),
            renderer: data.renderer.clone(),
            authorized: data.authorized.clone(),
        });
        for child in &data.children {
            let child_copy = child.clone_subtree();
            copy.attach_at(usize::MAX, &child_copy);
        }
        copy
    }

    fn own_renderer_ref(&self) -> Option<WeakRenderer> {
        self.0
            .data
            .borrow()
            .renderer
            .as_ref()
            .filter(|weak| weak.strong_count() > 0)
            .cloned()
    }

    pub(crate) fn renderer_ref(&self) -> Option<WeakRenderer> {
        self.own_renderer_ref()
            .or_else(|| self.root().own_renderer_ref())
    }

    /// Renderer that created this node or the root of its tree.
    #[must_use]
    pub fn renderer(&self) -> Option<Renderer> {
        self.renderer_ref().as_ref().and_then(Renderer::upgrade)
    }

    /// Add children and attributes.
    ///
    /// `children` is flattened with the node's renderer. Attribute mappings
    /// found among the children are merged after `attributes`. Text before
    /// the first new node is appended after the last existing child (or to
    /// the text); text after a new node is appended to that node's tail.
    /// Empty `children` with no attributes is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::AttributeValidation`] when the element was
    /// created from a declared tag and an attribute falls outside the
    /// authorized set, and [`MeldError::TreeState`] when a child would
    /// become its own ancestor.
    pub fn add_children(
        &self,
        children: impl Into<Content>,
        attributes: Option<Attributes>,
    ) -> Result<(), MeldError> {
        let children = children.into();
        let mut merged = attributes.unwrap_or_default();
        if children.is_empty() && merged.is_empty() {
            return Ok(());
        }

        let renderer = self.renderer();
        let mut leading = String::new();
        let mut added: Vec<(Node, String)> = Vec::new();
        for atom in flatten(children, renderer.as_ref()) {
            match atom {
                Atom::Attrs(attributes) => merged.extend(attributes),
                Atom::Node(node) => added.push((node, String::new())),
                Atom::Value(value) => match added.last_mut() {
                    Some((_, tail)) => tail.push_str(&value.to_string()),
                    None => leading.push_str(&value.to_string()),
                },
            }
        }

        self.append_text(&leading);
        self.0.data.borrow_mut().attributes.extend(merged);
        for (node, tail) in added {
            self.append(&node)?;
            if !tail.is_empty() {
                node.push_tail(&tail);
            }
        }
        self.check_attributes()
    }

    fn check_attributes(&self) -> Result<(), MeldError> {
        let data = self.0.data.borrow();
        self.check_attribute_set(&data.attributes)
    }

    /// Validate `attributes` against this node's whitelist without storing them.
    pub(crate) fn check_attribute_set(&self, attributes: &Attributes) -> Result<(), MeldError> {
        let data = self.0.data.borrow();
        let Some(authorized) = &data.authorized else {
            return Ok(());
        };
        let mut rejected: Vec<String> = attributes
            .keys()
            .filter(|key| *key != MELD_ID && !authorized.contains(*key))
            .map(ToOwned::to_owned)
            .collect();
        if rejected.is_empty() {
            return Ok(());
        }
        rejected.sort();
        let tag = match &data.kind {
            NodeKind::Element(name) => local_name(name).to_owned(),
            _ => String::new(),
        };
        Err(MeldError::AttributeValidation {
            tag,
            attributes: rejected,
        })
    }

    /// Add children and return the node, for chaining.
    ///
    /// # Errors
    ///
    /// See [`Node::add_children`].
    pub fn call(&self, children: impl Into<Content>) -> Result<Node, MeldError> {
        self.add_children(children, None)?;
        Ok(self.clone())
    }

    /// Add children and keyword-style attributes, then return the node.
    ///
    /// Attribute names go through [`normalize_keyword`].
    ///
    /// # Errors
    ///
    /// See [`Node::add_children`].
    pub fn call_with<I, K, V>(
        &self,
        children: impl Into<Content>,
        attributes: I,
    ) -> Result<Node, MeldError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(key, value)| (normalize_keyword(key.as_ref()), value))
            .collect();
        self.add_children(children, Some(attributes))?;
        Ok(self.clone())
    }

    /// Set one keyword-style attribute and return the node.
    ///
    /// # Errors
    ///
    /// See [`Node::add_children`].
    pub fn attr(&self, name: &str, value: impl Into<Value>) -> Result<Node, MeldError> {
        self.call_with(Content::empty(), [(name, value)])
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.data.borrow();
        f.debug_struct("Node")
            .field("kind", &data.kind)
            .field("attributes", &data.attributes)
            .field("text", &data.text)
            .field("tail", &data.tail)
            .field("children", &data.children.len())
            .finish()
    }
}

/// Iterator over descendants, see [`Node::descendants`].
pub struct Descendants {
    stack: Vec<Node>,
}

impl Iterator for Descendants {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().into_iter().rev());
        Some(node)
    }
}
