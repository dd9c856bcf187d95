//! Tree-building session.
//!
//! A [`Renderer`] creates nodes bound to itself, holds the namespace table
//! and the optional attribute whitelist, and keeps a stack of open scopes
//! so trees can be built imperatively with [`Renderer::enter`],
//! [`Renderer::append`] and [`Renderer::exit`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use rand::RngExt;

use crate::attributes::Attributes;
use crate::content::{Atom, Content};
use crate::error::MeldError;
use crate::flatten::flatten;
use crate::node::{Node, NodeKind};
use crate::qname::clark;

/// Settings a renderer starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererOptions {
    /// Enforce attribute whitelists registered with [`Renderer::declare_tag`].
    pub check_attributes: bool,
    /// Prefix to URI table declared on every created element.
    pub namespaces: BTreeMap<String, String>,
    /// Prefix whose URI qualifies every created element name.
    pub default_namespace: Option<String>,
}

pub(crate) struct RendererInner {
    id: String,
    parent: Option<Renderer>,
    options: RefCell<RendererOptions>,
    authorized: RefCell<HashMap<String, Rc<BTreeSet<String>>>>,
    scopes: RefCell<Vec<Vec<Content>>>,
}

pub(crate) type WeakRenderer = Weak<RendererInner>;

/// Handle to a tree-building session.
///
/// Handles are cheap to clone and share one session. A renderer is bound to
/// the thread that created it and cannot be serialized; its identity only
/// makes sense while it is alive.
#[derive(Clone)]
pub struct Renderer(Rc<RendererInner>);

/// Output of [`Renderer::root`].
#[derive(Debug, Clone, PartialEq)]
pub enum RootContent {
    /// Exactly one top-level item.
    Single(Atom),
    /// Zero or several top-level items.
    Many(Vec<Atom>),
}

impl RootContent {
    /// The single top-level node, if there is one.
    #[must_use]
    pub fn into_node(self) -> Option<Node> {
        match self {
            Self::Single(Atom::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// All top-level items.
    #[must_use]
    pub fn into_atoms(self) -> Vec<Atom> {
        match self {
            Self::Single(atom) => vec![atom],
            Self::Many(atoms) => atoms,
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Top-level renderer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::build(RendererOptions::default(), None, HashMap::new())
    }

    /// Top-level renderer with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::UnknownNamespace`] if the default namespace is
    /// not a key of the namespace table.
    pub fn with_options(options: RendererOptions) -> Result<Self, MeldError> {
        validate_default(&options)?;
        Ok(Self::build(options, None, HashMap::new()))
    }

    fn build(
        options: RendererOptions,
        parent: Option<Renderer>,
        authorized: HashMap<String, Rc<BTreeSet<String>>>,
    ) -> Self {
        let renderer = Self(Rc::new(RendererInner {
            id: Self::generate_id("renderer_"),
            parent,
            options: RefCell::new(options),
            authorized: RefCell::new(authorized),
            scopes: RefCell::new(vec![Vec::new()]),
        }));
        tracing::trace!(id = %renderer.id(), "Renderer created");
        renderer
    }

    /// Child renderer inheriting this renderer's options and tag whitelists.
    #[must_use]
    pub fn child(&self) -> Renderer {
        let options = self.0.options.borrow().clone();
        let authorized = self.0.authorized.borrow().clone();
        Self::build(options, Some(self.clone()), authorized)
    }

    /// Parent renderer, if this one was made with [`Renderer::child`].
    #[must_use]
    pub fn parent(&self) -> Option<&Renderer> {
        self.0.parent.as_ref()
    }

    pub(crate) fn downgrade(&self) -> WeakRenderer {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &WeakRenderer) -> Option<Renderer> {
        weak.upgrade().map(Renderer)
    }

    /// Session identifier, `renderer_` followed by digits.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Random identifier: `prefix` followed by eight decimal digits.
    #[must_use]
    pub fn generate_id(prefix: &str) -> String {
        let n: u32 = rand::rng().random_range(10_000_000..100_000_000);
        format!("{prefix}{n}")
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> RendererOptions {
        self.0.options.borrow().clone()
    }

    /// Namespace table.
    #[must_use]
    pub fn namespaces(&self) -> BTreeMap<String, String> {
        self.0.options.borrow().namespaces.clone()
    }

    /// Replace the namespace table.
    ///
    /// A default namespace whose prefix disappears from the table stops
    /// qualifying new elements.
    pub fn set_namespaces(&self, namespaces: BTreeMap<String, String>) {
        self.0.options.borrow_mut().namespaces = namespaces;
    }

    /// Prefix of the default namespace.
    #[must_use]
    pub fn default_namespace(&self) -> Option<String> {
        self.0.options.borrow().default_namespace.clone()
    }

    /// Set or clear the default namespace prefix.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::UnknownNamespace`] if `prefix` is not in the
    /// namespace table.
    pub fn set_default_namespace(&self, prefix: Option<&str>) -> Result<(), MeldError> {
        let mut options = self.0.options.borrow_mut();
        if let Some(prefix) = prefix
            && !options.namespaces.contains_key(prefix)
        {
            return Err(MeldError::UnknownNamespace(prefix.to_owned()));
        }
        options.default_namespace = prefix.map(ToOwned::to_owned);
        Ok(())
    }

    /// Whether attribute whitelists are enforced.
    #[must_use]
    pub fn check_attributes(&self) -> bool {
        self.0.options.borrow().check_attributes
    }

    /// Turn attribute whitelist enforcement on or off for new elements.
    pub fn set_check_attributes(&self, check: bool) {
        self.0.options.borrow_mut().check_attributes = check;
    }

    /// Register the attributes allowed on elements named `name`.
    pub fn declare_tag<I, S>(&self, name: &str, authorized: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = authorized.into_iter().map(Into::into).collect();
        self.0
            .authorized
            .borrow_mut()
            .insert(name.to_owned(), Rc::new(set));
    }

    /// New element named `name`, qualified by the default namespace and
    /// declaring the namespace table.
    #[must_use]
    pub fn tag(&self, name: &str) -> Node {
        let options = self.0.options.borrow();
        let qualified = match options
            .default_namespace
            .as_ref()
            .and_then(|prefix| options.namespaces.get(prefix))
        {
            Some(uri) => clark(uri, name),
            None => name.to_owned(),
        };
        let nsmap = options
            .namespaces
            .iter()
            .map(|(prefix, uri)| (Some(prefix.clone()), uri.clone()))
            .collect();
        let node = Node::with_kind(
            NodeKind::Element(qualified),
            nsmap,
            Attributes::new(),
            Some(self.downgrade()),
        );
        if options.check_attributes
            && let Some(authorized) = self.0.authorized.borrow().get(name)
        {
            node.set_authorized(Rc::clone(authorized));
        }
        node
    }

    /// New comment node.
    #[must_use]
    pub fn comment(&self, text: &str) -> Node {
        let node = Node::with_kind(
            NodeKind::Comment,
            Vec::new(),
            Attributes::new(),
            Some(self.downgrade()),
        );
        node.set_text(Some(text));
        node
    }

    /// New processing instruction node.
    #[must_use]
    pub fn processing_instruction(&self, target: &str, text: Option<&str>) -> Node {
        let node = Node::with_kind(
            NodeKind::ProcessingInstruction(target.to_owned()),
            Vec::new(),
            Attributes::new(),
            Some(self.downgrade()),
        );
        node.set_text(text);
        node
    }

    /// Append content to the innermost open scope.
    pub fn append(&self, content: impl Into<Content>) -> &Self {
        if let Some(frame) = self.0.scopes.borrow_mut().last_mut() {
            frame.push(content.into());
        }
        self
    }

    /// Append `node` to the current scope and open a scope for its children.
    pub fn enter(&self, node: &Node) {
        let mut scopes = self.0.scopes.borrow_mut();
        if let Some(frame) = scopes.last_mut() {
            frame.push(Content::Node(node.clone()));
        }
        scopes.push(Vec::new());
    }

    /// Close the innermost scope, adding what it collected to `node`.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::ScopeImbalance`] when no scope is open or the
    /// innermost scope was not opened for `node`, and any error from
    /// [`Node::add_children`].
    pub fn exit(&self, node: &Node) -> Result<(), MeldError> {
        let frame = {
            let mut scopes = self.0.scopes.borrow_mut();
            if scopes.len() < 2 {
                return Err(MeldError::ScopeImbalance("exit without a matching enter"));
            }
            let entered = scopes[scopes.len() - 2].last();
            if !matches!(entered, Some(Content::Node(n)) if n == node) {
                return Err(MeldError::ScopeImbalance(
                    "exit does not match the innermost enter",
                ));
            }
            scopes.pop().unwrap_or_default()
        };
        node.add_children(Content::Seq(frame), None)
    }

    /// Drop the innermost scope without touching its node.
    fn abandon(&self) {
        let mut scopes = self.0.scopes.borrow_mut();
        if scopes.len() > 1 {
            scopes.pop();
        }
    }

    /// Run `f` inside a scope opened for `node`.
    ///
    /// When `f` fails the scope is discarded and its content is not added.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or any error from [`Renderer::exit`].
    pub fn with<T>(
        &self,
        node: &Node,
        f: impl FnOnce(&Renderer) -> Result<T, MeldError>,
    ) -> Result<T, MeldError> {
        self.enter(node);
        match f(self) {
            Ok(value) => {
                self.exit(node)?;
                Ok(value)
            }
            Err(err) => {
                self.abandon();
                Err(err)
            }
        }
    }

    /// Open a scope for `node` that closes when the guard is dropped.
    pub fn scope(&self, node: &Node) -> Scope<'_> {
        self.enter(node);
        Scope {
            renderer: self,
            node: node.clone(),
            open: true,
        }
    }

    /// Flattened top-level content.
    ///
    /// Can be read repeatedly; components are rendered once and their
    /// output replaces them.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::ScopeImbalance`] while a scope is still open.
    pub fn root(&self) -> Result<RootContent, MeldError> {
        let base = {
            let mut scopes = self.0.scopes.borrow_mut();
            if scopes.len() > 1 {
                return Err(MeldError::ScopeImbalance(
                    "root read while a scope is still open",
                ));
            }
            std::mem::take(&mut scopes[0])
        };
        let mut atoms: Vec<Atom> = flatten(Content::Seq(base), Some(self)).collect();
        self.0.scopes.borrow_mut()[0] = atoms.iter().cloned().map(Content::from).collect();
        Ok(if atoms.len() == 1 {
            RootContent::Single(atoms.remove(0))
        } else {
            RootContent::Many(atoms)
        })
    }
}

fn validate_default(options: &RendererOptions) -> Result<(), MeldError> {
    match &options.default_namespace {
        Some(prefix) if !options.namespaces.contains_key(prefix) => {
            Err(MeldError::UnknownNamespace(prefix.clone()))
        }
        _ => Ok(()),
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("id", &self.0.id)
            .field("options", &*self.0.options.borrow())
            .field("open_scopes", &(self.0.scopes.borrow().len() - 1))
            .finish_non_exhaustive()
    }
}

/// Scope guard returned by [`Renderer::scope`].
///
/// Dropping the guard exits the scope; errors are logged. Call
/// [`Scope::close`] to observe them instead.
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct Scope<'r> {
    renderer: &'r Renderer,
    node: Node,
    open: bool,
}

impl Scope<'_> {
    /// Node this scope collects children for.
    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Exit the scope.
    ///
    /// # Errors
    ///
    /// See [`Renderer::exit`].
    pub fn close(mut self) -> Result<(), MeldError> {
        self.open = false;
        self.renderer.exit(&self.node)
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.open
            && let Err(err) = self.renderer.exit(&self.node)
        {
            tracing::warn!(error = %err, "Failed to close renderer scope");
        }
    }
}
