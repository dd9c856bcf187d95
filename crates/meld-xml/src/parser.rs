//! Markup to node tree, on top of the quick-xml event reader.

use std::path::Path;
use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::attributes::Attributes;
use crate::content::Content;
use crate::error::ParseError;
use crate::node::{NamespaceDecls, Node, NodeKind};
use crate::qname::{XML_NS, clark, split_qname};
use crate::renderer::Renderer;
use crate::source::{DEFAULT_FETCH_TIMEOUT, Loaded, Source};

/// Element wrapping fragment input while it is parsed.
const FRAGMENT_CONTAINER: &str = "meld-fragment";

/// Parse settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Encoding of byte input: `utf-8` or `us-ascii`.
    pub encoding: String,
    /// Drop text before the first fragment node.
    pub no_leading_text: bool,
    /// Timeout for URL sources.
    pub fetch_timeout: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_owned(),
            no_leading_text: false,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT),
        }
    }
}

impl ParseOptions {
    /// Set the input encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Toggle dropping of leading fragment text.
    #[must_use]
    pub fn no_leading_text(mut self, enabled: bool) -> Self {
        self.no_leading_text = enabled;
        self
    }

    /// Set the URL fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Top-level item of a parsed fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentItem {
    /// Text before the first node.
    Text(String),
    /// Top-level node.
    Node(Node),
}

impl FragmentItem {
    /// The node, if this item is one.
    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            Self::Text(_) => None,
        }
    }
}

impl From<FragmentItem> for Content {
    fn from(item: FragmentItem) -> Self {
        match item {
            FragmentItem::Text(text) => Content::from(text),
            FragmentItem::Node(node) => Content::Node(node),
        }
    }
}

/// Decode raw input strictly in the named encoding.
fn decode(bytes: Vec<u8>, encoding: &str) -> Result<String, ParseError> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => {
            let bytes = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
                Some(rest) => rest.to_vec(),
                None => bytes,
            };
            String::from_utf8(bytes).map_err(|err| ParseError::Utf8(err.utf8_error()))
        }
        "us-ascii" | "ascii" => match bytes.iter().position(|b| !b.is_ascii()) {
            Some(offset) => Err(ParseError::NotAscii {
                encoding: encoding.to_owned(),
                offset,
            }),
            None => String::from_utf8(bytes).map_err(|err| ParseError::Utf8(err.utf8_error())),
        },
        _ => Err(ParseError::UnsupportedEncoding(encoding.to_owned())),
    }
}

fn load_text(source: Source, options: &ParseOptions) -> Result<String, ParseError> {
    match source.load(options.fetch_timeout)? {
        Loaded::Text(text) => Ok(text),
        Loaded::Bytes(bytes) => decode(bytes, &options.encoding),
    }
}

/// Parse a complete document; the root element is bound to `renderer`.
///
/// Comments and processing instructions outside the root element, the XML
/// declaration and the document type declaration are dropped.
///
/// # Errors
///
/// Returns [`ParseError`] for unreadable sources, undecodable input and
/// malformed markup.
pub fn parse_document(
    source: Source,
    options: &ParseOptions,
    renderer: &Renderer,
) -> Result<Node, ParseError> {
    let text = load_text(source, options)?;
    let root = TreeBuilder::new(&text).build()?;
    root.set_renderer(Some(renderer.downgrade()));
    tracing::debug!(
        root = root.name().as_deref().unwrap_or_default(),
        "Parsed document"
    );
    Ok(root)
}

/// Parse a sequence of sibling nodes with optional text between them.
///
/// The input is wrapped in a container declaring the renderer's namespace
/// table, so its prefixes can be used without declarations. Each returned
/// node is bound to `renderer` and carries the container's declarations.
///
/// # Errors
///
/// See [`parse_document`].
pub fn parse_fragment(
    source: Source,
    options: &ParseOptions,
    renderer: &Renderer,
) -> Result<Vec<FragmentItem>, ParseError> {
    let text = load_text(source, options)?;

    let mut wrapped = format!("<{FRAGMENT_CONTAINER}");
    for (prefix, uri) in renderer.namespaces() {
        wrapped.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape_attribute(&uri)));
    }
    wrapped.push('>');
    wrapped.push_str(&text);
    wrapped.push_str(&format!("</{FRAGMENT_CONTAINER}>"));

    let container = TreeBuilder::new(&wrapped).build()?;
    let declarations = container.namespace_declarations();

    let mut items = Vec::new();
    if let Some(leading) = container.text().filter(|_| !options.no_leading_text) {
        items.push(FragmentItem::Text(leading));
    }
    for node in container.children() {
        node.detach();
        node.set_renderer(Some(renderer.downgrade()));
        if node.is_element() {
            for (prefix, uri) in &declarations {
                node.add_namespace_declaration(prefix.clone(), uri.clone());
            }
        }
        items.push(FragmentItem::Node(node));
    }
    tracing::debug!(items = items.len(), "Parsed fragment");
    Ok(items)
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

/// Decode a general entity or character reference.
fn decode_entity(entity: &str) -> Result<String, ParseError> {
    let text = match entity {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "apos" => "'".to_owned(),
        "quot" => "\"".to_owned(),
        s if s.starts_with('#') => {
            let code = match s.strip_prefix("#x").or_else(|| s.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => s[1..].parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .ok_or_else(|| ParseError::UndefinedEntity(entity.to_owned()))?
                .to_string()
        }
        _ => return Err(ParseError::UndefinedEntity(entity.to_owned())),
    };
    Ok(text)
}

struct Open {
    node: Node,
    ns_mark: usize,
}

struct TreeBuilder<'a> {
    reader: Reader<&'a [u8]>,
    /// In-scope namespace bindings, innermost last.
    bindings: NamespaceDecls,
    stack: Vec<Open>,
    root: Option<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str) -> Self {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            bindings: NamespaceDecls::new(),
            stack: Vec::new(),
            root: None,
        }
    }

    fn build(mut self) -> Result<Node, ParseError> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let ns_mark = self.bindings.len();
                    let node = self.element(&e)?;
                    self.attach(&node)?;
                    self.stack.push(Open { node, ns_mark });
                }
                Event::Empty(e) => {
                    let ns_mark = self.bindings.len();
                    let node = self.element(&e)?;
                    self.attach(&node)?;
                    self.bindings.truncate(ns_mark);
                }
                Event::End(_) => {
                    if let Some(open) = self.stack.pop() {
                        self.bindings.truncate(open.ns_mark);
                    }
                }
                Event::Text(e) => {
                    let text = self.reader.decoder().decode(&e)?.into_owned();
                    self.text(&text)?;
                }
                Event::GeneralRef(e) => {
                    let entity = self.reader.decoder().decode(&e)?.into_owned();
                    let text = decode_entity(&entity)?;
                    self.text(&text)?;
                }
                Event::CData(e) => {
                    let text = self.reader.decoder().decode(&e)?.into_owned();
                    self.text(&text)?;
                }
                Event::Comment(e) => {
                    let text = self.reader.decoder().decode(&e)?.into_owned();
                    let node =
                        Node::with_kind(NodeKind::Comment, Vec::new(), Attributes::new(), None);
                    node.set_text(Some(&text));
                    self.attach_misc(&node);
                }
                Event::PI(e) => {
                    let target = self.reader.decoder().decode(e.target())?.into_owned();
                    let content = self.reader.decoder().decode(e.content())?;
                    let content = content.trim_start();
                    let node = Node::with_kind(
                        NodeKind::ProcessingInstruction(target),
                        Vec::new(),
                        Attributes::new(),
                        None,
                    );
                    node.set_text((!content.is_empty()).then_some(content));
                    self.attach_misc(&node);
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
            buf.clear();
        }

        if let Some(open) = self.stack.last() {
            return Err(ParseError::UnclosedElement(
                open.node.name().unwrap_or_default(),
            ));
        }
        self.root.ok_or(ParseError::NoRootElement)
    }

    /// Attach an element to the open element, or make it the root.
    fn attach(&mut self, node: &Node) -> Result<(), ParseError> {
        match self.stack.last() {
            Some(open) => open.node.attach_at(usize::MAX, node),
            None if self.root.is_none() => self.root = Some(node.clone()),
            None => return Err(ParseError::TrailingContent),
        }
        Ok(())
    }

    /// Comments and PIs outside the root element are dropped.
    fn attach_misc(&self, node: &Node) {
        match self.stack.last() {
            Some(open) => open.node.attach_at(usize::MAX, node),
            None => tracing::trace!("Dropping node outside the root element"),
        }
    }

    fn text(&self, text: &str) -> Result<(), ParseError> {
        match self.stack.last() {
            Some(open) => open.node.append_text(text),
            None if text.trim().is_empty() => {}
            None => return Err(ParseError::TrailingContent),
        }
        Ok(())
    }

    fn element(&mut self, e: &BytesStart<'_>) -> Result<Node, ParseError> {
        let mut nsmap = NamespaceDecls::new();
        let mut raw = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = self.reader.decoder().decode(attr.key.as_ref())?.into_owned();
            let value = attr.unescape_value()?.into_owned();
            if key == "xmlns" {
                nsmap.push((None, value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                nsmap.push((Some(prefix.to_owned()), value));
            } else {
                raw.push((key, value));
            }
        }
        self.bindings.extend(nsmap.iter().cloned());

        let name = self.reader.decoder().decode(e.name().as_ref())?.into_owned();
        let name = self.resolve(&name, false)?;
        let mut attributes = Attributes::new();
        for (key, value) in raw {
            attributes.insert(self.resolve(&key, true)?, value);
        }
        Ok(Node::with_kind(
            NodeKind::Element(name),
            nsmap,
            attributes,
            None,
        ))
    }

    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Turn a prefixed name into Clark notation.
    fn resolve(&self, qname: &str, attribute: bool) -> Result<String, ParseError> {
        match split_qname(qname) {
            (Some("xml"), local) => Ok(clark(XML_NS, local)),
            (Some(prefix), local) => self
                .lookup(Some(prefix))
                .filter(|uri| !uri.is_empty())
                .map(|uri| clark(uri, local))
                .ok_or_else(|| ParseError::UnboundPrefix(prefix.to_owned())),
            (None, local) if attribute => Ok(local.to_owned()),
            (None, local) => Ok(match self.lookup(None) {
                Some(uri) if !uri.is_empty() => clark(uri, local),
                _ => local.to_owned(),
            }),
        }
    }
}

impl Renderer {
    /// Parse a document from `source`.
    ///
    /// # Errors
    ///
    /// See [`parse_document`].
    pub fn parse(&self, source: Source, options: &ParseOptions) -> Result<Node, ParseError> {
        parse_document(source, options, self)
    }

    /// Parse a document from a string.
    ///
    /// # Errors
    ///
    /// See [`parse_document`].
    pub fn parse_str(&self, text: &str) -> Result<Node, ParseError> {
        self.parse(Source::Text(text.to_owned()), &ParseOptions::default())
    }

    /// Parse a document from UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// See [`parse_document`].
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Node, ParseError> {
        self.parse(Source::Bytes(bytes.to_vec()), &ParseOptions::default())
    }

    /// Parse a document from a file.
    ///
    /// # Errors
    ///
    /// See [`parse_document`].
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Node, ParseError> {
        self.parse(Source::from(path.as_ref()), &ParseOptions::default())
    }

    /// Fetch and parse a document.
    ///
    /// # Errors
    ///
    /// See [`parse_document`].
    pub fn parse_url(&self, url: &str) -> Result<Node, ParseError> {
        self.parse(Source::Url(url.to_owned()), &ParseOptions::default())
    }

    /// Parse a fragment from `source`.
    ///
    /// # Errors
    ///
    /// See [`parse_fragment`].
    pub fn parse_fragment(
        &self,
        source: Source,
        options: &ParseOptions,
    ) -> Result<Vec<FragmentItem>, ParseError> {
        parse_fragment(source, options, self)
    }

    /// Parse a fragment from a string.
    ///
    /// # Errors
    ///
    /// See [`parse_fragment`].
    pub fn parse_fragment_str(&self, text: &str) -> Result<Vec<FragmentItem>, ParseError> {
        self.parse_fragment(Source::Text(text.to_owned()), &ParseOptions::default())
    }
}
