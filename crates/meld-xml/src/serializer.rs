//! Tree to text conversion.
//!
//! Namespace declarations are written where they are first needed. Prefixes
//! declared on the element (or on its ancestors, when a detached subtree is
//! serialized) are preferred; otherwise `ns0`, `ns1`, ... are generated.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::MeldError;
use crate::node::{NamespaceDecls, Node, NodeKind};
use crate::qname::{XML_NS, local_name, split_clark};
use crate::MELD_ID;

/// Output flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    /// XML markup.
    #[default]
    Xml,
    /// HTML markup: no self-closing tags, void elements have no end tag.
    Html,
    /// Character data only.
    Text,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "html" => Ok(Self::Html),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown output method: {other}")),
        }
    }
}

/// Serialization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Output flavour.
    pub method: Method,
    /// Output encoding label: `utf-8` or `us-ascii`.
    pub encoding: String,
    /// Emit `<?xml version='1.0' encoding='...'?>` first (XML method only).
    pub xml_declaration: bool,
    /// Indent element-only content.
    pub pretty_print: bool,
    /// Keep `meld:id` attributes. When false they are removed from the
    /// subtree, permanently, before writing.
    pub pipeline: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            method: Method::Xml,
            encoding: "utf-8".to_owned(),
            xml_declaration: false,
            pretty_print: false,
            pipeline: true,
        }
    }
}

impl SerializeOptions {
    /// Set the output method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the output encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Toggle the XML declaration.
    #[must_use]
    pub fn xml_declaration(mut self, enabled: bool) -> Self {
        self.xml_declaration = enabled;
        self
    }

    /// Toggle indentation.
    #[must_use]
    pub fn pretty_print(mut self, enabled: bool) -> Self {
        self.pretty_print = enabled;
        self
    }

    /// Toggle pipeline mode.
    #[must_use]
    pub fn pipeline(mut self, enabled: bool) -> Self {
        self.pipeline = enabled;
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Charset {
    Utf8,
    Ascii,
}

fn charset(label: &str) -> Result<Charset, MeldError> {
    match label.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(Charset::Utf8),
        "us-ascii" | "ascii" => Ok(Charset::Ascii),
        _ => Err(MeldError::UnsupportedEncoding(label.to_owned())),
    }
}

/// HTML elements written without an end tag.
fn is_void_element(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "area"
            | "base"
            | "basefont"
            | "br"
            | "col"
            | "embed"
            | "frame"
            | "hr"
            | "img"
            | "input"
            | "isindex"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

impl Node {
    /// Serialize with default options: XML, UTF-8, `meld:id` kept.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut writer = Writer::new(self, Method::Xml, Charset::Utf8, false);
        writer.node(self, 0);
        writer.out
    }

    /// [`Node::to_xml`] as bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }

    /// Serialize to a string.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::UnsupportedEncoding`] for an encoding other than
    /// UTF-8 or US-ASCII.
    pub fn to_xml_string(&self, options: &SerializeOptions) -> Result<String, MeldError> {
        let charset = charset(&options.encoding)?;
        if !options.pipeline {
            let removed = self.strip_meld_ids();
            tracing::debug!(removed, "Stripped meld:id attributes");
        }

        if options.method == Method::Text {
            let mut out = String::new();
            collect_text(self, &mut out);
            if let Some(tail) = self.tail() {
                out.push_str(&tail);
            }
            return Ok(match charset {
                Charset::Utf8 => out,
                Charset::Ascii => out.chars().map(|c| escape_char(c, true)).collect(),
            });
        }

        let mut writer = Writer::new(self, options.method, charset, options.pretty_print);
        if options.xml_declaration && options.method == Method::Xml {
            let _ = writeln!(
                writer.out,
                "<?xml version='1.0' encoding='{}'?>",
                options.encoding
            );
        }
        writer.node(self, 0);
        if options.pretty_print {
            writer.out.push('\n');
        }
        Ok(writer.out)
    }

    /// Serialize to bytes in the requested encoding.
    ///
    /// # Errors
    ///
    /// See [`Node::to_xml_string`].
    pub fn serialize(&self, options: &SerializeOptions) -> Result<Vec<u8>, MeldError> {
        self.to_xml_string(options).map(String::into_bytes)
    }

    /// Remove `meld:id` from this node and its descendants; returns the
    /// number of attributes removed.
    pub fn strip_meld_ids(&self) -> usize {
        std::iter::once(self.clone())
            .chain(self.descendants())
            .filter(|node| node.remove_attribute(MELD_ID).is_some())
            .count()
    }
}

fn collect_text(node: &Node, out: &mut String) {
    let data = node.0.data.borrow();
    if !matches!(data.kind, NodeKind::Element(_)) {
        return;
    }
    if let Some(text) = &data.text {
        out.push_str(text);
    }
    for child in &data.children {
        collect_text(child, out);
        if let Some(tail) = child.0.data.borrow().tail.as_deref() {
            out.push_str(tail);
        }
    }
}

fn escape_char(c: char, ascii: bool) -> String {
    if ascii && !c.is_ascii() {
        format!("&#{};", u32::from(c))
    } else {
        c.to_string()
    }
}

struct Writer {
    out: String,
    method: Method,
    ascii: bool,
    pretty: bool,
    /// In-scope bindings, innermost last.
    scope: NamespaceDecls,
    /// Declarations of the serialized node's ancestors, nearest first.
    hints: NamespaceDecls,
}

impl Writer {
    fn new(root: &Node, method: Method, charset: Charset, pretty: bool) -> Self {
        let mut hints = NamespaceDecls::new();
        let mut current = root.parent();
        while let Some(node) = current {
            hints.extend(node.namespace_declarations());
            current = node.parent();
        }
        Self {
            out: String::new(),
            method,
            ascii: charset == Charset::Ascii,
            pretty,
            scope: NamespaceDecls::new(),
            hints,
        }
    }

    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn bind(&mut self, prefix: Option<String>, uri: &str, decls: &mut NamespaceDecls) {
        self.scope.push((prefix.clone(), uri.to_owned()));
        decls.push((prefix, uri.to_owned()));
    }

    /// Prefix currently bound to `uri` and not shadowed.
    fn bound_prefix(&self, uri: &str, attribute: bool) -> Option<Option<String>> {
        self.scope
            .iter()
            .rev()
            .filter(|(p, u)| u == uri && !(attribute && p.is_none()))
            .find(|(p, _)| self.lookup(p.as_deref()) == Some(uri))
            .map(|(p, _)| p.clone())
    }

    fn hinted_prefix(&self, uri: &str, attribute: bool) -> Option<Option<String>> {
        self.hints
            .iter()
            .filter(|(p, u)| u == uri && !(attribute && p.is_none()))
            .find(|(p, _)| self.lookup(p.as_deref()).is_none())
            .map(|(p, _)| p.clone())
    }

    fn fresh_prefix(&self) -> String {
        (0..)
            .map(|n| format!("ns{n}"))
            .find(|p| self.lookup(Some(p)).is_none())
            .unwrap_or_default()
    }

    /// Qualified name for a Clark name, declaring a prefix when needed.
    fn qualify(&mut self, name: &str, attribute: bool, decls: &mut NamespaceDecls) -> String {
        let Some((uri, local)) = split_clark(name) else {
            if !attribute && self.lookup(None).is_some_and(|uri| !uri.is_empty()) {
                self.bind(None, "", decls);
            }
            return name.to_owned();
        };
        if uri == XML_NS {
            return format!("xml:{local}");
        }
        let prefix = match self.bound_prefix(uri, attribute) {
            Some(prefix) => prefix,
            None => {
                let prefix = self
                    .hinted_prefix(uri, attribute)
                    .unwrap_or_else(|| Some(self.fresh_prefix()));
                self.bind(prefix.clone(), uri, decls);
                prefix
            }
        };
        match prefix {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_owned(),
        }
    }

    fn indent(&mut self, depth: usize) {
        self.out.push('\n');
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn text(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                c if self.ascii && !c.is_ascii() => {
                    let _ = write!(self.out, "&#{};", u32::from(c));
                }
                c => self.out.push(c),
            }
        }
    }

    fn attribute_value(&mut self, value: &str) {
        for c in value.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                '"' => self.out.push_str("&quot;"),
                '\n' => self.out.push_str("&#10;"),
                '\r' => self.out.push_str("&#13;"),
                '\t' => self.out.push_str("&#9;"),
                c if self.ascii && !c.is_ascii() => {
                    let _ = write!(self.out, "&#{};", u32::from(c));
                }
                c => self.out.push(c),
            }
        }
    }

    /// Write `node` followed by its tail.
    fn node(&mut self, node: &Node, depth: usize) {
        let data = node.0.data.borrow();
        match &data.kind {
            NodeKind::Comment => {
                self.out.push_str("<!--");
                self.out.push_str(data.text.as_deref().unwrap_or_default());
                self.out.push_str("-->");
            }
            NodeKind::ProcessingInstruction(target) => {
                self.out.push_str("<?");
                self.out.push_str(target);
                if let Some(text) = data.text.as_deref().filter(|t| !t.is_empty()) {
                    self.out.push(' ');
                    self.out.push_str(text);
                }
                self.out
                    .push_str(if self.method == Method::Html { ">" } else { "?>" });
            }
            NodeKind::Element(name) => {
                let mark = self.scope.len();
                let mut decls = NamespaceDecls::new();
                for (prefix, uri) in &data.nsmap {
                    if self.lookup(prefix.as_deref()) != Some(uri.as_str()) {
                        self.bind(prefix.clone(), uri, &mut decls);
                    }
                }
                let qname = self.qualify(name, false, &mut decls);
                let attributes: Vec<(String, &str)> = data
                    .attributes
                    .iter()
                    .map(|(key, value)| (self.qualify(key, true, &mut decls), value))
                    .collect();

                self.out.push('<');
                self.out.push_str(&qname);
                for (prefix, uri) in &decls {
                    match prefix {
                        Some(prefix) => {
                            let _ = write!(self.out, " xmlns:{prefix}=\"");
                        }
                        None => self.out.push_str(" xmlns=\""),
                    }
                    self.attribute_value(uri);
                    self.out.push('"');
                }
                for (key, value) in &attributes {
                    let _ = write!(self.out, " {key}=\"");
                    self.attribute_value(value);
                    self.out.push('"');
                }

                let text = data.text.as_deref().filter(|t| !t.is_empty());
                if text.is_none() && data.children.is_empty() {
                    match self.method {
                        Method::Html if is_void_element(local_name(name)) => self.out.push('>'),
                        Method::Html => {
                            let _ = write!(self.out, "></{qname}>");
                        }
                        _ => self.out.push_str("/>"),
                    }
                } else {
                    self.out.push('>');
                    if let Some(text) = text {
                        self.text(text);
                    }
                    let indent = self.pretty && text.is_none() && is_element_only(&data.children);
                    for child in &data.children {
                        if indent {
                            self.indent(depth + 1);
                        }
                        self.node(child, depth + 1);
                    }
                    if indent {
                        self.indent(depth);
                    }
                    let _ = write!(self.out, "</{qname}>");
                }
                self.scope.truncate(mark);
            }
        }
        if let Some(tail) = data.tail.as_deref() {
            self.text(tail);
        }
    }
}

/// Children carry no tail text, so whitespace can be added between them.
fn is_element_only(children: &[Node]) -> bool {
    !children.is_empty()
        && children
            .iter()
            .all(|child| child.0.data.borrow().tail.as_deref().is_none_or(str::is_empty))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Renderer, content, MELD_NS};

    #[test]
    fn test_simple_element() {
        let h = Renderer::new();
        let node = h
            .tag("foo")
            .call(content!["hello", h.tag("bar").attr("a", 10).unwrap(), "world"])
            .unwrap();
        assert_eq!(node.to_xml(), r#"<foo>hello<bar a="10"/>world</foo>"#);
    }

    #[test]
    fn test_escaping() {
        let h = Renderer::new();
        let node = h
            .tag("a")
            .call_with("x < y & \"z\"", [("title", "a\"b<c>&\n")])
            .unwrap();
        assert_eq!(
            node.to_xml(),
            r#"<a title="a&quot;b&lt;c&gt;&amp;&#10;">x &lt; y &amp; "z"</a>"#
        );
    }

    #[test]
    fn test_ascii_encoding() {
        let h = Renderer::new();
        let node = h.tag("p").call_with("café", [("title", "é")]).unwrap();
        let options = SerializeOptions::default().encoding("us-ascii");
        assert_eq!(
            node.to_xml_string(&options).unwrap(),
            r#"<p title="&#233;">caf&#233;</p>"#
        );
    }

    #[test]
    fn test_unsupported_encoding() {
        let node = Node::element("a");
        let options = SerializeOptions::default().encoding("latin-1");
        assert!(matches!(
            node.serialize(&options),
            Err(MeldError::UnsupportedEncoding(label)) if label == "latin-1"
        ));
    }

    #[test]
    fn test_xml_declaration() {
        let node = Node::element("a");
        let options = SerializeOptions::default().xml_declaration(true);
        assert_eq!(
            node.to_xml_string(&options).unwrap(),
            "<?xml version='1.0' encoding='utf-8'?>\n<a/>"
        );
    }

    #[test]
    fn test_pretty_print() {
        let h = Renderer::new();
        let node = h
            .tag("a")
            .call(content![h.tag("b").call("x").unwrap(), h.tag("c")])
            .unwrap();
        let options = SerializeOptions::default().pretty_print(true);
        assert_eq!(
            node.to_xml_string(&options).unwrap(),
            "<a>\n  <b>x</b>\n  <c/>\n</a>\n"
        );
    }

    #[test]
    fn test_pretty_print_leaves_mixed_content() {
        let h = Renderer::new();
        let node = h.tag("p").call(content!["a", h.tag("b"), "c"]).unwrap();
        let options = SerializeOptions::default().pretty_print(true);
        assert_eq!(node.to_xml_string(&options).unwrap(), "<p>a<b/>c</p>\n");
    }

    #[test]
    fn test_html_method() {
        let h = Renderer::new();
        let node = h
            .tag("div")
            .call(content![h.tag("br"), h.tag("span"), h.tag("img").attr("src", "x").unwrap()])
            .unwrap();
        let options = SerializeOptions::default().method(Method::Html);
        assert_eq!(
            node.to_xml_string(&options).unwrap(),
            r#"<div><br><span></span><img src="x"></div>"#
        );
    }

    #[test]
    fn test_text_method() {
        let h = Renderer::new();
        let node = h
            .tag("p")
            .call(content!["a", h.tag("b").call("b").unwrap(), "c", h.comment("no")])
            .unwrap();
        let options = SerializeOptions::default().method(Method::Text);
        assert_eq!(node.to_xml_string(&options).unwrap(), "abc");
    }

    #[test]
    fn test_generated_prefixes() {
        let node = Node::element("{urn:a}root");
        node.set("{urn:b}attr", "1");
        node.append(&Node::element("{urn:a}child")).unwrap();
        assert_eq!(
            node.to_xml(),
            r#"<ns0:root xmlns:ns0="urn:a" xmlns:ns1="urn:b" ns1:attr="1"><ns0:child/></ns0:root>"#
        );
    }

    #[test]
    fn test_default_namespace_declaration() {
        let h = Renderer::new();
        let root = h
            .parse_str(r#"<html xmlns="http://www.w3.org/1999/xhtml"><body/></html>"#)
            .unwrap();
        assert_eq!(
            root.to_xml(),
            r#"<html xmlns="http://www.w3.org/1999/xhtml"><body/></html>"#
        );

        let body = root.child(0).unwrap();
        assert_eq!(body.to_xml(), r#"<body xmlns="http://www.w3.org/1999/xhtml"/>"#);
    }

    #[test]
    fn test_unqualified_child_undeclares_default() {
        let root = Node::with_kind(
            NodeKind::Element("{urn:x}a".to_owned()),
            vec![(None, "urn:x".to_owned())],
            crate::Attributes::new(),
            None,
        );
        root.append(&Node::element("b")).unwrap();
        assert_eq!(root.to_xml(), r#"<a xmlns="urn:x"><b xmlns=""/></a>"#);
    }

    #[test]
    fn test_subtree_uses_ancestor_prefix() {
        let h = Renderer::new();
        h.set_namespaces(BTreeMap::from([("meld".to_owned(), MELD_NS.to_owned())]));
        let root = h
            .parse_str(&format!(
                r#"<div xmlns:meld="{MELD_NS}"><span meld:id="x">y</span></div>"#
            ))
            .unwrap();
        let span = root.child(0).unwrap();
        assert_eq!(
            span.to_xml(),
            format!(r#"<span xmlns:meld="{MELD_NS}" meld:id="x">y</span>"#)
        );
    }

    #[test]
    fn test_strip_meld_ids_counts_self() {
        let h = Renderer::new();
        let node = h.tag("a").meld_id("a");
        node.append(&h.tag("b").meld_id("b")).unwrap();
        node.append(&h.tag("c")).unwrap();
        assert_eq!(node.strip_meld_ids(), 2);
        assert_eq!(node.to_xml(), "<a><b/><c/></a>");
    }

    #[test]
    fn test_comment_and_pi() {
        let h = Renderer::new();
        let node = h
            .tag("a")
            .call(content![
                h.comment(" note "),
                h.processing_instruction("php", Some("echo 1;")),
                h.processing_instruction("x", None),
            ])
            .unwrap();
        assert_eq!(node.to_xml(), "<a><!-- note --><?php echo 1;?><?x?></a>");
        assert_eq!(node.to_bytes(), node.to_xml().into_bytes());
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("HTML".parse::<Method>(), Ok(Method::Html));
        assert!("pdf".parse::<Method>().is_err());
    }
}
