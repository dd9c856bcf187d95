//! XML tree construction and `meld:id` templating.
//!
//! This crate builds XML/XHTML trees either functionally, by calling nodes
//! with child content, or imperatively, through the scope stack of a
//! [`Renderer`]. Templates are parsed markup whose slots are marked with a
//! `meld:id` attribute; they are located with [`Node::find_meld`] and
//! filled with [`Node::fill`], [`Node::replace`] and [`Node::repeat`].
//!
//! # Architecture
//!
//! - [`Content`] / [`flatten()`]: heterogeneous child content and its
//!   normalization into a flat stream of [`Atom`]s
//! - [`Node`]: reference-counted element tree with text/tail storage
//! - [`Renderer`]: node factory, namespace table and scope stack
//! - [`SerializeOptions`]: serializer settings, including the pipeline flag
//!   that strips `meld:id` for final output
//! - [`parse_document`] / [`parse_fragment`]: markup loading from text,
//!   bytes, files and URLs
//!
//! # Example
//!
//! ```
//! use meld_xml::{Renderer, SerializeOptions, content, MELD_NS};
//!
//! let h = Renderer::new();
//! let page = h
//!     .parse_str(&format!(
//!         r#"<ul xmlns:meld="{MELD_NS}"><li meld:id="row">?</li></ul>"#
//!     ))
//!     .unwrap();
//!
//! for (li, name) in page.repeat(["alpha", "beta"], Some("row")).unwrap() {
//!     li.fill(content![name]).unwrap();
//! }
//!
//! let html = page
//!     .to_xml_string(&SerializeOptions::default().pipeline(false))
//!     .unwrap();
//! assert_eq!(
//!     html,
//!     format!(r#"<ul xmlns:meld="{MELD_NS}"><li>alpha</li><li>beta</li></ul>"#)
//! );
//! ```

mod attributes;
mod content;
mod error;
mod flatten;
mod meld;
mod node;
mod parser;
mod qname;
mod renderer;
mod serializer;
mod source;

pub use attributes::{Attributes, normalize_keyword};
pub use content::{Atom, Content, Renderable, Value};
pub use error::{MeldError, ParseError};
pub use flatten::{Flatten, flatten};
pub use meld::Repeat;
pub use node::{Descendants, NamespaceDecls, Node, NodeKind};
pub use parser::{FragmentItem, ParseOptions, parse_document, parse_fragment};
pub use qname::{XML_NS, clark, split_clark};
pub use renderer::{Renderer, RendererOptions, RootContent, Scope};
pub use serializer::{Method, SerializeOptions};
pub use source::{DEFAULT_FETCH_TIMEOUT, Source};

/// Namespace URI of the templating marker attribute.
pub const MELD_NS: &str = "http://www.plope.com/software/meld3";

/// Clark name of the `meld:id` marker attribute.
pub const MELD_ID: &str = "{http://www.plope.com/software/meld3}id";
