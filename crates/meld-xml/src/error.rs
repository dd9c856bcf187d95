//! Error types for tree construction, templating and parsing.

use std::str::Utf8Error;

/// Error while turning XML text into a node tree.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Syntax error reported by the XML reader.
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed attribute in a start tag.
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// Event payload could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    /// Input bytes are not valid in the requested encoding.
    #[error("input is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),

    /// Input bytes contain a non-ASCII byte while ASCII was requested.
    #[error("input is not valid {encoding}: non-ASCII byte at offset {offset}")]
    NotAscii {
        /// Requested encoding label.
        encoding: String,
        /// Offset of the first offending byte.
        offset: usize,
    },

    /// The requested encoding is not supported.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Reference to an entity that XML does not predefine.
    #[error("undefined entity: &{0};")]
    UndefinedEntity(String),

    /// Namespace prefix used without a declaration in scope.
    #[error("namespace prefix {0:?} is not bound")]
    UnboundPrefix(String),

    /// Input ended while an element was still open.
    #[error("element <{0}> is not closed")]
    UnclosedElement(String),

    /// Document without a root element.
    #[error("document has no root element")]
    NoRootElement,

    /// Element or text found after the root element.
    #[error("content found after the root element")]
    TrailingContent,

    /// Failed to read a local source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote source answered with an error status.
    #[error("HTTP error fetching {url}: status {status}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Remote source could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(#[from] ureq::Error),

    /// URL scheme the fetcher cannot dereference.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Error raised by tree construction and meld operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MeldError {
    /// Parsing a source failed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Attribute outside the authorized set of a declared tag.
    #[error("bad attributes for element <{tag}>: {}", attributes.join(", "))]
    AttributeValidation {
        /// Element name.
        tag: String,
        /// Offending attribute keys, sorted.
        attributes: Vec<String>,
    },

    /// `enter`/`exit` pairing was broken.
    #[error("scope imbalance: {0}")]
    ScopeImbalance(&'static str),

    /// Operation needs a tree shape the node does not have.
    #[error("tree state error: {0}")]
    TreeState(String),

    /// No descendant carries the requested `meld:id`.
    #[error("no element with meld:id {0:?}")]
    MeldNotFound(String),

    /// Default namespace set to a prefix missing from the namespace table.
    #[error("unknown namespace prefix: {0}")]
    UnknownNamespace(String),

    /// Output encoding the serializer cannot produce.
    #[error("unsupported output encoding: {0}")]
    UnsupportedEncoding(String),
}
