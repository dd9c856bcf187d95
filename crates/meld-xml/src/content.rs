//! Child content accepted by tree-building operations.
//!
//! Everything that can be placed inside an element is expressed as
//! [`Content`]: scalar values, nodes, attribute mappings, nested sequences,
//! lazy iterators and renderable components. [`crate::flatten()`] reduces a
//! `Content` to a flat stream of [`Atom`]s.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::attributes::Attributes;
use crate::node::Node;
use crate::renderer::Renderer;

/// Scalar value rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Literal text.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer too large for `Int`.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Absent value, rendered as `None`.
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(v) => fmt_float(*v, f),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("None"),
        }
    }
}

/// Integral floats keep one decimal (`10.0`) below the exponent threshold.
fn fmt_float(value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        write!(f, "{value:.1}")
    } else {
        write!(f, "{value}")
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<Cow<'_, str>> for Value {
    fn from(value: Cow<'_, str>) -> Self {
        Self::Str(value.into_owned())
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

macro_rules! value_from_signed {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::Int(i64::from(value))
            }
        }
    )*};
}

macro_rules! value_from_unsigned {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::UInt(u64::from(value))
            }
        }
    )*};
}

value_from_signed!(i8, i16, i32, i64);
value_from_unsigned!(u8, u16, u32, u64);

impl From<isize> for Value {
    fn from(value: isize) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Str(value.to_string()), Self::Int)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        u64::try_from(value).map_or_else(|_| Self::Str(value.to_string()), Self::UInt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Object that renders itself into content on demand.
///
/// Components are expanded during flattening, receiving the renderer that
/// is building the tree (if any).
pub trait Renderable {
    /// Produce the content this component stands for.
    fn render(&self, renderer: Option<&Renderer>) -> Content;
}

/// Anything that may appear as child content.
pub enum Content {
    /// Scalar rendered as text.
    Value(Value),
    /// Element, comment or processing instruction.
    Node(Node),
    /// Attributes merged into the receiving element.
    Attrs(Attributes),
    /// Ordered sequence, flattened depth-first.
    Seq(Vec<Content>),
    /// Lazily produced sequence, consumed once.
    Lazy(Box<dyn Iterator<Item = Content>>),
    /// Component expanded through [`Renderable::render`].
    Component(Rc<dyn Renderable>),
}

impl Content {
    /// Empty sequence.
    #[must_use]
    pub fn empty() -> Self {
        Self::Seq(Vec::new())
    }

    /// Wrap an iterator so it is consumed only when flattened.
    pub fn lazy<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Into<Content> + 'static,
    {
        Self::Lazy(Box::new(items.into_iter().map(Into::into)))
    }

    /// Text content from anything displayable.
    pub fn display(value: impl fmt::Display) -> Self {
        Self::Value(Value::Str(value.to_string()))
    }

    /// Wrap a renderable component.
    pub fn component(component: impl Renderable + 'static) -> Self {
        Self::Component(Rc::new(component))
    }

    /// True for an empty sequence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Seq(items) if items.is_empty())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Node(n) => f.debug_tuple("Node").field(n).finish(),
            Self::Attrs(a) => f.debug_tuple("Attrs").field(a).finish(),
            Self::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
            Self::Component(_) => f.write_str("Component(..)"),
        }
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Node> for Content {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<&Node> for Content {
    fn from(node: &Node) -> Self {
        Self::Node(node.clone())
    }
}

impl From<Attributes> for Content {
    fn from(attributes: Attributes) -> Self {
        Self::Attrs(attributes)
    }
}

impl From<Rc<dyn Renderable>> for Content {
    fn from(component: Rc<dyn Renderable>) -> Self {
        Self::Component(component)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(items: Vec<T>) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Content>, const N: usize> From<[T; N]> for Content {
    fn from(items: [T; N]) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(item: Option<T>) -> Self {
        item.map_or(Self::Value(Value::Null), Into::into)
    }
}

macro_rules! content_from_value {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Content {
            fn from(value: $ty) -> Self {
                Self::Value(Value::from(value))
            }
        }
    )*};
}

content_from_value!(
    &str, String, &String, Cow<'_, str>, char, bool, f32, f64, i8, i16, i32, i64, isize, u8,
    u16, u32, u64, usize
);

/// Flattened unit of content.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// Node child.
    Node(Node),
    /// Text value.
    Value(Value),
    /// Attributes to merge.
    Attrs(Attributes),
}

impl Atom {
    /// The node, if this atom is one.
    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl From<Atom> for Content {
    fn from(atom: Atom) -> Self {
        match atom {
            Atom::Node(node) => Self::Node(node),
            Atom::Value(value) => Self::Value(value),
            Atom::Attrs(attributes) => Self::Attrs(attributes),
        }
    }
}

/// Build a [`Content::Seq`] from heterogeneous items.
///
/// ```
/// use meld_xml::{content, Renderer};
///
/// let h = Renderer::new();
/// let items = content!["hello", h.tag("br"), 42];
/// assert!(!items.is_empty());
/// ```
#[macro_export]
macro_rules! content {
    () => {
        $crate::Content::Seq(::std::vec::Vec::new())
    };
    ($($item:expr),+ $(,)?) => {
        $crate::Content::Seq(::std::vec![$($crate::Content::from($item)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_display() {
        assert_eq!(Value::from(10.0).to_string(), "10.0");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-3.0_f32).to_string(), "-3.0");
    }

    #[test]
    fn test_integer_display() {
        assert_eq!(Value::from((1_i64 << 40) - 1).to_string(), "1099511627775");
        assert_eq!(Value::from(u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(Value::from(-7_i8).to_string(), "-7");
    }

    #[test]
    fn test_null_and_bool_display() {
        assert_eq!(Value::from(None::<&str>).to_string(), "None");
        assert_eq!(Value::Null.to_string(), "None");
        assert_eq!(Value::from(true).to_string(), "true");
    }

    #[test]
    fn test_option_content() {
        assert!(matches!(Content::from(None::<&str>), Content::Value(Value::Null)));
        assert!(matches!(
            Content::from(Some("x")),
            Content::Value(Value::Str(s)) if s == "x"
        ));
    }

    #[test]
    fn test_content_macro_builds_sequence() {
        let items = content!["a", 1, vec!["b", "c"]];
        let Content::Seq(items) = items else {
            panic!("expected a sequence");
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[2], Content::Seq(inner) if inner.len() == 2));
        assert!(content![].is_empty());
    }
}
