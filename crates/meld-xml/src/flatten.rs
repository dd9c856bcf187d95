//! Depth-first flattening of nested content.

use crate::content::{Atom, Content};
use crate::renderer::Renderer;

enum Frame {
    Seq(std::vec::IntoIter<Content>),
    Lazy(Box<dyn Iterator<Item = Content>>),
}

impl Frame {
    fn next(&mut self) -> Option<Content> {
        match self {
            Self::Seq(items) => items.next(),
            Self::Lazy(items) => items.next(),
        }
    }
}

/// Iterator returned by [`flatten()`].
///
/// Uses an explicit stack, so arbitrarily deep nesting does not grow the
/// call stack.
pub struct Flatten<'r> {
    renderer: Option<&'r Renderer>,
    stack: Vec<Frame>,
}

/// Flatten `items` into a stream of atoms.
///
/// Sequences and lazy iterators are expanded recursively in order.
/// Components are rendered with `renderer` and their output flattened in
/// turn. Nodes, values and attribute mappings are yielded as they are.
pub fn flatten(items: impl Into<Content>, renderer: Option<&Renderer>) -> Flatten<'_> {
    Flatten {
        renderer,
        stack: vec![Frame::Seq(vec![items.into()].into_iter())],
    }
}

impl Flatten<'_> {
    fn expand(&mut self, mut item: Content) -> Option<Atom> {
        loop {
            match item {
                Content::Component(component) => item = component.render(self.renderer),
                Content::Seq(items) => {
                    self.stack.push(Frame::Seq(items.into_iter()));
                    return None;
                }
                Content::Lazy(items) => {
                    self.stack.push(Frame::Lazy(items));
                    return None;
                }
                Content::Node(node) => return Some(Atom::Node(node)),
                Content::Value(value) => return Some(Atom::Value(value)),
                Content::Attrs(attributes) => return Some(Atom::Attrs(attributes)),
            }
        }
    }
}

impl Iterator for Flatten<'_> {
    type Item = Atom;

    fn next(&mut self) -> Option<Atom> {
        loop {
            let Some(item) = self.stack.last_mut()?.next() else {
                self.stack.pop();
                continue;
            };
            if let Some(atom) = self.expand(item) {
                return Some(atom);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::content::{Renderable, Value};
    use crate::{attrs, content};

    fn texts(items: impl Into<Content>) -> Vec<String> {
        flatten(items, None)
            .map(|atom| match atom {
                Atom::Value(value) => value.to_string(),
                Atom::Node(node) => format!("<{}>", node.name().unwrap_or_default()),
                Atom::Attrs(_) => "{attrs}".to_owned(),
            })
            .collect()
    }

    #[test]
    fn test_flatten_nested_sequences() {
        let items = content!["a", vec![content!["b", vec!["c"]], content![]], "d"];
        assert_eq!(texts(items), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_flatten_lazy_iterator() {
        let items = content!["start", Content::lazy((0..3).map(|i| i * 2)), "end"];
        assert_eq!(texts(items), vec!["start", "0", "2", "4", "end"]);
    }

    #[test]
    fn test_flatten_empty_items_contribute_nothing() {
        let mut drained = vec![1, 2].into_iter();
        drained.by_ref().for_each(drop);
        let items = content![
            42,
            Vec::<Content>::new(),
            content![],
            Content::lazy(std::iter::empty::<i32>()),
            Content::lazy(drained),
            10.0,
        ];
        assert_eq!(texts(items), vec!["42", "10.0"]);
    }

    #[test]
    fn test_flatten_lazy_inside_nested_sequences() {
        let items = content![42, content![1, content![3, Content::lazy(0..3), 4], 2], 10.0];
        assert_eq!(
            texts(items),
            vec!["42", "1", "3", "0", "1", "2", "4", "2", "10.0"]
        );
    }

    #[test]
    fn test_flatten_keeps_attributes_and_nodes() {
        let h = Renderer::new();
        let items = content![attrs! { "a" => 1 }, h.tag("b")];
        assert_eq!(texts(items), vec!["{attrs}", "<b>"]);
    }

    struct Greeting {
        calls: Rc<Cell<usize>>,
    }

    impl Renderable for Greeting {
        fn render(&self, renderer: Option<&Renderer>) -> Content {
            self.calls.set(self.calls.get() + 1);
            let renderer = renderer.expect("renderer passed through");
            content!["hi", renderer.tag("br")]
        }
    }

    #[test]
    fn test_flatten_renders_components() {
        let h = Renderer::new();
        let calls = Rc::new(Cell::new(0));
        let component = Content::component(Greeting {
            calls: Rc::clone(&calls),
        });
        let atoms: Vec<Atom> = flatten(content!["x", component], Some(&h)).collect();

        assert_eq!(calls.get(), 1);
        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms[1], Atom::Value(Value::from("hi")));
        assert_eq!(atoms[2].as_node().and_then(|n| n.name()).as_deref(), Some("br"));
    }

    #[test]
    fn test_flatten_deep_nesting() {
        let mut item = Content::from("leaf");
        for _ in 0..10_000 {
            item = Content::Seq(vec![item]);
        }
        assert_eq!(texts(item), vec!["leaf"]);
    }
}
