//! `meld:id` templating: locate marked elements, repeat, replace and fill.

use crate::attributes::Attributes;
use crate::content::{Atom, Content, Value};
use crate::error::MeldError;
use crate::flatten::flatten;
use crate::node::Node;
use crate::renderer::WeakRenderer;
use crate::MELD_ID;

impl Node {
    /// Value of the `meld:id` attribute.
    #[must_use]
    pub fn meld_id_value(&self) -> Option<String> {
        self.get(MELD_ID)
    }

    /// Set the `meld:id` attribute and return the node.
    pub fn meld_id(&self, id: impl Into<Value>) -> Node {
        self.set(MELD_ID, id);
        self.clone()
    }

    /// First descendant, in document order, whose `meld:id` equals `id`.
    ///
    /// The node itself is not considered.
    #[must_use]
    pub fn find_meld(&self, id: &str) -> Option<Node> {
        self.descendants()
            .find(|node| node.get(MELD_ID).as_deref() == Some(id))
    }

    /// Repeat a template element once per item.
    ///
    /// The template is this node, or the descendant whose `meld:id` is
    /// `child_meld`. It is detached immediately; each iteration inserts a
    /// deep copy (tail included) at the template's former position, after
    /// the copies already produced, and yields it with its item.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::MeldNotFound`] if `child_meld` matches nothing,
    /// and [`MeldError::TreeState`] if the template has no parent.
    pub fn repeat<I>(&self, items: I, child_meld: Option<&str>) -> Result<Repeat<I::IntoIter>, MeldError>
    where
        I: IntoIterator,
    {
        let template = match child_meld {
            Some(id) => self
                .find_meld(id)
                .ok_or_else(|| MeldError::MeldNotFound(id.to_owned()))?,
            None => self.clone(),
        };
        let parent = template
            .parent()
            .ok_or_else(|| MeldError::TreeState("repeated element has no parent".to_owned()))?;
        let position = parent.index_of(&template).unwrap_or_default();
        let renderer = template.renderer_ref();
        template.detach();
        tracing::trace!(
            meld_id = ?template.meld_id_value(),
            position,
            "Repeating template"
        );
        Ok(Repeat {
            template,
            parent,
            position,
            renderer,
            items: items.into_iter(),
        })
    }

    /// Replace this node in its parent with `children`.
    ///
    /// The parent's content is rebuilt as: its text, the preceding siblings,
    /// the replacement, this node's tail, the following siblings. Siblings
    /// reused in the replacement move with their tails; nodes taken from
    /// elsewhere arrive without theirs. Attribute mappings in `children` are
    /// merged into the parent. Returns the detached node; a node without a
    /// parent is left alone.
    ///
    /// Nothing is modified when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`MeldError::TreeState`] when a replacement node is the
    /// parent or one of its ancestors, and [`MeldError::AttributeValidation`]
    /// when merged attributes are rejected.
    pub fn replace(&self, children: impl Into<Content>) -> Result<Node, MeldError> {
        let Some(parent) = self.parent() else {
            return Ok(self.clone());
        };
        let renderer = self.renderer();

        let mut attributes = Attributes::new();
        let mut items: Vec<Atom> = Vec::new();
        for atom in flatten(children, renderer.as_ref()) {
            match atom {
                Atom::Attrs(attrs) => attributes.extend(attrs),
                Atom::Node(node) if node.contains(&parent) => {
                    return Err(MeldError::TreeState(
                        "cannot replace a node with an ancestor of its parent".to_owned(),
                    ));
                }
                atom => items.push(atom),
            }
        }
        let mut merged = parent.attributes();
        merged.extend(attributes.clone());
        parent.check_attribute_set(&merged)?;

        let is_replacement = |sibling: &Node| {
            items
                .iter()
                .any(|atom| atom.as_node().is_some_and(|node| node == sibling))
        };
        let text = parent.text();
        let tail = self.tail();
        let siblings = parent.children();
        let index = parent.index_of(self).unwrap_or_default();
        let before: Vec<Node> = siblings[..index]
            .iter()
            .filter(|sibling| !is_replacement(sibling))
            .cloned()
            .collect();
        let after: Vec<Node> = siblings[index + 1..]
            .iter()
            .filter(|sibling| !is_replacement(sibling))
            .cloned()
            .collect();
        for atom in &items {
            if let Some(node) = atom.as_node()
                && (node == self || node.parent().as_ref() != Some(&parent))
            {
                node.clear_tail();
            }
        }

        parent.clear();

        let mut stream: Vec<Content> = Vec::with_capacity(siblings.len() + items.len() + 2);
        stream.extend(text.map(Content::from));
        stream.extend(before.into_iter().map(Content::from));
        stream.extend(items.into_iter().map(Content::from));
        stream.extend(tail.map(Content::from));
        stream.extend(after.into_iter().map(Content::from));
        parent.add_children(stream, Some(attributes))?;

        tracing::trace!(index, "Replaced node");
        Ok(self.clone())
    }

    /// Remove all children and text, then add `children`.
    ///
    /// # Errors
    ///
    /// See [`Node::add_children`].
    pub fn fill(&self, children: impl Into<Content>) -> Result<Node, MeldError> {
        self.clear();
        self.call(children)
    }

    /// Like [`Node::fill`] with keyword-style attributes.
    ///
    /// # Errors
    ///
    /// See [`Node::add_children`].
    pub fn fill_with<I, K, V>(&self, children: impl Into<Content>, attributes: I) -> Result<Node, MeldError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.clear();
        self.call_with(children, attributes)
    }
}

/// Iterator returned by [`Node::repeat`].
///
/// Each step inserts a fresh copy of the template into the tree and yields
/// it with the matching item.
pub struct Repeat<I> {
    template: Node,
    parent: Node,
    position: usize,
    renderer: Option<WeakRenderer>,
    items: I,
}

impl<I> Repeat<I> {
    /// The detached template.
    #[must_use]
    pub fn template(&self) -> &Node {
        &self.template
    }
}

impl<I: Iterator> Iterator for Repeat<I> {
    type Item = (Node, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        let copy = self.template.deep_clone();
        copy.set_renderer(self.renderer.clone());
        self.position = self.position.min(self.parent.len());
        self.parent.attach_at(self.position, &copy);
        self.position += 1;
        Some((copy, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{attrs, content, Renderer, SerializeOptions, MELD_NS};

    fn meld_renderer() -> Renderer {
        let h = Renderer::new();
        h.set_namespaces(BTreeMap::from([("meld".to_owned(), MELD_NS.to_owned())]));
        h
    }

    fn parse(h: &Renderer, text: &str) -> Node {
        h.parse_str(text).unwrap()
    }

    fn stripped(node: &Node) -> String {
        node.to_xml_string(&SerializeOptions::default().pipeline(false))
            .unwrap()
    }

    #[test]
    fn test_find_meld() {
        let h = Renderer::new();
        let root = parse(
            &h,
            &format!(
                r#"<r xmlns:meld="{MELD_NS}" meld:id="r"><a meld:id="x"/><b><c meld:id="x"/></b></r>"#
            ),
        );

        assert_eq!(root.find_meld("x").and_then(|n| n.name()).as_deref(), Some("a"));
        assert_eq!(root.find_meld("r"), None);
        assert_eq!(root.find_meld("missing"), None);
        assert_eq!(root.meld_id_value().as_deref(), Some("r"));
    }

    #[test]
    fn test_meld_id_setter() {
        let h = Renderer::new();
        let node = h.tag("li").meld_id("item");
        assert_eq!(node.get(MELD_ID).as_deref(), Some("item"));
    }

    #[test]
    fn test_repeat_child_meld() {
        let h = Renderer::new();
        let node = parse(
            &h,
            &format!("<node xmlns:meld=\"{MELD_NS}\">\n  <child meld:id=\"child\"/>\n</node>"),
        );
        for (child, text) in node.repeat(["test1", "test2"], Some("child")).unwrap() {
            child.fill(text).unwrap();
        }

        let texts: Vec<_> = node.children().iter().map(Node::text).collect();
        assert_eq!(texts, vec![Some("test1".to_owned()), Some("test2".to_owned())]);
        assert_eq!(node.child(0).unwrap().tail().as_deref(), Some("\n"));
    }

    #[test]
    fn test_repeat_self() {
        let h = Renderer::new();
        let ul = h.tag("ul");
        let li = h.tag("li").meld_id("item");
        ul.call(li.clone()).unwrap();

        for (copy, i) in li.repeat(0..3, None).unwrap() {
            copy.fill(i).unwrap();
        }
        assert_eq!(stripped(&ul), "<ul><li>0</li><li>1</li><li>2</li></ul>");
        assert_eq!(li.parent(), None);
    }

    #[test]
    fn test_repeat_keeps_position() {
        let h = Renderer::new();
        let root = parse(&h, &format!(
            r#"<t xmlns:meld="{MELD_NS}"><head/><row meld:id="row"/><foot/></t>"#
        ));
        for (row, i) in root.repeat([1, 2], Some("row")).unwrap() {
            row.fill(i).unwrap();
        }
        assert_eq!(
            stripped(&root),
            format!(r#"<t xmlns:meld="{MELD_NS}"><head/><row>1</row><row>2</row><foot/></t>"#)
        );
    }

    #[test]
    fn test_repeat_nothing_removes_template() {
        let h = Renderer::new();
        let root = parse(&h, &format!(r#"<t xmlns:meld="{MELD_NS}"><row meld:id="row"/></t>"#));
        let repeat = root.repeat(Vec::<i32>::new(), Some("row")).unwrap();
        assert_eq!(repeat.count(), 0);
        assert!(root.is_empty());
    }

    #[test]
    fn test_repeat_errors() {
        let h = Renderer::new();
        let root = h.tag("root");
        assert!(matches!(root.repeat([1], None), Err(MeldError::TreeState(_))));
        assert!(matches!(
            root.repeat([1], Some("nope")),
            Err(MeldError::MeldNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_repeat_copies_keep_renderer() {
        let h = Renderer::new();
        let root = parse(&h, &format!(r#"<t xmlns:meld="{MELD_NS}"><row meld:id="row"/></t>"#));
        for (row, _) in root.repeat([()], Some("row")).unwrap() {
            row.detach();
            assert_eq!(row.renderer().map(|r| r.id().to_owned()), Some(h.id().to_owned()));
        }
    }

    #[test]
    fn test_replace_with_text() {
        let h = Renderer::new();
        let node = h.tag("node");
        let child = h.tag("child");
        node.call(child.clone()).unwrap();
        child.replace("test").unwrap();

        assert_eq!(node.text().as_deref(), Some("test"));
        assert!(node.is_empty());
    }

    #[test]
    fn test_replace_keeps_preceding_text() {
        let h = Renderer::new();
        let node = h.tag("node");
        let child1 = h.tag("child1");
        let child2 = h.tag("child2");
        node.call(content!["test", child1.clone()]).unwrap();
        child1.replace(child2.clone()).unwrap();

        assert_eq!(node.text().as_deref(), Some("test"));
        assert_eq!(node.children(), vec![child2]);
    }

    #[test]
    fn test_replace_moves_tail_to_replacement() {
        let h = Renderer::new();
        let node = h.tag("node");
        let child1 = h.tag("child1");
        let child2 = h.tag("child2");
        node.call(content![child1.clone(), "test"]).unwrap();
        child1.replace(content!["before", child2.clone()]).unwrap();

        assert_eq!(node.text().as_deref(), Some("before"));
        assert_eq!(child2.tail().as_deref(), Some("test"));
    }

    #[test]
    fn test_replace_with_node_from_another_tree() {
        let h = Renderer::new();
        let t1 = parse(&h, r#"<a>before<x>kjkjkl</x>#<b b="b">hello</b>after</a>"#);
        let t2 = parse(&h, r#"<c><titi a="a">world</titi>yyy</c>"#);
        t1.child(1).unwrap().replace(t2.child(0).unwrap()).unwrap();

        assert_eq!(
            t1.to_xml(),
            r#"<a>before<x>kjkjkl</x>#<titi a="a">world</titi>after</a>"#
        );
        assert!(t2.is_empty());
        assert_eq!(t2.text(), None);
    }

    #[test]
    fn test_replace_text_only_follows_previous_sibling() {
        let h = Renderer::new();
        let root = parse(&h, "<p>a<b/>-<c/>z</p>");
        root.child(1).unwrap().replace(content!["x", "y"]).unwrap();
        assert_eq!(root.to_xml(), "<p>a<b/>-xyz</p>");
    }

    #[test]
    fn test_replace_with_preceding_sibling() {
        let h = Renderer::new();
        let root = parse(&h, "<p><a/><b/><c/></p>");
        let a = root.child(0).unwrap();
        root.child(1).unwrap().replace(a.clone()).unwrap();

        assert_eq!(root.to_xml(), "<p><a/><c/></p>");
        assert_eq!(root.child(0), Some(a));
    }

    #[test]
    fn test_replace_with_following_sibling_keeps_text() {
        let h = Renderer::new();
        let root = parse(&h, "<p><a/>1<b/>2<c/>3</p>");
        let b = root.child(1).unwrap();
        b.replace(root.child(2).unwrap()).unwrap();

        assert_eq!(root.to_xml(), "<p><a/>1<c/>32</p>");
        assert_eq!(b.parent(), None);
    }

    #[test]
    fn test_replace_with_ancestor_changes_nothing() {
        let h = Renderer::new();
        let root = parse(&h, "<p>x<a><b/></a>y</p>");
        let a = root.child(0).unwrap();
        let b = a.child(0).unwrap();

        let err = b.replace(content!["t", root.clone()]).unwrap_err();
        assert!(matches!(err, MeldError::TreeState(_)));
        assert_eq!(root.to_xml(), "<p>x<a><b/></a>y</p>");
        assert_eq!(b.parent(), Some(a));
    }

    #[test]
    fn test_replace_with_rejected_attributes_changes_nothing() {
        let h = Renderer::new();
        h.set_check_attributes(true);
        h.declare_tag("p", ["class"]);
        let p = h.tag("p");
        let b = h.tag("b");
        p.call(content!["x", b.clone(), "y"]).unwrap();

        let err = b
            .replace(content!["t", attrs! { "onclick" => "go()" }])
            .unwrap_err();
        assert!(matches!(err, MeldError::AttributeValidation { .. }));
        assert_eq!(p.to_xml(), "<p>x<b/>y</p>");
        assert_eq!(b.parent(), Some(p));
    }

    #[test]
    fn test_replace_root_is_noop() {
        let h = Renderer::new();
        let root = h.tag("root").call("x").unwrap();
        let returned = root.replace("y").unwrap();
        assert_eq!(returned, root);
        assert_eq!(root.text().as_deref(), Some("x"));
    }

    #[test]
    fn test_fill_replaces_content() {
        let h = Renderer::new();
        let node = parse(&h, "<n>old<a/>tail</n>");
        node.fill_with(content!["new", h.tag("b")], [("class_", "c")])
            .unwrap();
        assert_eq!(node.to_xml(), r#"<n class="c">new<b/></n>"#);
    }

    #[test]
    fn test_pipeline_flag() {
        let h = meld_renderer();
        let node = h.tag("div").meld_id("x");

        assert_eq!(
            node.to_xml(),
            format!(r#"<div xmlns:meld="{MELD_NS}" meld:id="x"/>"#)
        );
        assert_eq!(stripped(&node), format!(r#"<div xmlns:meld="{MELD_NS}"/>"#));
        assert_eq!(node.meld_id_value(), None);
    }
}
