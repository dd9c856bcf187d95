//! End-to-end templating over an XHTML page.

use std::collections::BTreeMap;

use meld_xml::{
    Atom, MELD_ID, MELD_NS, Node, Renderer, RootContent, SerializeOptions, attrs, content,
};
use pretty_assertions::assert_eq;

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const PAGE: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml"
      xmlns:meld="http://www.plope.com/software/meld3"
      xmlns:bar="http://foo/bar">
  <head>
    <meta content="text/html; charset=ISO-8859-1" http-equiv="content-type" />
    <title meld:id="title">This is the title</title>
  </head>
  <body>
    <div/> <!-- empty tag -->
    <div meld:id="content_well">
      <form meld:id="form1" action="." method="POST">
      <table border="0" meld:id="table1">
        <tbody meld:id="tbody">
          <tr>
            <th>Name</th>
            <th>Description</th>
          </tr>
          <tr meld:id="tr" class="foo">
            <td meld:id="td1">Name</td>
            <td meld:id="td2">Description</td>
          </tr>
        </tbody>
      </table>
      <input type="submit" name="next" value=" Next "/>
      </form>
    </div>
  </body>
</html>"#;

const PEOPLE: [(&str, &str); 2] = [("Girls", "Pretty"), ("Boys", "Ugly")];

fn load() -> (Renderer, Node) {
    let h = Renderer::new();
    let root = h.parse_str(PAGE).unwrap();
    root.find_meld("title").unwrap().set_text(Some("My document"));
    root.find_meld("form1").unwrap().set("action", "./handler");
    (h, root)
}

fn elements<'a>(root: &'a Node, local: &'a str) -> impl Iterator<Item = Node> + 'a {
    root.descendants()
        .filter(move |n| n.local_name().as_deref() == Some(local))
}

fn cell_texts(root: &Node) -> Vec<String> {
    elements(root, "td")
        .filter_map(|td| td.text())
        .collect()
}

fn replace_rows(h: &Renderer, root: &Node) {
    let rows: Vec<Node> = PEOPLE
        .iter()
        .map(|(name, description)| {
            h.tag("tr")
                .call(content![
                    h.tag("td").call(*name).unwrap(),
                    h.tag("td").call(*description).unwrap(),
                    attrs! { "class" => "bar" },
                ])
                .unwrap()
        })
        .collect();
    root.find_meld("tr").unwrap().replace(rows).unwrap();
}

#[test]
fn test_find_and_set() {
    let (_h, root) = load();

    let head = root.child(0).unwrap();
    assert_eq!(head.child(1).unwrap().text().as_deref(), Some("My document"));

    let form = elements(&root, "form").next().unwrap();
    assert_eq!(form.namespace().as_deref(), Some(XHTML_NS));
    assert_eq!(form.get("action").as_deref(), Some("./handler"));
}

#[test]
fn test_repeat_rows() {
    let (_h, root) = load();

    let rows = root.find_meld("tr").unwrap().repeat(PEOPLE, None).unwrap();
    for (row, (name, description)) in rows {
        row.find_meld("td1").unwrap().set_text(Some(name));
        row.find_meld("td2").unwrap().set_text(Some(description));
    }

    assert_eq!(cell_texts(&root), vec!["Girls", "Pretty", "Boys", "Ugly"]);
    let classes: Vec<_> = elements(&root, "tr").filter_map(|tr| tr.get("class")).collect();
    assert_eq!(classes, vec!["foo", "foo"]);
}

#[test]
fn test_replace_rows() {
    let (h, root) = load();
    replace_rows(&h, &root);

    let trs: Vec<Node> = elements(&root, "tr").collect();
    assert_eq!(trs.len(), 3);
    assert_eq!(trs[1].get("class").as_deref(), Some("bar"));
    assert_eq!(cell_texts(&root), vec!["Girls", "Pretty", "Boys", "Ugly"]);
    assert!(root.find_meld("tr").is_none());
}

#[test]
fn test_serialize_without_pipeline_strips_marks() {
    let (h, root) = load();
    replace_rows(&h, &root);

    let options = SerializeOptions::default()
        .xml_declaration(true)
        .pretty_print(true)
        .pipeline(false);
    let bytes = root.serialize(&options).unwrap();
    let text = String::from_utf8(bytes).unwrap();

    assert!(text.starts_with("<?xml version='1.0' encoding='utf-8'?>\n<html"));
    assert!(!text.contains("meld:id"));
    assert!(root.find_meld("content_well").is_none());
    assert!(root.descendants().all(|n| n.get(MELD_ID).is_none()));

    let reparsed = h.parse_str(&text).unwrap();
    assert!(reparsed.find_meld("title").is_none());
}

#[test]
fn test_serialize_with_pipeline_keeps_marks() {
    let (h, root) = load();
    replace_rows(&h, &root);

    let text = root
        .to_xml_string(&SerializeOptions::default().pretty_print(true))
        .unwrap();

    assert!(root.find_meld("tr").is_none());
    assert!(root.find_meld("content_well").is_some());

    let reparsed = h.parse_str(&text).unwrap();
    let title = reparsed.find_meld("title").unwrap();
    assert_eq!(title.text().as_deref(), Some("My document"));
}

#[test]
fn test_comment_survives_round_trip() {
    let (_h, root) = load();
    let text = root.to_xml();
    assert!(text.contains("<div/> <!-- empty tag -->"));
    assert!(text.starts_with(&format!(r#"<html xmlns="{XHTML_NS}" xmlns:meld="{MELD_NS}""#)));
}

#[test]
fn test_build_page_imperatively() {
    let h = Renderer::new();
    h.set_namespaces(BTreeMap::from([("meld".to_owned(), MELD_NS.to_owned())]));

    let html = h.tag("html");
    {
        let _html = h.scope(&html);
        let head = h.tag("head");
        {
            let _head = h.scope(&head);
            h.append(h.tag("title").meld_id("title").call("My document").unwrap());
        }
        let body = h.tag("body");
        let _body = h.scope(&body);
        let table = h.tag("table");
        let _table = h.scope(&table);
        for (name, description) in PEOPLE {
            let tr = h.tag("tr").meld_id("tr");
            let _tr = h.scope(&tr);
            h.append(h.tag("td").call(name).unwrap());
            h.append(h.tag("td").call(description).unwrap());
        }
    }

    let RootContent::Single(Atom::Node(root)) = h.root().unwrap() else {
        panic!("expected a single root element");
    };
    assert_eq!(root, html);
    assert_eq!(
        root.to_xml_string(&SerializeOptions::default().pipeline(false)).unwrap(),
        format!(
            "<html xmlns:meld=\"{MELD_NS}\"><head><title>My document</title></head>\
             <body><table><tr><td>Girls</td><td>Pretty</td></tr>\
             <tr><td>Boys</td><td>Ugly</td></tr></table></body></html>"
        )
    );
}

#[test]
fn test_fragment_into_template() {
    let (h, root) = load();
    let items = h
        .parse_fragment_str("intro <b>bold</b> outro")
        .unwrap();

    let title = root.find_meld("title").unwrap();
    title.fill(items).unwrap();
    assert_eq!(title.text().as_deref(), Some("intro "));
    let b = title.child(0).unwrap();
    assert_eq!(b.text().as_deref(), Some("bold"));
    assert_eq!(b.tail().as_deref(), Some(" outro"));
}
