//! Qualified name helpers.
//!
//! Element and attribute names are stored in Clark notation: `{uri}local`
//! for namespaced names, bare `local` otherwise.

/// URI permanently bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Split a prefixed name into `(prefix, local)`.
pub(crate) fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Split a Clark name into `(uri, local)`. Returns `None` for bare names.
pub fn split_clark(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix('{')?.split_once('}')
}

/// Build a Clark name.
pub fn clark(uri: &str, local: &str) -> String {
    format!("{{{uri}}}{local}")
}

/// Local part of a Clark name.
pub(crate) fn local_name(name: &str) -> &str {
    split_clark(name).map_or(name, |(_, local)| local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("meld:id"), (Some("meld"), "id"));
        assert_eq!(split_qname("div"), (None, "div"));
    }

    #[test]
    fn test_split_clark() {
        assert_eq!(split_clark("{urn:x}a"), Some(("urn:x", "a")));
        assert_eq!(split_clark("a"), None);
        assert_eq!(local_name("{urn:x}a"), "a");
        assert_eq!(clark("urn:x", "a"), "{urn:x}a");
    }
}
