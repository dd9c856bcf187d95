//! Insertion-ordered attribute mapping.

use crate::content::Value;

/// Attributes of an element, kept in insertion order.
///
/// Keys are attribute names in Clark notation (`{uri}local` for namespaced
/// attributes, plain `local` otherwise). Inserting an existing key replaces
/// its value in place, so the serialized order stays stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an attribute; the value is stringified.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into().to_string();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Merge `other` into `self`; `other` wins on collisions.
    pub fn extend(&mut self, other: Attributes) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (key, value) in iter {
            attributes.insert(key, value);
        }
        attributes
    }
}

impl IntoIterator for Attributes {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Normalize a keyword-style attribute name.
///
/// Names starting with `data_` have every underscore turned into a dash
/// (`data_user_id` becomes `data-user-id`). Other names lose their trailing
/// underscores, so reserved words can be spelled `class_` or `for_`.
///
/// # Examples
///
/// ```
/// use meld_xml::normalize_keyword;
///
/// assert_eq!(normalize_keyword("class_"), "class");
/// assert_eq!(normalize_keyword("data_user_id"), "data-user-id");
/// assert_eq!(normalize_keyword("href"), "href");
/// ```
pub fn normalize_keyword(name: &str) -> String {
    if name.starts_with("data_") {
        name.replace('_', "-")
    } else {
        name.trim_end_matches('_').to_owned()
    }
}

/// Build an [`Attributes`] mapping from `key => value` pairs.
///
/// Values go through [`Value`] conversion, so numbers and `None` are
/// accepted as well as strings.
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Attributes::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut attributes = $crate::Attributes::new();
        $(attributes.insert($key, $value);)+
        attributes
    }};
}
