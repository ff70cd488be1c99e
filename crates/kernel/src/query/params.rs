//! Inbound request parameters.
//!
//! [`Parameters`] is an ordered multimap of names to one or more values.
//! [`ParameterSource`] pairs the query-string and path-segment parameters of
//! one request so the builder can merge them with the right precedence.

use std::collections::BTreeMap;
use std::collections::btree_map;

/// Prefix marking control parameters that are never treated as filters.
pub const RESERVED_PREFIX: char = '_';

pub const SORT_PARAM: &str = "_sort";
pub const LIMIT_PARAM: &str = "_limit";
pub const OFFSET_PARAM: &str = "_offset";
pub const EMBED_PARAM: &str = "_embed";

/// Ordered name → values multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: BTreeMap<String, Vec<String>>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string.
    ///
    /// Repeated names accumulate values in the order they appear.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::new();
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.append(name.into_owned(), value.into_owned());
        }
        params
    }

    /// Add a value to a name, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Set the values of a name, replacing existing ones.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.values.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.values.iter()
    }

    /// Overlay `other` on top of `self`; names present in `other` win.
    pub fn overlay(&mut self, other: &Parameters) {
        for (name, values) in other.iter() {
            self.values.insert(name.clone(), values.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.append(name, value);
        }
        params
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Whether a name is a reserved control parameter (`_` plus alphanumerics).
pub fn is_reserved(name: &str) -> bool {
    name.strip_prefix(RESERVED_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// The parameters of one request, by origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSource {
    /// Parameters from the query string.
    pub query: Parameters,
    /// Parameters extracted from path segments.
    pub path: Parameters,
}

impl ParameterSource {
    pub fn new(query: Parameters, path: Parameters) -> Self {
        Self { query, path }
    }

    pub fn from_query(query: Parameters) -> Self {
        Self {
            query,
            path: Parameters::new(),
        }
    }

    /// Parse a raw query string, with no path parameters.
    pub fn from_query_str(query: &str) -> Self {
        Self::from_query(Parameters::parse(query))
    }
}

impl From<Parameters> for ParameterSource {
    fn from(query: Parameters) -> Self {
        Self::from_query(query)
    }
}
