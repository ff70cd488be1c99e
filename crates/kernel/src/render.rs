//! Response rendering.
//!
//! Collections are wrapped in a hypermedia envelope:
//!
//! ```json
//! {
//!   "_links": {"self": {"href": "/symbols?offset=0&limit=10"}, "next": {...}},
//!   "_metadata": {"offset": 0, "limit": 10, "total": 25},
//!   "_embedded": {"items": [...]}
//! }
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::query::Window;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    fn page(path: &str, offset: u64, limit: u64) -> Self {
        Self {
            href: format!("{path}?offset={offset}&limit={limit}"),
        }
    }
}

/// Link relation → link.
pub type Links = BTreeMap<&'static str, Link>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionMetadata {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embedded<T> {
    pub items: Vec<T>,
}

/// One page of a collection with navigation links.
#[derive(Debug, Clone, Serialize)]
pub struct Collection<T> {
    #[serde(rename = "_links")]
    pub links: Links,
    #[serde(rename = "_metadata")]
    pub metadata: CollectionMetadata,
    #[serde(rename = "_embedded")]
    pub embedded: Embedded<T>,
}

impl<T> Collection<T> {
    pub fn new(items: Vec<T>, window: &Window, path: &str) -> Self {
        Self {
            links: collection_links(window, path),
            metadata: CollectionMetadata {
                offset: window.offset,
                limit: window.limit,
                total: window.total.unwrap_or(0),
            },
            embedded: Embedded { items },
        }
    }
}

/// A single resource with its links.
#[derive(Debug, Clone, Serialize)]
pub struct Resource<T> {
    #[serde(rename = "_links")]
    pub links: Links,
    #[serde(flatten)]
    pub item: T,
}

impl<T> Resource<T> {
    pub fn new(item: T, path: &str) -> Self {
        Self {
            links: self_link(path),
            item,
        }
    }
}

/// Navigation links for a window.
///
/// `self` is always present. `first` is emitted when the offset is not zero,
/// `prev` when `offset > limit`, `next` when `total > offset + limit`, and
/// `last` when `total - total % limit > offset`.
///
/// Hrefs carry `offset`/`limit`, while [`QueryBuilder`](crate::query::QueryBuilder)
/// reads `_offset`/`_limit`; clients must rename them before following a link.
pub fn collection_links(window: &Window, path: &str) -> Links {
    let Window { offset, limit, .. } = *window;
    let total = window.total.unwrap_or(0);

    let mut links = Links::new();
    links.insert("self", Link::page(path, offset, limit));

    if offset != 0 {
        links.insert("first", Link::page(path, 0, limit));
    }

    let last = total - total % limit.max(1);
    if last > offset {
        links.insert("last", Link::page(path, last, limit));
    }

    if offset > limit {
        links.insert("prev", Link::page(path, offset - limit, limit));
    }

    let next = offset.saturating_add(limit);
    if total > next {
        links.insert("next", Link::page(path, next, limit));
    }

    links
}

/// Links for a single resource.
pub fn self_link(path: &str) -> Links {
    let mut links = Links::new();
    links.insert(
        "self",
        Link {
            href: path.to_string(),
        },
    );
    links
}
