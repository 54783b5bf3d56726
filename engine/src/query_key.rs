//! Cache keys for list and detail views.
//!
//! Every key starts with its collection, so "all views of a collection" is a
//! prefix match on the collection name.

use crate::{CollectionName, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default page number for list views.
pub const DEFAULT_PAGE: u32 = 1;
/// Default page size for list views.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Parameters that distinguish one list view from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
    pub filter: String,
    pub sort: String,
    pub expand: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            filter: String::new(),
            sort: String::new(),
            expand: String::new(),
        }
    }
}

impl ListOptions {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = expand.into();
        self
    }
}

/// What a key points at within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyScope {
    /// A (possibly filtered, paginated) list of records
    List(ListOptions),
    /// A single record
    Detail { id: RecordId },
}

/// A cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub collection: CollectionName,
    pub scope: KeyScope,
}

impl QueryKey {
    /// Key for a list view.
    pub fn list(collection: impl Into<CollectionName>, options: ListOptions) -> Self {
        Self {
            collection: collection.into(),
            scope: KeyScope::List(options),
        }
    }

    /// Key for the default list view (page 1, 50 per page, unfiltered).
    pub fn list_all(collection: impl Into<CollectionName>) -> Self {
        Self::list(collection, ListOptions::default())
    }

    /// Key for a detail view.
    pub fn detail(collection: impl Into<CollectionName>, id: impl Into<RecordId>) -> Self {
        Self {
            collection: collection.into(),
            scope: KeyScope::Detail { id: id.into() },
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.scope, KeyScope::List(_))
    }

    /// The record id for detail keys.
    pub fn detail_id(&self) -> Option<&str> {
        match &self.scope {
            KeyScope::Detail { id } => Some(id),
            KeyScope::List(_) => None,
        }
    }

    /// Whether this key falls under the collection prefix `collection`.
    pub fn matches_prefix(&self, collection: &str) -> bool {
        self.collection == collection
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            KeyScope::List(o) => write!(
                f,
                "{}/list?page={}&perPage={}&filter={}&sort={}&expand={}",
                self.collection, o.page, o.per_page, o.filter, o.sort, o.expand
            ),
            KeyScope::Detail { id } => write!(f, "{}/detail/{}", self.collection, id),
        }
    }
}
