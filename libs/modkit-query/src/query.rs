//! Request DTO: page, page size, sort keys and filter entries.

use serde::{Deserialize, Serialize};

use crate::value::FilterValue;

/// One `sorted` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

/// One `filtered` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub id: String,
    pub value: FilterValue,
}

/// Tenant-agnostic list request.
///
/// Wire shape: `{"page": 1, "pageSize": 10, "sorted": [{"id": "email", "desc": true}],
/// "filtered": [{"id": "email", "value": "x"}]}`. `page` is 1-based; `sorted` and
/// `filtered` are applied in the order given.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[must_use]
pub struct Query {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub sorted: Vec<SortEntry>,
    #[serde(default)]
    pub filtered: Vec<FilterEntry>,
}

impl Query {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page,
            page_size,
            ..Self::default()
        }
    }

    pub fn filter(mut self, id: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filtered.push(FilterEntry {
            id: id.into(),
            value: value.into(),
        });
        self
    }

    pub fn sort(mut self, id: impl Into<String>, desc: bool) -> Self {
        self.sorted.push(SortEntry {
            id: id.into(),
            desc,
        });
        self
    }
}
