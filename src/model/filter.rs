use crate::logic::FilterExpr;
use serde::{Deserialize, Serialize};

/// Search request, sent as the request body or assembled from query
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    /// Target entity name; required on the global search path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<FilterExpr>,

    /// Sort key; a leading `-` sorts descending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey<'a> {
    pub key: &'a str,
    pub ascending: bool,
}

impl SearchRequest {
    pub fn sort_key(&self) -> Option<SortKey<'_>> {
        let sort = self.sort.as_deref()?;
        match sort.strip_prefix('-') {
            Some(key) => Some(SortKey { key, ascending: false }),
            None => Some(SortKey {
                key: sort.strip_prefix('+').unwrap_or(sort),
                ascending: true,
            }),
        }
    }
}
