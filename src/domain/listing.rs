//! Pagination, sorting and filtering of collection endpoints.
//!
//! Every resource declares which query keys may be used as filters and sort
//! keys. Filters are case-insensitive substring matches on the mapped column.

use crate::errors::ApiError;
use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// A query key exposed to clients and the column it maps to.
#[derive(Clone, Copy, Debug)]
pub struct Field {
    pub key: &'static str,
    pub column: &'static str,
}

pub const fn field(key: &'static str, column: &'static str) -> Field {
    Field { key, column }
}

#[derive(Debug)]
pub struct ListSpec {
    pub filters: &'static [Field],
    pub sorts: &'static [Field],
    pub default_sort: Sort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub column: &'static str,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub needle: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub sort: Sort,
    pub filters: Vec<Filter>,
}

impl ListParams {
    pub fn parse(query: &HashMap<String, String>, fields: &ListSpec) -> Result<Self, ApiError> {
        let page = parse_positive(query, "page")?.unwrap_or(1);
        let limit = parse_positive(query, "limit")?
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);

        let sort = match query.get("sort").map(|s| s.trim()) {
            None | Some("") => fields.default_sort,
            Some(raw) => {
                let (descending, key) = match raw.strip_prefix('-') {
                    Some(key) => (true, key),
                    None => (false, raw),
                };
                let field = lookup(fields.sorts, key)
                    .ok_or_else(|| ApiError::validation(raw, format!("Cannot sort by `{key}`.")))?;
                Sort {
                    column: field.column,
                    descending,
                }
            }
        };

        let mut filters = Vec::new();
        for (key, value) in query {
            if matches!(key.as_str(), "page" | "limit" | "sort") || value.trim().is_empty() {
                continue;
            }
            let field = lookup(fields.filters, key)
                .ok_or_else(|| ApiError::validation(key, format!("Cannot filter by `{key}`.")))?;
            filters.push(Filter {
                column: field.column,
                needle: value.trim().to_lowercase(),
            });
        }
        filters.sort_by(|a, b| a.column.cmp(b.column));

        Ok(Self {
            page,
            limit,
            sort,
            filters,
        })
    }

    pub fn unbounded(fields: &ListSpec) -> Self {
        Self {
            page: 1,
            limit: u32::MAX,
            sort: fields.default_sort,
            filters: Vec::new(),
        }
    }

    /// Replaces whatever the client asked for on `column` with `needle`.
    pub fn restrict(mut self, column: &'static str, needle: &str) -> Self {
        self.filters.retain(|f| f.column != column);
        self.filters.push(Filter {
            column,
            needle: needle.to_lowercase(),
        });
        self.filters.sort_by(|a, b| a.column.cmp(b.column));
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

fn lookup(fields: &[Field], key: &str) -> Option<Field> {
    fields
        .iter()
        .find(|f| f.key.eq_ignore_ascii_case(key))
        .copied()
}

fn parse_positive(query: &HashMap<String, String>, key: &str) -> Result<Option<u32>, ApiError> {
    match query.get(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(ApiError::validation(
                raw,
                format!("`{key}` must be a positive integer."),
            )),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}

/// A column value, as seen by in-process filtering and sorting.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(i64),
    Time(OffsetDateTime),
    Text(String),
}

impl FieldValue {
    fn contains(&self, needle: &str) -> bool {
        let haystack = match self {
            Self::Null => return false,
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Time(t) => t.to_string(),
            Self::Text(s) => s.to_lowercase(),
        };
        haystack.contains(needle)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Option<&str>> for FieldValue {
    fn from(s: Option<&str>) -> Self {
        s.map_or(Self::Null, Self::from)
    }
}

/// Records that can be filtered and sorted by column name in process.
pub trait Listable {
    fn field(&self, column: &str) -> FieldValue;
}

/// Applies filters, sort and pagination to an in-process collection.
pub fn paginate<'a, T, I>(items: I, params: &ListParams) -> Page<T>
where
    T: Listable + Clone + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut matching: Vec<&T> = items
        .into_iter()
        .filter(|item| {
            params
                .filters
                .iter()
                .all(|f| item.field(f.column).contains(&f.needle))
        })
        .collect();

    matching.sort_by(|a, b| {
        let ordering = a.field(params.sort.column).cmp(&b.field(params.sort.column));
        if params.sort.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    let total = matching.len() as u64;
    let data = matching
        .into_iter()
        .skip(usize::try_from(params.offset()).unwrap_or(usize::MAX))
        .take(params.limit as usize)
        .cloned()
        .collect();

    Page {
        data,
        page: params.page,
        limit: params.limit,
        total,
    }
}
