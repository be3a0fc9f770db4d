//! List and read query parameters.
//!
//! `limit`, `skip`, `sort`, `select` and `populate` are reserved; every other
//! key is a filter and must be one the resource allows.

use std::collections::{BTreeMap, HashMap, HashSet};

use groups_shared::Group;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::store::{Pagination, SortField, SortKey};

const RESERVED: &[&str] = &["limit", "skip", "sort", "select", "populate"];

fn split_fields(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
}

fn parse_count(name: &str, raw: Option<&String>) -> Result<Option<u32>, AppError> {
    raw.map(|value| {
        value.trim().parse::<u32>().map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid parameter `{}` with value `{}`.",
                name, value
            ))
        })
    })
    .transpose()
}

/// `"name -createdAt"` → name ascending, then createdAt descending.
pub fn parse_sort<F: SortField>(raw: Option<&String>) -> Result<Vec<SortKey<F>>, AppError> {
    let Some(raw) = raw else {
        return Ok(vec![SortKey {
            field: F::id(),
            descending: false,
        }]);
    };

    let keys = split_fields(raw)
        .map(|token| {
            let (name, descending) = match token.strip_prefix('-') {
                Some(name) => (name, true),
                None => (token.strip_prefix('+').unwrap_or(token), false),
            };
            F::parse(name)
                .map(|field| SortKey { field, descending })
                .ok_or_else(|| AppError::BadRequest(format!("Invalid sort field `{}`.", name)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Ok(vec![SortKey {
            field: F::id(),
            descending: false,
        }]);
    }
    Ok(keys)
}

/// Which fields of each document to return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Selection {
    pub fn parse(raw: Option<&String>) -> Result<Self, AppError> {
        let Some(raw) = raw else {
            return Ok(Self::All);
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for token in split_fields(raw) {
            match token.strip_prefix('-') {
                Some(field) => exclude.push(field.to_string()),
                None => include.push(token.to_string()),
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(Self::All),
            (false, true) => Ok(Self::Include(include)),
            (true, false) => Ok(Self::Exclude(exclude)),
            (false, false) => Err(AppError::BadRequest(
                "Parameter `select` cannot mix inclusion and exclusion.".to_string(),
            )),
        }
    }

    /// Projects one JSON document. `id` is always kept.
    pub fn apply(&self, value: Value) -> Value {
        let Value::Object(object) = value else {
            return value;
        };
        let projected: Map<String, Value> = match self {
            Self::All => object,
            Self::Include(fields) => object
                .into_iter()
                .filter(|(key, _)| key == "id" || fields.iter().any(|f| f == key))
                .collect(),
            Self::Exclude(fields) => object
                .into_iter()
                .filter(|(key, _)| key == "id" || !fields.iter().any(|f| f == key))
                .collect(),
        };
        Value::Object(projected)
    }
}

/// Reference fields to expand into full documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Populate(Vec<&'static str>);

impl Populate {
    pub fn parse(raw: Option<&String>, allowed: &[&'static str]) -> Result<Self, AppError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        let mut fields = Vec::new();
        for token in split_fields(raw) {
            let field = allowed
                .iter()
                .find(|allowed| **allowed == token)
                .ok_or_else(|| {
                    AppError::BadRequest(format!("Cannot populate unknown path `{}`.", token))
                })?;
            if !fields.contains(field) {
                fields.push(*field);
            }
        }
        Ok(Self(fields))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids referenced by the populated fields across `groups`.
    pub fn referenced_ids(&self, groups: &[Group]) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for group in groups {
            for field in &self.0 {
                let refs: &[Uuid] = match *field {
                    "parent" => match group.parent {
                        Some(ref parent) => std::slice::from_ref(parent),
                        None => &[],
                    },
                    "children" => &group.children,
                    "ancestors" => &group.ancestors,
                    _ => &[],
                };
                for id in refs {
                    if seen.insert(*id) {
                        ids.push(*id);
                    }
                }
            }
        }
        ids
    }

    /// Replaces referenced ids in `value` with the matching documents from
    /// `found`. Ids with no match become `null` (or are dropped from arrays).
    pub fn apply(&self, value: Value, found: &HashMap<Uuid, Value>) -> Value {
        let Value::Object(mut object) = value else {
            return value;
        };
        let resolve = |v: &Value| -> Option<Value> {
            v.as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .and_then(|id| found.get(&id).cloned())
        };

        for field in &self.0 {
            let Some(current) = object.get_mut(*field) else {
                continue;
            };
            *current = match current.take() {
                Value::Array(items) => Value::Array(items.iter().filter_map(resolve).collect()),
                Value::Null => Value::Null,
                single => resolve(&single).unwrap_or(Value::Null),
            };
        }
        Value::Object(object)
    }
}

/// Parsed query string of a list request.
#[derive(Debug, Clone)]
pub struct ListParams<F> {
    pub pagination: Pagination,
    pub sort: Vec<SortKey<F>>,
    pub selection: Selection,
    pub populate: Populate,
    pub filters: BTreeMap<String, String>,
}

impl<F: SortField> ListParams<F> {
    pub fn parse(
        raw: &HashMap<String, String>,
        filter_fields: &[&str],
        populate_fields: &[&'static str],
        default_limit: u32,
    ) -> Result<Self, AppError> {
        let limit = parse_count("limit", raw.get("limit"))?.unwrap_or(default_limit);
        let skip = parse_count("skip", raw.get("skip"))?.unwrap_or(0);

        let mut filters = BTreeMap::new();
        for (key, value) in raw {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            if !filter_fields.contains(&key.as_str()) {
                return Err(AppError::BadRequest(format!(
                    "Invalid query parameter `{}`.",
                    key
                )));
            }
            filters.insert(key.clone(), value.clone());
        }

        Ok(Self {
            pagination: Pagination {
                limit: (limit > 0).then_some(limit),
                skip,
            },
            sort: parse_sort(raw.get("sort"))?,
            selection: Selection::parse(raw.get("select"))?,
            populate: Populate::parse(raw.get("populate"), populate_fields)?,
            filters,
        })
    }
}

/// Parsed query string of a single-document read.
#[derive(Debug, Clone, Default)]
pub struct ViewParams {
    pub selection: Selection,
    pub populate: Populate,
}

impl ViewParams {
    pub fn parse(
        raw: &HashMap<String, String>,
        populate_fields: &[&'static str],
    ) -> Result<Self, AppError> {
        Ok(Self {
            selection: Selection::parse(raw.get("select"))?,
            populate: Populate::parse(raw.get("populate"), populate_fields)?,
        })
    }
}

/// A filter value naming a document id.
pub fn filter_id(name: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        AppError::BadRequest(format!(
            "Invalid parameter `{}` with value `{}`.",
            name, raw
        ))
    })
}
