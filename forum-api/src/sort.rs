//! Sort declarations and the sort compiler.
//!
//! A request `sort` is a comma-separated list of keys. Each key is either a
//! declared sort name (ascending), `-name` (descending), or an alias that
//! stands for one direction of a declared sort (`latest` for
//! `-lastPostedAt`). The compiled ordering always ends with `id ASC` so
//! paging through equal keys is deterministic.

use crate::error::{ApiError, ApiResult};
use forum_storage::{Column, Direction, OrderBy};
use indexmap::IndexMap;

/// One declared sortable column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    name: String,
    column: Column,
    ascending_alias: Option<String>,
    descending_alias: Option<String>,
}

impl SortColumn {
    /// Sort named after the attribute it orders by.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column: Column::attribute(name),
            ascending_alias: None,
            descending_alias: None,
        }
    }

    /// Orders by a different attribute than the sort's public name.
    pub fn column(mut self, attribute: &str) -> Self {
        self.column = Column::attribute(attribute);
        self
    }

    /// Orders by the primary key.
    pub fn by_id(mut self) -> Self {
        self.column = Column::Id;
        self
    }

    pub fn ascending_alias(mut self, alias: &str) -> Self {
        self.ascending_alias = Some(alias.to_string());
        self
    }

    pub fn descending_alias(mut self, alias: &str) -> Self {
        self.descending_alias = Some(alias.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn order(&self, direction: Direction) -> OrderBy {
        OrderBy {
            column: self.column.clone(),
            direction,
        }
    }
}

/// Resolves one sort key against the declared sorts.
pub fn resolve_key(sorts: &IndexMap<String, SortColumn>, key: &str) -> ApiResult<OrderBy> {
    if let Some(name) = key.strip_prefix('-') {
        // Aliases already carry a direction; only declared names take `-`.
        if let Some(sort) = sorts.get(name) {
            return Ok(sort.order(Direction::Desc));
        }
    } else if let Some(sort) = sorts.get(key) {
        return Ok(sort.order(Direction::Asc));
    } else {
        for sort in sorts.values() {
            if sort.ascending_alias.as_deref() == Some(key) {
                return Ok(sort.order(Direction::Asc));
            }
            if sort.descending_alias.as_deref() == Some(key) {
                return Ok(sort.order(Direction::Desc));
            }
        }
    }
    Err(ApiError::bad_parameter(
        "sort",
        format!("Invalid sort field [{key}]"),
    ))
}

/// Compiles a full `sort` parameter into an ordering with an `id ASC`
/// tiebreak.
pub fn compile(sorts: &IndexMap<String, SortColumn>, raw: Option<&str>) -> ApiResult<Vec<OrderBy>> {
    let mut order = Vec::new();
    if let Some(raw) = raw {
        for key in raw.split(',') {
            let key = key.trim();
            if key.is_empty() || key == "-" {
                return Err(ApiError::bad_parameter("sort", "Empty sort field"));
            }
            order.push(resolve_key(sorts, key)?);
        }
    }
    if !order.iter().any(|o| o.column == Column::Id) {
        order.push(OrderBy::asc(Column::Id));
    }
    Ok(order)
}
