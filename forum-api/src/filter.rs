//! Filter declarations and the filter compiler.

use crate::context::Context;
use crate::error::{ApiError, ApiResult};
use crate::query::QueryParams;
use forum_storage::{Column, Condition};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Turns a raw `filter[name]` value into a query condition.
pub type FilterFn = Arc<dyn Fn(&str, &Context) -> ApiResult<Condition> + Send + Sync>;

#[derive(Clone)]
pub struct Filter {
    name: String,
    apply: FilterFn,
}

impl Filter {
    pub fn new(
        name: &str,
        apply: impl Fn(&str, &Context) -> ApiResult<Condition> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            apply: Arc::new(apply),
        }
    }

    /// Equality on an attribute. Integer-looking values compare as integers;
    /// `true`/`false` compare as booleans. A comma list matches any of its
    /// values.
    pub fn exact(name: &str, attribute: &str) -> Self {
        let attribute = attribute.to_string();
        Self::new(name, move |raw, _| {
            let values: Vec<Value> = raw.split(',').map(coerce).collect();
            Ok(match values.len() {
                1 => Condition::Eq(Column::attribute(attribute.as_str()), values[0].clone()),
                _ => Condition::In(Column::attribute(attribute.as_str()), values),
            })
        })
    }

    /// Case-insensitive substring search over one or more attributes.
    pub fn contains(name: &str, attributes: &[&str]) -> Self {
        let columns: Vec<Column> = attributes.iter().map(|a| Column::attribute(*a)).collect();
        Self::new(name, move |raw, _| {
            Ok(Condition::Contains {
                columns: columns.clone(),
                needle: raw.to_string(),
            })
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, raw: &str, ctx: &Context) -> ApiResult<Condition> {
        (self.apply)(raw, ctx)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("name", &self.name).finish_non_exhaustive()
    }
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(raw),
        },
    }
}

/// AND-s every requested filter. Unknown names are a 400 on `filter[name]`.
pub fn compile(
    filters: &IndexMap<String, Filter>,
    params: &QueryParams,
    ctx: &Context,
) -> ApiResult<Option<Condition>> {
    let mut conditions = Vec::new();
    for (name, raw) in params.filters() {
        let filter = filters.get(name).ok_or_else(|| {
            ApiError::bad_parameter(
                &format!("filter[{name}]"),
                format!("Invalid filter [{name}]"),
            )
        })?;
        conditions.push(Some(filter.apply(raw, ctx)?));
    }
    Ok(Condition::all(conditions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_picks_json_types() {
        assert_eq!(coerce("12"), Value::from(12));
        assert_eq!(coerce("true"), Value::Bool(true));
        assert_eq!(coerce("abc"), Value::from("abc"));
    }
}
