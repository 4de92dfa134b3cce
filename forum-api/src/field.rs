//! Field definitions.
//!
//! A [`Field`] is one attribute or relationship of a resource: its kind,
//! per-request visibility and writability, validation constraints, and
//! optional custom getter/setter. Fields are built with chained
//! configuration calls and are plain values; extensions replace or mutate
//! them through the schema registry.

use crate::context::Context;
use crate::error::{ApiError, ApiResult};
use forum_model::Model;
use forum_types::{format_timestamp, parse_timestamp};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Custom read: `(model, context) -> value`.
pub type Getter = Arc<dyn Fn(&Model, &Context) -> Value + Send + Sync>;
/// Custom write: `(model, value, context)`. Replaces the default write.
pub type Setter = Arc<dyn Fn(&mut Model, Value, &Context) -> ApiResult<()> + Send + Sync>;
/// Per-request predicate over the target record.
pub type Predicate = Arc<dyn Fn(&Model, &Context) -> bool + Send + Sync>;
/// Custom validation: `Err(detail)` rejects the value.
pub type Validator = Arc<dyn Fn(&Value, &Model, &Context) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    DateTime,
    /// Single related record referenced through `foreign_key` on this record.
    ToOne {
        related_type: String,
        foreign_key: String,
    },
    /// Related records that reference this one through `inverse_key`.
    ToMany {
        related_type: String,
        inverse_key: String,
    },
}

impl FieldKind {
    pub fn is_relationship(&self) -> bool {
        matches!(self, Self::ToOne { .. } | Self::ToMany { .. })
    }

    pub fn related_type(&self) -> Option<&str> {
        match self {
            Self::ToOne { related_type, .. } | Self::ToMany { related_type, .. } => {
                Some(related_type)
            }
            _ => None,
        }
    }
}

/// Static or per-request rule.
#[derive(Clone)]
pub enum Rule {
    Always,
    Never,
    When(Predicate),
}

impl Rule {
    pub fn eval(&self, model: &Model, ctx: &Context) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::When(p) => p(model, ctx),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

#[derive(Clone)]
pub enum Constraint {
    MinLength(usize),
    MaxLength(usize),
    Min(i64),
    Max(i64),
    Custom(Validator),
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinLength(n) => write!(f, "MinLength({n})"),
            Self::MaxLength(n) => write!(f, "MaxLength({n})"),
            Self::Min(n) => write!(f, "Min({n})"),
            Self::Max(n) => write!(f, "Max({n})"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One attribute or relationship of a resource.
#[derive(Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    visible: Rule,
    writable: Rule,
    required_on_create: bool,
    nullable: bool,
    apply_when_absent: bool,
    includable: bool,
    linkage: Rule,
    constraints: Vec<Constraint>,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl Field {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            visible: Rule::Always,
            writable: Rule::Never,
            required_on_create: false,
            nullable: false,
            apply_when_absent: false,
            includable: false,
            linkage: Rule::Never,
            constraints: Vec::new(),
            getter: None,
            setter: None,
        }
    }

    // ── Constructors ─────────────────────────────────────────────

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date_time(name: &str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    /// To-one relationship stored as `<name>Id` on this record.
    pub fn to_one(name: &str, related_type: &str) -> Self {
        Self::new(
            name,
            FieldKind::ToOne {
                related_type: related_type.to_string(),
                foreign_key: format!("{name}Id"),
            },
        )
    }

    /// To-many relationship: related records whose `inverse_key` holds this
    /// record's id.
    pub fn to_many(name: &str, related_type: &str, inverse_key: &str) -> Self {
        Self::new(
            name,
            FieldKind::ToMany {
                related_type: related_type.to_string(),
                inverse_key: inverse_key.to_string(),
            },
        )
    }

    // ── Configuration ────────────────────────────────────────────

    /// Overrides the foreign key of a to-one relationship.
    pub fn foreign_key(mut self, key: &str) -> Self {
        if let FieldKind::ToOne { foreign_key, .. } = &mut self.kind {
            *foreign_key = key.to_string();
        }
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = if visible { Rule::Always } else { Rule::Never };
        self
    }

    pub fn hidden(self) -> Self {
        self.visible(false)
    }

    pub fn visible_when(mut self, f: impl Fn(&Model, &Context) -> bool + Send + Sync + 'static) -> Self {
        self.visible = Rule::When(Arc::new(f));
        self
    }

    pub fn writable(mut self) -> Self {
        self.writable = Rule::Always;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.writable = Rule::Never;
        self
    }

    pub fn writable_when(mut self, f: impl Fn(&Model, &Context) -> bool + Send + Sync + 'static) -> Self {
        self.writable = Rule::When(Arc::new(f));
        self
    }

    pub fn writable_on_create(self) -> Self {
        self.writable_when(|_, ctx| ctx.creating())
    }

    pub fn writable_on_update(self) -> Self {
        self.writable_when(|_, ctx| ctx.updating())
    }

    pub fn required_on_create(mut self) -> Self {
        self.required_on_create = true;
        self
    }

    /// Accepts `null` as a value.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Runs the write step with `null` even when the field is absent from
    /// the payload, so setters can fill defaults.
    pub fn apply_when_absent(mut self) -> Self {
        self.apply_when_absent = true;
        self
    }

    pub fn includable(mut self, includable: bool) -> Self {
        self.includable = includable;
        self
    }

    /// Emit relationship linkage (`data: {type, id}`) even when not included.
    pub fn with_linkage(mut self) -> Self {
        self.linkage = Rule::Always;
        self
    }

    pub fn linkage_when(mut self, f: impl Fn(&Model, &Context) -> bool + Send + Sync + 'static) -> Self {
        self.linkage = Rule::When(Arc::new(f));
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.constraints.push(Constraint::MinLength(n));
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.constraints.push(Constraint::MaxLength(n));
        self
    }

    pub fn min(mut self, n: i64) -> Self {
        self.constraints.push(Constraint::Min(n));
        self
    }

    pub fn max(mut self, n: i64) -> Self {
        self.constraints.push(Constraint::Max(n));
        self
    }

    pub fn validate(
        mut self,
        f: impl Fn(&Value, &Model, &Context) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.constraints.push(Constraint::Custom(Arc::new(f)));
        self
    }

    pub fn get(mut self, f: impl Fn(&Model, &Context) -> Value + Send + Sync + 'static) -> Self {
        self.getter = Some(Arc::new(f));
        self
    }

    pub fn set(
        mut self,
        f: impl Fn(&mut Model, Value, &Context) -> ApiResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(f));
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_relationship(&self) -> bool {
        self.kind.is_relationship()
    }

    pub fn is_includable(&self) -> bool {
        self.includable
    }

    pub fn is_required_on_create(&self) -> bool {
        self.required_on_create
    }

    pub fn applies_when_absent(&self) -> bool {
        self.apply_when_absent
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_visible(&self, model: &Model, ctx: &Context) -> bool {
        self.visible.eval(model, ctx)
    }

    pub fn is_writable(&self, model: &Model, ctx: &Context) -> bool {
        self.writable.eval(model, ctx)
    }

    pub fn writable_rule(&self) -> &Rule {
        &self.writable
    }

    pub fn has_linkage(&self, model: &Model, ctx: &Context) -> bool {
        self.linkage.eval(model, ctx)
    }

    // ── Read / check / write ─────────────────────────────────────

    /// Attribute value for serialization.
    pub fn read(&self, model: &Model, ctx: &Context) -> Value {
        match &self.getter {
            Some(getter) => getter(model, ctx),
            None => model.get(&self.name).cloned().unwrap_or(Value::Null),
        }
    }

    /// Type and constraint check for an incoming attribute value.
    /// Relationship linkage is resolved by the pipeline before this runs;
    /// for a to-one the value is then the related id or `null`.
    pub fn check(&self, value: &Value, model: &Model, ctx: &Context) -> Result<(), String> {
        let name = &self.name;
        if value.is_null() {
            if !self.nullable && !self.is_relationship() {
                return Err(format!("The {name} field must not be null."));
            }
        } else {
            match self.kind {
                FieldKind::String if !value.is_string() => {
                    return Err(format!("The {name} field must be a string."));
                }
                FieldKind::Integer if !value.is_i64() => {
                    return Err(format!("The {name} field must be an integer."));
                }
                FieldKind::Boolean if !value.is_boolean() => {
                    return Err(format!("The {name} field must be true or false."));
                }
                FieldKind::DateTime => {
                    let valid = value.as_str().is_some_and(|s| parse_timestamp(s).is_ok());
                    if !valid {
                        return Err(format!("The {name} field must be an RFC 3339 date-time."));
                    }
                }
                _ => {}
            }
        }

        for constraint in &self.constraints {
            match constraint {
                Constraint::MinLength(n) => {
                    if value.as_str().is_some_and(|s| s.chars().count() < *n) {
                        return Err(format!("The {name} field must be at least {n} characters."));
                    }
                }
                Constraint::MaxLength(n) => {
                    if value.as_str().is_some_and(|s| s.chars().count() > *n) {
                        return Err(format!("The {name} field may not be greater than {n} characters."));
                    }
                }
                Constraint::Min(n) => {
                    if value.as_i64().is_some_and(|v| v < *n) {
                        return Err(format!("The {name} field must be at least {n}."));
                    }
                }
                Constraint::Max(n) => {
                    if value.as_i64().is_some_and(|v| v > *n) {
                        return Err(format!("The {name} field may not be greater than {n}."));
                    }
                }
                Constraint::Custom(validator) => validator(value, model, ctx)?,
            }
        }
        Ok(())
    }

    /// Writes a checked value onto the model.
    pub fn write(&self, model: &mut Model, value: Value, ctx: &Context) -> ApiResult<()> {
        if let Some(setter) = &self.setter {
            return setter(model, value, ctx);
        }
        match &self.kind {
            FieldKind::ToOne { foreign_key, .. } => model.set(foreign_key, value),
            FieldKind::ToMany { .. } => {
                return Err(ApiError::invalid(&self.name, "To-many relationships are not writable."));
            }
            FieldKind::DateTime => {
                let normalized = match value.as_str().map(parse_timestamp) {
                    Some(Ok(ts)) => Value::from(format_timestamp(&ts)),
                    _ => value,
                };
                model.set(&self.name, normalized);
            }
            _ => model.set(&self.name, value),
        }
        Ok(())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("visible", &self.visible)
            .field("writable", &self.writable)
            .field("required_on_create", &self.required_on_create)
            .field("includable", &self.includable)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}
