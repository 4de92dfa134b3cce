use super::timestamp_now;
use crate::api::JsonApi;
use crate::context::Context;
use crate::endpoint::Endpoint;
use crate::error::{ApiError, ApiResult, FieldError};
use crate::field::Field;
use crate::filter::Filter;
use crate::resource::Resource;
use crate::sort::SortColumn;
use forum_model::Model;
use forum_storage::{Condition, Query, StoreTx};
use serde_json::Value;

pub struct Users;

fn is_self(model: &Model, ctx: &Context) -> bool {
    model.exists() && model.id == ctx.actor().id()
}

fn is_self_or_admin(model: &Model, ctx: &Context) -> bool {
    ctx.actor().is_admin() || is_self(model, ctx)
}

fn check_email(value: &Value) -> Result<(), String> {
    let valid = value.as_str().is_some_and(|email| {
        email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
    });
    if valid {
        Ok(())
    } else {
        Err("The email must be a valid email address.".to_string())
    }
}

impl Resource for Users {
    fn resource_type(&self) -> &str {
        "users"
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::string("username")
                .required_on_create()
                .writable_when(|model, ctx| ctx.creating() || (ctx.updating() && is_self_or_admin(model, ctx)))
                .min_length(3)
                .max_length(30)
                .validate(|value, _, _| {
                    let valid = value
                        .as_str()
                        .is_some_and(|s| s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_'));
                    if valid {
                        Ok(())
                    } else {
                        Err("The username may only contain letters, numbers, dashes and underscores.".to_string())
                    }
                }),
            Field::string("displayName").get(|model, _| {
                model
                    .get("displayName")
                    .or_else(|| model.get("username"))
                    .cloned()
                    .unwrap_or(Value::Null)
            }),
            Field::string("email")
                .visible_when(is_self_or_admin)
                .required_on_create()
                .writable_when(|model, ctx| ctx.creating() || (ctx.updating() && is_self_or_admin(model, ctx)))
                .max_length(150)
                .validate(|value, _, _| check_email(value)),
            Field::date_time("joinTime"),
            Field::integer("discussionCount"),
            Field::integer("commentCount"),
            Field::boolean("isAdmin").visible_when(|_, ctx| ctx.actor().is_admin()),
            Field::boolean("canEdit").get(|model, ctx| Value::Bool(is_self_or_admin(model, ctx))),
            Field::boolean("canDelete").get(|_, ctx| Value::Bool(ctx.actor().is_admin())),
        ]
    }

    fn sorts(&self) -> Vec<SortColumn> {
        vec![
            SortColumn::new("username"),
            SortColumn::new("joinedAt").column("joinTime"),
            SortColumn::new("commentCount"),
            SortColumn::new("discussionCount"),
        ]
    }

    fn filters(&self) -> Vec<Filter> {
        vec![Filter::contains("q", &["username", "displayName"])]
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            Endpoint::show(),
            Endpoint::index().can("viewUserList").default_sort("username").paginate(),
            Endpoint::create(),
            Endpoint::update().authenticated(),
            Endpoint::delete().authenticated().admin(),
        ]
    }

    fn creating(&self, mut model: Model, _ctx: &Context) -> ApiResult<Model> {
        model.set("joinTime", timestamp_now());
        model.set("discussionCount", 0);
        model.set("commentCount", 0);
        model.set("isAdmin", false);
        Ok(model)
    }

    /// Usernames are unique across all users.
    fn save(&self, model: &mut Model, _ctx: &Context, tx: &StoreTx<'_>, _api: &JsonApi) -> ApiResult<()> {
        if let Some(username) = model.get_str("username") {
            let taken = tx
                .query(&Query::table(self.resource_type()).filter(Condition::eq("username", username)))?
                .into_iter()
                .any(|other| other.id != model.id);
            if taken {
                return Err(ApiError::ValidationFailed(vec![FieldError::attribute(
                    "username",
                    "The username has already been taken.",
                )]));
            }
        }
        tx.save(model)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(check_email(&Value::from("a@b.io")).is_ok());
        assert!(check_email(&Value::from("a@b")).is_err());
        assert!(check_email(&Value::from("@b.io")).is_err());
        assert!(check_email(&Value::from("a@b.")).is_err());
    }
}
