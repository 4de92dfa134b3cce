//! Stock forum resources.
//!
//! - [`Discussions`]: threads; creating one also creates its first post
//! - [`Posts`]: replies, numbered per discussion
//! - [`Users`]: accounts
//! - [`Forum`]: settings-backed singleton served at `/api`
//!
//! Extensions customise these through [`crate::ApiResource`] patches rather
//! than by editing the declarations here.

mod discussions;
mod forum;
mod posts;
mod users;

pub use discussions::{slugify, Discussions};
pub use forum::Forum;
pub use posts::Posts;
pub use users::Users;

use crate::context::Context;
use crate::error::ApiResult;
use crate::field::Field;
use crate::resource::Resource;
use forum_model::Model;
use forum_storage::{Condition, StoreTx};
use forum_types::{format_timestamp, now, RecordId};
use serde_json::Value;
use std::sync::Arc;

/// Every stock resource, in registration order.
pub fn builtin() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(Forum),
        Arc::new(Users),
        Arc::new(Discussions),
        Arc::new(Posts),
    ]
}

pub(crate) fn timestamp_now() -> Value {
    Value::from(format_timestamp(&now()))
}

/// Hidden records are visible only to their author and to actors who can
/// `hide`.
pub(crate) fn hidden_scope(ctx: &Context) -> Option<Condition> {
    let actor = ctx.actor();
    if actor.can("hide", None) {
        return None;
    }
    let mut visible = vec![
        Condition::is_null("isHidden"),
        Condition::eq("isHidden", false),
    ];
    if let Some(id) = actor.id() {
        visible.push(Condition::eq("userId", id.get()));
    }
    Some(Condition::Or(visible))
}

/// Boolean attribute reporting whether the actor holds `capability` on the
/// record.
pub(crate) fn ability(name: &str, capability: &'static str) -> Field {
    Field::boolean(name).get(move |model, ctx| Value::Bool(ctx.actor().can(capability, Some(model))))
}

/// `isHidden`/`hiddenAt` pair shared by discussions and posts. Only
/// present on hidden records; actors who can `hide` toggle it on update.
pub(crate) fn hiding_fields() -> Vec<Field> {
    vec![
        Field::boolean("isHidden")
            .visible_when(|model, _| is_hidden(model))
            .writable_when(|model, ctx| ctx.updating() && ctx.actor().can("hide", Some(model)))
            .set(|model, value, ctx| {
                let hide = value.as_bool().unwrap_or(false);
                model.set("isHidden", hide);
                if hide {
                    model.set("hiddenAt", timestamp_now());
                    let hider = ctx.actor().id().map(|id| Value::from(id.get()));
                    model.set("hiddenUserId", hider.unwrap_or(Value::Null));
                } else {
                    model.set("hiddenAt", Value::Null);
                    model.set("hiddenUserId", Value::Null);
                }
                Ok(())
            }),
        Field::date_time("hiddenAt").visible_when(|model, _| is_hidden(model)),
    ]
}

pub(crate) fn is_hidden(model: &Model) -> bool {
    model.get_bool("isHidden") == Some(true)
}

/// Adds `delta` to an integer counter on the author of `model`, if the
/// author still exists.
pub(crate) fn adjust_author_counter(tx: &StoreTx<'_>, model: &Model, key: &str, delta: i64) -> ApiResult<()> {
    match model.get_id("userId") {
        Some(author) => adjust_user_counter(tx, author, key, delta),
        None => Ok(()),
    }
}

/// Counters never drop below zero.
pub(crate) fn adjust_user_counter(tx: &StoreTx<'_>, user_id: RecordId, key: &str, delta: i64) -> ApiResult<()> {
    if let Some(mut user) = tx.find("users", user_id, None)? {
        let current = user.get_i64(key).unwrap_or(0);
        user.set(key, current.saturating_add(delta).max(0));
        tx.update(&user)?;
    }
    Ok(())
}
