use super::{ability, adjust_author_counter, hidden_scope, hiding_fields, timestamp_now};
use crate::api::JsonApi;
use crate::context::Context;
use crate::endpoint::Endpoint;
use crate::error::{ApiError, ApiResult, FieldError};
use crate::field::Field;
use crate::filter::Filter;
use crate::resource::Resource;
use crate::sort::SortColumn;
use forum_model::Model;
use forum_storage::{Column, Condition, OrderBy, Query, StoreTx};
use forum_types::RecordId;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

pub struct Posts;

/// Recomputes a discussion's reply counters and last-post pointers from
/// the posts it currently has.
fn refresh_discussion(tx: &StoreTx<'_>, discussion_id: RecordId) -> ApiResult<()> {
    let Some(mut discussion) = tx.find("discussions", discussion_id, None)? else {
        return Ok(());
    };
    let posts = tx.query(
        &Query::table("posts")
            .filter(Condition::eq("discussionId", discussion_id.get()))
            .order_by(OrderBy::asc(Column::Id)),
    )?;
    let participants: BTreeSet<i64> = posts.iter().filter_map(|p| p.get_i64("userId")).collect();
    discussion.set("commentCount", posts.len());
    discussion.set("participantCount", participants.len());

    let last = posts.last();
    let pointer = |key: &str| last.and_then(|p| p.get(key)).cloned().unwrap_or(Value::Null);
    discussion.set("lastPostId", last.and_then(|p| p.id).map_or(Value::Null, |id| Value::from(id.get())));
    discussion.set("lastPostedAt", pointer("createdAt"));
    discussion.set("lastPostedUserId", pointer("userId"));
    tx.update(&discussion)?;
    Ok(())
}

impl Resource for Posts {
    fn resource_type(&self) -> &str {
        "posts"
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::integer("number"),
            Field::date_time("createdAt"),
            Field::string("contentType"),
            Field::string("content")
                .required_on_create()
                .writable_when(|model, ctx| {
                    ctx.creating() || (ctx.updating() && ctx.actor().can("edit", Some(model)))
                })
                .min_length(1)
                .max_length(63000)
                .set(|model, value, ctx| {
                    if ctx.updating() {
                        model.set("editedAt", timestamp_now());
                        let editor = ctx.actor().id().map(|id| Value::from(id.get()));
                        model.set("editedUserId", editor.unwrap_or(Value::Null));
                    }
                    model.set("content", value);
                    Ok(())
                }),
            Field::date_time("editedAt").visible_when(|model, _| model.get("editedAt").is_some()),
            ability("canEdit", "edit"),
            ability("canDelete", "delete"),
            ability("canHide", "hide"),
        ];
        fields.extend(hiding_fields());
        fields.extend([
            Field::to_one("discussion", "discussions")
                .required_on_create()
                .writable_when(|_, ctx| {
                    ctx.creating() && (ctx.flag("isFirstPost") || ctx.actor().can("reply", None))
                })
                .includable(true)
                .with_linkage(),
            Field::to_one("user", "users").includable(true).with_linkage(),
        ]);
        fields
    }

    fn sorts(&self) -> Vec<SortColumn> {
        vec![SortColumn::new("createdAt"), SortColumn::new("number")]
    }

    fn filters(&self) -> Vec<Filter> {
        vec![
            Filter::exact("discussion", "discussionId"),
            Filter::exact("author", "userId"),
        ]
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            Endpoint::create().authenticated(),
            Endpoint::update().authenticated(),
            Endpoint::delete().authenticated().can("delete"),
            Endpoint::show().default_include(["user", "discussion"]),
            Endpoint::index().default_sort("createdAt").paginate(),
        ]
    }

    /// A post is visible when it and its discussion both are.
    fn scope(&self, ctx: &Context) -> Option<Condition> {
        let visible = hidden_scope(ctx)?;
        let in_visible_discussion = Condition::references("discussionId", "discussions", Some(visible.clone()));
        Some(visible.and(in_visible_discussion))
    }

    fn creating(&self, mut model: Model, ctx: &Context) -> ApiResult<Model> {
        let author = ctx.actor().id().map(|id| Value::from(id.get()));
        model.set("userId", author.unwrap_or(Value::Null));
        model.set("createdAt", timestamp_now());
        model.set("contentType", "comment");
        model.set("isHidden", false);
        Ok(model)
    }

    /// New posts take the next number in their discussion.
    fn save(&self, model: &mut Model, _ctx: &Context, tx: &StoreTx<'_>, _api: &JsonApi) -> ApiResult<()> {
        if model.exists() {
            tx.update(model)?;
            return Ok(());
        }
        let discussion_id = model.get_id("discussionId").ok_or_else(|| {
            ApiError::ValidationFailed(vec![FieldError::relationship(
                "discussion",
                "The discussion field is required.",
            )])
        })?;
        let mut discussion = tx
            .find("discussions", discussion_id, None)?
            .ok_or(ApiError::NotFound)?;
        let number = discussion.get_i64("lastPostNumber").unwrap_or(0) + 1;
        model.set("number", number);
        tx.insert(model)?;

        discussion.set("lastPostNumber", number);
        tx.update(&discussion)?;
        refresh_discussion(tx, discussion_id)?;
        adjust_author_counter(tx, model, "commentCount", 1)?;
        debug!(discussion = %discussion_id, number, post = ?model.id, "Posted reply");
        Ok(())
    }

    fn delete(&self, model: &Model, _ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<()> {
        let Some(id) = model.id else {
            return Ok(());
        };
        tx.delete(self.resource_type(), id)?;
        adjust_author_counter(tx, model, "commentCount", -1)?;
        if let Some(discussion_id) = model.get_id("discussionId") {
            refresh_discussion(tx, discussion_id)?;
        }
        Ok(())
    }
}
