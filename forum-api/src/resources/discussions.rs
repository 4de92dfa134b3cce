use super::{ability, adjust_author_counter, adjust_user_counter, hidden_scope, hiding_fields, is_hidden, timestamp_now};
use crate::api::JsonApi;
use crate::context::Context;
use crate::endpoint::{Endpoint, EndpointKind};
use crate::error::{ApiError, ApiResult};
use crate::field::Field;
use crate::filter::Filter;
use crate::resource::Resource;
use crate::sort::SortColumn;
use forum_model::Model;
use forum_storage::{Column, Condition, OrderBy, Query, StoreTx};
use forum_types::RecordId;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// `<id>-<kebab-case title>`, ASCII only.
pub fn slugify(id: RecordId, title: &str) -> String {
    let mut slug = id.to_string();
    let mut pending_dash = true;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash {
                slug.push('-');
                pending_dash = false;
            }
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub struct Discussions;

impl Discussions {
    /// `?bySlug=1`: the id segment is a slug whose leading number is the id.
    fn find_by_slug(&self, slug: &str, ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<Option<Model>> {
        let head = slug.split('-').next().unwrap_or_default();
        let Ok(id) = RecordId::parse(head) else {
            return Ok(None);
        };
        Ok(tx.find(self.resource_type(), id, self.scope(ctx).as_ref())?)
    }

    fn create_first_post(&self, model: &mut Model, ctx: &Context, tx: &StoreTx<'_>, api: &JsonApi) -> ApiResult<()> {
        let id = model.id.ok_or(ApiError::NotFound)?;
        let content = ctx
            .body_pointer("/data/attributes/content")
            .cloned()
            .unwrap_or(Value::Null);
        let body = json!({
            "data": {
                "type": "posts",
                "attributes": { "content": content },
                "relationships": {
                    "discussion": { "data": { "type": "discussions", "id": id.to_string() } }
                }
            }
        });
        let post = api
            .process_within(tx, ctx, "posts", EndpointKind::Create, None, body, &["isFirstPost"])?
            .into_model()
            .ok_or(ApiError::NotFound)?;

        // Replying moved the discussion's counters; pick them up first.
        if let Some(fresh) = tx.find(self.resource_type(), id, None)? {
            model.attributes = fresh.attributes;
        }
        let post_id = post.id.map(|p| Value::from(p.get())).unwrap_or(Value::Null);
        model.set("firstPostId", post_id.clone());
        model.set("lastPostId", post_id);
        tx.update(model)?;
        debug!(discussion = %id, post = ?post.id, "Started discussion");
        Ok(())
    }
}

impl Resource for Discussions {
    fn resource_type(&self) -> &str {
        "discussions"
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::string("title")
                .required_on_create()
                .writable_when(|model, ctx| ctx.creating() || ctx.actor().can("rename", Some(model)))
                .min_length(3)
                .max_length(80),
            // Carried over to the first post; never stored here.
            Field::string("content")
                .hidden()
                .writable_on_create()
                .required_on_create()
                .max_length(63000)
                .set(|_, _, _| Ok(())),
            Field::string("slug").get(|model, _| match (model.id, model.get_str("title")) {
                (Some(id), Some(title)) => Value::from(slugify(id, title)),
                _ => Value::Null,
            }),
            Field::integer("commentCount"),
            Field::integer("participantCount"),
            Field::date_time("createdAt"),
            Field::date_time("lastPostedAt"),
            Field::integer("lastPostNumber"),
            ability("canReply", "reply"),
            ability("canRename", "rename"),
            ability("canDelete", "delete"),
            ability("canHide", "hide"),
        ];
        fields.extend(hiding_fields());
        fields.extend([
            Field::to_one("user", "users").includable(true),
            Field::to_one("firstPost", "posts").includable(true),
            Field::to_one("lastPostedUser", "users").includable(true),
            Field::to_one("lastPost", "posts").includable(true),
            Field::to_many("posts", "posts", "discussionId")
                .linkage_when(|_, ctx| ctx.showing() || ctx.creating()),
            // Set per listing from `filter[q]`; see `listed`.
            Field::to_one("mostRelevantPost", "posts")
                .visible_when(|_, ctx| ctx.listing())
                .includable(true),
            Field::to_one("hideUser", "users")
                .foreign_key("hiddenUserId")
                .visible_when(|model, _| is_hidden(model))
                .with_linkage(),
        ]);
        fields
    }

    fn sorts(&self) -> Vec<SortColumn> {
        vec![
            SortColumn::new("lastPostedAt").descending_alias("latest"),
            SortColumn::new("commentCount").descending_alias("top"),
            SortColumn::new("createdAt")
                .ascending_alias("oldest")
                .descending_alias("newest"),
        ]
    }

    fn filters(&self) -> Vec<Filter> {
        vec![
            Filter::exact("author", "userId"),
            Filter::new("q", |raw, ctx| {
                let in_posts = Condition::all([
                    Some(Condition::Contains {
                        columns: vec![Column::attribute("content")],
                        needle: raw.to_string(),
                    }),
                    hidden_scope(ctx),
                ]);
                Ok(Condition::Or(vec![
                    Condition::Contains {
                        columns: vec![Column::attribute("title")],
                        needle: raw.to_string(),
                    },
                    Condition::referenced_by("posts", "discussionId", in_posts),
                ]))
            }),
        ]
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            Endpoint::create()
                .authenticated()
                .can("startDiscussion")
                .default_include(["user", "lastPostedUser", "firstPost", "lastPost"]),
            Endpoint::update().authenticated(),
            Endpoint::delete().authenticated().can("delete"),
            Endpoint::show().default_include([
                "user",
                "lastPostedUser",
                "firstPost",
                "firstPost.discussion",
                "firstPost.user",
                "lastPost",
            ]),
            Endpoint::index()
                .default_include(["user", "lastPostedUser", "mostRelevantPost", "mostRelevantPost.user"])
                .default_sort("-lastPostedAt")
                .paginate(),
        ]
    }

    fn scope(&self, ctx: &Context) -> Option<Condition> {
        hidden_scope(ctx)
    }

    /// With `filter[q]`, each discussion points at its earliest visible
    /// post whose content matches.
    fn listed(&self, models: &mut [Model], ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<()> {
        let Some(needle) = ctx.query().get("filter[q]").filter(|q| !q.is_empty()) else {
            return Ok(());
        };
        for model in models.iter_mut() {
            let Some(id) = model.id else { continue };
            let query = Query::table("posts")
                .filter(Condition::eq("discussionId", id.get()))
                .filter(Condition::Contains {
                    columns: vec![Column::attribute("content")],
                    needle: needle.to_string(),
                })
                .filter_opt(hidden_scope(ctx))
                .order_by(OrderBy::asc(Column::attribute("number")))
                .order_by(OrderBy::asc(Column::Id))
                .limit(1);
            let relevant = tx.query(&query)?.into_iter().next().and_then(|post| post.id);
            model.set(
                "mostRelevantPostId",
                relevant.map_or(Value::Null, |post| Value::from(post.get())),
            );
        }
        Ok(())
    }

    fn find(&self, id: &str, ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<Option<Model>> {
        let by_slug = ctx
            .query()
            .get("bySlug")
            .is_some_and(|v| !matches!(v, "" | "0" | "false"));
        if by_slug {
            return self.find_by_slug(id, ctx, tx);
        }
        let Ok(id) = RecordId::parse(id) else {
            return Ok(None);
        };
        Ok(tx.find(self.resource_type(), id, self.scope(ctx).as_ref())?)
    }

    fn creating(&self, mut model: Model, ctx: &Context) -> ApiResult<Model> {
        let author = ctx.actor().id().map(|id| Value::from(id.get()));
        let now = timestamp_now();
        model.set("userId", author.unwrap_or(Value::Null));
        model.set("createdAt", now.clone());
        model.set("lastPostedAt", now);
        model.set("commentCount", 0);
        model.set("participantCount", 0);
        model.set("lastPostNumber", 0);
        model.set("isHidden", false);
        Ok(model)
    }

    fn save(&self, model: &mut Model, ctx: &Context, tx: &StoreTx<'_>, api: &JsonApi) -> ApiResult<()> {
        if model.exists() {
            tx.update(model)?;
            return Ok(());
        }
        tx.insert(model)?;
        adjust_author_counter(tx, model, "discussionCount", 1)?;
        self.create_first_post(model, ctx, tx, api)
    }

    fn delete(&self, model: &Model, _ctx: &Context, tx: &StoreTx<'_>) -> ApiResult<()> {
        let Some(id) = model.id else {
            return Ok(());
        };
        let in_discussion = Condition::eq("discussionId", id.get());
        let mut per_author: BTreeMap<RecordId, i64> = BTreeMap::new();
        for post in tx.query(&Query::table("posts").filter(in_discussion.clone()))? {
            if let Some(author) = post.get_id("userId") {
                *per_author.entry(author).or_default() += 1;
            }
        }
        let posts = tx.delete_where("posts", &in_discussion)?;
        tx.delete(self.resource_type(), id)?;
        adjust_author_counter(tx, model, "discussionCount", -1)?;
        for (author, removed) in per_author {
            adjust_user_counter(tx, author, "commentCount", -removed)?;
        }
        debug!(discussion = %id, posts, "Deleted discussion");
        Ok(())
    }
}
