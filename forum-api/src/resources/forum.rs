use crate::api::FORUM_ID;
use crate::context::Context;
use crate::endpoint::Endpoint;
use crate::error::ApiResult;
use crate::field::Field;
use crate::resource::{Resource, ABSTRACT_RESOURCE};
use forum_model::Model;
use forum_storage::StoreTx;
use forum_types::RecordId;
use serde_json::Value;

/// The forum itself. Not stored: every attribute comes from the resolved
/// settings of this resource.
pub struct Forum;

fn setting_field(name: &'static str) -> Field {
    Field::string(name).get(move |_, ctx| ctx.setting(name).cloned().unwrap_or(Value::Null))
}

impl Resource for Forum {
    fn resource_type(&self) -> &str {
        "forum"
    }

    fn ancestors(&self) -> Vec<String> {
        vec![ABSTRACT_RESOURCE.to_string()]
    }

    fn stored(&self) -> bool {
        false
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            setting_field("title"),
            setting_field("description"),
            setting_field("welcomeMessage"),
            setting_field("baseUrl"),
            Field::boolean("canStartDiscussion")
                .get(|_, ctx| Value::Bool(ctx.actor().can("startDiscussion", None))),
            Field::boolean("canViewUserList")
                .get(|_, ctx| Value::Bool(ctx.actor().can("viewUserList", None))),
            Field::string("adminUrl")
                .visible_when(|_, ctx| ctx.actor().is_admin())
                .get(|_, ctx| match ctx.setting("baseUrl").and_then(Value::as_str) {
                    Some(base) => Value::from(format!("{}/admin", base.trim_end_matches('/'))),
                    None => Value::Null,
                }),
        ]
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![Endpoint::show()]
    }

    fn settings(&self) -> Vec<(String, Value)> {
        [
            ("title", "Agora"),
            ("description", ""),
            ("welcomeMessage", "Welcome to the forum."),
            ("baseUrl", "http://localhost:8080"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::from(value)))
        .collect()
    }

    fn find(&self, id: &str, _ctx: &Context, _tx: &StoreTx<'_>) -> ApiResult<Option<Model>> {
        Ok((id == FORUM_ID).then(|| Model::new("forum").with_id(RecordId::new(1))))
    }
}
