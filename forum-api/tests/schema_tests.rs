mod common;

use common::{field_names, widgets_registry};
use forum_api::{
    ApiResource, ApiResult, ConfigurationError, Context, EndpointKind, Field, FieldKind, PatchOp, SchemaRegistry,
    ABSTRACT_DATABASE_RESOURCE, ABSTRACT_RESOURCE,
};
use forum_model::{Actor, Model};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::Value;
use std::sync::{Arc, Mutex};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn creating_ctx(registry: &SchemaRegistry, resource_type: &str) -> Context {
    Context::new(
        Arc::new(Actor::guest()),
        registry.build(resource_type).unwrap(),
        EndpointKind::Create,
    )
}

// ── Two-tier merge ───────────────────────────────────────────────

#[test]
fn ancestor_additions_survive_specific_replacement() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new(ABSTRACT_RESOURCE).fields(|| vec![Field::boolean("isFeatured")]));
    registry.extend(
        ApiResource::new("widgets").fields(|| vec![Field::string("title").writable().max_length(5)]),
    );

    assert_eq!(field_names(&registry, "widgets"), names(&["title", "body", "isFeatured"]));

    // The replacement took over the whole field, constraints included.
    let ctx = creating_ctx(&registry, "widgets");
    let schema = registry.build("widgets").unwrap();
    let title = schema.field("title").unwrap();
    assert!(title.check(&Value::from("ab"), &Model::new("widgets"), &ctx).is_ok());
    assert!(title.check(&Value::from("too long"), &Model::new("widgets"), &ctx).is_err());
}

#[test]
fn most_specific_level_wins_regardless_of_registration_order() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").fields(|| vec![Field::integer("rank")]));
    registry.extend(ApiResource::new(ABSTRACT_DATABASE_RESOURCE).fields(|| vec![Field::string("rank")]));

    let schema = registry.build("widgets").unwrap();
    assert_eq!(schema.field("rank").unwrap().kind(), &FieldKind::Integer);
}

#[test]
fn later_registration_wins_within_a_level() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").fields(|| vec![Field::string("color")]));
    registry.extend(ApiResource::new("widgets").fields(|| vec![Field::integer("color")]));

    let schema = registry.build("widgets").unwrap();
    assert_eq!(schema.field("color").unwrap().kind(), &FieldKind::Integer);
}

#[test]
fn insert_ordering_across_levels() {
    let mut registry = widgets_registry();
    // Registered first but at the exact level, so applied last.
    registry.extend(ApiResource::new("widgets").fields_before("title", || vec![Field::string("x")]));
    registry.extend(ApiResource::new(ABSTRACT_RESOURCE).fields_after("title", || vec![Field::string("y")]));

    assert_eq!(field_names(&registry, "widgets"), names(&["x", "title", "y", "body"]));
}

#[test]
fn insert_after_keeps_batch_order() {
    let mut registry = widgets_registry();
    registry.extend(
        ApiResource::new("widgets")
            .fields_after("title", || vec![Field::string("a"), Field::string("b"), Field::string("c")]),
    );

    assert_eq!(field_names(&registry, "widgets"), names(&["title", "a", "b", "c", "body"]));
}

#[test]
fn unknown_insert_anchor_fails_at_boot() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").fields_before("doesNotExist", || vec![Field::string("x")]));

    match registry.boot() {
        Err(ConfigurationError::UnknownKey { key, .. }) => assert_eq!(key, "doesNotExist"),
        other => panic!("expected UnknownKey, got {:?}", other.err()),
    }
}

#[test]
fn removing_missing_fields_is_a_no_op() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").remove_fields(["nope", "body"]));

    assert_eq!(field_names(&registry, "widgets"), names(&["title"]));
}

#[test]
fn mutate_missing_field_is_an_error() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").field("nope", |f| f.hidden()));

    assert!(matches!(
        registry.build("widgets"),
        Err(ConfigurationError::UnknownKey { .. })
    ));
}

#[test]
fn duplicate_field_in_one_batch_is_rejected() {
    let mut registry = widgets_registry();
    registry.extend(
        ApiResource::new("widgets").fields(|| vec![Field::string("dup"), Field::integer("dup")]),
    );

    assert!(matches!(
        registry.build("widgets"),
        Err(ConfigurationError::DuplicateField { .. })
    ));
}

#[test]
fn writable_to_many_is_rejected() {
    let mut registry = widgets_registry();
    registry.extend(
        ApiResource::new("widgets").fields(|| vec![Field::to_many("parts", "widgets", "widgetId").writable()]),
    );

    assert!(matches!(
        registry.build("widgets"),
        Err(ConfigurationError::InvalidField { .. })
    ));
}

#[test]
fn unknown_patch_target_fails_at_boot() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("gadgets").fields(Vec::new));

    assert!(matches!(
        registry.boot(),
        Err(ConfigurationError::UnknownTarget(target)) if target == "gadgets"
    ));
}

#[test]
fn duplicate_endpoint_is_rejected() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").endpoints(|| {
        vec![forum_api::Endpoint::show(), forum_api::Endpoint::show()]
    }));

    assert!(matches!(
        registry.build("widgets"),
        Err(ConfigurationError::DuplicateEndpoint { .. })
    ));
}

#[test]
fn configuring_a_missing_endpoint() {
    // On the type itself this is a mistake.
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").remove_endpoints([EndpointKind::Delete]));
    registry.extend(ApiResource::new("widgets").endpoint(EndpointKind::Delete, |e| e.admin()));
    assert!(registry.build("widgets").is_err());

    // From an ancestor it only touches types that have the endpoint.
    let mut registry = SchemaRegistry::with_builtin_resources().unwrap();
    registry.extend(ApiResource::new(ABSTRACT_RESOURCE).endpoint(EndpointKind::Delete, |e| e.admin()));
    assert!(registry.build("forum").unwrap().endpoint(EndpointKind::Delete).is_none());
    let posts = registry.build("posts").unwrap();
    assert!(posts.endpoint(EndpointKind::Delete).unwrap().requires_admin());
}

#[test]
fn settings_follow_specificity() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").setting("color", "red"));
    registry.extend(ApiResource::new(ABSTRACT_RESOURCE).setting("color", "blue").setting("size", 3));

    let schema = registry.build("widgets").unwrap();
    assert_eq!(schema.setting("color"), Some(&Value::from("red")));
    assert_eq!(schema.setting("size"), Some(&Value::from(3)));
}

#[test]
fn build_is_cached_and_compile_matches() {
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").fields(|| vec![Field::string("extra")]));

    let first = registry.build("widgets").unwrap();
    let second = registry.build("widgets").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.compile("widgets").unwrap().field_names(), first.field_names());

    // Registering a new patch invalidates the cache.
    registry.register("widgets", PatchOp::RemoveFields(vec!["extra".into()]));
    assert_eq!(field_names(&registry, "widgets"), names(&["title", "body"]));
}

#[test]
fn merge_plan_orders_by_specificity_then_registration() {
    let mut registry = widgets_registry();
    registry.register(ABSTRACT_RESOURCE, PatchOp::RemoveSetting("a".into()));
    registry.register("widgets", PatchOp::RemoveSetting("b".into()));
    registry.register(ABSTRACT_DATABASE_RESOURCE, PatchOp::RemoveSetting("c".into()));
    registry.register("widgets", PatchOp::RemoveSetting("d".into()));

    let plan = registry.resolve("widgets").unwrap();
    let order: Vec<(usize, String)> = plan
        .by_specificity()
        .map(|(level, patch)| (level, patch.target.clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            (0, "widgets".to_string()),
            (0, "widgets".to_string()),
            (1, ABSTRACT_DATABASE_RESOURCE.to_string()),
            (2, ABSTRACT_RESOURCE.to_string()),
        ]
    );
    let sequences: Vec<usize> = plan.by_specificity().map(|(_, p)| p.sequence).collect();
    assert_eq!(sequences, vec![1, 3, 2, 0]);
}

// ── Field setters observe earlier fields ─────────────────────────

#[test]
fn setters_run_in_declaration_order() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let mut registry = widgets_registry();
    registry.extend(ApiResource::new("widgets").fields_after("title", move || {
        let log = Arc::clone(&log);
        vec![Field::string("check").writable().nullable().apply_when_absent().set(
            move |model, _value, _ctx| -> ApiResult<()> {
                let title = model.get_str("title").unwrap_or("<unset>").to_string();
                log.lock().unwrap().push(title);
                Ok(())
            },
        )]
    }));
    let api = forum_api::JsonApi::open(registry, forum_api::ApiConfig::default(), None).unwrap();

    let response = common::send_with(
        &api,
        common::guest(),
        "POST",
        "/api/widgets",
        "",
        serde_json::json!({ "data": { "type": "widgets", "attributes": { "title": "Gadget" } } }),
    );
    assert_eq!(response.status, 201);
    assert_eq!(*seen.lock().unwrap(), vec!["Gadget".to_string()]);
}

#[test]
fn absent_fields_applied_without_a_value_are_required() {
    let mut registry = widgets_registry();
    registry.extend(
        ApiResource::new("widgets").fields_after("title", || vec![Field::string("colour").writable().apply_when_absent()]),
    );
    let api = forum_api::JsonApi::open(registry, forum_api::ApiConfig::default(), None).unwrap();
    let create = |attributes: Value| {
        common::send_with(
            &api,
            common::guest(),
            "POST",
            "/api/widgets",
            "",
            serde_json::json!({ "data": { "type": "widgets", "attributes": attributes } }),
        )
    };
    let detail = |response: &forum_api::ApiResponse| {
        common::document(response)["errors"][0]["detail"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    };

    let absent = create(serde_json::json!({ "title": "Gadget" }));
    assert_eq!(absent.status, 422);
    assert_eq!(common::error_pointers(&absent), vec!["/data/attributes/colour"]);
    assert_eq!(detail(&absent), "The colour field is required.");

    let null = create(serde_json::json!({ "title": "Gadget", "colour": null }));
    assert_eq!(null.status, 422);
    assert_eq!(detail(&null), "The colour field must not be null.");

    assert_eq!(create(serde_json::json!({ "title": "Gadget", "colour": "red" })).status, 201);
}

// ── Properties ───────────────────────────────────────────────────

const TARGETS: [&str; 3] = ["widgets", ABSTRACT_DATABASE_RESOURCE, ABSTRACT_RESOURCE];
const POOL: [&str; 5] = ["alpha", "beta", "gamma", "delta", "title"];

fn registry_from(patches: &[(usize, usize)]) -> SchemaRegistry {
    let mut registry = widgets_registry();
    for &(target, name) in patches {
        let name = POOL[name];
        registry.extend(ApiResource::new(TARGETS[target]).fields(move || vec![Field::string(name)]));
    }
    registry
}

proptest! {
    #[test]
    fn merge_is_deterministic(patches in prop::collection::vec((0usize..3, 0usize..5), 0..12)) {
        let a = field_names(&registry_from(&patches), "widgets");
        let b = field_names(&registry_from(&patches), "widgets");
        prop_assert_eq!(&a, &b);

        let registry = registry_from(&patches);
        let compiled = registry.compile("widgets").unwrap();
        let built = registry.build("widgets").unwrap();
        prop_assert_eq!(compiled.field_names(), built.field_names());
    }

    #[test]
    fn additions_accumulate_without_duplicates(patches in prop::collection::vec((0usize..3, 0usize..5), 0..12)) {
        let result = field_names(&registry_from(&patches), "widgets");
        for &(_, name) in &patches {
            prop_assert!(result.iter().any(|n| n == POOL[name]));
        }
        prop_assert!(result.contains(&"body".to_string()));
        let mut unique = result.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), result.len());
        // Replacements keep the core fields where they were.
        prop_assert_eq!(&result[..2], &["title".to_string(), "body".to_string()][..]);
    }
}
