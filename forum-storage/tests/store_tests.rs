use forum_model::Model;
use forum_storage::{Column, Condition, OrderBy, Query, SqliteStore, StorageError};
use forum_types::RecordId;
use pretty_assertions::assert_eq;
use serde_json::json;

fn store() -> SqliteStore {
    SqliteStore::open_in_memory(&["discussions", "posts"]).unwrap()
}

fn insert(store: &SqliteStore, model: Model) -> RecordId {
    store
        .transaction(|tx| {
            let mut model = model;
            tx.insert(&mut model)
        })
        .unwrap()
}

fn count(store: &SqliteStore, table: &str) -> usize {
    store
        .transaction(|tx| tx.count(table, None))
        .unwrap()
}

// ── Basic CRUD ───────────────────────────────────────────────────

#[test]
fn insert_assigns_sequential_ids_per_table() {
    let s = store();
    assert_eq!(insert(&s, Model::new("discussions")), RecordId::new(1));
    assert_eq!(insert(&s, Model::new("discussions")), RecordId::new(2));
    assert_eq!(insert(&s, Model::new("posts")), RecordId::new(1));
}

#[test]
fn find_returns_stored_attributes() {
    let s = store();
    let id = insert(&s, Model::new("discussions").with("title", "Hello").with("commentCount", 2));

    let found = s
        .transaction(|tx| tx.find("discussions", id, None))
        .unwrap()
        .unwrap();
    assert_eq!(found.id, Some(id));
    assert_eq!(found.resource_type, "discussions");
    assert_eq!(found.get_str("title"), Some("Hello"));
    assert_eq!(found.get_i64("commentCount"), Some(2));
}

#[test]
fn find_outside_scope_looks_missing() {
    let s = store();
    let hidden = insert(&s, Model::new("discussions").with("hiddenAt", "2024-01-01T00:00:00Z"));
    let scope = Condition::is_null("hiddenAt");

    let in_scope = s
        .transaction(|tx| tx.find("discussions", hidden, Some(&scope)))
        .unwrap();
    let missing = s
        .transaction(|tx| tx.find("discussions", RecordId::new(99), Some(&scope)))
        .unwrap();
    assert_eq!(in_scope, None);
    assert_eq!(missing, None);
}

#[test]
fn update_and_delete() {
    let s = store();
    let id = insert(&s, Model::new("posts").with("content", "first"));

    s.transaction(|tx| {
        let mut post = tx.find("posts", id, None)?.unwrap();
        post.set("content", "edited");
        tx.update(&post)
    })
    .unwrap();
    let post = s.transaction(|tx| tx.find("posts", id, None)).unwrap().unwrap();
    assert_eq!(post.get_str("content"), Some("edited"));

    assert!(s.transaction(|tx| tx.delete("posts", id)).unwrap());
    assert!(!s.transaction(|tx| tx.delete("posts", id)).unwrap());
    assert_eq!(count(&s, "posts"), 0);
}

#[test]
fn update_of_missing_row_is_not_found() {
    let s = store();
    let ghost = Model::new("posts").with_id(RecordId::new(5));
    let err = s.transaction(|tx| tx.update(&ghost)).unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[test]
fn unknown_table_is_rejected() {
    let s = store();
    let err = s
        .transaction(|tx| tx.count("users", None))
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownTable(t) if t == "users"));
}

// ── Transactions ─────────────────────────────────────────────────

#[test]
fn failed_transaction_rolls_back_every_write() {
    let s = store();
    let result: Result<(), StorageError> = s.transaction(|tx| {
        tx.insert(&mut Model::new("discussions").with("title", "orphan"))?;
        tx.insert(&mut Model::new("posts").with("content", "first"))?;
        Err(StorageError::InvalidData("second step failed".into()))
    });

    assert!(result.is_err());
    assert_eq!(count(&s, "discussions"), 0);
    assert_eq!(count(&s, "posts"), 0);
}

#[test]
fn successful_transaction_commits() {
    let s = store();
    s.transaction(|tx| {
        tx.insert(&mut Model::new("discussions"))?;
        tx.insert(&mut Model::new("posts"))?;
        Ok::<_, StorageError>(())
    })
    .unwrap();
    assert_eq!(count(&s, "discussions"), 1);
    assert_eq!(count(&s, "posts"), 1);
}

// ── Queries ──────────────────────────────────────────────────────

#[test]
fn order_with_id_tiebreak_is_total() {
    let s = store();
    for n in [3, 1, 3, 2, 3] {
        insert(&s, Model::new("discussions").with("commentCount", n));
    }

    let q = Query::table("discussions")
        .order_by(OrderBy::desc(Column::attribute("commentCount")))
        .order_by(OrderBy::asc(Column::Id));
    let ids: Vec<i64> = s
        .transaction(|tx| tx.query(&q))
        .unwrap()
        .iter()
        .map(|m| m.id.unwrap().get())
        .collect();
    assert_eq!(ids, vec![1, 3, 5, 4, 2]);
}

#[test]
fn limit_and_offset_page_through_results() {
    let s = store();
    for _ in 0..5 {
        insert(&s, Model::new("posts"));
    }
    let page = Query::table("posts")
        .order_by(OrderBy::asc(Column::Id))
        .limit(2)
        .offset(2);
    let ids: Vec<i64> = s
        .transaction(|tx| tx.query(&page))
        .unwrap()
        .iter()
        .map(|m| m.id.unwrap().get())
        .collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn contains_is_case_insensitive_and_literal() {
    let s = store();
    insert(&s, Model::new("discussions").with("title", "Rust Is Great"));
    insert(&s, Model::new("discussions").with("title", "100% Sale"));
    insert(&s, Model::new("discussions").with("title", "Other"));

    let search = |needle: &str| {
        let q = Query::table("discussions").filter(Condition::Contains {
            columns: vec![Column::attribute("title")],
            needle: needle.to_string(),
        });
        s.transaction(|tx| tx.query(&q)).unwrap().len()
    };
    assert_eq!(search("rust"), 1);
    assert_eq!(search("%"), 1);
    assert_eq!(search("zzz"), 0);
}

#[test]
fn boolean_equality_matches_json_booleans() {
    let s = store();
    insert(&s, Model::new("posts").with("isApproved", true));
    insert(&s, Model::new("posts").with("isApproved", false));
    let q = Query::table("posts").filter(Condition::eq("isApproved", json!(true)));
    assert_eq!(s.transaction(|tx| tx.query(&q)).unwrap().len(), 1);
}

#[test]
fn delete_where_removes_matching_rows() {
    let s = store();
    insert(&s, Model::new("posts").with("discussionId", 1));
    insert(&s, Model::new("posts").with("discussionId", 1));
    insert(&s, Model::new("posts").with("discussionId", 2));

    let removed = s
        .transaction(|tx| tx.delete_where("posts", &Condition::eq("discussionId", 1)))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(count(&s, "posts"), 1);
}

// ── On-disk ──────────────────────────────────────────────────────

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forum.db");
    {
        let s = SqliteStore::open(&path, &["users"]).unwrap();
        insert(&s, Model::new("users").with("username", "alice"));
    }
    let s = SqliteStore::open(&path, &["users"]).unwrap();
    let user = s
        .transaction(|tx| tx.find("users", RecordId::new(1), None))
        .unwrap()
        .unwrap();
    assert_eq!(user.get_str("username"), Some("alice"));
}

#[test]
fn references_follow_the_parent_condition() {
    let s = store();
    let open = insert(&s, Model::new("discussions").with("isHidden", false));
    let hidden = insert(&s, Model::new("discussions").with("isHidden", true));
    insert(&s, Model::new("posts").with("discussionId", open.get()));
    insert(&s, Model::new("posts").with("discussionId", hidden.get()));
    insert(&s, Model::new("posts").with("discussionId", 99));

    let q = Query::table("posts").filter(Condition::references(
        "discussionId",
        "discussions",
        Some(Condition::eq("isHidden", json!(false))),
    ));
    let posts = s.transaction(|tx| tx.query(&q)).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].get_i64("discussionId"), Some(open.get()));

    let any_parent = Condition::references("discussionId", "discussions", None);
    assert_eq!(s.transaction(|tx| tx.count("posts", Some(&any_parent))).unwrap(), 2);

    let with_posts = Condition::referenced_by("posts", "discussionId", None);
    assert_eq!(s.transaction(|tx| tx.count("discussions", Some(&with_posts))).unwrap(), 2);
    insert(&s, Model::new("discussions").with("isHidden", false));
    assert_eq!(s.transaction(|tx| tx.count("discussions", Some(&with_posts))).unwrap(), 2);
}
