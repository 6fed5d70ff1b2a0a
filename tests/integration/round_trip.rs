#![allow(missing_docs)]

use std::sync::Arc;

use forest_cache::document::{ArgValue, Directive, Document, DocumentBuilder, FieldBuilder, SelectionSetBuilder};
use forest_cache::{CacheOptions, ForestCache, OperationRequest, PossibleTypes, Result};
use serde_json::json;

fn chat_document() -> Arc<Document> {
    DocumentBuilder::query("ChatView")
        .variable("chatId")
        .variable_with_default("first", json!(2))
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("chat")
                .arg("id", ArgValue::var("chatId"))
                .typed("Chat")
                .select(
                    SelectionSetBuilder::new()
                        .field("__typename")
                        .field("id")
                        .field("title")
                        .field("tags")
                        .field_with(
                            FieldBuilder::new("messages")
                                .arg("first", ArgValue::var("first"))
                                .typed("Message")
                                .select(
                                    SelectionSetBuilder::new()
                                        .field("id")
                                        .field("text")
                                        .field_with(
                                            FieldBuilder::new("author").typed("User").select(
                                                SelectionSetBuilder::new().field("id").field("name"),
                                            ),
                                        ),
                                ),
                        ),
                ),
        ))
        .build()
}

fn chat_request(chat_id: &str) -> OperationRequest {
    OperationRequest::new(chat_document()).variables(json!({ "chatId": chat_id }))
}

#[test]
fn written_results_read_back_unchanged() -> Result<()> {
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let result = json!({
        "chat": {
            "__typename": "Chat",
            "id": "c1",
            "title": "General",
            "tags": ["pinned", "team"],
            "messages": [
                {"id": "m1", "text": "hi", "author": {"id": "u1", "name": "Ann"}},
                {"id": "m2", "text": "hey", "author": null}
            ]
        }
    });
    let report = cache.write(chat_request("c1"), &result)?;
    assert!(report.cached);
    assert!(report.complete);
    assert_eq!(report.nodes_written, 5);

    let read = cache.read(chat_request("c1"))?;
    assert!(read.complete);
    assert!(read.missing.is_empty());
    assert_eq!(read.data, result);
    Ok(())
}

#[test]
fn typename_is_answered_without_being_written() -> Result<()> {
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let result = json!({
        "chat": {"id": "c1", "title": null, "tags": [], "messages": []}
    });
    let report = cache.write(chat_request("c1"), &result)?;
    assert!(report.complete);

    let read = cache.read(chat_request("c1"))?;
    assert!(read.complete);
    assert_eq!(read.data["chat"]["__typename"], json!("Chat"));
    assert_eq!(read.data["chat"]["title"], json!(null));
    assert_eq!(read.data["chat"]["messages"], json!([]));
    Ok(())
}

#[test]
fn different_variables_are_separate_operations() -> Result<()> {
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let first = cache.write(
        chat_request("c1"),
        &json!({"chat": {"id": "c1", "title": "One", "tags": [], "messages": []}}),
    )?;
    let second = cache.write(
        chat_request("c2"),
        &json!({"chat": {"id": "c2", "title": "Two", "tags": [], "messages": []}}),
    )?;
    assert_ne!(first.operation, second.operation);
    assert_eq!(cache.stats().retained_operations, 2);

    assert_eq!(cache.read(chat_request("c1"))?.data["chat"]["title"], json!("One"));
    assert_eq!(cache.read(chat_request("c2"))?.data["chat"]["title"], json!("Two"));
    Ok(())
}

#[test]
fn aliases_keep_argument_variants_apart() -> Result<()> {
    let doc = DocumentBuilder::query("Feeds")
        .select(
            SelectionSetBuilder::new()
                .field_with(
                    FieldBuilder::new("feed")
                        .alias("latest")
                        .arg("first", 1i64)
                        .typed("Post")
                        .select(SelectionSetBuilder::new().field("id")),
                )
                .field_with(
                    FieldBuilder::new("feed")
                        .alias("page")
                        .arg("first", 3i64)
                        .typed("Post")
                        .select(SelectionSetBuilder::new().field("id")),
                ),
        )
        .build();
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let result = json!({
        "latest": [{"id": "p3"}],
        "page": [{"id": "p3"}, {"id": "p2"}, {"id": "p1"}]
    });
    cache.write(OperationRequest::new(doc.clone()), &result)?;

    let read = cache.read(OperationRequest::new(doc))?;
    assert!(read.complete);
    assert_eq!(read.data, result);
    Ok(())
}

#[test]
fn skipped_fields_are_neither_written_nor_required() -> Result<()> {
    let doc = DocumentBuilder::query("Profile")
        .variable("brief")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("viewer").typed("User").select(
                SelectionSetBuilder::new().field("id").field_with(
                    FieldBuilder::new("bio")
                        .directive(Directive::skip(ArgValue::var("brief"))),
                ),
            ),
        ))
        .build();
    let brief = || OperationRequest::new(doc.clone()).variables(json!({"brief": true}));
    let full = || OperationRequest::new(doc.clone()).variables(json!({"brief": false}));

    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let report = cache.write(brief(), &json!({"viewer": {"id": "u1"}}))?;
    assert!(report.complete);
    let read = cache.read(brief())?;
    assert!(read.complete);
    assert_eq!(read.data, json!({"viewer": {"id": "u1"}}));

    // The same entity read with the field included reports it missing.
    let read = cache.read(full())?;
    assert!(!read.complete);
    assert_eq!(read.missing.len(), 1);
    assert_eq!(read.missing[0].to_string(), "viewer.bio");
    Ok(())
}

#[test]
fn abstract_fragments_match_through_possible_types() -> Result<()> {
    let doc = DocumentBuilder::query("NodeById")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("node").typed("Node").select(
                SelectionSetBuilder::new()
                    .field("__typename")
                    .inline_fragment(Some("Node"), SelectionSetBuilder::new().field("id"))
                    .inline_fragment(Some("User"), SelectionSetBuilder::new().field("name"))
                    .inline_fragment(Some("Bot"), SelectionSetBuilder::new().field("model")),
            ),
        ))
        .build();
    let mut possible_types = PossibleTypes::new();
    possible_types.insert("Node", ["User", "Bot"]);
    let mut cache = ForestCache::new(CacheOptions::new(16).possible_types(possible_types))?;

    let result = json!({"node": {"__typename": "User", "id": "u1", "name": "Ann"}});
    let report = cache.write(OperationRequest::new(doc.clone()), &result)?;
    assert!(report.complete);

    let read = cache.read(OperationRequest::new(doc))?;
    assert!(read.complete);
    assert_eq!(read.data, result);
    assert!(cache
        .forest()
        .contains(&forest_cache::NodeKey::entity("User", "u1")));
    Ok(())
}
