#![allow(missing_docs)]

use std::sync::Arc;

use forest_cache::document::{
    ArgValue, Directive, Document, DocumentBuilder, FieldBuilder, SelectionSetBuilder,
};
use forest_cache::{
    CacheOptions, DefaultKeyPolicy, ForestCache, NodeKey, OperationKind, OperationRequest, Result,
};
use serde_json::json;

fn thread_document() -> Arc<Document> {
    DocumentBuilder::query("Thread")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("thread").typed("Thread").select(
                SelectionSetBuilder::new().field("id").field_with(
                    FieldBuilder::new("messages")
                        .typed("Message")
                        .select(SelectionSetBuilder::new().spread("MessageParts")),
                ),
            ),
        ))
        .fragment(
            "MessageParts",
            "Message",
            SelectionSetBuilder::new()
                .field("id")
                .field("text")
                .inline_fragment(
                    Some("Message"),
                    SelectionSetBuilder::new()
                        .object("author", SelectionSetBuilder::new().field("name")),
                ),
        )
        .build()
}

#[test]
fn named_fragments_are_expanded_on_write_and_read() -> Result<()> {
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let result = json!({"thread": {"id": "t1", "messages": [
        {"id": "1", "text": "hi", "author": {"name": "Ann"}}
    ]}});
    let report = cache.write(OperationRequest::new(thread_document()), &result)?;
    assert!(report.complete);

    let read = cache.read(OperationRequest::new(thread_document()))?;
    assert!(read.complete);
    assert_eq!(read.data, result);
    Ok(())
}

#[test]
fn entity_roots_read_and_write_single_objects() -> Result<()> {
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    cache.write(
        OperationRequest::new(thread_document()),
        &json!({"thread": {"id": "t1", "messages": [
            {"id": "1", "text": "hi", "author": {"name": "Ann"}}
        ]}}),
    )?;

    let message = DocumentBuilder::query("MessageText")
        .select(SelectionSetBuilder::new().field("__typename").field("id").field("text"))
        .build();
    let at = |id: &str| {
        OperationRequest::new(message.clone())
            .root_node_key(NodeKey::entity("Message", id))
            .root_type("Message")
    };

    let read = cache.read(at("1"))?;
    assert!(read.complete);
    assert_eq!(read.data, json!({"__typename": "Message", "id": "1", "text": "hi"}));

    let report = cache.write(at("1"), &json!({"id": "1", "text": "edited"}))?;
    assert!(report.complete);
    let thread = cache.read(OperationRequest::new(thread_document()))?;
    assert_eq!(thread.data["thread"]["messages"][0]["text"], json!("edited"));

    let unknown = cache.read(at("404"))?;
    assert!(!unknown.complete);
    assert_eq!(unknown.data, json!({"__typename": "Message"}));
    Ok(())
}

#[test]
fn key_variables_collapse_operation_identity() -> Result<()> {
    let doc = DocumentBuilder::query("Messages")
        .variable("chatId")
        .variable_with_default("first", json!(20))
        .directive(
            Directive::new("cache").arg("keyVars", ArgValue::List(vec![ArgValue::from("chatId")])),
        )
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("messages")
                .arg("chatId", ArgValue::var("chatId"))
                .arg("first", ArgValue::var("first"))
                .typed("Message")
                .select(SelectionSetBuilder::new().field("id")),
        ))
        .build();
    let request = |vars: serde_json::Value| OperationRequest::new(doc.clone()).variables(vars);

    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let small = cache.write(
        request(json!({"chatId": "c1", "first": 1})),
        &json!({"messages": [{"id": "1"}]}),
    )?;
    let large = cache.write(
        request(json!({"chatId": "c1", "first": 5})),
        &json!({"messages": [{"id": "1"}]}),
    )?;
    let other_chat = cache.write(
        request(json!({"chatId": "c2"})),
        &json!({"messages": [{"id": "9"}]}),
    )?;
    assert_eq!(small.operation, large.operation);
    assert_ne!(small.operation, other_chat.operation);
    assert_eq!(cache.stats().retained_operations, 2);
    Ok(())
}

#[test]
fn malformed_key_variables_are_configuration_errors() -> Result<()> {
    let doc = DocumentBuilder::query("Broken")
        .directive(Directive::new("cache").arg("keyVars", "chatId"))
        .select(SelectionSetBuilder::new().field("id"))
        .build();
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let err = cache.read(OperationRequest::new(doc)).unwrap_err();
    assert_eq!(err.code(), "Configuration");
    Ok(())
}

#[test]
fn mutations_are_cached_only_when_annotated() -> Result<()> {
    let selection = || {
        SelectionSetBuilder::new().field_with(
            FieldBuilder::new("sendMessage")
                .typed("Message")
                .select(SelectionSetBuilder::new().field("id").field("text")),
        )
    };
    let plain = DocumentBuilder::mutation("Send").select(selection()).build();
    let cached = DocumentBuilder::mutation("SendCached")
        .directive(Directive::new("cache"))
        .select(selection())
        .build();
    let result = json!({"sendMessage": {"id": "7", "text": "sent"}});

    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    let report = cache.write(OperationRequest::new(plain), &result)?;
    assert!(!report.cached);
    assert!(!cache.forest().contains(&NodeKey::entity("Message", "7")));

    let report = cache.write(OperationRequest::new(cached.clone()), &result)?;
    assert!(report.cached);
    assert!(cache.forest().contains(&NodeKey::Root(OperationKind::Mutation)));
    assert!(cache.forest().contains(&NodeKey::entity("Message", "7")));
    assert!(cache.read(OperationRequest::new(cached))?.complete);
    Ok(())
}

#[test]
fn custom_key_fields_share_composite_identities() -> Result<()> {
    let policy = DefaultKeyPolicy::new()
        .key_fields("Membership", ["chatId", "userId"])
        .without_identity("PageInfo");
    let mut cache = ForestCache::new(CacheOptions::new(16).key_policy(Arc::new(policy)))?;
    let doc = DocumentBuilder::query("Members")
        .select(
            SelectionSetBuilder::new()
                .field_with(
                    FieldBuilder::new("memberships").typed("Membership").select(
                        SelectionSetBuilder::new()
                            .field("chatId")
                            .field("userId")
                            .field("role"),
                    ),
                )
                .field_with(
                    FieldBuilder::new("pageInfo")
                        .typed("PageInfo")
                        .select(SelectionSetBuilder::new().field("id").field("hasNext")),
                ),
        )
        .build();
    cache.write(
        OperationRequest::new(doc.clone()),
        &json!({
            "memberships": [{"chatId": "c1", "userId": "u1", "role": "owner"}],
            "pageInfo": {"id": "p", "hasNext": false}
        }),
    )?;

    let membership = cache
        .identify(
            Some("Membership"),
            json!({"chatId": "c1", "userId": "u1"}).as_object().expect("object"),
        )
        .expect("identified");
    assert!(cache.forest().contains(&membership));
    assert!(!cache.forest().contains(&NodeKey::entity("PageInfo", "p")));
    assert_eq!(cache.forest().node_keys().filter(|key| key.is_scoped()).count(), 1);
    assert!(cache.read(OperationRequest::new(doc))?.complete);
    Ok(())
}
