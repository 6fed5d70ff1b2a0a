#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use forest_cache::document::{ArgValue, Document, DocumentBuilder, FieldBuilder, SelectionSetBuilder};
use forest_cache::{
    CacheOptions, CounterMetrics, EvictTarget, ForestCache, NodeKey, OperationRequest, Result,
};
use serde_json::json;

fn chat_document() -> Arc<Document> {
    DocumentBuilder::query("Chat")
        .variable("chatId")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("chat")
                .arg("id", ArgValue::var("chatId"))
                .typed("Chat")
                .select(
                    SelectionSetBuilder::new().field("id").field("title").field_with(
                        FieldBuilder::new("messages")
                            .typed("Message")
                            .select(SelectionSetBuilder::new().field("id").field("text")),
                    ),
                ),
        ))
        .build()
}

fn chat(doc: &Arc<Document>, idx: usize) -> OperationRequest {
    OperationRequest::new(doc.clone()).variables(json!({"chatId": format!("c{idx}")}))
}

fn chat_result(idx: usize) -> serde_json::Value {
    json!({"chat": {
        "id": format!("c{idx}"),
        "title": format!("chat {idx}"),
        "messages": [{"id": format!("m{idx}"), "text": "hello"}]
    }})
}

#[test]
fn retained_operations_stay_within_the_bound() -> Result<()> {
    let doc = chat_document();
    let max = 4;
    let mut cache = ForestCache::new(CacheOptions::new(max))?;
    let mut evicted = Vec::new();
    for idx in 0..(max + 7) {
        let report = cache.write(chat(&doc, idx), &chat_result(idx))?;
        evicted.extend(report.evicted);
        let stats = cache.stats();
        assert!(stats.retained_operations <= max, "{stats:?}");
        assert!(stats.operations_with_chunks <= max, "{stats:?}");
    }
    assert!(!evicted.is_empty());

    // The oldest operation lost its chunks and reads cold.
    let read = cache.read(chat(&doc, 0))?;
    assert!(!read.complete);
    assert_eq!(read.data, json!({}));

    // The newest is intact.
    let read = cache.read(chat(&doc, max + 6))?;
    assert!(read.complete);
    assert_eq!(read.data, chat_result(max + 6));
    Ok(())
}

#[test]
fn reads_keep_operations_alive() -> Result<()> {
    let doc = chat_document();
    let mut cache = ForestCache::new(CacheOptions::new(4))?;
    let first = cache.write(chat(&doc, 0), &chat_result(0))?;
    let second = cache.write(chat(&doc, 1), &chat_result(1))?;

    // Both now sit in the older generation; reading the first promotes it.
    assert!(cache.read(chat(&doc, 0))?.complete);
    let third = cache.write(chat(&doc, 2), &chat_result(2))?;
    assert_eq!(third.evicted, vec![second.operation]);

    assert!(cache.read(chat(&doc, 0))?.complete);
    assert!(!cache.read(chat(&doc, 1))?.complete);
    assert_eq!(cache.forest().chunks_for(first.operation).len(), 1);
    Ok(())
}

#[test]
fn evicted_operations_come_back_on_rewrite() -> Result<()> {
    let doc = chat_document();
    let metrics = Arc::new(CounterMetrics::default());
    let mut cache = ForestCache::new(CacheOptions::new(2).metrics(metrics.clone()))?;
    let first = cache.write(chat(&doc, 0), &chat_result(0))?;
    cache.write(chat(&doc, 1), &chat_result(1))?;
    cache.write(chat(&doc, 2), &chat_result(2))?;
    assert!(metrics.operations_evicted.load(Ordering::Relaxed) >= 1);

    let report = cache.write(chat(&doc, 0), &chat_result(0))?;
    assert_ne!(report.operation, first.operation);
    assert!(cache.read(chat(&doc, 0))?.complete);
    Ok(())
}

#[test]
fn evicting_a_node_makes_its_fields_missing() -> Result<()> {
    let doc = chat_document();
    let mut cache = ForestCache::new(CacheOptions::new(8))?;
    cache.write(chat(&doc, 1), &chat_result(1))?;
    let before = cache.read(chat(&doc, 1))?;
    assert!(before.complete);

    assert!(cache.evict(EvictTarget::Node(NodeKey::entity("Message", "m1"))));
    assert!(!cache.evict(EvictTarget::Node(NodeKey::entity("Message", "m1"))));

    let after = cache.read(chat(&doc, 1))?;
    assert!(!after.complete);
    let missing: Vec<String> = after.missing.iter().map(ToString::to_string).collect();
    assert_eq!(missing, vec!["chat.messages.0.id", "chat.messages.0.text"]);
    // The list still points at the evicted node.
    assert_eq!(after.data["chat"]["messages"], json!([{}]));
    Ok(())
}

#[test]
fn evicting_a_field_leaves_siblings_alone() -> Result<()> {
    let doc = chat_document();
    let mut cache = ForestCache::new(CacheOptions::new(8))?;
    cache.write(chat(&doc, 1), &chat_result(1))?;

    assert!(cache.evict(EvictTarget::Field {
        node: NodeKey::entity("Chat", "c1"),
        field_name: "title".to_owned(),
        args: None,
    }));
    let read = cache.read(chat(&doc, 1))?;
    assert_eq!(read.missing.len(), 1);
    assert_eq!(read.missing[0].to_string(), "chat.title");
    assert_eq!(read.data["chat"]["messages"][0]["text"], json!("hello"));

    // Arguments narrow the match to one store key.
    assert!(!cache.evict(EvictTarget::Field {
        node: NodeKey::Root(forest_cache::OperationKind::Query),
        field_name: "chat".to_owned(),
        args: Some(json!({"id": "c2"})),
    }));
    assert!(cache.evict(EvictTarget::Field {
        node: NodeKey::Root(forest_cache::OperationKind::Query),
        field_name: "chat".to_owned(),
        args: Some(json!({"id": "c1"})),
    }));
    let read = cache.read(chat(&doc, 1))?;
    assert_eq!(read.data, json!({}));
    Ok(())
}

#[test]
fn evict_operation_and_reset_drop_everything_they_own() -> Result<()> {
    let doc = chat_document();
    let mut cache = ForestCache::new(CacheOptions::new(8))?;
    cache.write(chat(&doc, 1), &chat_result(1))?;
    cache.write(chat(&doc, 2), &chat_result(2))?;

    assert!(cache.evict_operation(chat(&doc, 1))?);
    assert!(!cache.evict_operation(chat(&doc, 1))?);
    assert_eq!(cache.stats().retained_operations, 1);
    assert!(!cache.read(chat(&doc, 1))?.complete);
    assert!(cache.read(chat(&doc, 2))?.complete);

    cache.reset();
    let stats = cache.stats();
    assert_eq!(stats.retained_operations, 0);
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.nodes, 0);
    Ok(())
}

#[test]
fn failed_writes_still_invalidate_readers_of_evicted_operations() -> Result<()> {
    let doc = chat_document();
    let message = DocumentBuilder::query("Message")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("message")
                .arg("id", "m1")
                .typed("Message")
                .select(SelectionSetBuilder::new().field("id").field("text")),
        ))
        .build();
    let mut cache = ForestCache::new(CacheOptions::new(4))?;
    let first = cache.write(chat(&doc, 1), &chat_result(1))?;
    cache.write(chat(&doc, 2), &chat_result(2))?;
    cache.write(OperationRequest::new(message.clone()), &json!({"message": {"id": "m1"}}))?;

    // The text comes from the first chat's chunk.
    let before = cache.read(OperationRequest::new(message.clone()))?;
    assert!(before.complete);
    assert_eq!(before.data["message"]["text"], json!("hello"));

    // Promoting the second chat rotates the first one out before the result
    // is rejected.
    let err = cache.write(chat(&doc, 2), &json!([1])).unwrap_err();
    assert_eq!(err.code(), "MalformedResult");
    assert!(cache.forest().chunks_for(first.operation).is_empty());

    let after = cache.read(OperationRequest::new(message))?;
    assert!(!after.complete);
    assert_eq!(after.data, json!({"message": {"id": "m1"}}));
    let missing: Vec<String> = after.missing.iter().map(ToString::to_string).collect();
    assert_eq!(missing, vec!["message.text"]);
    Ok(())
}
