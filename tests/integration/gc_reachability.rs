#![allow(missing_docs)]

use std::sync::Arc;

use forest_cache::document::{Document, DocumentBuilder, FieldBuilder, SelectionSetBuilder};
use forest_cache::{
    CacheOptions, EvictTarget, ForestCache, GcReport, NodeKey, OperationKind, OperationRequest,
    Result,
};
use serde_json::json;

fn viewer_document() -> Arc<Document> {
    DocumentBuilder::query("Viewer")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("viewer")
                .typed("User")
                .select(SelectionSetBuilder::new().field("id").field("name")),
        ))
        .build()
}

#[test]
fn replaced_references_are_reclaimed() -> Result<()> {
    let doc = viewer_document();
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    cache.write(OperationRequest::new(doc.clone()), &json!({"viewer": {"id": "u1", "name": "Ann"}}))?;
    cache.write(OperationRequest::new(doc.clone()), &json!({"viewer": {"id": "u2", "name": "Bo"}}))?;
    assert_eq!(cache.stats().nodes, 3);

    let before = cache.read(OperationRequest::new(doc.clone()))?;
    let report = cache.gc();
    assert_eq!(
        report,
        GcReport {
            reclaimed_node_count: 1,
            released_chunks: 0,
            retained_node_count: 2,
        }
    );
    assert!(!cache.forest().contains(&NodeKey::entity("User", "u1")));

    // Collection never changes what a retained operation reads.
    let after = cache.read(OperationRequest::new(doc))?;
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.data, json!({"viewer": {"id": "u2", "name": "Bo"}}));
    Ok(())
}

#[test]
fn collection_is_idempotent() -> Result<()> {
    let doc = viewer_document();
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    cache.write(OperationRequest::new(doc.clone()), &json!({"viewer": {"id": "u1", "name": "Ann"}}))?;
    cache.write(OperationRequest::new(doc), &json!({"viewer": {"id": "u2", "name": "Bo"}}))?;
    cache.gc();
    let second = cache.gc();
    assert_eq!(second.reclaimed_node_count, 0);
    assert_eq!(second.released_chunks, 0);
    Ok(())
}

#[test]
fn evicted_edges_orphan_their_targets() -> Result<()> {
    let doc = viewer_document();
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    cache.write(OperationRequest::new(doc.clone()), &json!({"viewer": {"id": "u1", "name": "Ann"}}))?;

    let root = NodeKey::Root(OperationKind::Query);
    assert!(cache.evict(EvictTarget::Field {
        node: root.clone(),
        field_name: "viewer".to_owned(),
        args: None,
    }));
    let report = cache.gc();
    assert_eq!(report.reclaimed_node_count, 1);
    assert_eq!(report.retained_node_count, 1);
    assert!(cache.forest().contains(&root));

    let read = cache.read(OperationRequest::new(doc))?;
    assert!(!read.complete);
    Ok(())
}

#[test]
fn nodes_without_a_retained_root_are_swept() -> Result<()> {
    let doc = viewer_document();
    let fragment = DocumentBuilder::query("UserName")
        .select(SelectionSetBuilder::new().field("id").field("name"))
        .build();
    let mut cache = ForestCache::new(CacheOptions::new(16))?;
    cache.write(OperationRequest::new(doc.clone()), &json!({"viewer": {"id": "u1", "name": "Ann"}}))?;
    // Written straight onto an entity nothing points at.
    cache.write(
        OperationRequest::new(fragment).root_node_key(NodeKey::entity("User", "u9")),
        &json!({"id": "u9", "name": "Orphan"}),
    )?;

    // The fragment operation is retained, so its root survives.
    assert_eq!(cache.gc().reclaimed_node_count, 0);

    assert!(cache.evict(EvictTarget::Node(NodeKey::Root(OperationKind::Query))));
    let report = cache.gc();
    // The root record is gone, so u1 is no longer reachable.
    assert_eq!(report.reclaimed_node_count, 1);
    assert!(cache.forest().contains(&NodeKey::entity("User", "u9")));
    assert!(!cache.forest().contains(&NodeKey::entity("User", "u1")));
    Ok(())
}
