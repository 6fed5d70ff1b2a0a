#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use forest_cache::document::{DocumentBuilder, FieldBuilder, SelectionSetBuilder};
use forest_cache::{
    CacheErrorWithCode, CacheOptions, CounterMetrics, ForestCache, NodeKey, OperationRequest,
    Result,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CONFIG: &str = r#"
max_operation_count = 3
initial_capacity_hint = 16
transient_descriptor_capacity = 2

[possible_types]
Actor = ["User", "Bot"]

[identity]
id_field = "uuid"
without_identity = ["Settings"]
"#;

#[test]
fn toml_options_drive_the_cache() -> Result<()> {
    init_tracing();
    let options = CacheOptions::from_toml_str(CONFIG)?;
    assert_eq!(options.max_operation_count, 3);
    assert_eq!(options.transient_descriptor_capacity, 2);
    let mut cache = ForestCache::new(options)?;

    let doc = DocumentBuilder::query("Actor")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("actor").typed("Actor").select(
                SelectionSetBuilder::new()
                    .field("__typename")
                    .field("uuid")
                    .inline_fragment(Some("Actor"), SelectionSetBuilder::new().field("handle"))
                    .object("settings", SelectionSetBuilder::new().field("mute")),
            ),
        ))
        .build();
    let result = json!({"actor": {
        "__typename": "Bot",
        "uuid": "b-1",
        "handle": "@helper",
        "settings": {"__typename": "Settings", "uuid": "s-1", "mute": true}
    }});
    let report = cache.write(OperationRequest::new(doc.clone()), &result)?;
    assert!(report.complete);
    assert!(cache.forest().contains(&NodeKey::entity("Bot", "b-1")));
    assert!(!cache.forest().contains(&NodeKey::entity("Settings", "s-1")));

    let read = cache.read(OperationRequest::new(doc))?;
    assert!(read.complete);
    assert_eq!(read.data["actor"]["handle"], json!("@helper"));
    assert_eq!(read.data["actor"]["settings"], json!({"mute": true}));
    Ok(())
}

#[test]
fn invalid_options_report_their_code() {
    let err = CacheOptions::from_toml_str("max_operation_count = 0").unwrap_err();
    let rendered = CacheErrorWithCode(&err).to_string();
    assert!(rendered.starts_with("[Configuration]"), "{rendered}");

    let err = ForestCache::new(CacheOptions::new(4).transient_descriptor_capacity(0))
        .err()
        .expect("zero transient capacity is rejected");
    assert_eq!(err.code(), "Configuration");
}

#[test]
fn metrics_count_hits_misses_and_partial_reads() -> Result<()> {
    init_tracing();
    let metrics = Arc::new(CounterMetrics::default());
    let mut cache = ForestCache::new(CacheOptions::new(8).metrics(metrics.clone()))?;
    let doc = DocumentBuilder::query("Viewer")
        .select(SelectionSetBuilder::new().field_with(
            FieldBuilder::new("viewer")
                .typed("User")
                .select(SelectionSetBuilder::new().field("id").field("name")),
        ))
        .build();

    cache.read(OperationRequest::new(doc.clone()))?;
    cache.write(OperationRequest::new(doc.clone()), &json!({"viewer": {"id": "u1", "name": "Ann"}}))?;
    cache.read(OperationRequest::new(doc.clone()))?;
    cache.read(OperationRequest::new(doc))?;
    cache.gc();

    assert_eq!(metrics.writes_admitted.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.read_misses.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.read_hits.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.partial_reads.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.gc_runs.load(Ordering::Relaxed), 1);
    Ok(())
}
