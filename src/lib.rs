//! Client-side normalized result cache for graph query operations.
//!
//! Results are stored as immutable per-write chunks in a [`forest::Forest`]
//! and merged lazily at read time, so overlapping operations can share
//! entities without ever overwriting each other's data. Reads re-select
//! exactly the requested fields and report anything no chunk supplies as
//! missing instead of inventing nulls. A two-generation LRU bounds the number
//! of retained operations, and an explicit [`ForestCache::gc`] reclaims node
//! records nothing can reach anymore.
//!
//! ```
//! use forest_cache::document::{DocumentBuilder, FieldBuilder, SelectionSetBuilder};
//! use forest_cache::{CacheOptions, ForestCache, OperationRequest};
//! use serde_json::json;
//!
//! let doc = DocumentBuilder::query("Chat")
//!     .select(SelectionSetBuilder::new().field_with(
//!         FieldBuilder::new("chat")
//!             .typed("Chat")
//!             .select(SelectionSetBuilder::new().field("id").field("title")),
//!     ))
//!     .build();
//! let mut cache = ForestCache::new(CacheOptions::new(100))?;
//! cache.write(
//!     OperationRequest::new(doc.clone()),
//!     &json!({"chat": {"id": "c1", "title": "General"}}),
//! )?;
//! let read = cache.read(OperationRequest::new(doc))?;
//! assert!(read.complete);
//! assert_eq!(read.data, json!({"chat": {"id": "c1", "title": "General"}}));
//! # Ok::<(), forest_cache::CacheError>(())
//! ```

#![warn(missing_docs)]

pub mod aggregate;
pub mod cache;
pub mod canonical;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod eviction;
pub mod forest;
pub mod gc;
pub mod identity;
pub mod metrics;
pub mod options;
pub mod read;
pub mod types;
pub mod write;

pub use cache::{CacheStats, EvictTarget, ForestCache};
pub use descriptor::{OperationDescriptor, OperationRequest};
pub use error::{CacheError, CacheErrorWithCode, Result};
pub use gc::GcReport;
pub use identity::{DefaultKeyPolicy, KeyPolicy, PossibleTypes};
pub use metrics::{CacheMetrics, CounterMetrics, NoopMetrics};
pub use options::CacheOptions;
pub use read::{MissingField, ReadResult};
pub use types::{FieldKey, NodeKey, OperationId, OperationKind, Path, PathSegment};
pub use write::WriteReport;
