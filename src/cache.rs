//! The cache facade.
//!
//! [`ForestCache`] owns the forest, the operation registry (a two-generation
//! LRU of descriptors and their last read results) and the node → reader
//! dependency index used to invalidate read results on write.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, trace};

use crate::descriptor::{OperationDescriptor, OperationIdGen, OperationKey, OperationRequest, PreparedOperation};
use crate::error::{CacheError, Result};
use crate::eviction::TwoGenerationLru;
use crate::forest::Forest;
use crate::gc::{self, GcReport};
use crate::metrics::{default_metrics, CacheMetrics};
use crate::options::CacheOptions;
use crate::read::{self, ReadResult};
use crate::types::{NodeKey, OperationId};
use crate::write::{self, WriteReport};

/// What [`ForestCache::evict`] removes.
#[derive(Clone, Debug, PartialEq)]
pub enum EvictTarget {
    /// Every record of a node.
    Node(NodeKey),
    /// One field of a node.
    Field {
        /// Node holding the field.
        node: NodeKey,
        /// Schema field name.
        field_name: String,
        /// Arguments to match; `None` removes every argument set.
        args: Option<JsonValue>,
    },
}

/// Snapshot of cache occupancy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Operations held by the LRU.
    pub retained_operations: usize,
    /// Operations with at least one chunk in the forest.
    pub operations_with_chunks: usize,
    /// Live chunks.
    pub chunks: usize,
    /// Indexed node keys.
    pub nodes: usize,
    /// Descriptors kept for cold reads.
    pub transient_descriptors: usize,
    /// Completed LRU rotations.
    pub lru_rotations: u64,
}

struct Retained {
    descriptor: Arc<OperationDescriptor>,
    last_read: Option<Arc<ReadResult>>,
}

/// Client-side normalized result cache.
pub struct ForestCache {
    options: CacheOptions,
    metrics: Arc<dyn CacheMetrics>,
    forest: Forest,
    ids: OperationIdGen,
    retained: TwoGenerationLru<OperationKey, Retained>,
    by_id: FxHashMap<OperationId, OperationKey>,
    transient: LruCache<OperationKey, Arc<OperationDescriptor>>,
    dependents: FxHashMap<NodeKey, FxHashSet<OperationId>>,
}

impl ForestCache {
    /// Creates a cache after validating `options`.
    pub fn new(options: CacheOptions) -> Result<Self> {
        options.validate()?;
        let transient_capacity = NonZeroUsize::new(options.transient_descriptor_capacity)
            .ok_or_else(|| {
                CacheError::configuration("transient_descriptor_capacity must be greater than zero")
            })?;
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        info!(
            max_operation_count = options.max_operation_count,
            initial_capacity_hint = options.initial_capacity_hint,
            "forest.cache.created"
        );
        Ok(Self {
            forest: Forest::with_capacity(options.initial_capacity_hint),
            retained: TwoGenerationLru::new(options.max_operation_count),
            transient: LruCache::new(transient_capacity),
            ids: OperationIdGen::new(),
            by_id: FxHashMap::default(),
            dependents: FxHashMap::default(),
            metrics,
            options,
        })
    }

    /// Options the cache was created with.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Read-only access to the forest.
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Ingests a raw result for `request`.
    pub fn write(&mut self, request: OperationRequest, result: &JsonValue) -> Result<WriteReport> {
        let prepared = PreparedOperation::prepare(&request)?;
        let key = prepared.key().clone();
        let mut evicted = Vec::new();
        let mut touched: FxHashSet<NodeKey> = FxHashSet::default();

        let (existing, promotion) = {
            let (entry, promotion) = self.retained.get(&key);
            (entry.map(|entry| entry.descriptor.clone()), promotion)
        };
        self.release_evicted(promotion, &mut evicted, &mut touched);
        let was_retained = existing.is_some();
        let descriptor = match existing {
            Some(descriptor) => descriptor,
            None => match self.transient.pop(&key) {
                Some(descriptor) => descriptor,
                None => Arc::new(prepared.into_descriptor(self.ids.next_id())),
            },
        };

        if !descriptor.is_cached() {
            debug!(
                operation = %descriptor.id(),
                name = descriptor.display_name(),
                "forest.write.skipped"
            );
            self.metrics.write(false);
            return Ok(WriteReport {
                operation: descriptor.id(),
                chunk: None,
                cached: false,
                nodes_written: 0,
                complete: false,
                invalidated: self.invalidate(&touched, None),
                evicted,
            });
        }

        let decomposed = match write::decompose(
            &descriptor,
            result,
            self.options.key_policy.as_ref(),
            &self.options.possible_types,
        ) {
            Ok(decomposed) => decomposed,
            Err(err) => {
                // The promotion above may already have evicted operations.
                self.invalidate(&touched, None);
                return Err(err);
            }
        };

        let nodes_written = decomposed.draft.nodes.len();
        touched.extend(decomposed.draft.nodes.keys().cloned());
        let chunk = self.forest.admit(&descriptor, decomposed.draft);

        if !was_retained {
            let admission = self.retained.set(
                key.clone(),
                Retained {
                    descriptor: descriptor.clone(),
                    last_read: None,
                },
            );
            self.by_id.insert(descriptor.id(), key);
            self.release_evicted(admission, &mut evicted, &mut touched);
        }

        let invalidated = self.invalidate(&touched, Some(descriptor.id()));
        debug!(
            operation = %descriptor.id(),
            chunk = %chunk,
            nodes = nodes_written,
            complete = decomposed.complete,
            invalidated = invalidated.len(),
            evicted = evicted.len(),
            "forest.write.admitted"
        );
        self.metrics.write(true);
        Ok(WriteReport {
            operation: descriptor.id(),
            chunk: Some(chunk),
            cached: true,
            nodes_written,
            complete: decomposed.complete,
            invalidated,
            evicted,
        })
    }

    /// Reads `request` from the cache.
    ///
    /// Retained operations reuse their last result until a write or eviction
    /// touches a node it read. Operations that were never written are read
    /// with a transient descriptor and are not retained.
    pub fn read(&mut self, request: OperationRequest) -> Result<Arc<ReadResult>> {
        let prepared = PreparedOperation::prepare(&request)?;
        let key = prepared.key().clone();

        let (existing, promotion) = {
            let (entry, promotion) = self.retained.get(&key);
            (entry.map(|entry| entry.descriptor.clone()), promotion)
        };
        let mut evicted = Vec::new();
        let mut touched = FxHashSet::default();
        self.release_evicted(promotion, &mut evicted, &mut touched);
        self.invalidate(&touched, None);

        let Some(descriptor) = existing else {
            let descriptor = match self.transient.get(&key) {
                Some(descriptor) => descriptor.clone(),
                None => {
                    let descriptor = Arc::new(prepared.into_descriptor(self.ids.next_id()));
                    self.transient.put(key, descriptor.clone());
                    descriptor
                }
            };
            let result = read::read(&self.forest, &descriptor, &self.options.possible_types)?;
            self.metrics.read(false);
            if !result.complete {
                self.metrics.read_partial();
            }
            return Ok(Arc::new(result));
        };

        if let Some(hit) = self.retained.peek(&key).and_then(|entry| entry.last_read.clone()) {
            trace!(operation = %descriptor.id(), "forest.read.hit");
            self.metrics.read(true);
            return Ok(hit);
        }

        let result = Arc::new(read::read(&self.forest, &descriptor, &self.options.possible_types)?);
        for node in result.touched() {
            self.dependents
                .entry(node.clone())
                .or_default()
                .insert(descriptor.id());
        }
        if let Some(entry) = self.retained.peek_mut(&key) {
            entry.last_read = Some(result.clone());
        }
        debug!(
            operation = %descriptor.id(),
            complete = result.complete,
            missing = result.missing.len(),
            "forest.read.computed"
        );
        self.metrics.read(false);
        if !result.complete {
            self.metrics.read_partial();
        }
        Ok(result)
    }

    /// Removes a node or a single field from the forest.
    ///
    /// Returns `true` when anything was removed.
    pub fn evict(&mut self, target: EvictTarget) -> bool {
        let (node, removed) = match target {
            EvictTarget::Node(node) => {
                let removed = self.forest.remove_node(&node);
                (node, removed)
            }
            EvictTarget::Field {
                node,
                field_name,
                args,
            } => {
                let removed =
                    self.forest
                        .remove_by_node_key_and_field(&node, &field_name, args.as_ref());
                (node, removed)
            }
        };
        debug!(node = %node, removed, "forest.evict");
        if removed == 0 {
            return false;
        }
        let mut touched = FxHashSet::default();
        touched.insert(node);
        self.invalidate(&touched, None);
        true
    }

    /// Drops an operation and its chunks.
    ///
    /// Returns `true` when the operation was retained.
    pub fn evict_operation(&mut self, request: OperationRequest) -> Result<bool> {
        let prepared = PreparedOperation::prepare(&request)?;
        let key = prepared.key();
        self.transient.pop(key);
        let Some(entry) = self.retained.delete(key) else {
            return Ok(false);
        };
        let mut evicted = Vec::new();
        let mut touched = FxHashSet::default();
        self.release_evicted(vec![(key.clone(), entry)], &mut evicted, &mut touched);
        self.invalidate(&touched, None);
        Ok(true)
    }

    /// Reclaims records unreachable from every retained operation.
    pub fn gc(&mut self) -> GcReport {
        let roots: Vec<NodeKey> = self
            .retained
            .iter()
            .map(|(_, entry)| entry.descriptor.root_node_key().clone())
            .collect();
        let report = gc::collect(&mut self.forest, roots.iter());
        let forest = &self.forest;
        let by_id = &self.by_id;
        self.dependents.retain(|node, readers| {
            readers.retain(|id| by_id.contains_key(id));
            forest.contains(node) && !readers.is_empty()
        });
        self.metrics.gc(report.reclaimed_node_count);
        report
    }

    /// Entity key the configured policy assigns to `object`.
    pub fn identify(&self, typename: Option<&str>, object: &Map<String, JsonValue>) -> Option<NodeKey> {
        self.options.key_policy.identify(typename, object)
    }

    /// Drops everything. Operation ids keep increasing.
    pub fn reset(&mut self) {
        let dropped = self.retained.len();
        self.forest = Forest::with_capacity(self.options.initial_capacity_hint);
        self.retained.clear();
        self.by_id.clear();
        self.transient.clear();
        self.dependents.clear();
        info!(operations = dropped, "forest.cache.reset");
    }

    /// Current occupancy.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            retained_operations: self.retained.len(),
            operations_with_chunks: self.forest.operation_count(),
            chunks: self.forest.chunk_count(),
            nodes: self.forest.node_count(),
            transient_descriptors: self.transient.len(),
            lru_rotations: self.retained.rotations(),
        }
    }

    fn release_evicted(
        &mut self,
        entries: Vec<(OperationKey, Retained)>,
        evicted: &mut Vec<OperationId>,
        touched: &mut FxHashSet<NodeKey>,
    ) {
        if entries.is_empty() {
            return;
        }
        for (_, entry) in &entries {
            let id = entry.descriptor.id();
            self.by_id.remove(&id);
            touched.extend(self.forest.remove_operation(id));
            evicted.push(id);
        }
        debug!(operations = entries.len(), "forest.lru.evicted");
        self.metrics.operations_evicted(entries.len());
    }

    /// Drops the cached results of every operation that read a node in
    /// `touched`, plus `writer`'s own. Returns the affected ids in order.
    fn invalidate(&mut self, touched: &FxHashSet<NodeKey>, writer: Option<OperationId>) -> Vec<OperationId> {
        let mut readers: FxHashSet<OperationId> = FxHashSet::default();
        for node in touched {
            if let Some(ids) = self.dependents.remove(node) {
                readers.extend(ids);
            }
        }
        readers.extend(writer);
        let mut invalidated: Vec<OperationId> = readers
            .into_iter()
            .filter(|id| {
                let Some(key) = self.by_id.get(id) else {
                    return false;
                };
                match self.retained.peek_mut(key) {
                    Some(entry) => entry.last_read.take().is_some(),
                    None => false,
                }
            })
            .collect();
        invalidated.sort();
        invalidated
    }
}
