//! Cache construction options.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::identity::{DefaultKeyPolicy, KeyPolicy, PossibleTypes};
use crate::metrics::CacheMetrics;

/// Configuration supplied when creating a [`crate::ForestCache`].
#[derive(Clone)]
pub struct CacheOptions {
    /// Upper bound on retained operations; must be positive.
    pub max_operation_count: usize,
    /// Expected number of operations, used to pre-size the forest.
    pub initial_capacity_hint: usize,
    /// Descriptors kept for operations read without being retained.
    pub transient_descriptor_capacity: usize,
    /// Identity extraction for result objects.
    pub key_policy: Arc<dyn KeyPolicy>,
    /// Abstract type → concrete types, for fragment matching.
    pub possible_types: PossibleTypes,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn CacheMetrics>>,
}

impl CacheOptions {
    /// Creates options retaining at most `max_operation_count` operations.
    pub fn new(max_operation_count: usize) -> Self {
        Self {
            max_operation_count,
            initial_capacity_hint: 0,
            transient_descriptor_capacity: 64,
            key_policy: Arc::new(DefaultKeyPolicy::new()),
            possible_types: PossibleTypes::new(),
            metrics: None,
        }
    }

    /// Sets the expected number of operations.
    pub fn initial_capacity_hint(mut self, operations: usize) -> Self {
        self.initial_capacity_hint = operations;
        self
    }

    /// Sets the number of descriptors kept for cold reads.
    pub fn transient_descriptor_capacity(mut self, capacity: usize) -> Self {
        self.transient_descriptor_capacity = capacity;
        self
    }

    /// Sets the identity policy.
    pub fn key_policy(mut self, policy: Arc<dyn KeyPolicy>) -> Self {
        self.key_policy = policy;
        self
    }

    /// Sets the possible-types mapping.
    pub fn possible_types(mut self, possible_types: PossibleTypes) -> Self {
        self.possible_types = possible_types;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Rejects options the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_operation_count == 0 {
            return Err(CacheError::configuration(
                "max_operation_count must be greater than zero",
            ));
        }
        if self.transient_descriptor_capacity == 0 {
            return Err(CacheError::configuration(
                "transient_descriptor_capacity must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Parses options from TOML.
    ///
    /// ```toml
    /// max_operation_count = 500
    ///
    /// [possible_types]
    /// Node = ["User", "Message"]
    ///
    /// [identity]
    /// id_field = "id"
    /// without_identity = ["PageInfo"]
    ///
    /// [identity.key_fields]
    /// Membership = ["chatId", "userId"]
    /// ```
    ///
    /// A custom `[identity]` table replaces the key policy with a configured
    /// [`DefaultKeyPolicy`].
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawOptions = toml::from_str(contents)
            .map_err(|err| CacheError::configuration(format!("invalid cache options: {err}")))?;
        let max = raw.max_operation_count.ok_or_else(|| {
            CacheError::configuration("cache options must set max_operation_count")
        })?;
        let mut options = CacheOptions::new(max);
        if let Some(hint) = raw.initial_capacity_hint {
            options.initial_capacity_hint = hint;
        }
        if let Some(capacity) = raw.transient_descriptor_capacity {
            options.transient_descriptor_capacity = capacity;
        }
        for (abstract_type, concrete) in raw.possible_types {
            options.possible_types.insert(abstract_type, concrete);
        }
        if let Some(identity) = raw.identity {
            options.key_policy = Arc::new(identity.into_policy());
        }
        options.validate()?;
        Ok(options)
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("max_operation_count", &self.max_operation_count)
            .field("initial_capacity_hint", &self.initial_capacity_hint)
            .field(
                "transient_descriptor_capacity",
                &self.transient_descriptor_capacity,
            )
            .field("possible_types", &self.possible_types)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawOptions {
    max_operation_count: Option<usize>,
    initial_capacity_hint: Option<usize>,
    transient_descriptor_capacity: Option<usize>,
    #[serde(default)]
    possible_types: HashMap<String, Vec<String>>,
    identity: Option<RawIdentity>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawIdentity {
    id_field: Option<String>,
    #[serde(default)]
    key_fields: HashMap<String, Vec<String>>,
    #[serde(default)]
    without_identity: Vec<String>,
}

impl RawIdentity {
    fn into_policy(self) -> DefaultKeyPolicy {
        let mut policy = DefaultKeyPolicy::new();
        if let Some(field) = self.id_field {
            policy = policy.id_field(field);
        }
        for (typename, fields) in self.key_fields {
            policy = policy.key_fields(typename, fields);
        }
        for typename in self.without_identity {
            policy = policy.without_identity(typename);
        }
        policy
    }
}
