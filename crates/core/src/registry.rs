//! Capability registry.
//!
//! Readers work against an immutable [`RegistrySnapshot`] held in an
//! `ArcSwap`; every write builds a complete new snapshot and swaps it in one
//! step, so concurrent orchestrators never observe a half-updated registry.
//! Name collisions are hard errors and batches are all-or-nothing.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::capability::CapabilityDefinition;
use crate::error::RegistryError;

/// Supplies externally-defined capabilities (for example, user files).
///
/// The registry does not know the on-disk format; it only consumes the
/// already-parsed definitions and enforces conflict rules.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// A human-readable name for error messages.
    fn name(&self) -> &str;

    /// Return every definition this source currently provides.
    async fn discover(&self) -> Result<Vec<CapabilityDefinition>, RegistryError>;
}

/// A source backed by a fixed list of definitions.
pub struct StaticSource {
    name: String,
    definitions: Vec<CapabilityDefinition>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, definitions: Vec<CapabilityDefinition>) -> Self {
        Self {
            name: name.into(),
            definitions,
        }
    }
}

#[async_trait]
impl CapabilitySource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<Vec<CapabilityDefinition>, RegistryError> {
        Ok(self.definitions.clone())
    }
}

/// An immutable view of the registry at one point in time.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    ordered: Vec<Arc<CapabilityDefinition>>,
    index: HashMap<String, usize>,
}

impl RegistrySnapshot {
    pub fn lookup(&self, name: &str) -> Option<&Arc<CapabilityDefinition>> {
        self.index.get(name).map(|&i| &self.ordered[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All capabilities in registration order.
    pub fn all(&self) -> &[Arc<CapabilityDefinition>] {
        &self.ordered
    }

    pub fn by_group(&self, tag: &str) -> Vec<Arc<CapabilityDefinition>> {
        self.ordered
            .iter()
            .filter(|d| d.groups.iter().any(|g| g == tag))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|d| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// A copy of this snapshot extended with `batch`, or the first conflict.
    fn extended(
        &self,
        batch: impl IntoIterator<Item = Arc<CapabilityDefinition>>,
    ) -> Result<Self, RegistryError> {
        let mut ordered = self.ordered.clone();
        let mut index = self.index.clone();
        for def in batch {
            if index.contains_key(&def.name) {
                return Err(RegistryError::NameConflict {
                    name: def.name.clone(),
                });
            }
            index.insert(def.name.clone(), ordered.len());
            ordered.push(def);
        }
        Ok(Self { ordered, index })
    }
}

/// Holds built-in and discovered capabilities behind an atomic snapshot.
pub struct CapabilityRegistry {
    /// Definitions registered directly; survive every refresh.
    builtins: Mutex<Vec<Arc<CapabilityDefinition>>>,
    sources: Mutex<Vec<Arc<dyn CapabilitySource>>>,
    snapshot: ArcSwap<RegistrySnapshot>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            builtins: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::default()),
        }
    }

    /// Register one capability. Fails if the name is already taken.
    pub fn register(&self, def: CapabilityDefinition) -> Result<(), RegistryError> {
        self.register_batch(vec![def])
    }

    /// Register several capabilities together. If any name collides with an
    /// existing capability or with another member of the batch, nothing is
    /// registered.
    pub fn register_batch(&self, defs: Vec<CapabilityDefinition>) -> Result<(), RegistryError> {
        let batch: Vec<Arc<CapabilityDefinition>> = defs.into_iter().map(Arc::new).collect();
        let mut builtins = self.builtins.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.snapshot.load().extended(batch.iter().cloned())?;
        builtins.extend(batch);
        self.snapshot.store(Arc::new(next));
        debug!(total = builtins.len(), "Registered capabilities");
        Ok(())
    }

    /// Attach an external source. Its definitions appear after the next
    /// [`refresh`](Self::refresh).
    pub fn add_source(&self, source: Arc<dyn CapabilitySource>) {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source);
    }

    /// Re-scan every source and swap in a freshly validated snapshot.
    ///
    /// Each source's batch is checked against the built-ins and every earlier
    /// batch. On any failure the current snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), RegistryError> {
        let sources: Vec<Arc<dyn CapabilitySource>> = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut batches = Vec::with_capacity(sources.len());
        for source in &sources {
            let defs = source.discover().await.map_err(|e| {
                warn!(source = source.name(), error = %e, "Capability source failed");
                match e {
                    RegistryError::SourceFailed { .. } => e,
                    other => RegistryError::SourceFailed {
                        source_name: source.name().to_string(),
                        reason: other.to_string(),
                    },
                }
            })?;
            batches.push(defs);
        }

        let builtins = self.builtins.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = RegistrySnapshot::default().extended(builtins.iter().cloned())?;
        for batch in batches {
            next = next.extended(batch.into_iter().map(Arc::new))?;
        }
        info!(
            capabilities = next.len(),
            sources = sources.len(),
            "Capability registry refreshed"
        );
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// The current snapshot. Cheap; holders keep a consistent view even if
    /// the registry is refreshed meanwhile.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CapabilityDefinition>> {
        self.snapshot.load().lookup(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<CapabilityDefinition>> {
        self.snapshot.load().all().to_vec()
    }

    pub fn by_group(&self, tag: &str) -> Vec<Arc<CapabilityDefinition>> {
        self.snapshot.load().by_group(tag)
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot.load().names()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
