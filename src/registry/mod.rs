//! Datasource registry
//!
//! Holds the named connection-pool descriptors and their roles. Reads go
//! through an `ArcSwap` snapshot and never lock; mutations build a new
//! snapshot and swap it in whole, so readers see either the old or the new
//! set and nothing in between.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::info;

use crate::config::{DataSourceConfig, Role};
use crate::pool::ConnectionPool;
use crate::router::RouteError;

/// Named configuration plus pool handle for one physical datasource
pub struct Descriptor {
    name: String,
    role: Role,
    config: DataSourceConfig,
    pool: Arc<dyn ConnectionPool>,
}

impl Descriptor {
    pub fn new(config: DataSourceConfig, pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            name: config.name.clone(),
            role: config.role,
            config,
            pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

/// Immutable view of the registry at one point in time
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Registration order
    ordered: Vec<Arc<Descriptor>>,
    by_name: HashMap<String, Arc<Descriptor>>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&Arc<Descriptor>> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Descriptor>> {
        self.ordered.iter()
    }

    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &Arc<Descriptor>> {
        self.ordered.iter().filter(move |d| d.role() == role)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Registry of datasource descriptors
pub struct Registry {
    snapshot: ArcSwap<Snapshot>,
    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
    /// Datasource used when no other routing signal applies
    default_name: String,
}

impl Registry {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            write_lock: Mutex::new(()),
            default_name: default_name.into(),
        }
    }

    /// Add a new named datasource
    pub fn register(&self, descriptor: Descriptor) -> Result<Arc<Descriptor>, RouteError> {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();

        if current.by_name.contains_key(descriptor.name()) {
            return Err(RouteError::DuplicateName(descriptor.name().to_string()));
        }

        let descriptor = Arc::new(descriptor);
        let mut ordered = current.ordered.clone();
        ordered.push(descriptor.clone());
        let mut by_name = current.by_name.clone();
        by_name.insert(descriptor.name().to_string(), descriptor.clone());

        self.snapshot.store(Arc::new(Snapshot { ordered, by_name }));
        info!(
            datasource = %descriptor.name(),
            role = %descriptor.role(),
            url = %descriptor.config().url,
            "Registered datasource"
        );
        Ok(descriptor)
    }

    /// Remove a datasource.
    ///
    /// Callers already holding the descriptor keep it until they finish;
    /// it is never returned by `resolve`/`list` again.
    pub fn unregister(&self, name: &str) -> Result<Arc<Descriptor>, RouteError> {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();

        let removed = current
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RouteError::NotRegistered(name.to_string()))?;

        let ordered = current
            .ordered
            .iter()
            .filter(|d| d.name() != name)
            .cloned()
            .collect();
        let mut by_name = current.by_name.clone();
        by_name.remove(name);

        self.snapshot.store(Arc::new(Snapshot { ordered, by_name }));
        info!(datasource = %name, "Unregistered datasource");
        Ok(removed)
    }

    /// Look up a datasource by name
    pub fn resolve(&self, name: &str) -> Result<Arc<Descriptor>, RouteError> {
        self.snapshot
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| RouteError::NotRegistered(name.to_string()))
    }

    /// Datasources with the given role, in registration order
    pub fn list(&self, role: Role) -> Vec<Arc<Descriptor>> {
        self.snapshot.load().with_role(role).cloned().collect()
    }

    pub fn list_all(&self) -> Vec<Arc<Descriptor>> {
        self.snapshot.load().ordered.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot
            .load()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Current snapshot, for callers that need several consistent reads
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot.load().get(name).is_some()
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}
