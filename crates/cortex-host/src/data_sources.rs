//! Data-source registry, keyed `pluginId:name`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use cortex_core::{DataSource, ServiceError};

use crate::context::scope::scoped_key;
use crate::error::RegistryError;

/// Write-once registry of plugin-provided data sources.
pub struct DataSourceRegistry {
    sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        plugin_id: &str,
        source: Arc<dyn DataSource>,
    ) -> Result<(), RegistryError> {
        let key = scoped_key(plugin_id, source.name());
        let mut sources = self.sources.write();
        if sources.contains_key(&key) {
            return Err(RegistryError::conflict("data-source", key));
        }
        debug!(source = %key, "Data source registered");
        sources.insert(key, source);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.read().get(name).cloned()
    }

    /// Fetches from the named source.
    pub async fn fetch(&self, name: &str, query: Value) -> Result<Value, ServiceError> {
        let source = self
            .get(name)
            .ok_or_else(|| ServiceError::not_found(format!("data source '{name}'")))?;
        source.fetch(query).await
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
