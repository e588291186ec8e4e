//! Provider lookup by configured name

use super::Provider;
use crate::error::ProviderError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Maps provider names (as referenced by agent configs) to implementations
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration for bootstrapping
    pub fn with(self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.register(name, provider);
        self
    }

    /// Register or replace the provider under `name`
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        info!(provider = %name, kind = provider.name(), "Registered provider");
        if self.providers.write().insert(name.clone(), provider).is_some() {
            warn!(provider = %name, "Replaced existing provider registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every provider and clear the registry.
    ///
    /// Keeps going past failures and returns the first one.
    pub async fn close_all(&self) -> Result<(), ProviderError> {
        let providers: Vec<(String, Arc<dyn Provider>)> = self.providers.write().drain().collect();

        let mut first_error = None;
        for (name, provider) in providers {
            if let Err(e) = provider.close().await {
                warn!(provider = %name, error = %e, "Failed to close provider");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
