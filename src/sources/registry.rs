//! Registry of the source adapters available to a run.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{CrossRefAdapter, OpenAlexAdapter, PubMedAdapter, SourceAdapter, SourceError};
use crate::config::Config;
use crate::models::SourceKind;
use crate::utils::{ProviderClient, RateGate, RetryConfig};

/// Adapters keyed by provider
///
/// Built once at startup; each adapter owns the rate gate of its provider.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a registry with every provider, configured from `config`
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let credentials = &config.credentials;
        let settings = config.http.settings(credentials);
        let retry = RetryConfig::from(&config.retry);

        let client = |kind: SourceKind| {
            let rps = config.rate_limits.requests_per_second(kind, credentials);
            let gate = Arc::new(RateGate::per_second(kind, rps));
            tracing::debug!("{} limited to one request every {:?}", kind, gate.interval());
            ProviderClient::new(kind, &settings, gate, retry)
        };

        let mut registry = Self::empty();
        registry.register(Arc::new(PubMedAdapter::new(
            client(SourceKind::PubMed)?,
            credentials.ncbi_api_key.clone(),
            credentials.ncbi_email.clone(),
        )));
        registry.register(Arc::new(CrossRefAdapter::new(
            client(SourceKind::CrossRef)?,
            credentials.crossref_mailto.clone(),
        )));
        registry.register(Arc::new(OpenAlexAdapter::new(
            client(SourceKind::OpenAlex)?,
            credentials.openalex_email.clone(),
            credentials.openalex_api_key.clone(),
        )));

        Ok(registry)
    }

    /// Register an adapter, replacing any previous one for the same provider
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Get the adapter for a provider
    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind)
    }

    /// Registered providers, in enum order
    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.adapters.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockAdapter;

    #[test]
    fn test_registry_from_config() {
        let registry = AdapterRegistry::from_config(&Config::default()).unwrap();

        assert_eq!(registry.len(), 3);
        for kind in SourceKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = AdapterRegistry::empty();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockAdapter::new(SourceKind::PubMed)));
        registry.register(Arc::new(MockAdapter::new(SourceKind::PubMed)));
        registry.register(Arc::new(MockAdapter::new(SourceKind::OpenAlex)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(SourceKind::CrossRef).is_none());
        assert_eq!(
            registry.kinds().collect::<Vec<_>>(),
            vec![SourceKind::PubMed, SourceKind::OpenAlex]
        );
    }
}
