use pricing_core::Provider;
use std::collections::HashMap;
use std::sync::Arc;

use super::normalizers::{AwsNormalizer, AzureNormalizer, NormalizerServices, ProviderNormalizer};

/// Provider-keyed lookup of normalizers
pub struct NormalizationRegistry {
    normalizers: HashMap<Provider, Arc<dyn ProviderNormalizer>>,
}

impl NormalizationRegistry {
    pub fn empty() -> Self {
        Self {
            normalizers: HashMap::new(),
        }
    }

    /// Registry with the built-in AWS and Azure normalizers sharing `services`
    pub fn with_defaults(services: NormalizerServices) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AwsNormalizer::new(services.clone())));
        registry.register(Arc::new(AzureNormalizer::new(services)));
        registry
    }

    /// Register a normalizer, replacing any existing one for its provider
    pub fn register(&mut self, normalizer: Arc<dyn ProviderNormalizer>) {
        self.normalizers.insert(normalizer.provider(), normalizer);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderNormalizer>> {
        self.normalizers.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.normalizers.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricing_core::storage::InMemoryStorage;

    #[test]
    fn test_defaults_cover_every_provider() {
        let services = NormalizerServices::from_store(Arc::new(InMemoryStorage::new()));
        let registry = NormalizationRegistry::with_defaults(services);

        assert_eq!(registry.providers(), vec![Provider::Aws, Provider::Azure]);
        for provider in Provider::ALL {
            assert_eq!(registry.get(provider).unwrap().provider(), provider);
        }
    }

    #[test]
    fn test_empty_registry_has_no_normalizers() {
        let registry = NormalizationRegistry::empty();
        assert!(registry.get(Provider::Aws).is_none());
        assert!(registry.providers().is_empty());
    }
}
