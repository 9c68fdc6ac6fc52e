// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Enhancement Provider Registry - Startup Capability Probing
//
// Builds the configured enhancement providers and probes them once at
// service startup, pinning the first healthy one for the lifetime of this
// instance. The resolved selection is an explicit value injected into the
// worker pool - never a process-wide mutable singleton - so unrelated
// requests cannot observe each other's probe results, and a restart
// re-probes from scratch.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::config::{resolve_secret, EnhancerConfig};
use crate::domain::enhance::PhotoEnhancer;

use super::restoration::RestorationAdapter;

/// The configured provider set, prior to probing.
pub struct EnhancerRegistry {
    providers: Vec<Arc<dyn PhotoEnhancer>>,
}

impl EnhancerRegistry {
    /// Build adapters from configuration, resolving `env:`-indirected keys.
    ///
    /// A provider whose key cannot be resolved is skipped with a warning;
    /// enhancement is a degradable capability, not a startup requirement.
    pub fn from_config(configs: &[EnhancerConfig]) -> Self {
        let mut providers: Vec<Arc<dyn PhotoEnhancer>> = Vec::new();

        for config in configs {
            if !config.enabled {
                info!("Enhancer '{}' disabled, skipping", config.name);
                continue;
            }

            let api_key = match &config.api_key {
                Some(raw) => match resolve_secret(raw) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        warn!("Skipping enhancer '{}': {}", config.name, e);
                        continue;
                    }
                },
                None => None,
            };

            providers.push(Arc::new(RestorationAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                config.model.clone(),
                api_key,
            )));
        }

        Self { providers }
    }

    pub fn from_providers(providers: Vec<Arc<dyn PhotoEnhancer>>) -> Self {
        Self { providers }
    }

    /// Probe providers in configuration order and pin the first healthy one.
    pub async fn probe(&self) -> EnhancerSelection {
        for provider in &self.providers {
            info!("Probing enhancement provider: {}", provider.name());
            match provider.health_check().await {
                Ok(()) => {
                    info!("Pinned enhancement provider: {}", provider.name());
                    return EnhancerSelection {
                        active: Some(provider.clone()),
                    };
                }
                Err(e) => {
                    warn!("Enhancer '{}' failed health check: {}", provider.name(), e);
                }
            }
        }

        if self.providers.is_empty() {
            info!("No enhancement providers configured - pipeline runs without AI enhancement");
        } else {
            warn!("No enhancement provider passed its health check - pipeline degrades to the non-AI path");
        }
        EnhancerSelection { active: None }
    }
}

/// Capability-resolution result, scoped to one service instance.
#[derive(Clone)]
pub struct EnhancerSelection {
    active: Option<Arc<dyn PhotoEnhancer>>,
}

impl EnhancerSelection {
    /// A selection with no enhancement capability.
    pub fn none() -> Self {
        Self { active: None }
    }

    /// A selection pinned to a known provider (tests, fixed deployments).
    pub fn pinned(provider: Arc<dyn PhotoEnhancer>) -> Self {
        Self {
            active: Some(provider),
        }
    }

    pub fn active(&self) -> Option<&Arc<dyn PhotoEnhancer>> {
        self.active.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enhance::EnhanceError;
    use async_trait::async_trait;

    struct FakeEnhancer {
        name: String,
        healthy: bool,
    }

    #[async_trait]
    impl PhotoEnhancer for FakeEnhancer {
        async fn enhance(&self, photo: &[u8]) -> Result<Vec<u8>, EnhanceError> {
            Ok(photo.to_vec())
        }

        async fn health_check(&self) -> Result<(), EnhanceError> {
            if self.healthy {
                Ok(())
            } else {
                Err(EnhanceError::Network("connection refused".to_string()))
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn fake(name: &str, healthy: bool) -> Arc<dyn PhotoEnhancer> {
        Arc::new(FakeEnhancer {
            name: name.to_string(),
            healthy,
        })
    }

    #[tokio::test]
    async fn probe_pins_the_first_healthy_provider() {
        let registry = EnhancerRegistry::from_providers(vec![
            fake("down", false),
            fake("up-1", true),
            fake("up-2", true),
        ]);

        let selection = registry.probe().await;
        assert_eq!(selection.active().unwrap().name(), "up-1");
    }

    #[tokio::test]
    async fn probe_with_no_healthy_provider_yields_none() {
        let registry =
            EnhancerRegistry::from_providers(vec![fake("down-1", false), fake("down-2", false)]);
        assert!(registry.probe().await.active().is_none());
    }

    #[tokio::test]
    async fn empty_registry_yields_none() {
        let registry = EnhancerRegistry::from_providers(vec![]);
        assert!(registry.probe().await.active().is_none());
    }

    #[test]
    fn disabled_providers_are_not_built() {
        let configs = vec![
            EnhancerConfig {
                name: "off".to_string(),
                endpoint: "http://localhost:7860".to_string(),
                model: None,
                api_key: None,
                enabled: false,
            },
            EnhancerConfig {
                name: "on".to_string(),
                endpoint: "http://localhost:7861".to_string(),
                model: Some("gfpgan-v1.4".to_string()),
                api_key: None,
                enabled: true,
            },
        ];
        let registry = EnhancerRegistry::from_config(&configs);
        assert_eq!(registry.providers.len(), 1);
        assert_eq!(registry.providers[0].name(), "on");
    }
}
