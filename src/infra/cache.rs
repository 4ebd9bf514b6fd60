//! Cache backend selection.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheStore, MemoryCacheStore, RedisCacheStore};
use crate::config::{CacheBackend, CacheSettings};

use super::error::InfraError;

/// Open the configured cache backend.
pub async fn connect(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, InfraError> {
    match settings.backend {
        CacheBackend::Redis => {
            let store = RedisCacheStore::connect(&settings.redis_url, settings.timeout)
                .await
                .map_err(|err| {
                    InfraError::cache(format!("failed to connect to redis: {err}"))
                })?;
            store
                .ping()
                .await
                .map_err(|err| InfraError::cache(format!("redis ping failed: {err}")))?;
            Ok(Arc::new(store))
        }
        CacheBackend::Memory => {
            info!("using in-process like cache; counters are not shared between processes");
            Ok(Arc::new(MemoryCacheStore::new()))
        }
    }
}
