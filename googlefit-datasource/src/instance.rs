use crate::backend::DataSourceInstanceSettings;
use chrono::{DateTime, Utc};
use lru::LruCache;
use reqwest::{redirect, Client};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Per-datasource state created from its settings.
pub trait Instance: Send + Sync {
    /// Called when the instance is replaced or evicted.
    fn dispose(&self) {}
}

type Factory<I> = Box<dyn Fn(&DataSourceInstanceSettings) -> anyhow::Result<I> + Send + Sync>;

struct Cached<I> {
    updated: Option<DateTime<Utc>>,
    instance: Arc<I>,
}

/// Keeps one instance per datasource ID and rebuilds it when the settings change.
pub struct InstanceManager<I> {
    factory: Factory<I>,
    instances: Mutex<LruCache<i64, Cached<I>>>,
}

impl<I: Instance> InstanceManager<I> {
    pub fn new<F>(capacity: NonZeroUsize, factory: F) -> Self
    where
        F: Fn(&DataSourceInstanceSettings) -> anyhow::Result<I> + Send + Sync + 'static,
    {
        InstanceManager {
            factory: Box::new(factory),
            instances: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, settings: &DataSourceInstanceSettings) -> anyhow::Result<Arc<I>> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| anyhow::anyhow!("datasource instance cache lock poisoned"))?;

        if let Some(cached) = instances.get(&settings.id) {
            if cached.updated == settings.updated {
                return Ok(cached.instance.clone());
            }
        }

        let instance = Arc::new((self.factory)(settings)?);
        debug!(datasource_id = settings.id, "Created datasource instance");
        let entry = Cached {
            updated: settings.updated,
            instance: instance.clone(),
        };
        // `push` hands back either the replaced entry for this ID or the evicted LRU one.
        if let Some((id, old)) = instances.push(settings.id, entry) {
            debug!(datasource_id = id, "Disposing datasource instance");
            old.instance.dispose();
        }
        Ok(instance)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.instances.lock().map(|i| i.len()).unwrap_or(0)
    }
}

/// HTTP client settings shared by all datasource instances.
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
}

/// The instance of this datasource: an HTTP client used for token exchanges.
pub struct DatasourceInstance {
    pub http_client: Client,
}

impl DatasourceInstance {
    pub fn new(settings: &DataSourceInstanceSettings, http: HttpSettings) -> anyhow::Result<Self> {
        // Token endpoints must not be followed through redirects.
        let mut builder = Client::builder()
            .timeout(http.timeout)
            .redirect(redirect::Policy::none());
        if let Some(connect_timeout) = http.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let http_client = builder.build()?;
        debug!(
            datasource_id = settings.id,
            "HTTP client created with timeout: {:?}", http.timeout
        );
        Ok(DatasourceInstance { http_client })
    }
}

impl Instance for DatasourceInstance {
    fn dispose(&self) {
        debug!("Datasource instance disposed");
    }
}
