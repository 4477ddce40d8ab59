use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use regmirror_core::{
    package_url, version_url, CancelToken, MirrorError, PackageRootDoc, VersionDoc,
};
use semver::Version;
use serde_json::from_slice;

use crate::{FetchCache, RetryPolicy};

/// Typed access to one upstream registry through the run's fetch cache.
pub struct RegistryClient {
    registry: String,
    cache: Arc<FetchCache>,
    retry: RetryPolicy,
    cancel: CancelToken,
    root_docs: Mutex<HashMap<String, Arc<PackageRootDoc>>>,
}

impl RegistryClient {
    pub fn new(
        registry: impl Into<String>,
        cache: Arc<FetchCache>,
        retry: RetryPolicy,
        cancel: CancelToken,
    ) -> Self {
        Self {
            registry: registry.into(),
            cache,
            retry,
            cancel,
            root_docs: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn package_root(&self, package: &str) -> Result<Arc<PackageRootDoc>, MirrorError> {
        if let Some(doc) = self.lock_root_docs().get(package) {
            return Ok(Arc::clone(doc));
        }

        let url = package_url(&self.registry, package);
        let body = self.retry.run(&self.cancel, || Ok(self.cache.get(&url)?))?;
        let doc: PackageRootDoc = from_slice(&body).map_err(|err| MirrorError::Decode {
            url: url.clone(),
            reason: err.to_string(),
        })?;

        let doc = Arc::new(doc);
        self.lock_root_docs()
            .entry(package.to_string())
            .or_insert_with(|| Arc::clone(&doc));
        Ok(doc)
    }

    pub fn version_doc(&self, package: &str, version: &Version) -> Result<VersionDoc, MirrorError> {
        let url = version_url(&self.registry, package, version);
        let body = self.retry.run(&self.cancel, || Ok(self.cache.get(&url)?))?;
        from_slice(&body).map_err(|err| MirrorError::Decode {
            url,
            reason: err.to_string(),
        })
    }

    pub fn download(&self, url: &str, dest: &Path) -> Result<u64, MirrorError> {
        self.retry
            .run(&self.cancel, || self.cache.download_to_file(url, dest))
    }

    fn lock_root_docs(&self) -> MutexGuard<'_, HashMap<String, Arc<PackageRootDoc>>> {
        self.root_docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
