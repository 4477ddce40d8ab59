use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use regmirror_core::{FetchError, MirrorError};
use tracing::debug;

use crate::Transport;

type FetchResult = Result<Arc<[u8]>, FetchError>;
type Slot = Arc<OnceLock<FetchResult>>;

/// Coalesced GET cache scoped to one mirror run.
///
/// Callers asking for the same URL concurrently share one request: the first
/// caller performs it inside the URL's `OnceLock`, the rest block on that lock
/// and receive the same result. Successes stay cached for the life of the
/// cache; a failure is handed to everyone already waiting and then evicted,
/// so a later retry issues a fresh request.
pub struct FetchCache {
    transport: Arc<dyn Transport>,
    slots: Mutex<HashMap<String, Slot>>,
    issued: AtomicU64,
}

impl FetchCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashMap::new()),
            issued: AtomicU64::new(0),
        }
    }

    pub fn get(&self, url: &str) -> FetchResult {
        let slot = self.lock_slots().entry(url.to_string()).or_default().clone();

        let result = slot
            .get_or_init(|| {
                self.issued.fetch_add(1, Ordering::Relaxed);
                debug!(url, "GET");
                self.transport.get(url).map(Arc::from)
            })
            .clone();

        if result.is_err() {
            let mut slots = self.lock_slots();
            if let Some(current) = slots.get(url) {
                if Arc::ptr_eq(current, &slot) {
                    slots.remove(url);
                }
            }
        }
        result
    }

    /// Streams `url` to `dest` through a `.part` sibling, bypassing the cache.
    pub fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64, MirrorError> {
        let part_path = dest.with_file_name(format!(
            "{}.part",
            dest.file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("download")
        ));

        self.issued.fetch_add(1, Ordering::Relaxed);
        debug!(url, dest = %dest.display(), "GET (stream)");
        let file = File::create(&part_path)
            .map_err(|err| MirrorError::filesystem("create", &part_path, err))?;
        let mut writer = BufWriter::new(file);

        let written = match self.transport.get_to_writer(url, &mut writer) {
            Ok(written) => written,
            Err(err) => {
                drop(writer);
                let _ = fs::remove_file(&part_path);
                return Err(err.into());
            }
        };
        if let Err(err) = writer.flush() {
            let _ = fs::remove_file(&part_path);
            return Err(MirrorError::filesystem("write", &part_path, err));
        }
        drop(writer);

        fs::rename(&part_path, dest).map_err(|err| {
            let _ = fs::remove_file(&part_path);
            MirrorError::filesystem("rename", dest, err)
        })?;
        Ok(written)
    }

    /// Network requests issued so far, including streamed downloads.
    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn cached_urls(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| matches!(slot.get(), Some(Ok(_))))
            .count()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
