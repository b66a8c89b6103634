//! Transfer Registry
//!
//! Maps transfer keys to open read handles plus progress. The registry is
//! owned by exactly one channel actor, so every method takes `&mut self`
//! and no locking is involved. Each terminal transition (completion, idle
//! eviction, teardown) removes the entry first and then consumes its
//! handle, which makes a second close of the same handle impossible.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::source::{FileSource, ReadHandle};
use super::types::{DrainReport, TransferError, TransferKey, TransferStatus, IDLE_TIMEOUT};

// ============================================================================
// Entry
// ============================================================================

/// Registry record for one in-flight transfer
#[derive(Debug)]
pub struct TransferEntry<H> {
    handle: H,
    last_activity: Instant,
    completed_bytes: u64,
}

impl<H: ReadHandle> TransferEntry<H> {
    fn new(handle: H, now: Instant) -> Self {
        Self {
            handle,
            last_activity: now,
            completed_bytes: 0,
        }
    }

    /// Handle for reading; stays owned by the entry
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    pub fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Count `length` requested bytes as delivered
    ///
    /// Returns the new completed byte count.
    pub fn record_read(&mut self, length: usize, now: Instant) -> u64 {
        self.last_activity = now;
        self.completed_bytes = self.completed_bytes.saturating_add(length as u64);
        self.completed_bytes
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Open transfers of a single channel
#[derive(Debug)]
pub struct TransferRegistry<H> {
    entries: HashMap<TransferKey, TransferEntry<H>>,
    idle_timeout: Duration,
}

impl<H: ReadHandle> TransferRegistry<H> {
    /// Create an empty registry with the standard idle timeout
    pub fn new() -> Self {
        Self::with_idle_timeout(IDLE_TIMEOUT)
    }

    /// Create an empty registry with a custom idle timeout
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            idle_timeout,
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &TransferKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &TransferKey) -> Option<&TransferEntry<H>> {
        self.entries.get(key)
    }

    /// Return the entry for `key`, opening the file on first use.
    ///
    /// A failed open leaves the registry untouched.
    pub async fn get_or_open<S>(
        &mut self,
        key: &TransferKey,
        source: &S,
        now: Instant,
    ) -> Result<&mut TransferEntry<H>, TransferError>
    where
        S: FileSource<Handle = H>,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let handle = source.open(key).await?;
                tracing::debug!(key = %key, "Opened transfer");
                Ok(slot.insert(TransferEntry::new(handle, now)))
            }
        }
    }

    /// Status of every entry, sorted by key
    pub fn snapshot(&self, now: Instant) -> Vec<TransferStatus> {
        let mut statuses: Vec<TransferStatus> = self
            .entries
            .iter()
            .map(|(key, entry)| TransferStatus {
                key: key.clone(),
                completed_bytes: entry.completed_bytes,
                idle: entry.idle_for(now),
            })
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove `key` and close its handle
    ///
    /// Returns `Ok(false)` if no entry existed.
    pub async fn close(&mut self, key: &TransferKey) -> Result<bool, TransferError> {
        let Some(entry) = self.entries.remove(key) else {
            return Ok(false);
        };

        entry.handle.close().await.map_err(|source| TransferError::Close {
            key: key.clone(),
            source,
        })?;

        Ok(true)
    }

    /// Evict entries idle for longer than the idle timeout
    pub async fn sweep_idle(&mut self, now: Instant) -> DrainReport {
        let idle_timeout = self.idle_timeout;
        let expired: Vec<TransferKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.idle_for(now) > idle_timeout)
            .map(|(key, _)| key.clone())
            .collect();

        let mut report = DrainReport::default();
        for key in expired {
            let completed_bytes = self
                .entries
                .get(&key)
                .map(|entry| entry.completed_bytes)
                .unwrap_or_default();

            match self.close(&key).await {
                Ok(true) => {
                    report.closed += 1;
                    tracing::warn!(
                        key = %key,
                        completed_bytes = completed_bytes,
                        "Transfer timed out, released file handle"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    report.closed += 1;
                    report.failed += 1;
                    tracing::error!(key = %key, error = %e, "Failed to close idle transfer");
                }
            }
        }

        if report.closed > 0 {
            tracing::info!(count = report.closed, "Evicted idle transfers");
        }

        report
    }

    /// Close and remove every entry regardless of state
    pub async fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();

        for (key, entry) in std::mem::take(&mut self.entries) {
            report.closed += 1;
            if let Err(e) = entry.handle.close().await {
                report.failed += 1;
                tracing::error!(key = %key, error = %e, "Failed to close transfer during teardown");
            }
        }

        report
    }
}

impl<H: ReadHandle> Default for TransferRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
