// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! In-memory query cache with stale-while-revalidate semantics.
//!
//! Every resource key owns one entry holding the last good value, a status and
//! at most one in-flight fetch. Fetches run as background tokio tasks, so a
//! `QueryCache` must be used from within a tokio runtime.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Error;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, Error>> + Send + Sync>;

/// Identifies one fetchable resource, e.g. `shows` or `genre/3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    scope: &'static str,
    id: Option<String>,
}

impl QueryKey {
    pub fn new(scope: &'static str) -> Self {
        Self { scope, id: None }
    }

    pub fn with_id(scope: &'static str, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: Some(id.into()),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.scope, id),
            None => write!(f, "{}", self.scope),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// No value yet and the first fetch has not started running.
    Pending,
    /// No value yet and a fetch is running. `aggregate` ranks this together
    /// with `Pending`: both mean nothing can be rendered yet.
    Loading,
    Success,
    /// The last fetch failed. A previous value may still be served.
    Error,
}

impl QueryStatus {
    /// Combines per-key `(status, has_value)` pairs into a page status.
    ///
    /// Pending wins over loading, loading over error, and error is only
    /// reported for keys that have nothing cached to fall back on.
    pub fn aggregate<I>(states: I) -> QueryStatus
    where
        I: IntoIterator<Item = (QueryStatus, bool)>,
    {
        let mut any_loading = false;
        let mut any_unusable_error = false;
        let mut all_have_values = true;

        for (status, has_value) in states {
            match status {
                QueryStatus::Pending => return QueryStatus::Pending,
                QueryStatus::Loading => any_loading = true,
                QueryStatus::Error if !has_value => any_unusable_error = true,
                _ => {}
            }
            all_have_values &= has_value;
        }

        if any_loading {
            QueryStatus::Loading
        } else if any_unusable_error {
            QueryStatus::Error
        } else if all_have_values {
            QueryStatus::Success
        } else {
            QueryStatus::Pending
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Loading => "loading",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Age after which a served value is refetched in the background.
    pub stale_time: Duration,
    /// How long an entry without subscribers survives `collect_garbage`.
    pub gc_time: Duration,
    pub retry: u32,
    /// First retry delay, doubled for each further attempt.
    pub retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(5 * 60),
            retry: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Point-in-time view of one cache entry.
#[derive(Debug)]
pub struct Snapshot<V> {
    pub value: Option<Arc<V>>,
    pub status: QueryStatus,
    pub error: Option<Arc<Error>>,
    pub is_fetching: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<V> Clone for Snapshot<V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            status: self.status,
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            fetched_at: self.fetched_at,
        }
    }
}

impl<V> Snapshot<V> {
    fn pending() -> Self {
        Self {
            value: None,
            status: QueryStatus::Pending,
            error: None,
            is_fetching: false,
            fetched_at: None,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn state(&self) -> (QueryStatus, bool) {
        (self.status, self.has_value())
    }
}

struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

struct Entry<V> {
    /// Distinguishes this entry from any earlier one under the same key.
    epoch: u64,
    value: Option<Arc<V>>,
    status: QueryStatus,
    error: Option<Arc<Error>>,
    updated_at: Option<Instant>,
    fetched_at: Option<DateTime<Utc>>,
    in_flight: Option<InFlight>,
    subscribers: usize,
    inactive_since: Option<Instant>,
    version: watch::Sender<u64>,
}

impl<V> Entry<V> {
    fn new(now: Instant, epoch: u64) -> Self {
        Self {
            epoch,
            value: None,
            status: QueryStatus::Pending,
            error: None,
            updated_at: None,
            fetched_at: None,
            in_flight: None,
            subscribers: 0,
            inactive_since: Some(now),
            version: watch::channel(0).0,
        }
    }

    fn snapshot(&self) -> Snapshot<V> {
        Snapshot {
            value: self.value.clone(),
            status: self.status,
            error: self.error.clone(),
            is_fetching: self.in_flight.is_some(),
            fetched_at: self.fetched_at,
        }
    }

    fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        match self.updated_at {
            Some(updated_at) => now.saturating_duration_since(updated_at) >= stale_time,
            None => true,
        }
    }

    fn notify(&self) {
        self.version.send_modify(|version| *version += 1);
    }
}

struct Inner<V> {
    entries: Mutex<HashMap<QueryKey, Entry<V>>>,
    options: QueryOptions,
    next_generation: AtomicU64,
    next_epoch: AtomicU64,
}

impl<V> Inner<V> {
    fn new_entry(&self, now: Instant) -> Entry<V> {
        Entry::new(now, self.next_epoch.fetch_add(1, Ordering::Relaxed))
    }

    fn mark_loading(&self, key: &QueryKey, generation: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key)
            && entry.value.is_none()
            && entry.in_flight.as_ref().is_some_and(|f| f.generation == generation)
        {
            entry.status = QueryStatus::Loading;
            entry.notify();
        }
    }

    fn resolve(&self, key: &QueryKey, generation: u64, result: Result<V, Error>) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            debug!("Discarding fetch result for evicted key {}", key);
            return;
        };

        if entry
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            entry.in_flight = None;
        }

        if entry.subscribers == 0 {
            debug!("No subscribers left for {}, discarding fetch result", key);
            if entry.value.is_none() && entry.status == QueryStatus::Loading {
                entry.status = QueryStatus::Pending;
            }
            entry.notify();
            return;
        }

        // Whichever fetch resolves last overwrites the entry.
        match result {
            Ok(value) => {
                debug!("Fetched {} (generation {})", key, generation);
                entry.value = Some(Arc::new(value));
                entry.status = QueryStatus::Success;
                entry.error = None;
                entry.updated_at = Some(Instant::now());
                entry.fetched_at = Some(Utc::now());
            }
            Err(e) => {
                warn!(
                    "Fetch for {} failed{}: {}",
                    key,
                    if entry.value.is_some() {
                        ", serving previous value"
                    } else {
                        ""
                    },
                    e
                );
                entry.status = QueryStatus::Error;
                entry.error = Some(Arc::new(e));
            }
        }
        entry.notify();
    }
}

async fn fetch_with_retry<V>(
    fetcher: &Fetcher<V>,
    key: &QueryKey,
    retry: u32,
    retry_delay: Duration,
) -> Result<V, Error> {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retry => {
                let delay = retry_delay
                    .saturating_mul(2u32.saturating_pow(attempt))
                    .min(MAX_RETRY_DELAY);
                debug!(
                    "Fetch for {} failed (attempt {}), retrying in {:?}: {}",
                    key,
                    attempt + 1,
                    delay,
                    e
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shared handle to a cache instance. Clones refer to the same entries.
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.lock().len())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl<V> Default for QueryCache<V>
where
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(QueryOptions::default())
    }
}

impl<V> QueryCache<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(options: QueryOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                options,
                next_generation: AtomicU64::new(1),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.inner.options
    }

    /// Installs a value as freshly fetched. Any running fetch keeps going and
    /// overwrites the value if it resolves later.
    pub fn seed(&self, key: QueryKey, value: V) {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .entry(key)
            .or_insert_with(|| self.inner.new_entry(now));
        entry.value = Some(Arc::new(value));
        entry.status = QueryStatus::Success;
        entry.error = None;
        entry.updated_at = Some(now);
        entry.fetched_at = Some(Utc::now());
        entry.notify();
    }

    pub fn read(&self, key: &QueryKey) -> Snapshot<V> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(Entry::snapshot)
            .unwrap_or_else(Snapshot::pending)
    }

    /// Registers interest in `key`. Starts a fetch when there is no value or
    /// the value is at least `stale_time` old, unless one is already running.
    pub fn subscribe<F, Fut>(&self, key: QueryKey, fetcher: F, stale_time: Duration) -> Subscription<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let fetcher: Fetcher<V> = Arc::new(move || fetcher().boxed());
        let now = Instant::now();

        let mut entries = self.inner.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| self.inner.new_entry(now));
        entry.subscribers += 1;
        entry.inactive_since = None;

        if entry.in_flight.is_none() && entry.is_stale(now, stale_time) {
            self.start_fetch(&key, entry, Arc::clone(&fetcher));
        } else {
            debug!("Serving {} from cache", key);
        }

        let receiver = entry.version.subscribe();
        let epoch = entry.epoch;
        drop(entries);

        Subscription {
            cache: self.clone(),
            key,
            epoch,
            fetcher,
            stale_time,
            receiver,
        }
    }

    /// Marks the value for `key` stale so the next subscribe refetches it.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.inner.entries.lock().get_mut(key) {
            entry.updated_at = None;
        }
    }

    /// Evicts entries that have had no subscribers for longer than `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let gc_time = self.inner.options.gc_time;
        let mut entries = self.inner.entries.lock();
        let before = entries.len();

        entries.retain(|key, entry| {
            let expired = entry.subscribers == 0
                && entry
                    .inactive_since
                    .is_some_and(|since| now.saturating_duration_since(since) >= gc_time);
            if expired {
                debug!("Evicting {}", key);
                if let Some(in_flight) = &entry.in_flight {
                    in_flight.abort.abort();
                }
            }
            !expired
        });

        before - entries.len()
    }

    /// Drops every entry and aborts running fetches.
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        for entry in entries.values() {
            if let Some(in_flight) = &entry.in_flight {
                in_flight.abort.abort();
            }
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start_fetch(&self, key: &QueryKey, entry: &mut Entry<V>, fetcher: Fetcher<V>) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        debug!("Starting fetch for {} (generation {})", key, generation);

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            inner.mark_loading(&task_key, generation);
            let result = fetch_with_retry(
                &fetcher,
                &task_key,
                inner.options.retry,
                inner.options.retry_delay,
            )
            .await;
            inner.resolve(&task_key, generation, result);
        });

        entry.in_flight = Some(InFlight {
            generation,
            abort: handle.abort_handle(),
        });
        entry.notify();
    }

    fn read_epoch(&self, key: &QueryKey, epoch: u64) -> Snapshot<V> {
        self.inner
            .entries
            .lock()
            .get(key)
            .filter(|entry| entry.epoch == epoch)
            .map(Entry::snapshot)
            .unwrap_or_else(Snapshot::pending)
    }

    fn trigger(
        &self,
        key: &QueryKey,
        epoch: u64,
        fetcher: &Fetcher<V>,
        stale_time: Option<Duration>,
    ) -> bool {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(key).filter(|entry| entry.epoch == epoch) else {
            return false;
        };

        let due = stale_time.is_none_or(|stale_time| entry.is_stale(now, stale_time));
        if entry.in_flight.is_some() || !due {
            return false;
        }

        self.start_fetch(key, entry, Arc::clone(fetcher));
        true
    }

    fn unsubscribe(&self, key: &QueryKey, epoch: u64) {
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(key).filter(|entry| entry.epoch == epoch) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                entry.inactive_since = Some(Instant::now());
            }
        }
    }
}

/// Interest in one cache key. Dropping the last subscription for a key lets
/// a running fetch finish without touching the entry.
pub struct Subscription<V>
where
    V: Send + Sync + 'static,
{
    cache: QueryCache<V>,
    key: QueryKey,
    epoch: u64,
    fetcher: Fetcher<V>,
    stale_time: Duration,
    receiver: watch::Receiver<u64>,
}

impl<V> fmt::Debug for Subscription<V>
where
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("stale_time", &self.stale_time)
            .finish()
    }
}

impl<V> Subscription<V>
where
    V: Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current state of the entry this subscription was created on. An entry
    /// recreated after `clear` or eviction reads as pending.
    pub fn snapshot(&self) -> Snapshot<V> {
        self.cache.read_epoch(&self.key, self.epoch)
    }

    /// Waits for the next change to the entry. Returns `None` once the entry
    /// has been evicted or the cache cleared.
    pub async fn changed(&mut self) -> Option<Snapshot<V>> {
        self.receiver.changed().await.ok()?;
        self.receiver.borrow_and_update();
        Some(self.snapshot())
    }

    /// Waits until no fetch is running for the key.
    pub async fn settled(&mut self) -> Snapshot<V> {
        loop {
            self.receiver.borrow_and_update();
            let snapshot = self.snapshot();
            if !snapshot.is_fetching {
                return snapshot;
            }
            if self.receiver.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Starts a background fetch if the value is stale and none is running.
    pub fn revalidate(&self) -> bool {
        self.cache
            .trigger(&self.key, self.epoch, &self.fetcher, Some(self.stale_time))
    }

    /// Starts a background fetch unless one is already running.
    pub fn refetch(&self) -> bool {
        self.cache.trigger(&self.key, self.epoch, &self.fetcher, None)
    }
}

impl<V> Drop for Subscription<V>
where
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, self.epoch);
    }
}
