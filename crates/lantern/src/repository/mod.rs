//
// repository/mod.rs
//
// Uniform load/cache/search contract shared by every data domain. Each
// domain owns one snapshot of immutable records plus an insertion-ordered
// name index, rebuilt atomically after each successful load.
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::cache::BoundedCache;
use crate::error::Fault;

pub mod auth;
pub mod components;
pub mod configs;
pub mod env_vars;
pub mod inertia;
pub mod livewire;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod translations;
pub mod validation;
pub mod views;

/// A domain record addressable by its primary name/key.
pub trait NamedRecord: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;
}

/// What happens when two records of one load share a name.
///
/// Deliberately per-domain rather than unified: translations keep the first
/// occurrence (locale precedence), routes keep the last definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    FirstWins,
    LastWins,
}

/// Uniform surface the facade and the watcher may call. Presentation code
/// must not reach past this into cache or index internals.
#[async_trait]
pub trait Repository: Send + Sync {
    fn label(&self) -> &'static str;

    /// Idempotent under concurrency: when a load is in flight, further
    /// calls return immediately without starting a second acquisition.
    async fn load(&self);

    /// Clear the cache, then load — always a fresh acquisition attempt.
    async fn reload(&self);

    fn count(&self) -> usize;
}

struct Snapshot<R> {
    records: Vec<R>,
    index: IndexMap<String, usize>,
}

impl<R> Default for Snapshot<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: IndexMap::new(),
        }
    }
}

/// Shared state machinery for one domain: single-flight guard, snapshot,
/// name index, and the domain's bounded cache.
pub struct RepoCore<R: NamedRecord> {
    label: &'static str,
    policy: CollisionPolicy,
    loading: AtomicBool,
    snapshot: RwLock<Snapshot<R>>,
    cache: BoundedCache<Arc<Vec<R>>>,
}

/// Clears the loading flag when a load finishes or is dropped mid-flight.
pub struct LoadGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<R: NamedRecord> RepoCore<R> {
    pub fn new(label: &'static str, policy: CollisionPolicy, cache_ttl: Duration) -> Self {
        Self {
            label,
            policy,
            loading: AtomicBool::new(false),
            snapshot: RwLock::new(Snapshot::default()),
            cache: BoundedCache::new(cache_ttl),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Single-flight entry: `None` means a load is already in flight and
    /// the caller should return immediately.
    pub fn begin_load(&self) -> Option<LoadGuard<'_>> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(LoadGuard {
                flag: &self.loading,
            })
        } else {
            log::trace!("{}: load already in flight, coalescing", self.label);
            None
        }
    }

    /// Rebuild the snapshot from the cache without touching the bridge or
    /// the filesystem. Returns false on a cache miss.
    pub fn restore_from_cache(&self) -> bool {
        let Some(cached) = self.cache.get(self.label) else {
            return false;
        };
        self.swap_snapshot(cached.as_ref().clone());
        log::trace!("{}: restored {} records from cache", self.label, self.count());
        true
    }

    /// Replace the snapshot and write it through to the cache.
    pub fn install(&self, records: Vec<R>) {
        let installed = self.swap_snapshot(records);
        self.cache.set(self.label, installed);
    }

    /// Atomically replace records and index. A concurrent reader sees
    /// either the old snapshot or the new one, never a partially-updated
    /// index.
    fn swap_snapshot(&self, records: Vec<R>) -> Arc<Vec<R>> {
        let mut deduped: Vec<R> = Vec::with_capacity(records.len());
        let mut index: IndexMap<String, usize> = IndexMap::with_capacity(records.len());
        for record in records {
            let name = record.name().to_string();
            match index.get(&name) {
                Some(&at) => match self.policy {
                    CollisionPolicy::FirstWins => {}
                    CollisionPolicy::LastWins => deduped[at] = record,
                },
                None => {
                    index.insert(name, deduped.len());
                    deduped.push(record);
                }
            }
        }

        let installed = Arc::new(deduped.clone());
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Snapshot {
            records: deduped,
            index,
        };
        installed
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// O(1) lookup by exact primary name.
    pub fn find_by_name(&self, name: &str) -> Option<R> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        guard
            .index
            .get(name)
            .map(|&at| guard.records[at].clone())
    }

    /// Case-insensitive substring match on the primary name. An empty
    /// prefix returns every record. Order is the insertion order of the
    /// last successful load; ranking is a presentation concern.
    pub fn search(&self, prefix: &str) -> Vec<R> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        if prefix.is_empty() {
            return guard.records.clone();
        }
        let needle = prefix.to_lowercase();
        guard
            .records
            .iter()
            .filter(|r| r.name().to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .len()
    }
}

/// Shared load driver: single-flight, cache-first, acquire on miss, keep
/// the prior snapshot on failure.
pub(crate) async fn run_load<R, F, Fut>(core: &RepoCore<R>, acquire: F)
where
    R: NamedRecord,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<R>, Fault>>,
{
    let Some(_guard) = core.begin_load() else {
        return;
    };
    if core.restore_from_cache() {
        return;
    }
    match acquire().await {
        Ok(records) => {
            core.install(records);
            log::info!("Loaded {} {}", core.count(), core.label());
        }
        Err(fault) => {
            // Prior snapshot stays in place; degrade to stale-or-empty.
            log::warn!("Failed to load {}: {}", core.label(), fault);
        }
    }
}

pub(crate) async fn run_reload<R, F, Fut>(core: &RepoCore<R>, acquire: F)
where
    R: NamedRecord,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<R>, Fault>>,
{
    core.clear_cache();
    run_load(core, acquire).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestRecord {
        name: String,
        tag: u32,
    }

    impl NamedRecord for TestRecord {
        fn name(&self) -> &str {
            &self.name
        }
    }

    fn rec(name: &str, tag: u32) -> TestRecord {
        TestRecord {
            name: name.to_string(),
            tag,
        }
    }

    struct CountingRepo {
        core: RepoCore<TestRecord>,
        acquisitions: AtomicUsize,
        delay: Duration,
    }

    impl CountingRepo {
        fn new(policy: CollisionPolicy) -> Self {
            Self {
                core: RepoCore::new("test records", policy, Duration::from_secs(60)),
                acquisitions: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        async fn acquire(&self) -> Result<Vec<TestRecord>, Fault> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(vec![rec("alpha", 1), rec("beta", 2), rec("gamma", 3)])
        }

        async fn load(&self) {
            run_load(&self.core, || self.acquire()).await;
        }

        async fn reload(&self) {
            run_reload(&self.core, || self.acquire()).await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce_to_one_acquisition() {
        let mut repo = CountingRepo::new(CollisionPolicy::LastWins);
        repo.delay = Duration::from_millis(50);
        let repo = Arc::new(repo);

        let a = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.load().await })
        };
        let b = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.load().await })
        };
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();

        assert_eq!(repo.acquisitions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_load_hits_cache() {
        let repo = CountingRepo::new(CollisionPolicy::LastWins);
        repo.load().await;
        repo.load().await;
        assert_eq!(repo.acquisitions.load(Ordering::SeqCst), 1);
        assert_eq!(repo.core.count(), 3);
    }

    #[tokio::test]
    async fn test_reload_forces_fresh_acquisition() {
        let repo = CountingRepo::new(CollisionPolicy::LastWins);
        repo.load().await;
        repo.reload().await;
        assert_eq!(repo.acquisitions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_search_empty_prefix_returns_all_in_load_order() {
        let repo = CountingRepo::new(CollisionPolicy::LastWins);
        repo.reload().await;
        let names: Vec<_> = repo
            .core
            .search("")
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let repo = CountingRepo::new(CollisionPolicy::LastWins);
        repo.load().await;
        let hits = repo.core.search("AMM");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "gamma");
    }

    #[tokio::test]
    async fn test_failed_load_keeps_prior_snapshot() {
        let core: RepoCore<TestRecord> =
            RepoCore::new("t", CollisionPolicy::LastWins, Duration::from_secs(60));
        run_load(&core, || async { Ok(vec![rec("kept", 1)]) }).await;
        run_reload(&core, || async { Err(Fault::Process("boom".into())) }).await;
        assert_eq!(core.count(), 1);
        assert!(core.find_by_name("kept").is_some());
    }

    #[test]
    fn test_first_wins_collision_policy() {
        let core: RepoCore<TestRecord> =
            RepoCore::new("t", CollisionPolicy::FirstWins, Duration::from_secs(60));
        core.install(vec![rec("dup", 1), rec("other", 2), rec("dup", 3)]);
        assert_eq!(core.count(), 2);
        assert_eq!(core.find_by_name("dup").unwrap().tag, 1);
    }

    #[test]
    fn test_last_wins_collision_policy_replaces_in_place() {
        let core: RepoCore<TestRecord> =
            RepoCore::new("t", CollisionPolicy::LastWins, Duration::from_secs(60));
        core.install(vec![rec("dup", 1), rec("other", 2), rec("dup", 3)]);
        assert_eq!(core.count(), 2);
        assert_eq!(core.find_by_name("dup").unwrap().tag, 3);
        // Position of the first occurrence is preserved.
        let names: Vec<_> = core.search("").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["dup", "other"]);
    }

    #[test]
    fn test_find_by_name_is_exact() {
        let core: RepoCore<TestRecord> =
            RepoCore::new("t", CollisionPolicy::LastWins, Duration::from_secs(60));
        core.install(vec![rec("users.index", 1)]);
        assert!(core.find_by_name("users.index").is_some());
        assert!(core.find_by_name("users").is_none());
        assert!(core.find_by_name("USERS.INDEX").is_none());
    }
}
