//! Built program cache.
//!
//! One slot per [`BuildIdentity`]. The map lock is only held long enough to
//! find or create a slot; the slot lock is held across the build, so a
//! given identity is built at most once while unrelated identities build in
//! parallel. Entries are never evicted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;

use super::identity::BuildIdentity;
use crate::error::Result;

type Slot<P> = Arc<Mutex<Option<Arc<P>>>>;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    /// Number of successful builds
    pub builds: usize,
    pub entries: usize,
}

pub struct ProgramCache<P> {
    slots: Mutex<FxHashMap<BuildIdentity, Slot<P>>>,
    hits: AtomicUsize,
    builds: AtomicUsize,
    entries: AtomicUsize,
}

impl<P> ProgramCache<P> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(FxHashMap::default()),
            hits: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
            entries: AtomicUsize::new(0),
        }
    }

    fn slot(&self, identity: &BuildIdentity) -> Slot<P> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(identity.clone()).or_default())
    }

    /// Returns the cached program for `identity`, running `build` on a miss.
    ///
    /// A failed build leaves the slot empty so the next caller tries again.
    pub fn get_or_build<F>(&self, identity: &BuildIdentity, build: F) -> Result<Arc<P>>
    where
        F: FnOnce() -> Result<P>,
    {
        let slot = self.slot(identity);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(program) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Program cache hit: {}", identity);
            return Ok(Arc::clone(program));
        }

        log::debug!("Program cache miss: {}", identity);
        let program = Arc::new(build()?);
        *guard = Some(Arc::clone(&program));
        self.builds.fetch_add(1, Ordering::Relaxed);

        // A clear() during the build detached this slot from the map.
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(identity).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
            self.entries.fetch_add(1, Ordering::Relaxed);
        }
        Ok(program)
    }

    /// Returns the program if it has already been built.
    pub fn get(&self, identity: &BuildIdentity) -> Option<Arc<P>> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(identity).cloned()
        }?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(Arc::clone)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
        }
    }

    /// Drops every cached program.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.clear();
        self.entries.store(0, Ordering::Relaxed);
    }
}

impl<P> Default for ProgramCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_builds_once_per_identity() {
        let cache = ProgramCache::<String>::new();
        let id = BuildIdentity::new("conv2d", ["-DFOO=1", "-DBAR=2"]);
        let reordered = BuildIdentity::new("conv2d", ["-DBAR=2", "-DFOO=1"]);

        let a = cache.get_or_build(&id, || Ok("prog".to_string())).unwrap();
        let b = cache
            .get_or_build(&reordered, || panic!("must not rebuild"))
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                builds: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_failed_build_is_retried() {
        let cache = ProgramCache::<u32>::new();
        let id = BuildIdentity::new("softmax", ["-DN=4"]);

        let err = cache
            .get_or_build(&id, || Err(RuntimeError::driver("Build", -11)))
            .unwrap_err();
        assert_eq!(err.driver_code(), Some(-11));
        assert!(cache.get(&id).is_none());
        assert_eq!(cache.stats().entries, 0);

        let program = cache.get_or_build(&id, || Ok(7)).unwrap();
        assert_eq!(*program, 7);
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        let cache = Arc::new(ProgramCache::<usize>::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let id = BuildIdentity::new("matmul", ["-DTILE=16"]);
                    barrier.wait();
                    cache
                        .get_or_build(&id, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(10));
                            Ok(42)
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.join().unwrap(), 42);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 7);
    }

    #[test]
    fn test_clear() {
        let cache = ProgramCache::<u8>::new();
        let id = BuildIdentity::new("relu", Vec::<&str>::new());
        cache.get_or_build(&id, || Ok(1)).unwrap();
        cache.clear();
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn test_distinct_identities_build_in_parallel() {
        const THREADS: usize = 4;
        const BUILD_TIME: Duration = Duration::from_millis(200);

        let cache = ProgramCache::<usize>::new();
        let barrier = Barrier::new(THREADS);
        let started = Instant::now();

        thread::scope(|s| {
            for i in 0..THREADS {
                let cache = &cache;
                let barrier = &barrier;
                s.spawn(move || {
                    let id = BuildIdentity::new("conv2d", [format!("-DTILE={}", i)]);
                    barrier.wait();
                    cache
                        .get_or_build(&id, || {
                            thread::sleep(BUILD_TIME);
                            Ok(i)
                        })
                        .unwrap();
                });
            }
        });

        let elapsed = started.elapsed();
        assert!(
            elapsed < BUILD_TIME * 2,
            "{} builds took {:?}, expected about {:?}",
            THREADS,
            elapsed,
            BUILD_TIME
        );
        assert_eq!(cache.stats().builds, THREADS);
        assert_eq!(cache.stats().entries, THREADS);
    }

    #[test]
    fn test_clear_during_build() {
        let cache = ProgramCache::<u32>::new();
        let id = BuildIdentity::new("softmax", ["-DN=8"]);
        let started = Barrier::new(2);
        let resume = Barrier::new(2);

        thread::scope(|s| {
            let builder = s.spawn(|| {
                cache
                    .get_or_build(&id, || {
                        started.wait();
                        resume.wait();
                        Ok(3)
                    })
                    .unwrap()
            });

            started.wait();
            cache.clear();
            resume.wait();
            assert_eq!(*builder.join().unwrap(), 3);
        });

        assert!(cache.get(&id).is_none());
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.builds, 1);
    }
}
