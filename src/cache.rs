use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::config::{self, Config};
use crate::error::Result;

/// Where credentials come from, plus a cheap freshness token for it.
pub trait ConfigSource: Send + Sync {
    /// Current modification stamp, or `None` if it cannot be read right now.
    fn modified(&self) -> Option<SystemTime>;

    /// Full read and parse, returning the stamp the content was taken at.
    fn load(&self) -> Result<(Config, SystemTime)>;

    fn path(&self) -> &Path;
}

/// The persisted JSON config file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }

    fn load(&self) -> Result<(Config, SystemTime)> {
        config::load(&self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Immutable point-in-time copy of the credential mapping.
///
/// Never mutated after construction; a reload builds a new one and swaps it in.
#[derive(Debug, Default)]
pub struct CredentialSnapshot {
    users: HashMap<String, String>,
    modified: Option<SystemTime>,
}

impl CredentialSnapshot {
    pub fn new<I>(users: I, modified: Option<SystemTime>) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            users: users.into_iter().collect(),
            modified,
        }
    }

    /// Exact, case-sensitive match of `pass` against the stored password.
    pub fn verify(&self, user: &str, pass: &str) -> bool {
        self.users
            .get(user)
            .is_some_and(|stored| stored.as_bytes() == pass.as_bytes())
    }

    /// Sorted usernames. Passwords never leave the snapshot.
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Reload counters
#[derive(Debug, Clone, Serialize)]
pub struct ReloadStats {
    pub reloads: u64,
    pub reload_failures: u64,
    pub users: usize,
}

/// Lazily refreshed credential store backing every request.
///
/// Reads are lock-free while the source's stamp matches the current snapshot.
/// When it changes, callers serialize on `reload_lock`, re-check the stamp, and
/// only the first one still seeing a stale snapshot loads the source. A failed
/// load keeps serving the previous snapshot.
pub struct CredentialCache {
    source: Box<dyn ConfigSource>,
    current: ArcSwap<CredentialSnapshot>,
    reload_lock: Mutex<()>,
    reloads: AtomicU64,
    reload_failures: AtomicU64,
}

impl CredentialCache {
    /// Wrap `source` with an already loaded snapshot
    pub fn new(source: impl ConfigSource + 'static, initial: CredentialSnapshot) -> Self {
        Self {
            source: Box::new(source),
            current: ArcSwap::from_pointee(initial),
            reload_lock: Mutex::new(()),
            reloads: AtomicU64::new(0),
            reload_failures: AtomicU64::new(0),
        }
    }

    /// Load `source` once up front. Fails if the initial load fails.
    pub fn open(source: impl ConfigSource + 'static) -> Result<Self> {
        let (config, modified) = source.load()?;
        let initial = CredentialSnapshot::new(config.users, Some(modified));
        Ok(Self::new(source, initial))
    }

    /// Current snapshot, reloading first if the source changed since it was built.
    pub fn get(&self) -> Arc<CredentialSnapshot> {
        let stamp = self.source.modified();
        let current = self.current.load_full();
        if stamp.is_some() && stamp == current.modified {
            return current;
        }

        let _reloading = self
            .reload_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.current.load_full();
        let stamp = self.source.modified();
        if stamp.is_some() && stamp == current.modified {
            return current;
        }

        match self.source.load() {
            Ok((config, modified)) => {
                let fresh = Arc::new(CredentialSnapshot::new(config.users, Some(modified)));
                self.current.store(Arc::clone(&fresh));
                self.reloads.fetch_add(1, Ordering::Relaxed);
                tracing::info!(users = fresh.len(), "Credentials reloaded");
                fresh
            }
            Err(e) => {
                self.reload_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    path = %self.source.path().display(),
                    error = %e,
                    users = current.len(),
                    "Failed to reload credentials, keeping previous snapshot"
                );
                current
            }
        }
    }

    /// Current snapshot without checking the source.
    pub fn current(&self) -> Arc<CredentialSnapshot> {
        self.current.load_full()
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            reloads: self.reloads.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
            users: self.current.load().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use std::collections::BTreeMap;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    /// In-memory source whose stamp and content are set by the test
    struct ScriptedSource {
        state: Mutex<(Option<SystemTime>, Option<BTreeMap<String, String>>)>,
        loads: AtomicU64,
        path: PathBuf,
    }

    impl ScriptedSource {
        fn new(users: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new((Some(SystemTime::UNIX_EPOCH), Some(to_map(users)))),
                loads: AtomicU64::new(0),
                path: PathBuf::from("scripted.json"),
            })
        }

        fn publish(&self, secs: u64, users: Option<&[(&str, &str)]>) {
            let mut state = self.state.lock().unwrap();
            state.0 = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
            state.1 = users.map(to_map);
        }

        fn loads(&self) -> u64 {
            self.loads.load(Ordering::SeqCst)
        }
    }

    fn to_map(users: &[(&str, &str)]) -> BTreeMap<String, String> {
        users
            .iter()
            .map(|(u, p)| (u.to_string(), p.to_string()))
            .collect()
    }

    impl ConfigSource for Arc<ScriptedSource> {
        fn modified(&self) -> Option<SystemTime> {
            self.state.lock().unwrap().0
        }

        fn load(&self) -> Result<(Config, SystemTime)> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            // Widen the race window for concurrent callers.
            thread::sleep(Duration::from_millis(20));
            let state = self.state.lock().unwrap();
            match (&state.0, &state.1) {
                (Some(stamp), Some(users)) => Ok((
                    Config {
                        users: users.clone(),
                        ..Config::default()
                    },
                    *stamp,
                )),
                _ => Err(ProxyError::InvalidConfig("corrupted".to_string())),
            }
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    #[test]
    fn test_unchanged_stamp_serves_same_snapshot() {
        let source = ScriptedSource::new(&[("alice", "pw")]);
        let cache = CredentialCache::open(Arc::clone(&source)).unwrap();

        let a = cache.get();
        let b = cache.get();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.loads(), 1);
        assert!(a.verify("alice", "pw"));
    }

    #[test]
    fn test_changed_stamp_triggers_reload() {
        let source = ScriptedSource::new(&[("alice", "pw")]);
        let cache = CredentialCache::open(Arc::clone(&source)).unwrap();

        source.publish(10, Some(&[("bob", "secret")]));
        let snapshot = cache.get();

        assert!(snapshot.verify("bob", "secret"));
        assert!(!snapshot.verify("alice", "pw"));
        assert_eq!(cache.stats().reloads, 1);
    }

    #[test]
    fn test_concurrent_reload_is_single_flight() {
        let source = ScriptedSource::new(&[("alice", "pw")]);
        let cache = Arc::new(CredentialCache::open(Arc::clone(&source)).unwrap());
        source.publish(42, Some(&[("alice", "new-pw")]));

        let callers = 16;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get()
                })
            })
            .collect();

        let snapshots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // One load at open, one for the new stamp.
        assert_eq!(source.loads(), 2);
        for snapshot in &snapshots {
            assert!(Arc::ptr_eq(snapshot, &snapshots[0]));
            assert!(snapshot.verify("alice", "new-pw"));
        }
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let source = ScriptedSource::new(&[("alice", "pw")]);
        let cache = CredentialCache::open(Arc::clone(&source)).unwrap();
        let before = cache.get();

        source.publish(5, None);
        let after = cache.get();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.verify("alice", "pw"));

        source.publish(6, Some(&[("carol", "pw2")]));
        assert!(cache.get().verify("carol", "pw2"));
        assert_eq!(cache.stats().reload_failures, 1);
    }

    #[test]
    fn test_file_repaired_under_same_stamp_is_picked_up() {
        let source = ScriptedSource::new(&[("alice", "old")]);
        let cache = CredentialCache::open(Arc::clone(&source)).unwrap();

        // Half-written file observed mid-rewrite.
        source.publish(7, None);
        assert!(cache.get().verify("alice", "old"));

        // Final content lands with the same coarse stamp.
        source.publish(7, Some(&[("bob", "new")]));
        let snapshot = cache.get();

        assert!(snapshot.verify("bob", "new"));
        assert!(!snapshot.verify("alice", "old"));
        assert_eq!(source.loads(), 3);
        assert_eq!(cache.stats().reload_failures, 1);
        assert_eq!(cache.stats().reloads, 1);
    }

    #[test]
    fn test_verify_is_exact() {
        let snapshot = CredentialSnapshot::new(
            [("Alice".to_string(), "Secret".to_string())],
            None,
        );

        assert!(snapshot.verify("Alice", "Secret"));
        assert!(!snapshot.verify("Alice", "secret"));
        assert!(!snapshot.verify("alice", "Secret"));
        assert!(!snapshot.verify("Alice", "Secret "));
        assert!(!snapshot.verify("nobody", ""));
    }

    #[test]
    fn test_usernames_sorted_without_passwords() {
        let snapshot = CredentialSnapshot::new(
            [
                ("zed".to_string(), "1".to_string()),
                ("amy".to_string(), "2".to_string()),
            ],
            None,
        );
        assert_eq!(snapshot.usernames(), vec!["amy", "zed"]);
    }

    #[test]
    fn test_current_does_not_reload() {
        let source = ScriptedSource::new(&[("alice", "pw")]);
        let cache = CredentialCache::open(Arc::clone(&source)).unwrap();

        source.publish(99, Some(&[("bob", "pw")]));
        let snapshot = cache.current();

        assert!(snapshot.verify("alice", "pw"));
        assert_eq!(source.loads(), 1);
    }
}
