//! The abstract coordination-store capability.
//!
//! The core only needs four operations from the shared store: atomically
//! create a liveness-bound key if absent, read a key, list the children of
//! a prefix, and idempotently ensure a prefix exists. Expressing them as a
//! trait keeps the allocator and sanity checker testable against an
//! in-memory implementation and keeps the store client's own mechanics
//! (sessions, retries, watches) out of the bootstrap logic.

/// Outcome of an atomic create-if-absent.
///
/// `AlreadyExists` is expected control flow for the allocator's slot scan,
/// not an error: the scan branches on this value rather than catching a
/// failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The key did not exist and is now owned by this process.
    Created,
    /// Another live process holds the key.
    AlreadyExists,
}

/// A coordination-store operation failed at the transport or data level.
///
/// Always fatal to bootstrap: the store is the source of truth for worker
/// identity, and guessing in its absence risks fleet-wide ID collisions.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("coordination store unavailable: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed value at {path}: {reason}")]
    MalformedValue { path: String, reason: String },
}

impl StoreError {
    pub(crate) fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Abstract key/value coordination store with liveness-bound creation.
///
/// A "liveness-bound" key exists only while the owning process maintains
/// its session with the store; when the process dies, the store reclaims
/// the key and the worker slot it represents.
#[allow(async_fn_in_trait)]
pub trait CoordinationStore {
    /// Atomically creates `path` with `value`, bound to this process's
    /// liveness, if and only if it does not already exist.
    async fn create_live(&self, path: &str, value: &str) -> Result<CreateOutcome, StoreError>;

    /// Reads the value at `path`, if any.
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Lists the direct children of `path` as (child key, value) pairs.
    async fn list_children(&self, path: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Idempotently ensures `path` exists as a listable prefix. Losing a
    /// creation race against another process is success.
    async fn ensure_path(&self, path: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory [`CoordinationStore`] with the same atomic
    /// create-if-absent semantics as the real backend. Liveness binding is
    /// trivial: the map dies with the test process.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        entries: Mutex<BTreeMap<String, String>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds an entry, pretending some other live process created it.
        pub fn insert(&self, path: &str, value: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(path.to_string(), value.to_string());
        }

        pub fn get(&self, path: &str) -> Option<String> {
            self.entries.lock().unwrap().get(path).cloned()
        }
    }

    impl CoordinationStore for MemoryStore {
        async fn create_live(&self, path: &str, value: &str) -> Result<CreateOutcome, StoreError> {
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(path) {
                return Ok(CreateOutcome::AlreadyExists);
            }
            entries.insert(path.to_string(), value.to_string());
            Ok(CreateOutcome::Created)
        }

        async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
            Ok(self.entries.lock().unwrap().get(path).cloned())
        }

        async fn list_children(&self, path: &str) -> Result<Vec<(String, String)>, StoreError> {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(key, value)| {
                    let child = key.strip_prefix(&prefix)?;
                    if child.is_empty() || child.contains('/') {
                        return None;
                    }
                    Some((child.to_string(), value.clone()))
                })
                .collect())
        }

        async fn ensure_path(&self, _path: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// A store whose every operation fails, for exercising the
    /// abort-on-store-failure paths.
    #[derive(Debug, Default)]
    pub struct UnavailableStore;

    impl UnavailableStore {
        fn unavailable() -> StoreError {
            StoreError::transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "store offline",
            ))
        }
    }

    impl CoordinationStore for UnavailableStore {
        async fn create_live(&self, _path: &str, _value: &str) -> Result<CreateOutcome, StoreError> {
            Err(Self::unavailable())
        }

        async fn read(&self, _path: &str) -> Result<Option<String>, StoreError> {
            Err(Self::unavailable())
        }

        async fn list_children(&self, _path: &str) -> Result<Vec<(String, String)>, StoreError> {
            Err(Self::unavailable())
        }

        async fn ensure_path(&self, _path: &str) -> Result<(), StoreError> {
            Err(Self::unavailable())
        }
    }

    #[tokio::test]
    async fn create_live_is_first_writer_wins() {
        let store = MemoryStore::new();
        assert_eq!(
            store.create_live("/t/workers/0", "a:1").await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            store.create_live("/t/workers/0", "b:2").await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(store.get("/t/workers/0").as_deref(), Some("a:1"));
    }

    #[tokio::test]
    async fn list_children_returns_only_direct_children() {
        let store = MemoryStore::new();
        store.insert("/t/workers/0", "a:1");
        store.insert("/t/workers/1", "b:2");
        store.insert("/t/workers/1/extra", "nested");
        store.insert("/t/other", "x");

        let mut children = store.list_children("/t/workers").await.unwrap();
        children.sort();
        assert_eq!(
            children,
            vec![
                ("0".to_string(), "a:1".to_string()),
                ("1".to_string(), "b:2".to_string()),
            ]
        );
    }
}
