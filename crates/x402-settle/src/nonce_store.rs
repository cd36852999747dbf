use alloy::primitives::{Address, B256};
use dashmap::DashMap;

use crate::X402Error;

/// Storage for consumed authorization nonces, keyed by `(authorizer, nonce)`.
///
/// A record is created once and never removed: a consumed nonce stays consumed
/// for the lifetime of the ledger. Implementations must be thread-safe.
///
/// A backend failure is an `Err`, never a guess: the ledger reports it as
/// unavailable rather than as a used nonce.
pub trait NonceStore: Send + Sync {
    /// Check if `nonce` has already been consumed for `authorizer`.
    fn is_used(&self, authorizer: Address, nonce: &B256) -> Result<bool, X402Error>;

    /// Atomically check that the nonce is unused and record it.
    /// Returns `Ok(true)` if the nonce was claimed, `Ok(false)` if it was already used.
    fn try_use(
        &self,
        authorizer: Address,
        nonce: B256,
        recorded_at: u64,
    ) -> Result<bool, X402Error>;

    /// Number of consumed nonces.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory nonce store backed by DashMap. Fast but lost on restart.
#[derive(Default)]
pub struct InMemoryNonceStore {
    nonces: DashMap<(Address, B256), u64>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn is_used(&self, authorizer: Address, nonce: &B256) -> Result<bool, X402Error> {
        Ok(self.nonces.contains_key(&(authorizer, *nonce)))
    }

    fn try_use(
        &self,
        authorizer: Address,
        nonce: B256,
        recorded_at: u64,
    ) -> Result<bool, X402Error> {
        use dashmap::mapref::entry::Entry;
        match self.nonces.entry((authorizer, nonce)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(recorded_at);
                Ok(true)
            }
        }
    }

    fn len(&self) -> usize {
        self.nonces.len()
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteNonceStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Persistent nonce store backed by SQLite. Survives restarts.
    pub struct SqliteNonceStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteNonceStore {
        /// Open (or create) a SQLite nonce database at the given path.
        ///
        /// On Unix the file is restricted to 0600.
        pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
            let conn = rusqlite::Connection::open(path)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS used_authorizations (
                    authorizer BLOB NOT NULL,
                    nonce BLOB NOT NULL,
                    recorded_at INTEGER NOT NULL,
                    PRIMARY KEY (authorizer, nonce)
                );
                PRAGMA journal_mode=WAL;",
            )?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "failed to set nonce database file permissions to 0600"
                    );
                }
            }

            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
            match self.conn.lock() {
                Ok(c) => c,
                Err(poisoned) => {
                    tracing::error!("nonce store mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            }
        }
    }

    impl NonceStore for SqliteNonceStore {
        fn is_used(&self, authorizer: Address, nonce: &B256) -> Result<bool, X402Error> {
            let count: i64 = self
                .conn()
                .query_row(
                    "SELECT COUNT(*) FROM used_authorizations \
                     WHERE authorizer = ?1 AND nonce = ?2",
                    rusqlite::params![authorizer.as_slice(), nonce.as_slice()],
                    |row| row.get(0),
                )
                .map_err(|e| X402Error::StoreError(format!("nonce lookup: {e}")))?;
            Ok(count > 0)
        }

        fn try_use(
            &self,
            authorizer: Address,
            nonce: B256,
            recorded_at: u64,
        ) -> Result<bool, X402Error> {
            // The PRIMARY KEY makes a reused nonce insert nothing, atomically
            // across processes sharing the file.
            let recorded_at = i64::try_from(recorded_at).unwrap_or(i64::MAX);
            let inserted = self
                .conn()
                .execute(
                    "INSERT OR IGNORE INTO used_authorizations (authorizer, nonce, recorded_at) \
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![authorizer.as_slice(), nonce.as_slice(), recorded_at],
                )
                .map_err(|e| X402Error::StoreError(format!("nonce claim: {e}")))?;
            Ok(inserted == 1)
        }

        fn len(&self) -> usize {
            self.conn()
                .query_row("SELECT COUNT(*) FROM used_authorizations", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| usize::try_from(n).unwrap_or(0))
                .unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_try_use_is_single_shot() {
        let store = InMemoryNonceStore::new();
        let payer = Address::repeat_byte(0x01);
        let nonce = B256::repeat_byte(0x99);

        assert!(!store.is_used(payer, &nonce).unwrap());
        assert!(store.try_use(payer, nonce, 10).unwrap());
        assert!(!store.try_use(payer, nonce, 11).unwrap());
        assert!(store.is_used(payer, &nonce).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_in_memory_nonces_scoped_per_authorizer() {
        let store = InMemoryNonceStore::new();
        let nonce = B256::repeat_byte(0x42);
        let a = Address::repeat_byte(0x0a);
        let b = Address::repeat_byte(0x0b);

        assert!(store.try_use(a, nonce, 1).unwrap());
        assert!(!store.is_used(b, &nonce).unwrap());
        assert!(store.try_use(b, nonce, 1).unwrap());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_try_use_is_single_shot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.db");
        let store = SqliteNonceStore::open(path.to_str().unwrap()).unwrap();
        let payer = Address::repeat_byte(0x01);
        let nonce = B256::repeat_byte(0x99);

        assert!(store.try_use(payer, nonce, 10).unwrap());
        assert!(!store.try_use(payer, nonce, 10).unwrap());
        assert!(store.is_used(payer, &nonce).unwrap());
        assert!(!store.is_used(Address::repeat_byte(0x02), &nonce).unwrap());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.db");
        let payer = Address::repeat_byte(0x01);
        let nonce = B256::repeat_byte(0xaa);

        {
            let store = SqliteNonceStore::open(path.to_str().unwrap()).unwrap();
            assert!(store.try_use(payer, nonce, 10).unwrap());
        }

        // A fresh handle on the same file must still reject the nonce
        let store = SqliteNonceStore::open(path.to_str().unwrap()).unwrap();
        assert!(store.is_used(payer, &nonce).unwrap());
        assert!(!store.try_use(payer, nonce, 20).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_failure_is_an_error_not_a_used_nonce() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.db");
        let store = SqliteNonceStore::open(path.to_str().unwrap()).unwrap();
        let payer = Address::repeat_byte(0x01);
        let nonce = B256::repeat_byte(0x5e);

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE used_authorizations;")
            .unwrap();

        assert!(matches!(
            store.is_used(payer, &nonce),
            Err(X402Error::StoreError(_))
        ));
        assert!(matches!(
            store.try_use(payer, nonce, 10),
            Err(X402Error::StoreError(_))
        ));
    }
}
