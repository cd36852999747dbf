use dashmap::DashMap;

use crate::{PaymentHash, X402Error};

/// Records which payloads passed verification and when (unix seconds).
///
/// This is ordering state, not the replay guard: losing it only forces
/// re-verification, the ledger's nonce record still prevents double settlement.
pub trait VerificationStore: Send + Sync {
    /// Record a successful verification, replacing any earlier one.
    fn record(&self, hash: PaymentHash, verified_at: u64) -> Result<(), X402Error>;

    /// Verification time, if a record exists.
    ///
    /// A backend failure is an `Err`: it must not read as "never verified".
    fn get(&self, hash: &PaymentHash) -> Result<Option<u64>, X402Error>;

    /// Remove the record, returning its verification time.
    fn remove(&self, hash: &PaymentHash) -> Result<Option<u64>, X402Error>;

    /// Drop records with `now - verified_at > ttl_secs`. Returns number purged.
    fn purge_expired(&self, now: u64, ttl_secs: u64) -> Result<usize, X402Error>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store backed by DashMap.
#[derive(Default)]
pub struct InMemoryVerificationStore {
    entries: DashMap<PaymentHash, u64>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VerificationStore for InMemoryVerificationStore {
    fn record(&self, hash: PaymentHash, verified_at: u64) -> Result<(), X402Error> {
        self.entries.insert(hash, verified_at);
        Ok(())
    }

    fn get(&self, hash: &PaymentHash) -> Result<Option<u64>, X402Error> {
        Ok(self.entries.get(hash).map(|e| *e))
    }

    fn remove(&self, hash: &PaymentHash) -> Result<Option<u64>, X402Error> {
        Ok(self.entries.remove(hash).map(|(_, at)| at))
    }

    fn purge_expired(&self, now: u64, ttl_secs: u64) -> Result<usize, X402Error> {
        let before = self.entries.len();
        self.entries
            .retain(|_, verified_at| now.saturating_sub(*verified_at) <= ttl_secs);
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVerificationStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Verification records in SQLite, shared by facilitator processes on one host.
    pub struct SqliteVerificationStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteVerificationStore {
        pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
            let conn = rusqlite::Connection::open(path)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS verified_payments (
                    payment_hash BLOB PRIMARY KEY,
                    verified_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_verified_at ON verified_payments(verified_at);
                PRAGMA journal_mode=WAL;",
            )?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
            match self.conn.lock() {
                Ok(c) => c,
                Err(poisoned) => {
                    tracing::error!("verification store mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            }
        }
    }

    fn to_i64(secs: u64) -> i64 {
        i64::try_from(secs).unwrap_or(i64::MAX)
    }

    impl VerificationStore for SqliteVerificationStore {
        fn record(&self, hash: PaymentHash, verified_at: u64) -> Result<(), X402Error> {
            self.conn()
                .execute(
                    "INSERT OR REPLACE INTO verified_payments (payment_hash, verified_at) \
                     VALUES (?1, ?2)",
                    rusqlite::params![hash.as_slice(), to_i64(verified_at)],
                )
                .map(|_| ())
                .map_err(|e| X402Error::StoreError(format!("record verification: {e}")))
        }

        fn get(&self, hash: &PaymentHash) -> Result<Option<u64>, X402Error> {
            use rusqlite::OptionalExtension;
            let at = self
                .conn()
                .query_row(
                    "SELECT verified_at FROM verified_payments WHERE payment_hash = ?1",
                    [hash.as_slice()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
                .map_err(|e| X402Error::StoreError(format!("verification lookup: {e}")))?;
            Ok(at.map(|at| u64::try_from(at).unwrap_or(0)))
        }

        fn remove(&self, hash: &PaymentHash) -> Result<Option<u64>, X402Error> {
            let Some(verified_at) = self.get(hash)? else {
                return Ok(None);
            };
            self.conn()
                .execute(
                    "DELETE FROM verified_payments WHERE payment_hash = ?1",
                    [hash.as_slice()],
                )
                .map_err(|e| X402Error::StoreError(format!("verification eviction: {e}")))?;
            Ok(Some(verified_at))
        }

        fn purge_expired(&self, now: u64, ttl_secs: u64) -> Result<usize, X402Error> {
            let cutoff = to_i64(now.saturating_sub(ttl_secs));
            self.conn()
                .execute(
                    "DELETE FROM verified_payments WHERE verified_at < ?1",
                    [cutoff],
                )
                .map_err(|e| X402Error::StoreError(format!("verification purge: {e}")))
        }

        fn len(&self) -> usize {
            self.conn()
                .query_row("SELECT COUNT(*) FROM verified_payments", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| usize::try_from(n).unwrap_or(0))
                .unwrap_or(0)
        }
    }
}
