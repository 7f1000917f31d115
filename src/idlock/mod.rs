//! One mutual-exclusion lock per resource identifier.
//!
//! [`IdLock`] keeps a table of `{id -> (lock, references)}` behind a single
//! outer mutex. The outer mutex only guards table mutation; the per-id
//! [`tokio::sync::Mutex`] guards the resource itself, so operations on
//! distinct ids never wait on each other. An entry is created by the first
//! acquirer and removed by the last releaser, with the reference count check
//! and the removal done under the same outer guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::error;

/// Internal lock-table inconsistencies. These indicate a bug in [`IdLock`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IdLockError {
    /// The entry for an id vanished while a reference was outstanding.
    #[error("lock entry for {id} missing on release")]
    MissingEntry {
        /// Resource identifier.
        id: String,
    },
    /// The entry's reference count was already zero on release.
    #[error("lock entry for {id} released with zero references")]
    ZeroReferences {
        /// Resource identifier.
        id: String,
    },
}

#[derive(Debug)]
struct Entry {
    lock: Arc<AsyncMutex<()>>,
    references: usize,
}

type Table = Arc<Mutex<HashMap<String, Entry>>>;

fn lock_table(table: &Mutex<HashMap<String, Entry>>) -> MutexGuard<'_, HashMap<String, Entry>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry handing out exclusive per-id locks.
#[derive(Clone, Debug, Default)]
pub struct IdLock {
    table: Table,
}

impl IdLock {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `id` is free and returns a guard holding it.
    ///
    /// Dropping the returned future before it resolves gives up the
    /// reservation without leaking the table entry.
    pub async fn acquire(&self, id: &str) -> IdLockGuard {
        let reservation = self.reserve(id);
        let guard = Arc::clone(&reservation.lock).lock_owned().await;
        IdLockGuard {
            _guard: guard,
            reservation,
        }
    }

    /// Number of ids with an outstanding holder or waiter.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    /// Returns `true` when no id is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock_table(&self.table).is_empty()
    }

    /// Outstanding references (holder plus waiters) for `id`.
    #[must_use]
    pub fn references(&self, id: &str) -> usize {
        lock_table(&self.table)
            .get(id)
            .map_or(0, |entry| entry.references)
    }

    fn reserve(&self, id: &str) -> Reservation {
        let mut table = lock_table(&self.table);
        let entry = table.entry(id.to_owned()).or_insert_with(|| Entry {
            lock: Arc::new(AsyncMutex::new(())),
            references: 0,
        });
        entry.references += 1;
        Reservation {
            table: Arc::clone(&self.table),
            id: id.to_owned(),
            lock: Arc::clone(&entry.lock),
            released: false,
        }
    }
}

/// A counted reference on a table entry, returned on drop.
#[derive(Debug)]
struct Reservation {
    table: Table,
    id: String,
    lock: Arc<AsyncMutex<()>>,
    released: bool,
}

impl Reservation {
    fn release(&mut self) -> Result<(), IdLockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut table = lock_table(&self.table);
        let Some(entry) = table.get_mut(&self.id) else {
            return Err(IdLockError::MissingEntry {
                id: self.id.clone(),
            });
        };
        if !Arc::ptr_eq(&entry.lock, &self.lock) {
            return Err(IdLockError::MissingEntry {
                id: self.id.clone(),
            });
        }
        if entry.references == 0 {
            return Err(IdLockError::ZeroReferences {
                id: self.id.clone(),
            });
        }
        entry.references -= 1;
        if entry.references == 0 {
            table.remove(&self.id);
        }
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(id = %self.id, error = %err, "id lock invariant violated");
        }
    }
}

/// Exclusive hold on one resource id. Released on drop.
#[derive(Debug)]
pub struct IdLockGuard {
    // Field order matters: the per-id lock is released before the table
    // reference is returned.
    _guard: OwnedMutexGuard<()>,
    reservation: Reservation,
}

impl IdLockGuard {
    /// Identifier held by this guard.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.reservation.id
    }

    /// Releases the lock, reporting table inconsistencies instead of only
    /// logging them.
    ///
    /// # Errors
    ///
    /// Returns [`IdLockError`] when the lock table no longer matches this
    /// guard.
    pub fn release(self) -> Result<(), IdLockError> {
        let Self {
            _guard: guard,
            mut reservation,
        } = self;
        drop(guard);
        reservation.release()
    }
}

#[cfg(test)]
mod tests;
