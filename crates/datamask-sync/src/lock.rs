//! In-process table leases.
//!
//! A table is processed by at most one run at a time within a process. The
//! PostgreSQL sink additionally takes a transaction-scoped advisory lock so
//! separate processes serialize as well.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Registry of tables currently being synchronized.
#[derive(Debug, Clone, Default)]
pub struct TableLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease a table, failing with [`SyncError::TableBusy`] if it is already leased.
    pub fn acquire(&self, table: &str) -> Result<TableLease> {
        let mut held = self.held.lock();
        if !held.insert(table.to_string()) {
            return Err(SyncError::TableBusy(table.to_string()));
        }
        debug!("{}: lease acquired", table);
        Ok(TableLease {
            table: table.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    /// Check whether a table is currently leased.
    pub fn is_held(&self, table: &str) -> bool {
        self.held.lock().contains(table)
    }
}

/// Lease on one table, released on drop.
#[derive(Debug)]
pub struct TableLease {
    table: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl TableLease {
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Drop for TableLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.table);
        debug!("{}: lease released", self.table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let locks = TableLocks::new();
        let lease = locks.acquire("clientes").unwrap();
        assert_eq!(lease.table(), "clientes");
        let err = locks.acquire("clientes").unwrap_err();
        assert!(matches!(err, SyncError::TableBusy(ref t) if t == "clientes"));
        assert!(err.is_retryable());
        assert!(locks.acquire("pedidos").is_ok());
    }

    #[test]
    fn test_lease_released_on_drop() {
        let locks = TableLocks::new();
        {
            let _lease = locks.acquire("clientes").unwrap();
            assert!(locks.is_held("clientes"));
        }
        assert!(!locks.is_held("clientes"));
        assert!(locks.acquire("clientes").is_ok());
    }

    #[test]
    fn test_clones_share_registry() {
        let locks = TableLocks::new();
        let other = locks.clone();
        let _lease = locks.acquire("clientes").unwrap();
        assert!(other.acquire("clientes").is_err());
    }
}
