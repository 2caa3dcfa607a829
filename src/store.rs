//! Transaction store with per-transaction locking
//!
//! Exclusively owns all Transaction records. Every mutation runs under
//! that transaction's own mutex, scoped to one read-check-write; no
//! external call ever happens inside the critical section. Committed
//! transitions land in an append-only state history.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::EscrowError;
use crate::models::{StateChange, Transaction, TransactionId, UserId};
use crate::EscrowResult;

/// Configuration for the transaction store
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Per-transaction lock acquisition timeout in milliseconds
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
        }
    }
}

/// Durable record of transactions and their full state history
pub struct TransactionStore {
    config: StoreConfig,
    transactions: DashMap<TransactionId, Arc<Mutex<Transaction>>>,
    by_gateway_reference: DashMap<String, TransactionId>,
    history: RwLock<Vec<StateChange>>,
}

impl TransactionStore {
    /// Create an empty store
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            transactions: DashMap::new(),
            by_gateway_reference: DashMap::new(),
            history: RwLock::new(Vec::new()),
        }
    }

    fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.config.lock_timeout_ms)
    }

    /// Insert a newly created transaction
    pub fn insert(&self, transaction: Transaction) {
        debug!(transaction_id = %transaction.id, "storing transaction");
        self.transactions
            .insert(transaction.id, Arc::new(Mutex::new(transaction)));
    }

    fn cell(&self, id: TransactionId) -> EscrowResult<Arc<Mutex<Transaction>>> {
        self.transactions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(EscrowError::TransactionNotFound { transaction_id: id })
    }

    /// Snapshot of one transaction
    pub async fn get(&self, id: TransactionId) -> EscrowResult<Transaction> {
        let cell = self.cell(id)?;
        let guard = tokio::time::timeout(self.lock_timeout(), cell.lock())
            .await
            .map_err(|_| EscrowError::LockTimeout { transaction_id: id })?;
        Ok(guard.clone())
    }

    /// Apply a mutation under the transaction's exclusive lock
    ///
    /// The closure is synchronous and runs for the whole critical
    /// section; callers perform gateway or collaborator calls before
    /// entering it. A committed status or payment change is appended to
    /// the state history before the lock is dropped.
    pub async fn update<R, F>(&self, id: TransactionId, f: F) -> EscrowResult<R>
    where
        F: FnOnce(&mut Transaction) -> EscrowResult<R>,
    {
        let cell = self.cell(id)?;
        let mut guard = tokio::time::timeout(self.lock_timeout(), cell.lock())
            .await
            .map_err(|_| EscrowError::LockTimeout { transaction_id: id })?;

        let before = (guard.status, guard.payment_status);
        let result = f(&mut guard)?;
        let after = (guard.status, guard.payment_status);

        if before != after {
            let change = StateChange {
                transaction_id: id,
                at: guard.updated_at,
                from_status: before.0,
                to_status: after.0,
                from_payment: before.1,
                to_payment: after.1,
            };
            debug!(
                transaction_id = %id,
                from = %change.from_status,
                to = %change.to_status,
                "state transition committed"
            );
            self.history.write().await.push(change);
        }

        Ok(result)
    }

    /// Bind a payment-gateway reference to a transaction for webhook
    /// correlation; a retried charge rebinds and unindexes the stale one
    pub fn bind_gateway_reference(
        &self,
        id: TransactionId,
        reference: &str,
        previous: Option<&str>,
    ) {
        if let Some(stale) = previous {
            self.by_gateway_reference.remove(stale);
        }
        self.by_gateway_reference.insert(reference.to_string(), id);
    }

    /// Resolve a gateway callback to its transaction
    pub fn find_by_gateway_reference(&self, reference: &str) -> Option<TransactionId> {
        self.by_gateway_reference
            .get(reference)
            .map(|entry| *entry.value())
    }

    /// Transactions due for auto-release at `now`
    ///
    /// Uses try_lock so the scan never waits on entries that are mid
    /// mutation; a busy transaction is simply picked up by a later
    /// sweep, or skipped for good once the race is lost.
    pub fn auto_release_candidates(&self, now: DateTime<Utc>) -> Vec<TransactionId> {
        let mut due = Vec::new();
        for entry in self.transactions.iter() {
            if let Ok(guard) = entry.value().try_lock() {
                if guard.eligible_for_auto_release(now) {
                    due.push(guard.id);
                }
            }
        }
        due
    }

    /// Snapshots of every transaction a user participates in
    pub async fn transactions_for_user(&self, user: UserId) -> Vec<Transaction> {
        self.snapshot_where(|tx| tx.buyer == user || tx.seller == user)
            .await
    }

    /// Snapshots of transactions matching a predicate
    pub async fn snapshot_where<P>(&self, pred: P) -> Vec<Transaction>
    where
        P: Fn(&Transaction) -> bool,
    {
        let cells: Vec<Arc<Mutex<Transaction>>> = self
            .transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut out = Vec::new();
        for cell in cells {
            if let Ok(guard) = tokio::time::timeout(self.lock_timeout(), cell.lock()).await {
                if pred(&guard) {
                    out.push(guard.clone());
                }
            }
        }
        out
    }

    /// State history of one transaction, in commit order
    pub async fn history_for(&self, id: TransactionId) -> Vec<StateChange> {
        self.history
            .read()
            .await
            .iter()
            .filter(|change| change.transaction_id == id)
            .cloned()
            .collect()
    }

    /// Number of stored transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn hold_lock_for_test(
        &self,
        id: TransactionId,
    ) -> tokio::sync::OwnedMutexGuard<Transaction> {
        let cell = self.cell(id).expect("transaction exists");
        cell.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amount, EscrowEvent, PaymentStatus, TransactionStatus};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn store() -> TransactionStore {
        TransactionStore::new(StoreConfig::default())
    }

    fn sample_transaction() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Amount::new(dec!(1000)).unwrap(),
            72,
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store();
        let tx = sample_transaction();
        let id = tx.id;
        store.insert(tx);

        let found = store.get(id).await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, TransactionStatus::PaymentPending);

        let missing = store.get(Uuid::new_v4()).await;
        assert!(matches!(
            missing.unwrap_err(),
            EscrowError::TransactionNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_records_history() {
        let store = store();
        let tx = sample_transaction();
        let id = tx.id;
        store.insert(tx);

        store
            .update(id, |tx| tx.apply_event(EscrowEvent::PaymentConfirmed, Utc::now()))
            .await
            .unwrap();

        let history = store.history_for(id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, TransactionStatus::PaymentPending);
        assert_eq!(history[0].to_status, TransactionStatus::InEscrow);
        assert_eq!(history[0].to_payment, PaymentStatus::InEscrow);
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_no_history() {
        let store = store();
        let tx = sample_transaction();
        let id = tx.id;
        store.insert(tx);

        let result = store
            .update(id, |tx| tx.apply_event(EscrowEvent::ProofUploaded, Utc::now()))
            .await;
        assert!(result.is_err());
        assert!(store.history_for(id).await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_timeout_surfaced_distinctly() {
        let store = Arc::new(TransactionStore::new(StoreConfig { lock_timeout_ms: 50 }));
        let tx = sample_transaction();
        let id = tx.id;
        store.insert(tx);

        let _held = store.hold_lock_for_test(id).await;

        let result = store.update(id, |_| Ok(())).await;
        let err = result.unwrap_err();
        assert!(matches!(err, EscrowError::LockTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_gateway_reference_rebind() {
        let store = store();
        let tx = sample_transaction();
        let id = tx.id;
        store.insert(tx);

        store.bind_gateway_reference(id, "REF-1", None);
        assert_eq!(store.find_by_gateway_reference("REF-1"), Some(id));

        store.bind_gateway_reference(id, "REF-2", Some("REF-1"));
        assert_eq!(store.find_by_gateway_reference("REF-1"), None);
        assert_eq!(store.find_by_gateway_reference("REF-2"), Some(id));
    }

    #[tokio::test]
    async fn test_concurrent_updates_serialize() {
        let store = Arc::new(store());
        let tx = sample_transaction();
        let id = tx.id;
        let seller = tx.seller;
        store.insert(tx);

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(id, move |tx| {
                        tx.tracking_updates.push(crate::models::TrackingEntry {
                            status: crate::models::TrackingStatus::InTransit,
                            description: format!("hop {i}"),
                            location: None,
                            timestamp: Utc::now(),
                            updated_by: seller,
                        });
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let tx = store.get(id).await.unwrap();
        assert_eq!(tx.tracking_updates.len(), 20);
    }

    #[tokio::test]
    async fn test_transactions_for_user() {
        let store = store();
        let tx = sample_transaction();
        let buyer = tx.buyer;
        let seller = tx.seller;
        store.insert(tx);
        store.insert(sample_transaction());

        assert_eq!(store.transactions_for_user(buyer).await.len(), 1);
        assert_eq!(store.transactions_for_user(seller).await.len(), 1);
        assert!(store.transactions_for_user(Uuid::new_v4()).await.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_candidate_scan_skips_busy_entries() {
        let store = Arc::new(store());
        let mut tx = sample_transaction();
        let now = Utc::now();
        tx.apply_event(EscrowEvent::PaymentConfirmed, now).unwrap();
        tx.apply_event(EscrowEvent::ProofUploaded, now).unwrap();
        let id = tx.id;
        store.insert(tx);

        let later = now + chrono::Duration::hours(73);
        assert_eq!(store.auto_release_candidates(later), vec![id]);

        let _held = store.hold_lock_for_test(id).await;
        assert!(store.auto_release_candidates(later).is_empty());
    }
}
