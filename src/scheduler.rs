//! Auto-release scheduler
//!
//! A background sweep that force-releases escrowed funds to the seller
//! once the buyer's confirmation window has passed. The sweep is
//! idempotent: the selection predicate excludes anything already
//! confirmed, and the per-transaction lock makes a race against a
//! manual confirmation a clean loss, not a double release.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::EscrowError;
use crate::escrow::{EscrowService, ForceTrigger};
use crate::models::Resolution;
use crate::store::TransactionStore;
use crate::EscrowResult;

/// Configuration for the auto-release scheduler
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 3_600,
        }
    }
}

/// Periodic sweep that releases timed-out escrow to sellers
pub struct AutoReleaseScheduler {
    config: SchedulerConfig,
    store: Arc<TransactionStore>,
    escrow: Arc<EscrowService>,
    is_running: Arc<RwLock<bool>>,
}

impl AutoReleaseScheduler {
    /// Create the scheduler over the store it sweeps
    pub fn new(
        config: SchedulerConfig,
        store: Arc<TransactionStore>,
        escrow: Arc<EscrowService>,
    ) -> Self {
        Self {
            config,
            store,
            escrow,
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the background sweep loop
    pub async fn start(&self) {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return;
        }
        *is_running = true;
        info!(
            interval_secs = self.config.sweep_interval_secs,
            "auto-release scheduler started"
        );

        let store = self.store.clone();
        let escrow = self.escrow.clone();
        let running = self.is_running.clone();
        let interval_secs = self.config.sweep_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            while *running.read().await {
                interval.tick().await;
                match Self::run_sweep(&store, &escrow, Utc::now()).await {
                    Ok(released) => {
                        if released > 0 {
                            info!(released, "auto-release sweep completed");
                        }
                    }
                    Err(e) => warn!(error = %e, "auto-release sweep failed"),
                }
            }
        });
    }

    /// Stop the background sweep loop
    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            *is_running = false;
            info!("auto-release scheduler stopped");
        }
    }

    /// Sweep with the wall clock
    pub async fn sweep(&self) -> EscrowResult<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Release every transaction whose confirmation window has passed
    /// at `now`, returning the number released
    ///
    /// A candidate that was manually confirmed between selection and
    /// the forced release loses the race inside the transaction lock
    /// and is skipped; a busy or contested transaction is left for the
    /// next sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> EscrowResult<usize> {
        Self::run_sweep(&self.store, &self.escrow, now).await
    }

    async fn run_sweep(
        store: &TransactionStore,
        escrow: &EscrowService,
        now: DateTime<Utc>,
    ) -> EscrowResult<usize> {
        let candidates = store.auto_release_candidates(now);
        if candidates.is_empty() {
            return Ok(0);
        }
        debug!(candidates = candidates.len(), "auto-release candidates selected");

        let mut released = 0;
        for id in candidates {
            match escrow
                .force_transition(id, Resolution::ReleaseSeller, ForceTrigger::AutoRelease)
                .await
            {
                Ok(_) => released += 1,
                Err(e) if e.is_already_settled() => {
                    debug!(transaction_id = %id, "skipped: settled before the sweep reached it");
                }
                Err(
                    EscrowError::PaymentNotEscrowed { .. }
                    | EscrowError::StateTransition { .. },
                ) => {
                    // Disputed or otherwise moved since selection.
                    debug!(transaction_id = %id, "skipped: no longer eligible");
                }
                Err(EscrowError::LockTimeout { .. }) => {
                    warn!(transaction_id = %id, "skipped: lock busy, left for next sweep");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::EscrowConfig;
    use crate::gateway::{SandboxGateway, SandboxGatewayConfig};
    use crate::marketplace::{InMemoryCatalog, InMemoryDirectory};
    use crate::models::{Amount, PaymentStatus, TransactionId, TransactionStatus, UserId};
    use crate::store::StoreConfig;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        escrow: Arc<EscrowService>,
        scheduler: AutoReleaseScheduler,
        buyer: UserId,
        seller: UserId,
        tx: TransactionId,
    }

    /// A transaction paid and shipped with proof "TRK123"
    async fn shipped_fixture() -> Fixture {
        let store = Arc::new(TransactionStore::new(StoreConfig::default()));
        let gateway = Arc::new(SandboxGateway::new(SandboxGatewayConfig::default()));
        let catalog = Arc::new(InMemoryCatalog::new());
        let directory = Arc::new(InMemoryDirectory::new());

        let buyer = directory.add_user("amina", false).await;
        let seller = directory.add_user("kamau", true).await;
        let product = catalog
            .add_listing(seller, "Leather jacket", Amount::new(dec!(2500)).unwrap())
            .await;

        let escrow = Arc::new(EscrowService::new(
            EscrowConfig::default(),
            store.clone(),
            gateway,
            catalog,
            directory,
        ));
        let scheduler =
            AutoReleaseScheduler::new(SchedulerConfig::default(), store, escrow.clone());

        let tx = escrow.initiate(buyer, product).await.unwrap();
        escrow.confirm_payment(tx.id, buyer).await.unwrap();
        escrow
            .upload_shipping_proof(tx.id, seller, "TRK123", None, None)
            .await
            .unwrap();

        Fixture {
            escrow,
            scheduler,
            buyer,
            seller,
            tx: tx.id,
        }
    }

    #[tokio::test]
    async fn test_sweep_releases_after_72_hours() {
        let f = shipped_fixture().await;
        let proof_at = f
            .escrow
            .get(f.tx)
            .await
            .unwrap()
            .shipping_proof_uploaded_at
            .unwrap();

        // Never earlier than the window.
        assert_eq!(
            f.scheduler.sweep_at(proof_at + Duration::hours(71)).await.unwrap(),
            0
        );

        let released = f
            .scheduler
            .sweep_at(proof_at + Duration::hours(73))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let tx = f.escrow.get(f.tx).await.unwrap();
        assert_eq!(tx.payment_status, PaymentStatus::Released);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.payment_released_to, Some(f.seller));
        assert!(tx.auto_confirmed_at.is_some());
        assert!(tx.delivery_confirmed_at.is_none());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let f = shipped_fixture().await;
        let later = Utc::now() + Duration::hours(73);

        assert_eq!(f.scheduler.sweep_at(later).await.unwrap(), 1);
        assert_eq!(f.scheduler.sweep_at(later).await.unwrap(), 0);
        assert_eq!(f.scheduler.sweep_at(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_confirmed_delivery() {
        let f = shipped_fixture().await;
        f.escrow.confirm_delivery(f.tx, f.buyer).await.unwrap();

        let later = Utc::now() + Duration::hours(73);
        assert_eq!(f.scheduler.sweep_at(later).await.unwrap(), 0);

        let tx = f.escrow.get(f.tx).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::DeliveryConfirmed);
        assert!(tx.auto_confirmed_at.is_none());
    }

    #[tokio::test]
    async fn test_race_with_manual_confirmation_releases_once() {
        let f = shipped_fixture().await;
        let later = Utc::now() + Duration::hours(73);

        let escrow = f.escrow.clone();
        let tx = f.tx;
        let buyer = f.buyer;
        let confirm = tokio::spawn(async move { escrow.confirm_delivery(tx, buyer).await });
        let released = f.scheduler.sweep_at(later).await.unwrap();
        let confirmed = confirm.await.unwrap();

        // Exactly one of the two effects wins.
        let manual_won = confirmed.is_ok();
        assert_ne!(manual_won, released == 1);
        if let Err(e) = confirmed {
            assert!(e.is_already_settled());
        }

        let snapshot = f.escrow.get(f.tx).await.unwrap();
        assert_eq!(snapshot.payment_status, PaymentStatus::Released);
        assert_eq!(snapshot.payment_released_to, Some(f.seller));
        // The winner's stamp, never both.
        assert_ne!(
            snapshot.delivery_confirmed_at.is_some(),
            snapshot.auto_confirmed_at.is_some()
        );
    }
}
