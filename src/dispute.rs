//! Dispute lifecycle management
//!
//! Disputes are 1:1 with their transaction, claimed atomically through
//! a per-transaction index. Opening freezes the workflow in `disputed`
//! without touching the escrowed funds; resolving is the only path out,
//! forcing a settlement and optionally penalizing the seller through
//! the external user directory.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::EscrowError;
use crate::escrow::{EscrowService, ForceTrigger};
use crate::marketplace::UserDirectory;
use crate::models::{
    Dispute, DisputeId, DisputeReason, EscrowEvent, Party, Resolution, SellerPenalty,
    TransactionId, UserId,
};
use crate::store::TransactionStore;
use crate::EscrowResult;

/// Coordinates dispute opening, responses, and resolution
pub struct DisputeManager {
    store: Arc<TransactionStore>,
    escrow: Arc<EscrowService>,
    directory: Arc<dyn UserDirectory>,
    disputes: DashMap<DisputeId, Dispute>,
    /// Uniqueness index enforcing one dispute per transaction
    by_transaction: DashMap<TransactionId, DisputeId>,
}

impl DisputeManager {
    /// Create the dispute manager over its collaborators
    pub fn new(
        store: Arc<TransactionStore>,
        escrow: Arc<EscrowService>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            escrow,
            directory,
            disputes: DashMap::new(),
            by_transaction: DashMap::new(),
        }
    }

    /// Open a dispute on a transaction, freezing it in `disputed`
    ///
    /// The transaction index entry is claimed before the transition so
    /// two racing openers cannot both create a dispute; the loser gets
    /// `DisputeExists`.
    pub async fn open(
        &self,
        transaction_id: TransactionId,
        actor: UserId,
        reason: DisputeReason,
        description: &str,
        evidence: Vec<String>,
    ) -> EscrowResult<Dispute> {
        if description.trim().is_empty() {
            return Err(EscrowError::validation("dispute description cannot be empty"));
        }

        let dispute = Dispute::new(
            transaction_id,
            actor,
            reason,
            description.to_string(),
            evidence,
        );

        // Atomic 1:1 claim on the transaction.
        match self.by_transaction.entry(transaction_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(EscrowError::DisputeExists { transaction_id });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(dispute.id);
            }
        }

        let now = Utc::now();
        let transitioned = self
            .store
            .update(transaction_id, |tx| {
                tx.require_party(actor)?;
                tx.apply_event(EscrowEvent::DisputeOpened, now)?;
                tx.dispute_reason = Some(reason);
                Ok(())
            })
            .await;
        if let Err(e) = transitioned {
            self.by_transaction.remove(&transaction_id);
            return Err(e);
        }

        info!(
            dispute_id = %dispute.id,
            %transaction_id,
            ?reason,
            priority = ?dispute.priority,
            "dispute opened"
        );
        self.disputes.insert(dispute.id, dispute.clone());
        Ok(dispute)
    }

    /// Record a party's response, one slot per side
    pub async fn respond(
        &self,
        dispute_id: DisputeId,
        actor: UserId,
        text: &str,
    ) -> EscrowResult<Dispute> {
        let transaction_id = self.get(dispute_id)?.transaction_id;
        let transaction = self.store.get(transaction_id).await?;
        let party = transaction.require_party(actor)?;

        let mut entry = self
            .disputes
            .get_mut(&dispute_id)
            .ok_or(EscrowError::DisputeNotFound { dispute_id })?;
        if !entry.status.accepts_responses() {
            return Err(EscrowError::DisputeClosed { dispute_id });
        }

        match party {
            Party::Buyer => entry.buyer_response = Some(text.to_string()),
            Party::Seller => entry.seller_response = Some(text.to_string()),
        }
        entry.updated_at = Utc::now();
        info!(%dispute_id, ?party, "dispute response recorded");
        Ok(entry.clone())
    }

    /// Resolve a dispute: settle the transaction and apply any seller
    /// penalty
    ///
    /// The resolver claim is atomic, so two racing admins cannot both
    /// rule. When the dispute was opened after the buyer confirmed,
    /// the settlement completes the workflow but leaves the released
    /// payment where it is; the ruling is still recorded and penalties
    /// still apply. The penalty itself is best-effort: once the funds
    /// have moved, a directory outage cannot undo the ruling.
    pub async fn resolve(
        &self,
        dispute_id: DisputeId,
        resolver: UserId,
        resolution: Resolution,
        details: &str,
        penalty: SellerPenalty,
        penalty_duration_days: Option<u32>,
    ) -> EscrowResult<Dispute> {
        if resolution == Resolution::Pending {
            return Err(EscrowError::validation("a ruling must pick an outcome"));
        }

        // Claim the dispute for this resolver.
        let transaction_id = {
            let mut entry = self
                .disputes
                .get_mut(&dispute_id)
                .ok_or(EscrowError::DisputeNotFound { dispute_id })?;
            if entry.status.is_settled() || entry.resolved_by.is_some() {
                return Err(EscrowError::AlreadyResolved { dispute_id });
            }
            entry.resolved_by = Some(resolver);
            entry.transaction_id
        };

        let settled = self
            .escrow
            .force_transition(transaction_id, resolution, ForceTrigger::DisputeRuling)
            .await;
        let seller = match settled {
            Ok(tx) => tx.seller,
            Err(e) => {
                // Release the claim so the ruling can be retried.
                if let Some(mut entry) = self.disputes.get_mut(&dispute_id) {
                    entry.resolved_by = None;
                }
                return Err(e);
            }
        };

        // The funds have moved; record the ruling before any further
        // side effect so a collaborator failure cannot leave a settled
        // transaction behind an open dispute.
        let now = Utc::now();
        let resolved = {
            let mut entry = self
                .disputes
                .get_mut(&dispute_id)
                .ok_or(EscrowError::DisputeNotFound { dispute_id })?;
            entry.status = crate::models::DisputeStatus::Resolved;
            entry.resolution = Some(resolution);
            entry.resolution_details = Some(details.to_string());
            entry.resolved_at = Some(now);
            entry.seller_penalty = penalty;
            entry.penalty_duration_days = penalty_duration_days;
            if penalty != SellerPenalty::None {
                entry.penalty_reason = Some(details.to_string());
            }
            entry.updated_at = now;
            entry.clone()
        };

        if penalty != SellerPenalty::None {
            match self
                .directory
                .penalize(seller, penalty, penalty_duration_days)
                .await
            {
                Ok(()) => warn!(%dispute_id, %seller, ?penalty, "seller penalty applied"),
                Err(e) => {
                    // The ruling stands either way; the penalty is an
                    // account-side action the directory can replay.
                    warn!(%dispute_id, %seller, ?penalty, error = %e, "seller penalty could not be applied")
                }
            }
        }

        info!(%dispute_id, %transaction_id, ?resolution, "dispute resolved");
        Ok(resolved)
    }

    /// Snapshot of one dispute
    pub fn get(&self, dispute_id: DisputeId) -> EscrowResult<Dispute> {
        self.disputes
            .get(&dispute_id)
            .map(|entry| entry.clone())
            .ok_or(EscrowError::DisputeNotFound { dispute_id })
    }

    /// The dispute owning a transaction, if any
    pub fn for_transaction(&self, transaction_id: TransactionId) -> Option<Dispute> {
        let id = *self.by_transaction.get(&transaction_id)?;
        self.disputes.get(&id).map(|entry| entry.clone())
    }

    /// Unsettled disputes, most urgent first
    pub fn open_disputes(&self) -> Vec<Dispute> {
        let mut open: Vec<Dispute> = self
            .disputes
            .iter()
            .filter(|entry| !entry.status.is_settled())
            .map(|entry| entry.clone())
            .collect();
        open.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::EscrowConfig;
    use crate::gateway::{SandboxGateway, SandboxGatewayConfig};
    use crate::marketplace::{InMemoryCatalog, InMemoryDirectory};
    use crate::models::{
        Amount, DisputePriority, DisputeStatus, PaymentStatus, TransactionStatus,
    };
    use crate::store::StoreConfig;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Fixture {
        escrow: Arc<EscrowService>,
        disputes: Arc<DisputeManager>,
        catalog: Arc<InMemoryCatalog>,
        directory: Arc<InMemoryDirectory>,
        buyer: UserId,
        seller: UserId,
        tx: TransactionId,
    }

    /// A transaction with funds held in escrow
    async fn escrowed_fixture() -> Fixture {
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
            catalog.clone(),
            directory.clone(),
        ));
        let disputes = Arc::new(DisputeManager::new(
            store,
            escrow.clone(),
            directory.clone(),
        ));

        let tx = escrow.initiate(buyer, product).await.unwrap();
        escrow.confirm_payment(tx.id, buyer).await.unwrap();

        Fixture {
            escrow,
            disputes,
            catalog,
            directory,
            buyer,
            seller,
            tx: tx.id,
        }
    }

    /// A second escrowed transaction for the same parties
    async fn second_escrowed(f: &Fixture) -> TransactionId {
        let product = f
            .catalog
            .add_listing(f.seller, "Sneakers", Amount::new(dec!(900)).unwrap())
            .await;
        let tx = f.escrow.initiate(f.buyer, product).await.unwrap();
        f.escrow.confirm_payment(tx.id, f.buyer).await.unwrap();
        tx.id
    }

    #[tokio::test]
    async fn test_open_freezes_transaction_and_keeps_funds() {
        let f = escrowed_fixture().await;
        let dispute = f
            .disputes
            .open(f.tx, f.buyer, DisputeReason::FakeItem, "counterfeit", vec![])
            .await
            .unwrap();

        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.priority, DisputePriority::High);

        let tx = f.escrow.get(f.tx).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Disputed);
        assert_eq!(tx.payment_status, PaymentStatus::InEscrow);
        assert_eq!(tx.dispute_reason, Some(DisputeReason::FakeItem));
    }

    #[tokio::test]
    async fn test_second_dispute_rejected() {
        let f = escrowed_fixture().await;
        f.disputes
            .open(f.tx, f.buyer, DisputeReason::FakeItem, "counterfeit", vec![])
            .await
            .unwrap();

        let second = f
            .disputes
            .open(f.tx, f.seller, DisputeReason::Other, "counter claim", vec![])
            .await;
        assert!(matches!(
            second.unwrap_err(),
            EscrowError::DisputeExists { .. }
        ));
    }

    #[tokio::test]
    async fn test_open_requires_party_and_disputable_state() {
        let f = escrowed_fixture().await;

        let outsider = f
            .disputes
            .open(f.tx, Uuid::new_v4(), DisputeReason::Other, "not mine", vec![])
            .await;
        assert!(matches!(
            outsider.unwrap_err(),
            EscrowError::NotAuthorized { .. }
        ));
        // A rejected open must not leave a stale claim behind.
        assert!(f.disputes.for_transaction(f.tx).is_none());

        // payment-pending is not disputable.
        let pending = f
            .catalog
            .add_listing(f.seller, "Radio", Amount::new(dec!(300)).unwrap())
            .await;
        let pending_tx = f.escrow.initiate(f.buyer, pending).await.unwrap();
        let result = f
            .disputes
            .open(pending_tx.id, f.buyer, DisputeReason::Other, "cold feet", vec![])
            .await;
        assert!(matches!(
            result.unwrap_err(),
            EscrowError::NotDisputable { .. }
        ));
    }

    #[tokio::test]
    async fn test_respond_fills_side_slots() {
        let f = escrowed_fixture().await;
        let dispute = f
            .disputes
            .open(f.tx, f.buyer, DisputeReason::WrongItem, "wrong color", vec![])
            .await
            .unwrap();

        f.disputes
            .respond(dispute.id, f.buyer, "ordered black, got brown")
            .await
            .unwrap();
        let updated = f
            .disputes
            .respond(dispute.id, f.seller, "listing showed brown")
            .await
            .unwrap();

        assert_eq!(
            updated.buyer_response.as_deref(),
            Some("ordered black, got brown")
        );
        assert_eq!(
            updated.seller_response.as_deref(),
            Some("listing showed brown")
        );

        let outsider = f.disputes.respond(dispute.id, Uuid::new_v4(), "hi").await;
        assert!(matches!(
            outsider.unwrap_err(),
            EscrowError::NotAuthorized { .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_refunds_and_penalizes() {
        let f = escrowed_fixture().await;
        let dispute = f
            .disputes
            .open(f.tx, f.buyer, DisputeReason::FakeItem, "counterfeit", vec![])
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        let resolved = f
            .disputes
            .resolve(
                dispute.id,
                admin,
                Resolution::RefundBuyer,
                "item confirmed counterfeit",
                SellerPenalty::TemporarySuspension,
                Some(14),
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.resolution, Some(Resolution::RefundBuyer));
        assert_eq!(resolved.resolved_by, Some(admin));
        assert_eq!(resolved.seller_penalty, SellerPenalty::TemporarySuspension);

        let tx = f.escrow.get(f.tx).await.unwrap();
        assert_eq!(tx.payment_status, PaymentStatus::Refunded);
        assert_eq!(tx.status, TransactionStatus::Completed);

        let seller = f.directory.profile(f.seller).await.unwrap();
        assert!(!seller.active);
        assert!(seller.suspended_until.is_some());
    }

    #[tokio::test]
    async fn test_resolve_is_single_shot() {
        let f = escrowed_fixture().await;
        let dispute = f
            .disputes
            .open(f.tx, f.buyer, DisputeReason::NonDelivery, "never arrived", vec![])
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        f.disputes
            .resolve(
                dispute.id,
                admin,
                Resolution::RefundBuyer,
                "no proof of shipment",
                SellerPenalty::Warning,
                None,
            )
            .await
            .unwrap();

        let again = f
            .disputes
            .resolve(
                dispute.id,
                admin,
                Resolution::ReleaseSeller,
                "changed my mind",
                SellerPenalty::None,
                None,
            )
            .await;
        let err = again.unwrap_err();
        assert!(matches!(err, EscrowError::AlreadyResolved { .. }));
        assert!(err.is_already_settled());

        // Responses are closed after resolution.
        let response = f.disputes.respond(dispute.id, f.buyer, "thanks").await;
        assert!(matches!(
            response.unwrap_err(),
            EscrowError::DisputeClosed { .. }
        ));
    }

    /// Directory whose penalty endpoint is down
    struct OutageDirectory {
        inner: InMemoryDirectory,
    }

    #[async_trait::async_trait]
    impl crate::marketplace::UserDirectory for OutageDirectory {
        async fn profile(&self, user_id: UserId) -> EscrowResult<crate::marketplace::UserProfile> {
            self.inner.profile(user_id).await
        }

        async fn penalize(
            &self,
            _user_id: UserId,
            _penalty: SellerPenalty,
            _duration_days: Option<u32>,
        ) -> EscrowResult<()> {
            Err(EscrowError::internal("directory unavailable"))
        }
    }

    #[tokio::test]
    async fn test_resolve_survives_penalty_failure() {
        let store = Arc::new(TransactionStore::new(StoreConfig::default()));
        let gateway = Arc::new(SandboxGateway::new(SandboxGatewayConfig::default()));
        let catalog = Arc::new(InMemoryCatalog::new());
        let directory = Arc::new(OutageDirectory {
            inner: InMemoryDirectory::new(),
        });

        let buyer = directory.inner.add_user("amina", false).await;
        let seller = directory.inner.add_user("kamau", true).await;
        let product = catalog
            .add_listing(seller, "Leather jacket", Amount::new(dec!(2500)).unwrap())
            .await;

        let escrow = Arc::new(EscrowService::new(
            EscrowConfig::default(),
            store.clone(),
            gateway,
            catalog,
            directory.clone(),
        ));
        let disputes = DisputeManager::new(store, escrow.clone(), directory);

        let tx = escrow.initiate(buyer, product).await.unwrap();
        escrow.confirm_payment(tx.id, buyer).await.unwrap();
        let dispute = disputes
            .open(tx.id, buyer, DisputeReason::FakeItem, "counterfeit", vec![])
            .await
            .unwrap();

        // The ruling must stand even though the penalty cannot be
        // delivered: the funds already moved.
        let resolved = disputes
            .resolve(
                dispute.id,
                Uuid::new_v4(),
                Resolution::RefundBuyer,
                "item confirmed counterfeit",
                SellerPenalty::TemporarySuspension,
                Some(14),
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.resolution, Some(Resolution::RefundBuyer));
        assert_eq!(resolved.seller_penalty, SellerPenalty::TemporarySuspension);

        let settled = escrow.get(tx.id).await.unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Refunded);

        // No open dispute is left stranded behind the settlement.
        let again = disputes
            .resolve(
                dispute.id,
                Uuid::new_v4(),
                Resolution::RefundBuyer,
                "retry",
                SellerPenalty::None,
                None,
            )
            .await;
        assert!(matches!(
            again.unwrap_err(),
            EscrowError::AlreadyResolved { .. }
        ));
        assert!(disputes.open_disputes().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_after_release_records_ruling_without_moving_money() {
        let f = escrowed_fixture().await;
        f.escrow.confirm_delivery(f.tx, f.buyer).await.unwrap();

        // delivery-confirmed is still disputable.
        let dispute = f
            .disputes
            .open(f.tx, f.buyer, DisputeReason::DamagedGoods, "arrived cracked", vec![])
            .await
            .unwrap();

        let resolved = f
            .disputes
            .resolve(
                dispute.id,
                Uuid::new_v4(),
                Resolution::RefundBuyer,
                "goodwill refund handled off-ledger",
                SellerPenalty::None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);

        let tx = f.escrow.get(f.tx).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        // Released funds are immutable; the ruling is descriptive only.
        assert_eq!(tx.payment_status, PaymentStatus::Released);
        assert_eq!(tx.payment_released_to, Some(f.seller));
    }

    #[tokio::test]
    async fn test_open_disputes_sorted_by_priority() {
        let f = escrowed_fixture().await;
        let second_tx = second_escrowed(&f).await;

        let low = f
            .disputes
            .open(f.tx, f.buyer, DisputeReason::Other, "late", vec![])
            .await
            .unwrap();
        let high = f
            .disputes
            .open(second_tx, f.buyer, DisputeReason::FakeItem, "fake", vec![])
            .await
            .unwrap();

        let open = f.disputes.open_disputes();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, high.id);
        assert_eq!(open[1].id, low.id);
    }
}
