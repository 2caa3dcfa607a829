//! Escrow service - the operations of the escrow state machine
//!
//! This module coordinates the transaction lifecycle from initiation
//! through payment, shipping, and settlement. Every state mutation goes
//! through the store's per-transaction lock; gateway and collaborator
//! calls always happen outside the critical section.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::EscrowError;
use crate::gateway::{ChargeState, GatewayCharge, PaymentGateway, PhoneNumber};
use crate::marketplace::{ProductCatalog, UserDirectory};
use crate::models::{
    Courier, EscrowEvent, PaymentStatus, ProductId, Resolution, TrackingEntry, TrackingStatus,
    Transaction, TransactionId, UserId,
};
use crate::store::TransactionStore;
use crate::EscrowResult;

/// Configuration for the escrow service
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Hours before escrowed funds auto-release to the seller
    pub auto_release_after_hours: i64,
    /// Prefix for gateway account references shown on buyer statements
    pub account_reference_prefix: String,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            auto_release_after_hours: 72,
            account_reference_prefix: "SOK".to_string(),
        }
    }
}

/// What triggered a forced settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceTrigger {
    /// A dispute ruling
    DisputeRuling,
    /// The auto-release timer
    AutoRelease,
}

/// Escrow lifecycle operations over the transaction store
pub struct EscrowService {
    config: EscrowConfig,
    store: Arc<TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn ProductCatalog>,
    directory: Arc<dyn UserDirectory>,
}

impl EscrowService {
    /// Create the escrow service over its store and collaborators
    pub fn new(
        config: EscrowConfig,
        store: Arc<TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn ProductCatalog>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            catalog,
            directory,
        }
    }

    /// Start a purchase: reserve the product and create a transaction
    /// awaiting payment
    pub async fn initiate(&self, buyer: UserId, product: ProductId) -> EscrowResult<Transaction> {
        let listing = self.catalog.get(product).await?;
        if !listing.available {
            return Err(EscrowError::ProductUnavailable {
                product_id: product,
            });
        }
        if listing.seller == buyer {
            return Err(EscrowError::SelfTrade);
        }

        let seller = self.directory.profile(listing.seller).await?;
        if !seller.verified_seller {
            return Err(EscrowError::SellerUnverified {
                seller_id: listing.seller,
            });
        }

        // Reservation is the visible side effect on the catalog; a
        // concurrent buyer loses here with ProductUnavailable.
        self.catalog.reserve(product).await?;

        let transaction = Transaction::new(
            buyer,
            listing.seller,
            product,
            listing.price,
            self.config.auto_release_after_hours,
        );
        info!(
            transaction_id = %transaction.id,
            %buyer,
            seller = %listing.seller,
            %product,
            amount = %transaction.amount,
            "transaction initiated"
        );
        let snapshot = transaction.clone();
        self.store.insert(transaction);
        Ok(snapshot)
    }

    /// Charge the buyer's mobile-money account and store the gateway
    /// reference for webhook correlation
    ///
    /// The charge happens before any lock is taken; a gateway failure
    /// leaves the transaction in `payment-pending` for the caller to
    /// retry with backoff. A retried charge rebinds the reference.
    pub async fn request_payment(
        &self,
        id: TransactionId,
        actor: UserId,
        phone: &str,
    ) -> EscrowResult<GatewayCharge> {
        let phone = PhoneNumber::parse(phone)?;

        let snapshot = self.store.get(id).await?;
        snapshot.require_buyer(actor)?;
        match snapshot.payment_status {
            PaymentStatus::Pending => {}
            PaymentStatus::InEscrow => {
                return Err(EscrowError::AlreadyInEscrow { transaction_id: id })
            }
            _ => return Err(EscrowError::AlreadyReleased { transaction_id: id }),
        }

        let account_reference = format!(
            "{}-{}",
            self.config.account_reference_prefix,
            id.simple()
        );
        let charge = self
            .gateway
            .charge(&phone, snapshot.amount, &account_reference)
            .await?;

        let reference = charge.reference.clone();
        let previous = self
            .store
            .update(id, |tx| {
                tx.phone_number = Some(phone.as_str().to_string());
                Ok(tx.gateway_reference.replace(reference.clone()))
            })
            .await?;
        self.store
            .bind_gateway_reference(id, &charge.reference, previous.as_deref());

        info!(
            transaction_id = %id,
            reference = %charge.reference,
            "payment requested from gateway"
        );
        Ok(charge)
    }

    /// Confirm the buyer's payment, holding funds in escrow and
    /// starting the auto-release deadline
    pub async fn confirm_payment(&self, id: TransactionId, actor: UserId) -> EscrowResult<Transaction> {
        let now = Utc::now();
        let tx = self
            .store
            .update(id, |tx| {
                tx.require_buyer(actor)?;
                tx.apply_event(EscrowEvent::PaymentConfirmed, now)?;
                Ok(tx.clone())
            })
            .await?;
        info!(
            transaction_id = %id,
            release_date = ?tx.escrow_release_date,
            "payment held in escrow"
        );
        Ok(tx)
    }

    /// Gateway webhook entry point: correlate the callback reference
    /// back to its transaction and confirm the payment
    pub async fn confirm_payment_by_reference(
        &self,
        reference: &str,
        receipt: Option<&str>,
    ) -> EscrowResult<Transaction> {
        let id = self
            .store
            .find_by_gateway_reference(reference)
            .ok_or_else(|| {
                EscrowError::validation(format!("unknown gateway reference: {reference}"))
            })?;

        let now = Utc::now();
        let receipt = receipt.map(str::to_string);
        let tx = self
            .store
            .update(id, |tx| {
                tx.apply_event(EscrowEvent::PaymentConfirmed, now)?;
                tx.gateway_receipt = receipt;
                Ok(tx.clone())
            })
            .await?;
        info!(transaction_id = %id, reference, "payment confirmed via gateway callback");
        Ok(tx)
    }

    /// Poll the gateway for the outcome of a pending charge
    ///
    /// Confirms the payment on success; cancels the transaction and
    /// releases the product on a definitive failure. A still-pending
    /// charge changes nothing.
    pub async fn reconcile_payment(&self, id: TransactionId) -> EscrowResult<ChargeState> {
        let snapshot = self.store.get(id).await?;
        if snapshot.payment_status != PaymentStatus::Pending {
            return Err(EscrowError::AlreadyInEscrow { transaction_id: id });
        }
        let reference = snapshot.gateway_reference.clone().ok_or_else(|| {
            EscrowError::validation("no gateway reference to reconcile against")
        })?;

        let state = self.gateway.status(&reference).await?;
        let now = Utc::now();
        match &state {
            ChargeState::Pending => {}
            ChargeState::Completed { receipt } => {
                let receipt = receipt.clone();
                self.store
                    .update(id, |tx| {
                        tx.apply_event(EscrowEvent::PaymentConfirmed, now)?;
                        tx.gateway_receipt = Some(receipt);
                        Ok(())
                    })
                    .await?;
                info!(transaction_id = %id, reference, "payment reconciled as completed");
            }
            ChargeState::Failed { reason } => {
                let reason = reason.clone();
                let product = self
                    .store
                    .update(id, |tx| {
                        tx.apply_event(EscrowEvent::Abandoned, now)?;
                        tx.failure_reason = Some(reason.clone());
                        Ok(tx.product)
                    })
                    .await?;
                self.catalog.release(product).await?;
                warn!(transaction_id = %id, reference, "payment failed, transaction cancelled");
            }
        }
        Ok(state)
    }

    /// Record the seller's shipping proof and mark the transaction
    /// shipped
    pub async fn upload_shipping_proof(
        &self,
        id: TransactionId,
        actor: UserId,
        proof: &str,
        tracking_number: Option<String>,
        courier: Option<Courier>,
    ) -> EscrowResult<Transaction> {
        if proof.trim().is_empty() {
            return Err(EscrowError::validation("shipping proof cannot be empty"));
        }

        let now = Utc::now();
        let proof = proof.to_string();
        let tx = self
            .store
            .update(id, move |tx| {
                tx.require_seller(actor)?;
                tx.apply_event(EscrowEvent::ProofUploaded, now)?;
                tx.shipping_proof = Some(proof);
                tx.tracking_number = tracking_number;
                tx.courier = courier;
                tx.tracking_updates.push(TrackingEntry {
                    status: TrackingStatus::Shipped,
                    description: "Seller uploaded shipping proof".to_string(),
                    location: None,
                    timestamp: now,
                    updated_by: actor,
                });
                Ok(tx.clone())
            })
            .await?;
        info!(transaction_id = %id, "shipping proof uploaded, transaction shipped");
        Ok(tx)
    }

    /// Buyer confirms delivery, releasing escrowed funds to the seller
    ///
    /// Idempotent: a second call fails with `AlreadyReleased` and never
    /// re-credits.
    pub async fn confirm_delivery(&self, id: TransactionId, actor: UserId) -> EscrowResult<Transaction> {
        let now = Utc::now();
        let tx = self
            .store
            .update(id, |tx| {
                tx.require_buyer(actor)?;
                tx.apply_event(EscrowEvent::BuyerConfirmedDelivery, now)?;
                Ok(tx.clone())
            })
            .await?;
        info!(
            transaction_id = %id,
            seller = %tx.seller,
            amount = %tx.amount,
            "delivery confirmed, escrow released to seller"
        );
        Ok(tx)
    }

    /// Abandon a transaction before payment, returning the product to
    /// the catalog
    pub async fn cancel(&self, id: TransactionId, actor: UserId) -> EscrowResult<Transaction> {
        let now = Utc::now();
        let tx = self
            .store
            .update(id, |tx| {
                let party = tx.require_party(actor)?;
                tx.apply_event(EscrowEvent::Abandoned, now)?;
                tx.failure_reason = Some(format!("cancelled by {party:?}").to_lowercase());
                Ok(tx.clone())
            })
            .await?;
        self.catalog.release(tx.product).await?;
        info!(transaction_id = %id, %actor, "transaction cancelled before payment");
        Ok(tx)
    }

    /// Forcibly settle a transaction on behalf of the dispute manager
    /// or the auto-release scheduler
    ///
    /// Runs under the same per-transaction lock as the buyer-facing
    /// operations, so a forced release racing a manual confirmation
    /// loses cleanly with `AlreadyReleased`.
    pub async fn force_transition(
        &self,
        id: TransactionId,
        outcome: Resolution,
        trigger: ForceTrigger,
    ) -> EscrowResult<Transaction> {
        let now = Utc::now();
        let event = match trigger {
            ForceTrigger::AutoRelease => {
                if outcome != Resolution::ReleaseSeller {
                    return Err(EscrowError::validation(
                        "auto-release can only release to the seller",
                    ));
                }
                EscrowEvent::AutoReleased
            }
            ForceTrigger::DisputeRuling => EscrowEvent::Ruled(outcome),
        };

        let tx = self
            .store
            .update(id, |tx| {
                tx.apply_event(event, now)?;
                Ok(tx.clone())
            })
            .await?;
        info!(
            transaction_id = %id,
            ?outcome,
            ?trigger,
            payment_status = %tx.payment_status,
            "forced settlement applied"
        );
        Ok(tx)
    }

    /// Snapshot of one transaction
    pub async fn get(&self, id: TransactionId) -> EscrowResult<Transaction> {
        self.store.get(id).await
    }
}
