//! Append-only shipment tracking ledger
//!
//! Tracking entries are delivery evidence owned by their transaction;
//! once appended they are never rewritten. Ordering by timestamp is a
//! presentation concern only, storage order is insertion order.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::EscrowError;
use crate::models::{
    Courier, EscrowEvent, TrackingEntry, TrackingStatus, TransactionId, TransactionStatus, UserId,
};
use crate::store::TransactionStore;
use crate::EscrowResult;

/// One courier the marketplace recognizes, with its tracking page
#[derive(Debug, Clone, serde::Serialize)]
pub struct CourierInfo {
    pub courier: Courier,
    pub label: &'static str,
    pub tracking_url: Option<String>,
}

/// Seller-facing shipment event log over the transaction store
pub struct TrackingLedger {
    store: Arc<TransactionStore>,
}

impl TrackingLedger {
    /// Create the ledger over its store
    pub fn new(store: Arc<TransactionStore>) -> Self {
        Self { store }
    }

    /// Append a shipment event to a transaction's ledger
    ///
    /// Seller-only. A `delivered` event promotes a shipped transaction
    /// to `delivered`; this is descriptive and moves no money, the
    /// buyer's confirmation or the auto-release timer still gate the
    /// escrow.
    pub async fn append(
        &self,
        transaction_id: TransactionId,
        actor: UserId,
        status: TrackingStatus,
        description: &str,
        location: Option<String>,
    ) -> EscrowResult<TrackingEntry> {
        if description.trim().is_empty() {
            return Err(EscrowError::validation("tracking description cannot be empty"));
        }

        let now = Utc::now();
        let description = description.to_string();
        let entry = self
            .store
            .update(transaction_id, move |tx| {
                tx.require_seller(actor)?;
                if tx.status.is_terminal() {
                    return Err(EscrowError::state_transition(
                        tx.status.to_string(),
                        "tracking-append".to_string(),
                        "transaction no longer accepts tracking updates".to_string(),
                    ));
                }

                if status == TrackingStatus::Delivered && tx.status == TransactionStatus::Shipped {
                    tx.apply_event(EscrowEvent::DeliveryRecorded, now)?;
                }

                let entry = TrackingEntry {
                    status,
                    description,
                    location,
                    timestamp: now,
                    updated_by: actor,
                };
                tx.tracking_updates.push(entry.clone());
                tx.updated_at = now;
                Ok(entry)
            })
            .await?;

        info!(%transaction_id, ?status, "tracking event appended");
        Ok(entry)
    }

    /// Shipment timeline for display, newest first
    pub async fn timeline(&self, transaction_id: TransactionId) -> EscrowResult<Vec<TrackingEntry>> {
        let tx = self.store.get(transaction_id).await?;
        let mut entries = tx.tracking_updates;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// The courier catalog with tracking URLs for a shipment number
    pub fn couriers(tracking_number: Option<&str>) -> Vec<CourierInfo> {
        Courier::all()
            .into_iter()
            .map(|courier| CourierInfo {
                courier,
                label: courier.label(),
                tracking_url: tracking_number.and_then(|n| courier.tracking_url(n)),
            })
            .collect()
    }
}
