//! Seller trust statistics derived from completed transactions
//!
//! Read-mostly: ratings are written once per completed transaction and
//! the seller statistics are pure aggregation over the rating store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::{Complaint, ComplaintReason, Rating, TransactionId, UserId};
use crate::store::TransactionStore;
use crate::EscrowResult;

/// Scores a buyer leaves on a completed transaction (1-5 each)
#[derive(Debug, Clone, Copy)]
pub struct RatingScores {
    pub overall: u8,
    pub communication: Option<u8>,
    pub item_as_described: Option<u8>,
    pub shipping_speed: Option<u8>,
}

/// Aggregate trust statistics for one seller
#[derive(Debug, Clone, serde::Serialize)]
pub struct SellerStats {
    pub seller: UserId,
    pub total_ratings: usize,
    /// Mean overall score, rounded to 2 decimals
    pub average_overall: f64,
    pub complaint_count: usize,
    /// Ratings tied to a completed transaction / total ratings, in [0, 1]
    pub completion_rate: f64,
    pub average_communication: Option<f64>,
    pub average_item_as_described: Option<f64>,
    pub average_shipping_speed: Option<f64>,
    pub complaint_reasons: HashMap<ComplaintReason, usize>,
}

/// Records ratings and aggregates seller statistics
pub struct RatingAggregator {
    store: Arc<TransactionStore>,
    /// Keyed by transaction id, enforcing one rating per transaction
    ratings: DashMap<TransactionId, Rating>,
}

impl RatingAggregator {
    /// Create the aggregator over the transaction store
    pub fn new(store: Arc<TransactionStore>) -> Self {
        Self {
            store,
            ratings: DashMap::new(),
        }
    }

    /// Record the buyer's rating of a completed transaction
    pub async fn record(
        &self,
        transaction_id: TransactionId,
        actor: UserId,
        scores: RatingScores,
        review: Option<String>,
        complaint: Option<Complaint>,
    ) -> EscrowResult<Rating> {
        validate_scores(&scores)?;

        let tx = self.store.get(transaction_id).await?;
        tx.require_buyer(actor)?;
        if !tx.status.can_rate() {
            return Err(EscrowError::NotCompleted { transaction_id });
        }

        let rating = Rating {
            id: Uuid::new_v4(),
            transaction_id,
            buyer: tx.buyer,
            seller: tx.seller,
            product: tx.product,
            overall: scores.overall,
            communication: scores.communication,
            item_as_described: scores.item_as_described,
            shipping_speed: scores.shipping_speed,
            review,
            complaint,
            created_at: Utc::now(),
        };

        // Atomic one-rating-per-transaction claim.
        match self.ratings.entry(transaction_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(EscrowError::DuplicateRating { transaction_id });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(rating.clone());
            }
        }

        info!(
            %transaction_id,
            seller = %rating.seller,
            overall = rating.overall,
            complaint = rating.complaint.is_some(),
            "rating recorded"
        );
        Ok(rating)
    }

    /// The rating for one transaction, if any
    pub fn for_transaction(&self, transaction_id: TransactionId) -> Option<Rating> {
        self.ratings.get(&transaction_id).map(|entry| entry.clone())
    }

    /// Aggregate trust statistics for a seller
    pub async fn seller_stats(&self, seller: UserId) -> SellerStats {
        let ratings: Vec<Rating> = self
            .ratings
            .iter()
            .filter(|entry| entry.seller == seller)
            .map(|entry| entry.clone())
            .collect();

        let total = ratings.len();
        if total == 0 {
            return SellerStats {
                seller,
                total_ratings: 0,
                average_overall: 0.0,
                complaint_count: 0,
                completion_rate: 0.0,
                average_communication: None,
                average_item_as_described: None,
                average_shipping_speed: None,
                complaint_reasons: HashMap::new(),
            };
        }

        let mut completed = 0;
        for rating in &ratings {
            if let Ok(tx) = self.store.get(rating.transaction_id).await {
                if tx.status.can_rate() {
                    completed += 1;
                }
            }
        }

        let complaint_count = ratings.iter().filter(|r| r.complaint.is_some()).count();
        let mut complaint_reasons: HashMap<ComplaintReason, usize> = HashMap::new();
        for rating in &ratings {
            if let Some(complaint) = &rating.complaint {
                *complaint_reasons.entry(complaint.reason).or_default() += 1;
            }
        }

        SellerStats {
            seller,
            total_ratings: total,
            average_overall: round2(
                ratings.iter().map(|r| f64::from(r.overall)).sum::<f64>() / total as f64,
            ),
            complaint_count,
            completion_rate: round2(completed as f64 / total as f64),
            average_communication: dimension_average(&ratings, |r| r.communication),
            average_item_as_described: dimension_average(&ratings, |r| r.item_as_described),
            average_shipping_speed: dimension_average(&ratings, |r| r.shipping_speed),
            complaint_reasons,
        }
    }
}

fn validate_scores(scores: &RatingScores) -> EscrowResult<()> {
    let in_range = |s: u8| (1..=5).contains(&s);
    if !in_range(scores.overall) {
        return Err(EscrowError::validation("overall score must be 1-5"));
    }
    for dimension in [
        scores.communication,
        scores.item_as_described,
        scores.shipping_speed,
    ]
    .into_iter()
    .flatten()
    {
        if !in_range(dimension) {
            return Err(EscrowError::validation("dimension scores must be 1-5"));
        }
    }
    Ok(())
}

/// Mean over the subset of ratings that provided the dimension
fn dimension_average<F>(ratings: &[Rating], dimension: F) -> Option<f64>
where
    F: Fn(&Rating) -> Option<u8>,
{
    let values: Vec<f64> = ratings.iter().filter_map(|r| dimension(r).map(f64::from)).collect();
    if values.is_empty() {
        None
    } else {
        Some(round2(values.iter().sum::<f64>() / values.len() as f64))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
