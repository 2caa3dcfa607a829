//! Error types for the escrow system
//!
//! Every failure in the escrow core is a typed, recoverable outcome
//! returned to the caller. Precondition failures map to 4xx-equivalent
//! rejections, idempotency guards are success-equivalent to callers,
//! and only gateway failures and lock timeouts are worth retrying.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Product is sold or otherwise unavailable for purchase
    #[error("Product {product_id} is not available for purchase")]
    ProductUnavailable { product_id: Uuid },

    /// Buyer attempted to buy their own listing
    #[error("Buyer and seller must be different users")]
    SelfTrade,

    /// Seller has no verified badge
    #[error("Seller {seller_id} is not verified for escrow sales")]
    SellerUnverified { seller_id: Uuid },

    /// Transaction lookup failed
    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: Uuid },

    /// Payment is already held in escrow
    #[error("Payment for transaction {transaction_id} is already held in escrow")]
    AlreadyInEscrow { transaction_id: Uuid },

    /// Operation requires escrowed funds but payment is not held
    #[error("Payment for transaction {transaction_id} is not held in escrow")]
    PaymentNotEscrowed { transaction_id: Uuid },

    /// Escrowed funds were already released or refunded
    #[error("Escrow for transaction {transaction_id} has already been settled")]
    AlreadyReleased { transaction_id: Uuid },

    /// Actor lacks the capability the operation requires
    #[error("Actor {actor_id} is not authorized: {reason}")]
    NotAuthorized { actor_id: Uuid, reason: String },

    /// State machine rejected the requested transition
    #[error("Invalid transition for transaction in state {state}: {event}: {reason}")]
    StateTransition {
        state: String,
        event: String,
        reason: String,
    },

    /// Transaction is not in a disputable state
    #[error("Transaction {transaction_id} cannot be disputed in its current state")]
    NotDisputable { transaction_id: Uuid },

    /// A dispute already exists for this transaction
    #[error("Transaction {transaction_id} already has a dispute")]
    DisputeExists { transaction_id: Uuid },

    /// Dispute lookup failed
    #[error("Dispute {dispute_id} not found")]
    DisputeNotFound { dispute_id: Uuid },

    /// Dispute no longer accepts responses
    #[error("Dispute {dispute_id} is closed to further responses")]
    DisputeClosed { dispute_id: Uuid },

    /// Dispute was already resolved
    #[error("Dispute {dispute_id} has already been resolved")]
    AlreadyResolved { dispute_id: Uuid },

    /// Ratings require a completed trade
    #[error("Transaction {transaction_id} is not completed; it cannot be rated yet")]
    NotCompleted { transaction_id: Uuid },

    /// Transaction was already rated
    #[error("Transaction {transaction_id} has already been rated")]
    DuplicateRating { transaction_id: Uuid },

    /// Payment rail call failed; caller should retry with backoff
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Per-transaction lock could not be acquired in time
    #[error("Timed out acquiring lock on transaction {transaction_id}")]
    LockTimeout { transaction_id: Uuid },

    /// Input validation errors (amounts, phone numbers, scores)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parsing errors
    #[error("UUID parsing error: {0}")]
    Uuid(#[from] uuid::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Create a not-authorized error
    pub fn not_authorized<S: Into<String>>(actor_id: Uuid, reason: S) -> Self {
        Self::NotAuthorized {
            actor_id,
            reason: reason.into(),
        }
    }

    /// Create a state transition error
    pub fn state_transition<S: Into<String>>(state: S, event: S, reason: S) -> Self {
        Self::StateTransition {
            state: state.into(),
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// Create a gateway error
    pub fn gateway_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::GatewayUnavailable(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller should retry the operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_) | Self::LockTimeout { .. }
        )
    }

    /// Idempotency guards: the requested effect was already applied,
    /// so callers treat the rejection as success-equivalent
    pub fn is_already_settled(&self) -> bool {
        matches!(
            self,
            Self::AlreadyReleased { .. } | Self::AlreadyResolved { .. }
        )
    }
}
