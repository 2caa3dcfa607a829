//! Core data models for the marketplace escrow system
//!
//! This module contains the transaction and dispute records, the escrow
//! state machine, and the shared vocabulary enums used across services.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EscrowError;
use crate::EscrowResult;

/// Marketplace user id (owned by the external user directory)
pub type UserId = Uuid;
/// Product listing id (owned by the external product catalog)
pub type ProductId = Uuid;
/// Escrow transaction id
pub type TransactionId = Uuid;
/// Dispute id
pub type DisputeId = Uuid;

/// Monetary amount in the currency of record
///
/// Construction rejects zero and negative values, so any `Amount` held
/// in escrow is known positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Create an amount, rejecting non-positive values
    pub fn new(value: Decimal) -> EscrowResult<Self> {
        if value <= Decimal::ZERO {
            return Err(EscrowError::validation(format!(
                "amount must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Underlying decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction workflow state machine enum
///
/// Descriptive state of the trade. Money-moving guards never read this
/// directly; `PaymentStatus` is the financial source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    /// Transaction created, awaiting buyer payment
    PaymentPending,
    /// Payment held by the platform
    InEscrow,
    /// Seller uploaded shipping proof
    Shipped,
    /// Courier reported the package delivered
    Delivered,
    /// Buyer confirmed delivery, funds released
    DeliveryConfirmed,
    /// Trade settled by auto-release or dispute ruling
    Completed,
    /// Under dispute, funds held
    Disputed,
    /// Abandoned before payment
    Cancelled,
}

impl TransactionStatus {
    /// Check if no further financial mutation is permitted from here
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DeliveryConfirmed | Self::Completed | Self::Cancelled
        )
    }

    /// Check if a dispute may be opened from this state
    pub fn can_dispute(&self) -> bool {
        matches!(
            self,
            Self::InEscrow | Self::Shipped | Self::Delivered | Self::DeliveryConfirmed
        )
    }

    /// Check if a rating may be recorded in this state
    pub fn can_rate(&self) -> bool {
        matches!(self, Self::Completed | Self::DeliveryConfirmed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PaymentPending => "payment-pending",
            Self::InEscrow => "in-escrow",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::DeliveryConfirmed => "delivery-confirmed",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Financial state of a transaction, the source of truth for money guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    /// No payment received yet
    Pending,
    /// Funds held by the platform
    InEscrow,
    /// Funds released to the seller
    Released,
    /// Funds returned to the buyer (fully or partially)
    Refunded,
    /// Abandoned before any funds moved
    Cancelled,
}

impl PaymentStatus {
    /// Check if this is a terminal payment outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Cancelled)
    }

    /// Check if funds already left escrow in either direction
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InEscrow => "in-escrow",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Settlement outcome of a transaction or dispute ruling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Return escrowed funds to the buyer
    RefundBuyer,
    /// Release escrowed funds to the seller
    ReleaseSeller,
    /// Split settlement between parties
    PartialRefund,
    /// No ruling yet
    Pending,
}

/// Which side of the trade an actor is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Party {
    Buyer,
    Seller,
}

/// Courier-status vocabulary for tracking ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingStatus {
    OrderPlaced,
    Processing,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    FailedDelivery,
    Returned,
}

/// Couriers the marketplace recognizes for shipment tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Courier {
    Dhl,
    Fedex,
    Ups,
    Tnt,
    Aramex,
    PostOffice,
    LocalCourier,
    Other,
}

impl Courier {
    /// All recognized couriers, for catalog listings
    pub fn all() -> [Courier; 8] {
        [
            Self::Dhl,
            Self::Fedex,
            Self::Ups,
            Self::Tnt,
            Self::Aramex,
            Self::PostOffice,
            Self::LocalCourier,
            Self::Other,
        ]
    }

    /// Human-readable courier name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dhl => "DHL",
            Self::Fedex => "FedEx",
            Self::Ups => "UPS",
            Self::Tnt => "TNT",
            Self::Aramex => "Aramex",
            Self::PostOffice => "Post Office",
            Self::LocalCourier => "Local Courier",
            Self::Other => "Other",
        }
    }

    /// Public tracking page for a shipment, where the courier has one
    pub fn tracking_url(&self, tracking_number: &str) -> Option<String> {
        let url = match self {
            Self::Dhl => format!(
                "https://www.dhl.com/global-en/home/tracking.html?tracking-id={tracking_number}"
            ),
            Self::Fedex => format!("https://www.fedex.com/fedextrack/?trknbr={tracking_number}"),
            Self::Ups => format!("https://www.ups.com/track?tracknum={tracking_number}"),
            Self::Tnt => format!(
                "https://www.tnt.com/express/en_gc/site/shipping-tools/tracking.html?cons={tracking_number}"
            ),
            Self::Aramex => format!(
                "https://www.aramex.com/track/results?ShipmentNumber={tracking_number}"
            ),
            Self::PostOffice | Self::LocalCourier | Self::Other => return None,
        };
        Some(url)
    }
}

/// Reason a dispute was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisputeReason {
    FakeItem,
    NonDelivery,
    WrongItem,
    DamagedGoods,
    Other,
}

impl DisputeReason {
    /// Triage priority derived from the reason at creation time
    pub fn priority(&self) -> DisputePriority {
        match self {
            Self::FakeItem | Self::NonDelivery => DisputePriority::High,
            _ => DisputePriority::Medium,
        }
    }
}

/// Dispute lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Closed,
}

impl DisputeStatus {
    /// Check if the dispute still accepts party responses
    pub fn accepts_responses(&self) -> bool {
        matches!(self, Self::Open | Self::UnderReview)
    }

    /// Check if the dispute has been settled
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

/// Dispute triage priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisputePriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Penalty applied to a seller when a dispute resolves against them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SellerPenalty {
    None,
    Warning,
    TemporarySuspension,
    PermanentSuspension,
}

impl SellerPenalty {
    /// Check if this penalty flags the seller account inactive
    pub fn suspends(&self) -> bool {
        matches!(self, Self::TemporarySuspension | Self::PermanentSuspension)
    }
}

/// Complaint category attached to a rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplaintReason {
    ItemNotReceived,
    ItemDamaged,
    WrongItem,
    FakeProduct,
    PoorQuality,
    SellerScam,
    Other,
}

/// Events that drive the escrow state machine
///
/// Every mutation of a transaction's workflow or payment state goes
/// through `Transaction::apply_event` with one of these; there is no
/// other write path, so illegal transitions cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowEvent {
    /// Gateway confirmed the buyer's payment
    PaymentConfirmed,
    /// Seller uploaded shipping proof
    ProofUploaded,
    /// Courier reported the package delivered
    DeliveryRecorded,
    /// Buyer confirmed delivery
    BuyerConfirmedDelivery,
    /// Either party opened a dispute
    DisputeOpened,
    /// A dispute ruling was applied
    Ruled(Resolution),
    /// The auto-release timer fired
    AutoReleased,
    /// Transaction abandoned before payment
    Abandoned,
}

impl std::fmt::Display for EscrowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PaymentConfirmed => "payment-confirmed",
            Self::ProofUploaded => "proof-uploaded",
            Self::DeliveryRecorded => "delivery-recorded",
            Self::BuyerConfirmedDelivery => "buyer-confirmed-delivery",
            Self::DisputeOpened => "dispute-opened",
            Self::Ruled(_) => "ruled",
            Self::AutoReleased => "auto-released",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// Legal transition table for the escrow state machine
///
/// Returns the successor pair for a `(status, payment)` state under an
/// event, or `None` when no legal transition exists. Money stays exactly
/// where it is unless the returned payment state says otherwise.
fn transition(
    status: TransactionStatus,
    payment: PaymentStatus,
    event: EscrowEvent,
) -> Option<(TransactionStatus, PaymentStatus)> {
    use EscrowEvent as E;
    use PaymentStatus as P;
    use TransactionStatus as S;

    match (status, event) {
        (S::PaymentPending, E::PaymentConfirmed) => Some((S::InEscrow, P::InEscrow)),
        (S::PaymentPending, E::Abandoned) => Some((S::Cancelled, P::Cancelled)),

        (S::InEscrow, E::ProofUploaded) => Some((S::Shipped, payment)),
        (S::Shipped, E::DeliveryRecorded) => Some((S::Delivered, payment)),

        (S::InEscrow | S::Shipped | S::Delivered, E::BuyerConfirmedDelivery) => {
            Some((S::DeliveryConfirmed, P::Released))
        }
        (S::Shipped | S::Delivered, E::AutoReleased) => Some((S::Completed, P::Released)),

        (S::InEscrow | S::Shipped | S::Delivered | S::DeliveryConfirmed, E::DisputeOpened) => {
            Some((S::Disputed, payment))
        }

        // A ruling settles escrowed funds; when money already left escrow
        // (dispute opened after confirmation) only the workflow completes.
        (S::Disputed, E::Ruled(resolution)) => {
            let next_payment = match payment {
                P::InEscrow => match resolution {
                    Resolution::ReleaseSeller => P::Released,
                    Resolution::RefundBuyer | Resolution::PartialRefund => P::Refunded,
                    Resolution::Pending => return None,
                },
                P::Released | P::Refunded => payment,
                P::Pending | P::Cancelled => return None,
            };
            Some((S::Completed, next_payment))
        }

        _ => None,
    }
}

/// Street address a purchase ships to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub country: String,
    pub postal_code: String,
}

/// One append-only tracking ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub status: TrackingStatus,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub updated_by: UserId,
}

/// Audit record of one committed state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub transaction_id: TransactionId,
    pub at: DateTime<Utc>,
    pub from_status: TransactionStatus,
    pub to_status: TransactionStatus,
    pub from_payment: PaymentStatus,
    pub to_payment: PaymentStatus,
}

/// Transaction model representing one buyer-seller-product exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,

    // Parties (opaque references owned by external collaborators)
    pub buyer: UserId,
    pub seller: UserId,
    pub product: ProductId,

    // Money
    pub amount: Amount,
    pub payment_status: PaymentStatus,
    pub status: TransactionStatus,

    // Payment gateway correlation
    pub phone_number: Option<String>,
    pub gateway_reference: Option<String>,
    pub gateway_receipt: Option<String>,

    // Shipping
    pub shipping_address: Option<ShippingAddress>,
    pub shipping_proof: Option<String>,
    pub tracking_number: Option<String>,
    pub courier: Option<Courier>,
    pub tracking_updates: Vec<TrackingEntry>,

    // Dispute linkage
    pub dispute_reason: Option<DisputeReason>,
    pub resolution: Resolution,

    // Release policy
    pub auto_release_after_hours: i64,

    // Outcome
    pub payment_released_to: Option<UserId>,
    pub delivery_confirmed_by: Option<UserId>,
    pub failure_reason: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub escrow_held_at: Option<DateTime<Utc>>,
    pub escrow_release_date: Option<DateTime<Utc>>,
    pub shipping_proof_uploaded_at: Option<DateTime<Utc>>,
    pub delivery_confirmed_at: Option<DateTime<Utc>>,
    pub auto_confirmed_at: Option<DateTime<Utc>>,
    pub payment_released_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new transaction awaiting payment
    pub fn new(
        buyer: UserId,
        seller: UserId,
        product: ProductId,
        amount: Amount,
        auto_release_after_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            buyer,
            seller,
            product,
            amount,
            payment_status: PaymentStatus::Pending,
            status: TransactionStatus::PaymentPending,
            phone_number: None,
            gateway_reference: None,
            gateway_receipt: None,
            shipping_address: None,
            shipping_proof: None,
            tracking_number: None,
            courier: None,
            tracking_updates: Vec::new(),
            dispute_reason: None,
            resolution: Resolution::Pending,
            auto_release_after_hours,
            payment_released_to: None,
            delivery_confirmed_by: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            escrow_held_at: None,
            escrow_release_date: None,
            shipping_proof_uploaded_at: None,
            delivery_confirmed_at: None,
            auto_confirmed_at: None,
            payment_released_at: None,
            completed_at: None,
        }
    }

    /// Capability of an actor on this transaction, derived from the
    /// immutable party references
    pub fn party_of(&self, actor: UserId) -> Option<Party> {
        if actor == self.buyer {
            Some(Party::Buyer)
        } else if actor == self.seller {
            Some(Party::Seller)
        } else {
            None
        }
    }

    /// Require the actor to be a party to this transaction
    pub fn require_party(&self, actor: UserId) -> EscrowResult<Party> {
        self.party_of(actor)
            .ok_or_else(|| EscrowError::not_authorized(actor, "not a party to this transaction"))
    }

    /// Require the actor to be the buyer
    pub fn require_buyer(&self, actor: UserId) -> EscrowResult<()> {
        match self.party_of(actor) {
            Some(Party::Buyer) => Ok(()),
            _ => Err(EscrowError::not_authorized(
                actor,
                "only the buyer may perform this operation",
            )),
        }
    }

    /// Require the actor to be the seller
    pub fn require_seller(&self, actor: UserId) -> EscrowResult<()> {
        match self.party_of(actor) {
            Some(Party::Seller) => Ok(()),
            _ => Err(EscrowError::not_authorized(
                actor,
                "only the seller may perform this operation",
            )),
        }
    }

    /// Apply a state machine event, mutating workflow and payment state
    /// together with the timestamps the event owns
    ///
    /// Payment guards are classified before the transition table so that
    /// idempotent retries surface as their dedicated error variants
    /// rather than a generic transition rejection.
    pub fn apply_event(&mut self, event: EscrowEvent, now: DateTime<Utc>) -> EscrowResult<()> {
        self.classify_payment_guard(event)?;

        let (next_status, next_payment) = transition(self.status, self.payment_status, event)
            .ok_or_else(|| {
                EscrowError::state_transition(
                    self.status.to_string(),
                    event.to_string(),
                    "no legal transition from this state".to_string(),
                )
            })?;

        self.status = next_status;
        self.payment_status = next_payment;
        self.stamp(event, now);
        self.updated_at = now;
        Ok(())
    }

    /// Map payment-state conflicts to their typed idempotency errors
    fn classify_payment_guard(&self, event: EscrowEvent) -> EscrowResult<()> {
        use EscrowEvent as E;
        use PaymentStatus as P;

        match event {
            E::PaymentConfirmed => match self.payment_status {
                P::InEscrow => Err(EscrowError::AlreadyInEscrow {
                    transaction_id: self.id,
                }),
                P::Released | P::Refunded => Err(EscrowError::AlreadyReleased {
                    transaction_id: self.id,
                }),
                _ => Ok(()),
            },
            E::ProofUploaded => match self.payment_status {
                P::InEscrow => Ok(()),
                _ => Err(EscrowError::PaymentNotEscrowed {
                    transaction_id: self.id,
                }),
            },
            E::BuyerConfirmedDelivery | E::AutoReleased => match self.payment_status {
                P::InEscrow => Ok(()),
                P::Released | P::Refunded => Err(EscrowError::AlreadyReleased {
                    transaction_id: self.id,
                }),
                P::Pending | P::Cancelled => Err(EscrowError::PaymentNotEscrowed {
                    transaction_id: self.id,
                }),
            },
            E::DisputeOpened => {
                if self.status.can_dispute() {
                    Ok(())
                } else {
                    Err(EscrowError::NotDisputable {
                        transaction_id: self.id,
                    })
                }
            }
            E::Ruled(_) | E::DeliveryRecorded | E::Abandoned => Ok(()),
        }
    }

    /// Set the timestamps and outcome fields an event owns
    fn stamp(&mut self, event: EscrowEvent, now: DateTime<Utc>) {
        use EscrowEvent as E;

        match event {
            E::PaymentConfirmed => {
                self.escrow_held_at = Some(now);
                // The only place the auto-release deadline is computed.
                self.escrow_release_date = Some(now + Duration::hours(self.auto_release_after_hours));
            }
            E::ProofUploaded => {
                self.shipping_proof_uploaded_at = Some(now);
            }
            E::BuyerConfirmedDelivery => {
                self.delivery_confirmed_at = Some(now);
                self.delivery_confirmed_by = Some(self.buyer);
                self.payment_released_at = Some(now);
                self.payment_released_to = Some(self.seller);
                self.completed_at = Some(now);
            }
            E::AutoReleased => {
                self.auto_confirmed_at = Some(now);
                self.payment_released_at = Some(now);
                self.payment_released_to = Some(self.seller);
                self.completed_at = Some(now);
            }
            E::Ruled(resolution) => {
                self.resolution = resolution;
                self.completed_at = Some(now);
                if self.payment_released_at.is_none() && self.payment_status.is_settled() {
                    self.payment_released_at = Some(now);
                    self.payment_released_to = match resolution {
                        Resolution::ReleaseSeller => Some(self.seller),
                        Resolution::RefundBuyer => Some(self.buyer),
                        // Split settlement: neither party received the
                        // whole principal.
                        Resolution::PartialRefund | Resolution::Pending => None,
                    };
                }
            }
            E::DeliveryRecorded | E::DisputeOpened | E::Abandoned => {}
        }
    }

    /// Check if the auto-release sweep should pick this transaction up
    ///
    /// Mirrors the timeout policy: escrowed payment, shipped or delivered,
    /// proof on file, no confirmation of any kind, and either the proof
    /// is older than the release window or the deadline has passed.
    pub fn eligible_for_auto_release(&self, now: DateTime<Utc>) -> bool {
        if self.payment_status != PaymentStatus::InEscrow {
            return false;
        }
        if !matches!(
            self.status,
            TransactionStatus::Shipped | TransactionStatus::Delivered
        ) {
            return false;
        }
        if self.delivery_confirmed_at.is_some() || self.auto_confirmed_at.is_some() {
            return false;
        }
        let Some(proof_at) = self.shipping_proof_uploaded_at else {
            return false;
        };
        let proof_aged = now >= proof_at + Duration::hours(self.auto_release_after_hours);
        let deadline_passed = self
            .escrow_release_date
            .map(|deadline| now >= deadline)
            .unwrap_or(false);
        proof_aged || deadline_passed
    }
}

/// Dispute model for arbitration of a contested transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub transaction_id: TransactionId,

    // Claim
    pub initiated_by: UserId,
    pub reason: DisputeReason,
    pub description: String,
    pub evidence: Vec<String>,

    // Triage
    pub status: DisputeStatus,
    pub priority: DisputePriority,

    // Party responses
    pub buyer_response: Option<String>,
    pub seller_response: Option<String>,

    // Ruling
    pub resolution: Option<Resolution>,
    pub resolution_details: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,

    // Penalty
    pub seller_penalty: SellerPenalty,
    pub penalty_reason: Option<String>,
    pub penalty_duration_days: Option<u32>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    /// Create a new open dispute with priority derived from the reason
    pub fn new(
        transaction_id: TransactionId,
        initiated_by: UserId,
        reason: DisputeReason,
        description: String,
        evidence: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            initiated_by,
            reason,
            description,
            evidence,
            status: DisputeStatus::Open,
            priority: reason.priority(),
            buyer_response: None,
            seller_response: None,
            resolution: None,
            resolution_details: None,
            resolved_by: None,
            resolved_at: None,
            seller_penalty: SellerPenalty::None,
            penalty_reason: None,
            penalty_duration_days: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Complaint attached to a rating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complaint {
    pub reason: ComplaintReason,
    pub details: Option<String>,
}

/// Rating left by the buyer of a completed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub transaction_id: TransactionId,
    pub buyer: UserId,
    pub seller: UserId,
    pub product: ProductId,

    // Scores (1-5; overall required, dimensions optional)
    pub overall: u8,
    pub communication: Option<u8>,
    pub item_as_described: Option<u8>,
    pub shipping_speed: Option<u8>,

    pub review: Option<String>,
    pub complaint: Option<Complaint>,

    pub created_at: DateTime<Utc>,
}
