//! Payment gateway abstraction
//!
//! The concrete mobile-money rail lives outside this crate; the escrow
//! core only ever calls through the `PaymentGateway` trait, always
//! before taking a transaction lock. A sandbox implementation backs the
//! tests and the demo binary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::Amount;
use crate::EscrowResult;

/// Normalized mobile-money subscriber number
///
/// Accepts `07XXXXXXXX`, `+254XXXXXXXXX` or `254XXXXXXXXX` input and
/// stores the canonical `254XXXXXXXXX` form the rail expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a subscriber number
    pub fn parse(input: &str) -> EscrowResult<Self> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        let digits = compact.strip_prefix('+').unwrap_or(&compact);
        let normalized = match digits.strip_prefix('0') {
            Some(rest) => format!("254{rest}"),
            None => digits.to_string(),
        };

        let valid = normalized.len() == 12
            && normalized.starts_with("254")
            && normalized.chars().all(|c| c.is_ascii_digit());
        if !valid {
            return Err(EscrowError::validation(format!(
                "invalid mobile money number: {input}"
            )));
        }
        Ok(Self(normalized))
    }

    /// Canonical `254XXXXXXXXX` form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a gateway status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeState {
    /// Buyer has not completed the payment prompt yet
    Pending,
    /// Payment completed; the rail issued a receipt
    Completed { receipt: String },
    /// Payment definitively failed
    Failed { reason: String },
}

/// A charge accepted by the payment rail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCharge {
    /// Rail-issued reference used to correlate callbacks
    pub reference: String,
    pub customer_message: Option<String>,
    pub initiated_at: DateTime<Utc>,
}

/// Abstract payment rail the escrow core charges through
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate a charge against the buyer's mobile-money account
    async fn charge(
        &self,
        phone: &PhoneNumber,
        amount: Amount,
        account_reference: &str,
    ) -> EscrowResult<GatewayCharge>;

    /// Query the outcome of a previously initiated charge
    async fn status(&self, reference: &str) -> EscrowResult<ChargeState>;
}

/// Configuration for the sandbox gateway
#[derive(Debug, Clone)]
pub struct SandboxGatewayConfig {
    /// Report pending charges as completed on the next status query
    pub auto_complete: bool,
    /// Refuse all calls, simulating an unreachable rail
    pub offline: bool,
}

impl Default for SandboxGatewayConfig {
    fn default() -> Self {
        Self {
            auto_complete: true,
            offline: false,
        }
    }
}

/// In-memory payment rail for tests and the demo binary
pub struct SandboxGateway {
    config: SandboxGatewayConfig,
    charges: Arc<RwLock<HashMap<String, ChargeState>>>,
}

impl SandboxGateway {
    /// Create a sandbox gateway
    pub fn new(config: SandboxGatewayConfig) -> Self {
        Self {
            config,
            charges: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mark a charge completed, as a rail callback would
    pub async fn complete(&self, reference: &str, receipt: &str) -> EscrowResult<()> {
        let mut charges = self.charges.write().await;
        match charges.get_mut(reference) {
            Some(state) => {
                *state = ChargeState::Completed {
                    receipt: receipt.to_string(),
                };
                Ok(())
            }
            None => Err(EscrowError::validation(format!(
                "unknown charge reference: {reference}"
            ))),
        }
    }

    /// Mark a charge failed, as a rail callback would
    pub async fn fail(&self, reference: &str, reason: &str) -> EscrowResult<()> {
        let mut charges = self.charges.write().await;
        match charges.get_mut(reference) {
            Some(state) => {
                *state = ChargeState::Failed {
                    reason: reason.to_string(),
                };
                Ok(())
            }
            None => Err(EscrowError::validation(format!(
                "unknown charge reference: {reference}"
            ))),
        }
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(
        &self,
        phone: &PhoneNumber,
        amount: Amount,
        account_reference: &str,
    ) -> EscrowResult<GatewayCharge> {
        if self.config.offline {
            return Err(EscrowError::gateway_unavailable("sandbox rail is offline"));
        }

        let reference = format!("SBX-{}", Uuid::new_v4().simple());
        self.charges
            .write()
            .await
            .insert(reference.clone(), ChargeState::Pending);

        info!(
            %phone,
            %amount,
            account_reference,
            reference,
            "sandbox charge initiated"
        );

        Ok(GatewayCharge {
            reference,
            customer_message: Some("Enter your PIN to complete the payment".to_string()),
            initiated_at: Utc::now(),
        })
    }

    async fn status(&self, reference: &str) -> EscrowResult<ChargeState> {
        if self.config.offline {
            return Err(EscrowError::gateway_unavailable("sandbox rail is offline"));
        }

        let mut charges = self.charges.write().await;
        let state = charges.get_mut(reference).ok_or_else(|| {
            EscrowError::validation(format!("unknown charge reference: {reference}"))
        })?;

        if self.config.auto_complete && *state == ChargeState::Pending {
            *state = ChargeState::Completed {
                receipt: format!("SBX{}", &Uuid::new_v4().simple().to_string()[..10].to_uppercase()),
            };
        }
        Ok(state.clone())
    }
}
