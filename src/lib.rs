//! Escrow transaction lifecycle engine for a peer-to-peer marketplace
//!
//! This crate implements the money-holding core of the marketplace:
//! - A state machine that holds a buyer's payment and gates its release
//!   on delivery evidence
//! - A background scheduler that auto-releases escrow after a timeout
//! - A dispute lifecycle with forced settlement and seller penalties
//! - An append-only shipment tracking ledger and seller trust statistics

pub mod dispute;
pub mod error;
pub mod escrow;
pub mod gateway;
pub mod marketplace;
pub mod models;
pub mod node;
pub mod rating;
pub mod scheduler;
pub mod store;
pub mod tracking;

use error::EscrowError;

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
