//! Escrow node - high-level API over the escrow system
//!
//! Wires the store, the lifecycle services, and the background
//! scheduler over the injected collaborators (payment gateway, product
//! catalog, user directory) and exposes one facade the serving layer
//! talks to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::dispute::DisputeManager;
use crate::error::EscrowError;
use crate::escrow::{EscrowConfig, EscrowService};
use crate::gateway::PaymentGateway;
use crate::marketplace::{ProductCatalog, UserDirectory};
use crate::rating::RatingAggregator;
use crate::scheduler::{AutoReleaseScheduler, SchedulerConfig};
use crate::store::{StoreConfig, TransactionStore};
use crate::tracking::TrackingLedger;
use crate::EscrowResult;

/// Configuration for the escrow node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowNodeConfig {
    /// Transaction store configuration
    pub store: StoreConfig,
    /// Escrow service configuration
    pub escrow: EscrowConfig,
    /// Auto-release scheduler configuration
    pub scheduler: SchedulerConfig,
}

impl EscrowNodeConfig {
    /// Load configuration from an optional `sokoni` file and `SOKONI_*`
    /// environment variables
    pub fn load() -> EscrowResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("sokoni").required(false))
            .add_source(config::Environment::with_prefix("SOKONI").separator("__"))
            .build()
            .map_err(|e| EscrowError::config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| EscrowError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate loaded values
    pub fn validate(&self) -> EscrowResult<()> {
        if self.store.lock_timeout_ms == 0 {
            return Err(EscrowError::config("lock_timeout_ms must be positive"));
        }
        if self.escrow.auto_release_after_hours <= 0 {
            return Err(EscrowError::config(
                "auto_release_after_hours must be positive",
            ));
        }
        if self.scheduler.sweep_interval_secs == 0 {
            return Err(EscrowError::config("sweep_interval_secs must be positive"));
        }
        Ok(())
    }
}

/// Node health status
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub transactions: usize,
    pub timestamp: DateTime<Utc>,
}

/// Main escrow node coordinating all components
pub struct EscrowNode {
    store: Arc<TransactionStore>,
    escrow: Arc<EscrowService>,
    scheduler: Arc<AutoReleaseScheduler>,
    disputes: Arc<DisputeManager>,
    tracking: Arc<TrackingLedger>,
    ratings: Arc<RatingAggregator>,
    directory: Arc<dyn UserDirectory>,
}

impl EscrowNode {
    /// Create an escrow node over the injected collaborators
    pub fn new(
        config: EscrowNodeConfig,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn ProductCatalog>,
        directory: Arc<dyn UserDirectory>,
    ) -> EscrowResult<Self> {
        config.validate()?;
        info!("initializing escrow node");

        let store = Arc::new(TransactionStore::new(config.store));
        let escrow = Arc::new(EscrowService::new(
            config.escrow,
            store.clone(),
            gateway,
            catalog,
            directory.clone(),
        ));
        let scheduler = Arc::new(AutoReleaseScheduler::new(
            config.scheduler,
            store.clone(),
            escrow.clone(),
        ));
        let disputes = Arc::new(DisputeManager::new(
            store.clone(),
            escrow.clone(),
            directory.clone(),
        ));
        let tracking = Arc::new(TrackingLedger::new(store.clone()));
        let ratings = Arc::new(RatingAggregator::new(store.clone()));

        Ok(Self {
            store,
            escrow,
            scheduler,
            disputes,
            tracking,
            ratings,
            directory,
        })
    }

    /// Start the background auto-release sweep
    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    /// Stop background work and shut the node down
    pub async fn shutdown(&self) {
        info!("shutting down escrow node");
        self.scheduler.stop().await;
        info!("escrow node shutdown complete");
    }

    /// Escrow lifecycle operations
    pub fn escrow(&self) -> &EscrowService {
        &self.escrow
    }

    /// Auto-release scheduler
    pub fn scheduler(&self) -> &AutoReleaseScheduler {
        &self.scheduler
    }

    /// Dispute lifecycle operations
    pub fn disputes(&self) -> &DisputeManager {
        &self.disputes
    }

    /// Shipment tracking ledger
    pub fn tracking(&self) -> &TrackingLedger {
        &self.tracking
    }

    /// Seller trust statistics
    pub fn ratings(&self) -> &RatingAggregator {
        &self.ratings
    }

    /// Transaction store (read paths for the serving layer)
    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    /// Health check over the node's components
    pub async fn health_check(&self) -> NodeHealth {
        let mut issues = Vec::new();

        if let Err(e) = self.directory.profile(Uuid::nil()).await {
            // The nil probe only verifies reachability; an unknown-user
            // answer is a healthy one.
            if matches!(e, EscrowError::GatewayUnavailable(_) | EscrowError::LockTimeout { .. }) {
                issues.push(format!("user directory error: {e}"));
            }
        }

        NodeHealth {
            healthy: issues.is_empty(),
            issues,
            transactions: self.store.len(),
            timestamp: Utc::now(),
        }
    }
}
