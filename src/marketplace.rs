//! Marketplace collaborators consumed by the escrow core
//!
//! The product catalog and the user directory are external systems;
//! the core reaches them only through these traits, never inside a
//! transaction lock. In-memory implementations back the tests and the
//! demo binary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::{Amount, ProductId, SellerPenalty, UserId};
use crate::EscrowResult;

/// Catalog view of a product listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductListing {
    pub id: ProductId,
    pub seller: UserId,
    pub title: String,
    pub price: Amount,
    pub available: bool,
}

/// Product catalog operations the escrow core consumes
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up a listing
    async fn get(&self, product_id: ProductId) -> EscrowResult<ProductListing>;

    /// Reserve a listing for a pending purchase, marking it unavailable
    async fn reserve(&self, product_id: ProductId) -> EscrowResult<()>;

    /// Return a reserved listing to the catalog
    async fn release(&self, product_id: ProductId) -> EscrowResult<()>;
}

/// Directory view of a marketplace user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub verified_seller: bool,
    pub active: bool,
    pub warnings: u32,
    pub suspended_until: Option<DateTime<Utc>>,
}

/// User directory operations the escrow core consumes
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a profile
    async fn profile(&self, user_id: UserId) -> EscrowResult<UserProfile>;

    /// Apply a dispute penalty to a seller account
    async fn penalize(
        &self,
        user_id: UserId,
        penalty: SellerPenalty,
        duration_days: Option<u32>,
    ) -> EscrowResult<()>;
}

/// In-memory product catalog for tests and the demo binary
pub struct InMemoryCatalog {
    listings: Arc<RwLock<HashMap<ProductId, ProductListing>>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            listings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a listing and return its id
    pub async fn add_listing(&self, seller: UserId, title: &str, price: Amount) -> ProductId {
        let id = Uuid::new_v4();
        let listing = ProductListing {
            id,
            seller,
            title: title.to_string(),
            price,
            available: true,
        };
        self.listings.write().await.insert(id, listing);
        id
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get(&self, product_id: ProductId) -> EscrowResult<ProductListing> {
        self.listings
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or(EscrowError::ProductUnavailable { product_id })
    }

    async fn reserve(&self, product_id: ProductId) -> EscrowResult<()> {
        let mut listings = self.listings.write().await;
        let listing = listings
            .get_mut(&product_id)
            .ok_or(EscrowError::ProductUnavailable { product_id })?;
        if !listing.available {
            return Err(EscrowError::ProductUnavailable { product_id });
        }
        listing.available = false;
        info!(%product_id, "product reserved");
        Ok(())
    }

    async fn release(&self, product_id: ProductId) -> EscrowResult<()> {
        let mut listings = self.listings.write().await;
        let listing = listings
            .get_mut(&product_id)
            .ok_or(EscrowError::ProductUnavailable { product_id })?;
        listing.available = true;
        info!(%product_id, "product released back to catalog");
        Ok(())
    }
}

/// In-memory user directory for tests and the demo binary
pub struct InMemoryDirectory {
    users: Arc<RwLock<HashMap<UserId, UserProfile>>>,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a user and return their id
    pub async fn add_user(&self, display_name: &str, verified_seller: bool) -> UserId {
        let id = Uuid::new_v4();
        let profile = UserProfile {
            id,
            display_name: display_name.to_string(),
            verified_seller,
            active: true,
            warnings: 0,
            suspended_until: None,
        };
        self.users.write().await.insert(id, profile);
        id
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn profile(&self, user_id: UserId) -> EscrowResult<UserProfile> {
        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| EscrowError::internal(format!("unknown user {user_id}")))
    }

    async fn penalize(
        &self,
        user_id: UserId,
        penalty: SellerPenalty,
        duration_days: Option<u32>,
    ) -> EscrowResult<()> {
        let mut users = self.users.write().await;
        let profile = users
            .get_mut(&user_id)
            .ok_or_else(|| EscrowError::internal(format!("unknown user {user_id}")))?;

        match penalty {
            SellerPenalty::None => {}
            SellerPenalty::Warning => {
                profile.warnings += 1;
                info!(%user_id, warnings = profile.warnings, "seller warned");
            }
            SellerPenalty::TemporarySuspension => {
                profile.active = false;
                profile.suspended_until =
                    duration_days.map(|days| Utc::now() + Duration::days(i64::from(days)));
                info!(%user_id, ?duration_days, "seller temporarily suspended");
            }
            SellerPenalty::PermanentSuspension => {
                profile.active = false;
                profile.suspended_until = None;
                info!(%user_id, "seller permanently suspended");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_reserve_marks_unavailable() {
        let catalog = InMemoryCatalog::new();
        let seller = Uuid::new_v4();
        let product = catalog
            .add_listing(seller, "Leather jacket", Amount::new(dec!(2500)).unwrap())
            .await;

        catalog.reserve(product).await.unwrap();
        assert!(!catalog.get(product).await.unwrap().available);

        let second = catalog.reserve(product).await;
        assert!(matches!(
            second.unwrap_err(),
            EscrowError::ProductUnavailable { .. }
        ));

        catalog.release(product).await.unwrap();
        assert!(catalog.get(product).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_unknown_product_is_unavailable() {
        let catalog = InMemoryCatalog::new();
        let result = catalog.get(Uuid::new_v4()).await;
        assert!(matches!(
            result.unwrap_err(),
            EscrowError::ProductUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_penalties_mutate_profile() {
        let directory = InMemoryDirectory::new();
        let seller = directory.add_user("wanjiku", true).await;

        directory
            .penalize(seller, SellerPenalty::Warning, None)
            .await
            .unwrap();
        let profile = directory.profile(seller).await.unwrap();
        assert!(profile.active);
        assert_eq!(profile.warnings, 1);

        directory
            .penalize(seller, SellerPenalty::TemporarySuspension, Some(14))
            .await
            .unwrap();
        let profile = directory.profile(seller).await.unwrap();
        assert!(!profile.active);
        assert!(profile.suspended_until.is_some());

        directory
            .penalize(seller, SellerPenalty::PermanentSuspension, None)
            .await
            .unwrap();
        let profile = directory.profile(seller).await.unwrap();
        assert!(!profile.active);
        assert!(profile.suspended_until.is_none());
    }
}
