//! Demo binary walking the escrow transaction lifecycle
//!
//! Seeds in-memory collaborators, then runs a full happy path with an
//! auto-release, and a disputed purchase resolved with a refund.

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sokoni_escrow::escrow::EscrowService;
use sokoni_escrow::gateway::{SandboxGateway, SandboxGatewayConfig};
use sokoni_escrow::marketplace::{InMemoryCatalog, InMemoryDirectory, UserDirectory};
use sokoni_escrow::models::{
    Amount, DisputeReason, Resolution, SellerPenalty, TrackingStatus,
};
use sokoni_escrow::node::{EscrowNode, EscrowNodeConfig};
use sokoni_escrow::rating::RatingScores;

#[derive(Parser, Debug)]
#[command(name = "sokoni-escrow", about = "Escrow lifecycle demo")]
struct Args {
    /// Hours before escrow auto-releases to the seller
    #[arg(long, default_value_t = 72)]
    auto_release_hours: i64,

    /// Seconds between auto-release sweeps
    #[arg(long, default_value_t = 3600)]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = EscrowNodeConfig::load().unwrap_or_default();
    config.escrow.auto_release_after_hours = args.auto_release_hours;
    config.scheduler.sweep_interval_secs = args.sweep_interval_secs;

    // In-memory collaborators standing in for the external systems.
    let catalog = Arc::new(InMemoryCatalog::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let gateway = Arc::new(SandboxGateway::new(SandboxGatewayConfig::default()));

    let buyer = directory.add_user("amina", false).await;
    let seller = directory.add_user("kamau", true).await;
    let jacket = catalog
        .add_listing(seller, "Leather jacket", Amount::new(Decimal::from(2500))?)
        .await;
    let radio = catalog
        .add_listing(seller, "Vintage radio", Amount::new(Decimal::from(1200))?)
        .await;

    let node = EscrowNode::new(config, gateway, catalog, directory.clone())?;
    node.start().await;

    run_auto_release_demo(&node, buyer, seller, jacket).await?;
    run_dispute_demo(&node, buyer, seller, radio).await?;

    let stats = node.ratings().seller_stats(seller).await;
    info!(
        total_ratings = stats.total_ratings,
        average_overall = stats.average_overall,
        completion_rate = stats.completion_rate,
        complaints = stats.complaint_count,
        "seller trust statistics"
    );
    let profile = directory.profile(seller).await?;
    info!(
        seller = %profile.display_name,
        active = profile.active,
        warnings = profile.warnings,
        "seller account after demos"
    );

    node.shutdown().await;
    Ok(())
}

/// Buyer pays, seller ships, buyer never confirms: the sweep releases.
async fn run_auto_release_demo(
    node: &EscrowNode,
    buyer: sokoni_escrow::models::UserId,
    seller: sokoni_escrow::models::UserId,
    product: sokoni_escrow::models::ProductId,
) -> Result<()> {
    let escrow: &EscrowService = node.escrow();
    info!("--- demo 1: auto-release after buyer silence ---");

    let tx = escrow.initiate(buyer, product).await?;
    let charge = escrow.request_payment(tx.id, buyer, "0712345678").await?;
    escrow
        .confirm_payment_by_reference(&charge.reference, Some("SBX0001"))
        .await?;
    escrow
        .upload_shipping_proof(tx.id, seller, "TRK123", Some("TRK123".to_string()), None)
        .await?;
    node.tracking()
        .append(tx.id, seller, TrackingStatus::InTransit, "Left Nairobi depot", None)
        .await?;

    // Simulate 73 hours of buyer silence.
    let proof_at = escrow
        .get(tx.id)
        .await?
        .shipping_proof_uploaded_at
        .expect("proof just uploaded");
    let released = node
        .scheduler()
        .sweep_at(proof_at + Duration::hours(73))
        .await?;
    let settled = escrow.get(tx.id).await?;
    info!(
        released,
        payment_status = %settled.payment_status,
        auto_confirmed = settled.auto_confirmed_at.is_some(),
        "auto-release outcome"
    );
    Ok(())
}

/// Buyer disputes a counterfeit item; the admin refunds and warns.
async fn run_dispute_demo(
    node: &EscrowNode,
    buyer: sokoni_escrow::models::UserId,
    seller: sokoni_escrow::models::UserId,
    product: sokoni_escrow::models::ProductId,
) -> Result<()> {
    let escrow = node.escrow();
    info!("--- demo 2: fake-item dispute resolved with a refund ---");

    let tx = escrow.initiate(buyer, product).await?;
    escrow.confirm_payment(tx.id, buyer).await?;
    escrow
        .upload_shipping_proof(tx.id, seller, "TRK456", None, None)
        .await?;

    let dispute = node
        .disputes()
        .open(
            tx.id,
            buyer,
            DisputeReason::FakeItem,
            "Radio is a counterfeit replica",
            vec!["photo-1".to_string()],
        )
        .await?;
    info!(dispute_id = %dispute.id, priority = ?dispute.priority, "dispute opened");

    node.disputes()
        .respond(dispute.id, seller, "Sourced from a licensed distributor")
        .await?;

    let admin = uuid::Uuid::new_v4();
    let resolved = node
        .disputes()
        .resolve(
            dispute.id,
            admin,
            Resolution::RefundBuyer,
            "Serial number failed verification",
            SellerPenalty::Warning,
            None,
        )
        .await?;
    let settled = escrow.get(tx.id).await?;
    info!(
        dispute_status = ?resolved.status,
        payment_status = %settled.payment_status,
        "dispute outcome"
    );

    // Ratings are only open on completed transactions; this one
    // completed through the ruling, so the buyer may still rate.
    node.ratings()
        .record(
            tx.id,
            buyer,
            RatingScores {
                overall: 1,
                communication: Some(2),
                item_as_described: Some(1),
                shipping_speed: None,
            },
            Some("Counterfeit item".to_string()),
            Some(sokoni_escrow::models::Complaint {
                reason: sokoni_escrow::models::ComplaintReason::FakeProduct,
                details: None,
            }),
        )
        .await?;
    Ok(())
}
