use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

use gst_recon_rs::config::Config;
use gst_recon_rs::reconcile;
use gst_recon_rs::risk;
use gst_recon_rs::store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gst_recon_rs=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting GST reconciliation graph core");

    let config = Config::from_env()?;
    info!(backend = %config.backend, "Configuration loaded");

    let store = store::connect_store(&config).await?;
    store.ensure_schema().await?;

    let summary = store.summary().await?;
    info!(
        vendors = summary.vendor_count,
        invoices = summary.invoice_count,
        returns = summary.return_count,
        mismatches = summary.mismatch_count,
        suspicious = summary.suspicious_count,
        "Graph summary"
    );

    let violations = store.diagnostics().await?;
    if violations.is_empty() {
        info!("Graph integrity check passed");
    } else {
        for violation in &violations {
            warn!(%violation, "Integrity violation");
        }
    }

    let mismatches = reconcile::reconcile_invoices(store.as_ref()).await?;
    info!(count = mismatches.len(), "Mismatched invoices");
    for mismatch in &mismatches {
        warn!(
            invoice_id = %mismatch.invoice.invoice_id,
            status = ?mismatch.status,
            risk_score = mismatch.risk_score,
            "Mismatch"
        );
    }

    let scored = risk::score_all_vendors(store.as_ref(), config.max_cycle_depth).await?;
    for vendor in &scored {
        info!(
            gstin = %vendor.gstin,
            score = vendor.risk_score,
            level = vendor.risk_level.as_str(),
            circular = vendor.possible_circular_trading,
            "Vendor risk"
        );
    }

    Ok(())
}
