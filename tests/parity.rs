use std::env;

use gst_recon_rs::config::Config;
use gst_recon_rs::ingest::{self, InvoiceRecord, VendorRecord};
use gst_recon_rs::reconcile::{self, MatchStatus};
use gst_recon_rs::risk::{self, RiskLevel};
use gst_recon_rs::store::{FalkorStore, GraphStore, MemoryStore};

fn vendor(gstin: &str, name: &str, missed: u32) -> VendorRecord {
    VendorRecord {
        gstin: gstin.to_string(),
        name: name.to_string(),
        missed_filings: missed,
    }
}

fn inv(
    id: &str,
    seller: &str,
    buyer: &str,
    amount: f64,
    tax: f64,
    reported: bool,
    claimed: bool,
) -> InvoiceRecord {
    InvoiceRecord {
        invoice_id: id.to_string(),
        seller_gstin: seller.to_string(),
        buyer_gstin: buyer.to_string(),
        amount,
        tax,
        reported_by_seller: reported,
        claimed_by_buyer: claimed,
    }
}

/// Four vendors, one matched invoice, one claimed-only invoice and a
/// three-vendor trading cycle.
fn sample_dataset() -> (Vec<VendorRecord>, Vec<InvoiceRecord>) {
    let vendors = vec![
        vendor("27AAA0001A1Z5", "Acme Traders", 0),
        vendor("29BBB0002B1Z4", "Bharat Supplies", 2),
        vendor("07CCC0003C1Z3", "Chandra Exports", 0),
        vendor("33DDD0004D1Z2", "Deccan Mills", 0),
    ];
    let invoices = vec![
        // Scenario A: fully matched, mid-tier tax; contributes nothing.
        inv(
            "INV-A",
            "27AAA0001A1Z5",
            "33DDD0004D1Z2",
            319_450.0,
            31_945.0,
            true,
            true,
        ),
        // Scenario B: claimed-only above the one-lakh tier.
        inv(
            "INV-B",
            "27AAA0001A1Z5",
            "29BBB0002B1Z4",
            1_200_000.0,
            120_000.0,
            false,
            true,
        ),
        // Scenario C: a 3-cycle among A, B and C, all matched.
        inv(
            "INV-C1",
            "27AAA0001A1Z5",
            "29BBB0002B1Z4",
            50_000.0,
            5_000.0,
            true,
            true,
        ),
        inv(
            "INV-C2",
            "29BBB0002B1Z4",
            "07CCC0003C1Z3",
            50_000.0,
            5_000.0,
            true,
            true,
        ),
        inv(
            "INV-C3",
            "07CCC0003C1Z3",
            "27AAA0001A1Z5",
            50_000.0,
            5_000.0,
            true,
            true,
        ),
    ];
    (vendors, invoices)
}

async fn loaded_memory_store() -> MemoryStore {
    let store = MemoryStore::new();
    let (vendors, invoices) = sample_dataset();
    let report = ingest::ingest(&store, vendors, invoices)
        .await
        .expect("ingest failed");
    assert!(report.errors.is_empty());
    store
}

#[tokio::test]
async fn mismatch_listing_has_only_the_claimed_only_invoice() {
    let store = loaded_memory_store().await;

    let mismatches = reconcile::reconcile_invoices(&store).await.unwrap();
    assert_eq!(mismatches.len(), 1);

    let row = &mismatches[0];
    assert_eq!(row.invoice.invoice_id, "INV-B");
    assert_eq!(row.status, MatchStatus::ClaimedOnly);
    // 35 for CLAIMED_ONLY plus 20 for tax above one lakh.
    assert_eq!(row.risk_score, 55);
    assert_eq!(row.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn cycle_is_reported_once_in_canonical_rotation() {
    let store = loaded_memory_store().await;

    let cycles = store.cycles(4).await.unwrap();
    assert_eq!(
        cycles,
        vec![vec![
            "07CCC0003C1Z3".to_string(),
            "27AAA0001A1Z5".to_string(),
            "29BBB0002B1Z4".to_string(),
        ]]
    );

    // Depth 2 excludes the 3-cycle entirely.
    assert!(store.cycles(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn vendor_scores_combine_invoices_filings_and_cycles() {
    let store = loaded_memory_store().await;

    let scored = risk::score_all_vendors(&store, 4).await.unwrap();
    assert_eq!(scored.len(), 4);

    // Bharat: 55 (INV-B) + 16 (2 missed filings) + 20 (cycle) = 91.
    let bharat = scored.iter().find(|v| v.gstin == "29BBB0002B1Z4").unwrap();
    assert_eq!(bharat.risk_score, 91);
    assert_eq!(bharat.risk_level, RiskLevel::Critical);
    assert_eq!(bharat.compliance_score, 9);
    assert!(bharat.possible_circular_trading);
    assert_eq!(bharat.suspicious_count, 1);

    // Acme and Chandra only carry the cycle bonus.
    let acme = scored.iter().find(|v| v.gstin == "27AAA0001A1Z5").unwrap();
    assert_eq!(acme.risk_score, 20);
    assert!(acme.possible_circular_trading);

    // Deccan is outside the cycle with a fully matched purchase.
    let deccan = scored.iter().find(|v| v.gstin == "33DDD0004D1Z2").unwrap();
    assert_eq!(deccan.risk_score, 0);
    assert_eq!(deccan.risk_level, RiskLevel::Low);

    // Listing is ordered by score descending.
    assert_eq!(scored[0].gstin, "29BBB0002B1Z4");
}

#[tokio::test]
async fn audit_trail_explains_the_claimed_only_invoice() {
    let store = loaded_memory_store().await;

    let trail = store.audit_trail("INV-B").await.unwrap();
    assert_eq!(trail.status, MatchStatus::ClaimedOnly);
    assert_eq!(trail.risk_score, 55);
    assert_eq!(trail.seller_name, "Acme Traders");
    assert_eq!(trail.buyer_name, "Bharat Supplies");
    assert!(trail.trail.len() >= 5);
    assert!(trail.explanation.contains("fraudulent"));

    // Both parties sit in the detected cycle, so the trail flags it.
    assert!(trail
        .trail
        .iter()
        .any(|step| step.description.contains("circular trading")));
}

#[tokio::test]
async fn reingestion_is_idempotent() {
    let store = loaded_memory_store().await;
    let before = store.summary().await.unwrap();

    let (vendors, invoices) = sample_dataset();
    ingest::ingest(&store, vendors, invoices).await.unwrap();

    let after = store.summary().await.unwrap();
    assert_eq!(before, after);
    assert!(store.diagnostics().await.unwrap().is_empty());
}

/// A reset re-ingesting the same dataset must be invisible to concurrent
/// readers: the in-memory backend swaps the rebuilt graph in atomically, so
/// no interleaved query may see the empty or half-loaded intermediate state.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_is_never_observed_half_built() {
    use std::sync::Arc;

    let store = Arc::new(loaded_memory_store().await);
    let populated = store.summary().await.unwrap();

    let reader = {
        let store = Arc::clone(&store);
        let populated = populated.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let seen = store.summary().await.unwrap();
                assert_eq!(seen, populated, "observed a partially rebuilt graph");
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..50 {
        let (vendors, invoices) = sample_dataset();
        ingest::reset(store.as_ref(), vendors, invoices)
            .await
            .unwrap();
    }
    reader.await.unwrap();

    assert_eq!(store.summary().await.unwrap(), populated);
}

#[tokio::test]
async fn reset_rebuilds_from_scratch() {
    let store = loaded_memory_store().await;

    let (vendors, _) = sample_dataset();
    let report = ingest::reset(&store, vendors, Vec::new()).await.unwrap();
    assert_eq!(report.vendors_loaded, 4);
    assert_eq!(report.invoices_loaded, 0);

    let summary = store.summary().await.unwrap();
    assert_eq!(summary.vendor_count, 4);
    assert_eq!(summary.invoice_count, 0);
    assert_eq!(summary.return_count, 0);
}

#[tokio::test]
async fn invalid_records_are_skipped_not_fatal() {
    let store = MemoryStore::new();
    let vendors = vec![
        vendor("27AAA0001A1Z5", "Acme Traders", 0),
        vendor("", "No Gstin", 0),
    ];
    let invoices = vec![
        inv("INV-1", "27AAA0001A1Z5", "29BBB0002B1Z4", 100.0, 10.0, true, true),
        inv("", "27AAA0001A1Z5", "29BBB0002B1Z4", 100.0, 10.0, true, true),
        inv("INV-2", "27AAA0001A1Z5", "29BBB0002B1Z4", -5.0, 10.0, true, true),
    ];

    let report = ingest::ingest(&store, vendors, invoices).await.unwrap();
    assert_eq!(report.vendors_loaded, 1);
    assert_eq!(report.invoices_loaded, 1);
    assert_eq!(report.errors.len(), 3);
}

/// Backend parity against a live FalkorDB. Run with:
/// `FALKORDB_HOST=... cargo test --test parity -- --ignored`
#[tokio::test]
#[ignore]
async fn falkordb_matches_memory_backend() {
    let config = Config {
        falkor_host: env::var("FALKORDB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        falkor_port: env::var("FALKORDB_PORT")
            .unwrap_or_else(|_| "6379".to_string())
            .parse()
            .unwrap_or(6379),
        graph_name: "gst_graph_test".to_string(),
        ..Config::default()
    };
    let falkor = FalkorStore::connect(&config)
        .await
        .expect("FalkorDB connection failed");

    let (vendors, invoices) = sample_dataset();
    ingest::reset(&falkor, vendors, invoices)
        .await
        .expect("falkor ingest failed");
    let memory = loaded_memory_store().await;

    assert_eq!(
        falkor.vendors().await.unwrap(),
        memory.vendors().await.unwrap()
    );
    assert_eq!(
        falkor.invoices().await.unwrap(),
        memory.invoices().await.unwrap()
    );
    assert_eq!(
        falkor.mismatched_invoices().await.unwrap(),
        memory.mismatched_invoices().await.unwrap()
    );
    assert_eq!(
        falkor.cycles(4).await.unwrap(),
        memory.cycles(4).await.unwrap()
    );
    assert_eq!(
        falkor.summary().await.unwrap(),
        memory.summary().await.unwrap()
    );
    assert_eq!(
        falkor.diagnostics().await.unwrap(),
        memory.diagnostics().await.unwrap()
    );

    falkor.clear().await.expect("cleanup failed");
}
