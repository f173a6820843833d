//! Deterministic 0-100 vendor risk scoring.
//!
//! Scoring is a pure function of current graph content. Scores are never
//! persisted as authoritative state; every query recomputes them, so they are
//! automatically consistent after any ingestion.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

use crate::error::GraphResult;
use crate::models::{Invoice, VendorAggregates, VendorSummary};
use crate::reconcile::MatchStatus;
use crate::store::GraphStore;

pub const CLAIMED_ONLY_POINTS: u32 = 35;
pub const REPORTED_ONLY_POINTS: u32 = 15;
pub const NEITHER_CONFIRMED_POINTS: u32 = 25;

/// Flat per-vendor factor, applied once per missed filing.
pub const MISSED_FILING_POINTS: u32 = 8;
/// Flat bonus when the vendor appears in any detected trading cycle.
pub const CIRCULAR_POINTS: u32 = 20;

pub const MAX_SCORE: u32 = 100;

/// Counterparties with at least this many missed filings count as high-risk
/// neighbours in vendor detail views.
const HIGH_RISK_NEIGHBOUR_FILINGS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=24 => Self::Low,
            25..=49 => Self::Medium,
            50..=69 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One row of the vendor risk listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRisk {
    pub gstin: String,
    pub name: String,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub missed_filings: u32,
    pub total_incoming: u64,
    pub total_outgoing: u64,
    /// Incoming CLAIMED_ONLY invoices.
    pub suspicious_count: u64,
    /// Inverse of the risk score: 100 means fully compliant.
    pub compliance_score: u32,
    pub possible_circular_trading: bool,
    /// Counterparties with missed_filings >= 2. Informational only; carries
    /// no score points.
    pub high_risk_neighbours: u64,
    pub reasons: Vec<String>,
}

/// Mutually exclusive tax tiers: only the highest applicable tier counts.
/// Thresholds are strict.
pub fn tax_points(tax: f64) -> u32 {
    if tax > 100_000.0 {
        20
    } else if tax > 50_000.0 {
        15
    } else if tax > 20_000.0 {
        10
    } else {
        0
    }
}

pub fn status_points(status: MatchStatus) -> u32 {
    match status {
        MatchStatus::BothConfirmed => 0,
        MatchStatus::ClaimedOnly => CLAIMED_ONLY_POINTS,
        MatchStatus::ReportedOnly => REPORTED_ONLY_POINTS,
        MatchStatus::NeitherConfirmed => NEITHER_CONFIRMED_POINTS,
    }
}

/// Risk contribution of one invoice, accrued to its buyer. A BOTH_CONFIRMED
/// invoice contributes nothing, tax tier included.
pub fn invoice_points(invoice: &Invoice) -> u32 {
    let status = MatchStatus::of(invoice);
    if status == MatchStatus::BothConfirmed {
        return 0;
    }
    status_points(status) + tax_points(invoice.tax)
}

fn clamp(score: u32) -> u32 {
    score.min(MAX_SCORE)
}

/// GSTINs involved in any trading cycle up to `max_depth`.
pub async fn circular_gstins<S>(store: &S, max_depth: usize) -> GraphResult<HashSet<String>>
where
    S: GraphStore + ?Sized,
{
    let chains = store.cycles(max_depth).await?;
    Ok(chains.into_iter().flatten().collect())
}

/// Pure scoring step shared by the single-vendor and all-vendors paths.
fn score_from_parts(
    aggregates: &VendorAggregates,
    purchased: &[Invoice],
    sold: &[Invoice],
    vendor_filings: &HashMap<String, u32>,
    circular: &HashSet<String>,
) -> VendorRisk {
    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    for invoice in purchased {
        let pts = invoice_points(invoice);
        if pts > 0 {
            score = score.saturating_add(pts);
            reasons.push(format!(
                "Invoice {}: {} (+{pts})",
                invoice.invoice_id,
                MatchStatus::of(invoice).describe()
            ));
        }
    }

    if aggregates.missed_filings > 0 {
        let pts = aggregates.missed_filings.saturating_mul(MISSED_FILING_POINTS);
        score = score.saturating_add(pts);
        reasons.push(format!(
            "Missed {} return filings (+{pts})",
            aggregates.missed_filings
        ));
    }

    let in_cycle = circular.contains(&aggregates.gstin);
    if in_cycle {
        score = score.saturating_add(CIRCULAR_POINTS);
        reasons.push(format!(
            "Involved in circular trading (+{CIRCULAR_POINTS})"
        ));
    }

    let mut neighbours: HashSet<&str> = HashSet::new();
    for invoice in purchased {
        if invoice.seller_gstin != aggregates.gstin {
            neighbours.insert(invoice.seller_gstin.as_str());
        }
    }
    for invoice in sold {
        if invoice.buyer_gstin != aggregates.gstin {
            neighbours.insert(invoice.buyer_gstin.as_str());
        }
    }
    let high_risk_neighbours = neighbours
        .iter()
        .filter(|g| {
            vendor_filings
                .get(**g)
                .is_some_and(|missed| *missed >= HIGH_RISK_NEIGHBOUR_FILINGS)
        })
        .count() as u64;
    if high_risk_neighbours > 0 {
        reasons.push(format!(
            "{high_risk_neighbours} high-risk neighbouring vendor(s)"
        ));
    }

    let score = clamp(score);
    VendorRisk {
        gstin: aggregates.gstin.clone(),
        name: aggregates.name.clone(),
        risk_score: score,
        risk_level: RiskLevel::from_score(score),
        missed_filings: aggregates.missed_filings,
        total_incoming: aggregates.total_incoming,
        total_outgoing: aggregates.total_outgoing,
        suspicious_count: aggregates.suspicious_incoming,
        compliance_score: MAX_SCORE - score,
        possible_circular_trading: in_cycle,
        high_risk_neighbours,
        reasons,
    }
}

fn filings_map(vendors: &[VendorSummary]) -> HashMap<String, u32> {
    vendors
        .iter()
        .map(|v| (v.gstin.clone(), v.missed_filings))
        .collect()
}

/// Score one vendor against the current graph. Unknown GSTIN is NotFound.
#[instrument(skip(store, circular))]
pub async fn score_vendor<S>(
    store: &S,
    gstin: &str,
    circular: &HashSet<String>,
) -> GraphResult<VendorRisk>
where
    S: GraphStore + ?Sized,
{
    let aggregates = store.vendor_aggregates(gstin).await?;
    let invoices = store.vendor_invoices(gstin).await?;
    let filings = filings_map(&store.vendors().await?);
    Ok(score_from_parts(
        &aggregates,
        &invoices.purchased,
        &invoices.sold,
        &filings,
        circular,
    ))
}

/// Vendor risk listing: one row per vendor, highest score first.
#[instrument(skip(store))]
pub async fn score_all_vendors<S>(store: &S, max_depth: usize) -> GraphResult<Vec<VendorRisk>>
where
    S: GraphStore + ?Sized,
{
    let circular = circular_gstins(store, max_depth).await?;
    let vendors = store.vendors().await?;
    let filings = filings_map(&vendors);

    let mut rows = Vec::with_capacity(vendors.len());
    for vendor in &vendors {
        let aggregates = store.vendor_aggregates(&vendor.gstin).await?;
        let invoices = store.vendor_invoices(&vendor.gstin).await?;
        rows.push(score_from_parts(
            &aggregates,
            &invoices.purchased,
            &invoices.sold,
            &filings,
            &circular,
        ));
    }

    rows.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.gstin.cmp(&b.gstin))
    });
    Ok(rows)
}
