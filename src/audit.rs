//! Audit trail builder: a stepwise, human-readable verification trace for a
//! single invoice, plus a templated explanation assembled from the computed
//! classification and risk factors. No generative component is involved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::GraphResult;
use crate::models::InvoiceTrail;
use crate::reconcile::MatchStatus;
use crate::risk::{self, RiskLevel};
use crate::store::GraphStore;

pub const AUDIT_CYCLE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStep {
    pub step: u32,
    pub description: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrail {
    pub invoice_id: String,
    pub seller_gstin: String,
    pub seller_name: String,
    pub buyer_gstin: String,
    pub buyer_name: String,
    pub amount: f64,
    pub tax: f64,
    pub reported_by_seller: bool,
    pub claimed_by_buyer: bool,
    pub status: MatchStatus,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub generated_at: DateTime<Utc>,
    pub trail: Vec<AuditStep>,
    pub explanation: String,
}

/// Assemble the ordered verification steps for one invoice.
///
/// Steps 1-5 are always present: locate seller via SOLD, locate buyer via
/// PURCHASED_BY, GSTR-1 presence, GSTR-2B presence, flag comparison. Seller
/// compliance and circular-trading steps are appended when relevant.
#[instrument(skip(store))]
pub async fn build_audit_trail<S>(store: &S, invoice_id: &str) -> GraphResult<AuditTrail>
where
    S: GraphStore + ?Sized,
{
    let trail_data = store.invoice_trail(invoice_id).await?;
    let circular = risk::circular_gstins(store, AUDIT_CYCLE_DEPTH).await?;

    let InvoiceTrail {
        invoice,
        seller,
        buyer,
        gstr1_filed,
        gstr2b_filed,
    } = trail_data;

    let status = MatchStatus::of(&invoice);
    let score = risk::invoice_points(&invoice);
    let in_circular = circular.contains(&invoice.seller_gstin)
        || circular.contains(&invoice.buyer_gstin);

    let seller_name = seller
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), |v| v.name.clone());
    let buyer_name = buyer
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), |v| v.name.clone());
    let seller_missed = seller.as_ref().map_or(0, |v| v.missed_filings);

    let mut steps = Vec::new();
    let mut push = |description: String, status: StepStatus| {
        steps.push(AuditStep {
            step: steps.len() as u32 + 1,
            description,
            status,
        });
    };

    match &seller {
        Some(v) => push(
            format!("Located seller {} ({}) via SOLD edge", v.name, v.gstin),
            StepStatus::Ok,
        ),
        None => push(
            format!(
                "No SOLD edge found for seller {} — floating invoice",
                invoice.seller_gstin
            ),
            StepStatus::Error,
        ),
    }

    match &buyer {
        Some(v) => push(
            format!("Located buyer {} ({}) via PURCHASED_BY edge", v.name, v.gstin),
            StepStatus::Ok,
        ),
        None => push(
            format!(
                "No PURCHASED_BY edge found for buyer {} — floating invoice",
                invoice.buyer_gstin
            ),
            StepStatus::Error,
        ),
    }

    if gstr1_filed {
        push(
            format!(
                "Seller {} filed GSTR-1 — invoice reported",
                invoice.seller_gstin
            ),
            StepStatus::Ok,
        );
    } else {
        push(
            format!(
                "Seller {} did NOT file GSTR-1 — invoice not reported",
                invoice.seller_gstin
            ),
            StepStatus::Error,
        );
    }

    if gstr2b_filed {
        let claim_status = if gstr1_filed {
            StepStatus::Ok
        } else {
            StepStatus::Warning
        };
        push(
            format!("Buyer {} claimed ITC in GSTR-2B", invoice.buyer_gstin),
            claim_status,
        );
    } else {
        push(
            format!("Buyer {} did not claim ITC in GSTR-2B", invoice.buyer_gstin),
            StepStatus::Ok,
        );
    }

    let compare_status = if status.is_mismatch() {
        StepStatus::Error
    } else if status == MatchStatus::NeitherConfirmed {
        StepStatus::Warning
    } else {
        StepStatus::Ok
    };
    push(format!("Classification: {}", status.describe()), compare_status);

    if seller_missed > 0 {
        push(
            format!("Seller has {seller_missed} missed return filings — compliance concern"),
            StepStatus::Warning,
        );
    }

    if in_circular {
        push(
            "Parties are involved in a circular trading pattern".to_string(),
            StepStatus::Error,
        );
    }

    let explanation = render_explanation(
        &invoice.invoice_id,
        &seller_name,
        &buyer_name,
        invoice.amount,
        invoice.tax,
        status,
        seller_missed,
        in_circular,
        score,
    );

    Ok(AuditTrail {
        invoice_id: invoice.invoice_id.clone(),
        seller_gstin: invoice.seller_gstin.clone(),
        seller_name,
        buyer_gstin: invoice.buyer_gstin.clone(),
        buyer_name,
        amount: invoice.amount,
        tax: invoice.tax,
        reported_by_seller: invoice.reported_by_seller,
        claimed_by_buyer: invoice.claimed_by_buyer,
        status,
        risk_score: score,
        risk_level: RiskLevel::from_score(score),
        generated_at: Utc::now(),
        trail: steps,
        explanation,
    })
}

/// Deterministic template substitution over the computed classification and
/// contributing factors.
#[allow(clippy::too_many_arguments)]
fn render_explanation(
    invoice_id: &str,
    seller_name: &str,
    buyer_name: &str,
    amount: f64,
    tax: f64,
    status: MatchStatus,
    seller_missed: u32,
    in_circular: bool,
    score: u32,
) -> String {
    let mut parts = vec![format!(
        "Invoice {invoice_id} records a transaction of ₹{amount:.0} (GST ₹{tax:.0}) \
         from {seller_name} to {buyer_name}."
    )];

    match status {
        MatchStatus::ClaimedOnly => parts.push(
            "The buyer has claimed Input Tax Credit in GSTR-2B, but the seller has NOT \
             reported this invoice in GSTR-1. The buyer may be claiming fraudulent ITC."
                .to_string(),
        ),
        MatchStatus::ReportedOnly => parts.push(
            "The seller reported this invoice in GSTR-1, but the buyer has not claimed \
             the ITC in GSTR-2B. The buyer may be unaware of the transaction or the \
             invoice may be disputed."
                .to_string(),
        ),
        MatchStatus::NeitherConfirmed => parts.push(
            "Neither party has reported this invoice in GSTR-1 or GSTR-2B. This could \
             indicate an off-the-books transaction."
                .to_string(),
        ),
        MatchStatus::BothConfirmed => parts.push(
            "Seller report and buyer claim match. No reconciliation action required."
                .to_string(),
        ),
    }

    if seller_missed > 0 {
        parts.push(format!(
            "The seller has {seller_missed} missed GST return filings, raising further \
             compliance concerns."
        ));
    }

    if in_circular {
        parts.push(
            "One or both parties are involved in a circular trading pattern, a common \
             indicator of fraudulent ITC chains."
                .to_string(),
        );
    }

    parts.push(format!(
        "Invoice risk contribution: {score}/100 ({}).",
        RiskLevel::from_score(score).as_str()
    ));

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explanation_mentions_classification_and_score() {
        let text = render_explanation(
            "INV-9",
            "Acme Traders",
            "Zen Retail",
            1_000_000.0,
            120_000.0,
            MatchStatus::ClaimedOnly,
            1,
            true,
            55,
        );
        assert!(text.contains("INV-9"));
        assert!(text.contains("NOT reported"));
        assert!(text.contains("missed GST return filings"));
        assert!(text.contains("circular trading"));
        assert!(text.contains("55/100 (high)"));
    }

    #[test]
    fn matched_explanation_requires_no_action() {
        let text = render_explanation(
            "INV-1",
            "A",
            "B",
            100.0,
            10.0,
            MatchStatus::BothConfirmed,
            0,
            false,
            0,
        );
        assert!(text.contains("No reconciliation action required"));
        assert!(text.contains("0/100 (low)"));
    }
}
