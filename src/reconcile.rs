use serde::{Deserialize, Serialize};

use crate::error::GraphResult;
use crate::models::Invoice;
use crate::risk::{self, RiskLevel};
use crate::store::GraphStore;

/// Report/claim classification of a single invoice. Every invoice is in
/// exactly one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Reported in GSTR-1 and claimed in GSTR-2B.
    BothConfirmed,
    /// ITC claimed without a matching seller report. Highest severity.
    ClaimedOnly,
    /// Reported by the seller but never claimed by the buyer.
    ReportedOnly,
    /// In neither return. Equal-valued flags, so not a mismatch, but it
    /// still contributes to risk scoring.
    NeitherConfirmed,
}

impl MatchStatus {
    pub fn classify(reported_by_seller: bool, claimed_by_buyer: bool) -> Self {
        match (reported_by_seller, claimed_by_buyer) {
            (true, true) => Self::BothConfirmed,
            (false, true) => Self::ClaimedOnly,
            (true, false) => Self::ReportedOnly,
            (false, false) => Self::NeitherConfirmed,
        }
    }

    pub fn of(invoice: &Invoice) -> Self {
        Self::classify(invoice.reported_by_seller, invoice.claimed_by_buyer)
    }

    /// The mismatch set is only the states where the two flags disagree.
    /// NEITHER_CONFIRMED is intentionally excluded from mismatch listings.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::ClaimedOnly | Self::ReportedOnly)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::BothConfirmed => "Reported by seller and claimed by buyer",
            Self::ClaimedOnly => "Claimed by buyer but not reported by seller",
            Self::ReportedOnly => "Reported by seller but not claimed by buyer",
            Self::NeitherConfirmed => "Neither reported nor claimed",
        }
    }
}

/// One row of the reconciliation listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MismatchedInvoice {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub status: MatchStatus,
    /// This invoice's buyer-side risk contribution.
    pub risk_score: u32,
    pub risk_level: RiskLevel,
}

/// Run reconciliation across all invoices: mismatched invoices annotated
/// with their classification and risk contribution, highest risk first.
pub async fn reconcile_invoices<S>(store: &S) -> GraphResult<Vec<MismatchedInvoice>>
where
    S: GraphStore + ?Sized,
{
    let mismatches = store.mismatched_invoices().await?;

    let mut rows: Vec<MismatchedInvoice> = mismatches
        .into_iter()
        .map(|invoice| {
            let status = MatchStatus::of(&invoice);
            let score = risk::invoice_points(&invoice);
            MismatchedInvoice {
                status,
                risk_score: score,
                risk_level: RiskLevel::from_score(score),
                invoice,
            }
        })
        .collect();

    // Stable sort: the store already orders by tax descending, so equal
    // scores keep that order.
    rows.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_all_flag_pairs() {
        assert_eq!(MatchStatus::classify(true, true), MatchStatus::BothConfirmed);
        assert_eq!(MatchStatus::classify(false, true), MatchStatus::ClaimedOnly);
        assert_eq!(MatchStatus::classify(true, false), MatchStatus::ReportedOnly);
        assert_eq!(
            MatchStatus::classify(false, false),
            MatchStatus::NeitherConfirmed
        );
    }

    #[test]
    fn mismatch_set_excludes_equal_valued_states() {
        assert!(MatchStatus::ClaimedOnly.is_mismatch());
        assert!(MatchStatus::ReportedOnly.is_mismatch());
        assert!(!MatchStatus::BothConfirmed.is_mismatch());
        // Equal flags, just both false: not part of the mismatch listing.
        assert!(!MatchStatus::NeitherConfirmed.is_mismatch());
    }
}
