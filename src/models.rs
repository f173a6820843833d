use serde::{Deserialize, Serialize};
use std::fmt;

/// A taxpayer node, keyed by GSTIN.
///
/// A vendor whose `name` equals its `gstin` is a *stub*: it was created
/// implicitly from an invoice edge before real vendor metadata arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub gstin: String,
    pub name: String,
    pub missed_filings: u32,
}

impl Vendor {
    pub fn stub(gstin: &str) -> Self {
        Self {
            gstin: gstin.to_string(),
            name: gstin.to_string(),
            missed_filings: 0,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.name == self.gstin
    }
}

/// Vendor row with its incoming/outgoing invoice counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSummary {
    pub gstin: String,
    pub name: String,
    pub missed_filings: u32,
    pub total_outgoing: u64,
    pub total_incoming: u64,
}

/// An invoice node, keyed by `invoice_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub seller_gstin: String,
    pub buyer_gstin: String,
    pub amount: f64,
    pub tax: f64,
    pub reported_by_seller: bool,
    pub claimed_by_buyer: bool,
}

/// Which tax return a `Return` node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnKind {
    #[serde(rename = "GSTR-1")]
    Gstr1,
    #[serde(rename = "GSTR-2B")]
    Gstr2b,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gstr1 => "GSTR-1",
            Self::Gstr2b => "GSTR-2B",
        }
    }

    /// Derived merge key for the Return node of one invoice.
    /// Re-ingesting the same invoice merges onto the same node.
    pub fn return_id(&self, invoice_id: &str) -> String {
        match self {
            Self::Gstr1 => format!("{invoice_id}_GSTR1"),
            Self::Gstr2b => format!("{invoice_id}_GSTR2B"),
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnFiling {
    pub id: String,
    pub kind: ReturnKind,
}

/// Per-vendor aggregates consumed by the risk scoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAggregates {
    pub gstin: String,
    pub name: String,
    pub missed_filings: u32,
    /// Incoming invoices in state CLAIMED_ONLY.
    pub suspicious_incoming: u64,
    pub total_outgoing: u64,
    pub total_incoming: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorInvoices {
    pub sold: Vec<Invoice>,
    pub purchased: Vec<Invoice>,
}

/// Raw material for the audit trail builder: one invoice plus the state of
/// its endpoints and return filings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceTrail {
    pub invoice: Invoice,
    pub seller: Option<Vendor>,
    pub buyer: Option<Vendor>,
    pub gstr1_filed: bool,
    pub gstr2b_filed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub vendor_count: u64,
    pub invoice_count: u64,
    pub return_count: u64,
    pub mismatch_count: u64,
    pub suspicious_count: u64,
}

/// Typed edge labels of the vendor-invoice-return schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Sold,
    PurchasedBy,
    Filed,
    Reports,
    Claims,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sold => "SOLD",
            Self::PurchasedBy => "PURCHASED_BY",
            Self::Filed => "FILED",
            Self::Reports => "REPORTS",
            Self::Claims => "CLAIMS",
        }
    }
}

/// One node of the visualization snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphNode {
    Vendor {
        id: String,
        name: String,
        missed_filings: u32,
    },
    Invoice {
        id: String,
        seller_gstin: String,
        buyer_gstin: String,
        amount: f64,
        tax: f64,
        reported_by_seller: bool,
        claimed_by_buyer: bool,
        is_suspicious: bool,
    },
    Return {
        id: String,
        kind: ReturnKind,
    },
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Vendor { id, .. } | Self::Invoice { id, .. } | Self::Return { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub rel: EdgeKind,
}

/// Whole-graph snapshot for external visualization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Invariant breaches surfaced by `GraphStore::diagnostics`. Reported for
/// operator action, never auto-corrected outside an explicit `repair` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    /// Invoice with no incoming SOLD edge (floating invoice).
    MissingSoldEdge { invoice_id: String },
    /// Invoice with no outgoing PURCHASED_BY edge (floating invoice).
    MissingPurchasedByEdge { invoice_id: String },
    /// Cardinality breach: more than one SOLD edge.
    ExtraSoldEdges { invoice_id: String, count: u64 },
    /// Cardinality breach: more than one PURCHASED_BY edge.
    ExtraPurchasedByEdges { invoice_id: String, count: u64 },
    /// SOLD edge endpoint disagrees with the invoice's seller_gstin property.
    SellerGstinMismatch {
        invoice_id: String,
        edge_gstin: String,
        property_gstin: String,
    },
    /// PURCHASED_BY edge endpoint disagrees with buyer_gstin.
    BuyerGstinMismatch {
        invoice_id: String,
        edge_gstin: String,
        property_gstin: String,
    },
    /// Two nodes share a unique key.
    DuplicateKey { label: String, key: String },
    /// Return node with no REPORTS/CLAIMS edge to an invoice.
    OrphanReturn { return_id: String },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSoldEdge { invoice_id } => {
                write!(f, "invoice {invoice_id} has no SOLD edge")
            }
            Self::MissingPurchasedByEdge { invoice_id } => {
                write!(f, "invoice {invoice_id} has no PURCHASED_BY edge")
            }
            Self::ExtraSoldEdges { invoice_id, count } => {
                write!(f, "invoice {invoice_id} has {count} SOLD edges")
            }
            Self::ExtraPurchasedByEdges { invoice_id, count } => {
                write!(f, "invoice {invoice_id} has {count} PURCHASED_BY edges")
            }
            Self::SellerGstinMismatch {
                invoice_id,
                edge_gstin,
                property_gstin,
            } => write!(
                f,
                "invoice {invoice_id}: SOLD edge from {edge_gstin} but seller_gstin is {property_gstin}"
            ),
            Self::BuyerGstinMismatch {
                invoice_id,
                edge_gstin,
                property_gstin,
            } => write!(
                f,
                "invoice {invoice_id}: PURCHASED_BY edge to {edge_gstin} but buyer_gstin is {property_gstin}"
            ),
            Self::DuplicateKey { label, key } => {
                write!(f, "duplicate {label} key {key}")
            }
            Self::OrphanReturn { return_id } => {
                write!(f, "return {return_id} is not linked to any invoice")
            }
        }
    }
}

/// Edges re-derived by `GraphStore::repair` from stored GSTIN properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    CreatedSoldEdge {
        invoice_id: String,
        gstin: String,
        stub_vendor_created: bool,
    },
    CreatedPurchasedByEdge {
        invoice_id: String,
        gstin: String,
        stub_vendor_created: bool,
    },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedSoldEdge {
                invoice_id, gstin, ..
            } => write!(f, "re-derived SOLD edge {gstin} -> {invoice_id}"),
            Self::CreatedPurchasedByEdge {
                invoice_id, gstin, ..
            } => write!(f, "re-derived PURCHASED_BY edge {invoice_id} -> {gstin}"),
        }
    }
}
