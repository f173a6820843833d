use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::audit::AuditTrail;
use crate::config::{BackendKind, Config};
use crate::error::GraphResult;
use crate::models::{
    GraphSnapshot, GraphSummary, IntegrityViolation, Invoice, InvoiceTrail, RepairAction,
    ReturnKind, Vendor, VendorAggregates, VendorInvoices, VendorSummary,
};

pub mod falkor;
pub mod gremlin;
pub mod memory;
pub mod queries;

pub use self::falkor::FalkorStore;
pub use self::gremlin::GremlinStore;
pub use self::memory::MemoryStore;

/// The sole contract for creating, mutating and querying the
/// vendor-invoice-return graph.
///
/// Any two backends, given the same logical input dataset, must return
/// identical results from every query here. Only ingestion mutates the graph;
/// all analytics are pure readers.
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Create uniqueness indexes for the schema. Idempotent.
    async fn ensure_schema(&self) -> GraphResult<()>;

    /// Destroy the entire graph. Destruction is whole-graph only; partial
    /// deletes do not exist in this model.
    async fn clear(&self) -> GraphResult<()>;

    /// Idempotent vendor upsert. Overwrites scalar attributes last-write-wins
    /// but never downgrades a non-stub vendor to a stub.
    async fn upsert_vendor(&self, gstin: &str, name: &str, missed_filings: u32)
        -> GraphResult<()>;

    /// Create or update the Invoice node together with both its SOLD and
    /// PURCHASED_BY edges as one atomic unit. Auto-creates stub vendor
    /// endpoints if absent, never overwriting an existing vendor's name.
    async fn upsert_invoice(&self, invoice: &Invoice) -> GraphResult<()>;

    /// Materialize a Return node (merge-keyed on the id derived from the
    /// invoice and kind) plus its FILED and REPORTS/CLAIMS edges.
    async fn record_return(
        &self,
        vendor_gstin: &str,
        invoice_id: &str,
        kind: ReturnKind,
    ) -> GraphResult<()>;

    /// Destroy the graph and rebuild it from the given dataset as one
    /// exclusive operation: no mutation interleaves with the rebuild, and
    /// readers never observe a partially rebuilt graph where the backend can
    /// avoid it. Return nodes are re-derived from the invoice flags.
    ///
    /// The default is clear-then-reingest for backends whose store is
    /// remote; the in-memory backend overrides it with an atomic swap.
    async fn replace_graph(
        &self,
        vendors: Vec<Vendor>,
        invoices: Vec<Invoice>,
    ) -> GraphResult<()> {
        self.clear().await?;
        self.ensure_schema().await?;
        for vendor in &vendors {
            self.upsert_vendor(&vendor.gstin, &vendor.name, vendor.missed_filings)
                .await?;
        }
        for invoice in &invoices {
            self.upsert_invoice(invoice).await?;
            if invoice.reported_by_seller {
                self.record_return(&invoice.seller_gstin, &invoice.invoice_id, ReturnKind::Gstr1)
                    .await?;
            }
            if invoice.claimed_by_buyer {
                self.record_return(&invoice.buyer_gstin, &invoice.invoice_id, ReturnKind::Gstr2b)
                    .await?;
            }
        }
        Ok(())
    }

    async fn vendor(&self, gstin: &str) -> GraphResult<Option<VendorSummary>>;

    /// All vendors with invoice counts, ordered by GSTIN.
    async fn vendors(&self) -> GraphResult<Vec<VendorSummary>>;

    async fn invoice(&self, invoice_id: &str) -> GraphResult<Option<Invoice>>;

    /// All invoices, ordered by invoice id.
    async fn invoices(&self) -> GraphResult<Vec<Invoice>>;

    /// Invoices sold and purchased by one vendor.
    async fn vendor_invoices(&self, gstin: &str) -> GraphResult<VendorInvoices>;

    /// Invoices where reported_by_seller differs from claimed_by_buyer,
    /// ordered by tax descending (ties broken by invoice id).
    async fn mismatched_invoices(&self) -> GraphResult<Vec<Invoice>>;

    /// Suspicious-incoming count, missed filings and invoice totals for one
    /// vendor. Unknown GSTIN is a NotFound error.
    async fn vendor_aggregates(&self, gstin: &str) -> GraphResult<VendorAggregates>;

    /// Vendor-GSTIN chains forming a directed SOLD -> PURCHASED_BY cycle of
    /// length 2..=max_depth, rotation-deduplicated to their canonical form
    /// and ordered lexicographically.
    async fn cycles(&self, max_depth: usize) -> GraphResult<Vec<Vec<String>>>;

    /// Snapshot of all nodes and edges for external visualization.
    async fn full_graph(&self) -> GraphResult<GraphSnapshot>;

    /// Raw audit material for one invoice: endpoints located via edges plus
    /// return-filing presence. Unknown invoice id is a NotFound error.
    async fn invoice_trail(&self, invoice_id: &str) -> GraphResult<InvoiceTrail>;

    /// Integrity violations currently present in the graph. Read-only;
    /// nothing is corrected here.
    async fn diagnostics(&self) -> GraphResult<Vec<IntegrityViolation>>;

    /// Re-derive missing SOLD/PURCHASED_BY edges from stored GSTIN
    /// properties, creating stub vendors where needed. The only sanctioned
    /// mutation outside ingestion; every action is logged and returned.
    async fn repair(&self) -> GraphResult<Vec<RepairAction>>;

    async fn summary(&self) -> GraphResult<GraphSummary>;

    /// Ordered verification steps plus templated explanation for one invoice.
    async fn audit_trail(&self, invoice_id: &str) -> GraphResult<AuditTrail> {
        crate::audit::build_audit_trail(self, invoice_id).await
    }
}

/// Build the configured backend. Resolved once at process start; there is no
/// ambient global store.
pub async fn connect_store(config: &Config) -> GraphResult<Arc<dyn GraphStore>> {
    let store: Arc<dyn GraphStore> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Falkor => Arc::new(FalkorStore::connect(config).await?),
        BackendKind::Gremlin => Arc::new(GremlinStore::new(config)?),
    };
    info!(backend = store.backend_name(), "graph store ready");
    Ok(store)
}

/// Rotate a cycle so it starts at its lexicographically smallest GSTIN.
/// Distinct rotations of the same cycle collapse onto this form.
pub(crate) fn canonical_cycle(chain: &[String]) -> Vec<String> {
    let Some((min_idx, _)) = chain
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(chain.len());
    rotated.extend_from_slice(&chain[min_idx..]);
    rotated.extend_from_slice(&chain[..min_idx]);
    rotated
}

/// Filter raw chains to the 2..=max_depth window, canonicalize rotations and
/// drop duplicates. Output is lexicographically ordered so both backends
/// report cycles identically.
pub(crate) fn dedupe_cycles(raw: Vec<Vec<String>>, max_depth: usize) -> Vec<Vec<String>> {
    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    for chain in raw {
        if chain.len() < 2 || chain.len() > max_depth {
            continue;
        }
        seen.insert(canonical_cycle(&chain));
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn canonical_cycle_rotates_to_smallest() {
        assert_eq!(
            canonical_cycle(&chain(&["C", "A", "B"])),
            chain(&["A", "B", "C"])
        );
        assert_eq!(canonical_cycle(&chain(&["B", "A"])), chain(&["A", "B"]));
    }

    #[test]
    fn dedupe_collapses_rotations_only() {
        let raw = vec![
            chain(&["A", "B"]),
            chain(&["B", "A"]),
            chain(&["A", "B", "C"]),
            chain(&["B", "C", "A"]),
        ];
        let deduped = dedupe_cycles(raw, 4);
        // [A,B] and [A,B,C] overlap but are not rotations of each other
        assert_eq!(deduped, vec![chain(&["A", "B"]), chain(&["A", "B", "C"])]);
    }

    #[test]
    fn dedupe_enforces_depth_window() {
        let raw = vec![
            chain(&["A"]),
            chain(&["A", "B"]),
            chain(&["A", "B", "C", "D", "E"]),
        ];
        assert_eq!(dedupe_cycles(raw, 4), vec![chain(&["A", "B"])]);
    }
}
