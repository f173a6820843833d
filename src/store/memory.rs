//! In-process graph store: node tables keyed by unique id plus per-type edge
//! sets, mirroring the persistent schema. Structural mutations are serialized
//! through a single writer lock so the SOLD + PURCHASED_BY pair of an invoice
//! becomes visible atomically; reads take a shared lock.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument};

use crate::error::{GraphError, GraphResult};
use crate::models::{
    EdgeKind, GraphEdge, GraphNode, GraphSnapshot, GraphSummary, IntegrityViolation, Invoice,
    InvoiceTrail, RepairAction, ReturnFiling, ReturnKind, Vendor, VendorAggregates,
    VendorInvoices, VendorSummary,
};
use crate::store::{dedupe_cycles, GraphStore};

#[derive(Debug, Default)]
struct GraphInner {
    vendors: BTreeMap<String, Vendor>,
    invoices: BTreeMap<String, Invoice>,
    returns: BTreeMap<String, ReturnFiling>,
    /// (vendor gstin, invoice id)
    sold: BTreeSet<(String, String)>,
    /// (invoice id, vendor gstin)
    purchased_by: BTreeSet<(String, String)>,
    /// (vendor gstin, return id)
    filed: BTreeSet<(String, String)>,
    /// (return id, invoice id)
    reports: BTreeSet<(String, String)>,
    /// (return id, invoice id)
    claims: BTreeSet<(String, String)>,
}

impl GraphInner {
    fn sellers_of(&self, invoice_id: &str) -> Vec<&str> {
        self.sold
            .iter()
            .filter(|(_, inv)| inv == invoice_id)
            .map(|(gstin, _)| gstin.as_str())
            .collect()
    }

    fn buyers_of(&self, invoice_id: &str) -> Vec<&str> {
        self.purchased_by
            .iter()
            .filter(|(inv, _)| inv == invoice_id)
            .map(|(_, gstin)| gstin.as_str())
            .collect()
    }

    fn return_filed(&self, invoice_id: &str, kind: ReturnKind) -> bool {
        let edges = match kind {
            ReturnKind::Gstr1 => &self.reports,
            ReturnKind::Gstr2b => &self.claims,
        };
        edges.iter().any(|(rid, inv)| {
            inv == invoice_id && self.returns.get(rid).is_some_and(|r| r.kind == kind)
        })
    }

    fn vendor_summary(&self, vendor: &Vendor) -> VendorSummary {
        let total_outgoing = self
            .sold
            .iter()
            .filter(|(gstin, _)| *gstin == vendor.gstin)
            .count() as u64;
        let total_incoming = self
            .purchased_by
            .iter()
            .filter(|(_, gstin)| *gstin == vendor.gstin)
            .count() as u64;
        VendorSummary {
            gstin: vendor.gstin.clone(),
            name: vendor.name.clone(),
            missed_filings: vendor.missed_filings,
            total_outgoing,
            total_incoming,
        }
    }

    fn ensure_stub(&mut self, gstin: &str) -> bool {
        if self.vendors.contains_key(gstin) {
            return false;
        }
        self.vendors.insert(gstin.to_string(), Vendor::stub(gstin));
        true
    }

    fn apply_vendor(&mut self, gstin: &str, name: &str, missed_filings: u32) {
        use std::collections::btree_map::Entry;

        match self.vendors.entry(gstin.to_string()) {
            Entry::Occupied(mut entry) => {
                let vendor = entry.get_mut();
                vendor.missed_filings = missed_filings;
                // A stub-shaped name never replaces a real one.
                if !(name == gstin && !vendor.is_stub()) {
                    vendor.name = name.to_string();
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Vendor {
                    gstin: gstin.to_string(),
                    name: name.to_string(),
                    missed_filings,
                });
            }
        }
    }

    fn apply_invoice(&mut self, invoice: &Invoice) {
        self.ensure_stub(&invoice.seller_gstin);
        self.ensure_stub(&invoice.buyer_gstin);
        self.invoices
            .insert(invoice.invoice_id.clone(), invoice.clone());
        self.sold
            .insert((invoice.seller_gstin.clone(), invoice.invoice_id.clone()));
        self.purchased_by
            .insert((invoice.invoice_id.clone(), invoice.buyer_gstin.clone()));
    }

    fn apply_return(
        &mut self,
        vendor_gstin: &str,
        invoice_id: &str,
        kind: ReturnKind,
    ) -> GraphResult<()> {
        if !self.invoices.contains_key(invoice_id) {
            return Err(GraphError::not_found(invoice_id));
        }
        self.ensure_stub(vendor_gstin);

        let return_id = kind.return_id(invoice_id);
        self.returns.insert(
            return_id.clone(),
            ReturnFiling {
                id: return_id.clone(),
                kind,
            },
        );
        self.filed
            .insert((vendor_gstin.to_string(), return_id.clone()));
        let edges = match kind {
            ReturnKind::Gstr1 => &mut self.reports,
            ReturnKind::Gstr2b => &mut self.claims,
        };
        edges.insert((return_id, invoice_id.to_string()));
        Ok(())
    }

    /// Vendor-to-vendor adjacency joined through the SOLD and PURCHASED_BY
    /// edge sets, so cycle results track the same edges the persistent
    /// backend's path match traverses.
    fn vendor_adjacency(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut buyers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (invoice_id, buyer) in &self.purchased_by {
            buyers
                .entry(invoice_id.as_str())
                .or_default()
                .push(buyer.as_str());
        }

        let mut adj: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (seller, invoice_id) in &self.sold {
            let Some(invoice_buyers) = buyers.get(invoice_id.as_str()) else {
                continue;
            };
            for buyer in invoice_buyers {
                if seller.as_str() != *buyer {
                    adj.entry(seller.clone())
                        .or_default()
                        .insert((*buyer).to_string());
                }
            }
        }
        adj
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<GraphInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: remove one SOLD edge to construct the deviant state the
    /// floating-invoice diagnostic must catch. The writer API never produces
    /// this state on its own.
    #[cfg(test)]
    fn drop_sold_edge(&self, invoice_id: &str) {
        let mut inner = self.inner.write();
        inner.sold.retain(|(_, inv)| inv != invoice_id);
    }

    #[cfg(test)]
    fn drop_purchased_edge(&self, invoice_id: &str) {
        let mut inner = self.inner.write();
        inner.purchased_by.retain(|(inv, _)| inv != invoice_id);
    }
}

fn by_tax_desc(a: &Invoice, b: &Invoice) -> Ordering {
    b.tax
        .partial_cmp(&a.tax)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.invoice_id.cmp(&b.invoice_id))
}

/// Bounded-depth backtracking search for directed vendor cycles, explicit
/// stack, one visited path per start vendor. Only vendors lexicographically
/// after the start may join the path, so each cycle is discovered exactly
/// once, already in canonical rotation.
fn enumerate_cycles(
    adj: &BTreeMap<String, BTreeSet<String>>,
    max_depth: usize,
) -> Vec<Vec<String>> {
    let mut found = Vec::new();
    if max_depth < 2 {
        return found;
    }

    for start in adj.keys() {
        let mut path: Vec<String> = vec![start.clone()];
        let mut frames: Vec<(Vec<String>, usize)> = vec![(
            adj.get(start).map(|n| n.iter().cloned().collect()).unwrap_or_default(),
            0,
        )];

        loop {
            let Some((neighbors, next_idx)) = frames.last_mut() else {
                break;
            };
            if *next_idx >= neighbors.len() {
                frames.pop();
                path.pop();
                continue;
            }
            let next = neighbors[*next_idx].clone();
            *next_idx += 1;

            if next == *start {
                if path.len() >= 2 {
                    found.push(path.clone());
                }
            } else if path.len() < max_depth
                && next.as_str() > start.as_str()
                && !path.contains(&next)
            {
                let next_neighbors = adj
                    .get(&next)
                    .map(|n| n.iter().cloned().collect())
                    .unwrap_or_default();
                path.push(next);
                frames.push((next_neighbors, 0));
            }
        }
    }
    found
}

#[async_trait]
impl GraphStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_schema(&self) -> GraphResult<()> {
        // Uniqueness is structural here: the node tables are keyed maps.
        Ok(())
    }

    async fn clear(&self) -> GraphResult<()> {
        let mut inner = self.inner.write();
        *inner = GraphInner::default();
        info!("in-memory graph cleared");
        Ok(())
    }

    async fn upsert_vendor(
        &self,
        gstin: &str,
        name: &str,
        missed_filings: u32,
    ) -> GraphResult<()> {
        self.inner.write().apply_vendor(gstin, name, missed_filings);
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn upsert_invoice(&self, invoice: &Invoice) -> GraphResult<()> {
        // One writer critical section: node plus both edges land together.
        self.inner.write().apply_invoice(invoice);
        Ok(())
    }

    async fn record_return(
        &self,
        vendor_gstin: &str,
        invoice_id: &str,
        kind: ReturnKind,
    ) -> GraphResult<()> {
        self.inner.write().apply_return(vendor_gstin, invoice_id, kind)
    }

    /// The rebuilt graph is assembled off-lock and swapped in under one
    /// write-lock acquisition, so concurrent readers see either the old
    /// graph or the finished new one, never an empty or partial state.
    #[instrument(skip_all, fields(vendors = vendors.len(), invoices = invoices.len()))]
    async fn replace_graph(
        &self,
        vendors: Vec<Vendor>,
        invoices: Vec<Invoice>,
    ) -> GraphResult<()> {
        let mut fresh = GraphInner::default();
        for vendor in &vendors {
            fresh.apply_vendor(&vendor.gstin, &vendor.name, vendor.missed_filings);
        }
        for invoice in &invoices {
            fresh.apply_invoice(invoice);
            if invoice.reported_by_seller {
                fresh.apply_return(&invoice.seller_gstin, &invoice.invoice_id, ReturnKind::Gstr1)?;
            }
            if invoice.claimed_by_buyer {
                fresh.apply_return(&invoice.buyer_gstin, &invoice.invoice_id, ReturnKind::Gstr2b)?;
            }
        }

        *self.inner.write() = fresh;
        info!("in-memory graph rebuilt and swapped");
        Ok(())
    }

    async fn vendor(&self, gstin: &str) -> GraphResult<Option<VendorSummary>> {
        let inner = self.inner.read();
        Ok(inner.vendors.get(gstin).map(|v| inner.vendor_summary(v)))
    }

    async fn vendors(&self) -> GraphResult<Vec<VendorSummary>> {
        let inner = self.inner.read();
        Ok(inner
            .vendors
            .values()
            .map(|v| inner.vendor_summary(v))
            .collect())
    }

    async fn invoice(&self, invoice_id: &str) -> GraphResult<Option<Invoice>> {
        let inner = self.inner.read();
        Ok(inner.invoices.get(invoice_id).cloned())
    }

    async fn invoices(&self) -> GraphResult<Vec<Invoice>> {
        let inner = self.inner.read();
        Ok(inner.invoices.values().cloned().collect())
    }

    async fn vendor_invoices(&self, gstin: &str) -> GraphResult<VendorInvoices> {
        let inner = self.inner.read();
        let sold = inner
            .sold
            .iter()
            .filter(|(g, _)| g == gstin)
            .filter_map(|(_, inv)| inner.invoices.get(inv).cloned())
            .collect();
        let purchased = inner
            .purchased_by
            .iter()
            .filter(|(_, g)| g == gstin)
            .filter_map(|(inv, _)| inner.invoices.get(inv).cloned())
            .collect();
        Ok(VendorInvoices { sold, purchased })
    }

    async fn mismatched_invoices(&self) -> GraphResult<Vec<Invoice>> {
        let inner = self.inner.read();
        let mut rows: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|inv| inv.reported_by_seller != inv.claimed_by_buyer)
            .cloned()
            .collect();
        rows.sort_by(by_tax_desc);
        Ok(rows)
    }

    async fn vendor_aggregates(&self, gstin: &str) -> GraphResult<VendorAggregates> {
        let inner = self.inner.read();
        let vendor = inner
            .vendors
            .get(gstin)
            .ok_or_else(|| GraphError::not_found(gstin))?;
        let summary = inner.vendor_summary(vendor);
        let suspicious_incoming = inner
            .purchased_by
            .iter()
            .filter(|(inv, g)| {
                g == gstin
                    && inner
                        .invoices
                        .get(inv)
                        .is_some_and(|i| i.claimed_by_buyer && !i.reported_by_seller)
            })
            .count() as u64;
        Ok(VendorAggregates {
            gstin: summary.gstin,
            name: summary.name,
            missed_filings: summary.missed_filings,
            suspicious_incoming,
            total_outgoing: summary.total_outgoing,
            total_incoming: summary.total_incoming,
        })
    }

    #[instrument(skip(self))]
    async fn cycles(&self, max_depth: usize) -> GraphResult<Vec<Vec<String>>> {
        let inner = self.inner.read();
        let adj = inner.vendor_adjacency();
        drop(inner);
        let raw = enumerate_cycles(&adj, max_depth);
        Ok(dedupe_cycles(raw, max_depth))
    }

    async fn full_graph(&self) -> GraphResult<GraphSnapshot> {
        let inner = self.inner.read();
        let mut nodes = Vec::new();
        for vendor in inner.vendors.values() {
            nodes.push(GraphNode::Vendor {
                id: vendor.gstin.clone(),
                name: vendor.name.clone(),
                missed_filings: vendor.missed_filings,
            });
        }
        for invoice in inner.invoices.values() {
            nodes.push(GraphNode::Invoice {
                id: invoice.invoice_id.clone(),
                seller_gstin: invoice.seller_gstin.clone(),
                buyer_gstin: invoice.buyer_gstin.clone(),
                amount: invoice.amount,
                tax: invoice.tax,
                reported_by_seller: invoice.reported_by_seller,
                claimed_by_buyer: invoice.claimed_by_buyer,
                is_suspicious: invoice.claimed_by_buyer && !invoice.reported_by_seller,
            });
        }
        for filing in inner.returns.values() {
            nodes.push(GraphNode::Return {
                id: filing.id.clone(),
                kind: filing.kind,
            });
        }

        let mut edges = Vec::new();
        let typed: [(&BTreeSet<(String, String)>, EdgeKind); 5] = [
            (&inner.sold, EdgeKind::Sold),
            (&inner.purchased_by, EdgeKind::PurchasedBy),
            (&inner.filed, EdgeKind::Filed),
            (&inner.reports, EdgeKind::Reports),
            (&inner.claims, EdgeKind::Claims),
        ];
        for (set, rel) in typed {
            for (source, target) in set {
                edges.push(GraphEdge {
                    source: source.clone(),
                    target: target.clone(),
                    rel,
                });
            }
        }
        Ok(GraphSnapshot { nodes, edges })
    }

    async fn invoice_trail(&self, invoice_id: &str) -> GraphResult<InvoiceTrail> {
        let inner = self.inner.read();
        let invoice = inner
            .invoices
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| GraphError::not_found(invoice_id))?;

        // Endpoints are located via edges, not properties, so a floating
        // invoice shows up as a missing party in the trail.
        let seller = inner
            .sellers_of(invoice_id)
            .first()
            .and_then(|gstin| inner.vendors.get(*gstin))
            .cloned();
        let buyer = inner
            .buyers_of(invoice_id)
            .first()
            .and_then(|gstin| inner.vendors.get(*gstin))
            .cloned();
        let gstr1_filed = inner.return_filed(invoice_id, ReturnKind::Gstr1);
        let gstr2b_filed = inner.return_filed(invoice_id, ReturnKind::Gstr2b);

        Ok(InvoiceTrail {
            invoice,
            seller,
            buyer,
            gstr1_filed,
            gstr2b_filed,
        })
    }

    async fn diagnostics(&self) -> GraphResult<Vec<IntegrityViolation>> {
        let inner = self.inner.read();
        let mut violations = Vec::new();

        // Checks run category by category so both backends report the same
        // violations in the same order.
        for id in inner.invoices.keys() {
            if inner.sellers_of(id).is_empty() {
                violations.push(IntegrityViolation::MissingSoldEdge {
                    invoice_id: id.clone(),
                });
            }
        }
        for id in inner.invoices.keys() {
            let sellers = inner.sellers_of(id);
            if sellers.len() > 1 {
                violations.push(IntegrityViolation::ExtraSoldEdges {
                    invoice_id: id.clone(),
                    count: sellers.len() as u64,
                });
            }
        }
        for (id, invoice) in &inner.invoices {
            let sellers = inner.sellers_of(id);
            if sellers.len() == 1 && sellers[0] != invoice.seller_gstin {
                violations.push(IntegrityViolation::SellerGstinMismatch {
                    invoice_id: id.clone(),
                    edge_gstin: sellers[0].to_string(),
                    property_gstin: invoice.seller_gstin.clone(),
                });
            }
        }

        for id in inner.invoices.keys() {
            if inner.buyers_of(id).is_empty() {
                violations.push(IntegrityViolation::MissingPurchasedByEdge {
                    invoice_id: id.clone(),
                });
            }
        }
        for id in inner.invoices.keys() {
            let buyers = inner.buyers_of(id);
            if buyers.len() > 1 {
                violations.push(IntegrityViolation::ExtraPurchasedByEdges {
                    invoice_id: id.clone(),
                    count: buyers.len() as u64,
                });
            }
        }
        for (id, invoice) in &inner.invoices {
            let buyers = inner.buyers_of(id);
            if buyers.len() == 1 && buyers[0] != invoice.buyer_gstin {
                violations.push(IntegrityViolation::BuyerGstinMismatch {
                    invoice_id: id.clone(),
                    edge_gstin: buyers[0].to_string(),
                    property_gstin: invoice.buyer_gstin.clone(),
                });
            }
        }

        // The vendor, invoice and return key spaces must not collide.
        for gstin in inner.vendors.keys() {
            if inner.invoices.contains_key(gstin) {
                violations.push(IntegrityViolation::DuplicateKey {
                    label: "Vendor".to_string(),
                    key: gstin.clone(),
                });
            }
        }
        for gstin in inner.vendors.keys() {
            if inner.returns.contains_key(gstin) {
                violations.push(IntegrityViolation::DuplicateKey {
                    label: "Vendor".to_string(),
                    key: gstin.clone(),
                });
            }
        }
        for id in inner.invoices.keys() {
            if inner.returns.contains_key(id) {
                violations.push(IntegrityViolation::DuplicateKey {
                    label: "Invoice".to_string(),
                    key: id.clone(),
                });
            }
        }

        for (rid, _) in &inner.returns {
            let linked = inner.reports.iter().any(|(r, _)| r == rid)
                || inner.claims.iter().any(|(r, _)| r == rid);
            if !linked {
                violations.push(IntegrityViolation::OrphanReturn {
                    return_id: rid.clone(),
                });
            }
        }

        Ok(violations)
    }

    #[instrument(skip(self))]
    async fn repair(&self) -> GraphResult<Vec<RepairAction>> {
        let mut inner = self.inner.write();
        let mut actions = Vec::new();

        let invoice_ids: Vec<String> = inner.invoices.keys().cloned().collect();
        for id in invoice_ids {
            let invoice = match inner.invoices.get(&id) {
                Some(inv) => inv.clone(),
                None => continue,
            };
            if inner.sellers_of(&id).is_empty() {
                let stub_created = inner.ensure_stub(&invoice.seller_gstin);
                inner
                    .sold
                    .insert((invoice.seller_gstin.clone(), id.clone()));
                let action = RepairAction::CreatedSoldEdge {
                    invoice_id: id.clone(),
                    gstin: invoice.seller_gstin.clone(),
                    stub_vendor_created: stub_created,
                };
                info!(%action, "repair");
                actions.push(action);
            }
            if inner.buyers_of(&id).is_empty() {
                let stub_created = inner.ensure_stub(&invoice.buyer_gstin);
                inner
                    .purchased_by
                    .insert((id.clone(), invoice.buyer_gstin.clone()));
                let action = RepairAction::CreatedPurchasedByEdge {
                    invoice_id: id.clone(),
                    gstin: invoice.buyer_gstin.clone(),
                    stub_vendor_created: stub_created,
                };
                info!(%action, "repair");
                actions.push(action);
            }
        }
        Ok(actions)
    }

    async fn summary(&self) -> GraphResult<GraphSummary> {
        let inner = self.inner.read();
        let mismatch_count = inner
            .invoices
            .values()
            .filter(|i| i.reported_by_seller != i.claimed_by_buyer)
            .count() as u64;
        let suspicious_count = inner
            .invoices
            .values()
            .filter(|i| i.claimed_by_buyer && !i.reported_by_seller)
            .count() as u64;
        Ok(GraphSummary {
            vendor_count: inner.vendors.len() as u64,
            invoice_count: inner.invoices.len() as u64,
            return_count: inner.returns.len() as u64,
            mismatch_count,
            suspicious_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(
        id: &str,
        seller: &str,
        buyer: &str,
        tax: f64,
        reported: bool,
        claimed: bool,
    ) -> Invoice {
        Invoice {
            invoice_id: id.to_string(),
            seller_gstin: seller.to_string(),
            buyer_gstin: buyer.to_string(),
            amount: tax * 10.0,
            tax,
            reported_by_seller: reported,
            claimed_by_buyer: claimed,
        }
    }

    #[tokio::test]
    async fn vendor_upsert_is_idempotent_last_write_wins() {
        let store = MemoryStore::new();
        store.upsert_vendor("V1", "Acme", 0).await.unwrap();
        store.upsert_vendor("V1", "Acme Traders", 3).await.unwrap();

        let vendors = store.vendors().await.unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].name, "Acme Traders");
        assert_eq!(vendors[0].missed_filings, 3);
    }

    #[tokio::test]
    async fn stub_vendor_upgrades_but_never_downgrades() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();

        // Implicitly created endpoints are stubs.
        let stub = store.vendor("V1").await.unwrap().unwrap();
        assert_eq!(stub.name, "V1");

        // Real metadata upgrades the stub in place.
        store.upsert_vendor("V1", "Acme", 1).await.unwrap();
        assert_eq!(store.vendor("V1").await.unwrap().unwrap().name, "Acme");

        // A later stub-shaped upsert must not undo the upgrade.
        store.upsert_vendor("V1", "V1", 2).await.unwrap();
        let vendor = store.vendor("V1").await.unwrap().unwrap();
        assert_eq!(vendor.name, "Acme");
        assert_eq!(vendor.missed_filings, 2);
    }

    #[tokio::test]
    async fn invoice_upsert_never_overwrites_real_vendor_name() {
        let store = MemoryStore::new();
        store.upsert_vendor("V1", "Acme", 0).await.unwrap();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();
        assert_eq!(store.vendor("V1").await.unwrap().unwrap().name, "Acme");
    }

    #[tokio::test]
    async fn every_ingested_invoice_has_exactly_one_edge_pair() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .upsert_invoice(&invoice(
                    &format!("I{i}"),
                    "V1",
                    "V2",
                    50.0 * f64::from(i),
                    i % 2 == 0,
                    true,
                ))
                .await
                .unwrap();
        }
        // Re-ingest one invoice: still one edge pair.
        store
            .upsert_invoice(&invoice("I0", "V1", "V2", 999.0, true, true))
            .await
            .unwrap();

        assert!(store.diagnostics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatches_are_ordered_by_tax_descending() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, false))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I2", "V1", "V2", 900.0, false, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I3", "V1", "V2", 500.0, true, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I4", "V1", "V2", 400.0, false, false))
            .await
            .unwrap();

        let mismatches = store.mismatched_invoices().await.unwrap();
        let ids: Vec<&str> = mismatches.iter().map(|i| i.invoice_id.as_str()).collect();
        // Equal-valued flag states (I3, I4) stay out of the listing.
        assert_eq!(ids, vec!["I2", "I1"]);
    }

    #[tokio::test]
    async fn record_return_is_keyed_on_invoice_and_kind() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();
        store
            .record_return("V1", "I1", ReturnKind::Gstr1)
            .await
            .unwrap();
        // Re-ingesting the same filing merges onto the same node.
        store
            .record_return("V1", "I1", ReturnKind::Gstr1)
            .await
            .unwrap();
        store
            .record_return("V2", "I1", ReturnKind::Gstr2b)
            .await
            .unwrap();

        assert_eq!(store.summary().await.unwrap().return_count, 2);

        let trail = store.invoice_trail("I1").await.unwrap();
        assert!(trail.gstr1_filed);
        assert!(trail.gstr2b_filed);
    }

    #[tokio::test]
    async fn record_return_for_unknown_invoice_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .record_return("V1", "NOPE", ReturnKind::Gstr1)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
    }

    #[tokio::test]
    async fn vendor_aggregates_count_suspicious_incoming() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, false, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I2", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I3", "V2", "V1", 100.0, false, true))
            .await
            .unwrap();

        let aggregates = store.vendor_aggregates("V2").await.unwrap();
        assert_eq!(aggregates.suspicious_incoming, 1);
        assert_eq!(aggregates.total_incoming, 2);
        assert_eq!(aggregates.total_outgoing, 1);

        let err = store.vendor_aggregates("NOPE").await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
    }

    #[tokio::test]
    async fn two_vendor_cycle_is_detected_once() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "A", "B", 100.0, true, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I2", "B", "A", 100.0, true, true))
            .await
            .unwrap();

        let cycles = store.cycles(4).await.unwrap();
        assert_eq!(cycles, vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[tokio::test]
    async fn cycle_search_respects_depth_bound() {
        let store = MemoryStore::new();
        // A -> B -> C -> D -> A: a 4-cycle.
        for (id, s, b) in [("I1", "A", "B"), ("I2", "B", "C"), ("I3", "C", "D"), ("I4", "D", "A")]
        {
            store
                .upsert_invoice(&invoice(id, s, b, 100.0, true, true))
                .await
                .unwrap();
        }

        assert!(store.cycles(3).await.unwrap().is_empty());
        let cycles = store.cycles(4).await.unwrap();
        assert_eq!(
            cycles,
            vec![vec![
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
                "D".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn overlapping_cycles_of_distinct_length_both_reported() {
        let store = MemoryStore::new();
        for (id, s, b) in [
            ("I1", "A", "B"),
            ("I2", "B", "A"),
            ("I3", "B", "C"),
            ("I4", "C", "A"),
        ] {
            store
                .upsert_invoice(&invoice(id, s, b, 100.0, true, true))
                .await
                .unwrap();
        }

        let cycles = store.cycles(4).await.unwrap();
        assert_eq!(
            cycles,
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string(), "B".to_string(), "C".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn self_sale_is_not_a_cycle() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "A", "A", 100.0, true, true))
            .await
            .unwrap();
        assert!(store.cycles(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cycle_search_follows_edges_not_invoice_properties() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "A", "B", 100.0, true, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I2", "B", "A", 100.0, true, true))
            .await
            .unwrap();
        assert_eq!(store.cycles(4).await.unwrap().len(), 1);

        // Sever one SOLD edge: the invoice properties still describe A -> B,
        // but the traversal no longer closes the loop.
        store.drop_sold_edge("I1");
        assert!(store.cycles(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_graph_swaps_in_the_full_rebuild() {
        let store = MemoryStore::new();
        store.upsert_vendor("OLD", "Old Vendor", 1).await.unwrap();
        store
            .upsert_invoice(&invoice("I-OLD", "OLD", "V2", 100.0, true, true))
            .await
            .unwrap();

        let vendors = vec![Vendor {
            gstin: "V1".to_string(),
            name: "Acme".to_string(),
            missed_filings: 0,
        }];
        let invoices = vec![invoice("I1", "V1", "V2", 100.0, true, false)];
        store.replace_graph(vendors, invoices).await.unwrap();

        // Nothing of the old graph survives the swap.
        assert!(store.vendor("OLD").await.unwrap().is_none());
        assert!(store.invoice("I-OLD").await.unwrap().is_none());

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.vendor_count, 2); // V1 plus the V2 stub
        assert_eq!(summary.invoice_count, 1);
        assert_eq!(summary.return_count, 1); // re-derived from the reported flag

        let trail = store.invoice_trail("I1").await.unwrap();
        assert!(trail.gstr1_filed);
        assert!(!trail.gstr2b_filed);
    }

    #[tokio::test]
    async fn floating_invoice_is_diagnosed_and_repaired() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();
        store
            .upsert_invoice(&invoice("I2", "V3", "V2", 100.0, true, true))
            .await
            .unwrap();

        store.drop_sold_edge("I1");

        let violations = store.diagnostics().await.unwrap();
        assert_eq!(
            violations,
            vec![IntegrityViolation::MissingSoldEdge {
                invoice_id: "I1".to_string()
            }]
        );

        let actions = store.repair().await.unwrap();
        assert_eq!(
            actions,
            vec![RepairAction::CreatedSoldEdge {
                invoice_id: "I1".to_string(),
                gstin: "V1".to_string(),
                stub_vendor_created: false,
            }]
        );

        // Repair fixed the breach and left the good edges alone.
        assert!(store.diagnostics().await.unwrap().is_empty());
        let trail = store.invoice_trail("I2").await.unwrap();
        assert_eq!(trail.seller.unwrap().gstin, "V3");
    }

    #[tokio::test]
    async fn repair_creates_stub_vendor_when_endpoint_is_gone() {
        let store = MemoryStore::new();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();
        store.drop_purchased_edge("I1");
        {
            let mut inner = store.inner.write();
            inner.vendors.remove("V2");
        }

        let actions = store.repair().await.unwrap();
        assert_eq!(
            actions,
            vec![RepairAction::CreatedPurchasedByEdge {
                invoice_id: "I1".to_string(),
                gstin: "V2".to_string(),
                stub_vendor_created: true,
            }]
        );
        let restored = store.vendor("V2").await.unwrap().unwrap();
        assert_eq!(restored.name, "V2"); // stub until real metadata arrives
    }

    #[tokio::test]
    async fn clear_destroys_the_whole_graph() {
        let store = MemoryStore::new();
        store.upsert_vendor("V1", "Acme", 1).await.unwrap();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, true))
            .await
            .unwrap();
        store.clear().await.unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary, GraphSummary::default());
        assert!(store.full_graph().await.unwrap().nodes.is_empty());
    }

    #[tokio::test]
    async fn full_graph_snapshot_contains_all_nodes_and_edges() {
        let store = MemoryStore::new();
        store.upsert_vendor("V1", "Acme", 0).await.unwrap();
        store
            .upsert_invoice(&invoice("I1", "V1", "V2", 100.0, true, false))
            .await
            .unwrap();
        store
            .record_return("V1", "I1", ReturnKind::Gstr1)
            .await
            .unwrap();

        let snapshot = store.full_graph().await.unwrap();
        // V1, V2 (stub), I1, I1_GSTR1
        assert_eq!(snapshot.nodes.len(), 4);
        // SOLD, PURCHASED_BY, FILED, REPORTS
        assert_eq!(snapshot.edges.len(), 4);
        assert!(snapshot
            .edges
            .contains(&GraphEdge {
                source: "I1_GSTR1".to_string(),
                target: "I1".to_string(),
                rel: EdgeKind::Reports,
            }));
    }

    #[tokio::test]
    async fn invoice_trail_for_unknown_invoice_is_not_found() {
        let store = MemoryStore::new();
        let err = store.invoice_trail("NOPE").await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
    }
}
