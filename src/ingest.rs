//! Ingestion: validated vendor/invoice records become graph-store mutations.
//!
//! Append-only: records are upserted individually and independently, and a
//! batch never aborts on a bad record. A full reset is the only destructive
//! path, and it rebuilds the whole graph from the supplied dataset.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{GraphError, GraphResult};
use crate::models::{Invoice, ReturnKind, Vendor};
use crate::store::GraphStore;

/// Raw vendor record as supplied by the upstream loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRecord {
    pub gstin: String,
    pub name: String,
    #[serde(default)]
    pub missed_filings: u32,
}

impl VendorRecord {
    fn validate(&self) -> GraphResult<()> {
        if self.gstin.trim().is_empty() {
            return Err(GraphError::validation("vendor record missing gstin"));
        }
        if self.name.trim().is_empty() {
            return Err(GraphError::validation(format!(
                "vendor {} missing name",
                self.gstin
            )));
        }
        Ok(())
    }
}

/// Raw invoice record as supplied by the upstream loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    pub seller_gstin: String,
    pub buyer_gstin: String,
    pub amount: f64,
    pub tax: f64,
    pub reported_by_seller: bool,
    pub claimed_by_buyer: bool,
}

impl InvoiceRecord {
    fn validate(&self) -> GraphResult<()> {
        if self.invoice_id.trim().is_empty() {
            return Err(GraphError::validation("invoice record missing invoice_id"));
        }
        if self.seller_gstin.trim().is_empty() {
            return Err(GraphError::validation(format!(
                "invoice {} missing seller_gstin",
                self.invoice_id
            )));
        }
        if self.buyer_gstin.trim().is_empty() {
            return Err(GraphError::validation(format!(
                "invoice {} missing buyer_gstin",
                self.invoice_id
            )));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(GraphError::validation(format!(
                "invoice {} has invalid amount",
                self.invoice_id
            )));
        }
        if !self.tax.is_finite() || self.tax < 0.0 {
            return Err(GraphError::validation(format!(
                "invoice {} has invalid tax",
                self.invoice_id
            )));
        }
        Ok(())
    }

    fn into_invoice(self) -> Invoice {
        Invoice {
            invoice_id: self.invoice_id,
            seller_gstin: self.seller_gstin,
            buyer_gstin: self.buyer_gstin,
            amount: self.amount,
            tax: self.tax,
            reported_by_seller: self.reported_by_seller,
            claimed_by_buyer: self.claimed_by_buyer,
        }
    }
}

/// One skipped record of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    pub record: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub vendors_loaded: u64,
    pub invoices_loaded: u64,
    pub errors: Vec<IngestFailure>,
}

/// Upsert a batch of vendor and invoice records.
///
/// Invalid records are skipped and reported; they never abort the batch and
/// never leave partial state behind (validation happens before any store
/// call for that record). Backend errors propagate unmodified.
#[instrument(skip_all, fields(vendors = vendors.len(), invoices = invoices.len()))]
pub async fn ingest<S>(
    store: &S,
    vendors: Vec<VendorRecord>,
    invoices: Vec<InvoiceRecord>,
) -> GraphResult<IngestReport>
where
    S: GraphStore + ?Sized,
{
    let mut report = IngestReport::default();

    for record in vendors {
        if let Err(err) = record.validate() {
            warn!(gstin = %record.gstin, %err, "skipping vendor record");
            report.errors.push(IngestFailure {
                record: record.gstin.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        store
            .upsert_vendor(&record.gstin, &record.name, record.missed_filings)
            .await?;
        report.vendors_loaded += 1;
    }

    for record in invoices {
        if let Err(err) = record.validate() {
            warn!(invoice_id = %record.invoice_id, %err, "skipping invoice record");
            report.errors.push(IngestFailure {
                record: record.invoice_id.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        let invoice = record.into_invoice();
        store.upsert_invoice(&invoice).await?;

        // Materialize one Return node per true flag; the derived id makes
        // re-ingestion merge instead of duplicate.
        if invoice.reported_by_seller {
            store
                .record_return(&invoice.seller_gstin, &invoice.invoice_id, ReturnKind::Gstr1)
                .await?;
        }
        if invoice.claimed_by_buyer {
            store
                .record_return(&invoice.buyer_gstin, &invoice.invoice_id, ReturnKind::Gstr2b)
                .await?;
        }
        report.invoices_loaded += 1;
    }

    info!(
        vendors = report.vendors_loaded,
        invoices = report.invoices_loaded,
        skipped = report.errors.len(),
        "ingestion batch complete"
    );
    Ok(report)
}

/// Destroy the graph and rebuild it from the given dataset.
///
/// Records are validated up front with the same skip-on-error reporting as
/// [`ingest`]; the surviving dataset is then handed to the store as one
/// [`GraphStore::replace_graph`] rebuild, so backends that can swap the
/// graph atomically never expose an empty or partially rebuilt state.
#[instrument(skip_all)]
pub async fn reset<S>(
    store: &S,
    vendors: Vec<VendorRecord>,
    invoices: Vec<InvoiceRecord>,
) -> GraphResult<IngestReport>
where
    S: GraphStore + ?Sized,
{
    let mut report = IngestReport::default();

    let mut vendor_nodes = Vec::new();
    for record in vendors {
        if let Err(err) = record.validate() {
            warn!(gstin = %record.gstin, %err, "skipping vendor record");
            report.errors.push(IngestFailure {
                record: record.gstin.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        vendor_nodes.push(Vendor {
            gstin: record.gstin,
            name: record.name,
            missed_filings: record.missed_filings,
        });
    }

    let mut invoice_nodes = Vec::new();
    for record in invoices {
        if let Err(err) = record.validate() {
            warn!(invoice_id = %record.invoice_id, %err, "skipping invoice record");
            report.errors.push(IngestFailure {
                record: record.invoice_id.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        invoice_nodes.push(record.into_invoice());
    }

    report.vendors_loaded = vendor_nodes.len() as u64;
    report.invoices_loaded = invoice_nodes.len() as u64;
    store.replace_graph(vendor_nodes, invoice_nodes).await?;

    info!(
        vendors = report.vendors_loaded,
        invoices = report.invoices_loaded,
        skipped = report.errors.len(),
        "graph rebuilt from dataset"
    );
    Ok(report)
}
