//! Placeholder backend for Gremlin-speaking stores (AWS Neptune). The
//! endpoint is recorded so configuration can be validated end to end, but
//! every operation reports the backend as unsupported until a Gremlin
//! client is wired in.

use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::error::{GraphError, GraphResult};
use crate::models::{
    GraphSnapshot, GraphSummary, IntegrityViolation, Invoice, InvoiceTrail, RepairAction,
    ReturnKind, VendorAggregates, VendorInvoices, VendorSummary,
};
use crate::store::GraphStore;

pub struct GremlinStore {
    endpoint: String,
}

impl GremlinStore {
    pub fn new(config: &Config) -> GraphResult<Self> {
        if config.gremlin_endpoint.is_empty() {
            return Err(GraphError::Configuration(
                "GREMLIN_ENDPOINT is required for the gremlin backend".to_string(),
            ));
        }
        let endpoint = config.gremlin_endpoint.clone();
        warn!(%endpoint, "gremlin backend selected; operations are not implemented");
        Ok(Self { endpoint })
    }

    fn unsupported<T>(&self, operation: &str) -> GraphResult<T> {
        Err(GraphError::unsupported(
            "gremlin",
            format!("{operation} is not implemented for endpoint {}", self.endpoint),
        ))
    }
}

#[async_trait]
impl GraphStore for GremlinStore {
    fn backend_name(&self) -> &'static str {
        "gremlin"
    }

    async fn ensure_schema(&self) -> GraphResult<()> {
        self.unsupported("ensure_schema")
    }

    async fn clear(&self) -> GraphResult<()> {
        self.unsupported("clear")
    }

    async fn upsert_vendor(&self, _gstin: &str, _name: &str, _missed_filings: u32) -> GraphResult<()> {
        self.unsupported("upsert_vendor")
    }

    async fn upsert_invoice(&self, _invoice: &Invoice) -> GraphResult<()> {
        self.unsupported("upsert_invoice")
    }

    async fn record_return(
        &self,
        _vendor_gstin: &str,
        _invoice_id: &str,
        _kind: ReturnKind,
    ) -> GraphResult<()> {
        self.unsupported("record_return")
    }

    async fn vendor(&self, _gstin: &str) -> GraphResult<Option<VendorSummary>> {
        self.unsupported("vendor")
    }

    async fn vendors(&self) -> GraphResult<Vec<VendorSummary>> {
        self.unsupported("vendors")
    }

    async fn invoice(&self, _invoice_id: &str) -> GraphResult<Option<Invoice>> {
        self.unsupported("invoice")
    }

    async fn invoices(&self) -> GraphResult<Vec<Invoice>> {
        self.unsupported("invoices")
    }

    async fn vendor_invoices(&self, _gstin: &str) -> GraphResult<VendorInvoices> {
        self.unsupported("vendor_invoices")
    }

    async fn mismatched_invoices(&self) -> GraphResult<Vec<Invoice>> {
        self.unsupported("mismatched_invoices")
    }

    async fn vendor_aggregates(&self, _gstin: &str) -> GraphResult<VendorAggregates> {
        self.unsupported("vendor_aggregates")
    }

    async fn cycles(&self, _max_depth: usize) -> GraphResult<Vec<Vec<String>>> {
        self.unsupported("cycles")
    }

    async fn full_graph(&self) -> GraphResult<GraphSnapshot> {
        self.unsupported("full_graph")
    }

    async fn invoice_trail(&self, _invoice_id: &str) -> GraphResult<InvoiceTrail> {
        self.unsupported("invoice_trail")
    }

    async fn diagnostics(&self) -> GraphResult<Vec<IntegrityViolation>> {
        self.unsupported("diagnostics")
    }

    async fn repair(&self) -> GraphResult<Vec<RepairAction>> {
        self.unsupported("repair")
    }

    async fn summary(&self) -> GraphResult<GraphSummary> {
        self.unsupported("summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, Config};

    fn gremlin_config() -> Config {
        Config {
            backend: BackendKind::Gremlin,
            gremlin_endpoint: "wss://neptune.example:8182/gremlin".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn endpoint_is_required() {
        let config = Config {
            backend: BackendKind::Gremlin,
            ..Config::default()
        };
        assert!(GremlinStore::new(&config).is_err());
    }

    #[tokio::test]
    async fn operations_report_unsupported_backend() {
        let store = GremlinStore::new(&gremlin_config()).unwrap();
        let err = store.vendors().await.unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedBackend { .. }));
        assert!(err.to_string().contains("gremlin"));
    }
}
