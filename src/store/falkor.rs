//! Persistent backend on FalkorDB. All graph semantics live in the Cypher
//! templates in [`super::queries`]; this module handles connection setup,
//! parameter quoting and row decoding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use falkordb::{FalkorAsyncClient, FalkorClientBuilder, FalkorConnectionInfo, FalkorValue};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{GraphError, GraphResult};
use crate::models::{
    GraphEdge, GraphNode, GraphSnapshot, GraphSummary, IntegrityViolation, Invoice, InvoiceTrail,
    RepairAction, ReturnKind, Vendor, VendorAggregates, VendorInvoices, VendorSummary,
};
use crate::store::queries::templates;
use crate::store::{dedupe_cycles, GraphStore};

type Row = HashMap<String, FalkorValue>;

pub struct FalkorStore {
    client: Arc<FalkorAsyncClient>,
    graph_name: String,
}

/// Quote and escape a string for use as a Cypher parameter. The SDK passes
/// parameters through as raw tokens, so strings must arrive pre-quoted.
fn qs(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn qb(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

fn value_string(value: &FalkorValue) -> String {
    match value {
        FalkorValue::String(s) => s.clone(),
        FalkorValue::I64(i) => i.to_string(),
        FalkorValue::F64(f) => f.to_string(),
        FalkorValue::Bool(b) => b.to_string(),
        FalkorValue::None => String::new(),
        other => format!("{other:?}"),
    }
}

fn get_string(row: &Row, key: &str) -> String {
    row.get(key).map(value_string).unwrap_or_default()
}

/// NULL-aware variant for OPTIONAL MATCH columns.
fn get_opt_string(row: &Row, key: &str) -> Option<String> {
    match row.get(key) {
        None | Some(FalkorValue::None) => None,
        Some(value) => Some(value_string(value)),
    }
}

fn get_f64(row: &Row, key: &str) -> f64 {
    match row.get(key) {
        Some(FalkorValue::F64(f)) => *f,
        Some(FalkorValue::I64(i)) => *i as f64,
        Some(FalkorValue::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn get_u64(row: &Row, key: &str) -> u64 {
    match row.get(key) {
        Some(FalkorValue::I64(i)) => (*i).max(0) as u64,
        Some(FalkorValue::F64(f)) => *f as u64,
        Some(FalkorValue::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn get_bool(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(FalkorValue::Bool(b)) => *b,
        Some(FalkorValue::I64(i)) => *i != 0,
        _ => false,
    }
}

fn row_to_invoice(row: &Row) -> Invoice {
    Invoice {
        invoice_id: get_string(row, "invoice_id"),
        seller_gstin: get_string(row, "seller_gstin"),
        buyer_gstin: get_string(row, "buyer_gstin"),
        amount: get_f64(row, "amount"),
        tax: get_f64(row, "tax"),
        reported_by_seller: get_bool(row, "reported_by_seller"),
        claimed_by_buyer: get_bool(row, "claimed_by_buyer"),
    }
}

fn row_to_vendor_summary(row: &Row) -> VendorSummary {
    VendorSummary {
        gstin: get_string(row, "gstin"),
        name: get_string(row, "name"),
        missed_filings: get_u64(row, "missed_filings") as u32,
        total_outgoing: get_u64(row, "total_outgoing"),
        total_incoming: get_u64(row, "total_incoming"),
    }
}

fn parse_return_kind(raw: &str) -> GraphResult<ReturnKind> {
    match raw {
        "GSTR-1" => Ok(ReturnKind::Gstr1),
        "GSTR-2B" => Ok(ReturnKind::Gstr2b),
        other => Err(GraphError::integrity(format!(
            "unknown return type '{other}'"
        ))),
    }
}

impl FalkorStore {
    pub async fn connect(config: &Config) -> GraphResult<Self> {
        info!(
            host = %config.falkor_host,
            port = config.falkor_port,
            graph = %config.graph_name,
            "connecting to FalkorDB"
        );

        let connection_string = format!("falkor://{}:{}", config.falkor_host, config.falkor_port);
        let connection_info: FalkorConnectionInfo = connection_string
            .as_str()
            .try_into()
            .map_err(|e| GraphError::Configuration(format!("invalid connection info: {e}")))?;

        let client = FalkorClientBuilder::new_async()
            .with_connection_info(connection_info)
            .build()
            .await?;

        Ok(Self {
            client: Arc::new(client),
            graph_name: config.graph_name.clone(),
        })
    }

    async fn execute(&self, cypher: &str, params: &HashMap<String, String>) -> GraphResult<Vec<Row>> {
        debug!(query = cypher, "executing query");

        let mut graph = self.client.select_graph(&self.graph_name);
        let result = graph.query(cypher).with_params(params).execute().await?;

        let mut rows = Vec::new();
        for data_row in result.data {
            let mut row = Row::new();
            for (i, column) in result.header.iter().enumerate() {
                if let Some(value) = data_row.get(i) {
                    row.insert(column.clone(), value.clone());
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn execute_plain(&self, cypher: &str) -> GraphResult<Vec<Row>> {
        self.execute(cypher, &HashMap::new()).await
    }

    async fn count(&self, cypher: &str) -> GraphResult<u64> {
        let rows = self.execute_plain(cypher).await?;
        Ok(rows.first().map(|row| get_u64(row, "count")).unwrap_or(0))
    }

    async fn invoice_list(&self, cypher: &str, params: &HashMap<String, String>) -> GraphResult<Vec<Invoice>> {
        let rows = self.execute(cypher, params).await?;
        Ok(rows.iter().map(row_to_invoice).collect())
    }
}

#[async_trait]
impl GraphStore for FalkorStore {
    fn backend_name(&self) -> &'static str {
        "falkordb"
    }

    async fn ensure_schema(&self) -> GraphResult<()> {
        for statement in [
            templates::ENSURE_VENDOR_INDEX,
            templates::ENSURE_INVOICE_INDEX,
            templates::ENSURE_RETURN_INDEX,
        ] {
            // FalkorDB rejects re-creating an existing index.
            if let Err(err) = self.execute_plain(statement).await {
                debug!(%err, statement, "index creation skipped");
            }
        }
        Ok(())
    }

    async fn clear(&self) -> GraphResult<()> {
        self.execute_plain(templates::CLEAR).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upsert_vendor(&self, gstin: &str, name: &str, missed_filings: u32) -> GraphResult<()> {
        let params = HashMap::from([
            ("gstin".to_string(), qs(gstin)),
            ("name".to_string(), qs(name)),
            ("missed_filings".to_string(), missed_filings.to_string()),
        ]);
        self.execute(templates::UPSERT_VENDOR, &params).await?;
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn upsert_invoice(&self, invoice: &Invoice) -> GraphResult<()> {
        let params = HashMap::from([
            ("invoice_id".to_string(), qs(&invoice.invoice_id)),
            ("seller_gstin".to_string(), qs(&invoice.seller_gstin)),
            ("buyer_gstin".to_string(), qs(&invoice.buyer_gstin)),
            ("amount".to_string(), invoice.amount.to_string()),
            ("tax".to_string(), invoice.tax.to_string()),
            (
                "reported_by_seller".to_string(),
                qb(invoice.reported_by_seller),
            ),
            ("claimed_by_buyer".to_string(), qb(invoice.claimed_by_buyer)),
        ]);
        self.execute(templates::UPSERT_INVOICE, &params).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_return(
        &self,
        vendor_gstin: &str,
        invoice_id: &str,
        kind: ReturnKind,
    ) -> GraphResult<()> {
        let template = match kind {
            ReturnKind::Gstr1 => templates::RECORD_RETURN_GSTR1,
            ReturnKind::Gstr2b => templates::RECORD_RETURN_GSTR2B,
        };
        let params = HashMap::from([
            ("gstin".to_string(), qs(vendor_gstin)),
            ("invoice_id".to_string(), qs(invoice_id)),
            ("return_id".to_string(), qs(&kind.return_id(invoice_id))),
        ]);
        let rows = self.execute(template, &params).await?;
        if rows.is_empty() {
            return Err(GraphError::not_found(invoice_id));
        }
        Ok(())
    }

    async fn vendor(&self, gstin: &str) -> GraphResult<Option<VendorSummary>> {
        let params = HashMap::from([("gstin".to_string(), qs(gstin))]);
        let rows = self.execute(templates::GET_VENDOR, &params).await?;
        Ok(rows.first().map(row_to_vendor_summary))
    }

    async fn vendors(&self) -> GraphResult<Vec<VendorSummary>> {
        let rows = self.execute_plain(templates::GET_VENDORS).await?;
        Ok(rows.iter().map(row_to_vendor_summary).collect())
    }

    async fn invoice(&self, invoice_id: &str) -> GraphResult<Option<Invoice>> {
        let params = HashMap::from([("invoice_id".to_string(), qs(invoice_id))]);
        let rows = self.execute(&templates::get_invoice(), &params).await?;
        Ok(rows.first().map(row_to_invoice))
    }

    async fn invoices(&self) -> GraphResult<Vec<Invoice>> {
        self.invoice_list(&templates::get_invoices(), &HashMap::new())
            .await
    }

    async fn vendor_invoices(&self, gstin: &str) -> GraphResult<VendorInvoices> {
        let params = HashMap::from([("gstin".to_string(), qs(gstin))]);
        let sold = self.invoice_list(&templates::vendor_sold(), &params).await?;
        let purchased = self
            .invoice_list(&templates::vendor_purchased(), &params)
            .await?;
        Ok(VendorInvoices { sold, purchased })
    }

    async fn mismatched_invoices(&self) -> GraphResult<Vec<Invoice>> {
        self.invoice_list(&templates::mismatched_invoices(), &HashMap::new())
            .await
    }

    async fn vendor_aggregates(&self, gstin: &str) -> GraphResult<VendorAggregates> {
        let params = HashMap::from([("gstin".to_string(), qs(gstin))]);
        let rows = self.execute(templates::VENDOR_AGGREGATES, &params).await?;
        let row = rows.first().ok_or_else(|| GraphError::not_found(gstin))?;
        Ok(VendorAggregates {
            gstin: get_string(row, "gstin"),
            name: get_string(row, "name"),
            missed_filings: get_u64(row, "missed_filings") as u32,
            suspicious_incoming: get_u64(row, "suspicious_incoming"),
            total_outgoing: get_u64(row, "total_outgoing"),
            total_incoming: get_u64(row, "total_incoming"),
        })
    }

    #[instrument(skip(self))]
    async fn cycles(&self, max_depth: usize) -> GraphResult<Vec<Vec<String>>> {
        let mut raw = Vec::new();
        for len in 2..=max_depth {
            let rows = self.execute_plain(&templates::cycle_query(len)).await?;
            for row in &rows {
                let cycle: Vec<String> = (0..len)
                    .map(|i| get_string(row, &format!("g{i}")))
                    .collect();
                raw.push(cycle);
            }
        }
        Ok(dedupe_cycles(raw, max_depth))
    }

    async fn full_graph(&self) -> GraphResult<GraphSnapshot> {
        let mut nodes = Vec::new();
        for row in &self.execute_plain(templates::GRAPH_VENDORS).await? {
            nodes.push(GraphNode::Vendor {
                id: get_string(row, "id"),
                name: get_string(row, "name"),
                missed_filings: get_u64(row, "missed_filings") as u32,
            });
        }
        for row in &self.execute_plain(&templates::graph_invoices()).await? {
            let invoice = row_to_invoice(row);
            nodes.push(GraphNode::Invoice {
                id: invoice.invoice_id,
                seller_gstin: invoice.seller_gstin,
                buyer_gstin: invoice.buyer_gstin,
                amount: invoice.amount,
                tax: invoice.tax,
                reported_by_seller: invoice.reported_by_seller,
                claimed_by_buyer: invoice.claimed_by_buyer,
                is_suspicious: invoice.claimed_by_buyer && !invoice.reported_by_seller,
            });
        }
        for row in &self.execute_plain(templates::GRAPH_RETURNS).await? {
            nodes.push(GraphNode::Return {
                id: get_string(row, "id"),
                kind: parse_return_kind(&get_string(row, "type"))?,
            });
        }

        let mut edges = Vec::new();
        for rel in [
            crate::models::EdgeKind::Sold,
            crate::models::EdgeKind::PurchasedBy,
            crate::models::EdgeKind::Filed,
            crate::models::EdgeKind::Reports,
            crate::models::EdgeKind::Claims,
        ] {
            let rows = self.execute_plain(&templates::graph_edges(rel.as_str())).await?;
            for row in &rows {
                edges.push(GraphEdge {
                    source: get_string(row, "source"),
                    target: get_string(row, "target"),
                    rel,
                });
            }
        }
        Ok(GraphSnapshot { nodes, edges })
    }

    async fn invoice_trail(&self, invoice_id: &str) -> GraphResult<InvoiceTrail> {
        let params = HashMap::from([("invoice_id".to_string(), qs(invoice_id))]);
        let rows = self.execute(templates::INVOICE_TRAIL, &params).await?;
        let row = rows
            .first()
            .ok_or_else(|| GraphError::not_found(invoice_id))?;

        let seller = get_opt_string(row, "edge_seller_gstin").map(|gstin| Vendor {
            gstin,
            name: get_string(row, "seller_name"),
            missed_filings: get_u64(row, "seller_missed_filings") as u32,
        });
        let buyer = get_opt_string(row, "edge_buyer_gstin").map(|gstin| Vendor {
            gstin,
            name: get_string(row, "buyer_name"),
            missed_filings: get_u64(row, "buyer_missed_filings") as u32,
        });

        Ok(InvoiceTrail {
            invoice: row_to_invoice(row),
            seller,
            buyer,
            gstr1_filed: get_bool(row, "gstr1_filed"),
            gstr2b_filed: get_bool(row, "gstr2b_filed"),
        })
    }

    async fn diagnostics(&self) -> GraphResult<Vec<IntegrityViolation>> {
        let mut violations = Vec::new();

        for row in &self.execute_plain(templates::DIAG_MISSING_SOLD).await? {
            violations.push(IntegrityViolation::MissingSoldEdge {
                invoice_id: get_string(row, "invoice_id"),
            });
        }
        for row in &self.execute_plain(templates::DIAG_EXTRA_SOLD).await? {
            violations.push(IntegrityViolation::ExtraSoldEdges {
                invoice_id: get_string(row, "invoice_id"),
                count: get_u64(row, "edge_count"),
            });
        }
        for row in &self.execute_plain(templates::DIAG_SELLER_MISMATCH).await? {
            violations.push(IntegrityViolation::SellerGstinMismatch {
                invoice_id: get_string(row, "invoice_id"),
                edge_gstin: get_string(row, "edge_gstin"),
                property_gstin: get_string(row, "property_gstin"),
            });
        }
        for row in &self.execute_plain(templates::DIAG_MISSING_PURCHASED).await? {
            violations.push(IntegrityViolation::MissingPurchasedByEdge {
                invoice_id: get_string(row, "invoice_id"),
            });
        }
        for row in &self.execute_plain(templates::DIAG_EXTRA_PURCHASED).await? {
            violations.push(IntegrityViolation::ExtraPurchasedByEdges {
                invoice_id: get_string(row, "invoice_id"),
                count: get_u64(row, "edge_count"),
            });
        }
        for row in &self.execute_plain(templates::DIAG_BUYER_MISMATCH).await? {
            violations.push(IntegrityViolation::BuyerGstinMismatch {
                invoice_id: get_string(row, "invoice_id"),
                edge_gstin: get_string(row, "edge_gstin"),
                property_gstin: get_string(row, "property_gstin"),
            });
        }
        for (label, query) in [
            ("Vendor", templates::DIAG_VENDOR_INVOICE_KEY_CLASH),
            ("Vendor", templates::DIAG_VENDOR_RETURN_KEY_CLASH),
            ("Invoice", templates::DIAG_INVOICE_RETURN_KEY_CLASH),
        ] {
            for row in &self.execute_plain(query).await? {
                violations.push(IntegrityViolation::DuplicateKey {
                    label: label.to_string(),
                    key: get_string(row, "key"),
                });
            }
        }
        for row in &self.execute_plain(templates::DIAG_ORPHAN_RETURNS).await? {
            violations.push(IntegrityViolation::OrphanReturn {
                return_id: get_string(row, "return_id"),
            });
        }

        Ok(violations)
    }

    #[instrument(skip(self))]
    async fn repair(&self) -> GraphResult<Vec<RepairAction>> {
        let mut actions = Vec::new();

        let floating_sold = self
            .execute_plain(templates::REPAIR_FIND_MISSING_SOLD)
            .await?;
        for row in &floating_sold {
            let invoice_id = get_string(row, "invoice_id");
            let gstin = get_string(row, "gstin");
            let stub_needed = get_bool(row, "stub_needed");
            let params = HashMap::from([
                ("invoice_id".to_string(), qs(&invoice_id)),
                ("gstin".to_string(), qs(&gstin)),
            ]);
            self.execute(templates::REPAIR_CREATE_SOLD, &params).await?;
            let action = RepairAction::CreatedSoldEdge {
                invoice_id,
                gstin,
                stub_vendor_created: stub_needed,
            };
            info!(%action, "repair");
            actions.push(action);
        }

        let floating_purchased = self
            .execute_plain(templates::REPAIR_FIND_MISSING_PURCHASED)
            .await?;
        for row in &floating_purchased {
            let invoice_id = get_string(row, "invoice_id");
            let gstin = get_string(row, "gstin");
            let stub_needed = get_bool(row, "stub_needed");
            let params = HashMap::from([
                ("invoice_id".to_string(), qs(&invoice_id)),
                ("gstin".to_string(), qs(&gstin)),
            ]);
            self.execute(templates::REPAIR_CREATE_PURCHASED, &params)
                .await?;
            let action = RepairAction::CreatedPurchasedByEdge {
                invoice_id,
                gstin,
                stub_vendor_created: stub_needed,
            };
            info!(%action, "repair");
            actions.push(action);
        }

        Ok(actions)
    }

    async fn summary(&self) -> GraphResult<GraphSummary> {
        Ok(GraphSummary {
            vendor_count: self.count(templates::COUNT_VENDORS).await?,
            invoice_count: self.count(templates::COUNT_INVOICES).await?,
            return_count: self.count(templates::COUNT_RETURNS).await?,
            mismatch_count: self.count(templates::COUNT_MISMATCHES).await?,
            suspicious_count: self.count(templates::COUNT_SUSPICIOUS).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_params_are_quoted_and_escaped() {
        assert_eq!(qs("V1"), "'V1'");
        assert_eq!(qs("O'Brien"), "'O\\'Brien'");
    }

    #[test]
    fn bool_params_render_as_cypher_literals() {
        assert_eq!(qb(true), "true");
        assert_eq!(qb(false), "false");
    }

    #[test]
    fn invoice_rows_decode_mixed_numeric_types() {
        let row: Row = HashMap::from([
            ("invoice_id".to_string(), FalkorValue::String("I1".into())),
            ("seller_gstin".to_string(), FalkorValue::String("V1".into())),
            ("buyer_gstin".to_string(), FalkorValue::String("V2".into())),
            ("amount".to_string(), FalkorValue::I64(1000)),
            ("tax".to_string(), FalkorValue::F64(120.5)),
            ("reported_by_seller".to_string(), FalkorValue::Bool(true)),
            ("claimed_by_buyer".to_string(), FalkorValue::Bool(false)),
        ]);
        let invoice = row_to_invoice(&row);
        assert_eq!(invoice.invoice_id, "I1");
        assert_eq!(invoice.amount, 1000.0);
        assert_eq!(invoice.tax, 120.5);
        assert!(invoice.reported_by_seller);
        assert!(!invoice.claimed_by_buyer);
    }

    #[test]
    fn optional_columns_distinguish_null_from_empty() {
        let row: Row = HashMap::from([
            ("edge_seller_gstin".to_string(), FalkorValue::None),
            ("edge_buyer_gstin".to_string(), FalkorValue::String("V2".into())),
        ]);
        assert_eq!(get_opt_string(&row, "edge_seller_gstin"), None);
        assert_eq!(
            get_opt_string(&row, "edge_buyer_gstin"),
            Some("V2".to_string())
        );
        assert_eq!(get_opt_string(&row, "missing"), None);
    }

    #[test]
    fn unknown_return_type_is_an_integrity_error() {
        assert!(parse_return_kind("GSTR-1").is_ok());
        assert!(parse_return_kind("GSTR-2B").is_ok());
        assert!(parse_return_kind("GSTR-3B").is_err());
    }
}
