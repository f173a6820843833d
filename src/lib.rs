/*!
# GST Reconciliation Graph Core

Invoice-graph reconciliation for GST return filings, backed by a pluggable
graph store.

This library provides:
- A backend-agnostic [`store::GraphStore`] contract with FalkorDB and
  in-memory implementations that return identical results
- Seller-report vs buyer-claim reconciliation with deterministic ordering
- Vendor risk scoring with circular-trading detection
- Stepwise audit trails with templated explanations
- Graph integrity diagnostics and edge repair
*/

pub mod audit;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod reconcile;
pub mod risk;
pub mod store;

pub use audit::{AuditStep, AuditTrail, StepStatus};
pub use config::{BackendKind, Config};
pub use error::{GraphError, GraphResult};
pub use ingest::{IngestReport, InvoiceRecord, VendorRecord};
pub use models::{Invoice, ReturnKind, Vendor};
pub use reconcile::{MatchStatus, MismatchedInvoice};
pub use risk::{RiskLevel, VendorRisk};
pub use store::{connect_store, FalkorStore, GraphStore, GremlinStore, MemoryStore};
