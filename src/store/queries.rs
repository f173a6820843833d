/// Cypher templates for the persistent graph backend. These query shapes are
/// the reference semantics: the in-memory backend reproduces their results
/// (ordering included) exactly.
pub mod templates {
    pub const ENSURE_VENDOR_INDEX: &str = "CREATE INDEX ON :Vendor(gstin)";
    pub const ENSURE_INVOICE_INDEX: &str = "CREATE INDEX ON :Invoice(invoice_id)";
    pub const ENSURE_RETURN_INDEX: &str = "CREATE INDEX ON :Return(id)";

    pub const CLEAR: &str = "MATCH (n) DETACH DELETE n";

    /// Attributes are last-write-wins, except that a stub-shaped name (name
    /// equal to the gstin) never replaces a real vendor name.
    pub const UPSERT_VENDOR: &str = r#"
        MERGE (v:Vendor {gstin: $gstin})
        ON CREATE SET v.name = $name, v.missed_filings = $missed_filings
        ON MATCH SET v.missed_filings = $missed_filings,
                     v.name = CASE
                         WHEN $name = $gstin AND v.name <> $gstin THEN v.name
                         ELSE $name
                     END
    "#;

    /// Invoice node plus both edges in one statement; vendor endpoints are
    /// stub-created ON CREATE only.
    pub const UPSERT_INVOICE: &str = r#"
        MERGE (seller:Vendor {gstin: $seller_gstin})
        ON CREATE SET seller.name = $seller_gstin, seller.missed_filings = 0
        MERGE (buyer:Vendor {gstin: $buyer_gstin})
        ON CREATE SET buyer.name = $buyer_gstin, buyer.missed_filings = 0
        MERGE (inv:Invoice {invoice_id: $invoice_id})
        SET inv.seller_gstin = $seller_gstin,
            inv.buyer_gstin = $buyer_gstin,
            inv.amount = $amount,
            inv.tax = $tax,
            inv.reported_by_seller = $reported_by_seller,
            inv.claimed_by_buyer = $claimed_by_buyer
        MERGE (seller)-[:SOLD]->(inv)
        MERGE (inv)-[:PURCHASED_BY]->(buyer)
    "#;

    /// The Return id is a true merge key, so re-recording a filing updates
    /// the existing node. Returns zero rows when the invoice is unknown.
    pub const RECORD_RETURN_GSTR1: &str = r#"
        MATCH (inv:Invoice {invoice_id: $invoice_id})
        MERGE (v:Vendor {gstin: $gstin})
        ON CREATE SET v.name = $gstin, v.missed_filings = 0
        MERGE (r:Return {id: $return_id})
        SET r.type = 'GSTR-1'
        MERGE (v)-[:FILED]->(r)
        MERGE (r)-[:REPORTS]->(inv)
        RETURN inv.invoice_id AS invoice_id
    "#;

    pub const RECORD_RETURN_GSTR2B: &str = r#"
        MATCH (inv:Invoice {invoice_id: $invoice_id})
        MERGE (v:Vendor {gstin: $gstin})
        ON CREATE SET v.name = $gstin, v.missed_filings = 0
        MERGE (r:Return {id: $return_id})
        SET r.type = 'GSTR-2B'
        MERGE (v)-[:FILED]->(r)
        MERGE (r)-[:CLAIMS]->(inv)
        RETURN inv.invoice_id AS invoice_id
    "#;

    pub const GET_VENDOR: &str = r#"
        MATCH (v:Vendor {gstin: $gstin})
        OPTIONAL MATCH (v)-[:SOLD]->(sold:Invoice)
        WITH v, count(DISTINCT sold) AS total_outgoing
        OPTIONAL MATCH (purchased:Invoice)-[:PURCHASED_BY]->(v)
        RETURN v.gstin AS gstin,
               v.name AS name,
               v.missed_filings AS missed_filings,
               total_outgoing,
               count(DISTINCT purchased) AS total_incoming
    "#;

    pub const GET_VENDORS: &str = r#"
        MATCH (v:Vendor)
        OPTIONAL MATCH (v)-[:SOLD]->(sold:Invoice)
        WITH v, count(DISTINCT sold) AS total_outgoing
        OPTIONAL MATCH (purchased:Invoice)-[:PURCHASED_BY]->(v)
        RETURN v.gstin AS gstin,
               v.name AS name,
               v.missed_filings AS missed_filings,
               total_outgoing,
               count(DISTINCT purchased) AS total_incoming
        ORDER BY v.gstin
    "#;

    pub const VENDOR_AGGREGATES: &str = r#"
        MATCH (v:Vendor {gstin: $gstin})
        OPTIONAL MATCH (v)-[:SOLD]->(sold:Invoice)
        WITH v, count(DISTINCT sold) AS total_outgoing
        OPTIONAL MATCH (purchased:Invoice)-[:PURCHASED_BY]->(v)
        WITH v, total_outgoing, count(DISTINCT purchased) AS total_incoming
        OPTIONAL MATCH (sus:Invoice)-[:PURCHASED_BY]->(v)
        WHERE sus.claimed_by_buyer = true AND sus.reported_by_seller = false
        RETURN v.gstin AS gstin,
               v.name AS name,
               v.missed_filings AS missed_filings,
               count(DISTINCT sus) AS suspicious_incoming,
               total_outgoing,
               total_incoming
    "#;

    const INVOICE_FIELDS: &str = r#"inv.invoice_id AS invoice_id,
               inv.seller_gstin AS seller_gstin,
               inv.buyer_gstin AS buyer_gstin,
               inv.amount AS amount,
               inv.tax AS tax,
               inv.reported_by_seller AS reported_by_seller,
               inv.claimed_by_buyer AS claimed_by_buyer"#;

    pub fn get_invoice() -> String {
        format!(
            "MATCH (inv:Invoice {{invoice_id: $invoice_id}})\n        RETURN {INVOICE_FIELDS}"
        )
    }

    pub fn get_invoices() -> String {
        format!(
            "MATCH (inv:Invoice)\n        RETURN {INVOICE_FIELDS}\n        ORDER BY inv.invoice_id"
        )
    }

    pub fn vendor_sold() -> String {
        format!(
            "MATCH (:Vendor {{gstin: $gstin}})-[:SOLD]->(inv:Invoice)\n        RETURN {INVOICE_FIELDS}\n        ORDER BY inv.invoice_id"
        )
    }

    pub fn vendor_purchased() -> String {
        format!(
            "MATCH (inv:Invoice)-[:PURCHASED_BY]->(:Vendor {{gstin: $gstin}})\n        RETURN {INVOICE_FIELDS}\n        ORDER BY inv.invoice_id"
        )
    }

    pub fn mismatched_invoices() -> String {
        format!(
            "MATCH (inv:Invoice)\n        WHERE inv.reported_by_seller <> inv.claimed_by_buyer\n        RETURN {INVOICE_FIELDS}\n        ORDER BY inv.tax DESC, inv.invoice_id"
        )
    }

    pub const INVOICE_TRAIL: &str = r#"
        MATCH (inv:Invoice {invoice_id: $invoice_id})
        OPTIONAL MATCH (seller:Vendor)-[:SOLD]->(inv)
        OPTIONAL MATCH (inv)-[:PURCHASED_BY]->(buyer:Vendor)
        OPTIONAL MATCH (gstr1:Return {type: 'GSTR-1'})-[:REPORTS]->(inv)
        OPTIONAL MATCH (gstr2b:Return {type: 'GSTR-2B'})-[:CLAIMS]->(inv)
        RETURN inv.invoice_id AS invoice_id,
               inv.seller_gstin AS seller_gstin,
               inv.buyer_gstin AS buyer_gstin,
               inv.amount AS amount,
               inv.tax AS tax,
               inv.reported_by_seller AS reported_by_seller,
               inv.claimed_by_buyer AS claimed_by_buyer,
               seller.gstin AS edge_seller_gstin,
               seller.name AS seller_name,
               seller.missed_filings AS seller_missed_filings,
               buyer.gstin AS edge_buyer_gstin,
               buyer.name AS buyer_name,
               buyer.missed_filings AS buyer_missed_filings,
               gstr1 IS NOT NULL AS gstr1_filed,
               gstr2b IS NOT NULL AS gstr2b_filed
        LIMIT 1
    "#;

    pub const GRAPH_VENDORS: &str = r#"
        MATCH (v:Vendor)
        RETURN v.gstin AS id, v.name AS name, v.missed_filings AS missed_filings
        ORDER BY v.gstin
    "#;

    pub fn graph_invoices() -> String {
        format!(
            "MATCH (inv:Invoice)\n        RETURN {INVOICE_FIELDS}\n        ORDER BY inv.invoice_id"
        )
    }

    pub const GRAPH_RETURNS: &str = r#"
        MATCH (r:Return)
        RETURN r.id AS id, r.type AS type
        ORDER BY r.id
    "#;

    /// One query per edge type keeps snapshot ordering deterministic.
    pub fn graph_edges(rel: &str) -> String {
        let (src_pattern, src_key, dst_key) = match rel {
            "SOLD" => ("(a:Vendor)-[:SOLD]->(b:Invoice)", "a.gstin", "b.invoice_id"),
            "PURCHASED_BY" => (
                "(a:Invoice)-[:PURCHASED_BY]->(b:Vendor)",
                "a.invoice_id",
                "b.gstin",
            ),
            "FILED" => ("(a:Vendor)-[:FILED]->(b:Return)", "a.gstin", "b.id"),
            "REPORTS" => ("(a:Return)-[:REPORTS]->(b:Invoice)", "a.id", "b.invoice_id"),
            _ => ("(a:Return)-[:CLAIMS]->(b:Invoice)", "a.id", "b.invoice_id"),
        };
        format!(
            "MATCH {src_pattern}\n        RETURN {src_key} AS source, {dst_key} AS target\n        ORDER BY source, target"
        )
    }

    // ── diagnostics ────────────────────────────────────────────────

    pub const DIAG_MISSING_SOLD: &str = r#"
        MATCH (inv:Invoice)
        WHERE NOT ( (:Vendor)-[:SOLD]->(inv) )
        RETURN inv.invoice_id AS invoice_id
        ORDER BY inv.invoice_id
    "#;

    pub const DIAG_EXTRA_SOLD: &str = r#"
        MATCH (v:Vendor)-[:SOLD]->(inv:Invoice)
        WITH inv, count(v) AS edge_count
        WHERE edge_count > 1
        RETURN inv.invoice_id AS invoice_id, edge_count
        ORDER BY inv.invoice_id
    "#;

    pub const DIAG_SELLER_MISMATCH: &str = r#"
        MATCH (v:Vendor)-[:SOLD]->(inv:Invoice)
        WITH inv, collect(v.gstin) AS sellers
        WHERE size(sellers) = 1 AND sellers[0] <> inv.seller_gstin
        RETURN inv.invoice_id AS invoice_id,
               sellers[0] AS edge_gstin,
               inv.seller_gstin AS property_gstin
        ORDER BY inv.invoice_id
    "#;

    pub const DIAG_MISSING_PURCHASED: &str = r#"
        MATCH (inv:Invoice)
        WHERE NOT ( (inv)-[:PURCHASED_BY]->(:Vendor) )
        RETURN inv.invoice_id AS invoice_id
        ORDER BY inv.invoice_id
    "#;

    pub const DIAG_EXTRA_PURCHASED: &str = r#"
        MATCH (inv:Invoice)-[:PURCHASED_BY]->(v:Vendor)
        WITH inv, count(v) AS edge_count
        WHERE edge_count > 1
        RETURN inv.invoice_id AS invoice_id, edge_count
        ORDER BY inv.invoice_id
    "#;

    pub const DIAG_BUYER_MISMATCH: &str = r#"
        MATCH (inv:Invoice)-[:PURCHASED_BY]->(v:Vendor)
        WITH inv, collect(v.gstin) AS buyers
        WHERE size(buyers) = 1 AND buyers[0] <> inv.buyer_gstin
        RETURN inv.invoice_id AS invoice_id,
               buyers[0] AS edge_gstin,
               inv.buyer_gstin AS property_gstin
        ORDER BY inv.invoice_id
    "#;

    pub const DIAG_VENDOR_INVOICE_KEY_CLASH: &str = r#"
        MATCH (v:Vendor), (i:Invoice)
        WHERE v.gstin = i.invoice_id
        RETURN v.gstin AS key
        ORDER BY key
    "#;

    pub const DIAG_VENDOR_RETURN_KEY_CLASH: &str = r#"
        MATCH (v:Vendor), (r:Return)
        WHERE v.gstin = r.id
        RETURN v.gstin AS key
        ORDER BY key
    "#;

    pub const DIAG_INVOICE_RETURN_KEY_CLASH: &str = r#"
        MATCH (i:Invoice), (r:Return)
        WHERE i.invoice_id = r.id
        RETURN i.invoice_id AS key
        ORDER BY key
    "#;

    pub const DIAG_ORPHAN_RETURNS: &str = r#"
        MATCH (r:Return)
        WHERE NOT ( (r)-[:REPORTS]->(:Invoice) ) AND NOT ( (r)-[:CLAIMS]->(:Invoice) )
        RETURN r.id AS return_id
        ORDER BY r.id
    "#;

    // ── repair ─────────────────────────────────────────────────────

    pub const REPAIR_FIND_MISSING_SOLD: &str = r#"
        MATCH (inv:Invoice)
        WHERE NOT ( (:Vendor)-[:SOLD]->(inv) )
        OPTIONAL MATCH (v:Vendor {gstin: inv.seller_gstin})
        RETURN inv.invoice_id AS invoice_id,
               inv.seller_gstin AS gstin,
               v IS NULL AS stub_needed
        ORDER BY inv.invoice_id
    "#;

    pub const REPAIR_CREATE_SOLD: &str = r#"
        MATCH (inv:Invoice {invoice_id: $invoice_id})
        MERGE (v:Vendor {gstin: $gstin})
        ON CREATE SET v.name = $gstin, v.missed_filings = 0
        MERGE (v)-[:SOLD]->(inv)
    "#;

    pub const REPAIR_FIND_MISSING_PURCHASED: &str = r#"
        MATCH (inv:Invoice)
        WHERE NOT ( (inv)-[:PURCHASED_BY]->(:Vendor) )
        OPTIONAL MATCH (v:Vendor {gstin: inv.buyer_gstin})
        RETURN inv.invoice_id AS invoice_id,
               inv.buyer_gstin AS gstin,
               v IS NULL AS stub_needed
        ORDER BY inv.invoice_id
    "#;

    pub const REPAIR_CREATE_PURCHASED: &str = r#"
        MATCH (inv:Invoice {invoice_id: $invoice_id})
        MERGE (v:Vendor {gstin: $gstin})
        ON CREATE SET v.name = $gstin, v.missed_filings = 0
        MERGE (inv)-[:PURCHASED_BY]->(v)
    "#;

    // ── summary ────────────────────────────────────────────────────

    pub const COUNT_VENDORS: &str = "MATCH (v:Vendor) RETURN count(v) AS count";
    pub const COUNT_INVOICES: &str = "MATCH (i:Invoice) RETURN count(i) AS count";
    pub const COUNT_RETURNS: &str = "MATCH (r:Return) RETURN count(r) AS count";
    pub const COUNT_MISMATCHES: &str = r#"
        MATCH (i:Invoice)
        WHERE i.reported_by_seller <> i.claimed_by_buyer
        RETURN count(i) AS count
    "#;
    pub const COUNT_SUSPICIOUS: &str = r#"
        MATCH (i:Invoice)
        WHERE i.claimed_by_buyer = true AND i.reported_by_seller = false
        RETURN count(i) AS count
    "#;

    /// Bounded-length directed cycle pattern:
    /// (v0)-[:SOLD]->(:Invoice)-[:PURCHASED_BY]->(v1)-...->(v0), all vendors
    /// pairwise distinct. One query per cycle length; rotations are collapsed
    /// client-side with the shared canonicalization.
    pub fn cycle_query(len: usize) -> String {
        let mut pattern = String::from("MATCH (v0:Vendor)");
        for i in 1..len {
            pattern.push_str(&format!(
                "-[:SOLD]->(:Invoice)-[:PURCHASED_BY]->(v{i}:Vendor)"
            ));
        }
        pattern.push_str("-[:SOLD]->(:Invoice)-[:PURCHASED_BY]->(v0)");

        let mut conditions = Vec::new();
        for i in 0..len {
            for j in (i + 1)..len {
                conditions.push(format!("v{i} <> v{j}"));
            }
        }
        let returns: Vec<String> = (0..len).map(|i| format!("v{i}.gstin AS g{i}")).collect();

        format!(
            "{pattern}\n        WHERE {}\n        RETURN DISTINCT {}",
            conditions.join(" AND "),
            returns.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::templates;

    #[test]
    fn cycle_query_builds_expected_pattern() {
        let q = templates::cycle_query(2);
        assert!(q.starts_with(
            "MATCH (v0:Vendor)-[:SOLD]->(:Invoice)-[:PURCHASED_BY]->(v1:Vendor)\
             -[:SOLD]->(:Invoice)-[:PURCHASED_BY]->(v0)"
        ));
        assert!(q.contains("v0 <> v1"));
        assert!(q.contains("RETURN DISTINCT v0.gstin AS g0, v1.gstin AS g1"));
    }

    #[test]
    fn cycle_query_lists_all_distinctness_pairs() {
        let q = templates::cycle_query(3);
        assert!(q.contains("v0 <> v1 AND v0 <> v2 AND v1 <> v2"));
    }
}
