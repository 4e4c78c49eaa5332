//! Order record value types.
//!
//! `RawOrderRecord` is one extraction result scoped to a single source email;
//! `ConsolidatedOrder` is the merged representation of one real purchase
//! across possibly several emails. Raw records are constructed once by the
//! pipeline stages and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single line item extracted from an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub id: String,
    pub name: String,
    /// Lowercased, whitespace-collapsed name used for deduplication.
    pub normalized_name: String,
    pub quantity: u32,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RawItem {
    /// Creates an item with a fresh id and a normalized name derived from `name`.
    pub fn new(name: &str, quantity: u32, unit: &str, unit_price: Option<f64>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            normalized_name: normalize_name(name),
            quantity: quantity.max(1),
            unit: unit.to_string(),
            unit_price,
            asin: None,
            sku: None,
            product_url: None,
            image_url: None,
        }
    }
}

/// Lowercases and collapses whitespace so the same product named slightly
/// differently across emails dedupes to one entry.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One extraction result per source email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrderRecord {
    pub id: String,
    pub email_id: String,
    pub subject: String,
    pub supplier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    pub items: Vec<RawItem>,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

impl RawOrderRecord {
    pub fn new(email_id: &str, subject: &str, supplier: &str, order_date: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email_id: email_id.to_string(),
            subject: subject.to_string(),
            supplier: supplier.to_string(),
            order_number: None,
            order_date,
            total_amount: 0.0,
            items: Vec::new(),
            confidence: 0.0,
        }
    }

    /// Sum of `quantity * unit_price` across items with a known price.
    pub fn items_total(&self) -> f64 {
        self.items
            .iter()
            .filter_map(|i| i.unit_price.map(|p| p * i.quantity as f64))
            .sum()
    }
}

/// The merged, deduplicated representation of one real purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedOrder {
    pub id: String,
    pub supplier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    pub items: Vec<RawItem>,
    pub confidence: f64,
    /// Elapsed days between order placement and delivery, when both signals
    /// were observed in the group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_time_days: Option<i64>,
    /// Ids of the source emails merged into this order.
    pub source_email_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Widget   PRO  "), "widget pro");
        assert_eq!(normalize_name("Widget\tPro"), "widget pro");
        // Idempotent
        assert_eq!(normalize_name("widget pro"), "widget pro");
    }

    #[test]
    fn test_raw_item_defaults_quantity() {
        let item = RawItem::new("Bolt M6", 0, "each", Some(0.12));
        assert_eq!(item.quantity, 1);
        assert_eq!(item.normalized_name, "bolt m6");
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_items_total() {
        let mut record = RawOrderRecord::new("m1", "Order", "Acme", Utc::now());
        record.items.push(RawItem::new("A", 2, "each", Some(3.0)));
        record.items.push(RawItem::new("B", 1, "each", None));
        assert!((record.items_total() - 6.0).abs() < f64::EPSILON);
    }
}
