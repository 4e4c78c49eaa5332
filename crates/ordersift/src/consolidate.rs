//! Merges per-email order records into consolidated orders.
//!
//! Confirmation, shipment, and delivery emails for the same purchase arrive
//! as separate records. Records sharing a supplier and order number always
//! merge; records without a usable order number merge when they fall inside
//! the date window and their item sets overlap enough.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ConsolidateConfig;
use crate::order::{ConsolidatedOrder, RawItem, RawOrderRecord};

/// Lifecycle stage an email represents, read off its subject line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Touch {
    Ordered,
    Shipped,
    Delivered,
}

fn classify_touch(subject: &str) -> Touch {
    let lower = subject.to_lowercase();
    if lower.contains("delivered") {
        Touch::Delivered
    } else if lower.contains("shipped")
        || lower.contains("shipment")
        || lower.contains("on its way")
        || lower.contains("out for delivery")
        || lower.contains("tracking")
    {
        Touch::Shipped
    } else {
        Touch::Ordered
    }
}

/// Consolidates raw records into merged orders. Every input item survives
/// into exactly one output order.
pub fn consolidate(
    mut records: Vec<RawOrderRecord>,
    config: &ConsolidateConfig,
) -> Vec<ConsolidatedOrder> {
    records.sort_by_key(|r| r.order_date);

    let mut groups: Vec<Vec<RawOrderRecord>> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|g| belongs(g, &record, config)) {
            Some(group) => group.push(record),
            None => groups.push(vec![record]),
        }
    }

    groups.into_iter().map(merge_group).collect()
}

fn belongs(group: &[RawOrderRecord], record: &RawOrderRecord, config: &ConsolidateConfig) -> bool {
    let head = &group[0];
    if !head.supplier.eq_ignore_ascii_case(&record.supplier) {
        return false;
    }

    // An order number on both sides settles it either way.
    if let (Some(a), Some(b)) = (&head.order_number, &record.order_number) {
        return a.eq_ignore_ascii_case(b);
    }

    let in_window = group.iter().any(|g| {
        (record.order_date - g.order_date).num_days().abs() <= config.date_window_days
    });
    if !in_window {
        return false;
    }

    group.iter().any(|g| items_overlap(g, record, config.min_item_overlap))
}

/// Fraction of the smaller item set that appears in the other, by
/// normalized name. A side with no items (shipment notices often carry
/// none) is treated as overlapping.
fn items_overlap(a: &RawOrderRecord, b: &RawOrderRecord, min_overlap: f64) -> bool {
    if a.items.is_empty() || b.items.is_empty() {
        return true;
    }
    let (small, large) = if a.items.len() <= b.items.len() {
        (&a.items, &b.items)
    } else {
        (&b.items, &a.items)
    };
    let shared = small
        .iter()
        .filter(|i| {
            large
                .iter()
                .any(|j| j.normalized_name == i.normalized_name)
        })
        .count();
    shared as f64 / small.len() as f64 >= min_overlap
}

fn merge_group(group: Vec<RawOrderRecord>) -> ConsolidatedOrder {
    let supplier = group[0].supplier.clone();
    let order_date = group.iter().map(|r| r.order_date).min().unwrap_or_else(Utc::now);
    let order_number = group.iter().find_map(|r| r.order_number.clone());
    let total_amount = group
        .iter()
        .map(|r| r.total_amount)
        .fold(0.0_f64, f64::max);
    let confidence = group.iter().map(|r| r.confidence).fold(0.0_f64, f64::max);
    let lead_time_days = lead_time(&group);
    let source_email_ids: Vec<String> = group.iter().map(|r| r.email_id.clone()).collect();

    let mut items: Vec<RawItem> = Vec::new();
    for record in group {
        for item in record.items {
            match items
                .iter_mut()
                .find(|existing| existing.normalized_name == item.normalized_name)
            {
                Some(existing) => absorb(existing, item),
                None => items.push(item),
            }
        }
    }

    debug!(
        "Consolidated {} emails into order {:?} from {}",
        source_email_ids.len(),
        order_number,
        supplier
    );

    ConsolidatedOrder {
        id: uuid::Uuid::new_v4().to_string(),
        supplier,
        order_number,
        order_date,
        total_amount,
        items,
        confidence,
        lead_time_days,
        source_email_ids,
    }
}

/// Duplicate line items keep the larger quantity; missing fields fill in
/// from the duplicate.
fn absorb(existing: &mut RawItem, other: RawItem) {
    existing.quantity = existing.quantity.max(other.quantity);
    if existing.unit_price.is_none() {
        existing.unit_price = other.unit_price;
    }
    if existing.asin.is_none() {
        existing.asin = other.asin;
    }
    if existing.sku.is_none() {
        existing.sku = other.sku;
    }
    if existing.product_url.is_none() {
        existing.product_url = other.product_url;
    }
    if existing.image_url.is_none() {
        existing.image_url = other.image_url;
    }
}

/// Days from the earliest order-confirmation email to the latest delivery
/// email. `None` when the group has no delivery touch; never negative.
fn lead_time(group: &[RawOrderRecord]) -> Option<i64> {
    let ordered: Option<DateTime<Utc>> = group
        .iter()
        .filter(|r| classify_touch(&r.subject) == Touch::Ordered)
        .map(|r| r.order_date)
        .min()
        .or_else(|| group.iter().map(|r| r.order_date).min());
    let delivered = group
        .iter()
        .filter(|r| classify_touch(&r.subject) == Touch::Delivered)
        .map(|r| r.order_date)
        .max()?;
    let days = (delivered - ordered?).num_days();
    Some(days.max(0))
}
