//! Deterministic order detection and line-item extraction.
//!
//! Used both as the fallback when the generative extractor fails and as an
//! override check when the model claims an obvious order is not one.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::MAX_EXTRACTED_ITEMS;
use crate::mailbox::sender_domain;
use crate::order::RawItem;
use crate::supplier::{supplier_for_domain, supplier_in_text};

/// Subject/body keywords that mark a purchase-related email.
const ORDER_KEYWORDS: &[&str] = &[
    "order confirmation",
    "your order",
    "order number",
    "purchase order",
    "invoice",
    "receipt",
    "tracking number",
    "has shipped",
    "out for delivery",
    "subtotal",
    "payment received",
];

/// Lines containing these are summaries, not line items.
const SUMMARY_WORDS: &[&str] = &["total", "subtotal", "shipping", "tax", "discount", "balance"];

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?\d{1,3}(?:,\d{3})*(?:\.\d{2})?").unwrap());
static PRICE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<name>.{3,120}?)[\s.]{1,40}\$(?P<price>\d[\d,]*\.\d{2})\s*$").unwrap());
static ITEM_NUMBER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)item\s*#?\s*(?P<sku>\d{4,})\b.*?\$(?P<price>\d[\d,]*\.\d{2})").unwrap()
});
static QTY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<name>.{3,120}?)\s+qty:?\s*(?P<qty>\d{1,4})\b.*?\$(?P<price>\d[\d,]*\.\d{2})")
        .unwrap()
});
static TOTAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:order\s+|grand\s+)?total:?\s*\$(?P<amount>\d[\d,]*(?:\.\d{2})?)").unwrap()
});
static AMAZON_ORDER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{7}-\d{7}\b").unwrap());
static ORDER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:order|confirmation|reference|invoice)\s*(?:number|no\.?|id)?\s*[:#]\s*:?\s*(?P<num>[A-Z0-9][A-Z0-9-]{5,19})",
    )
    .unwrap()
});

/// Outcome of the deterministic classifier.
#[derive(Debug, Clone)]
pub struct HeuristicResult {
    pub is_order: bool,
    pub supplier: Option<String>,
    pub items: Vec<RawItem>,
    pub confidence: f64,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    pub order_number: Option<String>,
}

/// Classifies an email using keyword, supplier, and price signals only.
pub fn classify(
    subject: &str,
    from: &str,
    body: &str,
    header_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> HeuristicResult {
    let haystack = format!("{}\n{}", subject, body).to_lowercase();
    let has_dollar = DOLLAR_AMOUNT.is_match(&haystack);
    let has_keyword = ORDER_KEYWORDS.iter().any(|k| haystack.contains(k));

    let supplier = sender_domain(from)
        .as_deref()
        .and_then(supplier_for_domain)
        .or_else(|| supplier_in_text(&haystack))
        .map(str::to_string);

    let is_order = has_dollar && (has_keyword || supplier.is_some());

    let order_date = header_date.unwrap_or(now);

    if !is_order {
        return HeuristicResult {
            is_order: false,
            supplier,
            items: Vec::new(),
            confidence: 0.0,
            order_date,
            total_amount: 0.0,
            order_number: None,
        };
    }

    let items = extract_items(body);
    let total_amount = extract_total(body)
        .unwrap_or_else(|| items.iter().filter_map(|i| i.unit_price).sum());
    let confidence = if items.is_empty() { 0.5 } else { 0.7 };

    HeuristicResult {
        is_order: true,
        supplier,
        order_number: extract_order_number(subject).or_else(|| extract_order_number(body)),
        items,
        confidence,
        order_date,
        total_amount,
    }
}

/// Runs the three independent regex extraction strategies and unions the
/// results, deduplicated by case-insensitive name and capped at 20 items.
pub fn extract_items(body: &str) -> Vec<RawItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut items = Vec::new();

    let mut push = |item: RawItem| {
        if items.len() < MAX_EXTRACTED_ITEMS && seen.insert(item.normalized_name.clone()) {
            items.push(item);
        }
    };

    let lines: Vec<&str> = body.lines().collect();

    // Strategy 1: "<name> $NN.NN" lines, skipping summary rows. Lines owned
    // by the other two strategies are left to them so their structure is
    // parsed instead of swallowed into the name.
    for line in &lines {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if SUMMARY_WORDS.iter().any(|w| lower.contains(w)) {
            continue;
        }
        if QTY_LINE.is_match(trimmed) || ITEM_NUMBER_LINE.is_match(trimmed) {
            continue;
        }
        if let Some(cap) = PRICE_LINE.captures(trimmed) {
            let name = cap["name"].trim().trim_end_matches(['.', '-', ':']).trim();
            if name.is_empty() || name.starts_with('$') {
                continue;
            }
            let price = parse_amount(&cap["price"]);
            push(RawItem::new(name, 1, "each", price));
        }
    }

    // Strategy 2: "Item # 12345 ... $NN.NN" lines; the product name is the
    // preceding non-empty line.
    for (idx, line) in lines.iter().enumerate() {
        if let Some(cap) = ITEM_NUMBER_LINE.captures(line) {
            let name = lines[..idx]
                .iter()
                .rev()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .unwrap_or("Unknown item");
            let price = parse_amount(&cap["price"]);
            let mut item = RawItem::new(name, 1, "each", price);
            item.sku = Some(cap["sku"].to_string());
            push(item);
        }
    }

    // Strategy 3: "<name> Qty: N $NN.NN" lines.
    for line in &lines {
        if let Some(cap) = QTY_LINE.captures(line.trim()) {
            let quantity: u32 = cap["qty"].parse().unwrap_or(1);
            let price = parse_amount(&cap["price"]);
            push(RawItem::new(cap["name"].trim(), quantity, "each", price));
        }
    }

    items
}

/// Finds the order total line, if present.
pub fn extract_total(body: &str) -> Option<f64> {
    TOTAL_LINE
        .captures(body)
        .and_then(|cap| parse_amount(&cap["amount"]))
}

/// Extracts an explicit order/reference number from subject or body text.
/// Marketplace-shaped numbers (`NNN-NNNNNNN-NNNNNNN`) win over the generic
/// keyworded form; a match must contain at least one digit.
pub fn extract_order_number(text: &str) -> Option<String> {
    if let Some(m) = AMAZON_ORDER_NUMBER.find(text) {
        return Some(m.as_str().to_string());
    }
    ORDER_NUMBER
        .captures(text)
        .map(|cap| cap["num"].trim_end_matches(['.', ',']).to_string())
        .filter(|num| num.chars().any(|c| c.is_ascii_digit()))
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}
