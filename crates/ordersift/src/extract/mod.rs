//! Generative line-item extraction with deterministic fallback.
//!
//! The model contract is a black box: email text in, one JSON object out,
//! fails sometimes. Everything around it — retries, backoff, malformed-output
//! recovery, and reconciliation against the heuristic classifier — is this
//! module's job.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classify::{self, HeuristicResult};
use crate::config::{PipelineConfig, PROMPT_BODY_LIMIT};
use crate::error::ExtractError;
use crate::mailbox::MailMessage;
use crate::order::{RawItem, RawOrderRecord};

pub use http::HttpGenerativeClient;

/// Text-in, text-out generation service. Errors carry an HTTP-like status so
/// rate limiting is detectable.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ExtractError>;
}

/// Item shape of the model's structured output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    quantity: Option<u32>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    unit_price: Option<f64>,
    #[serde(default)]
    part_number: Option<String>,
    #[serde(default)]
    asin: Option<String>,
}

/// The documented response schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelExtraction {
    #[serde(default)]
    is_order: bool,
    #[serde(default)]
    supplier: Option<String>,
    #[serde(default)]
    order_date: Option<String>,
    #[serde(default)]
    total_amount: Option<f64>,
    #[serde(default)]
    items: Vec<ModelItem>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Receives human-readable notes about retry events during one extraction,
/// so callers can surface them on the job log.
pub type LogFn<'a> = &'a (dyn Fn(String) + Send + Sync);

/// Extraction pipeline stage wrapping an injected [`GenerativeClient`].
pub struct AiExtractor {
    client: Arc<dyn GenerativeClient>,
    max_attempts: u32,
    pacing: Duration,
}

impl AiExtractor {
    pub fn new(client: Arc<dyn GenerativeClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            max_attempts: config.max_extract_attempts.max(1),
            pacing: Duration::from_millis(config.model_pacing_ms),
        }
    }

    /// Extracts a raw order record from one email, or `None` when the email
    /// is not an order. Never returns an error: every failure path degrades
    /// to the heuristic classifier.
    pub async fn extract(
        &self,
        message: &MailMessage,
        body: &str,
        now: DateTime<Utc>,
    ) -> Option<RawOrderRecord> {
        self.extract_logged(message, body, now, &|_| {}).await
    }

    /// Same as [`AiExtractor::extract`], reporting retry events to `log`.
    pub async fn extract_logged(
        &self,
        message: &MailMessage,
        body: &str,
        now: DateTime<Utc>,
        log: LogFn<'_>,
    ) -> Option<RawOrderRecord> {
        let prompt = build_prompt(message, body);

        for attempt in 0..self.max_attempts {
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            match self.client.generate(&prompt).await {
                Ok(response) => {
                    return match parse_extraction(&response) {
                        Ok(parsed) => self.reconcile(parsed, message, body, now),
                        Err(e) => {
                            warn!(
                                "Unparseable model output for message {}: {}",
                                message.id, e
                            );
                            heuristic_record(message, body, now)
                        }
                    };
                }
                Err(e) if e.is_rate_limited() && attempt + 1 < self.max_attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "Rate limited on attempt {} for message {}, backing off {:?}",
                        attempt + 1,
                        message.id,
                        delay
                    );
                    log(format!(
                        "Rate limited by the model, retrying in {}s",
                        delay.as_secs()
                    ));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        "Generation failed for message {} (attempt {}): {}, degrading to heuristic",
                        message.id,
                        attempt + 1,
                        e
                    );
                    return heuristic_record(message, body, now);
                }
            }
        }

        heuristic_record(message, body, now)
    }

    /// Applies the reconciliation rules to a successfully parsed model reply.
    fn reconcile(
        &self,
        parsed: ModelExtraction,
        message: &MailMessage,
        body: &str,
        now: DateTime<Utc>,
    ) -> Option<RawOrderRecord> {
        let heuristic = run_heuristic(message, body, now);

        // The model saying "not an order" loses to an obvious deterministic
        // order signal.
        if !parsed.is_order {
            if heuristic.is_order {
                debug!(
                    "Heuristic override: model said not-order for message {}",
                    message.id
                );
                return Some(record_from_heuristic(message, heuristic));
            }
            return None;
        }

        let mut items: Vec<RawItem> = parsed
            .items
            .into_iter()
            .filter(|i| !i.name.trim().is_empty())
            .map(|i| {
                let mut item = RawItem::new(
                    i.name.trim(),
                    i.quantity.unwrap_or(1),
                    i.unit.as_deref().unwrap_or("each"),
                    i.unit_price,
                );
                item.sku = i.part_number;
                item.asin = i.asin;
                item
            })
            .collect();

        let total_amount = parsed.total_amount.unwrap_or(0.0);

        // Order with no items: one deterministic re-attempt before accepting
        // the empty list.
        let mut recovered_items = false;
        if items.is_empty() {
            let recovered = classify::extract_items(body);
            if !recovered.is_empty() {
                items = recovered;
                recovered_items = true;
            }
        }

        let order_date = normalize_order_date(parsed.order_date.as_deref(), message.date(), now);
        let supplier = parsed
            .supplier
            .filter(|s| !s.trim().is_empty())
            .or(heuristic.supplier)
            .unwrap_or_else(|| "Unknown".to_string());

        let mut record = RawOrderRecord::new(&message.id, message.subject(), &supplier, order_date);
        record.order_number = classify::extract_order_number(message.subject())
            .or_else(|| classify::extract_order_number(body));
        record.confidence = parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
        record.items = items;
        // A totalAmount claimed alongside an empty item list is not trusted.
        record.total_amount = if recovered_items {
            record.items_total()
        } else {
            total_amount
        };
        Some(record)
    }
}

/// Exponential backoff for rate-limited attempts: 2, 4, 8 seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt + 1))
}

/// Normalizes an order date: parsed model date, else the message header
/// date, else `now`. Idempotent on already-ISO input.
pub fn normalize_order_date(
    raw: Option<&str>,
    header_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return dt.and_utc();
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return dt.with_timezone(&Utc);
        }
    }
    header_date.unwrap_or(now)
}

/// Builds the fixed-structure extraction prompt: metadata plus body
/// truncated to 8,000 characters.
fn build_prompt(message: &MailMessage, body: &str) -> String {
    let truncated: String = body.chars().take(PROMPT_BODY_LIMIT).collect();
    format!(
        r#"You are a purchase-order extraction assistant. Analyze the email below and respond ONLY with a JSON object matching this schema:
{{"isOrder": bool, "supplier": string, "orderDate": "YYYY-MM-DD", "totalAmount": number, "items": [{{"name": string, "quantity": number, "unit": string, "unitPrice": number, "partNumber": string|null, "asin": string|null}}], "confidence": number}}

From: {from}
Subject: {subject}
Date: {date}

Body:
{body}"#,
        from = message.from(),
        subject = message.subject(),
        date = message.header("Date").unwrap_or(""),
        body = truncated,
    )
}

/// Parses the first balanced JSON object out of the model's reply.
fn parse_extraction(response: &str) -> Result<ModelExtraction, ExtractError> {
    let json = extract_json(response)
        .ok_or_else(|| ExtractError::MalformedResponse("no JSON object in reply".to_string()))?;
    serde_json::from_str(&json).map_err(|e| ExtractError::MalformedResponse(e.to_string()))
}

/// Finds the first balanced `{...}` in the response, tracking string
/// boundaries and escape sequences so braces inside values don't confuse
/// the depth count.
pub fn extract_json(response: &str) -> Option<String> {
    let start = response.find('{')?;

    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn run_heuristic(message: &MailMessage, body: &str, now: DateTime<Utc>) -> HeuristicResult {
    classify::classify(message.subject(), message.from(), body, message.date(), now)
}

/// Full heuristic fallback path: classify and convert, or a confident
/// not-an-order.
fn heuristic_record(
    message: &MailMessage,
    body: &str,
    now: DateTime<Utc>,
) -> Option<RawOrderRecord> {
    let result = run_heuristic(message, body, now);
    if result.is_order {
        Some(record_from_heuristic(message, result))
    } else {
        None
    }
}

fn record_from_heuristic(message: &MailMessage, result: HeuristicResult) -> RawOrderRecord {
    let supplier = result.supplier.unwrap_or_else(|| "Unknown".to_string());
    let mut record =
        RawOrderRecord::new(&message.id, message.subject(), &supplier, result.order_date);
    record.order_number = result.order_number;
    record.total_amount = result.total_amount;
    record.confidence = result.confidence;
    record.items = result.items;
    record
}
