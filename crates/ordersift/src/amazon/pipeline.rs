//! Two-phase Amazon order enrichment.
//!
//! Phase one walks the emails and mines ASINs; phase two resolves the
//! deduplicated ASIN set against the catalog and shortens the listing
//! titles. Progress is reported as a percentage with phase one owning
//! 0-50 and phase two the rest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::asin;
use super::humanize::Humanizer;
use crate::catalog::{CatalogClient, CatalogItem};
use crate::classify;
use crate::config::{PipelineConfig, CATALOG_BATCH_LIMIT};
use crate::decode;
use crate::extract::GenerativeClient;
use crate::mailbox::MailboxClient;
use crate::order::{RawItem, RawOrderRecord};

/// Progress callback: percentage complete and a short task description.
pub type ProgressFn<'a> = &'a (dyn Fn(u32, &str) + Send + Sync);

struct EmailOrder {
    email_id: String,
    subject: String,
    order_date: DateTime<Utc>,
    order_number: Option<String>,
    /// Mined (asin, quantity) pairs.
    items: Vec<(String, u32)>,
}

pub struct AmazonPipeline {
    mailbox: Arc<dyn MailboxClient>,
    catalog: Arc<dyn CatalogClient>,
    generative: Arc<dyn GenerativeClient>,
    config: PipelineConfig,
}

impl AmazonPipeline {
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        catalog: Arc<dyn CatalogClient>,
        generative: Arc<dyn GenerativeClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            mailbox,
            catalog,
            generative,
            config,
        }
    }

    pub async fn run(
        &self,
        message_ids: &[String],
        now: DateTime<Utc>,
        progress: ProgressFn<'_>,
    ) -> Vec<RawOrderRecord> {
        let emails = self.mine_phase(message_ids, progress).await;

        let mut unique_asins: Vec<String> = Vec::new();
        for email in &emails {
            for (a, _) in &email.items {
                if !unique_asins.iter().any(|u| u == a) {
                    unique_asins.push(a.clone());
                }
            }
        }
        unique_asins.truncate(CATALOG_BATCH_LIMIT);
        info!(
            "Mined {} unique ASINs from {} order emails",
            unique_asins.len(),
            emails.len()
        );

        progress(50, "Resolving product catalog");
        let catalog_items = match self.catalog.lookup_items(&unique_asins).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Catalog lookup failed, keeping placeholder names: {}", e);
                Vec::new()
            }
        };

        progress(75, "Shortening product names");
        let catalog_items = self.humanize_phase(catalog_items).await;

        let records = assemble_records(emails, &catalog_items);
        progress(100, "Done");
        records
    }

    /// Phase one: fetch, decode, and mine each email, isolating failures
    /// to the email they occurred in.
    async fn mine_phase(&self, message_ids: &[String], progress: ProgressFn<'_>) -> Vec<EmailOrder> {
        let total = message_ids.len().max(1);
        let mut emails = Vec::new();

        for (idx, id) in message_ids.iter().enumerate() {
            progress(
                (idx * 50 / total) as u32,
                &format!("Scanning email {} of {}", idx + 1, message_ids.len()),
            );

            let message = match self.mailbox.get_message(id).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    continue;
                }
            };

            let body = decode::decode_body(self.mailbox.as_ref(), &message).await;
            let asins = asin::mine_asins(&body.combined_body, &body.html_body);
            if asins.is_empty() {
                continue;
            }
            let items = asin::asin_quantities(&asins, &body.combined_body);

            emails.push(EmailOrder {
                email_id: message.id.clone(),
                subject: message.subject().to_string(),
                order_date: message.date().unwrap_or_else(Utc::now),
                order_number: classify::extract_order_number(message.subject())
                    .or_else(|| classify::extract_order_number(&body.combined_body)),
                items,
            });

            if idx + 1 < message_ids.len() {
                tokio::time::sleep(Duration::from_millis(self.config.email_pacing_ms)).await;
            }
        }

        emails
    }

    async fn humanize_phase(&self, mut items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        let mut names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let mut humanizer = Humanizer::new(self.generative.clone(), &self.config);
        humanizer.humanize_all(&mut names).await;
        for (item, name) in items.iter_mut().zip(names) {
            item.name = name;
        }
        items
    }
}

/// Builds one raw order record per email, enriching mined ASINs from the
/// resolved catalog entries. ASINs the catalog didn't resolve keep a
/// placeholder name so no item is dropped.
fn assemble_records(emails: Vec<EmailOrder>, catalog: &[CatalogItem]) -> Vec<RawOrderRecord> {
    emails
        .into_iter()
        .map(|email| {
            let items: Vec<RawItem> = email
                .items
                .iter()
                .map(|(asin, qty)| {
                    let entry = catalog.iter().find(|c| &c.asin == asin);
                    let name = entry
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| format!("Amazon item {asin}"));
                    let mut item =
                        RawItem::new(&name, *qty, "each", entry.and_then(|c| c.price));
                    item.asin = Some(asin.clone());
                    item.image_url = entry.and_then(|c| c.image_url.clone());
                    item.product_url = entry
                        .and_then(|c| c.product_url.clone())
                        .or_else(|| Some(format!("https://www.amazon.com/dp/{asin}")));
                    item
                })
                .collect();

            let mut record = RawOrderRecord::new(
                &email.email_id,
                &email.subject,
                "Amazon",
                email.order_date,
            );
            record.order_number = email.order_number;
            record.confidence = 0.9;
            record.items = items;
            record.total_amount = record.items_total();
            record
        })
        .collect()
}
