//! Drives extraction jobs on detached tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use super::{JobManager, JobStatus, JobType, ProgressUpdate};
use crate::catalog::CatalogClient;
use crate::config::PipelineConfig;
use crate::consolidate;
use crate::decode;
use crate::extract::{AiExtractor, GenerativeClient};
use crate::mailbox::MailboxClient;
use crate::order::RawOrderRecord;
use crate::supplier;

pub struct JobRunner {
    manager: Arc<JobManager>,
    mailbox: Arc<dyn MailboxClient>,
    generative: Arc<dyn GenerativeClient>,
    catalog: Arc<dyn CatalogClient>,
    config: PipelineConfig,
}

impl JobRunner {
    pub fn new(
        manager: Arc<JobManager>,
        mailbox: Arc<dyn MailboxClient>,
        generative: Arc<dyn GenerativeClient>,
        catalog: Arc<dyn CatalogClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            manager,
            mailbox,
            generative,
            catalog,
            config,
        }
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Creates a supplier-scan job and runs it on a detached task. An
    /// explicit domain list overrides the built-in supplier table.
    pub fn start_suppliers(self: &Arc<Self>, user_id: &str, domains: Option<Vec<String>>) -> super::Job {
        let job = self.manager.create_job(user_id, JobType::Suppliers);
        let runner = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(
            async move { runner.run_suppliers_job(&job_id, domains).await }
                .instrument(info_span!("suppliers_job", job_id = %job.id)),
        );
        job
    }

    /// Creates an Amazon-scan job and runs it on a detached task.
    pub fn start_amazon(self: &Arc<Self>, user_id: &str) -> super::Job {
        let job = self.manager.create_job(user_id, JobType::Amazon);
        let runner = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(
            async move { runner.run_amazon_job(&job_id).await }
                .instrument(info_span!("amazon_job", job_id = %job.id)),
        );
        job
    }

    /// Full supplier pipeline: list, fetch, decode, extract, consolidate.
    /// Per-email failures are counted and skipped; only listing failures
    /// fail the whole job.
    pub async fn run_suppliers_job(&self, job_id: &str, domains: Option<Vec<String>>) {
        self.manager.set_status(job_id, JobStatus::Running);
        self.manager.add_log(job_id, "Scanning supplier domains");

        let domains: Vec<String> = domains.unwrap_or_else(|| {
            supplier::KNOWN_SUPPLIERS
                .iter()
                .filter(|s| s.name != "Amazon")
                .flat_map(|s| s.domains.iter().map(|d| d.to_string()))
                .collect()
        });
        let query = supplier::build_query(&domains, self.config.lookback_days);

        let ids = match self
            .mailbox
            .list_message_ids(&query, self.config.max_messages_per_job)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!("Mailbox listing failed: {}", e);
                self.manager
                    .fail_job(job_id, format!("Mailbox listing failed: {e}"));
                return;
            }
        };

        info!("Found {} candidate emails", ids.len());
        self.manager.update_progress(
            job_id,
            ProgressUpdate {
                total: Some(ids.len() as u32),
                ..Default::default()
            },
        );

        let extractor = AiExtractor::new(self.generative.clone(), &self.config);
        let now = Utc::now();
        let mut records: Vec<RawOrderRecord> = Vec::new();
        let mut success = 0u32;
        let mut failed = 0u32;

        for (idx, id) in ids.iter().enumerate() {
            self.manager.update_progress(
                job_id,
                ProgressUpdate {
                    processed: Some(idx as u32),
                    current_task: Some(format!("Email {} of {}", idx + 1, ids.len())),
                    ..Default::default()
                },
            );

            match self.mailbox.get_message(id).await {
                Ok(message) => {
                    self.manager
                        .set_current_email(job_id, Some(message.subject().to_string()));
                    let body = decode::decode_body(self.mailbox.as_ref(), &message).await;
                    let extract_log = |line: String| self.manager.add_log(job_id, line);
                    if let Some(mut record) = extractor
                        .extract_logged(&message, &body.combined_body, now, &extract_log)
                        .await
                    {
                        enrich_item_urls(
                            &mut record,
                            &body,
                            message.sender_domain().as_deref(),
                        );
                        success += 1;
                        self.manager.add_log(
                            job_id,
                            format!(
                                "Found order from {} ({} items)",
                                record.supplier,
                                record.items.len()
                            ),
                        );
                        records.push(record);
                    }
                }
                Err(e) => {
                    failed += 1;
                    warn!("Skipping email {}: {}", id, e);
                    self.manager.add_log(job_id, format!("Skipped email {id}: {e}"));
                }
            }

            self.manager.update_progress(
                job_id,
                ProgressUpdate {
                    success: Some(success),
                    failed: Some(failed),
                    ..Default::default()
                },
            );

            if idx + 1 < ids.len() {
                tokio::time::sleep(Duration::from_millis(self.config.email_pacing_ms)).await;
            }
        }

        let orders = consolidate::consolidate(records, &self.config.consolidate);
        self.manager.add_log(
            job_id,
            format!("Consolidated into {} orders", orders.len()),
        );
        self.manager.set_current_email(job_id, None);
        self.manager.update_progress(
            job_id,
            ProgressUpdate {
                processed: Some(ids.len() as u32),
                current_task: Some("Done".to_string()),
                ..Default::default()
            },
        );
        self.manager.add_orders(job_id, orders);
        self.manager.set_status(job_id, JobStatus::Completed);
    }

    /// Amazon pipeline: list, mine ASINs, resolve the catalog, consolidate.
    pub async fn run_amazon_job(&self, job_id: &str) {
        self.manager.set_status(job_id, JobStatus::Running);
        self.manager.add_log(job_id, "Scanning Amazon order emails");

        let query = supplier::build_amazon_query(self.config.lookback_days);
        let ids = match self
            .mailbox
            .list_message_ids(&query, self.config.max_messages_per_job)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!("Mailbox listing failed: {}", e);
                self.manager
                    .fail_job(job_id, format!("Mailbox listing failed: {e}"));
                return;
            }
        };

        self.manager.update_progress(
            job_id,
            ProgressUpdate {
                total: Some(100),
                ..Default::default()
            },
        );

        let pipeline = crate::amazon::AmazonPipeline::new(
            self.mailbox.clone(),
            self.catalog.clone(),
            self.generative.clone(),
            self.config.clone(),
        );
        let manager = self.manager.clone();
        let progress_job_id = job_id.to_string();
        let records = pipeline
            .run(&ids, Utc::now(), &move |pct, task| {
                manager.update_progress(
                    &progress_job_id,
                    ProgressUpdate {
                        processed: Some(pct),
                        current_task: Some(task.to_string()),
                        ..Default::default()
                    },
                );
            })
            .await;

        self.manager.update_progress(
            job_id,
            ProgressUpdate {
                success: Some(records.len() as u32),
                ..Default::default()
            },
        );

        let orders = consolidate::consolidate(records, &self.config.consolidate);
        self.manager.add_log(
            job_id,
            format!("Consolidated into {} orders", orders.len()),
        );
        self.manager.add_orders(job_id, orders);
        self.manager.set_status(job_id, JobStatus::Completed);
    }
}

/// Fills missing item links from URLs mined out of the source email, matched
/// per item against the sender's domain.
fn enrich_item_urls(
    record: &mut RawOrderRecord,
    body: &decode::DecodedBody,
    vendor_domain: Option<&str>,
) {
    let products = decode::mine_product_urls(&body.combined_body, &body.html_body);
    let images = decode::mine_image_urls(&body.combined_body, &body.html_body);
    if products.is_empty() && images.is_empty() {
        return;
    }
    for item in &mut record.items {
        if item.product_url.is_none() {
            item.product_url =
                decode::pick_best_url(&products, &item.name, item.sku.as_deref(), vendor_domain);
        }
        if item.image_url.is_none() {
            item.image_url =
                decode::pick_best_url(&images, &item.name, item.sku.as_deref(), vendor_domain);
        }
    }
}
