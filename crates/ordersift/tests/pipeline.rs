//! End-to-end pipeline scenarios with scripted mailbox and model clients.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;

use ordersift::catalog::{CatalogClient, CatalogItem};
use ordersift::error::{CatalogError, ExtractError, MailboxError};
use ordersift::mailbox::{Header, MailMessage, MessagePart, PartBody};
use ordersift::{
    GenerativeClient, JobManager, JobRunner, JobStatus, JobType, MailboxClient, PipelineConfig,
};

struct ScriptedMailbox {
    messages: Vec<MailMessage>,
}

#[async_trait]
impl MailboxClient for ScriptedMailbox {
    async fn list_message_ids(&self, _query: &str, max: usize) -> Result<Vec<String>, MailboxError> {
        Ok(self.messages.iter().take(max).map(|m| m.id.clone()).collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MailboxError::MessageNotFound(id.to_string()))
    }

    async fn get_attachment(
        &self,
        _message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        Err(MailboxError::MessageNotFound(attachment_id.to_string()))
    }
}

struct ScriptedModel {
    replies: Mutex<Vec<Result<String, u16>>>,
    calls: AtomicU32,
}

impl ScriptedModel {
    fn always(reply: &str) -> Self {
        Self {
            replies: Mutex::new(vec![Ok(reply.to_string())]),
            calls: AtomicU32::new(0),
        }
    }

    /// One reply per call, the last one repeating.
    fn sequence(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            calls: AtomicU32::new(0),
        }
    }

    fn rate_limited() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl GenerativeClient for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        let next = if replies.len() > 1 {
            Some(replies.remove(0))
        } else {
            replies.first().cloned()
        };
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(ExtractError::Generation {
                status,
                message: "scripted".to_string(),
            }),
            None => Err(ExtractError::Generation {
                status: 429,
                message: "quota exceeded".to_string(),
            }),
        }
    }
}

struct NullCatalog;

#[async_trait]
impl CatalogClient for NullCatalog {
    async fn lookup_items(&self, _asins: &[String]) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(Vec::new())
    }
}

fn message(id: &str, subject: &str, from: &str, date: &str, body: &str) -> MailMessage {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body);
    MailMessage {
        id: id.to_string(),
        payload: Some(MessagePart {
            mime_type: Some("text/plain".to_string()),
            headers: vec![
                Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
                Header {
                    name: "From".to_string(),
                    value: from.to_string(),
                },
                Header {
                    name: "Date".to_string(),
                    value: date.to_string(),
                },
            ],
            body: Some(PartBody {
                data: Some(encoded),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn runner(mailbox: ScriptedMailbox, model: ScriptedModel) -> (Arc<JobRunner>, Arc<ScriptedModel>) {
    let model = Arc::new(model);
    let runner = Arc::new(JobRunner::new(
        Arc::new(JobManager::new()),
        Arc::new(mailbox),
        model.clone(),
        Arc::new(NullCatalog),
        PipelineConfig::default(),
    ));
    (runner, model)
}

const GRAINGER_ORDER: &str = r#"{"isOrder": true, "supplier": "Grainger", "orderDate": "2025-03-01", "totalAmount": 37.0, "items": [{"name": "Safety Gloves", "quantity": 2, "unit": "pair", "unitPrice": 12.0}, {"name": "Ear Plugs", "quantity": 1, "unit": "box", "unitPrice": 13.0}], "confidence": 0.9}"#;

const GRAINGER_DELIVERED: &str = r#"{"isOrder": true, "supplier": "Grainger", "orderDate": "2025-03-06", "totalAmount": 37.0, "items": [{"name": "Safety Gloves", "quantity": 2, "unit": "pair", "unitPrice": 12.0}, {"name": "Ear Plugs", "quantity": 1, "unit": "box", "unitPrice": 13.0}], "confidence": 0.9}"#;

#[tokio::test(start_paused = true)]
async fn order_lifecycle_consolidates_to_one_order() {
    let mailbox = ScriptedMailbox {
        messages: vec![
            message(
                "e1",
                "Grainger Order Confirmation W998877",
                "orders@grainger.com",
                "Sat, 01 Mar 2025 09:00:00 +0000",
                "Order: W998877\nSafety Gloves $12.00\nEar Plugs $13.00\nTotal $37.00",
            ),
            message(
                "e2",
                "Your Grainger order W998877 has shipped",
                "orders@grainger.com",
                "Mon, 03 Mar 2025 09:00:00 +0000",
                "Order: W998877\nTracking enclosed. Total $37.00",
            ),
            message(
                "e3",
                "Delivered: Grainger order W998877",
                "orders@grainger.com",
                "Thu, 06 Mar 2025 09:00:00 +0000",
                "Order: W998877 was delivered today. Total $37.00",
            ),
        ],
    };
    let (runner, _) = runner(
        mailbox,
        ScriptedModel::sequence(&[GRAINGER_ORDER, GRAINGER_ORDER, GRAINGER_DELIVERED]),
    );

    let job = runner.manager().create_job("user-1", JobType::Suppliers);
    runner.run_suppliers_job(&job.id, None).await;

    let done = runner.manager().get_job(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.orders.len(), 1);

    let order = &done.orders[0];
    assert_eq!(order.supplier, "Grainger");
    assert_eq!(order.source_email_ids.len(), 3);
    assert_eq!(order.items.len(), 2);
    assert!((order.total_amount - 37.0).abs() < 0.001);
    // Ordered 2025-03-01, delivered 2025-03-06
    assert_eq!(order.lead_time_days, Some(5));
}

#[tokio::test(start_paused = true)]
async fn model_outage_degrades_to_heuristic_orders() {
    let mailbox = ScriptedMailbox {
        messages: vec![message(
            "e1",
            "Uline Order Confirmation",
            "ship@uline.com",
            "Sat, 01 Mar 2025 09:00:00 +0000",
            "Order #: A-4455667\nPacking Tape $6.50\nStretch Wrap $21.00\nTotal $27.50",
        )],
    };
    let (runner, model) = runner(
        mailbox,
        ScriptedModel {
            replies: Mutex::new(vec![Err(500)]),
            calls: AtomicU32::new(0),
        },
    );

    let job = runner.manager().create_job("user-1", JobType::Suppliers);
    runner.run_suppliers_job(&job.id, None).await;

    let done = runner.manager().get_job(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    // Non-rate-limit failure degrades without retrying
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(done.orders.len(), 1);
    assert_eq!(done.orders[0].supplier, "Uline");
    assert_eq!(done.orders[0].items.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limiting_backs_off_before_degrading() {
    let mailbox = ScriptedMailbox {
        messages: vec![message(
            "e1",
            "Uline Order Confirmation",
            "ship@uline.com",
            "Sat, 01 Mar 2025 09:00:00 +0000",
            "Packing Tape $6.50\nTotal $6.50",
        )],
    };
    let (runner, model) = runner(mailbox, ScriptedModel::rate_limited());

    let start = tokio::time::Instant::now();
    let job = runner.manager().create_job("user-1", JobType::Suppliers);
    runner.run_suppliers_job(&job.id, None).await;

    // Three attempts with 2s and 4s of backoff between them
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= std::time::Duration::from_secs(6));

    let done = runner.manager().get_job(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.orders.len(), 1);
    // The backoffs are visible in the job log, not just in tracing output
    let rate_limit_lines = done
        .logs
        .iter()
        .filter(|l| l.message.contains("Rate limited"))
        .count();
    assert_eq!(rate_limit_lines, 2);
}

#[tokio::test(start_paused = true)]
async fn distinct_order_numbers_stay_separate() {
    let uline = r#"{"isOrder": true, "supplier": "Uline", "orderDate": "2025-03-01", "totalAmount": 6.5, "items": [{"name": "Packing Tape", "quantity": 1, "unit": "each", "unitPrice": 6.5}], "confidence": 0.9}"#;
    // Same supplier, same items, overlapping dates; only the order numbers
    // in the bodies keep the two purchases apart.
    let mailbox = ScriptedMailbox {
        messages: vec![
            message(
                "e1",
                "Uline Order Confirmation",
                "ship@uline.com",
                "Sat, 01 Mar 2025 09:00:00 +0000",
                "Order #: A-1000001\nPacking Tape $6.50\nTotal $6.50",
            ),
            message(
                "e2",
                "Uline Order Confirmation",
                "ship@uline.com",
                "Sat, 01 Mar 2025 10:00:00 +0000",
                "Order #: A-1000002\nPacking Tape $6.50\nTotal $6.50",
            ),
        ],
    };
    let (runner, _) = runner(mailbox, ScriptedModel::always(uline));

    let job = runner.manager().create_job("user-1", JobType::Suppliers);
    runner.run_suppliers_job(&job.id, None).await;

    let done = runner.manager().get_job(&job.id).unwrap();
    assert_eq!(done.orders.len(), 2);
}
