//! Mailbox client adapter.
//!
//! The pipeline consumes mailboxes through the narrow
//! list / get-message / get-attachment contract of [`MailboxClient`]; token
//! refresh and session plumbing live behind the implementation.

pub mod http;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

pub use http::HttpMailbox;

/// A single RFC 5322 header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Body of a MIME part. Inline content arrives as base64url `data`;
/// attachments carry only an `attachment_id` to fetch separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One node of the MIME part tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<PartBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// True when this part's MIME type starts with `prefix`.
    pub fn is_mime(&self, prefix: &str) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with(prefix))
    }

    /// Decodes the inline body data to text, or `None` when absent/undecodable.
    pub fn decoded_text(&self) -> Option<String> {
        let data = self.body.as_ref()?.data.as_deref()?;
        decode_base64_text(data)
    }
}

/// A raw mailbox message with its typed MIME payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePart>,
}

impl MailMessage {
    /// Looks up a header by case-insensitive name on the top-level payload.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        })
    }

    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or("")
    }

    pub fn from(&self) -> &str {
        self.header("From").unwrap_or("")
    }

    /// Best-effort message date: the `Date` header, else the provider's
    /// internal timestamp (epoch milliseconds).
    pub fn date(&self) -> Option<DateTime<Utc>> {
        if let Some(raw) = self.header("Date") {
            if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        self.internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    /// The sender's bare domain, e.g. `amazon.com` for
    /// `"Amazon <no-reply@amazon.com>"`.
    pub fn sender_domain(&self) -> Option<String> {
        sender_domain(self.from())
    }
}

/// Extracts the domain part of an address inside a `From` header.
pub fn sender_domain(from: &str) -> Option<String> {
    let addr = match (from.find('<'), from.find('>')) {
        (Some(start), Some(end)) if end > start => &from[start + 1..end],
        _ => from.trim(),
    };
    let domain = addr.rsplit('@').next()?;
    if domain.is_empty() || domain == addr {
        return None;
    }
    Some(domain.trim().to_lowercase())
}

/// Decodes base64 body data to UTF-8 text.
///
/// Providers use URL-safe base64 but padding varies, so several decoders are
/// tried in order.
pub fn decode_base64_text(data: &str) -> Option<String> {
    decode_base64_bytes(data).and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Decodes base64 body data to raw bytes, trying URL-safe and standard
/// alphabets with and without padding.
pub fn decode_base64_bytes(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

    let engines: &[&base64::engine::GeneralPurpose] =
        &[&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];
    for engine in engines {
        if let Ok(decoded) = engine.decode(data) {
            return Some(decoded);
        }
    }
    None
}

/// Narrow mailbox access contract consumed by the pipeline.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Lists message ids matching `query`, newest first, capped at `max`.
    async fn list_message_ids(&self, query: &str, max: usize)
        -> Result<Vec<String>, MailboxError>;

    /// Fetches a full message with its MIME payload.
    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError>;

    /// Fetches attachment bytes for a message part.
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn message_with_headers(headers: Vec<(&str, &str)>) -> MailMessage {
        MailMessage {
            id: "m1".to_string(),
            payload: Some(MessagePart {
                headers: headers
                    .into_iter()
                    .map(|(name, value)| Header {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let msg = message_with_headers(vec![("Subject", "Your order"), ("From", "a@b.com")]);
        assert_eq!(msg.header("subject"), Some("Your order"));
        assert_eq!(msg.subject(), "Your order");
        assert_eq!(msg.header("X-Missing"), None);
    }

    #[test]
    fn test_sender_domain() {
        assert_eq!(
            sender_domain("Amazon <no-reply@amazon.com>"),
            Some("amazon.com".to_string())
        );
        assert_eq!(
            sender_domain("orders@grainger.com"),
            Some("grainger.com".to_string())
        );
        assert_eq!(sender_domain("not an address"), None);
    }

    #[test]
    fn test_date_prefers_header() {
        let mut msg = message_with_headers(vec![("Date", "Tue, 14 Jan 2025 10:30:00 +0000")]);
        msg.internal_date = Some("1700000000000".to_string());
        let date = msg.date().unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2025-01-14");
    }

    #[test]
    fn test_date_falls_back_to_internal() {
        let mut msg = message_with_headers(vec![]);
        msg.internal_date = Some("1705228200000".to_string());
        assert!(msg.date().is_some());
    }

    #[test]
    fn test_decoded_text_urlsafe_no_pad() {
        let data = URL_SAFE_NO_PAD.encode("Order total: $45.00");
        let part = MessagePart {
            mime_type: Some("text/plain".to_string()),
            body: Some(PartBody {
                data: Some(data),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(part.decoded_text().as_deref(), Some("Order total: $45.00"));
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(decode_base64_text("!!not base64!!").is_none());
    }
}
