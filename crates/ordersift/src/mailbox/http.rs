//! Gmail-style REST implementation of [`MailboxClient`].

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::MailboxError;

use super::{decode_base64_bytes, MailMessage, MailboxClient};

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentResponse {
    data: Option<String>,
}

/// REST mailbox client. The access token is handed in ready to use; refresh
/// is the caller's concern.
pub struct HttpMailbox {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpMailbox {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, MailboxError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailboxError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MailboxClient for HttpMailbox {
    async fn list_message_ids(
        &self,
        query: &str,
        max: usize,
    ) -> Result<Vec<String>, MailboxError> {
        let url = format!(
            "{}/users/me/messages?q={}&maxResults={}",
            self.base_url,
            urlencode(query),
            max
        );
        debug!("Listing messages: q={:?} max={}", query, max);
        let list: MessageListResponse = self.get_json(&url).await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        let url = format!("{}/users/me/messages/{}?format=full", self.base_url, id);
        match self.get_json::<MailMessage>(&url).await {
            Ok(message) => Ok(message),
            Err(MailboxError::Status { status: 404, .. }) => {
                Err(MailboxError::MessageNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        let url = format!(
            "{}/users/me/messages/{}/attachments/{}",
            self.base_url, message_id, attachment_id
        );
        let attachment: AttachmentResponse = self.get_json(&url).await?;
        let data = attachment.data.unwrap_or_default();
        Ok(decode_base64_bytes(&data).unwrap_or_default())
    }
}

/// Minimal percent-encoding for query strings.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("from:a@b.com"), "from%3Aa%40b.com");
        assert_eq!(urlencode("after:2024/01/01 order"), "after%3A2024%2F01%2F01%20order");
        assert_eq!(urlencode("plain-safe_chars.ok~"), "plain-safe_chars.ok~");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mailbox = HttpMailbox::new("https://mail.example.com/v1/", "token");
        assert_eq!(mailbox.base_url, "https://mail.example.com/v1");
    }

    #[test]
    fn test_list_response_parsing() {
        let parsed: MessageListResponse =
            serde_json::from_str(r#"{"messages": [{"id": "a"}, {"id": "b"}], "resultSizeEstimate": 2}"#)
                .unwrap();
        assert_eq!(parsed.messages.len(), 2);

        // Empty mailbox omits the field entirely
        let empty: MessageListResponse = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(empty.messages.is_empty());
    }
}
