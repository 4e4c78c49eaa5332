//! MIME body recovery.
//!
//! Walks a message's part tree to find the best text bodies and pulls text
//! out of PDF attachments. Providers sometimes send a near-empty placeholder
//! `text/plain` part alongside the real content, so at every level the
//! longest decoded part wins.

use tracing::{debug, warn};

use crate::config::MIN_BODY_LENGTH;
use crate::mailbox::{MailMessage, MailboxClient, MessagePart};

use super::html::html_to_text;

/// Decoded bodies of a single message.
#[derive(Debug, Clone, Default)]
pub struct DecodedBody {
    pub plain_body: String,
    pub html_body: String,
    /// The body handed to downstream extraction: preferred text plus any
    /// PDF attachment text.
    pub combined_body: String,
}

/// Decodes a message's bodies. PDF attachments are fetched through `client`;
/// a failed fetch or unparseable PDF contributes an empty string rather than
/// failing the message.
pub async fn decode_body(client: &dyn MailboxClient, message: &MailMessage) -> DecodedBody {
    let mut plain_body = String::new();
    let mut html_body = String::new();
    let mut pdf_parts: Vec<(String, String)> = Vec::new();

    if let Some(payload) = &message.payload {
        collect_parts(payload, &mut plain_body, &mut html_body, &mut pdf_parts);
    }

    // Fetch and extract PDF attachments
    let mut pdf_text = String::new();
    for (filename, attachment_id) in pdf_parts {
        match client.get_attachment(&message.id, &attachment_id).await {
            Ok(bytes) => {
                let text = extract_pdf_text(&bytes);
                if !text.is_empty() {
                    debug!(
                        "Extracted {} chars of PDF text from '{}'",
                        text.len(),
                        filename
                    );
                    pdf_text.push_str(&text);
                    pdf_text.push('\n');
                }
            }
            Err(e) => {
                warn!(
                    "Failed to fetch attachment '{}' from message {}: {}",
                    filename, message.id, e
                );
            }
        }
    }

    // Prefer plain text, then stripped HTML, then the provider snippet.
    let mut base = plain_body.trim().to_string();
    if base.len() < MIN_BODY_LENGTH && !html_body.is_empty() {
        base = html_to_text(&html_body);
    }
    if base.trim().len() < MIN_BODY_LENGTH {
        base = message.snippet.clone();
    }

    let combined_body = if pdf_text.is_empty() {
        base
    } else {
        format!("{}\n{}", base, pdf_text.trim_end())
    };

    DecodedBody {
        plain_body,
        html_body,
        combined_body,
    }
}

/// Recursive part-tree visit. At each level the longest decoded part of each
/// type replaces a shorter sibling.
fn collect_parts(
    part: &MessagePart,
    plain: &mut String,
    html: &mut String,
    pdfs: &mut Vec<(String, String)>,
) {
    if part.is_mime("text/plain") {
        if let Some(text) = part.decoded_text() {
            if text.len() > plain.len() {
                *plain = text;
            }
        }
    } else if part.is_mime("text/html") {
        if let Some(text) = part.decoded_text() {
            if text.len() > html.len() {
                *html = text;
            }
        }
    } else if part.is_mime("application/pdf") {
        if let Some(attachment_id) = part.body.as_ref().and_then(|b| b.attachment_id.clone()) {
            let filename = part.filename.clone().unwrap_or_else(|| "attachment.pdf".to_string());
            pdfs.push((filename, attachment_id));
        }
    }

    for child in &part.parts {
        collect_parts(child, plain, html, pdfs);
    }
}

/// Extracts text from PDF bytes. Any failure yields an empty string.
pub fn extract_pdf_text(bytes: &[u8]) -> String {
    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Failed to parse PDF attachment: {}", e);
            return String::new();
        }
    };

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }
    text
}
