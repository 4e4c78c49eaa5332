use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrdersiftError {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("Mailbox request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mailbox returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Message '{0}' not found")]
    MessageNotFound(String),

    #[error("Failed to parse mailbox response: {0}")]
    ParseResponse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to decode message part: {0}")]
    PartDecode(String),

    #[error("Failed to extract PDF text: {0}")]
    PdfExtraction(String),
}

/// Error from the generative extraction service.
///
/// Carries an HTTP-like status so callers can distinguish rate limiting
/// (429/403) from everything else.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Generation request failed with status {status}: {message}")]
    Generation { status: u16, message: String },

    #[error("Generation request failed: {0}")]
    Transport(String),

    #[error("Unparseable model response: {0}")]
    MalformedResponse(String),
}

impl ExtractError {
    /// True for quota/rate-limit responses that warrant backoff and retry.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ExtractError::Generation {
                status: 429 | 403,
                ..
            }
        )
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Catalog returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Batch of {0} exceeds the 100-item catalog limit")]
    BatchTooLarge(usize),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Job '{job_id}' does not belong to user '{user_id}'")]
    NotOwned { job_id: String, user_id: String },

    #[error("Listing mailbox messages failed: {0}")]
    ListingFailed(String),

    #[error("Consolidation failed: {0}")]
    ConsolidationFailed(String),
}

pub type Result<T> = std::result::Result<T, OrdersiftError>;
