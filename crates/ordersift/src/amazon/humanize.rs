//! Product-name shortening for verbose Amazon listing titles.
//!
//! Long titles go through the generative client one at a time, paced, in
//! small batches. The first rate-limit error flips the humanizer into an
//! exhausted mode for the rest of the run and every remaining name gets the
//! deterministic truncation instead; other errors truncate only the name
//! that failed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::extract::GenerativeClient;

/// Whether the model is still being consulted for name shortening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanizeMode {
    AiActive,
    AiExhausted,
}

pub struct Humanizer {
    client: Arc<dyn GenerativeClient>,
    mode: HumanizeMode,
    min_length: usize,
    batch_size: usize,
    call_pacing: Duration,
    batch_pacing: Duration,
}

impl Humanizer {
    pub fn new(client: Arc<dyn GenerativeClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            mode: HumanizeMode::AiActive,
            min_length: config.humanize_min_length,
            batch_size: config.humanize_batch_size.max(1),
            call_pacing: Duration::from_millis(config.model_pacing_ms),
            batch_pacing: Duration::from_millis(config.humanize_batch_pacing_ms),
        }
    }

    pub fn mode(&self) -> HumanizeMode {
        self.mode
    }

    /// Shortens every name in place. Names at or under the minimum length
    /// pass through untouched.
    pub async fn humanize_all(&mut self, names: &mut [String]) {
        let mut in_batch = 0usize;
        for name in names.iter_mut() {
            if name.chars().count() <= self.min_length {
                continue;
            }
            if in_batch == self.batch_size {
                tokio::time::sleep(self.batch_pacing).await;
                in_batch = 0;
            }
            *name = self.humanize_one(name).await;
            in_batch += 1;
        }
    }

    async fn humanize_one(&mut self, name: &str) -> String {
        if self.mode == HumanizeMode::AiActive {
            tokio::time::sleep(self.call_pacing).await;
            match self.client.generate(&shorten_prompt(name)).await {
                Ok(short) => {
                    let short = short.trim().trim_matches('"').trim();
                    if !short.is_empty() && short.chars().count() < name.chars().count() {
                        debug!("Shortened \"{}\" to \"{}\"", name, short);
                        return short.to_string();
                    }
                }
                Err(e) if e.is_rate_limited() => {
                    warn!("Name shortening rate limited, truncating from here on: {}", e);
                    self.mode = HumanizeMode::AiExhausted;
                }
                Err(e) => {
                    warn!("Name shortening failed for \"{}\": {}", name, e);
                }
            }
        }
        truncate_name(name)
    }
}

fn shorten_prompt(name: &str) -> String {
    format!(
        "Shorten this product listing title to a concise human-readable name of at most 6 words. Reply with the name only, no quotes.\n\nTitle: {name}"
    )
}

/// Deterministic fallback: cut at the first comma, else the first " - ",
/// else the first "|", else hard-truncate with an ellipsis.
pub fn truncate_name(name: &str) -> String {
    for sep in [",", " - ", "|"] {
        if let Some(idx) = name.find(sep) {
            let head = name[..idx].trim();
            if !head.is_empty() {
                return head.to_string();
            }
        }
    }
    let truncated: String = name.chars().take(37).collect();
    if truncated.chars().count() < name.chars().count() {
        format!("{}…", truncated.trim_end())
    } else {
        truncated
    }
}
