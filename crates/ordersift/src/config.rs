//! Pipeline tuning knobs.
//!
//! Everything here has a sensible default so the pipeline runs with
//! `PipelineConfig::default()`; deployments override via serde.

use serde::{Deserialize, Serialize};

/// Maximum items any single extraction strategy may return.
pub const MAX_EXTRACTED_ITEMS: usize = 20;

/// Body text is truncated to this many characters before prompting.
pub const PROMPT_BODY_LIMIT: usize = 8_000;

/// Decoded bodies shorter than this fall back to the message snippet.
pub const MIN_BODY_LENGTH: usize = 20;

/// Maximum identifiers per catalog batch lookup.
pub const CATALOG_BATCH_LIMIT: usize = 100;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Maximum model attempts per email before degrading to the heuristic.
    pub max_extract_attempts: u32,
    /// Delay between processing consecutive emails, in milliseconds.
    pub email_pacing_ms: u64,
    /// Delay between consecutive model calls, in milliseconds.
    pub model_pacing_ms: u64,
    /// Extra delay inserted after every humanization batch, in milliseconds.
    pub humanize_batch_pacing_ms: u64,
    /// Names per humanization batch.
    pub humanize_batch_size: usize,
    /// Names at or below this length are left as-is.
    pub humanize_min_length: usize,
    /// Mailbox listing result cap per job.
    pub max_messages_per_job: usize,
    /// How far back the mailbox query reaches, in days.
    pub lookback_days: i64,
    pub consolidate: ConsolidateConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_extract_attempts: 3,
            email_pacing_ms: 500,
            model_pacing_ms: 1_000,
            humanize_batch_pacing_ms: 2_000,
            humanize_batch_size: 5,
            humanize_min_length: 40,
            max_messages_per_job: 100,
            lookback_days: 365,
            consolidate: ConsolidateConfig::default(),
        }
    }
}

/// Thresholds for grouping raw records that share no explicit order number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsolidateConfig {
    /// Records from the same supplier within this many days may be merged.
    pub date_window_days: i64,
    /// Minimum fraction of the smaller record's item names that must also
    /// appear in the candidate group for a merge.
    pub min_item_overlap: f64,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            date_window_days: 7,
            min_item_overlap: 0.5,
        }
    }
}
