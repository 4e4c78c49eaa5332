//! Amazon-specific enrichment: ASIN mining, catalog resolution, and
//! listing-title shortening.

pub mod asin;
pub mod humanize;
pub mod pipeline;

pub use asin::{asin_quantities, mine_asins};
pub use humanize::{truncate_name, HumanizeMode, Humanizer};
pub use pipeline::{AmazonPipeline, ProgressFn};
