pub mod amazon;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod consolidate;
pub mod decode;
pub mod error;
pub mod extract;
pub mod job;
pub mod mailbox;
pub mod order;
pub mod supplier;

pub use amazon::{AmazonPipeline, HumanizeMode, Humanizer};
pub use catalog::{CatalogClient, CatalogItem, HttpCatalog};
pub use classify::{classify, HeuristicResult};
pub use config::{ConsolidateConfig, PipelineConfig};
pub use consolidate::consolidate;
pub use error::{
    CatalogError, DecodeError, ExtractError, JobError, MailboxError, OrdersiftError, Result,
};
pub use extract::{AiExtractor, GenerativeClient, HttpGenerativeClient, LogFn};
pub use job::{Job, JobManager, JobRunner, JobStatus, JobType, ProgressUpdate};
pub use mailbox::{HttpMailbox, MailMessage, MailboxClient};
pub use order::{ConsolidatedOrder, RawItem, RawOrderRecord};
