use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ordersift::{HttpCatalog, HttpGenerativeClient, HttpMailbox, JobManager, JobRunner, PipelineConfig};
use ordersift_server::{build_router, AppState};

#[derive(thiserror::Error, Debug)]
enum ServerError {
    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Invalid bind address: {0}")]
    BindAddr(#[from] std::net::AddrParseError),

    #[error("Server io error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing() {
    tracing_log::LogTracer::init().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn required_env(name: &'static str) -> Result<String, ServerError> {
    std::env::var(name).map_err(|_| ServerError::MissingEnv(name))
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    init_tracing();

    let mailbox_base = std::env::var("MAILBOX_BASE_URL")
        .unwrap_or_else(|_| "https://gmail.googleapis.com/gmail/v1".to_string());
    let mailbox_token = required_env("MAILBOX_ACCESS_TOKEN")?;
    let mailbox = Arc::new(HttpMailbox::new(&mailbox_base, &mailbox_token));
    let generative = Arc::new(HttpGenerativeClient::new(
        required_env("GENERATIVE_ENDPOINT")?,
        required_env("GENERATIVE_API_KEY")?,
    ));
    let catalog = Arc::new(HttpCatalog::new(
        required_env("CATALOG_ENDPOINT")?,
        required_env("CATALOG_API_KEY")?,
    ));

    let runner = Arc::new(JobRunner::new(
        Arc::new(JobManager::new()),
        mailbox,
        generative,
        catalog,
        PipelineConfig::default(),
    ));

    // Hourly GC of finished jobs so the in-memory store stays bounded.
    let prune_manager = runner.manager().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3_600));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let dropped = prune_manager.prune(24, 100);
            if dropped > 0 {
                tracing::info!("Pruned {} finished jobs", dropped);
            }
        }
    });

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;
    let router = build_router(Arc::new(AppState { runner }));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
