use std::sync::Arc;

use tokio::io::BufReader;
use tracing::{info, warn};

use inbox_triage::cli::CliSession;
use inbox_triage::config::TriageConfig;
use inbox_triage::drafts::{GeneratorConfig, ReplyGenerator};
use inbox_triage::llm::{LlmConfig, create_provider};
use inbox_triage::mail::{EmailConfig, ImapMailSource};
use inbox_triage::pipeline::{Classifier, TriagePipeline};
use inbox_triage::store::{DraftStore, LibSqlBackend};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    // Logs go to stderr; stdout belongs to the session.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = TriageConfig::from_env()?;
    let email_config = EmailConfig::from_env()?;

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mailbox: {}@{} ({})",
        email_config.username, email_config.imap_host, email_config.mailbox
    );

    // ── Reply backend (optional) ────────────────────────────────────────
    let llm_config = LlmConfig::from_env()?;
    let llm = match llm_config.as_ref().map(create_provider) {
        Some(Ok(provider)) => Some(provider),
        Some(Err(e)) => {
            warn!(error = %e, "Reply backend unavailable, using templates");
            None
        }
        None => {
            info!("LLM_MODEL not set, replies will use templates");
            None
        }
    };
    eprintln!(
        "   Replies: {}",
        llm_config
            .as_ref()
            .filter(|_| llm.is_some())
            .map_or("templates".to_string(), |c| format!("{} via {}", c.model, c.base_url))
    );

    let generator_config = match &llm_config {
        Some(c) => GeneratorConfig {
            max_tokens: c.max_tokens,
            temperature: c.temperature,
            max_reply_chars: config.max_reply_chars,
        },
        None => GeneratorConfig {
            max_reply_chars: config.max_reply_chars,
            ..GeneratorConfig::default()
        },
    };

    // ── Draft store ─────────────────────────────────────────────────────
    let store: Arc<dyn DraftStore> = Arc::new(LibSqlBackend::new_local(&config.drafts_db_path).await?);
    eprintln!("   Drafts: {}\n", config.drafts_db_path.display());

    // ── Pipeline + session ──────────────────────────────────────────────
    let pipeline = TriagePipeline::new(
        Arc::new(ImapMailSource::new(email_config, config.body_preview_chars)),
        Classifier::new(&config.keywords)?,
        ReplyGenerator::new(llm, config.templates.clone(), generator_config),
    );

    let mut session = CliSession::new(pipeline, store, config.fetch_limit, std::io::stdout());
    session.run(BufReader::new(tokio::io::stdin())).await?;

    info!("Goodbye");
    Ok(())
}
