use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use mail_triage::classifiers;
use mail_triage::generation::{Drafter, InMemoryKnowledgeBase};
use mail_triage::llm::{DEFAULT_MODEL, LlmConfig, create_provider};
use mail_triage::pipeline::email_processor::{JsonLinesSink, spawn_intake};
use mail_triage::pipeline::traits::DecisionSink;
use mail_triage::safety::PolicySafetyChecker;
use mail_triage::{Email, EmailProcessor, PipelineConfig};

const USAGE: &str = "usage: mail-triage <emails.json> [results.jsonl]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let mut args = std::env::args().skip(1);
    let input = args.next().context(USAGE)?;
    let output = args.next();

    let config = load_config()?;
    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Preference: {:?} (auto-send at {})",
        config.decision.preference, config.decision.auto_send_threshold
    );

    let raw = std::fs::read_to_string(&input).with_context(|| format!("reading {input}"))?;
    let emails: Vec<Email> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {input}"))?;

    // ── Collaborators ───────────────────────────────────────────────────
    let mut drafter = Drafter::new(&config);
    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(api_key) => {
            let model = std::env::var("TRIAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
            eprintln!("   Model: {model}");
            let llm = create_provider(&LlmConfig {
                api_key: secrecy::SecretString::from(api_key),
                model,
            })?;
            drafter = drafter.with_llm(llm);
        }
        Err(_) => {
            warn!("ANTHROPIC_API_KEY not set; LLM and RAG drafts will escalate");
        }
    }

    let mut processor = EmailProcessor::new(
        classifiers::rule_based(),
        Arc::new(drafter),
        Arc::new(PolicySafetyChecker::new()),
        config.clone(),
    );
    if let Ok(kb_path) = std::env::var("TRIAGE_KB_PATH") {
        let kb = InMemoryKnowledgeBase::from_path(&kb_path)
            .with_context(|| format!("loading knowledge base from {kb_path}"))?;
        eprintln!("   Knowledge base: {} documents", kb.len());
        processor = processor.with_knowledge_base(Arc::new(kb));
    }

    let sink: Arc<dyn DecisionSink> = match &output {
        Some(path) => Arc::new(
            JsonLinesSink::append_to(Path::new(path))
                .with_context(|| format!("opening {path}"))?,
        ),
        None => Arc::new(JsonLinesSink::stdout()),
    };

    // ── Run ─────────────────────────────────────────────────────────────
    let (tx, rx) = mpsc::channel(config.batch_concurrency * 4);
    let (handle, _shutdown) = spawn_intake(Arc::new(processor), sink, rx);

    let total = emails.len();
    for email in emails {
        tx.send(email).await.context("intake loop stopped early")?;
    }
    drop(tx);

    let stats = handle.await.context("intake task panicked")?;
    info!(
        total,
        received = stats.received,
        processed = stats.processed,
        emitted = stats.emitted,
        "Done"
    );
    Ok(())
}

/// stderr logging, plus a daily rolling file when `TRIAGE_LOG_DIR` is set.
/// stdout is reserved for results.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::env::var("TRIAGE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

/// `TRIAGE_CONFIG` file if set, else defaults; `TRIAGE_*` overrides on top.
fn load_config() -> anyhow::Result<PipelineConfig> {
    match std::env::var("TRIAGE_CONFIG") {
        Ok(path) => {
            let base = PipelineConfig::from_file(Path::new(&path))
                .with_context(|| format!("loading config from {path}"))?;
            Ok(base.with_overrides(|key| std::env::var(key).ok())?)
        }
        Err(_) => Ok(PipelineConfig::from_env()?),
    }
}
