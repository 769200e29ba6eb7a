//! Background intake: receives emails over a channel, runs them through
//! `EmailProcessor`, and hands every result to a `DecisionSink`.
//!
//! Loop:
//! 1. Wait for the next email (or a shutdown poll tick)
//! 2. Drain whatever else is already queued, up to the batch concurrency
//! 3. `processor.process_batch()` → ordered results
//! 4. `sink.emit()` per result; sink failures are logged, never retried

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::pipeline::processor::EmailProcessor;
use crate::pipeline::traits::DecisionSink;
use crate::pipeline::types::{Email, ProcessedEmail};

/// How often an idle loop checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Counters reported when the intake loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub received: usize,
    pub processed: usize,
    pub emitted: usize,
}

/// Spawn the intake loop.
///
/// The loop ends when the sender side of `inbox` is dropped (after the
/// queue drains) or when the returned flag is set.
pub fn spawn_intake(
    processor: Arc<EmailProcessor>,
    sink: Arc<dyn DecisionSink>,
    mut inbox: mpsc::Receiver<Email>,
) -> (JoinHandle<IntakeStats>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Email intake started");
        let mut stats = IntakeStats::default();
        let mut tick = tokio::time::interval(SHUTDOWN_POLL);

        loop {
            let first = tokio::select! {
                received = inbox.recv() => match received {
                    Some(email) => email,
                    None => {
                        info!("Intake channel closed");
                        break;
                    }
                },
                _ = tick.tick() => {
                    if shutdown.load(Ordering::Relaxed) {
                        info!("Email intake shutting down");
                        break;
                    }
                    continue;
                }
            };

            if shutdown.load(Ordering::Relaxed) {
                info!("Email intake shutting down");
                break;
            }

            let limit = processor.config().batch_concurrency.max(1);
            let mut batch = vec![first];
            while batch.len() < limit {
                match inbox.try_recv() {
                    Ok(email) => batch.push(email),
                    Err(_) => break,
                }
            }
            stats.received += batch.len();

            let results = processor.process_batch(&batch).await;
            stats.processed += results.len();
            stats.emitted += emit_all(sink.as_ref(), &results).await;
        }

        info!(
            received = stats.received,
            processed = stats.processed,
            emitted = stats.emitted,
            "Email intake stopped"
        );
        stats
    });

    (handle, shutdown_flag)
}

async fn emit_all(sink: &dyn DecisionSink, results: &[ProcessedEmail]) -> usize {
    let mut emitted = 0;
    for processed in results {
        match sink.emit(processed).await {
            Ok(()) => {
                debug!(
                    id = %processed.email_id,
                    action = processed.decision.action.label(),
                    "Decision emitted"
                );
                emitted += 1;
            }
            Err(e) => {
                warn!(id = %processed.email_id, error = %e, "Failed to emit decision");
            }
        }
    }
    emitted
}

// ── JSON-lines sink ─────────────────────────────────────────────────

/// Writes one JSON object per processed email.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Append to a file, creating it if needed.
    pub fn append_to(path: &Path) -> Result<Self, SinkError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl DecisionSink for JsonLinesSink {
    async fn emit(&self, processed: &ProcessedEmail) -> Result<(), SinkError> {
        let line = serde_json::to_string(processed)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::{ClassifierError, GenerationError, SafetyError};
    use crate::pipeline::processor::SignalProviders;
    use crate::pipeline::traits::{Generator, SafetyChecker, SignalClassifier};
    use crate::pipeline::types::{
        Confidence, GenerationCandidate, GenerationRequest, Intent, LabeledScore, Sentiment,
        Urgency,
    };

    struct Always<L>(L);

    #[async_trait]
    impl<L: Copy + Send + Sync + 'static> SignalClassifier<L> for Always<L> {
        fn model_tag(&self) -> &str {
            "always"
        }

        async fn classify(
            &self,
            _text: &str,
            _metadata: &Email,
        ) -> Result<LabeledScore<L>, ClassifierError> {
            Ok(LabeledScore::new(self.0, Confidence::new(0.6).unwrap()))
        }
    }

    struct NeverCalled;

    #[async_trait]
    impl Generator for NeverCalled {
        fn model_tag(&self) -> &str {
            "never"
        }

        async fn generate(
            &self,
            _request: GenerationRequest<'_>,
        ) -> Result<GenerationCandidate, GenerationError> {
            Err(GenerationError::GenerationFailed {
                strategy: "none".into(),
                reason: "should not be called".into(),
            })
        }
    }

    #[async_trait]
    impl SafetyChecker for NeverCalled {
        fn model_tag(&self) -> &str {
            "never"
        }

        async fn is_safe(&self, _text: &str) -> Result<bool, SafetyError> {
            Ok(false)
        }
    }

    fn processor() -> Arc<EmailProcessor> {
        // 0.6 everywhere: every email is rejected by the gate
        let signals = SignalProviders {
            intent: Arc::new(Always(Intent::Meeting)),
            urgency: Arc::new(Always(Urgency::Low)),
            sentiment: Arc::new(Always(Sentiment::Neutral)),
        };
        Arc::new(EmailProcessor::new(
            signals,
            Arc::new(NeverCalled),
            Arc::new(NeverCalled),
            PipelineConfig::default(),
        ))
    }

    fn email(id: &str) -> Email {
        Email::new(id, "bob@example.com", "me@example.com", "Sync", "Can we meet?", Utc::now())
    }

    #[tokio::test]
    async fn drains_channel_and_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let sink = Arc::new(JsonLinesSink::append_to(&path).unwrap());

        let (tx, rx) = mpsc::channel(16);
        let (handle, _shutdown) = spawn_intake(processor(), sink, rx);

        for id in ["m-1", "m-2", "m-3"] {
            tx.send(email(id)).await.unwrap();
        }
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            IntakeStats {
                received: 3,
                processed: 3,
                emitted: 3
            }
        );

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["email_id"], "m-1");
        assert_eq!(lines[0]["decision"]["action"], "ESCALATE");
        assert_eq!(lines[0]["decision"]["reason"], "low-confidence");
    }

    #[tokio::test]
    async fn invalid_emails_are_counted_but_not_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonLinesSink::append_to(&dir.path().join("out.jsonl")).unwrap());

        let (tx, rx) = mpsc::channel(4);
        let (handle, _shutdown) = spawn_intake(processor(), sink, rx);

        let mut invalid = email("bad");
        invalid.sender = "nobody".into();
        tx.send(invalid).await.unwrap();
        tx.send(email("good")).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.emitted, 1);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_idle_loop() {
        let sink = Arc::new(JsonLinesSink::new(std::io::sink()));
        let (_tx, rx) = mpsc::channel::<Email>(1);
        let (handle, shutdown) = spawn_intake(processor(), sink, rx);

        shutdown.store(true, Ordering::Relaxed);
        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("intake loop did not stop")
            .unwrap();
        assert_eq!(stats, IntakeStats::default());
    }
}
