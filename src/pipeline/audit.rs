//! Audit trail for one pipeline run.
//!
//! The recorder is owned by a single run and needs no synchronization.
//! `finish` consumes it, so a frozen `AuditRecord` can never be amended.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::pipeline::types::{Stage, StageFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Skipped,
    Failed,
}

/// Timing and outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub detail: String,
    pub duration_ms: u64,
}

/// Frozen processing record returned with every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub email_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    /// Role (e.g. "intent", "generator") → model or version tag.
    pub model_tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    pub total_duration_ms: u64,
}

impl AuditRecord {
    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// Builds an `AuditRecord` incrementally during a run.
#[derive(Debug)]
pub struct AuditRecorder {
    run_id: Uuid,
    email_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    stages: Vec<StageRecord>,
    model_tags: BTreeMap<String, String>,
    failure: Option<StageFailure>,
}

impl AuditRecorder {
    pub fn start(email_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            email_id: email_id.into(),
            started_at: Utc::now(),
            clock: Instant::now(),
            stages: Vec::new(),
            model_tags: BTreeMap::new(),
            failure: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn completed(&mut self, stage: Stage, since: Instant, detail: impl Into<String>) {
        self.push(stage, StageOutcome::Completed, since, detail.into());
    }

    pub fn skipped(&mut self, stage: Stage, detail: impl Into<String>) {
        self.stages.push(StageRecord {
            stage,
            outcome: StageOutcome::Skipped,
            detail: detail.into(),
            duration_ms: 0,
        });
    }

    /// Record a stage failure. The first failure of a run is the one kept
    /// as the run's failure.
    pub fn failed(&mut self, failure: &StageFailure, since: Instant) {
        self.push(
            failure.stage,
            StageOutcome::Failed,
            since,
            format!("{}: {}", failure.kind, failure.detail),
        );
        if self.failure.is_none() {
            self.failure = Some(failure.clone());
        }
    }

    pub fn tag_model(&mut self, role: impl Into<String>, tag: impl Into<String>) {
        self.model_tags.insert(role.into(), tag.into());
    }

    pub fn finish(self) -> AuditRecord {
        AuditRecord {
            run_id: self.run_id,
            email_id: self.email_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stages: self.stages,
            model_tags: self.model_tags,
            failure: self.failure,
            total_duration_ms: elapsed_ms(self.clock),
        }
    }

    fn push(&mut self, stage: Stage, outcome: StageOutcome, since: Instant, detail: String) {
        self.stages.push(StageRecord {
            stage,
            outcome,
            detail,
            duration_ms: elapsed_ms(since),
        });
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
