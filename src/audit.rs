//! One-way audit trail for session summaries and advancement decisions.

use parking_lot::Mutex;
use serde::Serialize;

use crate::fluency::advancement::AdvancementDecision;
use crate::fluency::session::SessionSummary;
use crate::fluency::types::Operation;

pub const AUDIT_TARGET: &str = "fluency_audit";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuditEvent {
    #[serde(rename_all = "camelCase")]
    SessionCompleted {
        session_id: String,
        student_uid: String,
        operation: Operation,
        sub_level: String,
        summary: SessionSummary,
    },
    #[serde(rename_all = "camelCase")]
    Advancement {
        session_id: String,
        student_uid: String,
        decision: AdvancementDecision,
    },
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes each event as a structured log line under [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        match event {
            AuditEvent::SessionCompleted {
                session_id,
                student_uid,
                operation,
                summary,
                ..
            } => tracing::info!(
                target: AUDIT_TARGET,
                session_id = %session_id,
                student = %student_uid,
                operation = %operation,
                accuracy = summary.accuracy,
                quality = summary.quality.as_str(),
                payload = %payload,
                "session completed"
            ),
            AuditEvent::Advancement {
                session_id,
                student_uid,
                decision,
            } => tracing::info!(
                target: AUDIT_TARGET,
                session_id = %session_id,
                student = %student_uid,
                operation = %decision.operation,
                mode = %decision.mode,
                advanced = decision.advanced,
                reason = %decision.reason,
                payload = %payload,
                "advancement evaluated"
            ),
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn decisions(&self) -> Vec<AdvancementDecision> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                AuditEvent::Advancement { decision, .. } => Some(decision.clone()),
                _ => None,
            })
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}
