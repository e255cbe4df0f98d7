use serde::{Deserialize, Serialize};

use super::specialist::SpecialistId;

/// Result of a committed triage decision. Consumed once by the handoff step
/// for logging and audit, never stored with the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRecord {
    to_specialist: SpecialistId,
    reason: String,
    issue_type: String,
    issue_description: String,
    priority_note: Option<String>,
    correlation_id: String,
}

impl HandoffRecord {
    pub fn new(
        to_specialist: SpecialistId,
        reason: impl Into<String>,
        issue_type: impl Into<String>,
        issue_description: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            to_specialist,
            reason: reason.into(),
            issue_type: issue_type.into(),
            issue_description: issue_description.into(),
            priority_note: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn with_priority_note(mut self, note: impl Into<String>) -> Self {
        self.priority_note = Some(note.into());
        self
    }

    pub fn to_specialist(&self) -> SpecialistId {
        self.to_specialist
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn issue_type(&self) -> &str {
        &self.issue_type
    }

    pub fn issue_description(&self) -> &str {
        &self.issue_description
    }

    pub fn priority_note(&self) -> Option<&str> {
        self.priority_note.as_deref()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}
